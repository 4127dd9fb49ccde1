// src/handlers/users.rs

use axum::{extract::State, Json};

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::auth::{IdentityResponse, UserDto},
};

// Handler da rota protegida /api/users/me
pub async fn get_me(
    State(app_state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
) -> Result<Json<UserDto>, AppError> {
    let user = app_state.auth_service.current_user(&identity).await?;
    Ok(Json(user))
}

// Cargos e permissões como estão no token (snapshot da emissão)
pub async fn get_my_permissions(
    AuthenticatedUser(identity): AuthenticatedUser,
) -> Json<IdentityResponse> {
    Json(IdentityResponse {
        user_id: identity.user_id,
        tenant_id: identity.tenant_id,
        roles: identity.roles,
        permissions: identity.permissions,
    })
}
