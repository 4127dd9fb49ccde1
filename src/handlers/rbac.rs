// src/handlers/rbac.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::{
        auth::AuthenticatedUser,
        rbac::{PermRbacManage, PermUserUpdate, RequirePermission},
    },
    models::rbac::{AssignRolePayload, CreatePermissionPayload, CreateRolePayload, SetActivePayload},
};

// Operações administrativas valem para o tenant do token, nunca para o
// tenant pedido na requisição.

// POST /api/rbac/roles
pub async fn create_role(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermRbacManage>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Json(payload): Json<CreateRolePayload>,
) -> Result<impl IntoResponse, AppError> {
    let response = app_state
        .rbac_service
        .create_role_with_permissions(&identity.tenant_id, payload)
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

// GET /api/rbac/roles
pub async fn list_roles(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermRbacManage>,
    AuthenticatedUser(identity): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let roles = app_state.rbac_service.list_roles(&identity.tenant_id).await?;
    Ok(Json(roles))
}

// PATCH /api/rbac/roles/{role_id}
pub async fn set_role_active(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermRbacManage>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(role_id): Path<Uuid>,
    Json(payload): Json<SetActivePayload>,
) -> Result<impl IntoResponse, AppError> {
    let role = app_state
        .rbac_service
        .set_role_active(&identity.tenant_id, role_id, payload.active)
        .await?;
    Ok(Json(role))
}

// POST /api/rbac/permissions
pub async fn create_permission(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermRbacManage>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Json(payload): Json<CreatePermissionPayload>,
) -> Result<impl IntoResponse, AppError> {
    let permission = app_state
        .rbac_service
        .create_permission(&identity.tenant_id, payload)
        .await?;

    Ok((StatusCode::CREATED, Json(permission)))
}

// GET /api/rbac/permissions
pub async fn list_permissions(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermRbacManage>,
    AuthenticatedUser(identity): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let permissions = app_state.rbac_service.list_permissions(&identity.tenant_id).await?;
    Ok(Json(permissions))
}

// PATCH /api/rbac/permissions/{permission_id}
pub async fn set_permission_active(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermRbacManage>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(permission_id): Path<Uuid>,
    Json(payload): Json<SetActivePayload>,
) -> Result<impl IntoResponse, AppError> {
    let permission = app_state
        .rbac_service
        .set_permission_active(&identity.tenant_id, permission_id, payload.active)
        .await?;
    Ok(Json(permission))
}

// POST /api/rbac/users/{user_id}/roles
pub async fn assign_role(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermRbacManage>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<AssignRolePayload>,
) -> Result<StatusCode, AppError> {
    app_state
        .rbac_service
        .assign_role(&identity.tenant_id, user_id, &payload.role)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// POST /api/rbac/users/{user_id}/deactivate
pub async fn deactivate_user(
    State(app_state): State<AppState>,
    _guard: RequirePermission<PermUserUpdate>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    app_state
        .auth_service
        .deactivate_user(&identity.tenant_id, user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
