// src/handlers/auth.rs

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::{
    common::error::AppError,
    config::AppState,
    middleware::{i18n::Locale, tenancy::TenantContext},
    models::auth::{
        AuthResponse, ForgotPasswordParams, LoginUserPayload, RefreshTokenParams,
        RegisterUserPayload, ResetPasswordParams, TokenParams,
    },
};

// POST /auth/register
pub async fn register(
    State(app_state): State<AppState>,
    TenantContext(tenant_id): TenantContext,
    Locale(lang): Locale,
    Json(mut payload): Json<RegisterUserPayload>,
) -> Result<impl IntoResponse, AppError> {
    // Sem idioma explícito, usa o Accept-Language
    if payload.preferred_language.is_none() {
        payload.preferred_language = Some(lang);
    }

    let session = app_state.auth_service.register(&tenant_id, payload).await?;
    let expires_in = app_state.token_service.access_token_ttl_millis();

    Ok((StatusCode::CREATED, Json(session.into_response(expires_in))))
}

// POST /auth/login
pub async fn login(
    State(app_state): State<AppState>,
    TenantContext(tenant_id): TenantContext,
    Json(payload): Json<LoginUserPayload>,
) -> Result<Json<AuthResponse>, AppError> {
    let session = app_state.auth_service.login(&tenant_id, payload).await?;
    let expires_in = app_state.token_service.access_token_ttl_millis();

    Ok(Json(session.into_response(expires_in)))
}

// POST /auth/refresh?refreshToken=...
pub async fn refresh(
    State(app_state): State<AppState>,
    Query(params): Query<RefreshTokenParams>,
) -> Result<Json<AuthResponse>, AppError> {
    let session = app_state.auth_service.refresh(&params.refresh_token).await?;
    let expires_in = app_state.token_service.access_token_ttl_millis();

    Ok(Json(session.into_response(expires_in)))
}

// POST /auth/logout?refreshToken=...
pub async fn logout(
    State(app_state): State<AppState>,
    Query(params): Query<RefreshTokenParams>,
) -> Result<StatusCode, AppError> {
    app_state.auth_service.logout(&params.refresh_token).await?;
    Ok(StatusCode::OK)
}

// POST /auth/verify-email?token=...
pub async fn verify_email(
    State(app_state): State<AppState>,
    Query(params): Query<TokenParams>,
) -> Result<StatusCode, AppError> {
    app_state.auth_service.verify_email(&params.token).await?;
    Ok(StatusCode::OK)
}

// POST /auth/forgot-password?email=...
// Responde 200 sempre e antes de qualquer trabalho, para não revelar
// (nem pelo tempo de resposta) se o e-mail existe.
pub async fn forgot_password(
    State(app_state): State<AppState>,
    TenantContext(tenant_id): TenantContext,
    Query(params): Query<ForgotPasswordParams>,
) -> StatusCode {
    tokio::spawn(async move {
        if let Err(e) = app_state
            .auth_service
            .forgot_password(&tenant_id, &params.email)
            .await
        {
            tracing::error!(%tenant_id, error = %e, "Falha ao processar pedido de redefinição de senha");
        }
    });
    StatusCode::OK
}

// POST /auth/reset-password?token=...&newPassword=...
pub async fn reset_password(
    State(app_state): State<AppState>,
    Query(params): Query<ResetPasswordParams>,
) -> Result<StatusCode, AppError> {
    app_state
        .auth_service
        .reset_password(&params.token, &params.new_password)
        .await?;
    Ok(StatusCode::OK)
}
