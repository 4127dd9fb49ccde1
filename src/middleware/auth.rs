// src/middleware/auth.rs
//
// Filtro de borda: valida o Bearer token e injeta a identidade confiável
// para os serviços a jusante. Qualquer falha vira um 401 sem corpo.

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};

use crate::{
    common::error::AppError,
    config::{AppState, TenantPolicy},
    middleware::tenancy::{resolve_tenant, TenantContext, TENANT_ID_HEADER},
    models::auth::VerifiedIdentity,
};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLES_HEADER: &str = "x-user-roles";
pub const USER_PERMISSIONS_HEADER: &str = "x-user-permissions";
pub const USER_TENANT_ID_HEADER: &str = "x-user-tenant-id";

// Só o filtro escreve estes cabeçalhos; o que vier do cliente é descartado
const IDENTITY_HEADERS: [&str; 4] = [
    USER_ID_HEADER,
    USER_ROLES_HEADER,
    USER_PERMISSIONS_HEADER,
    USER_TENANT_ID_HEADER,
];

pub async fn edge_auth(
    State(app_state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    // 1. Remove qualquer identidade forjada pelo cliente
    for name in IDENTITY_HEADERS {
        request.headers_mut().remove(name);
    }

    // 2. Bearer token obrigatório
    let Some(Authorization(bearer)) = request.headers().typed_get::<Authorization<Bearer>>()
    else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    // 3. Validação sem estado
    let claims = match app_state.token_service.validate_access_token(bearer.token()) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(reason = e.code(), "Token rejeitado na borda");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };
    let identity = VerifiedIdentity::from(claims);

    // 4. Tenant da requisição contra o tenant do token
    let resolved = resolve_tenant(request.headers(), &app_state.settings.default_tenant);
    if resolved != identity.tenant_id && app_state.settings.tenant_policy == TenantPolicy::Enforce
    {
        tracing::warn!(
            token_tenant = %identity.tenant_id,
            request_tenant = %resolved,
            "Tenant da requisição difere do tenant do token"
        );
        return StatusCode::UNAUTHORIZED.into_response();
    }

    // 5. Enriquecimento
    if let Err(e) = inject_identity_headers(request.headers_mut(), &identity, &resolved) {
        tracing::debug!(error = %e, "Identidade não representável em cabeçalhos");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    request.extensions_mut().insert(TenantContext(resolved));
    request.extensions_mut().insert(identity);

    next.run(request).await
}

fn inject_identity_headers(
    headers: &mut HeaderMap,
    identity: &VerifiedIdentity,
    tenant_id: &str,
) -> Result<(), axum::http::header::InvalidHeaderValue> {
    let joined = |values: &std::collections::BTreeSet<String>| {
        values.iter().map(String::as_str).collect::<Vec<_>>().join(",")
    };

    let values = [
        (USER_ID_HEADER, identity.user_id.to_string()),
        (USER_ROLES_HEADER, joined(&identity.roles)),
        (USER_PERMISSIONS_HEADER, joined(&identity.permissions)),
        (USER_TENANT_ID_HEADER, identity.tenant_id.clone()),
        (TENANT_ID_HEADER, tenant_id.to_owned()),
    ];
    for (name, value) in values {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_str(&value)?);
    }
    Ok(())
}

// Extrator para obter a identidade verificada diretamente nos handlers
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub VerifiedIdentity);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<VerifiedIdentity>()
            .cloned()
            .map(AuthenticatedUser)
            .ok_or(AppError::Unauthorized)
    }
}
