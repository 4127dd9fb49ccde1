// src/middleware/tenancy.rs

use std::{convert::Infallible, net::IpAddr};

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use axum_extra::headers::{HeaderMapExt, Host};

use crate::config::AppState;

// O nome do nosso cabeçalho HTTP customizado
pub const TENANT_ID_HEADER: &str = "x-tenant-id";

/// Resolve o tenant da requisição. Total e sem efeitos colaterais:
/// 1. `X-Tenant-ID` não vazio (sem espaços nas pontas);
/// 2. primeiro rótulo do hostname do `Host`, se houver um ponto;
/// 3. o tenant padrão.
pub fn resolve_tenant(headers: &HeaderMap, default_tenant: &str) -> String {
    if let Some(tenant) = headers
        .get(TENANT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return tenant.to_owned();
    }

    headers
        .typed_get::<Host>()
        .and_then(|host| subdomain_tenant(host.hostname()))
        .unwrap_or_else(|| default_tenant.to_owned())
}

// "acme.travel.com" -> "acme"; "localhost" e IPs não têm subdomínio
fn subdomain_tenant(hostname: &str) -> Option<String> {
    let hostname = hostname.trim_start_matches('[').trim_end_matches(']');
    if hostname.parse::<IpAddr>().is_ok() || !hostname.contains('.') {
        return None;
    }
    hostname
        .split('.')
        .next()
        .filter(|label| !label.is_empty())
        .map(str::to_ascii_lowercase)
}

// O tenant da requisição. Depois do filtro de borda vem das extensions;
// nas rotas públicas é resolvido a partir dos cabeçalhos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext(pub String);

impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(context) = parts.extensions.get::<TenantContext>() {
            return Ok(context.clone());
        }

        let app_state = AppState::from_ref(state);
        Ok(TenantContext(resolve_tenant(
            &parts.headers,
            &app_state.settings.default_tenant,
        )))
    }
}
