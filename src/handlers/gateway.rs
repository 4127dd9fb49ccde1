// src/handlers/gateway.rs
//
// Encaminha as rotas /api/* que não são atendidas aqui para o serviço de
// destino, já com os cabeçalhos de identidade injetados pelo filtro.

use axum::{
    body::{to_bytes, Body},
    extract::{OriginalUri, Request, State},
    http::{header, HeaderMap, HeaderName},
    response::Response,
};

use http_body_util::LengthLimitError;

use crate::{common::error::AppError, config::AppState};

pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

// Cabeçalhos de conexão não atravessam o proxy
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::HOST,
    header::TRANSFER_ENCODING,
    header::CONTENT_LENGTH,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
];

fn without_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = headers.clone();
    for name in &HOP_BY_HOP {
        filtered.remove(name);
    }
    filtered.remove("keep-alive");
    filtered
}

pub async fn forward(
    State(app_state): State<AppState>,
    request: Request,
) -> Result<Response, AppError> {
    let base = app_state
        .settings
        .upstream_url
        .as_deref()
        .ok_or(AppError::UpstreamUnavailable)?;

    let (parts, body) = request.into_parts();
    // Dentro do `nest` a URI perde o prefixo /api; o destino recebe a original
    let uri = parts
        .extensions
        .get::<OriginalUri>()
        .map(|original| original.0.clone())
        .unwrap_or_else(|| parts.uri.clone());
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", base.trim_end_matches('/'), path_and_query);

    let body = to_bytes(body, MAX_BODY_BYTES).await.map_err(|e| {
        let inner = e.into_inner();
        if inner.is::<LengthLimitError>() {
            AppError::PayloadTooLarge(MAX_BODY_BYTES)
        } else {
            anyhow::anyhow!("Falha ao ler o corpo da requisição: {}", inner).into()
        }
    })?;

    tracing::debug!(method = %parts.method, %url, "Encaminhando para o serviço de destino");

    // 1. Requisição ao destino
    let upstream = app_state
        .http
        .request(parts.method, &url)
        .headers(without_hop_by_hop(&parts.headers))
        .body(body)
        .send()
        .await?;

    // 2. Resposta de volta ao cliente
    let status = upstream.status();
    let headers = without_hop_by_hop(upstream.headers());
    let bytes = upstream.bytes().await?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
