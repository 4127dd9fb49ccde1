// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// Taxonomia de erros da aplicação.
// As variantes "de cliente" viram 4xx com um código estável; as falhas
// internas (banco, bcrypt, assinatura, anyhow) viram 500 e nunca são
// convertidas em nenhuma das variantes de cliente.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Credenciais inválidas")]
    InvalidCredentials,

    #[error("Nome de usuário já existe")]
    DuplicateUsername,

    #[error("E-mail já existe")]
    DuplicateEmail,

    #[error("Senha fraca: {0}")]
    WeakPassword(String),

    #[error("Token inválido")]
    InvalidToken,

    #[error("Token expirado")]
    ExpiredToken,

    #[error("Token malformado")]
    MalformedToken,

    #[error("Token revogado")]
    RevokedToken,

    #[error("Token já utilizado")]
    AlreadyUsed,

    #[error("Conta inativa")]
    AccountInactive,

    #[error("E-mail não verificado")]
    EmailUnverified,

    #[error("Já existe um cargo com esse nome")]
    DuplicateRole,

    #[error("Já existe uma permissão com esse nome")]
    DuplicatePermission,

    #[error("Referência entre tenants diferentes")]
    CrossTenantReference,

    #[error("{0} não encontrado")]
    NotFound(&'static str),

    #[error("Nome inválido: {0}")]
    InvalidName(String),

    #[error("Autenticação necessária")]
    Unauthorized,

    #[error("Permissão '{0}' necessária")]
    Forbidden(String),

    #[error("Falha no serviço de destino: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Nenhum serviço de destino configurado")]
    UpstreamUnavailable,

    #[error("Corpo da requisição excede {0} bytes")]
    PayloadTooLarge(usize),

    // Variante para erros de banco de dados
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de Bcrypt: {0}")]
    BcryptError(#[from] bcrypt::BcryptError),

    // Só aparece na emissão (chave de assinatura indisponível). Falhas de
    // decodificação são convertidas explicitamente pelo TokenService.
    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl AppError {
    /// Código estável exposto ao cliente.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) | AppError::InvalidName(_) => "VALIDATION_ERROR",
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::DuplicateUsername => "DUPLICATE_USERNAME",
            AppError::DuplicateEmail => "DUPLICATE_EMAIL",
            AppError::WeakPassword(_) => "WEAK_PASSWORD",
            AppError::InvalidToken => "INVALID_TOKEN",
            AppError::ExpiredToken => "EXPIRED_TOKEN",
            AppError::MalformedToken => "MALFORMED_TOKEN",
            AppError::RevokedToken => "REVOKED_TOKEN",
            AppError::AlreadyUsed => "ALREADY_USED",
            AppError::AccountInactive => "ACCOUNT_INACTIVE",
            AppError::EmailUnverified => "EMAIL_UNVERIFIED",
            AppError::DuplicateRole => "DUPLICATE_ROLE",
            AppError::DuplicatePermission => "DUPLICATE_PERMISSION",
            AppError::CrossTenantReference => "CROSS_TENANT_REFERENCE",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Upstream(_) => "UPSTREAM_ERROR",
            AppError::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            AppError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            AppError::DatabaseError(_)
            | AppError::InternalServerError(_)
            | AppError::BcryptError(_)
            | AppError::JwtError(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_)
            | AppError::InvalidName(_)
            | AppError::WeakPassword(_)
            | AppError::CrossTenantReference => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials
            | AppError::InvalidToken
            | AppError::ExpiredToken
            | AppError::MalformedToken
            | AppError::RevokedToken
            | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::AccountInactive | AppError::EmailUnverified | AppError::Forbidden(_) => {
                StatusCode::FORBIDDEN
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateUsername
            | AppError::DuplicateEmail
            | AppError::DuplicateRole
            | AppError::DuplicatePermission => StatusCode::CONFLICT,
            AppError::AlreadyUsed => StatusCode::GONE,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DatabaseError(_)
            | AppError::InternalServerError(_)
            | AppError::BcryptError(_)
            | AppError::JwtError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        if let AppError::ValidationError(errors) = &self {
            let mut details = std::collections::HashMap::new();
            for (field, field_errors) in errors.field_errors() {
                let messages: Vec<String> = field_errors
                    .iter()
                    .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .collect();
                details.insert(field.to_string(), messages);
            }
            let body = Json(json!({
                "error": code,
                "message": "Um ou mais campos são inválidos.",
                "details": details,
            }));
            return (status, body).into_response();
        }

        // O `tracing` registra a mensagem detalhada; o cliente recebe uma genérica.
        let message = if status.is_server_error() {
            tracing::error!(error = %self, code, "Erro interno do servidor");
            "Ocorreu um erro inesperado.".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({ "error": code, "message": message }));
        (status, body).into_response()
    }
}
