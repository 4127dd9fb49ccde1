// src/models/token.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Entrada do registro de revogação (tabela refresh_tokens)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshTokenRecord {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OneTimeTokenKind {
    EmailVerification,
    PasswordReset,
}

impl OneTimeTokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OneTimeTokenKind::EmailVerification => "email_verification",
            OneTimeTokenKind::PasswordReset => "password_reset",
        }
    }
}

// A coluna `kind` é TEXT no banco
impl TryFrom<String> for OneTimeTokenKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "email_verification" => Ok(OneTimeTokenKind::EmailVerification),
            "password_reset" => Ok(OneTimeTokenKind::PasswordReset),
            other => Err(format!("tipo de token desconhecido: {other}")),
        }
    }
}

// Token de uso único. Só o hash SHA-256 do valor bruto é guardado.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OneTimeTokenRecord {
    pub token_hash: String,
    #[sqlx(try_from = "String")]
    pub kind: OneTimeTokenKind,
    pub user_id: Uuid,
    pub tenant_id: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

// Token assinado recém-emitido
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub user_id: Uuid,
    pub tenant_id: String,
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}
