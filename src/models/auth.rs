// src/models/auth.rs

use std::{collections::BTreeSet, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// Representa um usuário vindo do banco de dados.
// O e-mail e o nome de usuário são únicos dentro do tenant.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub tenant_id: String,
    pub username: String,
    pub email: String,

    #[serde(skip_serializing)] // IMPORTANTE para segurança
    pub password_hash: String,

    pub first_name: String,
    pub last_name: String,
    pub preferred_language: Option<String>,
    pub timezone: Option<String>,
    pub email_verified: bool,

    // Usuários nunca são apagados, só desativados (trilha de auditoria)
    pub is_active: bool,

    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

// Dados já normalizados para inserir um usuário
#[derive(Debug, Clone)]
pub struct NewUser {
    pub tenant_id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub preferred_language: Option<String>,
    pub timezone: Option<String>,
}

// Dados para registro de um novo usuário
#[derive(Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserPayload {
    #[validate(length(min = 3, max = 50, message = "O nome de usuário deve ter entre 3 e 50 caracteres."))]
    pub username: String,
    #[validate(email(message = "O e-mail fornecido é inválido."))]
    pub email: String,
    #[validate(length(min = 1, message = "A senha é obrigatória."))]
    pub password: String,
    #[validate(length(max = 100))]
    #[serde(default)]
    pub first_name: String,
    #[validate(length(max = 100))]
    #[serde(default)]
    pub last_name: String,
    pub preferred_language: Option<String>,
    pub timezone: Option<String>,
}

// A senha em texto puro nunca aparece em logs
impl fmt::Debug for RegisterUserPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterUserPayload")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("preferred_language", &self.preferred_language)
            .field("timezone", &self.timezone)
            .finish()
    }
}

// Dados para login. `username` aceita o nome de usuário ou o e-mail.
#[derive(Deserialize, Validate)]
pub struct LoginUserPayload {
    #[validate(length(min = 1, message = "Informe o usuário ou e-mail."))]
    pub username: String,
    #[validate(length(min = 1, message = "A senha é obrigatória."))]
    pub password: String,
}

impl fmt::Debug for LoginUserPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginUserPayload")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenParams {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenParams {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordParams {
    pub email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordParams {
    pub token: String,
    pub new_password: String,
}

impl fmt::Debug for ResetPasswordParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResetPasswordParams")
            .field("token", &"<redacted>")
            .field("new_password", &"<redacted>")
            .finish()
    }
}

// Visão pública do usuário devolvida nas respostas de autenticação
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub is_email_verified: bool,
    pub preferred_language: Option<String>,
    pub timezone: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub roles: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl UserDto {
    pub fn new(user: &User, roles: BTreeSet<String>) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            full_name: user.full_name(),
            is_email_verified: user.email_verified,
            preferred_language: user.preferred_language.clone(),
            timezone: user.timezone.clone(),
            last_login_at: user.last_login_at,
            roles,
            created_at: user.created_at,
        }
    }
}

// Resposta de autenticação com o par de tokens
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Validade do access token em milissegundos.
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserDto>,
    pub tenant_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

// Estrutura de dados ("claims") dentro do JWT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,         // Subject (ID do usuário)
    pub tenant_id: String, // Tenant do usuário no momento da emissão
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub iat: i64, // Issued At
    pub exp: i64, // Expiration time
    pub jti: Uuid,
    pub iss: String,
    pub typ: TokenKind,
}

// Cargos e permissões efetivas congelados no token
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentitySnapshot {
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
}

// Identidade já verificada pelo filtro de borda; vive nas extensions
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub user_id: Uuid,
    pub tenant_id: String,
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
}

impl From<Claims> for VerifiedIdentity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            tenant_id: claims.tenant_id,
            roles: claims.roles.into_iter().collect(),
            permissions: claims.permissions.into_iter().collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityResponse {
    pub user_id: Uuid,
    pub tenant_id: String,
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_passwords() {
        let register = RegisterUserPayload {
            username: "ana".into(),
            email: "ana@example.com".into(),
            password: "senha-secreta-1".into(),
            first_name: "Ana".into(),
            last_name: "Lima".into(),
            preferred_language: None,
            timezone: None,
        };
        let login = LoginUserPayload {
            username: "ana".into(),
            password: "senha-secreta-1".into(),
        };
        let reset = ResetPasswordParams {
            token: "token-de-reset".into(),
            new_password: "senha-secreta-2".into(),
        };

        let rendered = format!("{register:?} {login:?} {reset:?}");
        assert!(rendered.contains("ana@example.com"));
        assert!(!rendered.contains("senha-secreta"));
        assert!(!rendered.contains("token-de-reset"));
    }
}
