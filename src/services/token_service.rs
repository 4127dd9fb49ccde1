// src/services/token_service.rs
//
// Emissão e validação dos tokens. O access token é sem estado (só
// assinatura + expiração); o refresh token também é assinado, mas cada
// `jti` tem uma entrada no revocation store.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::AuthSettings,
    db::TokenRepository,
    models::{
        auth::{Claims, IdentitySnapshot, TokenKind},
        token::{
            IssuedToken, OneTimeTokenKind, OneTimeTokenRecord, RefreshTokenRecord, TokenPair,
        },
    },
};

/// Fonte da identidade usada ao girar um refresh token: o snapshot do
/// novo access token é derivado de novo, nunca copiado do token antigo.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    async fn snapshot(&self, tenant_id: &str, user_id: Uuid) -> Result<IdentitySnapshot, AppError>;
}

#[derive(Clone)]
pub struct TokenService {
    repo: Arc<dyn TokenRepository>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    verification_ttl: Duration,
    reset_ttl: Duration,
}

impl TokenService {
    pub fn new(repo: Arc<dyn TokenRepository>, settings: &AuthSettings) -> Self {
        Self {
            repo,
            encoding_key: EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
            issuer: settings.jwt_issuer.clone(),
            access_ttl: Duration::seconds(settings.access_token_ttl_secs),
            refresh_ttl: Duration::seconds(settings.refresh_token_ttl_secs),
            verification_ttl: Duration::seconds(settings.verification_token_ttl_secs),
            reset_ttl: Duration::seconds(settings.reset_token_ttl_secs),
        }
    }

    /// Validade do access token em milissegundos (campo `expiresIn`).
    pub fn access_token_ttl_millis(&self) -> i64 {
        self.access_ttl.num_milliseconds()
    }

    fn validation(&self, validate_exp: bool) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);
        validation.leeway = 0;
        validation.validate_exp = validate_exp;
        validation
    }

    fn sign(
        &self,
        user_id: Uuid,
        tenant_id: &str,
        kind: TokenKind,
        snapshot: Option<&IdentitySnapshot>,
    ) -> Result<IssuedToken, AppError> {
        let now = Utc::now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let expires_at = now + ttl;
        let token_id = Uuid::new_v4();

        let claims = Claims {
            sub: user_id,
            tenant_id: tenant_id.to_owned(),
            roles: snapshot
                .map(|s| s.roles.iter().cloned().collect())
                .unwrap_or_default(),
            permissions: snapshot
                .map(|s| s.permissions.iter().cloned().collect())
                .unwrap_or_default(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: token_id,
            iss: self.issuer.clone(),
            typ: kind,
        };

        // Falha aqui é interna (chave indisponível) e vira 500
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(IssuedToken { token, token_id, expires_at })
    }

    fn decode_claims(
        &self,
        token: &str,
        expected: TokenKind,
        validate_exp: bool,
    ) -> Result<Claims, AppError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation(validate_exp))
            .map(|data| data.claims)
            .map_err(map_decode_error)?;

        // Um refresh token nunca serve como access token (e vice-versa)
        if claims.typ != expected {
            return Err(AppError::InvalidToken);
        }
        Ok(claims)
    }

    /// Assina o snapshot de cargos/permissões. Sem efeitos colaterais.
    pub fn issue_access_token(
        &self,
        user_id: Uuid,
        tenant_id: &str,
        snapshot: &IdentitySnapshot,
    ) -> Result<IssuedToken, AppError> {
        self.sign(user_id, tenant_id, TokenKind::Access, Some(snapshot))
    }

    /// Assina e registra o refresh token no revocation store.
    pub async fn issue_refresh_token(
        &self,
        user_id: Uuid,
        tenant_id: &str,
    ) -> Result<IssuedToken, AppError> {
        let issued = self.sign(user_id, tenant_id, TokenKind::Refresh, None)?;
        self.repo
            .insert_refresh(RefreshTokenRecord {
                token_id: issued.token_id,
                user_id,
                tenant_id: tenant_id.to_owned(),
                expires_at: issued.expires_at,
                revoked_at: None,
            })
            .await?;
        Ok(issued)
    }

    pub async fn issue_pair(
        &self,
        user_id: Uuid,
        tenant_id: &str,
        snapshot: &IdentitySnapshot,
    ) -> Result<TokenPair, AppError> {
        let access = self.issue_access_token(user_id, tenant_id, snapshot)?;
        let refresh = self.issue_refresh_token(user_id, tenant_id).await?;
        Ok(TokenPair {
            user_id,
            tenant_id: tenant_id.to_owned(),
            access,
            refresh,
        })
    }

    /// Verificação sem estado: assinatura, emissor, expiração e tipo.
    /// Não toca no store nem em nenhum lock.
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, AppError> {
        self.decode_claims(token, TokenKind::Access, true)
    }

    /// Gira o refresh token: verifica a assinatura, revoga o `jti` num
    /// único compare-and-swap e emite um par novo com o snapshot atual.
    #[tracing::instrument(skip_all)]
    pub async fn redeem_refresh_token(
        &self,
        token: &str,
        identity: &dyn IdentitySource,
    ) -> Result<TokenPair, AppError> {
        let claims = self.decode_claims(token, TokenKind::Refresh, true)?;
        let record = self.repo.redeem_refresh(claims.jti, Utc::now()).await?;

        // O registro é a fonte de verdade de dono e tenant
        if record.user_id != claims.sub || record.tenant_id != claims.tenant_id {
            tracing::warn!(token_id = %claims.jti, "Refresh token não confere com o registro");
            return Err(AppError::InvalidToken);
        }

        let snapshot = identity.snapshot(&record.tenant_id, record.user_id).await?;
        let pair = self
            .issue_pair(record.user_id, &record.tenant_id, &snapshot)
            .await?;
        tracing::debug!(old = %claims.jti, new = %pair.refresh.token_id, "Refresh token girado");
        Ok(pair)
    }

    /// Idempotente.
    pub async fn revoke(&self, token_id: Uuid) -> Result<(), AppError> {
        self.repo.revoke_refresh(token_id, Utc::now()).await
    }

    /// Logout: aceita token expirado, desde que a assinatura seja válida.
    pub async fn revoke_refresh_token(&self, token: &str) -> Result<(), AppError> {
        let claims = self.decode_claims(token, TokenKind::Refresh, false)?;
        self.revoke(claims.jti).await
    }

    pub async fn revoke_all_for_user(&self, tenant_id: &str, user_id: Uuid) -> Result<u64, AppError> {
        self.repo
            .revoke_all_for_user(tenant_id, user_id, Utc::now())
            .await
    }

    /// Gera um token opaco de uso único e guarda apenas o seu hash.
    /// Devolve o valor bruto, que só segue para o notificador.
    pub async fn issue_one_time_token(
        &self,
        kind: OneTimeTokenKind,
        tenant_id: &str,
        user_id: Uuid,
    ) -> Result<String, AppError> {
        let raw = generate_opaque_token();
        let ttl = match kind {
            OneTimeTokenKind::EmailVerification => self.verification_ttl,
            OneTimeTokenKind::PasswordReset => self.reset_ttl,
        };

        self.repo
            .insert_one_time(OneTimeTokenRecord {
                token_hash: hash_opaque_token(&raw),
                kind,
                user_id,
                tenant_id: tenant_id.to_owned(),
                expires_at: Utc::now() + ttl,
                used_at: None,
            })
            .await?;
        Ok(raw)
    }

    pub async fn consume_one_time_token(
        &self,
        kind: OneTimeTokenKind,
        raw: &str,
    ) -> Result<OneTimeTokenRecord, AppError> {
        self.repo
            .consume_one_time(kind, &hash_opaque_token(raw), Utc::now())
            .await
    }

    pub async fn invalidate_one_time_tokens(
        &self,
        kind: OneTimeTokenKind,
        tenant_id: &str,
        user_id: Uuid,
    ) -> Result<u64, AppError> {
        self.repo
            .invalidate_one_time_for_user(kind, tenant_id, user_id, Utc::now())
            .await
    }

    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        self.repo.purge_expired(Utc::now()).await
    }
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> AppError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AppError::ExpiredToken,
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_)
        | ErrorKind::MissingRequiredClaim(_) => AppError::MalformedToken,
        _ => AppError::InvalidToken,
    }
}

/// 32 bytes aleatórios em base64url (43 caracteres, sem padding).
pub fn generate_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 em hex: o valor guardado no banco.
pub fn hash_opaque_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryTokenRepository;

    fn settings() -> AuthSettings {
        AuthSettings {
            jwt_secret: "segredo-de-teste-com-tamanho-suficiente".into(),
            ..AuthSettings::default()
        }
    }

    fn service() -> TokenService {
        TokenService::new(Arc::new(InMemoryTokenRepository::new()), &settings())
    }

    fn snapshot() -> IdentitySnapshot {
        IdentitySnapshot {
            roles: ["ROLE_USER".to_string()].into_iter().collect(),
            permissions: ["BOOKING:READ".to_string()].into_iter().collect(),
        }
    }

    #[test]
    fn access_token_roundtrip_keeps_snapshot() {
        let service = service();
        let user_id = Uuid::new_v4();
        let issued = service
            .issue_access_token(user_id, "acme", &snapshot())
            .unwrap();

        let claims = service.validate_access_token(&issued.token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.tenant_id, "acme");
        assert_eq!(claims.jti, issued.token_id);
        assert_eq!(claims.roles, vec!["ROLE_USER".to_string()]);
        assert_eq!(claims.permissions, vec!["BOOKING:READ".to_string()]);
    }

    #[test]
    fn expired_access_token_is_reported_as_expired() {
        let service = service();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            tenant_id: "acme".into(),
            roles: vec![],
            permissions: vec![],
            iat: now - 120,
            exp: now - 60,
            jti: Uuid::new_v4(),
            iss: settings().jwt_issuer,
            typ: TokenKind::Access,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &service.encoding_key).unwrap();

        assert!(matches!(
            service.validate_access_token(&token),
            Err(AppError::ExpiredToken)
        ));
    }

    #[test]
    fn garbage_and_foreign_signatures_are_rejected() {
        let service = service();
        assert!(matches!(
            service.validate_access_token("nao-e-um-jwt"),
            Err(AppError::MalformedToken)
        ));

        let other = TokenService::new(
            Arc::new(InMemoryTokenRepository::new()),
            &AuthSettings {
                jwt_secret: "outro-segredo-qualquer".into(),
                ..AuthSettings::default()
            },
        );
        let foreign = other
            .issue_access_token(Uuid::new_v4(), "acme", &snapshot())
            .unwrap();
        assert!(matches!(
            service.validate_access_token(&foreign.token),
            Err(AppError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn refresh_token_is_not_an_access_token() {
        let service = service();
        let refresh = service
            .issue_refresh_token(Uuid::new_v4(), "acme")
            .await
            .unwrap();
        assert!(matches!(
            service.validate_access_token(&refresh.token),
            Err(AppError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn one_time_token_is_stored_hashed_and_single_use() {
        let service = service();
        let user_id = Uuid::new_v4();
        let raw = service
            .issue_one_time_token(OneTimeTokenKind::EmailVerification, "acme", user_id)
            .await
            .unwrap();
        assert_eq!(raw.len(), 43);

        // Tipo errado não encontra o token
        assert!(matches!(
            service
                .consume_one_time_token(OneTimeTokenKind::PasswordReset, &raw)
                .await,
            Err(AppError::InvalidToken)
        ));

        let record = service
            .consume_one_time_token(OneTimeTokenKind::EmailVerification, &raw)
            .await
            .unwrap();
        assert_eq!(record.user_id, user_id);
        assert_eq!(record.token_hash, hash_opaque_token(&raw));

        assert!(matches!(
            service
                .consume_one_time_token(OneTimeTokenKind::EmailVerification, &raw)
                .await,
            Err(AppError::AlreadyUsed)
        ));
    }
}
