// src/services/auth.rs

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::{AuthSettings, BootstrapAdmin},
    db::UserRepository,
    models::{
        auth::{
            AuthResponse, IdentitySnapshot, LoginUserPayload, NewUser, RegisterUserPayload, User,
            UserDto, VerifiedIdentity,
        },
        token::{OneTimeTokenKind, TokenPair},
    },
    services::{
        notifier::{Notification, Notifier},
        password::{hash_password, verify_password, PasswordPolicy},
        rbac_service::{RbacService, ROLE_ADMIN},
        token_service::{IdentitySource, TokenService},
    },
};

// Senha usada só para gerar o hash "fantasma" de usuários inexistentes
const DUMMY_PASSWORD: &str = "tenant-auth-dummy-password";

/// Resultado de register / login / refresh.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub tokens: TokenPair,
    pub user: Option<UserDto>,
}

impl AuthSession {
    pub fn into_response(self, expires_in_millis: i64) -> AuthResponse {
        AuthResponse {
            access_token: self.tokens.access.token,
            refresh_token: self.tokens.refresh.token,
            token_type: "Bearer",
            expires_in: expires_in_millis,
            user: self.user,
            tenant_id: self.tokens.tenant_id,
        }
    }
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    rbac: RbacService,
    tokens: TokenService,
    notifier: Arc<dyn Notifier>,
    policy: PasswordPolicy,
    bcrypt_cost: u32,
    require_verified_email: bool,
    bootstrap_admins: Arc<[BootstrapAdmin]>,
    dummy_hash: Arc<str>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        rbac: RbacService,
        tokens: TokenService,
        notifier: Arc<dyn Notifier>,
        settings: &AuthSettings,
    ) -> Result<Self, AppError> {
        // Calculado uma vez: o login de usuário inexistente gasta o mesmo tempo
        let dummy_hash = bcrypt::hash(DUMMY_PASSWORD, settings.bcrypt_cost)?;

        Ok(Self {
            users,
            rbac,
            tokens,
            notifier,
            policy: PasswordPolicy {
                min_length: settings.min_password_length,
            },
            bcrypt_cost: settings.bcrypt_cost,
            require_verified_email: settings.require_verified_email,
            bootstrap_admins: Arc::from(settings.bootstrap_admins.clone()),
            dummy_hash: Arc::from(dummy_hash),
        })
    }

    #[tracing::instrument(skip_all, fields(%tenant_id))]
    pub async fn register(
        &self,
        tenant_id: &str,
        payload: RegisterUserPayload,
    ) -> Result<AuthSession, AppError> {
        payload.validate()?;

        // 1. Normalização e política de senha
        let username = payload.username.trim().to_owned();
        let email = payload.email.trim().to_lowercase();
        self.policy.check(&payload.password)?;

        // 2. Hashing (fora do executor)
        let password_hash = hash_password(&payload.password, self.bcrypt_cost).await?;

        // 3. Cargos padrão do tenant antes do usuário existir; o cargo
        // padrão precisa existir antes de qualquer escrita no usuário
        self.rbac.ensure_tenant_defaults(tenant_id).await?;
        let default_role = self
            .rbac
            .find_role(tenant_id, self.rbac.default_role())
            .await?;
        let bootstrap_admin = self
            .bootstrap_admins
            .iter()
            .any(|admin| admin.matches(tenant_id, &username));

        // 4. Cria o usuário (unicidade atômica por tenant)
        let user = self
            .users
            .create_user(NewUser {
                tenant_id: tenant_id.to_owned(),
                username,
                email,
                password_hash,
                first_name: payload.first_name.trim().to_owned(),
                last_name: payload.last_name.trim().to_owned(),
                preferred_language: payload.preferred_language,
                timezone: payload.timezone,
            })
            .await?;

        // 5. Cargo padrão e, se configurado, o administrador inicial
        self.rbac
            .assign_role(tenant_id, user.id, &default_role.name)
            .await?;
        if bootstrap_admin {
            self.rbac.assign_role(tenant_id, user.id, ROLE_ADMIN).await?;
            tracing::warn!(user_id = %user.id, "Administrador inicial do tenant registrado");
        }

        // 6. Verificação de e-mail vai para a fila
        let token = self
            .tokens
            .issue_one_time_token(OneTimeTokenKind::EmailVerification, tenant_id, user.id)
            .await?;
        self.notifier.dispatch(Notification::EmailVerification {
            tenant_id: tenant_id.to_owned(),
            user_id: user.id,
            email: user.email.clone(),
            token,
        });

        tracing::info!(user_id = %user.id, "Usuário registrado");
        self.open_session(user).await
    }

    /// `identifier` aceita o nome de usuário ou o e-mail.
    #[tracing::instrument(skip_all, fields(%tenant_id))]
    pub async fn login(
        &self,
        tenant_id: &str,
        payload: LoginUserPayload,
    ) -> Result<AuthSession, AppError> {
        payload.validate()?;
        let identifier = payload.username.trim();

        let user = match self.users.find_by_username(tenant_id, identifier).await? {
            Some(user) => Some(user),
            None => {
                self.users
                    .find_by_email(tenant_id, &identifier.to_lowercase())
                    .await?
            }
        };

        let Some(mut user) = user else {
            // Mesmo custo de bcrypt para não revelar se o usuário existe
            verify_password(&payload.password, &self.dummy_hash).await?;
            return Err(AppError::InvalidCredentials);
        };

        if !verify_password(&payload.password, &user.password_hash).await? {
            tracing::debug!(user_id = %user.id, "Senha incorreta");
            return Err(AppError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(AppError::AccountInactive);
        }
        if self.require_verified_email && !user.email_verified {
            return Err(AppError::EmailUnverified);
        }

        let now = Utc::now();
        self.users.touch_last_login(tenant_id, user.id, now).await?;
        user.last_login_at = Some(now);

        self.open_session(user).await
    }

    async fn open_session(&self, user: User) -> Result<AuthSession, AppError> {
        let snapshot = self.rbac.snapshot_for_user(&user.tenant_id, user.id).await?;
        let tokens = self
            .tokens
            .issue_pair(user.id, &user.tenant_id, &snapshot)
            .await?;
        Ok(AuthSession {
            tokens,
            user: Some(UserDto::new(&user, snapshot.roles)),
        })
    }

    /// Gira o refresh token. O novo access token reflete os cargos atuais.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, AppError> {
        let tokens = self.tokens.redeem_refresh_token(refresh_token, self).await?;
        Ok(AuthSession { tokens, user: None })
    }

    pub async fn logout(&self, refresh_token: &str) -> Result<(), AppError> {
        self.tokens.revoke_refresh_token(refresh_token).await
    }

    pub async fn verify_email(&self, token: &str) -> Result<(), AppError> {
        let record = self
            .tokens
            .consume_one_time_token(OneTimeTokenKind::EmailVerification, token)
            .await?;
        self.users
            .mark_email_verified(&record.tenant_id, record.user_id)
            .await?;
        tracing::info!(user_id = %record.user_id, tenant_id = %record.tenant_id, "E-mail verificado");
        Ok(())
    }

    /// Silencioso para e-mails desconhecidos.
    pub async fn forgot_password(&self, tenant_id: &str, email: &str) -> Result<(), AppError> {
        let email = email.trim().to_lowercase();
        let Some(user) = self.users.find_by_email(tenant_id, &email).await? else {
            tracing::debug!(%tenant_id, "Pedido de redefinição para e-mail desconhecido");
            return Ok(());
        };
        if !user.is_active {
            return Ok(());
        }

        // Um pedido novo invalida os anteriores
        self.tokens
            .invalidate_one_time_tokens(OneTimeTokenKind::PasswordReset, tenant_id, user.id)
            .await?;
        let token = self
            .tokens
            .issue_one_time_token(OneTimeTokenKind::PasswordReset, tenant_id, user.id)
            .await?;

        self.notifier.dispatch(Notification::PasswordReset {
            tenant_id: tenant_id.to_owned(),
            user_id: user.id,
            email: user.email,
            token,
        });
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AppError> {
        // A política vem antes: senha fraca não queima o token
        self.policy.check(new_password)?;

        let record = self
            .tokens
            .consume_one_time_token(OneTimeTokenKind::PasswordReset, token)
            .await?;

        let password_hash = hash_password(new_password, self.bcrypt_cost).await?;
        self.users
            .update_password(&record.tenant_id, record.user_id, &password_hash)
            .await?;

        let revoked = self
            .tokens
            .revoke_all_for_user(&record.tenant_id, record.user_id)
            .await?;
        tracing::info!(user_id = %record.user_id, revoked, "Senha redefinida, sessões encerradas");
        Ok(())
    }

    /// Desativação lógica: o usuário nunca é apagado.
    pub async fn deactivate_user(&self, tenant_id: &str, user_id: Uuid) -> Result<(), AppError> {
        self.users.set_active(tenant_id, user_id, false).await?;
        let revoked = self.tokens.revoke_all_for_user(tenant_id, user_id).await?;
        tracing::info!(%tenant_id, %user_id, revoked, "Usuário desativado");
        Ok(())
    }

    pub async fn current_user(&self, identity: &VerifiedIdentity) -> Result<UserDto, AppError> {
        let user = self
            .users
            .find_by_id(&identity.tenant_id, identity.user_id)
            .await?
            .ok_or(AppError::NotFound("Usuário"))?;
        Ok(UserDto::new(&user, identity.roles.clone()))
    }
}

#[async_trait]
impl IdentitySource for AuthService {
    async fn snapshot(&self, tenant_id: &str, user_id: Uuid) -> Result<IdentitySnapshot, AppError> {
        let user = self
            .users
            .find_by_id(tenant_id, user_id)
            .await?
            .ok_or(AppError::InvalidToken)?;
        if !user.is_active {
            return Err(AppError::AccountInactive);
        }
        self.rbac.snapshot_for_user(tenant_id, user_id).await
    }
}
