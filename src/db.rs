// src/db.rs
//
// Contratos de persistência. Os serviços só conhecem estes traits; o
// motor (Postgres ou memória) é escolhido no `AppState`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        auth::{NewUser, User},
        rbac::{NewPermission, NewRole, Permission, Role, RoleGrant},
        token::{OneTimeTokenKind, OneTimeTokenRecord, RefreshTokenRecord},
    },
};

pub mod memory;
pub mod rbac_repo;
pub mod token_repo;
pub mod user_repo;

pub use memory::{InMemoryRbacRepository, InMemoryTokenRepository, InMemoryUserRepository};
pub use rbac_repo::PgRbacRepository;
pub use token_repo::PgTokenRepository;
pub use user_repo::PgUserRepository;

/// Credential Store: identidades, credenciais e o tenant de cada usuário.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Unicidade de (tenant, username) e (tenant, email) é garantida de
    /// forma atômica: `DuplicateUsername` / `DuplicateEmail`.
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError>;

    async fn find_by_id(&self, tenant_id: &str, id: Uuid) -> Result<Option<User>, AppError>;

    async fn find_by_username(&self, tenant_id: &str, username: &str)
    -> Result<Option<User>, AppError>;

    async fn find_by_email(&self, tenant_id: &str, email: &str) -> Result<Option<User>, AppError>;

    async fn touch_last_login(
        &self,
        tenant_id: &str,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn mark_email_verified(&self, tenant_id: &str, id: Uuid) -> Result<(), AppError>;

    async fn update_password(
        &self,
        tenant_id: &str,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), AppError>;

    async fn set_active(&self, tenant_id: &str, id: Uuid, active: bool) -> Result<(), AppError>;
}

/// RBAC Model: cargos, permissões e as coleções de ligação, sempre com o
/// tenant dos dois lados.
#[async_trait]
pub trait RbacRepository: Send + Sync {
    async fn create_role(&self, tenant_id: &str, role: NewRole) -> Result<Role, AppError>;

    async fn create_permission(
        &self,
        tenant_id: &str,
        permission: NewPermission,
    ) -> Result<Permission, AppError>;

    async fn find_role_by_name(&self, tenant_id: &str, name: &str)
    -> Result<Option<Role>, AppError>;

    /// Resolve nomes completos (`RESOURCE:ACTION`) para permissões do tenant.
    async fn find_permissions_by_full_names(
        &self,
        tenant_id: &str,
        full_names: &[String],
    ) -> Result<Vec<Permission>, AppError>;

    async fn list_roles(&self, tenant_id: &str) -> Result<Vec<Role>, AppError>;

    async fn list_permissions(&self, tenant_id: &str) -> Result<Vec<Permission>, AppError>;

    async fn permissions_for_role(
        &self,
        tenant_id: &str,
        role_id: Uuid,
    ) -> Result<Vec<Permission>, AppError>;

    /// Liga cargo e permissão. Idempotente; `CrossTenantReference` quando
    /// algum dos lados pertence a outro tenant.
    async fn assign_permission(
        &self,
        tenant_id: &str,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), AppError>;

    /// Liga usuário e cargo. O tenant do usuário é verificado pelo serviço.
    async fn assign_role(&self, tenant_id: &str, user_id: Uuid, role_id: Uuid)
    -> Result<(), AppError>;

    async fn set_role_active(
        &self,
        tenant_id: &str,
        role_id: Uuid,
        active: bool,
    ) -> Result<Role, AppError>;

    async fn set_permission_active(
        &self,
        tenant_id: &str,
        permission_id: Uuid,
        active: bool,
    ) -> Result<Permission, AppError>;

    /// Todos os cargos do usuário (ativos ou não) com suas permissões.
    async fn grants_for_user(&self, tenant_id: &str, user_id: Uuid)
    -> Result<Vec<RoleGrant>, AppError>;
}

/// Revocation store dos refresh tokens e armazenamento dos tokens de uso
/// único.
#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn insert_refresh(&self, record: RefreshTokenRecord) -> Result<(), AppError>;

    /// Compare-and-revoke atômico: exatamente um chamador concorrente
    /// recebe o registro; os demais recebem `RevokedToken`.
    async fn redeem_refresh(
        &self,
        token_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, AppError>;

    /// Idempotente: revogar um token já revogado ou desconhecido não falha.
    async fn revoke_refresh(&self, token_id: Uuid, now: DateTime<Utc>) -> Result<(), AppError>;

    async fn revoke_all_for_user(
        &self,
        tenant_id: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError>;

    async fn insert_one_time(&self, record: OneTimeTokenRecord) -> Result<(), AppError>;

    /// Consome o token: `InvalidToken` se não existe, `AlreadyUsed` se já
    /// foi usado, `ExpiredToken` se venceu.
    async fn consume_one_time(
        &self,
        kind: OneTimeTokenKind,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<OneTimeTokenRecord, AppError>;

    /// Marca como usados os tokens pendentes do usuário para esse tipo.
    async fn invalidate_one_time_for_user(
        &self,
        kind: OneTimeTokenKind,
        tenant_id: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError>;

    /// Remove registros vencidos. Devolve quantos foram apagados.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}
