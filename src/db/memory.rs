// src/db/memory.rs
//
// Repositórios em memória, usados quando `DATABASE_URL` não está definida
// e nos testes. Cada operação é uma única seção crítica curta, sem I/O
// enquanto o lock está seguro.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{RbacRepository, TokenRepository, UserRepository},
    models::{
        auth::{NewUser, User},
        rbac::{full_permission_name, NewPermission, NewRole, Permission, Role, RoleGrant},
        token::{OneTimeTokenKind, OneTimeTokenRecord, RefreshTokenRecord},
    },
};

// ---
// Credential Store
// ---

#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, tenant_id: &str, id: Uuid, apply: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut User) + Send,
    {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .filter(|u| u.tenant_id == tenant_id)
            .ok_or(AppError::NotFound("Usuário"))?;
        apply(user);
        user.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError> {
        // Verificação e inserção sob o mesmo lock de escrita
        let mut users = self.users.write().await;

        let same_tenant = users.values().filter(|u| u.tenant_id == new_user.tenant_id);
        for existing in same_tenant {
            if existing.username == new_user.username {
                return Err(AppError::DuplicateUsername);
            }
            if existing.email == new_user.email {
                return Err(AppError::DuplicateEmail);
            }
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            tenant_id: new_user.tenant_id,
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            preferred_language: new_user.preferred_language,
            timezone: new_user.timezone,
            email_verified: false,
            is_active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, tenant_id: &str, id: Uuid) -> Result<Option<User>, AppError> {
        let users = self.users.read().await;
        Ok(users.get(&id).filter(|u| u.tenant_id == tenant_id).cloned())
    }

    async fn find_by_username(
        &self,
        tenant_id: &str,
        username: &str,
    ) -> Result<Option<User>, AppError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.tenant_id == tenant_id && u.username == username)
            .cloned())
    }

    async fn find_by_email(&self, tenant_id: &str, email: &str) -> Result<Option<User>, AppError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.tenant_id == tenant_id && u.email == email)
            .cloned())
    }

    async fn touch_last_login(
        &self,
        tenant_id: &str,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.update(tenant_id, id, |u| u.last_login_at = Some(at)).await
    }

    async fn mark_email_verified(&self, tenant_id: &str, id: Uuid) -> Result<(), AppError> {
        self.update(tenant_id, id, |u| u.email_verified = true).await
    }

    async fn update_password(
        &self,
        tenant_id: &str,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), AppError> {
        let hash = password_hash.to_owned();
        self.update(tenant_id, id, move |u| u.password_hash = hash).await
    }

    async fn set_active(&self, tenant_id: &str, id: Uuid, active: bool) -> Result<(), AppError> {
        self.update(tenant_id, id, |u| u.is_active = active).await
    }
}

// ---
// RBAC Model
// ---

#[derive(Debug, Default)]
struct RbacState {
    roles: HashMap<Uuid, Role>,
    permissions: HashMap<Uuid, Permission>,
    // Coleções de ligação explícitas: (tenant, role, permission) e (tenant, user, role)
    role_permissions: HashSet<(String, Uuid, Uuid)>,
    user_roles: HashSet<(String, Uuid, Uuid)>,
}

impl RbacState {
    fn role_in_tenant(&self, tenant_id: &str, role_id: Uuid) -> Result<&Role, AppError> {
        match self.roles.get(&role_id) {
            Some(role) if role.tenant_id == tenant_id => Ok(role),
            Some(_) => Err(AppError::CrossTenantReference),
            None => Err(AppError::NotFound("Cargo")),
        }
    }

    fn permission_in_tenant(
        &self,
        tenant_id: &str,
        permission_id: Uuid,
    ) -> Result<&Permission, AppError> {
        match self.permissions.get(&permission_id) {
            Some(p) if p.tenant_id == tenant_id => Ok(p),
            Some(_) => Err(AppError::CrossTenantReference),
            None => Err(AppError::NotFound("Permissão")),
        }
    }

    fn permissions_for_role(&self, tenant_id: &str, role_id: Uuid) -> Vec<Permission> {
        let mut permissions: Vec<Permission> = self
            .role_permissions
            .iter()
            .filter(|(t, r, _)| t == tenant_id && *r == role_id)
            .filter_map(|(_, _, p)| self.permissions.get(p).cloned())
            .collect();
        permissions.sort_by(|a, b| a.name.cmp(&b.name));
        permissions
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRbacRepository {
    state: RwLock<RbacState>,
}

impl InMemoryRbacRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RbacRepository for InMemoryRbacRepository {
    async fn create_role(&self, tenant_id: &str, role: NewRole) -> Result<Role, AppError> {
        let mut state = self.state.write().await;
        if state
            .roles
            .values()
            .any(|r| r.tenant_id == tenant_id && r.name == role.name)
        {
            return Err(AppError::DuplicateRole);
        }

        let now = Utc::now();
        let role = Role {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_owned(),
            name: role.name,
            description: role.description,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn create_permission(
        &self,
        tenant_id: &str,
        permission: NewPermission,
    ) -> Result<Permission, AppError> {
        let mut state = self.state.write().await;
        let full_name = full_permission_name(&permission.resource, &permission.action);
        if state.permissions.values().any(|p| {
            p.tenant_id == tenant_id && (p.name == permission.name || p.full_name() == full_name)
        }) {
            return Err(AppError::DuplicatePermission);
        }

        let now = Utc::now();
        let permission = Permission {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_owned(),
            name: permission.name,
            resource: permission.resource,
            action: permission.action,
            description: permission.description,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }

    async fn find_role_by_name(
        &self,
        tenant_id: &str,
        name: &str,
    ) -> Result<Option<Role>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .roles
            .values()
            .find(|r| r.tenant_id == tenant_id && r.name == name)
            .cloned())
    }

    async fn find_permissions_by_full_names(
        &self,
        tenant_id: &str,
        full_names: &[String],
    ) -> Result<Vec<Permission>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .permissions
            .values()
            .filter(|p| p.tenant_id == tenant_id && full_names.contains(&p.full_name()))
            .cloned()
            .collect())
    }

    async fn list_roles(&self, tenant_id: &str) -> Result<Vec<Role>, AppError> {
        let state = self.state.read().await;
        let mut roles: Vec<Role> = state
            .roles
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn list_permissions(&self, tenant_id: &str) -> Result<Vec<Permission>, AppError> {
        let state = self.state.read().await;
        let mut permissions: Vec<Permission> = state
            .permissions
            .values()
            .filter(|p| p.tenant_id == tenant_id)
            .cloned()
            .collect();
        permissions.sort_by(|a, b| (&a.resource, &a.action).cmp(&(&b.resource, &b.action)));
        Ok(permissions)
    }

    async fn permissions_for_role(
        &self,
        tenant_id: &str,
        role_id: Uuid,
    ) -> Result<Vec<Permission>, AppError> {
        let state = self.state.read().await;
        state.role_in_tenant(tenant_id, role_id)?;
        Ok(state.permissions_for_role(tenant_id, role_id))
    }

    async fn assign_permission(
        &self,
        tenant_id: &str,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.role_in_tenant(tenant_id, role_id)?;
        state.permission_in_tenant(tenant_id, permission_id)?;
        state
            .role_permissions
            .insert((tenant_id.to_owned(), role_id, permission_id));
        Ok(())
    }

    async fn assign_role(
        &self,
        tenant_id: &str,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.role_in_tenant(tenant_id, role_id)?;
        state
            .user_roles
            .insert((tenant_id.to_owned(), user_id, role_id));
        Ok(())
    }

    async fn set_role_active(
        &self,
        tenant_id: &str,
        role_id: Uuid,
        active: bool,
    ) -> Result<Role, AppError> {
        let mut state = self.state.write().await;
        state.role_in_tenant(tenant_id, role_id)?;
        let role = state
            .roles
            .get_mut(&role_id)
            .ok_or(AppError::NotFound("Cargo"))?;
        role.is_active = active;
        role.updated_at = Utc::now();
        Ok(role.clone())
    }

    async fn set_permission_active(
        &self,
        tenant_id: &str,
        permission_id: Uuid,
        active: bool,
    ) -> Result<Permission, AppError> {
        let mut state = self.state.write().await;
        state.permission_in_tenant(tenant_id, permission_id)?;
        let permission = state
            .permissions
            .get_mut(&permission_id)
            .ok_or(AppError::NotFound("Permissão"))?;
        permission.is_active = active;
        permission.updated_at = Utc::now();
        Ok(permission.clone())
    }

    async fn grants_for_user(
        &self,
        tenant_id: &str,
        user_id: Uuid,
    ) -> Result<Vec<RoleGrant>, AppError> {
        let state = self.state.read().await;
        let mut grants: Vec<RoleGrant> = state
            .user_roles
            .iter()
            .filter(|(t, u, _)| t == tenant_id && *u == user_id)
            .filter_map(|(_, _, role_id)| state.roles.get(role_id))
            .map(|role| RoleGrant {
                role: role.clone(),
                permissions: state.permissions_for_role(tenant_id, role.id),
            })
            .collect();
        grants.sort_by(|a, b| a.role.name.cmp(&b.role.name));
        Ok(grants)
    }
}

// ---
// Revocation store + tokens de uso único
// ---

#[derive(Debug, Default)]
pub struct InMemoryTokenRepository {
    refresh: Mutex<HashMap<Uuid, RefreshTokenRecord>>,
    one_time: Mutex<HashMap<String, OneTimeTokenRecord>>,
}

impl InMemoryTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenRepository for InMemoryTokenRepository {
    async fn insert_refresh(&self, record: RefreshTokenRecord) -> Result<(), AppError> {
        self.refresh.lock().await.insert(record.token_id, record);
        Ok(())
    }

    async fn redeem_refresh(
        &self,
        token_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, AppError> {
        let mut refresh = self.refresh.lock().await;
        let record = refresh.get_mut(&token_id).ok_or(AppError::InvalidToken)?;

        if record.is_revoked() {
            return Err(AppError::RevokedToken);
        }
        if record.expires_at <= now {
            return Err(AppError::ExpiredToken);
        }

        record.revoked_at = Some(now);
        Ok(record.clone())
    }

    async fn revoke_refresh(&self, token_id: Uuid, now: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(record) = self.refresh.lock().await.get_mut(&token_id) {
            record.revoked_at.get_or_insert(now);
        }
        Ok(())
    }

    async fn revoke_all_for_user(
        &self,
        tenant_id: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut refresh = self.refresh.lock().await;
        let mut revoked = 0;
        for record in refresh
            .values_mut()
            .filter(|r| r.tenant_id == tenant_id && r.user_id == user_id && !r.is_revoked())
        {
            record.revoked_at = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn insert_one_time(&self, record: OneTimeTokenRecord) -> Result<(), AppError> {
        self.one_time
            .lock()
            .await
            .insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn consume_one_time(
        &self,
        kind: OneTimeTokenKind,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<OneTimeTokenRecord, AppError> {
        let mut one_time = self.one_time.lock().await;
        let record = one_time
            .get_mut(token_hash)
            .filter(|r| r.kind == kind)
            .ok_or(AppError::InvalidToken)?;

        if record.used_at.is_some() {
            return Err(AppError::AlreadyUsed);
        }
        if record.expires_at <= now {
            return Err(AppError::ExpiredToken);
        }

        record.used_at = Some(now);
        Ok(record.clone())
    }

    async fn invalidate_one_time_for_user(
        &self,
        kind: OneTimeTokenKind,
        tenant_id: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut one_time = self.one_time.lock().await;
        let mut invalidated = 0;
        for record in one_time.values_mut().filter(|r| {
            r.kind == kind && r.tenant_id == tenant_id && r.user_id == user_id && r.used_at.is_none()
        }) {
            record.used_at = Some(now);
            invalidated += 1;
        }
        Ok(invalidated)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut purged = 0;

        let mut refresh = self.refresh.lock().await;
        let before = refresh.len();
        refresh.retain(|_, r| r.expires_at > now);
        purged += (before - refresh.len()) as u64;
        drop(refresh);

        let mut one_time = self.one_time.lock().await;
        let before = one_time.len();
        one_time.retain(|_, r| r.expires_at > now);
        purged += (before - one_time.len()) as u64;

        Ok(purged)
    }
}
