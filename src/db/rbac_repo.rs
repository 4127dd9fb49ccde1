// src/db/rbac_repo.rs

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::RbacRepository,
    models::rbac::{NewPermission, NewRole, Permission, Role, RoleGrant},
};

const ROLE_COLUMNS: &str = "id, tenant_id, name, description, is_active, created_at, updated_at";
const PERMISSION_COLUMNS: &str =
    "id, tenant_id, name, resource, action, description, is_active, created_at, updated_at";

// Linha do JOIN cargo -> permissão
#[derive(FromRow)]
struct RolePermissionRow {
    role_id: Uuid,
    #[sqlx(flatten)]
    permission: Permission,
}

#[derive(Clone)]
pub struct PgRbacRepository {
    pool: PgPool,
}

impl PgRbacRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// As ligações usam FKs compostas (tenant_id, id): uma violação de FK
// significa que o alvo não existe naquele tenant.
fn map_link_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_foreign_key_violation() {
            return AppError::CrossTenantReference;
        }
    }
    e.into()
}

#[async_trait]
impl RbacRepository for PgRbacRepository {
    // 1. Criar o Cargo
    async fn create_role(&self, tenant_id: &str, role: NewRole) -> Result<Role, AppError> {
        let sql = format!(
            "INSERT INTO roles (id, tenant_id, name, description) VALUES ($1, $2, $3, $4) \
             RETURNING {ROLE_COLUMNS}"
        );
        sqlx::query_as::<_, Role>(&sql)
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(&role.name)
            .bind(&role.description)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db_err) = &e {
                    if db_err.is_unique_violation() {
                        return AppError::DuplicateRole;
                    }
                }
                e.into()
            })
    }

    async fn create_permission(
        &self,
        tenant_id: &str,
        permission: NewPermission,
    ) -> Result<Permission, AppError> {
        let sql = format!(
            "INSERT INTO permissions (id, tenant_id, name, resource, action, description) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {PERMISSION_COLUMNS}"
        );
        sqlx::query_as::<_, Permission>(&sql)
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(&permission.name)
            .bind(&permission.resource)
            .bind(&permission.action)
            .bind(&permission.description)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db_err) = &e {
                    if db_err.is_unique_violation() {
                        return AppError::DuplicatePermission;
                    }
                }
                e.into()
            })
    }

    async fn find_role_by_name(
        &self,
        tenant_id: &str,
        name: &str,
    ) -> Result<Option<Role>, AppError> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE tenant_id = $1 AND name = $2");
        let role = sqlx::query_as::<_, Role>(&sql)
            .bind(tenant_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role)
    }

    // 2. Resolve nomes completos ("BOOKING:READ") para as permissões do tenant
    async fn find_permissions_by_full_names(
        &self,
        tenant_id: &str,
        full_names: &[String],
    ) -> Result<Vec<Permission>, AppError> {
        let sql = format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions \
             WHERE tenant_id = $1 AND (resource || ':' || action) = ANY($2)"
        );
        let permissions = sqlx::query_as::<_, Permission>(&sql)
            .bind(tenant_id)
            .bind(full_names)
            .fetch_all(&self.pool)
            .await?;
        Ok(permissions)
    }

    async fn list_roles(&self, tenant_id: &str) -> Result<Vec<Role>, AppError> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE tenant_id = $1 ORDER BY name");
        let roles = sqlx::query_as::<_, Role>(&sql)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(roles)
    }

    async fn list_permissions(&self, tenant_id: &str) -> Result<Vec<Permission>, AppError> {
        let sql = format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE tenant_id = $1 \
             ORDER BY resource, action"
        );
        let permissions = sqlx::query_as::<_, Permission>(&sql)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(permissions)
    }

    async fn permissions_for_role(
        &self,
        tenant_id: &str,
        role_id: Uuid,
    ) -> Result<Vec<Permission>, AppError> {
        let permissions = sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.id, p.tenant_id, p.name, p.resource, p.action, p.description,
                   p.is_active, p.created_at, p.updated_at
            FROM role_permissions rp
            JOIN permissions p ON p.tenant_id = rp.tenant_id AND p.id = rp.permission_id
            WHERE rp.tenant_id = $1 AND rp.role_id = $2
            ORDER BY p.name
            "#,
        )
        .bind(tenant_id)
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(permissions)
    }

    // 3. Vincular Cargo <-> Permissão
    async fn assign_permission(
        &self,
        tenant_id: &str,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO role_permissions (tenant_id, role_id, permission_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(tenant_id)
        .bind(role_id)
        .bind(permission_id)
        .execute(&self.pool)
        .await
        .map_err(map_link_error)?;
        Ok(())
    }

    async fn assign_role(
        &self,
        tenant_id: &str,
        user_id: Uuid,
        role_id: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO user_roles (tenant_id, user_id, role_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(role_id)
        .execute(&self.pool)
        .await
        .map_err(map_link_error)?;
        Ok(())
    }

    async fn set_role_active(
        &self,
        tenant_id: &str,
        role_id: Uuid,
        active: bool,
    ) -> Result<Role, AppError> {
        let sql = format!(
            "UPDATE roles SET is_active = $3, updated_at = now() \
             WHERE tenant_id = $1 AND id = $2 RETURNING {ROLE_COLUMNS}"
        );
        sqlx::query_as::<_, Role>(&sql)
            .bind(tenant_id)
            .bind(role_id)
            .bind(active)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound("Cargo"))
    }

    async fn set_permission_active(
        &self,
        tenant_id: &str,
        permission_id: Uuid,
        active: bool,
    ) -> Result<Permission, AppError> {
        let sql = format!(
            "UPDATE permissions SET is_active = $3, updated_at = now() \
             WHERE tenant_id = $1 AND id = $2 RETURNING {PERMISSION_COLUMNS}"
        );
        sqlx::query_as::<_, Permission>(&sql)
            .bind(tenant_id)
            .bind(permission_id)
            .bind(active)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::NotFound("Permissão"))
    }

    async fn grants_for_user(
        &self,
        tenant_id: &str,
        user_id: Uuid,
    ) -> Result<Vec<RoleGrant>, AppError> {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT r.id, r.tenant_id, r.name, r.description, r.is_active, r.created_at, r.updated_at
            FROM user_roles ur
            JOIN roles r ON r.tenant_id = ur.tenant_id AND r.id = ur.role_id
            WHERE ur.tenant_id = $1 AND ur.user_id = $2
            ORDER BY r.name
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        if roles.is_empty() {
            return Ok(Vec::new());
        }

        let role_ids: Vec<Uuid> = roles.iter().map(|r| r.id).collect();
        let rows = sqlx::query_as::<_, RolePermissionRow>(
            r#"
            SELECT rp.role_id,
                   p.id, p.tenant_id, p.name, p.resource, p.action, p.description,
                   p.is_active, p.created_at, p.updated_at
            FROM role_permissions rp
            JOIN permissions p ON p.tenant_id = rp.tenant_id AND p.id = rp.permission_id
            WHERE rp.tenant_id = $1 AND rp.role_id = ANY($2)
            ORDER BY p.name
            "#,
        )
        .bind(tenant_id)
        .bind(&role_ids)
        .fetch_all(&self.pool)
        .await?;

        let grants = roles
            .into_iter()
            .map(|role| {
                let permissions = rows
                    .iter()
                    .filter(|row| row.role_id == role.id)
                    .map(|row| row.permission.clone())
                    .collect();
                RoleGrant { role, permissions }
            })
            .collect();
        Ok(grants)
    }
}
