// src/db/user_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::UserRepository,
    models::auth::{NewUser, User},
};

const USER_COLUMNS: &str = "id, tenant_id, username, email, password_hash, first_name, last_name, \
     preferred_language, timezone, email_verified, is_active, last_login_at, created_at, updated_at";

// O repositório de usuários, responsável por todas as interações com a tabela 'users'
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(
        &self,
        filter: &str,
        tenant_id: &str,
        value: &str,
    ) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE tenant_id = $1 AND {filter} = $2");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(tenant_id)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    fn expect_one_row(result: sqlx::postgres::PgQueryResult) -> Result<(), AppError> {
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Usuário"));
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    // Cria um novo usuário no banco de dados.
    // As constraints únicas por tenant garantem a unicidade mesmo com
    // registros concorrentes.
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError> {
        let sql = format!(
            r#"
            INSERT INTO users (
                id, tenant_id, username, email, password_hash,
                first_name, last_name, preferred_language, timezone
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {USER_COLUMNS}
            "#
        );

        sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new_user.tenant_id)
            .bind(&new_user.username)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .bind(&new_user.first_name)
            .bind(&new_user.last_name)
            .bind(&new_user.preferred_language)
            .bind(&new_user.timezone)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db_err) = &e {
                    if db_err.is_unique_violation() {
                        match db_err.constraint() {
                            Some("users_tenant_username_key") => return AppError::DuplicateUsername,
                            Some("users_tenant_email_key") => return AppError::DuplicateEmail,
                            _ => {}
                        }
                    }
                }
                e.into()
            })
    }

    async fn find_by_id(&self, tenant_id: &str, id: Uuid) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE tenant_id = $1 AND id = $2");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_username(
        &self,
        tenant_id: &str,
        username: &str,
    ) -> Result<Option<User>, AppError> {
        self.find_one("username", tenant_id, username).await
    }

    async fn find_by_email(&self, tenant_id: &str, email: &str) -> Result<Option<User>, AppError> {
        self.find_one("email", tenant_id, email).await
    }

    async fn touch_last_login(
        &self,
        tenant_id: &str,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE users SET last_login_at = $3, updated_at = now() WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Self::expect_one_row(result)
    }

    async fn mark_email_verified(&self, tenant_id: &str, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE users SET email_verified = true, updated_at = now() WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Self::expect_one_row(result)
    }

    async fn update_password(
        &self,
        tenant_id: &str,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $3, updated_at = now() WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Self::expect_one_row(result)
    }

    async fn set_active(&self, tenant_id: &str, id: Uuid, active: bool) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE users SET is_active = $3, updated_at = now() WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(id)
        .bind(active)
        .execute(&self.pool)
        .await?;
        Self::expect_one_row(result)
    }
}
