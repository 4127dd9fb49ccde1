// src/db/token_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::TokenRepository,
    models::token::{OneTimeTokenKind, OneTimeTokenRecord, RefreshTokenRecord},
};

#[derive(Clone)]
pub struct PgTokenRepository {
    pool: PgPool,
}

impl PgTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for PgTokenRepository {
    async fn insert_refresh(&self, record: RefreshTokenRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token_id, user_id, tenant_id, expires_at, revoked_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.token_id)
        .bind(record.user_id)
        .bind(&record.tenant_id)
        .bind(record.expires_at)
        .bind(record.revoked_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn redeem_refresh(
        &self,
        token_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, AppError> {
        // Compare-and-swap: só uma transação concorrente vê `revoked_at IS NULL`
        let redeemed = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            UPDATE refresh_tokens SET revoked_at = $2
            WHERE token_id = $1 AND revoked_at IS NULL AND expires_at > $2
            RETURNING token_id, user_id, tenant_id, expires_at, revoked_at
            "#,
        )
        .bind(token_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(record) = redeemed {
            return Ok(record);
        }

        // Perdemos a corrida ou o token não serve: descobre o motivo
        let existing = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT token_id, user_id, tenant_id, expires_at, revoked_at FROM refresh_tokens WHERE token_id = $1",
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;

        match existing {
            None => Err(AppError::InvalidToken),
            Some(record) if record.is_revoked() => Err(AppError::RevokedToken),
            Some(_) => Err(AppError::ExpiredToken),
        }
    }

    async fn revoke_refresh(&self, token_id: Uuid, now: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 WHERE token_id = $1 AND revoked_at IS NULL",
        )
        .bind(token_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_all_for_user(
        &self,
        tenant_id: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens SET revoked_at = $3
            WHERE tenant_id = $1 AND user_id = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_one_time(&self, record: OneTimeTokenRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO one_time_tokens (token_hash, kind, user_id, tenant_id, expires_at, used_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&record.token_hash)
        .bind(record.kind.as_str())
        .bind(record.user_id)
        .bind(&record.tenant_id)
        .bind(record.expires_at)
        .bind(record.used_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_one_time(
        &self,
        kind: OneTimeTokenKind,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<OneTimeTokenRecord, AppError> {
        let consumed = sqlx::query_as::<_, OneTimeTokenRecord>(
            r#"
            UPDATE one_time_tokens SET used_at = $3
            WHERE token_hash = $1 AND kind = $2 AND used_at IS NULL AND expires_at > $3
            RETURNING token_hash, kind, user_id, tenant_id, expires_at, used_at
            "#,
        )
        .bind(token_hash)
        .bind(kind.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(record) = consumed {
            return Ok(record);
        }

        let existing = sqlx::query_as::<_, OneTimeTokenRecord>(
            r#"
            SELECT token_hash, kind, user_id, tenant_id, expires_at, used_at
            FROM one_time_tokens WHERE token_hash = $1 AND kind = $2
            "#,
        )
        .bind(token_hash)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match existing {
            None => Err(AppError::InvalidToken),
            Some(record) if record.used_at.is_some() => Err(AppError::AlreadyUsed),
            Some(_) => Err(AppError::ExpiredToken),
        }
    }

    async fn invalidate_one_time_for_user(
        &self,
        kind: OneTimeTokenKind,
        tenant_id: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE one_time_tokens SET used_at = $4
            WHERE kind = $1 AND tenant_id = $2 AND user_id = $3 AND used_at IS NULL
            "#,
        )
        .bind(kind.as_str())
        .bind(tenant_id)
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        // As duas limpezas na mesma transação
        let mut tx = self.pool.begin().await?;

        let refresh = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&mut *tx)
            .await?;
        let one_time = sqlx::query("DELETE FROM one_time_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(refresh.rows_affected() + one_time.rows_affected())
    }
}
