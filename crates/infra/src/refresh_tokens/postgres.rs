//! Postgres-backed refresh-token store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | RowNotFound | N/A | `NotFound` |
//! | Other | N/A | `Backend` |
//!
//! ## Atomic rotation
//!
//! `update_atomic` is a single `UPDATE ... WHERE token = $1 AND is_revoked = $n
//! AND replaced_by_token IS NOT DISTINCT FROM $m`. Postgres row locking makes
//! the check-and-write atomic, so of two concurrent rotations exactly one
//! affects a row.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use keyward_auth::{ExpectedState, RefreshToken, RefreshTokenStore, Revocation, StoreError};
use keyward_core::UserId;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS refresh_tokens (
    token             TEXT PRIMARY KEY,
    user_id           UUID        NOT NULL,
    jwt_id            TEXT        NOT NULL,
    created_at        TIMESTAMPTZ NOT NULL,
    expires_at        TIMESTAMPTZ NOT NULL,
    created_by_ip     TEXT,
    is_revoked        BOOLEAN     NOT NULL DEFAULT FALSE,
    revoked_at        TIMESTAMPTZ,
    revoked_by_ip     TEXT,
    replaced_by_token TEXT
);
CREATE INDEX IF NOT EXISTS refresh_tokens_user_active
    ON refresh_tokens (user_id, expires_at)
    WHERE is_revoked = FALSE;
"#;

const COLUMNS: &str = "token, user_id, jwt_id, created_at, expires_at, created_by_ip, \
                       is_revoked, revoked_at, revoked_by_ip, replaced_by_token";

#[derive(Debug, Clone)]
pub struct PostgresRefreshTokenStore {
    pool: Arc<PgPool>,
}

impl PostgresRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and make sure the table exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn exists(&self, token: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM refresh_tokens WHERE token = $1)")
            .bind(token)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("exists", e))?;
        row.try_get::<bool, _>(0)
            .map_err(|e| map_sqlx_error("exists", e))
    }
}

#[async_trait]
impl RefreshTokenStore for PostgresRefreshTokenStore {
    #[instrument(skip(self, token), err)]
    async fn get_by_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM refresh_tokens WHERE token = $1"))
            .bind(token)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_by_token", e))?;

        row.map(|row| {
            RefreshTokenRow::from_row(&row)
                .map(RefreshToken::from)
                .map_err(|e| map_sqlx_error("get_by_token", e))
        })
        .transpose()
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn active_count_for_user(&self, user_id: UserId, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) FROM refresh_tokens
            WHERE user_id = $1 AND is_revoked = FALSE AND expires_at > $2
            "#,
        )
        .bind(*user_id.as_uuid())
        .bind(now)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("active_count_for_user", e))?;

        let count: i64 = row
            .try_get(0)
            .map_err(|e| map_sqlx_error("active_count_for_user", e))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn active_tokens_for_user(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshToken>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS} FROM refresh_tokens
            WHERE user_id = $1 AND is_revoked = FALSE AND expires_at > $2
            ORDER BY created_at ASC
            "#
        ))
        .bind(*user_id.as_uuid())
        .bind(now)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("active_tokens_for_user", e))?;

        rows.iter()
            .map(|row| {
                RefreshTokenRow::from_row(row)
                    .map(RefreshToken::from)
                    .map_err(|e| map_sqlx_error("active_tokens_for_user", e))
            })
            .collect()
    }

    #[instrument(skip(self, record), fields(user_id = %record.user_id), err)]
    async fn insert(&self, record: RefreshToken) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO refresh_tokens ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(&record.token)
        .bind(*record.user_id.as_uuid())
        .bind(&record.jwt_id)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(&record.created_by_ip)
        .bind(record.is_revoked)
        .bind(record.revoked_at)
        .bind(&record.revoked_by_ip)
        .bind(&record.replaced_by_token)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert", e))?;
        Ok(())
    }

    #[instrument(skip(self, record, expected), fields(user_id = %record.user_id), err)]
    async fn update_atomic(&self, record: &RefreshToken, expected: &ExpectedState) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = $2,
                revoked_at = $3,
                revoked_by_ip = $4,
                replaced_by_token = $5
            WHERE token = $1
              AND is_revoked = $6
              AND replaced_by_token IS NOT DISTINCT FROM $7
            "#,
        )
        .bind(&record.token)
        .bind(record.is_revoked)
        .bind(record.revoked_at)
        .bind(&record.revoked_by_ip)
        .bind(&record.replaced_by_token)
        .bind(expected.is_revoked)
        .bind(&expected.replaced_by_token)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_atomic", e))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        if self.exists(&record.token).await? {
            Err(StoreError::Conflict(
                "refresh token changed since it was read".to_string(),
            ))
        } else {
            Err(StoreError::NotFound)
        }
    }

    #[instrument(skip(self, revocation), fields(user_id = %user_id), err)]
    async fn revoke_all(&self, user_id: UserId, revocation: &Revocation) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = TRUE,
                revoked_at = $2,
                revoked_by_ip = $3
            WHERE user_id = $1 AND is_revoked = FALSE AND expires_at > $2
            "#,
        )
        .bind(*user_id.as_uuid())
        .bind(revocation.at)
        .bind(&revocation.by_ip)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("revoke_all", e))?;

        Ok(result.rows_affected())
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}

#[derive(Debug)]
struct RefreshTokenRow {
    token: String,
    user_id: Uuid,
    jwt_id: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    created_by_ip: Option<String>,
    is_revoked: bool,
    revoked_at: Option<DateTime<Utc>>,
    revoked_by_ip: Option<String>,
    replaced_by_token: Option<String>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for RefreshTokenRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(RefreshTokenRow {
            token: row.try_get("token")?,
            user_id: row.try_get("user_id")?,
            jwt_id: row.try_get("jwt_id")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
            created_by_ip: row.try_get("created_by_ip")?,
            is_revoked: row.try_get("is_revoked")?,
            revoked_at: row.try_get("revoked_at")?,
            revoked_by_ip: row.try_get("revoked_by_ip")?,
            replaced_by_token: row.try_get("replaced_by_token")?,
        })
    }
}

impl From<RefreshTokenRow> for RefreshToken {
    fn from(row: RefreshTokenRow) -> Self {
        RefreshToken {
            token: row.token,
            user_id: UserId::from_uuid(row.user_id),
            jwt_id: row.jwt_id,
            created_at: row.created_at,
            expires_at: row.expires_at,
            created_by_ip: row.created_by_ip,
            is_revoked: row.is_revoked,
            revoked_at: row.revoked_at,
            revoked_by_ip: row.revoked_by_ip,
            replaced_by_token: row.replaced_by_token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert_eq!(map_sqlx_error("get", sqlx::Error::RowNotFound), StoreError::NotFound);
    }

    #[test]
    fn pool_closed_maps_to_backend() {
        let err = map_sqlx_error("insert", sqlx::Error::PoolClosed);
        assert!(matches!(err, StoreError::Backend(msg) if msg.starts_with("insert")));
    }

    #[test]
    fn row_converts_into_record() {
        let now = Utc::now();
        let user = Uuid::now_v7();
        let record = RefreshToken::from(RefreshTokenRow {
            token: "t".to_string(),
            user_id: user,
            jwt_id: "j".to_string(),
            created_at: now,
            expires_at: now,
            created_by_ip: None,
            is_revoked: true,
            revoked_at: Some(now),
            revoked_by_ip: Some("::1".to_string()),
            replaced_by_token: Some("t2".to_string()),
        });
        assert_eq!(*record.user_id.as_uuid(), user);
        assert!(record.is_revoked);
        assert_eq!(record.replaced_by_token.as_deref(), Some("t2"));
    }
}
