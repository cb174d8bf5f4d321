//! PostgreSQL storage backend
//!
//! Each [`StoreTransaction`] wraps one `sqlx` transaction. Token inserts run
//! inside a savepoint so a unique-violation on the token value can be retried
//! without aborting the surrounding transaction.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Acquire, FromRow, Postgres, Transaction};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::store::{Database, RefreshTokenStore, StoreError, StoreTransaction, UserStore};
use crate::{NewUser, RefreshToken, Role, User};

/// PostgreSQL-backed database
#[derive(Debug, Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Open a connection pool
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.postgres_url)
            .await?;

        tracing::info!(pool_size = config.pool_size, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

/// User row from database
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    role: String,
    enabled: bool,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let role = match row.role.as_str() {
            "ADMIN" => Role::Admin,
            _ => Role::User,
        };

        User {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            role,
            enabled: row.enabled,
            created_at: row.created_at,
        }
    }
}

/// Refresh token row from database
#[derive(Debug, FromRow)]
struct RefreshTokenRow {
    id: Uuid,
    token: String,
    user_id: Uuid,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    revoked: bool,
}

impl From<RefreshTokenRow> for RefreshToken {
    fn from(row: RefreshTokenRow) -> Self {
        RefreshToken {
            id: row.id,
            token: row.token,
            user_id: row.user_id,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            revoked: row.revoked,
        }
    }
}

struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

const USER_COLUMNS: &str =
    "id, email, password_hash, first_name, last_name, role, enabled, created_at";

#[async_trait]
impl UserStore for PgTransaction {
    async fn exists_by_email(&mut self, email: &str) -> Result<bool, StoreError> {
        let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
            .bind(email)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(row.0)
    }

    async fn find_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
                .bind(email)
                .fetch_optional(&mut *self.tx)
                .await?;

        Ok(row.map(User::from))
    }

    async fn find_user(&mut self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;

        Ok(row.map(User::from))
    }

    async fn save_user(&mut self, user: NewUser) -> Result<User, StoreError> {
        let id = Uuid::new_v4();
        let result = sqlx::query(
            r#"
            INSERT INTO users (
                id, email, password_hash, first_name, last_name, role, enabled, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.as_str())
        .bind(user.enabled)
        .bind(user.created_at)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(user.into_user(id)),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateEmail)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl RefreshTokenStore for PgTransaction {
    async fn save_token(&mut self, token: &RefreshToken) -> Result<(), StoreError> {
        let mut savepoint = Acquire::begin(&mut self.tx).await?;

        let result = sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, token, user_id, issued_at, expires_at, revoked)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token.id)
        .bind(&token.token)
        .bind(token.user_id)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .bind(token.revoked)
        .execute(&mut *savepoint)
        .await;

        match result {
            Ok(_) => {
                savepoint.commit().await?;
                Ok(())
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                savepoint.rollback().await?;
                Err(StoreError::DuplicateToken)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_token(&mut self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        let row: Option<RefreshTokenRow> = sqlx::query_as(
            r#"
            SELECT id, token, user_id, issued_at, expires_at, revoked
            FROM refresh_tokens
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(RefreshToken::from))
    }

    async fn delete_token(&mut self, token: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(token)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn delete_all_for(&mut self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }
}

impl StoreTransaction for PgTransaction {
    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<(), StoreError>> {
        Box::pin(async move {
            self.tx.commit().await?;
            Ok(())
        })
    }
}
