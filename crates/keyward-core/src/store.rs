//! Storage contracts for users and refresh tokens
//!
//! All reads and writes belonging to one credential operation run against a
//! single [`StoreTransaction`]. Nothing is visible to other transactions until
//! [`StoreTransaction::commit`] succeeds; dropping an uncommitted transaction
//! discards every change made through it.

use async_trait::async_trait;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{NewUser, RefreshToken, User};

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A user with this e-mail already exists
    #[error("email already registered")]
    DuplicateEmail,

    /// A refresh token with this value already exists
    #[error("refresh token value already exists")]
    DuplicateToken,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// User persistence
#[async_trait]
pub trait UserStore: Send {
    async fn exists_by_email(&mut self, email: &str) -> Result<bool, StoreError>;

    async fn find_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user(&mut self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Persist a new user and return it with its assigned identity.
    ///
    /// Fails with [`StoreError::DuplicateEmail`] if the e-mail is taken.
    async fn save_user(&mut self, user: NewUser) -> Result<User, StoreError>;
}

/// Refresh token persistence
#[async_trait]
pub trait RefreshTokenStore: Send {
    /// Insert a new token record.
    ///
    /// Fails with [`StoreError::DuplicateToken`] if the value already exists;
    /// an existing record is never overwritten.
    async fn save_token(&mut self, token: &RefreshToken) -> Result<(), StoreError>;

    async fn find_by_token(&mut self, token: &str) -> Result<Option<RefreshToken>, StoreError>;

    /// Remove the record with this value; absent values are not an error
    async fn delete_token(&mut self, token: &str) -> Result<(), StoreError>;

    /// Remove every record owned by `user_id`, returning how many were removed
    async fn delete_all_for(&mut self, user_id: Uuid) -> Result<u64, StoreError>;
}

/// A unit of work spanning both stores
pub trait StoreTransaction: UserStore + RefreshTokenStore {
    /// Make every change visible atomically
    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<(), StoreError>>;
}

/// Entry point to a storage backend
#[async_trait]
pub trait Database: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// Cheap liveness probe used by readiness checks
    async fn ping(&self) -> Result<(), StoreError>;

    /// Backend name for logs and health output
    fn backend_name(&self) -> &'static str;
}
