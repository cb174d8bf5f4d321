//! Test doubles and fixtures shared by unit and integration tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use keyward_core::{
    AppConfig, Database, InMemoryDatabase, ManualClock, NewUser, RefreshToken, RefreshTokenStore,
    StoreError, StoreTransaction, User, UserStore,
};
use uuid::Uuid;

use crate::auth::notify::{NotificationHook, NotifyError};
use crate::auth::password::PasswordConfig;
use crate::state::AppState;

/// A notification captured by [`RecordingNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    ExistingEmail { email: String },
    Welcome { email: String, first_name: String },
}

impl Notification {
    pub fn is_existing_email(&self, address: &str) -> bool {
        matches!(self, Notification::ExistingEmail { email } if email == address)
    }

    pub fn is_welcome(&self, address: &str) -> bool {
        matches!(self, Notification::Welcome { email, .. } if email == address)
    }
}

/// Records every notification instead of sending it
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Notifications are dispatched on spawned tasks; poll until `count` arrived
    pub async fn wait_for(&self, count: usize) -> Vec<Notification> {
        for _ in 0..200 {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.sent()
    }

    fn record(&self, notification: Notification) {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification);
    }
}

#[async_trait]
impl NotificationHook for RecordingNotifier {
    async fn notify_existing_email(&self, email: &str) -> Result<(), NotifyError> {
        self.record(Notification::ExistingEmail {
            email: email.to_string(),
        });
        Ok(())
    }

    async fn notify_welcome(&self, email: &str, first_name: &str) -> Result<(), NotifyError> {
        self.record(Notification::Welcome {
            email: email.to_string(),
            first_name: first_name.to_string(),
        });
        Ok(())
    }
}

/// Every delivery fails
#[derive(Debug, Default)]
pub struct FailingNotifier;

#[async_trait]
impl NotificationHook for FailingNotifier {
    async fn notify_existing_email(&self, _email: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("relay unreachable".to_string()))
    }

    async fn notify_welcome(&self, _email: &str, _first_name: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("relay unreachable".to_string()))
    }
}

/// In-memory database whose refresh token inserts fail
#[derive(Debug, Clone, Default)]
pub struct TokenWriteFailingDatabase {
    inner: InMemoryDatabase,
}

impl TokenWriteFailingDatabase {
    pub fn new(inner: InMemoryDatabase) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Database for TokenWriteFailingDatabase {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(TokenWriteFailingTransaction {
            inner: self.inner.begin().await?,
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }

    fn backend_name(&self) -> &'static str {
        "token-write-failing"
    }
}

struct TokenWriteFailingTransaction {
    inner: Box<dyn StoreTransaction>,
}

#[async_trait]
impl UserStore for TokenWriteFailingTransaction {
    async fn exists_by_email(&mut self, email: &str) -> Result<bool, StoreError> {
        self.inner.exists_by_email(email).await
    }

    async fn find_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        self.inner.find_by_email(email).await
    }

    async fn find_user(&mut self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.inner.find_user(id).await
    }

    async fn save_user(&mut self, user: NewUser) -> Result<User, StoreError> {
        self.inner.save_user(user).await
    }
}

#[async_trait]
impl RefreshTokenStore for TokenWriteFailingTransaction {
    async fn save_token(&mut self, _token: &RefreshToken) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("refresh token table offline".to_string()))
    }

    async fn find_by_token(&mut self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        self.inner.find_by_token(token).await
    }

    async fn delete_token(&mut self, token: &str) -> Result<(), StoreError> {
        self.inner.delete_token(token).await
    }

    async fn delete_all_for(&mut self, user_id: Uuid) -> Result<u64, StoreError> {
        self.inner.delete_all_for(user_id).await
    }
}

impl StoreTransaction for TokenWriteFailingTransaction {
    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<(), StoreError>> {
        let TokenWriteFailingTransaction { inner } = *self;
        inner.commit()
    }
}

/// Argon2 costs low enough for tests
pub fn light_password_config() -> PasswordConfig {
    PasswordConfig {
        memory_cost: 1024,
        time_cost: 1,
        parallelism: 1,
        output_len: Some(32),
    }
}

/// Default configuration with cheap password hashing
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.password.memory_cost = 1024;
    config.password.time_cost = 1;
    config.password.parallelism = 1;
    config
}

/// Application state over an in-memory store, a manual clock and a recording notifier
pub struct TestApp {
    pub db: InMemoryDatabase,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub state: Arc<AppState>,
}

impl TestApp {
    pub fn new() -> Self {
        let db = InMemoryDatabase::new();
        Self::with_database(db.clone(), Arc::new(db))
    }

    /// Serve `database` while keeping `db` for direct inspection
    pub fn with_database(db: InMemoryDatabase, database: Arc<dyn Database>) -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::starting_now());
        let state = AppState::with_parts(test_config(), database, notifier.clone(), clock.clone())
            .unwrap_or_else(|e| panic!("test state: {e}"));

        Self {
            db,
            clock,
            notifier,
            state: Arc::new(state),
        }
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}
