//! Application state management

use std::sync::Arc;
use std::time::Instant;

use keyward_core::{
    AppConfig, Clock, Database, InMemoryDatabase, PgDatabase, StorageBackend, StoreError,
};
use thiserror::Error;
use tracing::info;

use crate::auth::jwt::AccessTokenCodec;
use crate::auth::notify::{notifier_from_config, NotificationHook, NotifyError};
use crate::auth::password::{Argon2Verifier, PasswordConfig, PasswordError};
use crate::auth::refresh::RefreshTokenLifecycle;
use crate::auth::service::AuthService;
use crate::auth::signing::{KeyError, SigningKey};

/// Failures while wiring the application together
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Invalid signing key: {0}")]
    Key(#[from] KeyError),

    #[error("Invalid password hashing parameters: {0}")]
    Password(#[from] PasswordError),

    #[error("Notification setup failed: {0}")]
    Notify(#[from] NotifyError),

    #[error("Storage setup failed: {0}")]
    Store(#[from] StoreError),

    #[error("DATABASE_URL is required for the postgres storage backend")]
    MissingDatabaseUrl,
}

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Credential lifecycle engine
    pub auth: AuthService,
    /// Storage backend, also pinged by the readiness probe
    pub db: Arc<dyn Database>,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Assemble state from already-built collaborators
    pub fn with_parts(
        config: AppConfig,
        db: Arc<dyn Database>,
        notifier: Arc<dyn NotificationHook>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StartupError> {
        let key = SigningKey::from_base64(&config.tokens.secret)?;
        let codec = AccessTokenCodec::new(
            key,
            config.tokens.issuer.clone(),
            config.tokens.access_token_ttl(),
            Arc::clone(&clock),
        );
        let refresh_tokens =
            RefreshTokenLifecycle::new(config.tokens.refresh_token_ttl(), Arc::clone(&clock));
        let passwords = Argon2Verifier::new(&PasswordConfig::from(&config.password))?;

        let auth = AuthService::new(
            Arc::clone(&db),
            Arc::new(passwords),
            notifier,
            codec,
            refresh_tokens,
            clock,
        );

        Ok(Self {
            config,
            auth,
            db,
            start_time: Instant::now(),
        })
    }

    /// Build state for the configured storage backend and mail settings
    pub async fn build(config: AppConfig, clock: Arc<dyn Clock>) -> Result<Self, StartupError> {
        let db: Arc<dyn Database> = match config.database.backend {
            StorageBackend::Memory => {
                info!("Using in-memory storage; data is lost on restart");
                Arc::new(InMemoryDatabase::new())
            }
            StorageBackend::Postgres => {
                if config.database.postgres_url.trim().is_empty() {
                    return Err(StartupError::MissingDatabaseUrl);
                }
                let pg = PgDatabase::connect(&config.database).await?;
                if config.database.run_migrations {
                    pg.migrate().await?;
                }
                Arc::new(pg)
            }
        };

        let notifier = notifier_from_config(&config.mail)?;
        Self::with_parts(config, db, notifier, clock)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, RecordingNotifier};
    use keyward_core::SystemClock;

    #[test]
    fn test_with_parts_rejects_short_secret() {
        let mut config = test_config();
        config.tokens.secret = "c2hvcnQ=".to_string();

        let result = AppState::with_parts(
            config,
            Arc::new(InMemoryDatabase::new()),
            Arc::new(RecordingNotifier::default()),
            Arc::new(SystemClock),
        );
        assert!(matches!(result, Err(StartupError::Key(_))));
    }

    #[tokio::test]
    async fn test_build_memory_backend() {
        let state = AppState::build(test_config(), Arc::new(SystemClock))
            .await
            .unwrap();

        assert_eq!(state.db.backend_name(), "memory");
        assert!(state.db.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_build_postgres_requires_url() {
        let mut config = test_config();
        config.database.backend = StorageBackend::Postgres;
        config.database.postgres_url = String::new();

        let result = AppState::build(config, Arc::new(SystemClock)).await;
        assert!(matches!(result, Err(StartupError::MissingDatabaseUrl)));
    }
}
