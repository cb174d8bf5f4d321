//! Refresh token lifecycle
//!
//! A refresh token is `Active` until it either expires (detected lazily, when
//! it is next presented) or is revoked. Both states are terminal. Every
//! operation takes the caller's transaction so the orchestrator decides what
//! commits together.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Duration;
use keyward_core::{Clock, RefreshToken, RefreshTokenStore, StoreError};
use rand::RngCore;
use thiserror::Error;
use uuid::Uuid;

/// Entropy of a generated token value
const TOKEN_BYTES: usize = 32;

/// Attempts before giving up on finding an unused token value
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Refresh token failures
#[derive(Debug, Error)]
pub enum RefreshTokenError {
    #[error("Refresh token not found")]
    NotFound,

    #[error("Refresh token has expired")]
    Expired,

    #[error("Refresh token has been revoked")]
    Revoked,

    #[error("No unused refresh token value after {0} attempts")]
    Exhausted(u32),

    #[error("Refresh token lifetime {0} overflows the representable time range")]
    ExpiryOutOfRange(Duration),

    #[error(transparent)]
    Store(#[from] StoreError),
}

type TokenGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Creates, validates and invalidates refresh tokens
#[derive(Clone)]
pub struct RefreshTokenLifecycle {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
    generate: TokenGenerator,
}

impl RefreshTokenLifecycle {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            generate: Arc::new(random_token_value),
        }
    }

    /// Replace the value generator
    pub fn with_generator(
        mut self,
        generate: impl Fn() -> String + Send + Sync + 'static,
    ) -> Self {
        self.generate = Arc::new(generate);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Persist a fresh token for `user_id`.
    ///
    /// A value collision is retried with a new value; the existing row is never
    /// overwritten.
    pub async fn create<S>(
        &self,
        store: &mut S,
        user_id: Uuid,
    ) -> Result<RefreshToken, RefreshTokenError>
    where
        S: RefreshTokenStore + ?Sized,
    {
        for attempt in 1..=self.max_attempts {
            let issued_at = self.clock.now();
            let expires_at = issued_at
                .checked_add_signed(self.ttl)
                .ok_or(RefreshTokenError::ExpiryOutOfRange(self.ttl))?;
            let token = RefreshToken {
                id: Uuid::new_v4(),
                token: (self.generate)(),
                user_id,
                issued_at,
                expires_at,
                revoked: false,
            };

            match store.save_token(&token).await {
                Ok(()) => return Ok(token),
                Err(StoreError::DuplicateToken) => {
                    tracing::warn!(attempt, "Refresh token value collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RefreshTokenError::Exhausted(self.max_attempts))
    }

    /// Exact-match lookup
    pub async fn find<S>(
        &self,
        store: &mut S,
        value: &str,
    ) -> Result<Option<RefreshToken>, RefreshTokenError>
    where
        S: RefreshTokenStore + ?Sized,
    {
        Ok(store.find_by_token(value).await?)
    }

    /// Check that `token` is still usable.
    ///
    /// An expired token is deleted before `Expired` is returned.
    pub async fn verify_active<S>(
        &self,
        store: &mut S,
        token: RefreshToken,
    ) -> Result<RefreshToken, RefreshTokenError>
    where
        S: RefreshTokenStore + ?Sized,
    {
        if token.is_expired(self.clock.now()) {
            store.delete_token(&token.token).await?;
            return Err(RefreshTokenError::Expired);
        }

        if token.is_revoked() {
            return Err(RefreshTokenError::Revoked);
        }

        Ok(token)
    }

    /// Invalidate every token owned by `user_id`
    pub async fn revoke_all_for<S>(
        &self,
        store: &mut S,
        user_id: Uuid,
    ) -> Result<u64, RefreshTokenError>
    where
        S: RefreshTokenStore + ?Sized,
    {
        Ok(store.delete_all_for(user_id).await?)
    }

    /// Invalidate one token; already-removed values are fine
    pub async fn revoke<S>(
        &self,
        store: &mut S,
        token: &RefreshToken,
    ) -> Result<(), RefreshTokenError>
    where
        S: RefreshTokenStore + ?Sized,
    {
        Ok(store.delete_token(&token.token).await?)
    }
}

impl std::fmt::Debug for RefreshTokenLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTokenLifecycle")
            .field("ttl", &self.ttl)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

/// 256 random bits, URL-safe base64 without padding
pub fn random_token_value() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
