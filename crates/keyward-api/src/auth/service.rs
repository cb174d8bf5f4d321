//! Authentication service layer
//!
//! The four credential operations (register, login, refresh, logout) plus
//! bearer authentication for protected routes. Each operation runs in one
//! store transaction; nothing it changes is visible unless the whole operation
//! succeeds.

use std::sync::Arc;

use keyward_core::{
    Clock, Database, NewUser, RefreshTokenStore, Role, StoreError, User, UserStore,
};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

use super::jwt::{AccessTokenCodec, JwtError};
use super::models::{
    validation_message, AuthResponse, LoginRequest, RefreshRequest, RegisterRequest, Registration,
};
use super::notify::NotificationHook;
use super::password::{PasswordError, PasswordVerifier};
use super::refresh::{RefreshTokenError, RefreshTokenLifecycle};

/// Plaintext hashed once to equalize unknown-user login timing
const DUMMY_PASSWORD: &str = "keyward-dummy-password";

/// Credential operation failures
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown e-mail or wrong password; deliberately indistinguishable
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Refresh token not found")]
    TokenNotFound,

    #[error("Refresh token has expired")]
    TokenExpired,

    #[error("Refresh token has been revoked")]
    TokenRevoked,

    #[error("Invalid access token: {0}")]
    AccessToken(#[from] JwtError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage failure: {0}")]
    Store(#[from] StoreError),

    #[error("Password hashing failure: {0}")]
    Password(#[from] PasswordError),

    #[error("Could not allocate a refresh token after {0} attempts")]
    TokenSpaceExhausted(u32),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Failures of a collaborator rather than of the caller's input
    pub fn is_infrastructure(&self) -> bool {
        match self {
            AuthError::Store(_)
            | AuthError::Password(_)
            | AuthError::TokenSpaceExhausted(_)
            | AuthError::Internal(_) => true,
            AuthError::AccessToken(e) => {
                matches!(e, JwtError::Encoding(_) | JwtError::ExpiryOutOfRange(_))
            }
            _ => false,
        }
    }
}

impl From<RefreshTokenError> for AuthError {
    fn from(err: RefreshTokenError) -> Self {
        match err {
            RefreshTokenError::NotFound => AuthError::TokenNotFound,
            RefreshTokenError::Expired => AuthError::TokenExpired,
            RefreshTokenError::Revoked => AuthError::TokenRevoked,
            RefreshTokenError::Exhausted(n) => AuthError::TokenSpaceExhausted(n),
            e @ RefreshTokenError::ExpiryOutOfRange(_) => AuthError::Internal(e.to_string()),
            RefreshTokenError::Store(e) => AuthError::Store(e),
        }
    }
}

/// Authentication service
pub struct AuthService {
    db: Arc<dyn Database>,
    passwords: Arc<dyn PasswordVerifier>,
    notifier: Arc<dyn NotificationHook>,
    codec: AccessTokenCodec,
    refresh_tokens: RefreshTokenLifecycle,
    clock: Arc<dyn Clock>,
    dummy_hash: OnceCell<String>,
}

impl AuthService {
    pub fn new(
        db: Arc<dyn Database>,
        passwords: Arc<dyn PasswordVerifier>,
        notifier: Arc<dyn NotificationHook>,
        codec: AccessTokenCodec,
        refresh_tokens: RefreshTokenLifecycle,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            passwords,
            notifier,
            codec,
            refresh_tokens,
            clock,
            dummy_hash: OnceCell::new(),
        }
    }

    pub fn codec(&self) -> &AccessTokenCodec {
        &self.codec
    }

    /// Register a new account.
    ///
    /// An already-registered e-mail yields [`Registration::Deferred`] after
    /// notifying the existing owner; no error reveals that the account exists.
    #[instrument(skip_all, name = "auth.register")]
    pub async fn register(&self, request: RegisterRequest) -> Result<Registration, AuthError> {
        validate(&request)?;
        let RegisterRequest {
            email,
            password,
            first_name,
            last_name,
        } = request;

        // Hash before branching so both outcomes pay the same cost
        let password_hash = self.hash_password(password).await?;

        let mut tx = self.db.begin().await?;

        if tx.exists_by_email(&email).await? {
            drop(tx);
            return Ok(self.defer_registration(email));
        }

        let new_user = NewUser {
            email: email.clone(),
            password_hash,
            first_name,
            last_name,
            role: Role::User,
            enabled: true,
            created_at: self.clock.now(),
        };

        let user = match tx.save_user(new_user).await {
            Ok(user) => user,
            // Lost a race with a concurrent registration
            Err(StoreError::DuplicateEmail) => {
                drop(tx);
                return Ok(self.defer_registration(email));
            }
            Err(e) => return Err(e.into()),
        };

        let response = self.issue_tokens(&mut *tx, &user).await?;
        tx.commit().await?;

        info!(user_id = %user.id, "New user registered");
        self.dispatch_welcome(user.email.clone(), user.first_name.clone());

        Ok(Registration::Issued {
            user: Box::new(user),
            tokens: response,
        })
    }

    /// Authenticate with e-mail and password, superseding earlier refresh tokens
    #[instrument(skip_all, name = "auth.login")]
    pub async fn login(&self, request: LoginRequest) -> Result<(User, AuthResponse), AuthError> {
        validate(&request)?;

        let user = {
            let mut tx = self.db.begin().await?;
            tx.find_by_email(&request.email).await?
        };

        let Some(user) = user else {
            let dummy = self.dummy_hash().await?;
            let _ = self.check_password(request.password, dummy).await?;
            return Err(AuthError::InvalidCredentials);
        };

        if !self
            .check_password(request.password, user.password_hash.clone())
            .await?
        {
            return Err(AuthError::InvalidCredentials);
        }

        if !user.enabled {
            return Err(AuthError::AccountDisabled);
        }

        let mut tx = self.db.begin().await?;
        let revoked = self.refresh_tokens.revoke_all_for(&mut *tx, user.id).await?;
        let response = self.issue_tokens(&mut *tx, &user).await?;
        tx.commit().await?;

        info!(user_id = %user.id, revoked, "User logged in");
        Ok((user, response))
    }

    /// Mint a new access token from a refresh token.
    ///
    /// The refresh token itself is echoed back unchanged.
    #[instrument(skip_all, name = "auth.refresh")]
    pub async fn refresh(
        &self,
        request: RefreshRequest,
    ) -> Result<(User, AuthResponse), AuthError> {
        validate(&request)?;
        let mut tx = self.db.begin().await?;

        let token = self
            .refresh_tokens
            .find(&mut *tx, &request.refresh_token)
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        let token = match self.refresh_tokens.verify_active(&mut *tx, token).await {
            Ok(token) => token,
            Err(RefreshTokenError::Expired) => {
                // keep the lazy deletion
                tx.commit().await?;
                return Err(AuthError::TokenExpired);
            }
            Err(e) => return Err(e.into()),
        };

        let user = tx
            .find_user(token.user_id)
            .await?
            .ok_or(AuthError::TokenNotFound)?;
        drop(tx);

        if !user.enabled {
            return Err(AuthError::AccountDisabled);
        }

        let access_token = self.codec.issue(&user.email)?;
        debug!(user_id = %user.id, "Access token refreshed");

        let response = AuthResponse::bearer(access_token, token.token, self.expires_in());
        Ok((user, response))
    }

    /// Invalidate a refresh token. Unknown values succeed.
    #[instrument(skip_all, name = "auth.logout")]
    pub async fn logout(&self, request: RefreshRequest) -> Result<Option<uuid::Uuid>, AuthError> {
        validate(&request)?;
        let mut tx = self.db.begin().await?;

        let Some(token) = self
            .refresh_tokens
            .find(&mut *tx, &request.refresh_token)
            .await?
        else {
            return Ok(None);
        };

        self.refresh_tokens.revoke(&mut *tx, &token).await?;
        tx.commit().await?;

        info!(user_id = %token.user_id, "User logged out, refresh token deleted");
        Ok(Some(token.user_id))
    }

    /// Resolve a bearer access token to an enabled user
    pub async fn authenticate(&self, access_token: &str) -> Result<User, AuthError> {
        let claims = self.codec.verify(access_token)?;

        let user = {
            let mut tx = self.db.begin().await?;
            tx.find_by_email(&claims.sub).await?
        };

        match user {
            Some(user) if user.enabled => Ok(user),
            Some(_) => Err(AuthError::AccountDisabled),
            None => Err(AuthError::InvalidCredentials),
        }
    }

    async fn issue_tokens<S>(&self, tx: &mut S, user: &User) -> Result<AuthResponse, AuthError>
    where
        S: RefreshTokenStore + ?Sized,
    {
        let refresh_token = self.refresh_tokens.create(tx, user.id).await?;
        let access_token = self.codec.issue(&user.email)?;

        Ok(AuthResponse::bearer(
            access_token,
            refresh_token.token,
            self.expires_in(),
        ))
    }

    fn expires_in(&self) -> u64 {
        u64::try_from(self.codec.ttl().num_milliseconds()).unwrap_or(0)
    }

    fn defer_registration(&self, email: String) -> Registration {
        info!("Registration attempt with existing email");
        self.dispatch_existing_email(email);
        Registration::Deferred
    }

    fn dispatch_existing_email(&self, email: String) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.notify_existing_email(&email).await {
                warn!(error = %e, "Failed to send existing-email notification");
            }
        });
    }

    fn dispatch_welcome(&self, email: String, first_name: String) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.notify_welcome(&email, &first_name).await {
                warn!(error = %e, "Failed to send welcome notification");
            }
        });
    }

    async fn hash_password(&self, plaintext: String) -> Result<String, AuthError> {
        let passwords = Arc::clone(&self.passwords);
        let hash = tokio::task::spawn_blocking(move || passwords.hash(&plaintext))
            .await
            .map_err(|e| AuthError::Internal(format!("hashing task failed: {e}")))??;
        Ok(hash)
    }

    async fn check_password(
        &self,
        plaintext: String,
        verifier: String,
    ) -> Result<bool, AuthError> {
        let passwords = Arc::clone(&self.passwords);
        let matches = tokio::task::spawn_blocking(move || passwords.check(&plaintext, &verifier))
            .await
            .map_err(|e| AuthError::Internal(format!("verification task failed: {e}")))??;
        Ok(matches)
    }

    async fn dummy_hash(&self) -> Result<String, AuthError> {
        let hash = self
            .dummy_hash
            .get_or_try_init(|| self.hash_password(DUMMY_PASSWORD.to_string()))
            .await?;
        Ok(hash.clone())
    }
}

fn validate<T: Validate>(request: &T) -> Result<(), AuthError> {
    request
        .validate()
        .map_err(|e| AuthError::Validation(validation_message(&e)))
}
