//! JWT token generation and validation
//!
//! Implements stateless access tokens with HMAC-SHA256 signing. The payload
//! carries the subject (login e-mail), issuer, issue time and expiry; nothing
//! else. Expiry is checked against the injected [`Clock`], not the wall clock
//! inside `jsonwebtoken`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, Header, Validation};
use keyward_core::Clock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::signing::SigningKey;

/// JWT Claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - user's login e-mail
    pub sub: String,
    /// Issued at (Unix seconds, truncated)
    pub iat: i64,
    /// Expiration (Unix seconds, rounded up so a token never expires before
    /// `issued_at + ttl`)
    pub exp: i64,
}

/// Access token failures
///
/// Verification never panics on hostile input; every rejection is one of
/// `Malformed`, `SignatureInvalid` or `Expired`.
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token format")]
    Malformed,

    #[error("Invalid token signature")]
    SignatureInvalid,

    #[error("Token has expired")]
    Expired,

    #[error("Token lifetime {0} overflows the representable time range")]
    ExpiryOutOfRange(Duration),
}

/// Issues and verifies access tokens
#[derive(Clone)]
pub struct AccessTokenCodec {
    key: SigningKey,
    issuer: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl AccessTokenCodec {
    pub fn new(
        key: SigningKey,
        issuer: impl Into<String>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            key,
            issuer: issuer.into(),
            ttl,
            clock,
        }
    }

    /// Configured access token lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Issue a token for `subject` with the configured lifetime
    pub fn issue(&self, subject: &str) -> Result<String, JwtError> {
        self.issue_with_ttl(subject, self.ttl)
    }

    /// Issue a token for `subject` valid from now until now + `ttl`
    pub fn issue_with_ttl(&self, subject: &str, ttl: Duration) -> Result<String, JwtError> {
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or(JwtError::ExpiryOutOfRange(ttl))?;

        let claims = Claims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: ceil_seconds(expires_at),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            self.key.encoding_key(),
        )?;

        Ok(token)
    }

    /// Verify signature, issuer and expiry, returning the claims
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss"]);

        let token_data = decode::<Claims>(token, self.key.decoding_key(), &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => JwtError::SignatureInvalid,
                _ => JwtError::Malformed,
            })?;

        if self.clock.now().timestamp() >= token_data.claims.exp {
            return Err(JwtError::Expired);
        }

        Ok(token_data.claims)
    }
}

fn ceil_seconds(instant: DateTime<Utc>) -> i64 {
    let secs = instant.timestamp();
    if instant.timestamp_subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

impl std::fmt::Debug for AccessTokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenCodec")
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
