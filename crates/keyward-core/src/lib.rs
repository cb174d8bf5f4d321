//! keyward core - Domain models, storage contracts, and shared types
//!
//! This crate defines the core abstractions used throughout keyward:
//! - User accounts and roles
//! - Refresh token records and their validity rules
//! - The injected clock used for every expiry decision
//! - Transactional storage contracts with in-memory and PostgreSQL backends
//! - Configuration management

pub mod clock;
pub mod config;
pub mod memory;
pub mod postgres;
pub mod store;

pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "test-utils"))]
pub use clock::ManualClock;
pub use config::{
    AppConfig, ConfigError, DatabaseConfig, LoggingConfig, MailConfig, PasswordHashConfig,
    ServerConfig, StorageBackend, TokensConfig,
};
pub use memory::InMemoryDatabase;
pub use postgres::PgDatabase;
pub use store::{Database, RefreshTokenStore, StoreError, StoreTransaction, UserStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Users
// ============================================================================

/// Account role
///
/// New registrations always receive `User`; `Admin` is granted out of band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }

    /// Authority name in the `ROLE_*` convention used by the HTTP layer
    pub fn authority(&self) -> &'static str {
        match self {
            Role::User => "ROLE_USER",
            Role::Admin => "ROLE_ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A persisted user account
///
/// Owned by the user store; the credential engine only reads it and creates it
/// at registration. The e-mail is the login identifier and is compared exactly
/// as stored (case-sensitive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// Argon2 PHC string; never serialized
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// A user that has not been saved yet; the store assigns the identity
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl NewUser {
    /// Attach the identity assigned by the store
    pub fn into_user(self, id: Uuid) -> User {
        User {
            id,
            email: self.email,
            password_hash: self.password_hash,
            first_name: self.first_name,
            last_name: self.last_name,
            role: self.role,
            enabled: self.enabled,
            created_at: self.created_at,
        }
    }
}

// ============================================================================
// Refresh tokens
// ============================================================================

/// Long-lived, server-side refresh credential
///
/// The `token` value is a capability: whoever presents it may mint access
/// tokens for `user_id` until it expires or is removed. `revoked` only ever
/// moves from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: Uuid,
    pub token: String,
    pub user_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl RefreshToken {
    /// Expired once `now` reaches `expires_at`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked
    }

    /// Valid iff not revoked and `now < expires_at`
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired(now)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token_expiring_at(expires_at: DateTime<Utc>) -> RefreshToken {
        RefreshToken {
            id: Uuid::new_v4(),
            token: "opaque".to_string(),
            user_id: Uuid::new_v4(),
            issued_at: expires_at - Duration::days(1),
            expires_at,
            revoked: false,
        }
    }

    #[test]
    fn test_role_conversion() {
        assert_eq!(Role::User.as_str(), "USER");
        assert_eq!(Role::Admin.authority(), "ROLE_ADMIN");
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("USER".parse::<Role>(), Ok(Role::User));
        assert!("root".parse::<Role>().is_err());
        assert_eq!(Role::default(), Role::User);
    }

    #[test]
    fn test_role_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"ADMIN\"");
    }

    #[test]
    fn test_refresh_token_expiry_boundary() {
        let expires_at = Utc::now();
        let token = token_expiring_at(expires_at);

        assert!(token.is_valid(expires_at - Duration::milliseconds(1)));
        // the expiry instant itself is already invalid
        assert!(token.is_expired(expires_at));
        assert!(!token.is_valid(expires_at));
        assert!(token.is_expired(expires_at + Duration::milliseconds(1)));
    }

    #[test]
    fn test_revoked_token_is_invalid() {
        let now = Utc::now();
        let mut token = token_expiring_at(now + Duration::hours(1));
        assert!(token.is_valid(now));

        token.revoked = true;
        assert!(token.is_revoked());
        assert!(!token.is_valid(now));
    }

    #[test]
    fn test_user_password_hash_not_serialized() {
        let user = NewUser {
            email: "a@x.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role: Role::User,
            enabled: true,
            created_at: Utc::now(),
        }
        .into_user(Uuid::new_v4());

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(!json.contains("password_hash"));
        assert_eq!(user.full_name(), "Ada Lovelace");
        assert!(!user.is_admin());
    }
}
