//! Credential lifecycle engine
//!
//! - `signing`: HMAC key material
//! - `jwt`: stateless access tokens
//! - `refresh`: opaque, persisted refresh tokens
//! - `password`: Argon2id hashing behind [`PasswordVerifier`]
//! - `notify`: best-effort user notifications
//! - `service`: the register/login/refresh/logout orchestrator
//! - `middleware`: bearer authentication for protected routes

pub mod jwt;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod password;
pub mod refresh;
pub mod service;
pub mod signing;

pub use jwt::{AccessTokenCodec, Claims, JwtError};
pub use middleware::{auth_middleware, require_role, AuthenticatedUser, BearerError};
pub use models::{
    AuthResponse, LoginRequest, MessageResponse, RefreshRequest, RegisterRequest, Registration,
    UserProfile,
};
pub use notify::{notifier_from_config, LogNotifier, NotificationHook, NotifyError, SmtpNotifier};
pub use password::{Argon2Verifier, PasswordConfig, PasswordError, PasswordVerifier};
pub use refresh::{RefreshTokenError, RefreshTokenLifecycle};
pub use service::{AuthError, AuthService};
pub use signing::{generate_secret, KeyError, SigningKey};
