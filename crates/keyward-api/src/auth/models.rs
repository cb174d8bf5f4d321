//! Request and response types for the credential operations

use chrono::{DateTime, Utc};
use keyward_core::{Role, User};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// The only thing a caller learns about a registration that did not issue tokens
pub const REGISTRATION_PENDING_MESSAGE: &str =
    "Registration request processed. If this email is valid, you will receive a confirmation email.";

/// Token type reported in every [`AuthResponse`]
pub const TOKEN_TYPE: &str = "Bearer";

/// User registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Email should be valid"))]
    pub email: String,
    #[validate(length(min = 6, max = 128, message = "Password must be between 6 and 128 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,
}

/// User login request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Email should be valid"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Refresh or logout request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// Authentication response with tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Always "Bearer"
    pub token_type: String,
    /// Access token lifetime in milliseconds
    pub expires_in: u64,
}

impl AuthResponse {
    pub fn bearer(access_token: String, refresh_token: String, expires_in: u64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: TOKEN_TYPE.to_string(),
            expires_in,
        }
    }
}

/// Outcome of a registration
///
/// `Deferred` covers the e-mail-already-exists case; callers must render it
/// exactly like any other non-issuing outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Issued {
        user: Box<User>,
        tokens: AuthResponse,
    },
    Deferred,
}

/// Generic registration acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn registration_pending() -> Self {
        Self {
            message: REGISTRATION_PENDING_MESSAGE.to_string(),
        }
    }
}

/// Public view of the current principal
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[schema(value_type = String, example = "USER")]
    pub role: Role,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            enabled: user.enabled,
            created_at: user.created_at,
        }
    }
}

/// Flatten validator output into one line
pub fn validation_message(errors: &validator::ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(message) => format!("{field}: {message}"),
                None => format!("{field}: invalid value"),
            })
        })
        .collect();
    messages.sort();
    messages.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
        }
    }

    #[test]
    fn test_register_validation() {
        assert!(register("a@x.com", "secret").validate().is_ok());
        assert!(register("not-an-email", "secret").validate().is_err());
        assert!(register("a@x.com", "short").validate().is_err());
        assert!(register("a@x.com", &"x".repeat(129)).validate().is_err());

        let mut missing_name = register("a@x.com", "secret");
        missing_name.first_name.clear();
        let errors = missing_name.validate().unwrap_err();
        assert_eq!(validation_message(&errors), "first_name: First name is required");
    }

    #[test]
    fn test_auth_response_shape() {
        let response = AuthResponse::bearer("a".into(), "r".into(), 3_600_000);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["token_type"], "Bearer");
        assert_eq!(json["expires_in"], 3_600_000);
        assert_eq!(json.as_object().unwrap().len(), 4);
    }

    #[test]
    fn test_pending_message_is_fixed() {
        let json = serde_json::to_value(MessageResponse::registration_pending()).unwrap();
        assert_eq!(json["message"], REGISTRATION_PENDING_MESSAGE);
        assert_eq!(json.as_object().unwrap().len(), 1);
    }
}
