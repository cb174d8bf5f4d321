//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use keyward_core::StoreError;
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::auth::service::AuthError;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn validation(details: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", "Request validation failed").with_details(details)
    }

    pub fn unauthorized() -> Self {
        Self::new("UNAUTHORIZED", "Authentication required")
    }

    pub fn forbidden() -> Self {
        Self::new("FORBIDDEN", "Access denied")
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    /// 401 with a specific code
    Unauthorized {
        code: &'static str,
        message: String,
    },
    Forbidden {
        code: &'static str,
        message: String,
    },
    /// Logged server-side; the body stays generic
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            AppError::BadRequest(details) => ApiError::validation(details),
            AppError::Unauthorized { code, message } | AppError::Forbidden { code, message } => {
                ApiError::new(code, message)
            }
            AppError::Internal(details) => {
                error!(error = %details, "Request failed");
                ApiError::internal_error()
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        if err.is_infrastructure() {
            return AppError::Internal(err.to_string());
        }

        let message = err.to_string();
        match err {
            AuthError::InvalidCredentials => AppError::Unauthorized {
                code: "INVALID_CREDENTIALS",
                message,
            },
            AuthError::AccountDisabled => AppError::Forbidden {
                code: "ACCOUNT_DISABLED",
                message,
            },
            AuthError::TokenNotFound => AppError::Unauthorized {
                code: "REFRESH_TOKEN_NOT_FOUND",
                message,
            },
            AuthError::TokenExpired => AppError::Unauthorized {
                code: "REFRESH_TOKEN_EXPIRED",
                message,
            },
            AuthError::TokenRevoked => AppError::Unauthorized {
                code: "REFRESH_TOKEN_REVOKED",
                message,
            },
            AuthError::AccessToken(_) => AppError::Unauthorized {
                code: "INVALID_TOKEN",
                message: "Invalid or expired token".to_string(),
            },
            AuthError::Validation(details) => AppError::BadRequest(details),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(err.to_string())
    }
}
