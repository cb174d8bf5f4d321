//! Authentication API handlers

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use keyward_core::UserStore;

use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::auth::{
    AuthError, AuthResponse, AuthenticatedUser, LoginRequest, MessageResponse, RefreshRequest,
    RegisterRequest, Registration, UserProfile,
};
use crate::error::AppError;
use crate::state::AppState;

/// Register a new user account
///
/// An address that is already registered gets the same 202 body as any
/// other registration that could not issue tokens. That includes storage and
/// hashing failures: they never surface as a 500 here, so an outage during
/// registration is only visible through the `Registration failed` error log.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "User registered, tokens issued", body = AuthResponse),
        (status = 202, description = "Registration request processed", body = MessageResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<Response, AppError> {
    let ip_address = extract_ip_address(&headers);
    let user_agent = extract_user_agent(&headers);

    match state.auth.register(request).await {
        Ok(Registration::Issued { user, tokens }) => {
            audit_log(&AuditEvent::RegistrationSuccess {
                user_id: user.id,
                email: user.email,
                role: user.role.to_string(),
                ip_address,
                user_agent,
            });
            Ok(Json(tokens).into_response())
        }
        Ok(Registration::Deferred) => Ok(pending(ip_address, user_agent)),
        Err(AuthError::Validation(details)) => Err(AppError::BadRequest(details)),
        Err(e) => {
            tracing::error!(
                error = %e,
                infrastructure = e.is_infrastructure(),
                "Registration failed"
            );
            Ok(pending(ip_address, user_agent))
        }
    }
}

fn pending(ip_address: Option<String>, user_agent: Option<String>) -> Response {
    audit_log(&AuditEvent::RegistrationDeferred {
        ip_address,
        user_agent,
    });
    (
        StatusCode::ACCEPTED,
        Json(MessageResponse::registration_pending()),
    )
        .into_response()
}

/// Login with email and password
///
/// Every refresh token previously issued to the account is revoked.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 401, description = "Invalid credentials", body = crate::error::ApiError),
        (status = 403, description = "Account disabled", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let ip_address = extract_ip_address(&headers);
    let user_agent = extract_user_agent(&headers);
    let email = request.email.clone();

    match state.auth.login(request).await {
        Ok((user, response)) => {
            audit_log(&AuditEvent::LoginSuccess {
                user_id: user.id,
                email: user.email,
                ip_address,
                user_agent,
            });
            Ok(Json(response))
        }
        Err(e) => {
            if !e.is_infrastructure() {
                audit_log(&AuditEvent::LoginFailure {
                    email,
                    reason: e.to_string(),
                    ip_address,
                    user_agent,
                });
            }
            Err(e.into())
        }
    }
}

/// Refresh access token
///
/// The refresh token is not rotated; the response echoes it back.
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token refreshed successfully", body = AuthResponse),
        (status = 401, description = "Refresh token not found, expired or revoked", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let ip_address = extract_ip_address(&headers);
    let user_agent = extract_user_agent(&headers);

    match state.auth.refresh(request).await {
        Ok((user, response)) => {
            audit_log(&AuditEvent::TokenRefresh {
                user_id: user.id,
                email: user.email,
                ip_address,
                user_agent,
            });
            Ok(Json(response))
        }
        Err(e) => {
            if !e.is_infrastructure() {
                audit_log(&AuditEvent::RefreshRejected {
                    reason: e.to_string(),
                    ip_address,
                    user_agent,
                });
            }
            Err(e.into())
        }
    }
}

/// Logout by invalidating a refresh token
///
/// Unknown tokens succeed as well.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 204, description = "Logout successful"),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RefreshRequest>,
) -> Result<StatusCode, AppError> {
    let user_id = state.auth.logout(request).await?;

    audit_log(&AuditEvent::Logout {
        user_id,
        ip_address: extract_ip_address(&headers),
    });

    Ok(StatusCode::NO_CONTENT)
}

/// Get current user profile
#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = UserProfile),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<UserProfile>, AppError> {
    let mut tx = state.db.begin().await?;
    let profile = tx
        .find_user(user.user_id)
        .await?
        .ok_or(AppError::Unauthorized {
            code: "INVALID_TOKEN",
            message: "Invalid or expired token".to_string(),
        })?;

    Ok(Json(UserProfile::from(&profile)))
}
