//! Bearer authentication middleware for protected routes
//!
//! Extracts the access token from the Authorization header, verifies it and
//! re-loads the principal from the user store. On success the principal is
//! added to request extensions as [`AuthenticatedUser`].

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use keyward_core::{Role, User};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::service::AuthError;
use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::error::ApiError;
use crate::state::AppState;

/// Principal resolved from a bearer token
///
/// Extract in handlers with `Extension<AuthenticatedUser>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == role || self.is_admin()
    }
}

impl From<&User> for AuthenticatedUser {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            name: user.full_name(),
            role: user.role,
        }
    }
}

/// Bearer authentication errors
#[derive(Debug, Error)]
pub enum BearerError {
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Authentication backend failure")]
    Unavailable,
}

impl IntoResponse for BearerError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            BearerError::MissingAuthHeader => (
                StatusCode::UNAUTHORIZED,
                ApiError::new("MISSING_TOKEN", "Missing Authorization header"),
            ),
            BearerError::InvalidAuthHeader | BearerError::InvalidToken(_) => (
                StatusCode::UNAUTHORIZED,
                ApiError::new("INVALID_TOKEN", "Invalid or expired token"),
            ),
            BearerError::AccountDisabled => (
                StatusCode::FORBIDDEN,
                ApiError::new("ACCOUNT_DISABLED", "Account is disabled"),
            ),
            BearerError::InsufficientPermissions => {
                (StatusCode::FORBIDDEN, ApiError::forbidden())
            }
            BearerError::Unavailable => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::internal_error(),
            ),
        };

        (status, Json(error)).into_response()
    }
}

/// Require a valid bearer token
///
/// ```ignore
/// let protected = Router::new()
///     .route("/auth/me", get(me_handler))
///     .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, BearerError> {
    let ip_address = extract_ip_address(request.headers());
    let user_agent = extract_user_agent(request.headers());

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(BearerError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| BearerError::InvalidAuthHeader)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(BearerError::InvalidAuthHeader)?;

    let user = match state.auth.authenticate(token).await {
        Ok(user) => user,
        Err(e) if e.is_infrastructure() => {
            tracing::error!(error = %e, "Bearer authentication failed");
            return Err(BearerError::Unavailable);
        }
        Err(e) => {
            audit_log(&AuditEvent::InvalidToken {
                ip_address,
                user_agent,
                reason: e.to_string(),
            });
            return Err(match e {
                AuthError::AccountDisabled => BearerError::AccountDisabled,
                other => BearerError::InvalidToken(other.to_string()),
            });
        }
    };

    request
        .extensions_mut()
        .insert(AuthenticatedUser::from(&user));

    Ok(next.run(request).await)
}

type RoleMiddlewareFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, BearerError>> + Send>>;

/// Middleware factory for role-based access control
///
/// Must run after [`auth_middleware`]. Admins pass every gate.
pub fn require_role(
    required_role: Role,
) -> impl Fn(Request<Body>, Next) -> RoleMiddlewareFuture + Clone {
    move |request: Request<Body>, next: Next| {
        Box::pin(async move {
            let ip_address = extract_ip_address(request.headers());
            let user_agent = extract_user_agent(request.headers());

            let user = request
                .extensions()
                .get::<AuthenticatedUser>()
                .ok_or(BearerError::MissingAuthHeader)?
                .clone();

            if !user.has_role(required_role) {
                audit_log(&AuditEvent::AccessDenied {
                    user_id: Some(user.user_id),
                    email: Some(user.email.clone()),
                    resource: format!("role:{required_role}"),
                    required_role: Some(required_role.to_string()),
                    ip_address,
                    user_agent,
                });

                return Err(BearerError::InsufficientPermissions);
            }

            Ok(next.run(request).await)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    async fn whoami(Extension(user): Extension<AuthenticatedUser>) -> String {
        user.email
    }

    fn principal(role: Role) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            email: "a@x.com".to_string(),
            name: "Ada Lovelace".to_string(),
            role,
        }
    }

    fn gated_router(role: Role, principal: Option<AuthenticatedUser>) -> Router {
        let router = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn(require_role(role)));

        match principal {
            Some(user) => router.layer(Extension(user)),
            None => router,
        }
    }

    async fn status_of(router: Router) -> StatusCode {
        router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[test]
    fn test_admin_has_every_role() {
        assert!(principal(Role::Admin).has_role(Role::User));
        assert!(principal(Role::User).has_role(Role::User));
        assert!(!principal(Role::User).has_role(Role::Admin));
    }

    #[tokio::test]
    async fn test_require_role_gates_by_role() {
        assert_eq!(
            status_of(gated_router(Role::Admin, Some(principal(Role::Admin)))).await,
            StatusCode::OK
        );
        assert_eq!(
            status_of(gated_router(Role::Admin, Some(principal(Role::User)))).await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(gated_router(Role::Admin, None)).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_auth_middleware_rejects_missing_and_malformed_headers() {
        let app = crate::testing::TestApp::new();
        let router = Router::new()
            .route("/", get(whoami))
            .layer(middleware::from_fn_with_state(
                app.state.clone(),
                auth_middleware,
            ));

        let missing = router
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let basic = router
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::AUTHORIZATION, "Basic YTpi")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(basic.status(), StatusCode::UNAUTHORIZED);
    }
}
