//! API route definitions

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use keyward_core::Role;

use crate::auth::middleware::{auth_middleware, require_role};
use crate::handlers::{auth, probe};
use crate::state::AppState;

/// Routes mounted under `/api`
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/test/public", get(probe::public_handler));

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me_handler))
        .route("/test/protected", get(probe::protected_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Role gate runs inside the bearer check
    let admin_routes = Router::new()
        .route("/test/admin", get(probe::admin_handler))
        .route_layer(middleware::from_fn(require_role(Role::Admin)))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
}
