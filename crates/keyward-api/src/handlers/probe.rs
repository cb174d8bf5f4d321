//! Access-control probe endpoints

use axum::{Extension, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::AuthenticatedUser;

#[derive(Serialize, ToSchema)]
pub struct ProbeResponse {
    pub message: String,
}

impl ProbeResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

#[utoipa::path(
    get,
    path = "/api/test/public",
    tag = "probe",
    responses((status = 200, description = "Always reachable", body = ProbeResponse))
)]
pub async fn public_handler() -> Json<ProbeResponse> {
    ProbeResponse::new("This is a public endpoint")
}

#[utoipa::path(
    get,
    path = "/api/test/protected",
    tag = "probe",
    responses(
        (status = 200, description = "Caller is authenticated", body = ProbeResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn protected_handler(
    Extension(user): Extension<AuthenticatedUser>,
) -> Json<ProbeResponse> {
    ProbeResponse::new(format!(
        "This is a protected endpoint - you are authenticated as {}",
        user.email
    ))
}

#[utoipa::path(
    get,
    path = "/api/test/admin",
    tag = "probe",
    responses(
        (status = 200, description = "Caller is an administrator", body = ProbeResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 403, description = "Forbidden", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn admin_handler() -> Json<ProbeResponse> {
    ProbeResponse::new("This is an admin endpoint")
}
