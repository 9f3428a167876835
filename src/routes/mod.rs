pub mod auth;
pub mod extract;

use axum::response::{IntoResponse, Response};

use crate::responses::JsonResponse;

/// Liveness probe.
pub async fn root() -> Response {
    JsonResponse::success("Amora API is running").into_response()
}
