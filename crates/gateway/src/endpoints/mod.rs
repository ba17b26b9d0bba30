//! # Gateway endpoints
//!
//! | Method | Path       | Success | Failure           |
//! | ------ | ---------- | ------- | ----------------- |
//! | `POST` | `/upload`  | `200`   | `400`/`413`/`500` |
//! | `GET`  | `/healthz` | `200`   | —                 |
//!
//! Every other path answers `404`, a wrong method `405`, both in the
//! upload envelope shape.

pub mod health;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_helpers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppState;
use crate::error::{envelope_response, handle_panic};

pub use health::handle_healthz;
pub use upload::handle_upload;

/// Builds the gateway router.
///
/// The upload route carries its own body limit: disabled when no maximum
/// is configured, otherwise the maximum plus multipart framing slack.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = match state.settings.request_body_limit() {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route("/upload", post(handle_upload).layer(body_limit))
        .route("/healthz", get(handle_healthz))
        .fallback(handle_not_found)
        .method_not_allowed_fallback(handle_method_not_allowed)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_not_found() -> Response {
    envelope_response(
        StatusCode::NOT_FOUND,
        "The requested URL was not found on the server",
    )
}

async fn handle_method_not_allowed() -> Response {
    envelope_response(
        StatusCode::METHOD_NOT_ALLOWED,
        "The method is not allowed for the requested URL",
    )
}
