//! HTTP handlers, grouped by resource.
//!
//! Every handler that acts on behalf of a caller takes the `Subject` extractor.
//! Handlers that mutate an existing resource call
//! `OwnershipVerifier::require_ownership` with the identifier from their path before
//! touching the repository.

use axum::Json;
use serde_json::{Value, json};

pub mod cars;
pub mod comments;
pub mod images;
pub mod messages;
pub mod notifications;
pub mod saved_cars;
pub mod tokens;

/// health
///
/// [Public Route] Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
