//! Health check endpoint for container orchestration.
//!
//! Provides a simple liveness probe that returns 200 OK when the process is running.
//! Dependencies are verified once at startup, so reaching this handler at all
//! means they were available when the service began listening.

use axum::Json;

/// Body returned by the liveness probe
pub const LIVENESS_BODY: &str = "I am fine";

/// Health check handler.
///
/// This is a liveness probe - it only checks that the process can respond to HTTP.
/// The body is a JSON string.
pub async fn health() -> Json<&'static str> {
    Json(LIVENESS_BODY)
}
