//! HTTP route handlers.
//!
//! - `/healthz`: unauthenticated liveness probe, never cached
//! - `/weatherforecast`: demo data behind bearer authentication
//! - `/openapi.json`: API description, development environment only
//!
//! Request tracing is enabled via middleware that generates a unique request ID
//! for each incoming request, allowing correlation of all logs within a request.

pub mod docs;
pub mod forecast;
pub mod health;

use axum::{middleware, routing::get, Router};
use http::header::{HeaderValue, CACHE_CONTROL};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::middleware::{request_id_layer, require_bearer};
use crate::state::AppState;

/// Cache-Control value for responses that must always be fresh
pub const CACHE_CONTROL_NO_STORE: &str = "no-store";

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    // Health check - no caching, always fresh for liveness probes
    let health_routes = Router::new()
        .route("/healthz", get(health::health))
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_NO_STORE),
        ));

    // Protected routes - bearer token required
    let forecast_routes = Router::new()
        .route("/weatherforecast", get(forecast::list))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    let mut router = Router::new().merge(health_routes).merge(forecast_routes);

    if state.config.is_development() {
        router = router.route("/openapi.json", get(docs::openapi));
    }

    router
        .with_state(state)
        // Request ID middleware - creates root span with request_id for correlation
        .layer(middleware::from_fn(request_id_layer))
}
