//! ServiceOps - a small HTTP service that verifies its dependencies before serving.
//!
//! At startup the service probes its PostgreSQL database and Kafka brokers
//! (both required) and its identity provider (optional), then serves a
//! liveness endpoint and a bearer-protected demo endpoint.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod middleware;
pub mod routes;
pub mod startup;
pub mod state;

pub use error::AppError;
pub use routes::create_router;
pub use state::AppState;
