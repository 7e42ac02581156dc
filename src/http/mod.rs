//! HTTP server module.
//!
//! The server is only started after startup dependency checks pass. It shuts
//! down gracefully on SIGTERM/SIGINT, draining in-flight requests.

mod server;
mod shutdown;

pub use server::{start_server, ServerError};
