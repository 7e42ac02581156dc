//! ServiceOps entry point.
//!
//! Initializes tracing, loads configuration from TOML (with environment
//! overrides), verifies external dependencies, and only then starts the
//! HTTP server. A fatal dependency failure exits without ever binding the
//! listener.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use serviceops::config::{AppConfig, EnvOverlay, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER};
use serviceops::startup::{self, StartupError, TracingLog, EXIT_CONFIGURATION};
use serviceops::{create_router, AppState};

/// ServiceOps: dependency-verified web service
#[derive(Parser, Debug)]
#[command(name = "serviceops", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "serviceops=debug,startup_checks=info")
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Configuration is loaded before tracing so the log format can be honored
    let config = match AppConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", args.config, e);
            return exit_code(EXIT_CONFIGURATION);
        }
    };

    // Initialize tracing with priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(&log_filter));
    if config.logging.is_json() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(path = %args.config, environment = %config.environment, "Loaded configuration");

    let settings = EnvOverlay::new(config.clone());
    match startup::verify_dependencies(&settings, &TracingLog).await {
        Ok(outcome) => {
            for result in outcome.tolerated_failures() {
                tracing::warn!(
                    dependency = %result.name,
                    "Starting with optional dependency unavailable"
                );
            }
        }
        Err(e) => {
            if let StartupError::Aborted { dependency, .. } = &e {
                tracing::error!(
                    dependency = %dependency,
                    error = %e,
                    "Dependency unavailable at startup; refusing to serve traffic"
                );
            } else {
                tracing::error!(error = %e, "Startup configuration invalid");
            }
            return exit_code(e.exit_code());
        }
    }

    let state = match AppState::new(config.clone(), &settings) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize authentication");
            return exit_code(EXIT_CONFIGURATION);
        }
    };
    if state.auth.is_none() {
        tracing::debug!("Bearer validation disabled; protected routes will reject all requests");
    }

    let app = create_router(state);

    match serviceops::http::start_server(app, &config.http).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
