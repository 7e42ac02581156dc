//! Probes for the service's external dependencies.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;

use super::{
    DependencyCheckSpec, DependencyProbe, ProbeFailure, ProbeOutcome, StartupError, DATABASE,
    IDENTITY_PROVIDER, KAFKA,
};
use crate::auth;
use crate::config::{
    ConfigSource, DEFAULT_KAFKA_METADATA_TIMEOUT_SECS, DEFAULT_PROBE_ATTEMPTS,
    DEFAULT_PROBE_TIMEOUT_SECS, DEFAULT_RETRY_DELAY_MS, KEY_AUTH_DOMAIN, KEY_DATABASE_CONNECTION,
    KEY_KAFKA_BOOTSTRAP_SERVERS, KEY_KAFKA_METADATA_TIMEOUT, KEY_PROBE_ATTEMPTS,
    KEY_PROBE_TIMEOUT, KEY_RETRY_DELAY,
};

/// Slack between librdkafka's metadata timeout and the checker's deadline.
///
/// The blocking metadata call must return on its own so the consumer is
/// dropped before the checker moves on.
pub const KAFKA_DEADLINE_MARGIN: Duration = Duration::from_secs(1);

/// Build the checks for this service from configuration.
///
/// Fatal dependencies come first so an optional system is never probed when
/// the process is about to abort anyway. A missing database or broker setting
/// is a configuration error, reported before any network call.
pub fn dependency_specs(config: &dyn ConfigSource) -> Result<Vec<DependencyCheckSpec>, StartupError> {
    let connection_string = required(config, KEY_DATABASE_CONNECTION)?;
    let bootstrap_servers = required(config, KEY_KAFKA_BOOTSTRAP_SERVERS)?;

    let probe_timeout = Duration::from_secs(setting(
        config,
        KEY_PROBE_TIMEOUT,
        DEFAULT_PROBE_TIMEOUT_SECS,
        false,
    )?);
    let metadata_timeout = Duration::from_secs(setting(
        config,
        KEY_KAFKA_METADATA_TIMEOUT,
        DEFAULT_KAFKA_METADATA_TIMEOUT_SECS,
        false,
    )?);
    let attempts = setting(config, KEY_PROBE_ATTEMPTS, u64::from(DEFAULT_PROBE_ATTEMPTS), false)?;
    let attempts = u32::try_from(attempts).map_err(|_| StartupError::InvalidSetting {
        key: KEY_PROBE_ATTEMPTS.to_string(),
        value: attempts.to_string(),
    })?;
    let retry_delay = Duration::from_millis(setting(
        config,
        KEY_RETRY_DELAY,
        DEFAULT_RETRY_DELAY_MS,
        true,
    )?);

    let domain = config.get(KEY_AUTH_DOMAIN);

    Ok(vec![
        DependencyCheckSpec::fatal(DATABASE, PostgresProbe::new(connection_string))
            .with_timeout(probe_timeout)
            .with_retries(attempts, retry_delay),
        DependencyCheckSpec::fatal(KAFKA, KafkaProbe::new(bootstrap_servers, metadata_timeout))
            .with_timeout(metadata_timeout + KAFKA_DEADLINE_MARGIN)
            .with_retries(attempts, retry_delay),
        DependencyCheckSpec::optional(
            IDENTITY_PROVIDER,
            IdentityProviderProbe::new(domain.as_deref(), probe_timeout),
        )
        .with_timeout(probe_timeout)
        .with_retries(attempts, retry_delay),
    ])
}

fn required(config: &dyn ConfigSource, key: &str) -> Result<String, StartupError> {
    config
        .get(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| StartupError::ConfigurationMissing(key.to_string()))
}

fn setting(
    config: &dyn ConfigSource,
    key: &str,
    default: u64,
    allow_zero: bool,
) -> Result<u64, StartupError> {
    let Some(raw) = config.get(key) else {
        return Ok(default);
    };

    match raw.trim().parse::<u64>() {
        Ok(0) if !allow_zero => Err(StartupError::InvalidSetting {
            key: key.to_string(),
            value: raw,
        }),
        Ok(value) => Ok(value),
        Err(_) => Err(StartupError::InvalidSetting {
            key: key.to_string(),
            value: raw,
        }),
    }
}

/// Replace the user-info part of a URL so it can be logged.
pub fn redact_credentials(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let (scheme, rest) = url.split_at(scheme_end + 3);
    // Passwords may contain a raw '/', so user-info ends at the last '@'
    // before the query string rather than inside the first path segment.
    let query_start = rest.find('?').unwrap_or(rest.len());

    match rest[..query_start].rfind('@') {
        Some(at) => format!("{}***@{}", scheme, &rest[at + 1..]),
        None => url.to_string(),
    }
}

/// Opens and closes a single PostgreSQL connection.
pub struct PostgresProbe {
    connection_string: String,
}

impl PostgresProbe {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }
}

#[async_trait]
impl DependencyProbe for PostgresProbe {
    fn target(&self) -> String {
        redact_credentials(&self.connection_string)
    }

    async fn probe(&self) -> ProbeOutcome {
        let options = match PgConnectOptions::from_str(&self.connection_string) {
            Ok(options) => options,
            Err(e) => {
                return ProbeOutcome::Failed(ProbeFailure::ConnectionFailure(format!(
                    "invalid connection string: {}",
                    e
                )))
            }
        };

        match PgConnection::connect_with(&options).await {
            Ok(conn) => {
                if let Err(e) = conn.close().await {
                    tracing::debug!(error = %e, "Closing database probe connection failed");
                }
                ProbeOutcome::Passed
            }
            Err(e) => ProbeOutcome::Failed(ProbeFailure::ConnectionFailure(e.to_string())),
        }
    }
}

/// Requests cluster metadata from the Kafka bootstrap servers.
pub struct KafkaProbe {
    bootstrap_servers: String,
    metadata_timeout: Duration,
}

impl KafkaProbe {
    pub fn new(bootstrap_servers: impl Into<String>, metadata_timeout: Duration) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            metadata_timeout,
        }
    }
}

#[async_trait]
impl DependencyProbe for KafkaProbe {
    fn target(&self) -> String {
        self.bootstrap_servers.clone()
    }

    async fn probe(&self) -> ProbeOutcome {
        let brokers = self.bootstrap_servers.clone();
        let metadata_timeout = self.metadata_timeout;

        // librdkafka blocks the calling thread while it waits for metadata
        let result = tokio::task::spawn_blocking(move || {
            let consumer: BaseConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("socket.timeout.ms", metadata_timeout.as_millis().to_string())
                .create()
                .map_err(|e| {
                    ProbeFailure::ConnectionFailure(format!("Kafka client creation failed: {}", e))
                })?;

            consumer
                .fetch_metadata(None, metadata_timeout)
                .map(|_| ())
                .map_err(|e| classify_kafka_error(e, metadata_timeout))
        })
        .await;

        match result {
            Ok(Ok(())) => ProbeOutcome::Passed,
            Ok(Err(failure)) => ProbeOutcome::Failed(failure),
            Err(e) => ProbeOutcome::Failed(ProbeFailure::ConnectionFailure(format!(
                "Kafka probe task failed: {}",
                e
            ))),
        }
    }
}

fn classify_kafka_error(error: KafkaError, timeout: Duration) -> ProbeFailure {
    match error.rdkafka_error_code() {
        Some(RDKafkaErrorCode::OperationTimedOut) | Some(RDKafkaErrorCode::RequestTimedOut) => {
            ProbeFailure::Timeout(timeout)
        }
        _ => ProbeFailure::ConnectionFailure(format!("Kafka broker unreachable: {}", error)),
    }
}

/// Fetches the identity provider's JWKS document.
///
/// Built with no URL when the domain is unset or still the sample placeholder;
/// probing then reports [`ProbeOutcome::Skipped`] without touching the network.
pub struct IdentityProviderProbe {
    jwks_url: Option<String>,
    timeout: Duration,
}

impl IdentityProviderProbe {
    pub fn new(domain: Option<&str>, timeout: Duration) -> Self {
        Self {
            jwks_url: auth::configured_domain(domain).map(auth::jwks_url),
            timeout,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.jwks_url.is_some()
    }
}

#[async_trait]
impl DependencyProbe for IdentityProviderProbe {
    fn target(&self) -> String {
        self.jwks_url
            .clone()
            .unwrap_or_else(|| "(not configured)".to_string())
    }

    async fn probe(&self) -> ProbeOutcome {
        let Some(url) = &self.jwks_url else {
            return ProbeOutcome::Skipped(format!(
                "{} is not configured; bearer token validation will reject all requests",
                KEY_AUTH_DOMAIN
            ));
        };

        let client = match reqwest::Client::builder().timeout(self.timeout).build() {
            Ok(client) => client,
            Err(e) => {
                return ProbeOutcome::Failed(ProbeFailure::ConnectionFailure(format!(
                    "Failed to create HTTP client: {}",
                    e
                )))
            }
        };

        match client.get(url).send().await {
            Ok(response) if response.status().is_success() => ProbeOutcome::Passed,
            Ok(response) => ProbeOutcome::Failed(ProbeFailure::ConnectionFailure(format!(
                "{} returned status {}",
                url,
                response.status()
            ))),
            Err(e) if e.is_timeout() => ProbeOutcome::Failed(ProbeFailure::Timeout(self.timeout)),
            Err(e) => ProbeOutcome::Failed(ProbeFailure::ConnectionFailure(format!(
                "GET {} failed: {}",
                url, e
            ))),
        }
    }
}
