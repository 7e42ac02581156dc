//! Startup dependency verification.
//!
//! Before the listener is bound, the service probes each external dependency
//! once, in a fixed order:
//! - **database** (fatal): open and close one PostgreSQL connection
//! - **kafka** (fatal): fetch cluster metadata from the bootstrap servers
//! - **identity-provider** (optional): GET the provider's JWKS document
//!
//! Probes only report what happened ([`ProbeOutcome`]). Whether a failure
//! aborts startup is decided by the [`DependencyCheckSpec`] the probe is
//! registered under, so the same probe can be fatal in one deployment and
//! advisory in another.

mod checker;
mod log;
mod probes;

use std::time::Duration;

use async_trait::async_trait;

pub use checker::StartupDependencyChecker;
pub use log::{Severity, StartupLog, TracingLog, LOG_TARGET};
pub use probes::{
    dependency_specs, redact_credentials, IdentityProviderProbe, KafkaProbe, PostgresProbe,
    KAFKA_DEADLINE_MARGIN,
};

use crate::config::{ConfigSource, DEFAULT_PROBE_TIMEOUT_SECS};

/// Process exit code when a fatal dependency is unreachable at startup.
pub const EXIT_DEPENDENCY_UNAVAILABLE: i32 = 3;

/// Process exit code when startup settings are missing or malformed.
pub const EXIT_CONFIGURATION: i32 = 2;

pub const DATABASE: &str = "database";
pub const KAFKA: &str = "kafka";
pub const IDENTITY_PROVIDER: &str = "identity-provider";

/// Why a probe did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeFailure {
    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Result of a single probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Passed,
    /// The dependency is not configured; no network call was made.
    Skipped(String),
    Failed(ProbeFailure),
}

/// A connectivity check against one external system.
///
/// Implementations own whatever client or connection they open and must
/// release it before returning.
#[async_trait]
pub trait DependencyProbe: Send + Sync {
    /// Where the probe points, safe to log (no credentials).
    fn target(&self) -> String;

    async fn probe(&self) -> ProbeOutcome;
}

/// A named dependency to verify and how to treat its failure.
pub struct DependencyCheckSpec {
    pub name: String,
    pub fatal: bool,
    /// Deadline for a single attempt
    pub timeout: Duration,
    /// Total attempts before the dependency counts as failed (at least 1)
    pub attempts: u32,
    pub retry_delay: Duration,
    pub probe: Box<dyn DependencyProbe>,
}

impl DependencyCheckSpec {
    /// A dependency whose failure aborts startup.
    pub fn fatal(name: impl Into<String>, probe: impl DependencyProbe + 'static) -> Self {
        Self::new(name, true, probe)
    }

    /// A dependency whose failure is logged and tolerated.
    pub fn optional(name: impl Into<String>, probe: impl DependencyProbe + 'static) -> Self {
        Self::new(name, false, probe)
    }

    fn new(name: impl Into<String>, fatal: bool, probe: impl DependencyProbe + 'static) -> Self {
        Self {
            name: name.into(),
            fatal,
            timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            attempts: 1,
            retry_delay: Duration::ZERO,
            probe: Box::new(probe),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }
}

impl std::fmt::Debug for DependencyCheckSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyCheckSpec")
            .field("name", &self.name)
            .field("fatal", &self.fatal)
            .field("timeout", &self.timeout)
            .field("attempts", &self.attempts)
            .field("target", &self.probe.target())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Passed,
    Failed,
    Skipped,
}

/// Outcome of verifying one dependency.
#[derive(Debug, Clone)]
pub struct DependencyCheckResult {
    pub name: String,
    pub fatal: bool,
    pub status: CheckStatus,
    pub error: Option<String>,
    pub elapsed: Option<Duration>,
    pub attempts: u32,
}

impl DependencyCheckResult {
    pub fn success(&self) -> bool {
        self.status == CheckStatus::Passed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Aborted,
}

/// Results of a verification pass, in probe order.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub results: Vec<DependencyCheckResult>,
    pub readiness: Readiness,
}

impl CheckOutcome {
    pub fn is_ready(&self) -> bool {
        self.readiness == Readiness::Ready
    }

    pub fn result(&self, name: &str) -> Option<&DependencyCheckResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Failed dependencies that did not block startup.
    pub fn tolerated_failures(&self) -> impl Iterator<Item = &DependencyCheckResult> {
        self.results
            .iter()
            .filter(|r| !r.fatal && r.status == CheckStatus::Failed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// A fatal dependency could not be reached; the service must not start.
    #[error("dependency '{dependency}' unavailable at startup: {failure}")]
    Aborted {
        dependency: String,
        failure: ProbeFailure,
        outcome: CheckOutcome,
    },

    #[error("required setting '{0}' is missing")]
    ConfigurationMissing(String),

    #[error("setting '{key}' has invalid value '{value}'")]
    InvalidSetting { key: String, value: String },
}

impl StartupError {
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::Aborted { .. } => EXIT_DEPENDENCY_UNAVAILABLE,
            StartupError::ConfigurationMissing(_) | StartupError::InvalidSetting { .. } => {
                EXIT_CONFIGURATION
            }
        }
    }
}

/// Verify every configured dependency, or return why the service must not start.
///
/// Settings are read from `config` and every outcome is reported to `log`.
/// Fatal dependencies are probed first; the first fatal failure ends the pass.
pub async fn verify_dependencies(
    config: &dyn ConfigSource,
    log: &dyn StartupLog,
) -> Result<CheckOutcome, StartupError> {
    let specs = match dependency_specs(config) {
        Ok(specs) => specs,
        Err(e) => {
            log.critical("configuration", "Startup settings are incomplete", &e.to_string());
            return Err(e);
        }
    };

    StartupDependencyChecker::new(log).verify(specs).await
}
