//! Log sink for startup check outcomes.

/// Tracing target for all startup check events.
pub const LOG_TARGET: &str = "startup_checks";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Critical,
}

/// Receives leveled records about each dependency check.
pub trait StartupLog: Send + Sync {
    fn log(&self, severity: Severity, dependency: &str, message: &str, error: Option<&str>);

    fn debug(&self, dependency: &str, message: &str) {
        self.log(Severity::Debug, dependency, message, None);
    }

    fn info(&self, dependency: &str, message: &str) {
        self.log(Severity::Info, dependency, message, None);
    }

    fn warn(&self, dependency: &str, message: &str, error: Option<&str>) {
        self.log(Severity::Warning, dependency, message, error);
    }

    fn critical(&self, dependency: &str, message: &str, error: &str) {
        self.log(Severity::Critical, dependency, message, Some(error));
    }
}

/// Emits records as `tracing` events on the [`LOG_TARGET`] target.
///
/// Critical records are `ERROR` events tagged `severity = "critical"` so they
/// can be told apart from ordinary errors in aggregated logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl StartupLog for TracingLog {
    fn log(&self, severity: Severity, dependency: &str, message: &str, error: Option<&str>) {
        match severity {
            Severity::Debug => {
                tracing::debug!(target: LOG_TARGET, dependency, error, "{}", message);
            }
            Severity::Info => {
                tracing::info!(target: LOG_TARGET, dependency, error, "{}", message);
            }
            Severity::Warning => {
                tracing::warn!(target: LOG_TARGET, dependency, error, "{}", message);
            }
            Severity::Critical => {
                tracing::error!(
                    target: LOG_TARGET,
                    severity = "critical",
                    dependency,
                    error,
                    "{}",
                    message
                );
            }
        }
    }
}
