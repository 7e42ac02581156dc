use std::time::Instant;

use tokio::time::{sleep, timeout};

use super::{
    CheckOutcome, CheckStatus, DependencyCheckResult, DependencyCheckSpec, ProbeFailure,
    ProbeOutcome, Readiness, StartupError, StartupLog,
};

/// Runs dependency checks sequentially and decides whether startup proceeds.
pub struct StartupDependencyChecker<'a> {
    log: &'a dyn StartupLog,
}

impl<'a> StartupDependencyChecker<'a> {
    pub fn new(log: &'a dyn StartupLog) -> Self {
        Self { log }
    }

    /// Probe each spec in order.
    ///
    /// Returns `Err(StartupError::Aborted)` as soon as a fatal dependency fails;
    /// the remaining specs are not probed. Failures of optional dependencies
    /// are recorded and logged at critical severity but never abort.
    pub async fn verify(
        &self,
        specs: Vec<DependencyCheckSpec>,
    ) -> Result<CheckOutcome, StartupError> {
        let mut results = Vec::with_capacity(specs.len());

        for spec in &specs {
            let (result, failure) = self.check(spec).await;
            results.push(result);

            if let Some(failure) = failure {
                if spec.fatal {
                    return Err(StartupError::Aborted {
                        dependency: spec.name.clone(),
                        failure,
                        outcome: CheckOutcome {
                            results,
                            readiness: Readiness::Aborted,
                        },
                    });
                }
            }
        }

        let outcome = CheckOutcome {
            results,
            readiness: Readiness::Ready,
        };
        let tolerated = outcome.tolerated_failures().count();
        self.log.info(
            "startup",
            &format!(
                "Dependency checks complete: {} checked, {} optional failure(s) tolerated",
                outcome.results.len(),
                tolerated
            ),
        );

        Ok(outcome)
    }

    async fn check(&self, spec: &DependencyCheckSpec) -> (DependencyCheckResult, Option<ProbeFailure>) {
        self.log.debug(
            &spec.name,
            &format!(
                "Probing {} at {} (fatal: {}, timeout: {:?})",
                spec.name,
                spec.probe.target(),
                spec.fatal,
                spec.timeout
            ),
        );

        let start = Instant::now();
        let mut attempt = 1;

        let outcome = loop {
            let outcome = match timeout(spec.timeout, spec.probe.probe()).await {
                Ok(outcome) => outcome,
                Err(_) => ProbeOutcome::Failed(ProbeFailure::Timeout(spec.timeout)),
            };

            match outcome {
                ProbeOutcome::Failed(failure) if attempt < spec.attempts => {
                    self.log.warn(
                        &spec.name,
                        &format!(
                            "{} check attempt {}/{} failed, retrying in {:?}",
                            spec.name, attempt, spec.attempts, spec.retry_delay
                        ),
                        Some(&failure.to_string()),
                    );
                    attempt += 1;
                    sleep(spec.retry_delay).await;
                }
                other => break other,
            }
        };

        let elapsed = start.elapsed();
        let mut result = DependencyCheckResult {
            name: spec.name.clone(),
            fatal: spec.fatal,
            status: CheckStatus::Passed,
            error: None,
            elapsed: Some(elapsed),
            attempts: attempt,
        };

        match outcome {
            ProbeOutcome::Passed => {
                self.log
                    .info(&spec.name, &format!("{} connection successful", spec.name));
                (result, None)
            }
            ProbeOutcome::Skipped(reason) => {
                self.log.warn(
                    &spec.name,
                    &format!("{} check skipped: {}", spec.name, reason),
                    None,
                );
                result.status = CheckStatus::Skipped;
                (result, None)
            }
            ProbeOutcome::Failed(failure) => {
                let detail = failure.to_string();
                let message = if spec.fatal {
                    format!("Failed to connect to {}; startup cannot continue", spec.name)
                } else {
                    format!("Failed to connect to {}; continuing startup", spec.name)
                };
                self.log.critical(&spec.name, &message, &detail);
                result.status = CheckStatus::Failed;
                result.error = Some(detail);
                (result, Some(failure))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::startup::{DependencyProbe, Severity, DATABASE, IDENTITY_PROVIDER, KAFKA};

    #[derive(Default)]
    struct RecordingLog {
        records: Mutex<Vec<(Severity, String, String)>>,
    }

    impl RecordingLog {
        fn count(&self, severity: Severity) -> usize {
            self.records
                .lock()
                .unwrap()
                .iter()
                .filter(|(s, _, _)| *s == severity)
                .count()
        }

        fn dependencies(&self, severity: Severity) -> Vec<String> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .filter(|(s, _, _)| *s == severity)
                .map(|(_, d, _)| d.clone())
                .collect()
        }

        fn errors(&self) -> Vec<String> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .filter(|(s, _, _)| *s == Severity::Critical)
                .map(|(_, _, e)| e.clone())
                .collect()
        }
    }

    impl StartupLog for RecordingLog {
        fn log(&self, severity: Severity, dependency: &str, _message: &str, error: Option<&str>) {
            self.records.lock().unwrap().push((
                severity,
                dependency.to_string(),
                error.unwrap_or_default().to_string(),
            ));
        }
    }

    /// Probe with a scripted sequence of outcomes that counts its calls.
    #[derive(Clone)]
    struct Scripted {
        outcomes: Arc<Mutex<Vec<ProbeOutcome>>>,
        calls: Arc<AtomicU32>,
    }

    impl Scripted {
        fn new(outcomes: Vec<ProbeOutcome>) -> Self {
            Self {
                outcomes: Arc::new(Mutex::new(outcomes)),
                calls: Arc::new(AtomicU32::new(0)),
            }
        }

        fn passing() -> Self {
            Self::new(vec![ProbeOutcome::Passed])
        }

        fn failing(detail: &str) -> Self {
            Self::new(vec![ProbeOutcome::Failed(ProbeFailure::ConnectionFailure(
                detail.to_string(),
            ))])
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DependencyProbe for Scripted {
        fn target(&self) -> String {
            "scripted".to_string()
        }

        async fn probe(&self) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.len() > 1 {
                outcomes.remove(0)
            } else {
                outcomes[0].clone()
            }
        }
    }

    struct Hangs;

    #[async_trait]
    impl DependencyProbe for Hangs {
        fn target(&self) -> String {
            "black hole".to_string()
        }

        async fn probe(&self) -> ProbeOutcome {
            std::future::pending::<()>().await;
            ProbeOutcome::Passed
        }
    }

    fn skipped() -> Scripted {
        Scripted::new(vec![ProbeOutcome::Skipped("domain not configured".into())])
    }

    #[tokio::test]
    async fn all_reachable_identity_unset_is_ready() {
        let log = RecordingLog::default();
        let specs = vec![
            DependencyCheckSpec::fatal(DATABASE, Scripted::passing()),
            DependencyCheckSpec::fatal(KAFKA, Scripted::passing()),
            DependencyCheckSpec::optional(IDENTITY_PROVIDER, skipped()),
        ];

        let outcome = StartupDependencyChecker::new(&log).verify(specs).await.unwrap();

        assert!(outcome.is_ready());
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(
            outcome.result(IDENTITY_PROVIDER).unwrap().status,
            CheckStatus::Skipped
        );
        assert_eq!(log.count(Severity::Warning), 1);
        assert_eq!(log.dependencies(Severity::Warning), vec![IDENTITY_PROVIDER]);
        assert_eq!(log.count(Severity::Critical), 0);
        assert_eq!(
            log.dependencies(Severity::Debug),
            vec![DATABASE, KAFKA, IDENTITY_PROVIDER]
        );
    }

    #[tokio::test]
    async fn database_failure_aborts_before_broker() {
        let log = RecordingLog::default();
        let broker = Scripted::passing();
        let specs = vec![
            DependencyCheckSpec::fatal(DATABASE, Scripted::failing("connection refused")),
            DependencyCheckSpec::fatal(KAFKA, broker.clone()),
            DependencyCheckSpec::optional(IDENTITY_PROVIDER, Scripted::passing()),
        ];

        let err = StartupDependencyChecker::new(&log)
            .verify(specs)
            .await
            .unwrap_err();

        match err {
            StartupError::Aborted {
                dependency,
                failure,
                outcome,
            } => {
                assert_eq!(dependency, DATABASE);
                assert_eq!(
                    failure,
                    ProbeFailure::ConnectionFailure("connection refused".into())
                );
                assert_eq!(outcome.readiness, Readiness::Aborted);
                assert_eq!(outcome.results.len(), 1);
                assert!(!outcome.results[0].success());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(broker.calls(), 0);
        assert_eq!(log.dependencies(Severity::Critical), vec![DATABASE]);
        assert!(log.errors()[0].contains("connection refused"));
    }

    #[tokio::test]
    async fn optional_failure_is_tolerated() {
        let log = RecordingLog::default();
        let specs = vec![
            DependencyCheckSpec::fatal(DATABASE, Scripted::passing()),
            DependencyCheckSpec::fatal(KAFKA, Scripted::passing()),
            DependencyCheckSpec::optional(
                IDENTITY_PROVIDER,
                Scripted::failing("returned status 500 Internal Server Error"),
            ),
        ];

        let outcome = StartupDependencyChecker::new(&log).verify(specs).await.unwrap();

        assert!(outcome.is_ready());
        let idp = outcome.result(IDENTITY_PROVIDER).unwrap();
        assert_eq!(idp.status, CheckStatus::Failed);
        assert!(idp.error.as_deref().unwrap().contains("500"));
        assert_eq!(outcome.tolerated_failures().count(), 1);
        assert_eq!(log.dependencies(Severity::Critical), vec![IDENTITY_PROVIDER]);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_broker_times_out_and_aborts() {
        let log = RecordingLog::default();
        let specs = vec![
            DependencyCheckSpec::fatal(DATABASE, Scripted::passing()),
            DependencyCheckSpec::fatal(KAFKA, Hangs).with_timeout(Duration::from_secs(5)),
        ];

        let err = StartupDependencyChecker::new(&log)
            .verify(specs)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StartupError::Aborted { ref dependency, failure: ProbeFailure::Timeout(after), .. }
                if dependency == KAFKA && after == Duration::from_secs(5)
        ));
        assert_eq!(log.dependencies(Severity::Critical), vec![KAFKA]);
        assert!(log.errors()[0].contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let log = RecordingLog::default();
        let flaky = Scripted::new(vec![
            ProbeOutcome::Failed(ProbeFailure::ConnectionFailure("not yet".into())),
            ProbeOutcome::Passed,
        ]);
        let specs = vec![DependencyCheckSpec::fatal(DATABASE, flaky.clone())
            .with_retries(3, Duration::from_millis(500))];

        let outcome = StartupDependencyChecker::new(&log).verify(specs).await.unwrap();

        assert!(outcome.is_ready());
        assert_eq!(flaky.calls(), 2);
        assert_eq!(outcome.results[0].attempts, 2);
        assert_eq!(log.count(Severity::Warning), 1);
        assert_eq!(log.count(Severity::Critical), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_log_one_critical() {
        let log = RecordingLog::default();
        let down = Scripted::failing("refused");
        let specs = vec![DependencyCheckSpec::fatal(KAFKA, down.clone())
            .with_retries(3, Duration::from_millis(100))];

        let err = StartupDependencyChecker::new(&log)
            .verify(specs)
            .await
            .unwrap_err();

        assert!(matches!(err, StartupError::Aborted { .. }));
        assert_eq!(down.calls(), 3);
        assert_eq!(log.count(Severity::Warning), 2);
        assert_eq!(log.count(Severity::Critical), 1);
    }

    #[tokio::test]
    async fn skipped_probe_is_not_retried() {
        let log = RecordingLog::default();
        let idp = skipped();
        let specs = vec![DependencyCheckSpec::optional(IDENTITY_PROVIDER, idp.clone())
            .with_retries(5, Duration::ZERO)];

        StartupDependencyChecker::new(&log).verify(specs).await.unwrap();

        assert_eq!(idp.calls(), 1);
    }

    #[tokio::test]
    async fn empty_spec_list_is_ready() {
        let log = RecordingLog::default();
        let outcome = StartupDependencyChecker::new(&log).verify(vec![]).await.unwrap();
        assert!(outcome.is_ready());
        assert!(outcome.results.is_empty());
    }
}
