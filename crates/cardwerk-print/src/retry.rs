// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print orchestration with whole-attempt retry.
//
// One attempt is the full lifecycle: open a device session, check the printer
// is ready, validate the caller's fields against the template, upload the
// template, submit, and poll to a terminal state. Any transient failure reruns
// the whole attempt after a fixed delay; a permanent one (bad input) is
// returned at once. The session is closed at the end of every attempt,
// successful or not, before the next one starts.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use cardwerk_core::FieldData;
use cardwerk_core::config::{PollConfig, RetryConfig};
use cardwerk_core::error::{CardwerkError, Result};
use cardwerk_core::types::{CompletedJob, ErrorClass, JobHandle, JobStatusSnapshot, PrinterTarget, Template};

use crate::driver::PrinterDriver;
use crate::gate::TargetGates;
use crate::poller::poll_job;
use crate::session::DeviceSession;
use crate::validate::validate_fields;

/// Outcome of [`PrintOrchestrator::print_with_retry`]: the completed job, or
/// the error of the last attempt.
pub type AttemptOutcome = Result<CompletedJob>;

/// Bookkeeping for one `print_with_retry` call.
#[derive(Debug, Default)]
struct RetryState {
    attempt: u32,
    last_error: Option<CardwerkError>,
    backoff_total: Duration,
}

impl RetryState {
    fn into_error(self) -> CardwerkError {
        match self.last_error {
            Some(last) => CardwerkError::Exhausted {
                attempts: self.attempt,
                last: Box::new(last),
            },
            None => CardwerkError::Driver("no print attempt was made".into()),
        }
    }
}

/// Runs print jobs against a driver, serialising work per printer.
pub struct PrintOrchestrator<D> {
    driver: Arc<D>,
    retry: RetryConfig,
    poll: PollConfig,
    gates: TargetGates,
}

impl<D: PrinterDriver> PrintOrchestrator<D> {
    pub fn new(driver: Arc<D>, retry: RetryConfig, poll: PollConfig) -> Self {
        Self {
            driver,
            retry,
            poll,
            gates: TargetGates::new(),
        }
    }

    /// Print `template` filled with `fields` on `target`, retrying the whole
    /// attempt on transient failure.
    ///
    /// Holds the target's gate for the entire call. When every attempt fails
    /// the last error is returned wrapped in `CardwerkError::Exhausted`.
    #[instrument(
        skip_all,
        fields(request_id = %Uuid::new_v4(), printer = %target, copies = copies)
    )]
    pub async fn print_with_retry(
        &self,
        target: &PrinterTarget,
        template: &Template,
        fields: &FieldData,
        copies: u32,
    ) -> AttemptOutcome {
        let _gate = self.gates.acquire(target).await;
        let max_attempts = self.retry.max_attempts.max(1);
        let mut state = RetryState::default();

        while state.attempt < max_attempts {
            state.attempt += 1;
            if state.attempt > 1 {
                debug!(
                    attempt = state.attempt,
                    delay_ms = self.retry.retry_delay.as_millis(),
                    "waiting before retry"
                );
                tokio::time::sleep(self.retry.retry_delay).await;
                state.backoff_total += self.retry.retry_delay;
            }

            match self
                .attempt(target, template, fields, copies, state.attempt)
                .await
            {
                Ok(job) => {
                    info!(
                        job_id = %job.job_id,
                        attempt = state.attempt,
                        "print job completed"
                    );
                    return Ok(job);
                }
                Err(e) if e.class() == ErrorClass::Permanent => {
                    warn!(attempt = state.attempt, error = %e, "permanent error; not retrying");
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        attempt = state.attempt,
                        max = max_attempts,
                        error = %e,
                        "print attempt failed"
                    );
                    state.last_error = Some(e);
                }
            }
        }

        warn!(
            attempts = state.attempt,
            backoff_ms = state.backoff_total.as_millis(),
            "retry limit exhausted"
        );
        Err(state.into_error())
    }

    /// One full attempt. The session opened here is always closed here.
    #[instrument(skip_all, fields(attempt = number))]
    async fn attempt(
        &self,
        target: &PrinterTarget,
        template: &Template,
        fields: &FieldData,
        copies: u32,
        number: u32,
    ) -> Result<CompletedJob> {
        let mut session = DeviceSession::open(
            self.driver.as_ref(),
            target,
            self.retry.connect_timeout,
            self.retry.operation_timeout,
        )
        .await?;

        let outcome = self.run(&session, template, fields, copies).await;
        session.close().await;

        let (job_id, snapshot) = outcome?;
        Ok(CompletedJob {
            job_id,
            printer: target.clone(),
            snapshot,
            attempt: number,
        })
    }

    async fn run(
        &self,
        session: &DeviceSession<'_, D>,
        template: &Template,
        fields: &FieldData,
        copies: u32,
    ) -> Result<(JobHandle, JobStatusSnapshot)> {
        session.verify_ready().await?;

        let declared = session.template_fields(&template.data).await?;
        validate_fields(&declared, fields)?;

        session.upload_template(&template.name, &template.data).await?;
        let job_id = session.submit(&template.name, fields, copies).await?;
        info!(job_id = %job_id, "job submitted");

        let snapshot = poll_job(session, job_id, &self.poll).await?;
        Ok((job_id, snapshot))
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;
    use crate::sim::SimulatedDriver;

    fn retry_config() -> RetryConfig {
        RetryConfig::default()
    }

    fn gem_fields() -> FieldData {
        FieldData::from([
            ("serialNumber".to_string(), "SN1".to_string()),
            ("gemstone".to_string(), "Diamond".to_string()),
        ])
    }

    fn gem_driver() -> SimulatedDriver {
        SimulatedDriver::new().with_template_fields(&["serialNumber", "gemstone"])
    }

    fn orchestrator(driver: SimulatedDriver, retry: RetryConfig) -> (Arc<SimulatedDriver>, PrintOrchestrator<SimulatedDriver>) {
        let driver = Arc::new(driver);
        let orchestrator = PrintOrchestrator::new(Arc::clone(&driver), retry, PollConfig::default());
        (driver, orchestrator)
    }

    fn template() -> Template {
        Template::new("<template/>")
    }

    #[tokio::test(start_paused = true)]
    async fn completes_and_tears_down_once() {
        let (driver, orch) = orchestrator(gem_driver(), retry_config());
        let target = PrinterTarget::usb("sim-0");

        let job = orch
            .print_with_retry(&target, &template(), &gem_fields(), 1)
            .await
            .unwrap();

        assert_eq!(job.job_id, JobHandle(1));
        assert_eq!(job.attempt, 1);
        assert_eq!(job.printer, target);
        assert!(job.snapshot.is_done());

        let stats = driver.stats();
        assert_eq!(stats.status_polls, 3);
        assert_eq!(stats.handles_destroyed, 1);
        assert_eq!(stats.connections_closed, 1);
        assert_eq!(stats.uploads, 1);
        assert!(stats.is_balanced());
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_connection_failures() {
        let (driver, orch) = orchestrator(gem_driver().fail_handles(2), retry_config());
        let started = Instant::now();

        let job = orch
            .print_with_retry(&PrinterTarget::usb("sim-0"), &template(), &gem_fields(), 1)
            .await
            .unwrap();

        assert_eq!(job.attempt, 3);
        // Two retry delays plus two seconds of polling.
        assert_eq!(started.elapsed(), Duration::from_secs(6));

        let stats = driver.stats();
        assert_eq!(stats.connections_opened, 3);
        assert_eq!(stats.connections_closed, 3);
        assert_eq!(stats.handles_created, 1);
        assert_eq!(stats.handles_destroyed, 1);
        assert_eq!(stats.submissions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failures_are_retried() {
        let (driver, orch) = orchestrator(gem_driver().fail_connections(2), retry_config());
        let job = orch
            .print_with_retry(&PrinterTarget::network("10.0.0.5"), &template(), &gem_fields(), 1)
            .await
            .unwrap();
        assert_eq!(job.attempt, 3);
        assert!(driver.stats().is_balanced());
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_wraps_last_error() {
        let (driver, orch) = orchestrator(gem_driver().fail_handles(3), retry_config());

        let err = orch
            .print_with_retry(&PrinterTarget::usb("sim-0"), &template(), &gem_fields(), 1)
            .await
            .unwrap_err();

        match &err {
            CardwerkError::Exhausted { attempts, last } => {
                assert_eq!(*attempts, 3);
                assert!(matches!(**last, CardwerkError::Connection(_)));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert!(err.to_string().contains("after 3 attempts"), "{err}");

        let stats = driver.stats();
        assert_eq!(stats.connections_opened, 3);
        assert_eq!(stats.connections_closed, 3);
        assert!(stats.is_balanced());
    }

    #[tokio::test(start_paused = true)]
    async fn device_faults_on_every_attempt_leak_nothing() {
        let alarm = JobStatusSnapshot::new("in_progress", "feeding").with_alarm(4002, "card jam");
        let (driver, orch) = orchestrator(gem_driver().with_script(vec![alarm]), retry_config());

        let err = orch
            .print_with_retry(&PrinterTarget::usb("sim-0"), &template(), &gem_fields(), 1)
            .await
            .unwrap_err();

        assert!(matches!(err.root(), CardwerkError::DeviceAlarm { .. }));
        let stats = driver.stats();
        assert_eq!(stats.submissions, 3);
        assert_eq!(stats.cancels, 3);
        assert_eq!(stats.handles_destroyed, 3);
        assert_eq!(stats.connections_closed, 3);
        assert!(stats.is_balanced());
    }

    #[tokio::test(start_paused = true)]
    async fn upload_failure_is_retried() {
        let (driver, orch) = orchestrator(gem_driver().fail_uploads(1), retry_config());

        let job = orch
            .print_with_retry(&PrinterTarget::usb("sim-0"), &template(), &gem_fields(), 1)
            .await
            .unwrap();

        assert_eq!(job.attempt, 2);
        let stats = driver.stats();
        assert_eq!(stats.uploads, 1);
        assert_eq!(stats.submissions, 1);
        assert_eq!(stats.connections_closed, 2);
        assert!(stats.is_balanced());
    }

    #[tokio::test(start_paused = true)]
    async fn submission_rejection_is_retried() {
        let (driver, orch) = orchestrator(gem_driver().fail_submissions(1), retry_config());

        let job = orch
            .print_with_retry(&PrinterTarget::usb("sim-0"), &template(), &gem_fields(), 1)
            .await
            .unwrap();

        assert_eq!(job.attempt, 2);
        assert_eq!(job.job_id, JobHandle(1));
        let stats = driver.stats();
        assert_eq!(stats.uploads, 2);
        assert_eq!(stats.handles_destroyed, 2);
        assert!(stats.is_balanced());
    }

    #[tokio::test(start_paused = true)]
    async fn upload_and_submission_errors_keep_their_kind() {
        let (_, orch) = orchestrator(
            gem_driver().fail_uploads(1).fail_submissions(3),
            retry_config(),
        );

        let err = orch
            .print_with_retry(&PrinterTarget::usb("sim-0"), &template(), &gem_fields(), 1)
            .await
            .unwrap_err();

        assert_eq!(err.class(), ErrorClass::Transient);
        assert!(matches!(err.root(), CardwerkError::Submission(_)), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn finished_jobs_are_released_with_their_handle() {
        let (driver, orch) = orchestrator(gem_driver(), retry_config());
        for _ in 0..3 {
            orch.print_with_retry(&PrinterTarget::usb("sim-0"), &template(), &gem_fields(), 1)
                .await
                .unwrap();
        }
        assert_eq!(driver.stats().submissions, 3);
        assert_eq!(driver.tracked_jobs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_teardown_does_not_lock_out_the_printer() {
        let (_, orch) = orchestrator(
            gem_driver().with_teardown_latency(Duration::from_secs(3600)),
            retry_config(),
        );
        let orch = Arc::new(orch);
        let started = Instant::now();

        let spawn = || {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move {
                orch.print_with_retry(&PrinterTarget::usb("sim-0"), &template(), &gem_fields(), 1)
                    .await
            })
        };
        let a = spawn();
        let b = spawn();
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        // Per job: two seconds of polling plus two teardown steps cut off at 30s.
        assert_eq!(started.elapsed(), Duration::from_secs(124));
    }

    #[tokio::test(start_paused = true)]
    async fn alarm_then_success_uses_fresh_job() {
        let driver = gem_driver().with_job_scripts(vec![
            vec![JobStatusSnapshot::new("in_progress", "feeding").with_alarm(4001, "out of cards")],
            vec![JobStatusSnapshot::new("done_ok", "ejected")],
        ]);
        let (driver, orch) = orchestrator(driver, retry_config());

        let job = orch
            .print_with_retry(&PrinterTarget::usb("sim-0"), &template(), &gem_fields(), 1)
            .await
            .unwrap();

        assert_eq!(job.attempt, 2);
        assert_eq!(job.job_id, JobHandle(2));
        assert_eq!(driver.stats().cancels, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn validation_failure_is_not_retried() {
        let (driver, orch) = orchestrator(gem_driver(), retry_config());
        let fields = FieldData::from([
            ("serialNumber".to_string(), "SN1".to_string()),
            ("gemstone".to_string(), String::new()),
        ]);

        let err = orch
            .print_with_retry(&PrinterTarget::usb("sim-0"), &template(), &fields, 1)
            .await
            .unwrap_err();

        match err {
            CardwerkError::Validation { fields } => assert_eq!(fields, vec!["gemstone"]),
            other => panic!("expected validation error, got {other:?}"),
        }
        let stats = driver.stats();
        assert_eq!(stats.connections_opened, 1);
        assert_eq!(stats.uploads, 0);
        assert_eq!(stats.submissions, 0);
        assert!(stats.is_balanced());
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_when_retries_disabled() {
        let retry = RetryConfig {
            max_attempts: 1,
            ..retry_config()
        };
        let (driver, orch) = orchestrator(gem_driver().fail_connections(1), retry);

        let err = orch
            .print_with_retry(&PrinterTarget::usb("sim-0"), &template(), &gem_fields(), 1)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("after 1 attempt:"), "{err}");
        assert_eq!(driver.stats().connections_opened, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn same_printer_jobs_run_one_after_another() {
        let (_, orch) = orchestrator(gem_driver(), retry_config());
        let orch = Arc::new(orch);
        let started = Instant::now();

        let spawn = |target: PrinterTarget| {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move {
                orch.print_with_retry(&target, &template(), &gem_fields(), 1).await
            })
        };
        let a = spawn(PrinterTarget::usb("sim-0"));
        let b = spawn(PrinterTarget::usb("sim-0"));
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        // Each job polls for two seconds; the second waits for the first.
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn different_printers_run_in_parallel() {
        let (_, orch) = orchestrator(gem_driver(), retry_config());
        let orch = Arc::new(orch);
        let started = Instant::now();

        let spawn = |target: PrinterTarget| {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move {
                orch.print_with_retry(&target, &template(), &gem_fields(), 1).await
            })
        };
        let a = spawn(PrinterTarget::usb("sim-0"));
        let b = spawn(PrinterTarget::network("10.0.0.5"));
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }
}
