// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job status polling.
//
// After submission the device reports progress asynchronously, so we poll
// once per interval until the job reaches a terminal state. Two independent
// clocks run against tokio's monotonic `Instant`:
//
//   - the feed clock, restarted at the first tick of every feed episode,
//     catches a printer stuck waiting for a card;
//   - the polling ceiling, fixed at submission, bounds the whole loop.
//
// Alarm and error codes are checked first on every tick and always win over
// the free-text status and position fields.

use std::time::Duration;

use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, info, warn};

use cardwerk_core::config::PollConfig;
use cardwerk_core::error::{CardwerkError, Result};
use cardwerk_core::types::{JobHandle, JobStatusSnapshot};

use crate::driver::PrinterDriver;
use crate::session::DeviceSession;

/// What a single observation means for the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Keep polling.
    Pending,
    /// `done_ok` with no alarm or error code.
    Completed,
    /// Alarm or error code set.
    Fault,
    /// The device ended the job itself (`error` / `cancelled`).
    Stopped,
    /// The current feed episode outlasted the card feed timeout.
    FeedTimedOut,
}

/// Per-job feed tracking.
#[derive(Debug, Default)]
pub struct FeedWatch {
    /// Start of the current feed episode.
    episode_start: Option<Instant>,
}

impl FeedWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one snapshot observed at `now`.
    pub fn observe(
        &mut self,
        snapshot: &JobStatusSnapshot,
        now: Instant,
        card_feed_timeout: Duration,
    ) -> Tick {
        if snapshot.has_device_fault() {
            return Tick::Fault;
        }
        if snapshot.is_done() {
            return Tick::Completed;
        }
        if snapshot.is_stopped() {
            return Tick::Stopped;
        }
        if snapshot.is_feeding() {
            let start = *self.episode_start.get_or_insert(now);
            if now.duration_since(start) > card_feed_timeout {
                return Tick::FeedTimedOut;
            }
        } else {
            self.episode_start = None;
        }
        Tick::Pending
    }

    /// How long the current feed episode has lasted, if one is running.
    pub fn feeding_for(&self, now: Instant) -> Option<Duration> {
        self.episode_start.map(|start| now.duration_since(start))
    }
}

/// Poll `job_id` until it completes, fails, or a timeout fires.
///
/// Returns the final snapshot on `done_ok`. Every other terminal is an
/// error carrying that snapshot. A device cancel is issued once for alarm,
/// error-code and feed-timeout terminals; the polling ceiling and
/// device-stopped jobs are not cancelled.
pub async fn poll_job<D: PrinterDriver>(
    session: &DeviceSession<'_, D>,
    job_id: JobHandle,
    config: &PollConfig,
) -> Result<JobStatusSnapshot> {
    let ceiling = Instant::now() + config.max_polling_time;
    let mut feed = FeedWatch::new();

    let timed_out = || {
        warn!(job_id = %job_id, limit_ms = config.max_polling_time.as_millis(), "job status polling timed out");
        CardwerkError::PollingTimeout {
            job_id,
            limit: config.max_polling_time,
        }
    };

    loop {
        if Instant::now() >= ceiling {
            return Err(timed_out());
        }

        // A status read still in flight at the ceiling is abandoned.
        let snapshot = timeout_at(ceiling, session.job_status(job_id))
            .await
            .map_err(|_| timed_out())??;
        debug!(job_id = %job_id, "Job {job_id}: {snapshot}");

        let now = Instant::now();
        match feed.observe(&snapshot, now, config.card_feed_timeout) {
            Tick::Pending => {}
            Tick::Completed => {
                info!(job_id = %job_id, status = %snapshot.print_status, "job completed");
                return Ok(snapshot);
            }
            Tick::Fault => {
                warn!(
                    job_id = %job_id,
                    alarm = snapshot.alarm.code,
                    error = snapshot.error.code,
                    "job stopped by printer alarm or error"
                );
                cancel_quietly(session, job_id).await;
                return Err(CardwerkError::from_fault(job_id, snapshot));
            }
            Tick::Stopped => {
                warn!(
                    job_id = %job_id,
                    status = %snapshot.print_status,
                    detail = %snapshot.error.description,
                    "job ended on the printer without printing"
                );
                return Err(CardwerkError::JobFailed { job_id, snapshot });
            }
            Tick::FeedTimedOut => {
                warn!(
                    job_id = %job_id,
                    feeding_ms = feed.feeding_for(now).unwrap_or_default().as_millis(),
                    "job timed out waiting for a card; cancelling"
                );
                cancel_quietly(session, job_id).await;
                return Err(CardwerkError::FeedTimeout { job_id, snapshot });
            }
        }

        // Never sleep past the ceiling.
        sleep_until((Instant::now() + config.interval).min(ceiling)).await;
    }
}

async fn cancel_quietly<D: PrinterDriver>(session: &DeviceSession<'_, D>, job_id: JobHandle) {
    if let Err(e) = session.cancel(job_id).await {
        warn!(job_id = %job_id, error = %e, "cancel failed");
    }
}
