// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Cardwerk.

use std::time::Duration;

use thiserror::Error;

use crate::types::{ErrorClass, JobHandle, JobStatusSnapshot};

/// Top-level error type for all Cardwerk operations.
#[derive(Debug, Error)]
pub enum CardwerkError {
    // -- Discovery --
    #[error("printer discovery failed: {0}")]
    Discovery(String),

    #[error("no printers found; connect a printer and try again")]
    NoPrinterFound,

    // -- Session --
    #[error("failed to connect to printer: {0}")]
    Connection(String),

    #[error("printer is not ready. Status: {reported_status}")]
    NotReady { reported_status: String },

    /// Raised while releasing a session. Logged, never returned.
    #[error("teardown failed: {0}")]
    Teardown(String),

    // -- Job --
    #[error("missing or empty value for template field: {}", .fields.join(", "))]
    Validation {
        /// Every offending field, in template declaration order.
        fields: Vec<String>,
    },

    #[error("template upload failed: {0}")]
    TemplateUpload(String),

    #[error("printer rejected job: {0}")]
    Submission(String),

    #[error("printer driver error: {0}")]
    Driver(String),

    // -- Polling terminals --
    #[error("job status polling timed out after {} seconds", .limit.as_secs())]
    PollingTimeout { job_id: JobHandle, limit: Duration },

    #[error("job {job_id} timed out waiting for a card and was cancelled: {snapshot}")]
    FeedTimeout {
        job_id: JobHandle,
        snapshot: JobStatusSnapshot,
    },

    #[error("job {job_id} stopped on printer alarm: {snapshot}")]
    DeviceAlarm {
        job_id: JobHandle,
        snapshot: JobStatusSnapshot,
    },

    #[error("job {job_id} stopped on printer error: {snapshot}")]
    DeviceError {
        job_id: JobHandle,
        snapshot: JobStatusSnapshot,
    },

    #[error("job {job_id} ended without printing: {snapshot}")]
    JobFailed {
        job_id: JobHandle,
        snapshot: JobStatusSnapshot,
    },

    // -- Retry --
    #[error("error printing template after {attempts} {}: {last}", attempt_noun(.attempts))]
    Exhausted {
        attempts: u32,
        last: Box<CardwerkError>,
    },

    // -- Storage / config --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CardwerkError {
    /// Builds the device-terminal error for a snapshot with an alarm or error code.
    pub fn from_fault(job_id: JobHandle, snapshot: JobStatusSnapshot) -> Self {
        if snapshot.alarm.is_set() {
            Self::DeviceAlarm { job_id, snapshot }
        } else {
            Self::DeviceError { job_id, snapshot }
        }
    }

    /// Whether rerunning the whole attempt can change the result.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation { .. } => ErrorClass::Permanent,
            Self::Exhausted { last, .. } => last.class(),
            _ => ErrorClass::Transient,
        }
    }

    /// The job and final snapshot, for errors the device itself reported.
    pub fn snapshot(&self) -> Option<(JobHandle, &JobStatusSnapshot)> {
        match self {
            Self::FeedTimeout { job_id, snapshot }
            | Self::DeviceAlarm { job_id, snapshot }
            | Self::DeviceError { job_id, snapshot }
            | Self::JobFailed { job_id, snapshot } => Some((*job_id, snapshot)),
            Self::Exhausted { last, .. } => last.snapshot(),
            _ => None,
        }
    }

    /// The innermost attempt error, looking through `Exhausted`.
    pub fn root(&self) -> &CardwerkError {
        match self {
            Self::Exhausted { last, .. } => last.root(),
            other => other,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self.root(),
            Self::PollingTimeout { .. } | Self::FeedTimeout { .. }
        )
    }
}

fn attempt_noun(attempts: &u32) -> &'static str {
    if *attempts == 1 { "attempt" } else { "attempts" }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CardwerkError>;
