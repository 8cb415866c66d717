// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Printer-facing settings. Keys match the `PrinterConfig` section of the
/// JSON settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrinterConfig {
    pub enable_usb_discovery: bool,
    pub enable_network_discovery: bool,
    /// Upper bound on opening a device session.
    pub usb_connection_timeout_ms: u64,
    /// Upper bound on any single driver call during an attempt.
    pub usb_operation_timeout_ms: u64,
    /// When false, each print gets exactly one attempt.
    pub enable_usb_retries: bool,
    pub max_usb_retries: u32,
    pub usb_retry_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub card_feed_timeout_ms: u64,
    pub max_polling_time_ms: u64,
    pub copies: u32,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            enable_usb_discovery: true,
            enable_network_discovery: true,
            usb_connection_timeout_ms: 10_000,
            usb_operation_timeout_ms: 30_000,
            enable_usb_retries: true,
            max_usb_retries: 3,
            usb_retry_delay_ms: 2_000,
            poll_interval_ms: 1_000,
            card_feed_timeout_ms: 30_000,
            max_polling_time_ms: 60_000,
            copies: 1,
        }
    }
}

impl PrinterConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: if self.enable_usb_retries {
                self.max_usb_retries.max(1)
            } else {
                1
            },
            retry_delay: Duration::from_millis(self.usb_retry_delay_ms),
            connect_timeout: Duration::from_millis(self.usb_connection_timeout_ms),
            operation_timeout: Duration::from_millis(self.usb_operation_timeout_ms),
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            card_feed_timeout: Duration::from_millis(self.card_feed_timeout_ms),
            max_polling_time: Duration::from_millis(self.max_polling_time_ms),
        }
    }
}

/// Retry loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Fixed delay before every attempt after the first.
    pub retry_delay: Duration,
    pub connect_timeout: Duration,
    pub operation_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        PrinterConfig::default().retry_config()
    }
}

/// Status polling settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    /// Longest a single feed episode may last.
    pub card_feed_timeout: Duration,
    /// Hard ceiling measured from job submission.
    pub max_polling_time: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        PrinterConfig::default().poll_config()
    }
}

/// Settings for the HTTP front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub listen_addr: String,
    /// Card template served to every print request.
    pub template_path: PathBuf,
    #[serde(rename = "PrinterConfig")]
    pub printer: PrinterConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:53040".into(),
            template_path: PathBuf::from("Config").join("template.xml"),
            printer: PrinterConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load settings from a JSON file. A missing file yields the defaults;
    /// an unreadable or malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}
