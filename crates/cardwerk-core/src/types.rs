// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Cardwerk card printing service.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Transport family a printer is reachable over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    #[serde(rename = "USB")]
    Usb,
    Network,
}

impl TargetKind {
    /// Label reported to callers as `printerType`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Usb => "USB",
            Self::Network => "Network",
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// An addressable card printer, as produced by discovery.
///
/// Immutable once discovered. The address is transport specific: a device
/// path or serial for USB, a host (optionally with port) for network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "address")]
pub enum PrinterTarget {
    #[serde(rename = "USB")]
    Usb(String),
    Network(String),
}

impl PrinterTarget {
    pub fn usb(address: impl Into<String>) -> Self {
        Self::Usb(address.into())
    }

    pub fn network(address: impl Into<String>) -> Self {
        Self::Network(address.into())
    }

    pub fn kind(&self) -> TargetKind {
        match self {
            Self::Usb(_) => TargetKind::Usb,
            Self::Network(_) => TargetKind::Network,
        }
    }

    pub fn address(&self) -> &str {
        match self {
            Self::Usb(address) | Self::Network(address) => address,
        }
    }
}

impl std::fmt::Display for PrinterTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.address())
    }
}

/// A card template document and the name it is stored under on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub data: String,
}

impl Template {
    /// Name used when the caller does not choose one.
    pub const DEFAULT_NAME: &'static str = "template";

    pub fn new(data: impl Into<String>) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            data: data.into(),
        }
    }
}

/// Caller-supplied field values keyed by template field name (case-sensitive).
pub type FieldData = HashMap<String, String>;

/// Job identifier returned by the device on submission.
///
/// Only meaningful within the device session that submitted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(pub i32);

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A numeric alarm or error code with the device's description.
/// Code `0` means none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCode {
    pub code: u32,
    pub description: String,
}

impl DeviceCode {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(code: u32, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    pub fn is_set(&self) -> bool {
        self.code > 0
    }
}

/// One polled observation of a submitted job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusSnapshot {
    pub print_status: String,
    pub card_position: String,
    pub alarm: DeviceCode,
    pub error: DeviceCode,
}

impl JobStatusSnapshot {
    pub fn new(print_status: impl Into<String>, card_position: impl Into<String>) -> Self {
        Self {
            print_status: print_status.into(),
            card_position: card_position.into(),
            alarm: DeviceCode::none(),
            error: DeviceCode::none(),
        }
    }

    pub fn with_alarm(mut self, code: u32, description: impl Into<String>) -> Self {
        self.alarm = DeviceCode::new(code, description);
        self
    }

    pub fn with_error(mut self, code: u32, description: impl Into<String>) -> Self {
        self.error = DeviceCode::new(code, description);
        self
    }

    /// Alarm or error code set. Always takes precedence over the text fields.
    pub fn has_device_fault(&self) -> bool {
        self.alarm.is_set() || self.error.is_set()
    }

    pub fn is_done(&self) -> bool {
        self.print_status.contains("done_ok")
    }

    /// The device stopped the job on its own.
    pub fn is_stopped(&self) -> bool {
        self.print_status.contains("error") || self.print_status.contains("cancelled")
    }

    pub fn is_feeding(&self) -> bool {
        self.card_position.contains("feeding")
    }
}

impl std::fmt::Display for JobStatusSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "status:{}, position:{}, alarm:{}",
            self.print_status, self.card_position, self.alarm.code
        )?;
        if self.alarm.is_set() {
            write!(f, " ({})", self.alarm.description)?;
        }
        write!(f, ", error:{}", self.error.code)?;
        if self.error.is_set() {
            write!(f, " ({})", self.error.description)?;
        }
        Ok(())
    }
}

/// Device status as reported before a job is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterStatus {
    pub status: String,
}

impl PrinterStatus {
    /// Only `ready` and `idle` accept a new job.
    pub fn is_ready(&self) -> bool {
        self.status == "ready" || self.status == "idle"
    }
}

/// A job that reached `done_ok`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedJob {
    pub job_id: JobHandle,
    pub printer: PrinterTarget,
    pub snapshot: JobStatusSnapshot,
    /// Attempt number (1-based) that succeeded.
    pub attempt: u32,
}

/// Classification of errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Rerunning the whole attempt may succeed.
    Transient,
    /// Rerunning cannot help until the caller changes the request.
    Permanent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_display_matches_device_log_shape() {
        let snap = JobStatusSnapshot::new("in_progress", "feeding").with_alarm(4001, "out of cards");
        assert_eq!(
            snap.to_string(),
            "status:in_progress, position:feeding, alarm:4001 (out of cards), error:0"
        );
    }

    #[test]
    fn target_serializes_as_tagged_address() {
        let json = serde_json::to_value(PrinterTarget::usb("usb-001")).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "USB", "address": "usb-001"}));
        assert_eq!(PrinterTarget::network("10.0.0.9").to_string(), "Network:10.0.0.9");
    }

    #[test]
    fn ready_and_idle_are_the_only_ready_states() {
        for (status, ready) in [("ready", true), ("idle", true), ("busy", false), ("Ready", false)] {
            let s = PrinterStatus { status: status.into() };
            assert_eq!(s.is_ready(), ready, "{status}");
        }
    }

    #[test]
    fn stopped_covers_error_and_cancelled() {
        assert!(JobStatusSnapshot::new("error", "out").is_stopped());
        assert!(JobStatusSnapshot::new("cancelled", "out").is_stopped());
        assert!(!JobStatusSnapshot::new("in_progress", "feeding").is_stopped());
    }
}
