// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Caller-facing failure descriptions.
//
// Device-terminal errors carry their final snapshot, so most failures are
// described straight from structured fields. Opaque driver text is scanned
// for `status:`, `position:`, `alarm:` and `error:` tokens as a fallback.
// Classification never fails: the worst case is a generic message plus the
// original text.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::CardwerkError;
use crate::types::{JobHandle, JobStatusSnapshot, PrinterTarget};

/// Fallback when nothing useful can be extracted from a failure.
pub const GENERIC_MESSAGE: &str = "An unexpected printer error occurred.";

static STATUS_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"status:(\w+)").unwrap());
static POSITION_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"position:(\w+)").unwrap());
static ALARM_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"alarm:(\d+)").unwrap());
static ERROR_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"error:(\d+)").unwrap());

/// Human-readable text for a card printer alarm code.
pub fn alarm_message(code: u32) -> String {
    match code {
        4001 => "Media: Out of cards. Please load cards into the printer.".into(),
        4002 => "Media: Card jam. Please check and clear the card path.".into(),
        4003 => "Ribbon: Out of ribbon. Please replace the ribbon.".into(),
        4004 => "Ribbon: Ribbon jam. Please check and clear the ribbon path.".into(),
        4005 => "Printer: Cover open. Please close the printer cover.".into(),
        4006 => "Printer: Temperature error. Please wait for the printer to cool down.".into(),
        4007 => "Printer: Communication error. Please check the connection.".into(),
        _ => format!("Printer error: Alarm code {code}"),
    }
}

/// Structured description of a failed print, serialized as the body of a
/// 422 response. Absent fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub printer_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub printer_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm_code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarm_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Original failure text, kept for debugging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_message: Option<String>,
}

impl ErrorDetail {
    fn with_printer(mut self, printer: Option<&PrinterTarget>) -> Self {
        if let Some(target) = printer {
            self.printer_used = Some(target.to_string());
            self.printer_type = Some(target.kind().label().to_string());
        }
        self
    }
}

/// Describe a terminal snapshot reported by the device.
pub fn describe_snapshot(
    job_id: JobHandle,
    printer: Option<&PrinterTarget>,
    snapshot: &JobStatusSnapshot,
) -> ErrorDetail {
    let mut detail = ErrorDetail {
        job_id: Some(job_id),
        status: Some(snapshot.print_status.clone()),
        position: Some(snapshot.card_position.clone()),
        ..Default::default()
    }
    .with_printer(printer);

    if snapshot.alarm.is_set() {
        detail.alarm_code = Some(snapshot.alarm.code);
        detail.alarm_message = Some(alarm_message(snapshot.alarm.code));
    }
    if snapshot.error.is_set() {
        detail.error_code = Some(snapshot.error.code);
        detail.error_message = Some(if snapshot.error.description.is_empty() {
            format!("Printer error: Error code {}", snapshot.error.code)
        } else {
            snapshot.error.description.clone()
        });
    }
    detail
}

/// Scan opaque failure text for embedded status tokens.
pub fn describe_text(text: &str) -> ErrorDetail {
    let capture = |re: &Regex| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };

    let mut detail = ErrorDetail {
        status: capture(&STATUS_TOKEN),
        position: capture(&POSITION_TOKEN),
        ..Default::default()
    };
    // Codes too large for u32 are ignored rather than failing the description.
    if let Some(code) = capture(&ALARM_TOKEN).and_then(|c| c.parse::<u32>().ok()) {
        detail.alarm_code = Some(code);
        detail.alarm_message = Some(alarm_message(code));
    }
    detail.error_code = capture(&ERROR_TOKEN).and_then(|c| c.parse::<u32>().ok());

    let extracted = detail.status.is_some()
        || detail.position.is_some()
        || detail.alarm_code.is_some()
        || detail.error_code.is_some();
    if !extracted {
        detail.message = Some(GENERIC_MESSAGE.into());
    }
    detail.exception_message = Some(text.to_string());
    detail
}

/// Convert any print failure into a caller-facing description.
pub fn describe_error(err: &CardwerkError, printer: Option<&PrinterTarget>) -> ErrorDetail {
    let root = err.root();

    let mut detail = match root {
        CardwerkError::PollingTimeout { job_id, .. } => ErrorDetail {
            job_id: Some(*job_id),
            message: Some(root.to_string()),
            ..Default::default()
        }
        .with_printer(printer),

        CardwerkError::Validation { .. }
        | CardwerkError::NotReady { .. }
        | CardwerkError::NoPrinterFound => ErrorDetail {
            message: Some(root.to_string()),
            ..Default::default()
        }
        .with_printer(printer),

        _ => match err.snapshot() {
            Some((job_id, snapshot)) => describe_snapshot(job_id, printer, snapshot),
            None => describe_text(&root.to_string()).with_printer(printer),
        },
    };

    let kind = if err.is_timeout() {
        "Timeout"
    } else {
        failure_kind(root)
    };
    detail.error = Some(kind.into());
    if detail.exception_message.is_none() {
        detail.exception_message = Some(err.to_string());
    }
    detail
}

/// Short category label for the `error` field.
fn failure_kind(err: &CardwerkError) -> &'static str {
    match err {
        CardwerkError::DeviceAlarm { .. } => "DeviceAlarm",
        CardwerkError::DeviceError { .. } => "DeviceError",
        CardwerkError::JobFailed { .. } => "JobFailed",
        CardwerkError::Validation { .. } => "Validation",
        CardwerkError::NotReady { .. } => "NotReady",
        CardwerkError::Connection(_) => "Connection",
        CardwerkError::Submission(_) => "Submission",
        CardwerkError::TemplateUpload(_) => "TemplateUpload",
        CardwerkError::NoPrinterFound | CardwerkError::Discovery(_) => "Discovery",
        _ => "PrinterError",
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn out_of_cards_alarm_from_snapshot() {
        let snap = JobStatusSnapshot::new("in_progress", "feeding").with_alarm(4001, "whatever the device says");
        let detail = describe_snapshot(JobHandle(12), Some(&PrinterTarget::usb("zc350")), &snap);
        assert_eq!(detail.alarm_code, Some(4001));
        assert_eq!(
            detail.alarm_message.as_deref(),
            Some("Media: Out of cards. Please load cards into the printer.")
        );
        assert_eq!(detail.printer_type.as_deref(), Some("USB"));
        assert_eq!(detail.printer_used.as_deref(), Some("USB:zc350"));
        assert_eq!(detail.status.as_deref(), Some("in_progress"));
        assert_eq!(detail.position.as_deref(), Some("feeding"));
        assert_eq!(detail.error_code, None);
    }

    #[test]
    fn unmapped_alarm_code() {
        assert_eq!(alarm_message(4999), "Printer error: Alarm code 4999");
        assert_eq!(alarm_message(0), "Printer error: Alarm code 0");
    }

    #[test]
    fn alarm_table_is_complete() {
        for code in 4001..=4007 {
            assert!(!alarm_message(code).starts_with("Printer error: Alarm code"), "{code}");
        }
    }

    #[test]
    fn text_tokens_are_extracted() {
        let detail = describe_text("Job 3: status:error, position:ejecting, alarm:4002, error:17");
        assert_eq!(detail.status.as_deref(), Some("error"));
        assert_eq!(detail.position.as_deref(), Some("ejecting"));
        assert_eq!(detail.alarm_code, Some(4002));
        assert_eq!(
            detail.alarm_message.as_deref(),
            Some("Media: Card jam. Please check and clear the card path.")
        );
        assert_eq!(detail.error_code, Some(17));
        assert_eq!(detail.message, None);
    }

    #[test]
    fn text_without_tokens_degrades_to_generic() {
        let detail = describe_text("USB pipe stalled");
        assert_eq!(detail.message.as_deref(), Some(GENERIC_MESSAGE));
        assert_eq!(detail.exception_message.as_deref(), Some("USB pipe stalled"));
    }

    #[test]
    fn oversized_alarm_code_does_not_panic() {
        let detail = describe_text("alarm:99999999999999999999");
        assert_eq!(detail.alarm_code, None);
        assert_eq!(detail.message.as_deref(), Some(GENERIC_MESSAGE));
    }

    #[test]
    fn exhausted_alarm_uses_structured_snapshot() {
        let err = CardwerkError::Exhausted {
            attempts: 3,
            last: Box::new(CardwerkError::from_fault(
                JobHandle(8),
                JobStatusSnapshot::new("in_progress", "printing").with_alarm(4005, ""),
            )),
        };
        let detail = describe_error(&err, Some(&PrinterTarget::network("10.1.1.5")));
        assert_eq!(detail.error.as_deref(), Some("DeviceAlarm"));
        assert_eq!(detail.job_id, Some(JobHandle(8)));
        assert_eq!(detail.alarm_code, Some(4005));
        assert_eq!(
            detail.alarm_message.as_deref(),
            Some("Printer: Cover open. Please close the printer cover.")
        );
        assert_eq!(detail.printer_type.as_deref(), Some("Network"));
        assert!(detail.exception_message.unwrap().contains("after 3 attempts"));
    }

    #[test]
    fn polling_timeout_is_labelled_timeout() {
        let err = CardwerkError::PollingTimeout {
            job_id: JobHandle(2),
            limit: Duration::from_secs(60),
        };
        let detail = describe_error(&err, None);
        assert_eq!(detail.error.as_deref(), Some("Timeout"));
        assert_eq!(
            detail.message.as_deref(),
            Some("job status polling timed out after 60 seconds")
        );
    }

    #[test]
    fn exhausted_feed_timeout_is_labelled_timeout() {
        let err = CardwerkError::Exhausted {
            attempts: 3,
            last: Box::new(CardwerkError::FeedTimeout {
                job_id: JobHandle(5),
                snapshot: JobStatusSnapshot::new("in_progress", "feeding"),
            }),
        };
        let detail = describe_error(&err, Some(&PrinterTarget::network("10.0.0.8")));
        assert_eq!(detail.error.as_deref(), Some("Timeout"));
        assert_eq!(detail.position.as_deref(), Some("feeding"));
        assert_eq!(detail.printer_type.as_deref(), Some("Network"));
    }

    #[test]
    fn opaque_driver_text_falls_back_to_token_scan() {
        let err = CardwerkError::Driver("getJobStatus failed: status:error position:out alarm:4003".into());
        let detail = describe_error(&err, None);
        assert_eq!(detail.error.as_deref(), Some("PrinterError"));
        assert_eq!(detail.alarm_code, Some(4003));
        assert_eq!(detail.status.as_deref(), Some("error"));
    }

    #[test]
    fn error_code_without_description_gets_fallback_text() {
        let snap = JobStatusSnapshot::new("error", "out").with_error(21, "");
        let detail = describe_snapshot(JobHandle(1), None, &snap);
        assert_eq!(detail.error_message.as_deref(), Some("Printer error: Error code 21"));
    }

    #[test]
    fn serialized_detail_omits_absent_fields() {
        let json = serde_json::to_value(describe_text("boom")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"message": GENERIC_MESSAGE, "exceptionMessage": "boom"})
        );
    }
}
