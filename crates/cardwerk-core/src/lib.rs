// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cardwerk — Core types, errors and failure classification shared across all crates.

pub mod classify;
pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, PollConfig, PrinterConfig, RetryConfig};
pub use error::CardwerkError;
pub use types::*;
