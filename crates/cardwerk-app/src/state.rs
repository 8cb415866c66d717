// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared server state: discovery, the orchestrator and the card template.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use cardwerk_core::config::AppConfig;
use cardwerk_core::error::Result;
use cardwerk_core::types::Template;
use cardwerk_print::{PrintOrchestrator, PrinterDiscovery, PrinterDriver};

/// Everything a request handler needs, shared behind an `Arc`.
pub struct AppState<D> {
    pub discovery: PrinterDiscovery<D>,
    pub orchestrator: PrintOrchestrator<D>,
    pub template_path: PathBuf,
    pub copies: u32,
}

impl<D: PrinterDriver> AppState<D> {
    pub fn new(driver: Arc<D>, config: &AppConfig) -> Self {
        let printer = &config.printer;
        Self {
            discovery: PrinterDiscovery::new(Arc::clone(&driver), printer),
            orchestrator: PrintOrchestrator::new(
                driver,
                printer.retry_config(),
                printer.poll_config(),
            ),
            template_path: config.template_path.clone(),
            copies: printer.copies,
        }
    }

    /// Read the card template from disk. `None` when the file does not exist.
    ///
    /// The file is re-read on every call so edits take effect without a restart.
    pub async fn load_template(&self) -> Result<Option<Template>> {
        match tokio::fs::read_to_string(&self.template_path).await {
            Ok(data) => {
                debug!(path = %self.template_path.display(), bytes = data.len(), "template loaded");
                Ok(Some(Template::new(data)))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
