// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Card printer driver seam.
//
// Transport handling, template parsing and raw status decoding belong to the
// vendor driver. Everything in this crate talks to the device only through
// this trait, which keeps the lifecycle logic testable against the simulated
// driver in `sim`.

use async_trait::async_trait;

use cardwerk_core::error::Result;
use cardwerk_core::types::{JobHandle, JobStatusSnapshot, PrinterStatus, PrinterTarget};

/// Operations a card printer driver must provide.
///
/// Errors should use `CardwerkError::Connection` for transport failures and
/// `CardwerkError::Driver` for anything else; the orchestrator maps
/// submission and upload failures to their own variants.
#[async_trait]
pub trait PrinterDriver: Send + Sync {
    /// An open transport to one printer.
    type Connection: Send + Sync;
    /// A printer control handle bound to a connection.
    type Handle: Send + Sync;

    /// Enumerate printers attached over USB.
    async fn discover_usb(&self) -> Result<Vec<PrinterTarget>>;

    /// Enumerate printers on the local network.
    async fn discover_network(&self) -> Result<Vec<PrinterTarget>>;

    async fn open_connection(&self, target: &PrinterTarget) -> Result<Self::Connection>;

    async fn control_handle(&self, connection: &Self::Connection) -> Result<Self::Handle>;

    async fn printer_status(&self, handle: &Self::Handle) -> Result<PrinterStatus>;

    /// Store template data on the device under `name`, replacing any previous copy.
    async fn upload_template(&self, handle: &Self::Handle, name: &str, data: &str) -> Result<()>;

    /// Field names declared by the template, in declaration order.
    async fn template_fields(&self, handle: &Self::Handle, data: &str) -> Result<Vec<String>>;

    /// Submit a print of the stored template filled with `fields`.
    async fn submit_job(
        &self,
        handle: &Self::Handle,
        template_name: &str,
        fields: &cardwerk_core::FieldData,
        copies: u32,
    ) -> Result<JobHandle>;

    async fn job_status(&self, handle: &Self::Handle, job_id: JobHandle) -> Result<JobStatusSnapshot>;

    async fn cancel_job(&self, handle: &Self::Handle, job_id: JobHandle) -> Result<()>;

    async fn destroy_handle(&self, handle: Self::Handle) -> Result<()>;

    async fn close_connection(&self, connection: Self::Connection) -> Result<()>;
}
