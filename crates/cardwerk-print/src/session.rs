// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device session: one connection plus one printer control handle.
//
// A session is opened at the start of every print attempt and closed at its
// end, whatever the outcome. Opening is all-or-nothing: if the control handle
// cannot be obtained, the freshly opened connection is closed before the
// error is returned. Closing is best effort: each teardown step is bounded by
// the operation timeout, and logs and swallows its own failure so the other
// step still runs.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, instrument, warn};

use cardwerk_core::FieldData;
use cardwerk_core::error::{CardwerkError, Result};
use cardwerk_core::types::{JobHandle, JobStatusSnapshot, PrinterTarget};

use crate::driver::PrinterDriver;

/// An open connection and control handle for a single printer.
pub struct DeviceSession<'d, D: PrinterDriver> {
    driver: &'d D,
    target: PrinterTarget,
    /// Bound on each driver call made through the session.
    operation_timeout: Duration,
    connection: Option<D::Connection>,
    handle: Option<D::Handle>,
}

impl<'d, D: PrinterDriver> DeviceSession<'d, D> {
    /// Open a connection to `target` and obtain a control handle over it.
    ///
    /// Both steps together must finish within `connect_timeout`. Any failure
    /// is reported as `CardwerkError::Connection`.
    #[instrument(skip_all, fields(printer = %target))]
    pub async fn open(
        driver: &'d D,
        target: &PrinterTarget,
        connect_timeout: Duration,
        operation_timeout: Duration,
    ) -> Result<Self> {
        let deadline = Instant::now() + connect_timeout;
        let timed_out = || {
            CardwerkError::Connection(format!(
                "connecting to {target} timed out after {}ms",
                connect_timeout.as_millis()
            ))
        };

        debug!("opening connection");
        let connection = timeout_at(deadline, driver.open_connection(target))
            .await
            .map_err(|_| timed_out())?
            .map_err(|e| match e {
                CardwerkError::Connection(_) => e,
                other => CardwerkError::Connection(format!("failed to create connection: {other}")),
            })?;

        let handle = match timeout_at(deadline, driver.control_handle(&connection)).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                close_connection_quietly(driver, connection, operation_timeout).await;
                return Err(CardwerkError::Connection(format!(
                    "failed to initialise printer: {e}"
                )));
            }
            Err(_) => {
                close_connection_quietly(driver, connection, operation_timeout).await;
                return Err(timed_out());
            }
        };

        info!("device session opened");
        Ok(Self {
            driver,
            target: target.clone(),
            operation_timeout,
            connection: Some(connection),
            handle: Some(handle),
        })
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some() || self.connection.is_some()
    }

    /// Fail unless the printer reports `ready` or `idle`.
    pub async fn verify_ready(&self) -> Result<()> {
        let handle = self.handle()?;
        let status = self
            .bounded("get printer status", self.driver.printer_status(handle))
            .await?;
        if status.is_ready() {
            debug!(status = %status.status, "printer ready");
            Ok(())
        } else {
            warn!(status = %status.status, "printer not ready");
            Err(CardwerkError::NotReady {
                reported_status: status.status,
            })
        }
    }

    pub async fn template_fields(&self, data: &str) -> Result<Vec<String>> {
        let handle = self.handle()?;
        self.bounded("read template fields", self.driver.template_fields(handle, data))
            .await
    }

    pub async fn upload_template(&self, name: &str, data: &str) -> Result<()> {
        let handle = self.handle()?;
        self.bounded("upload template", self.driver.upload_template(handle, name, data))
            .await
            .map_err(|e| CardwerkError::TemplateUpload(e.to_string()))
    }

    pub async fn submit(
        &self,
        template_name: &str,
        fields: &FieldData,
        copies: u32,
    ) -> Result<JobHandle> {
        let handle = self.handle()?;
        self.bounded(
            "submit job",
            self.driver.submit_job(handle, template_name, fields, copies),
        )
        .await
        .map_err(|e| CardwerkError::Submission(e.to_string()))
    }

    pub async fn job_status(&self, job_id: JobHandle) -> Result<JobStatusSnapshot> {
        let handle = self.handle()?;
        self.bounded("get job status", self.driver.job_status(handle, job_id))
            .await
    }

    pub async fn cancel(&self, job_id: JobHandle) -> Result<()> {
        let handle = self.handle()?;
        self.bounded("cancel job", self.driver.cancel_job(handle, job_id))
            .await
    }

    /// Release the control handle, then the connection.
    ///
    /// Idempotent. Never fails: teardown errors and timeouts are logged and
    /// dropped.
    pub async fn close(&mut self) {
        if let Some(handle) = self.handle.take()
            && let Err(e) = teardown_step(
                "destroy handle",
                self.operation_timeout,
                self.driver.destroy_handle(handle),
            )
            .await
        {
            warn!(printer = %self.target, error = %e, "ignoring teardown failure");
        }
        if let Some(connection) = self.connection.take() {
            close_connection_quietly(self.driver, connection, self.operation_timeout).await;
        }
        debug!(printer = %self.target, "device session closed");
    }

    fn handle(&self) -> Result<&D::Handle> {
        self.handle
            .as_ref()
            .ok_or_else(|| CardwerkError::Driver("device session is closed".into()))
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        timeout(self.operation_timeout, call).await.map_err(|_| {
            CardwerkError::Driver(format!(
                "{operation} timed out after {}ms",
                self.operation_timeout.as_millis()
            ))
        })?
    }
}

impl<D: PrinterDriver> Drop for DeviceSession<'_, D> {
    fn drop(&mut self) {
        if self.is_open() {
            warn!(printer = %self.target, "device session dropped without being closed");
        }
    }
}

async fn close_connection_quietly<D: PrinterDriver>(
    driver: &D,
    connection: D::Connection,
    limit: Duration,
) {
    if let Err(e) = teardown_step("close connection", limit, driver.close_connection(connection)).await {
        warn!(error = %e, "ignoring teardown failure");
    }
}

/// Run one teardown call under `limit`, reporting any failure as `Teardown`.
async fn teardown_step(
    step: &'static str,
    limit: Duration,
    call: impl Future<Output = Result<()>>,
) -> Result<()> {
    match timeout(limit, call).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(CardwerkError::Teardown(format!("{step}: {e}"))),
        Err(_) => Err(CardwerkError::Teardown(format!(
            "{step} timed out after {}ms",
            limit.as_millis()
        ))),
    }
}
