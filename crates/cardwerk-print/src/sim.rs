// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory card printer.
//
// Stands in for the vendor driver in tests and in the demo server. Behaviour
// is scripted: each submitted job replays a sequence of status snapshots
// (the last one repeats forever), and connection or handle failures can be
// injected for the first N attempts. Every driver call is counted so callers
// can check that sessions were torn down and jobs cancelled exactly as often
// as expected.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use cardwerk_core::FieldData;
use cardwerk_core::error::{CardwerkError, Result};
use cardwerk_core::types::{JobHandle, JobStatusSnapshot, PrinterStatus, PrinterTarget};

use crate::driver::PrinterDriver;

/// Connection token handed out by [`SimulatedDriver`].
#[derive(Debug)]
pub struct SimConnection {
    id: u64,
}

/// Control handle token handed out by [`SimulatedDriver`].
#[derive(Debug)]
pub struct SimHandle {
    id: u64,
}

/// A submitted job and how far its status script has been replayed.
struct SimJob {
    handle: u64,
    script: Vec<JobStatusSnapshot>,
    tick: usize,
}

/// Call counters for a [`SimulatedDriver`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub discoveries: u32,
    pub connections_opened: u32,
    pub connections_closed: u32,
    pub handles_created: u32,
    pub handles_destroyed: u32,
    /// Accepted uploads.
    pub uploads: u32,
    /// Accepted submissions.
    pub submissions: u32,
    pub status_polls: u32,
    pub cancels: u32,
}

impl SimStats {
    /// Every opened connection and handle was released.
    pub fn is_balanced(&self) -> bool {
        self.connections_opened == self.connections_closed
            && self.handles_created == self.handles_destroyed
    }
}

#[derive(Default)]
struct Counters {
    discoveries: AtomicU32,
    connection_attempts: AtomicU32,
    handle_attempts: AtomicU32,
    upload_attempts: AtomicU32,
    submission_attempts: AtomicU32,
    connections_opened: AtomicU32,
    connections_closed: AtomicU32,
    handles_created: AtomicU32,
    handles_destroyed: AtomicU32,
    uploads: AtomicU32,
    submissions: AtomicU32,
    status_polls: AtomicU32,
    cancels: AtomicU32,
}

fn bump(counter: &AtomicU32) -> u32 {
    counter.fetch_add(1, Ordering::SeqCst) + 1
}

/// A scripted, fully in-memory [`PrinterDriver`].
pub struct SimulatedDriver {
    usb: Vec<PrinterTarget>,
    network: Vec<PrinterTarget>,
    network_fails: bool,
    printer_status: String,
    template_fields: Vec<String>,
    default_script: Vec<JobStatusSnapshot>,
    queued_scripts: Mutex<VecDeque<Vec<JobStatusSnapshot>>>,
    /// Jobs submitted through handles that are still alive.
    jobs: Mutex<HashMap<JobHandle, SimJob>>,
    fail_connections: u32,
    fail_handles: u32,
    fail_teardown: bool,
    fail_uploads: u32,
    fail_submissions: u32,
    status_latency: Duration,
    teardown_latency: Duration,
    discovery_latency: Duration,
    next_job: AtomicI32,
    next_token: AtomicU64,
    counters: Counters,
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDriver {
    /// A ready printer on one USB port that prints every job after three polls.
    pub fn new() -> Self {
        Self {
            usb: vec![PrinterTarget::usb("sim-usb-0")],
            network: Vec::new(),
            network_fails: false,
            printer_status: "ready".into(),
            template_fields: Vec::new(),
            default_script: vec![
                JobStatusSnapshot::new("in_progress", "feeding"),
                JobStatusSnapshot::new("in_progress", "printing"),
                JobStatusSnapshot::new("done_ok", "ejected"),
            ],
            queued_scripts: Mutex::new(VecDeque::new()),
            jobs: Mutex::new(HashMap::new()),
            fail_connections: 0,
            fail_handles: 0,
            fail_teardown: false,
            fail_uploads: 0,
            fail_submissions: 0,
            status_latency: Duration::ZERO,
            teardown_latency: Duration::ZERO,
            discovery_latency: Duration::ZERO,
            next_job: AtomicI32::new(1),
            next_token: AtomicU64::new(1),
            counters: Counters::default(),
        }
    }

    pub fn with_usb_targets(mut self, targets: Vec<PrinterTarget>) -> Self {
        self.usb = targets;
        self
    }

    pub fn with_network_targets(mut self, targets: Vec<PrinterTarget>) -> Self {
        self.network = targets;
        self
    }

    /// Network enumeration reports an error.
    pub fn fail_network_discovery(mut self) -> Self {
        self.network_fails = true;
        self
    }

    pub fn with_printer_status(mut self, status: &str) -> Self {
        self.printer_status = status.into();
        self
    }

    /// Fields every template declares.
    pub fn with_template_fields(mut self, fields: &[&str]) -> Self {
        self.template_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Status sequence replayed by every job without a queued script.
    pub fn with_script(mut self, script: Vec<JobStatusSnapshot>) -> Self {
        self.default_script = script;
        self
    }

    /// Per-job scripts, consumed in submission order.
    pub fn with_job_scripts(self, scripts: Vec<Vec<JobStatusSnapshot>>) -> Self {
        *self.queued_scripts.lock().expect("script lock poisoned") = scripts.into();
        self
    }

    /// The first `n` connection attempts fail.
    pub fn fail_connections(mut self, n: u32) -> Self {
        self.fail_connections = n;
        self
    }

    /// The first `n` control handle requests fail (after the connection opened).
    pub fn fail_handles(mut self, n: u32) -> Self {
        self.fail_handles = n;
        self
    }

    /// Destroying handles and closing connections report errors (the
    /// resources are still counted as released).
    pub fn fail_teardown(mut self) -> Self {
        self.fail_teardown = true;
        self
    }

    /// The first `n` template uploads fail.
    pub fn fail_uploads(mut self, n: u32) -> Self {
        self.fail_uploads = n;
        self
    }

    /// The first `n` job submissions are rejected.
    pub fn fail_submissions(mut self, n: u32) -> Self {
        self.fail_submissions = n;
        self
    }

    /// Delay before each teardown call answers.
    pub fn with_teardown_latency(mut self, latency: Duration) -> Self {
        self.teardown_latency = latency;
        self
    }

    /// Delay before each status answer (printer and job).
    pub fn with_status_latency(mut self, latency: Duration) -> Self {
        self.status_latency = latency;
        self
    }

    /// Delay before each enumeration answer.
    pub fn with_discovery_latency(mut self, latency: Duration) -> Self {
        self.discovery_latency = latency;
        self
    }

    pub fn stats(&self) -> SimStats {
        let c = &self.counters;
        let load = |a: &AtomicU32| a.load(Ordering::SeqCst);
        SimStats {
            discoveries: load(&c.discoveries),
            connections_opened: load(&c.connections_opened),
            connections_closed: load(&c.connections_closed),
            handles_created: load(&c.handles_created),
            handles_destroyed: load(&c.handles_destroyed),
            uploads: load(&c.uploads),
            submissions: load(&c.submissions),
            status_polls: load(&c.status_polls),
            cancels: load(&c.cancels),
        }
    }

    /// Jobs still held in memory. Released when their handle is destroyed.
    pub fn tracked_jobs(&self) -> usize {
        self.jobs.lock().expect("job lock poisoned").len()
    }

    fn token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::SeqCst)
    }

    async fn latency(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PrinterDriver for SimulatedDriver {
    type Connection = SimConnection;
    type Handle = SimHandle;

    async fn discover_usb(&self) -> Result<Vec<PrinterTarget>> {
        bump(&self.counters.discoveries);
        self.latency(self.discovery_latency).await;
        Ok(self.usb.clone())
    }

    async fn discover_network(&self) -> Result<Vec<PrinterTarget>> {
        self.latency(self.discovery_latency).await;
        if self.network_fails {
            return Err(CardwerkError::Discovery("network discovery handler reported an error".into()));
        }
        Ok(self.network.clone())
    }

    async fn open_connection(&self, target: &PrinterTarget) -> Result<SimConnection> {
        if bump(&self.counters.connection_attempts) <= self.fail_connections {
            return Err(CardwerkError::Connection(format!("{target}: device not responding")));
        }
        bump(&self.counters.connections_opened);
        let connection = SimConnection { id: self.token() };
        debug!(connection = connection.id, printer = %target, "sim connection opened");
        Ok(connection)
    }

    async fn control_handle(&self, connection: &SimConnection) -> Result<SimHandle> {
        if bump(&self.counters.handle_attempts) <= self.fail_handles {
            return Err(CardwerkError::Driver(format!(
                "connection {}: printer handshake failed",
                connection.id
            )));
        }
        bump(&self.counters.handles_created);
        Ok(SimHandle { id: self.token() })
    }

    async fn printer_status(&self, _handle: &SimHandle) -> Result<PrinterStatus> {
        self.latency(self.status_latency).await;
        Ok(PrinterStatus {
            status: self.printer_status.clone(),
        })
    }

    async fn upload_template(&self, handle: &SimHandle, name: &str, _data: &str) -> Result<()> {
        if bump(&self.counters.upload_attempts) <= self.fail_uploads {
            return Err(CardwerkError::Driver(format!("handle {}: no space for {name}", handle.id)));
        }
        bump(&self.counters.uploads);
        Ok(())
    }

    async fn template_fields(&self, _handle: &SimHandle, _data: &str) -> Result<Vec<String>> {
        Ok(self.template_fields.clone())
    }

    async fn submit_job(
        &self,
        handle: &SimHandle,
        template_name: &str,
        _fields: &FieldData,
        _copies: u32,
    ) -> Result<JobHandle> {
        if bump(&self.counters.submission_attempts) <= self.fail_submissions {
            return Err(CardwerkError::Driver(format!(
                "handle {}: job for {template_name} rejected",
                handle.id
            )));
        }
        bump(&self.counters.submissions);
        let job_id = JobHandle(self.next_job.fetch_add(1, Ordering::SeqCst));
        let script = self
            .queued_scripts
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| self.default_script.clone());
        self.jobs
            .lock()
            .expect("job lock poisoned")
            .insert(
                job_id,
                SimJob {
                    handle: handle.id,
                    script,
                    tick: 0,
                },
            );
        Ok(job_id)
    }

    async fn job_status(&self, _handle: &SimHandle, job_id: JobHandle) -> Result<JobStatusSnapshot> {
        self.latency(self.status_latency).await;
        bump(&self.counters.status_polls);
        let mut jobs = self.jobs.lock().expect("job lock poisoned");
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| CardwerkError::Driver(format!("unknown job {job_id}")))?;
        let snapshot = job
            .script
            .get(job.tick)
            .or_else(|| job.script.last())
            .cloned()
            .unwrap_or_else(|| JobStatusSnapshot::new("in_progress", "printing"));
        job.tick += 1;
        Ok(snapshot)
    }

    async fn cancel_job(&self, _handle: &SimHandle, job_id: JobHandle) -> Result<()> {
        bump(&self.counters.cancels);
        debug!(job_id = %job_id, "sim job cancelled");
        Ok(())
    }

    async fn destroy_handle(&self, handle: SimHandle) -> Result<()> {
        bump(&self.counters.handles_destroyed);
        self.jobs
            .lock()
            .expect("job lock poisoned")
            .retain(|_, job| job.handle != handle.id);
        self.latency(self.teardown_latency).await;
        if self.fail_teardown {
            return Err(CardwerkError::Driver(format!("handle {} already gone", handle.id)));
        }
        Ok(())
    }

    async fn close_connection(&self, connection: SimConnection) -> Result<()> {
        bump(&self.counters.connections_closed);
        self.latency(self.teardown_latency).await;
        if self.fail_teardown {
            return Err(CardwerkError::Driver(format!("connection {} reset", connection.id)));
        }
        Ok(())
    }
}
