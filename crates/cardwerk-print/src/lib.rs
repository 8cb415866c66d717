// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cardwerk Print — device sessions, job status polling, whole-attempt retry
// and printer discovery, all driven through the `PrinterDriver` seam. A
// scripted in-memory driver (`sim`) backs the tests and the demo server.

pub mod discovery;
pub mod driver;
pub mod gate;
pub mod poller;
pub mod retry;
pub mod session;
pub mod sim;
pub mod validate;

pub use discovery::{DiscoveredPrinters, PrinterDiscovery};
pub use driver::PrinterDriver;
pub use gate::TargetGates;
pub use retry::{AttemptOutcome, PrintOrchestrator};
pub use session::DeviceSession;
pub use sim::SimulatedDriver;
