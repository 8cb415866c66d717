// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-printer mutual exclusion.
//
// A card printer handles one job at a time and the driver does not protect
// against two sessions on the same device. Callers that may print to the
// same target concurrently take that target's gate first; callers using
// different targets never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use cardwerk_core::types::PrinterTarget;

/// One async lock per printer target, created on first use.
#[derive(Default)]
pub struct TargetGates {
    gates: Mutex<HashMap<PrinterTarget, Arc<AsyncMutex<()>>>>,
}

impl TargetGates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no one else holds `target`, then hold it until the guard drops.
    pub async fn acquire(&self, target: &PrinterTarget) -> OwnedMutexGuard<()> {
        let gate = {
            let mut gates = self.gates.lock().expect("gate map lock poisoned");
            Arc::clone(gates.entry(target.clone()).or_default())
        };
        if let Ok(guard) = Arc::clone(&gate).try_lock_owned() {
            return guard;
        }
        debug!(printer = %target, "waiting for printer to become free");
        gate.lock_owned().await
    }

    /// Number of targets that have been gated so far.
    pub fn len(&self) -> usize {
        self.gates.lock().expect("gate map lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
