// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cardwerk App — HTTP front end over the print orchestrator.

pub mod server;
pub mod state;

pub use server::{router, serve};
pub use state::AppState;
