// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer discovery over USB and the local network.
//
// Both enumerations are run concurrently through the driver and joined.
// Enumeration is slow, so the first non-empty result is kept for the life of
// the process. The cache is populated under an async lock: concurrent callers
// wait for the one enumeration in flight instead of starting their own.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use cardwerk_core::config::PrinterConfig;
use cardwerk_core::error::{CardwerkError, Result};
use cardwerk_core::types::PrinterTarget;

use crate::driver::PrinterDriver;

/// The printers found by one discovery run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredPrinters {
    pub usb_printers: Vec<PrinterTarget>,
    pub network_printers: Vec<PrinterTarget>,
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveredPrinters {
    pub fn is_empty(&self) -> bool {
        self.usb_printers.is_empty() && self.network_printers.is_empty()
    }

    /// First USB printer, else first network printer.
    pub fn preferred(&self) -> Option<&PrinterTarget> {
        self.usb_printers.iter().chain(&self.network_printers).next()
    }
}

/// Discovery front end with a process-lifetime cache.
pub struct PrinterDiscovery<D> {
    driver: Arc<D>,
    usb_enabled: bool,
    network_enabled: bool,
    cache: Mutex<Option<DiscoveredPrinters>>,
}

impl<D: PrinterDriver> PrinterDiscovery<D> {
    pub fn new(driver: Arc<D>, config: &PrinterConfig) -> Self {
        Self {
            driver,
            usb_enabled: config.enable_usb_discovery,
            network_enabled: config.enable_network_discovery,
            cache: Mutex::new(None),
        }
    }

    /// Return the cached printers, enumerating first if nothing is cached.
    ///
    /// Empty results are returned but not cached, so the next call looks again.
    pub async fn discover(&self) -> Result<DiscoveredPrinters> {
        let mut cache = self.cache.lock().await;
        if let Some(found) = cache.as_ref() {
            debug!("using cached printer discovery");
            return Ok(found.clone());
        }

        let found = self.enumerate().await?;
        if found.is_empty() {
            warn!("no printers found");
        } else {
            *cache = Some(found.clone());
        }
        Ok(found)
    }

    /// Convenience: discover, then pick the preferred printer.
    pub async fn select_target(&self) -> Result<PrinterTarget> {
        self.discover()
            .await?
            .preferred()
            .cloned()
            .ok_or(CardwerkError::NoPrinterFound)
    }

    /// Forget cached results so the next call enumerates again.
    pub async fn reset_cache(&self) {
        *self.cache.lock().await = None;
        debug!("printer discovery cache cleared");
    }

    async fn enumerate(&self) -> Result<DiscoveredPrinters> {
        let usb = async {
            if !self.usb_enabled {
                return Ok(Vec::new());
            }
            info!("searching for USB printers");
            self.driver.discover_usb().await
        };
        let network = async {
            if !self.network_enabled {
                return Vec::new();
            }
            info!("searching for network printers");
            match self.driver.discover_network().await {
                Ok(found) => found,
                Err(e) => {
                    warn!(error = %e, "network discovery failed; continuing without network printers");
                    Vec::new()
                }
            }
        };

        let (usb, network_printers) = tokio::join!(usb, network);
        let usb_printers =
            usb.map_err(|e| CardwerkError::Discovery(format!("USB discovery: {e}")))?;

        for printer in usb_printers.iter().chain(&network_printers) {
            debug!(printer = %printer, "found printer");
        }
        info!(
            usb = usb_printers.len(),
            network = network_printers.len(),
            "printer discovery finished"
        );

        Ok(DiscoveredPrinters {
            usb_printers,
            network_printers,
            discovered_at: Utc::now(),
        })
    }
}
