// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cardwerk — supervised card printing over USB or network.
//
// Entry point. Initialises logging, loads settings, and serves the HTTP API.
// No vendor driver is linked into this build, so the server runs against the
// simulated card printer.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use cardwerk_core::config::AppConfig;
use cardwerk_core::error::Result;
use cardwerk_print::SimulatedDriver;

/// Fields declared by the demo card template.
const DEMO_TEMPLATE_FIELDS: &[&str] = &[
    "serialNumber",
    "gemstone",
    "material",
    "totalCarat",
    "date",
    "qrcode",
];

#[derive(Parser, Debug)]
#[command(name = "cardwerk")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON settings file; missing means defaults
    #[arg(long, value_name = "FILE", default_value = "appsettings.json")]
    config: PathBuf,

    /// Address to listen on, overriding the settings file
    #[arg(long)]
    listen: Option<String>,

    /// Card template file, overriding the settings file
    #[arg(long, value_name = "FILE")]
    template: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Cardwerk stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = AppConfig::load(&args.config)?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(template) = args.template {
        config.template_path = template;
    }

    tracing::info!(config = %args.config.display(), "Cardwerk starting");
    tracing::debug!(?config, "effective settings");

    let driver = Arc::new(SimulatedDriver::new().with_template_fields(DEMO_TEMPLATE_FIELDS));
    cardwerk_app::serve(&config, driver).await
}
