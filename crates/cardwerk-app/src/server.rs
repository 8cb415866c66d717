// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP surface.
//
//   GET  /printers  -> discovered USB and network printers
//   POST /print     -> print the configured template with the caller's fields
//
// Print failures come back as 422 with a structured description; anything
// outside the print itself (no printer, discovery failure, panics) is a 500.
// Any origin may call the API from a browser.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use cardwerk_core::FieldData;
use cardwerk_core::classify::describe_error;
use cardwerk_core::config::AppConfig;
use cardwerk_core::error::{CardwerkError, Result};
use cardwerk_core::types::{CompletedJob, JobHandle, PrinterTarget};
use cardwerk_print::PrinterDriver;

use crate::state::AppState;

/// Body of `POST /print`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintRequest {
    #[serde(default)]
    pub field_data: FieldData,
}

/// Body of a successful `POST /print`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintResponse {
    pub job_id: JobHandle,
    pub printer_used: String,
    pub printer_type: &'static str,
    pub status: String,
    pub position: String,
}

impl From<&CompletedJob> for PrintResponse {
    fn from(job: &CompletedJob) -> Self {
        Self {
            job_id: job.job_id,
            printer_used: job.printer.to_string(),
            printer_type: job.printer.kind().label(),
            status: job.snapshot.print_status.clone(),
            position: job.snapshot.card_position.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrintersResponse {
    usb_printers: Vec<PrinterTarget>,
    network_printers: Vec<PrinterTarget>,
}

/// Build the router over shared state.
pub fn router<D: PrinterDriver + 'static>(state: Arc<AppState<D>>) -> Router {
    Router::new()
        .route("/printers", get(list_printers::<D>))
        .route("/print", post(print::<D>))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `config.listen_addr` and serve until the process is stopped.
pub async fn serve<D: PrinterDriver + 'static>(config: &AppConfig, driver: Arc<D>) -> Result<()> {
    let state = Arc::new(AppState::new(driver, config));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr.as_str()).await?;
    info!(
        listen = %config.listen_addr,
        template = %config.template_path.display(),
        "Cardwerk HTTP server listening"
    );
    axum::serve(listener, app).await?;
    Ok(())
}

async fn list_printers<D: PrinterDriver + 'static>(State(state): State<Arc<AppState<D>>>) -> Response {
    info!("received request for printer discovery");
    match state.discovery.discover().await {
        Ok(found) => Json(PrintersResponse {
            usb_printers: found.usb_printers,
            network_printers: found.network_printers,
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "printer discovery failed");
            problem(&e.to_string())
        }
    }
}

async fn print<D: PrinterDriver + 'static>(
    State(state): State<Arc<AppState<D>>>,
    Json(request): Json<PrintRequest>,
) -> Response {
    info!(fields = request.field_data.len(), "received print request");

    let target = match state.discovery.select_target().await {
        Ok(target) => target,
        Err(e @ CardwerkError::NoPrinterFound) => {
            warn!("no printers found");
            return problem(&e.to_string());
        }
        Err(e) => {
            error!(error = %e, "printer discovery failed");
            return problem(&e.to_string());
        }
    };

    let template = match state.load_template().await {
        Ok(Some(template)) => template,
        Ok(None) => {
            error!(path = %state.template_path.display(), "template file not found");
            return (StatusCode::NOT_FOUND, "Template file not found").into_response();
        }
        Err(e) => {
            error!(error = %e, "failed to read template");
            return problem(&e.to_string());
        }
    };

    // Run detached so a client hanging up cannot abort the attempt halfway
    // through device teardown.
    let task_state = Arc::clone(&state);
    let task_target = target.clone();
    let outcome = tokio::spawn(async move {
        task_state
            .orchestrator
            .print_with_retry(&task_target, &template, &request.field_data, task_state.copies)
            .await
    })
    .await;

    match outcome {
        Ok(Ok(job)) => {
            info!(job_id = %job.job_id, printer = %job.printer, "print job succeeded");
            Json(PrintResponse::from(&job)).into_response()
        }
        Ok(Err(e)) => {
            let detail = describe_error(&e, Some(&target));
            error!(error = %e, "print failed");
            (StatusCode::UNPROCESSABLE_ENTITY, Json(detail)).into_response()
        }
        Err(e) => {
            error!(error = %e, "print task aborted");
            problem(&e.to_string())
        }
    }
}

/// 500 with a problem-details style body.
fn problem(detail: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "title": "An error occurred while processing your request.",
            "status": 500,
            "detail": detail,
        })),
    )
        .into_response()
}
