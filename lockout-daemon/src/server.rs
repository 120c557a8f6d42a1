//! HTTP alert ingestion.
//!
//! `POST /api/v1/users/disable` accepts a JSON alert and hands it to the
//! responder's bounded channel without waiting for the outcome.
//! `GET /health` returns the aggregated [`DaemonHealth`](crate::health::DaemonHealth).
//!
//! | Condition                         | Status |
//! |-----------------------------------|--------|
//! | alert queued                      | 202    |
//! | `username` or `user_ip` empty     | 400    |
//! | responder queue full or closed    | 503    |

use std::collections::BTreeMap;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics::counter;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use lockout_core::AlertEvent;
use lockout_core::metrics as m;

use crate::health::HealthReporter;

/// Route accepting disable requests.
pub const DISABLE_PATH: &str = "/api/v1/users/disable";
/// Route serving the health report.
pub const HEALTH_PATH: &str = "/health";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    alert_tx: mpsc::Sender<AlertEvent>,
    health: HealthReporter,
}

impl AppState {
    pub fn new(alert_tx: mpsc::Sender<AlertEvent>, health: HealthReporter) -> Self {
        Self { alert_tx, health }
    }
}

/// Inbound disable request body.
///
/// Fields other than `username` and `user_ip` are kept as alert payload.
#[derive(Debug, Deserialize)]
pub struct DisableRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub user_ip: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Build the ingestion router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(DISABLE_PATH, post(disable_user))
        .route(HEALTH_PATH, get(health))
        .with_state(state)
}

/// Serve until the shutdown signal fires, then finish in-flight requests.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(listen_addr = %addr, "alert ingestion listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            debug!("alert ingestion shutting down");
        })
        .await
        .map_err(|e| anyhow::anyhow!("alert ingestion server failed: {}", e))
}

async fn disable_user(
    State(state): State<AppState>,
    Json(request): Json<DisableRequest>,
) -> (StatusCode, Json<Value>) {
    let username = request.username.trim();
    let user_ip = request.user_ip.trim();

    if username.is_empty() || user_ip.is_empty() {
        counter!(m::INGEST_ALERTS_REJECTED_TOTAL, m::LABEL_RESULT => "invalid").increment(1);
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "username and user_ip must not be empty" })),
        );
    }

    let alert = AlertEvent::new(username, user_ip).with_payload(request.extra);
    let id = alert.id.clone();
    let trace_id = alert.metadata.trace_id.clone();

    match state.alert_tx.try_send(alert) {
        Ok(()) => {
            counter!(m::INGEST_ALERTS_RECEIVED_TOTAL).increment(1);
            info!(username, user_ip, %trace_id, "disable request accepted");
            (
                StatusCode::ACCEPTED,
                Json(json!({ "status": "accepted", "id": id, "trace_id": trace_id })),
            )
        }
        Err(TrySendError::Full(_)) => {
            counter!(m::INGEST_ALERTS_REJECTED_TOTAL, m::LABEL_RESULT => "busy").increment(1);
            warn!(username, user_ip, "alert queue full, rejecting disable request");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "alert queue full" })),
            )
        }
        Err(TrySendError::Closed(_)) => {
            counter!(m::INGEST_ALERTS_REJECTED_TOTAL, m::LABEL_RESULT => "closed").increment(1);
            warn!(username, user_ip, "responder stopped, rejecting disable request");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "responder not running" })),
            )
        }
    }
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let report = state.health.report().await;
    let code = if report.status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(json!(report)))
}
