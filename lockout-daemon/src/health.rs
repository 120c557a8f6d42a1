//! Aggregated health reporting.
//!
//! [`HealthReporter`] asks each daemon component for its status and folds
//! the answers into one [`DaemonHealth`]. The overall status is the worst
//! component status.
//!
//! # Aggregation Rule
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{Mutex, mpsc};

use lockout_core::metrics as m;
use lockout_core::{AlertEvent, DynPipeline, HealthStatus};

/// A lifecycle component shared between the orchestrator and the HTTP server.
pub type SharedPipeline = Arc<Mutex<Box<dyn DynPipeline>>>;

/// Aggregated health report for the whole daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Worst status among all components.
    pub status: HealthStatus,
    /// Seconds since the daemon started.
    pub uptime_secs: u64,
    /// Per-component reports.
    pub components: Vec<ComponentHealth>,
}

/// Health of a single component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    /// Component name (e.g. "responder", "alert-intake").
    pub name: String,
    /// Current status.
    pub status: HealthStatus,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}

/// Fold component statuses into a single status.
///
/// Returns the worst status found: Unhealthy > Degraded > Healthy.
pub fn aggregate_status(components: &[ComponentHealth]) -> HealthStatus {
    let mut unhealthy = Vec::new();
    let mut degraded = Vec::new();

    for component in components {
        match &component.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                degraded.push(format!("{}: {}", component.name, reason));
            }
            HealthStatus::Unhealthy(reason) => {
                unhealthy.push(format!("{}: {}", component.name, reason));
            }
        }
    }

    if !unhealthy.is_empty() {
        HealthStatus::Unhealthy(unhealthy.join("; "))
    } else if !degraded.is_empty() {
        HealthStatus::Degraded(degraded.join("; "))
    } else {
        HealthStatus::Healthy
    }
}

/// Produces [`DaemonHealth`] snapshots on demand.
#[derive(Clone)]
pub struct HealthReporter {
    responder: SharedPipeline,
    alert_tx: mpsc::Sender<AlertEvent>,
    started: Instant,
}

impl HealthReporter {
    pub fn new(responder: SharedPipeline, alert_tx: mpsc::Sender<AlertEvent>) -> Self {
        Self {
            responder,
            alert_tx,
            started: Instant::now(),
        }
    }

    /// Collect the current report.
    pub async fn report(&self) -> DaemonHealth {
        let responder = self.responder.lock().await.health_check().await;
        let intake = if self.alert_tx.is_closed() {
            HealthStatus::Unhealthy("responder is not accepting alerts".to_owned())
        } else {
            HealthStatus::Healthy
        };

        let components = vec![
            ComponentHealth::new("responder", responder),
            ComponentHealth::new("alert-intake", intake),
        ];
        let uptime_secs = self.started.elapsed().as_secs();

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);

        DaemonHealth {
            status: aggregate_status(&components),
            uptime_secs,
            components,
        }
    }
}
