//! Orchestrator -- assembles and drives all daemon components.
//!
//! The [`Orchestrator`] owns the alert channel, the responder, the notify
//! worker and the HTTP ingestion server. It handles:
//! - Building components from configuration
//! - Starting them in dependency order
//! - Waiting for shutdown signals (SIGTERM, SIGINT)
//! - Graceful shutdown in reverse dependency order
//!
//! # Channel Architecture
//!
//! ```text
//! HTTP ingest --AlertEvent--> Responder --EventRecord--> NotifyWorker
//!                                                         |-- ReportedEventsLog
//!                                                         +-- WebhookNotifier (optional)
//! ```
//!
//! # Shutdown Order
//!
//! The HTTP server stops first so no new alerts arrive. The responder then
//! drains queued alerts and waits for in-flight runs. The notify worker is
//! signalled last, on its own broadcast channel, so it still receives the
//! records produced while the responder drained.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, broadcast, mpsc};

use lockout_core::{AlertEvent, DynPipeline, LockoutConfig};
use lockout_responder::{
    ActiveFileSessionDirectory, NotifyWorker, ReportedEventsLog, ResponderBuilder,
    ResponderConfig, WebhookNotifier, WorkerStats, spawn_notify_worker,
};

use crate::health::{DaemonHealth, HealthReporter, SharedPipeline};
use crate::server::{self, AppState};

/// Central orchestrator that owns all daemon components.
pub struct Orchestrator {
    config: LockoutConfig,
    responder: SharedPipeline,
    alert_tx: mpsc::Sender<AlertEvent>,
    /// Taken when the worker task is spawned.
    worker: Option<NotifyWorker>,
    health: HealthReporter,
    /// Stops the HTTP server and the uptime updater.
    shutdown_tx: broadcast::Sender<()>,
    /// Stops the notify worker after the responder has drained.
    worker_shutdown_tx: broadcast::Sender<()>,
    start_time: Instant,
}

impl Orchestrator {
    /// Build the orchestrator from a configuration file path.
    ///
    /// Loads the file, applies environment overrides and validates.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = LockoutConfig::load(config_path).await?;
        Self::build_from_config(config).await
    }

    /// Build the orchestrator from an already-loaded configuration.
    ///
    /// Installs the metrics recorder when `[metrics].enabled` is set. Only
    /// call this once per process in that case.
    pub async fn build_from_config(config: LockoutConfig) -> Result<Self> {
        config.validate()?;

        if config.metrics.enabled {
            crate::metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let responder_config = ResponderConfig::from_core(&config);
        if !responder_config.terminate_sessions {
            tracing::warn!("session termination is disabled; sessions will be reported only");
        }

        let (alert_tx, alert_rx) = mpsc::channel(config.server.alert_channel_capacity);

        let (responder, record_rx) = ResponderBuilder::new()
            .config(responder_config.clone())
            .session_directory(ActiveFileSessionDirectory::new())
            .alert_receiver(alert_rx)
            .build()?;
        let record_rx = record_rx
            .ok_or_else(|| anyhow::anyhow!("responder did not create a record queue"))?;

        let mut worker = NotifyWorker::new(record_rx)
            .with_notifier(ReportedEventsLog::from_config(&responder_config));
        if let Some(webhook) = WebhookNotifier::from_config(&responder_config)? {
            tracing::info!(url = %responder_config.webhook_url, "webhook notifier enabled");
            worker.add_boxed(Box::new(webhook));
        }

        let responder: SharedPipeline =
            Arc::new(Mutex::new(Box::new(responder) as Box<dyn DynPipeline>));
        let health = HealthReporter::new(Arc::clone(&responder), alert_tx.clone());

        let (shutdown_tx, _) = broadcast::channel(16);
        let (worker_shutdown_tx, _) = broadcast::channel(1);

        tracing::info!(
            notifiers = worker.notifier_count(),
            alert_capacity = config.server.alert_channel_capacity,
            "orchestrator built"
        );

        Ok(Self {
            config,
            responder,
            alert_tx,
            worker: Some(worker),
            health,
            shutdown_tx,
            worker_shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Sender feeding the responder. Alerts sent here bypass HTTP validation.
    pub fn alert_sender(&self) -> mpsc::Sender<AlertEvent> {
        self.alert_tx.clone()
    }

    /// Handle producing health reports for this daemon.
    pub fn health_reporter(&self) -> HealthReporter {
        self.health.clone()
    }

    /// Current aggregated health.
    pub async fn health(&self) -> DaemonHealth {
        self.health.report().await
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &LockoutConfig {
        &self.config
    }

    /// Run the daemon until SIGTERM or SIGINT.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(wait_for_shutdown_signal()).await
    }

    /// Run the daemon until `shutdown` resolves.
    ///
    /// Start order: notify worker, responder, HTTP server. The future's
    /// output names the shutdown cause for logging.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = Result<&'static str>>,
    {
        tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting lockout daemon");

        let pid_file = self.config.general.pid_file.clone();
        if !pid_file.is_empty() {
            write_pid_file(Path::new(&pid_file))?;
        }

        let result = self.run_components(shutdown).await;

        if !pid_file.is_empty() {
            remove_pid_file(Path::new(&pid_file));
        }

        result
    }

    async fn run_components<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = Result<&'static str>>,
    {
        let worker = self
            .worker
            .take()
            .ok_or_else(|| anyhow::anyhow!("orchestrator has already run"))?;
        let worker_handle = spawn_notify_worker(worker, self.worker_shutdown_tx.subscribe());

        if let Err(e) = self.responder.lock().await.start().await {
            tracing::error!(error = %e, "failed to start responder");
            let _ = self.stop_worker(worker_handle).await;
            return Err(e.into());
        }
        tracing::info!("responder started");

        let addr = format!(
            "{}:{}",
            self.config.server.listen_addr, self.config.server.port
        );
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(listen_addr = %addr, error = %e, "failed to bind alert listener");
                self.stop_responder().await;
                let _ = self.stop_worker(worker_handle).await;
                return Err(anyhow::anyhow!("failed to bind {}: {}", addr, e));
            }
        };

        let state = AppState::new(self.alert_tx.clone(), self.health.clone());
        let server_handle = tokio::spawn(server::serve(
            listener,
            state,
            self.shutdown_tx.subscribe(),
        ));

        let uptime_handle = if self.config.metrics.enabled {
            record_daemon_metrics();
            Some(spawn_uptime_updater(
                self.start_time,
                self.shutdown_tx.subscribe(),
            ))
        } else {
            None
        };

        tracing::info!("lockout daemon running");

        let signal = shutdown.await;
        match &signal {
            Ok(name) => tracing::info!(signal = *name, "shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "shutdown signal handling failed"),
        }

        tracing::info!("broadcasting shutdown signal");
        let _ = self.shutdown_tx.send(());

        match server_handle.await {
            Ok(Ok(())) => tracing::debug!("alert ingestion stopped"),
            Ok(Err(e)) => tracing::error!(error = %e, "alert ingestion ended with error"),
            Err(e) => tracing::error!(error = %e, "alert ingestion task panicked"),
        }
        if let Some(handle) = uptime_handle {
            let _ = handle.await;
        }

        self.stop_responder().await;
        let stats = self.stop_worker(worker_handle).await?;

        tracing::info!(
            records = stats.records,
            failures = stats.failures,
            uptime_secs = self.start_time.elapsed().as_secs(),
            "lockout daemon stopped"
        );

        signal.map(|_| ())
    }

    async fn stop_responder(&self) {
        if let Err(e) = self.responder.lock().await.stop().await {
            tracing::error!(error = %e, "failed to stop responder");
        } else {
            tracing::info!("responder stopped");
        }
    }

    async fn stop_worker(
        &self,
        handle: tokio::task::JoinHandle<WorkerStats>,
    ) -> Result<WorkerStats> {
        let _ = self.worker_shutdown_tx.send(());
        handle
            .await
            .map_err(|e| anyhow::anyhow!("notify worker task failed: {}", e))
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Write the current process PID to a file.
///
/// Refuses to overwrite an existing file so a second daemon instance fails
/// fast.
///
/// # Security
///
/// - `create_new(true)` creates the file atomically
/// - The created file must be a regular file
/// - The parent directory is created with mode 0o700, the file with 0o600
pub fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            let mut builder = fs::DirBuilder::new();
            builder.mode(0o700).recursive(true);
            builder.create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_string());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    if !file.metadata()?.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on shutdown. Failures are logged, not returned.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove PID file"
        );
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

fn record_daemon_metrics() {
    use lockout_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

/// Refresh the uptime gauge every 10 seconds until shutdown.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    use lockout_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let uptime_secs = start_time.elapsed().as_secs();
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
