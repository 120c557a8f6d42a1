//! 대응 엔진 -- 알림 수신부터 파이프라인 실행까지의 생명주기 관리
//!
//! [`Responder`]는 core의 [`Pipeline`] trait을 구현하여
//! `lockout-daemon`에서 다른 컴포넌트와 동일한 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! AlertEvent ──mpsc──> Responder ──spawn (알림당 태스크 1개)──> DisableEventPipeline
//!                                                                 |
//!                                                  EventRecord ──mpsc──> NotifyWorker
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use lockout_core::error::PipelineError;
use lockout_core::{AlertEvent, EventRecord, HealthStatus, LockoutError, Pipeline};

use crate::config::ResponderConfig;
use crate::dispatcher::EventRecordDispatcher;
use crate::error::ResponderError;
use crate::pipeline::DisableEventPipeline;
use crate::session::SessionDirectory;

/// 엔진 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponderState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 처리 카운터 (엔진과 처리 태스크가 공유)
#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// 대응 엔진
///
/// 알림 수신 채널의 유일한 소비자이며, 알림마다 독립된 태스크에서
/// [`DisableEventPipeline::process`]를 실행합니다. 한 알림의 실패나 panic은
/// 다른 알림의 처리에 영향을 주지 않습니다.
///
/// # 사용 예시
/// ```ignore
/// use lockout_responder::{ActiveFileSessionDirectory, ResponderBuilder};
///
/// let (mut responder, record_rx) = ResponderBuilder::new()
///     .config(config)
///     .session_directory(ActiveFileSessionDirectory::new())
///     .alert_receiver(alert_rx)
///     .build()?;
///
/// responder.start().await?;
/// ```
pub struct Responder<D: SessionDirectory + 'static> {
    config: ResponderConfig,
    state: ResponderState,
    pipeline: Arc<DisableEventPipeline<D>>,
    alert_rx: Option<mpsc::Receiver<AlertEvent>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl<D: SessionDirectory + 'static> Responder<D> {
    /// 현재 상태명을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            ResponderState::Initialized => "initialized",
            ResponderState::Running => "running",
            ResponderState::Stopped => "stopped",
        }
    }

    /// 수신한 알림 수
    pub fn alerts_received(&self) -> u64 {
        self.counters.received.load(Ordering::Relaxed)
    }

    /// 종료 상태까지 처리된 알림 수
    pub fn alerts_completed(&self) -> u64 {
        self.counters.completed.load(Ordering::Relaxed)
    }

    /// 처리 태스크가 비정상 종료된 알림 수
    pub fn alerts_failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    /// 엔진 설정
    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }

    /// 알림 처리 파이프라인
    pub fn pipeline(&self) -> Arc<DisableEventPipeline<D>> {
        Arc::clone(&self.pipeline)
    }
}

impl<D: SessionDirectory + 'static> Pipeline for Responder<D> {
    async fn start(&mut self) -> Result<(), LockoutError> {
        if self.state == ResponderState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        let mut alert_rx = self.alert_rx.take().ok_or_else(|| {
            LockoutError::from(PipelineError::InitFailed(
                "alert receiver already consumed; rebuild the responder to restart".to_owned(),
            ))
        })?;

        info!(
            terminate_sessions = self.config.terminate_sessions,
            ignore_lookup_errors = self.config.ignore_lookup_errors,
            "starting responder"
        );

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let pipeline = Arc::clone(&self.pipeline);
        let counters = Arc::clone(&self.counters);

        let task = tokio::spawn(async move {
            let mut runs: JoinSet<()> = JoinSet::new();

            loop {
                tokio::select! {
                    maybe_alert = alert_rx.recv() => {
                        let Some(alert) = maybe_alert else {
                            info!("alert channel closed, responder stops accepting alerts");
                            break;
                        };
                        spawn_run(&mut runs, &pipeline, &counters, alert);
                    }
                    Some(result) = runs.join_next(), if !runs.is_empty() => {
                        reap(result, &counters);
                    }
                    _ = &mut shutdown_rx => {
                        alert_rx.close();
                        while let Some(alert) = alert_rx.recv().await {
                            spawn_run(&mut runs, &pipeline, &counters, alert);
                        }
                        break;
                    }
                }
            }

            // 시작된 실행은 종료 상태까지 진행
            let in_flight = runs.len();
            if in_flight > 0 {
                debug!(in_flight, "waiting for in-flight alerts");
            }
            while let Some(result) = runs.join_next().await {
                reap(result, &counters);
            }
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(task);
        self.state = ResponderState::Running;
        info!("responder started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), LockoutError> {
        if self.state != ResponderState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping responder");

        if let Some(tx) = self.shutdown_tx.take() {
            // 수신 루프가 이미 끝났으면 수신측이 없음
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "responder task terminated abnormally");
            }
        }

        self.state = ResponderState::Stopped;
        info!(
            received = self.alerts_received(),
            completed = self.alerts_completed(),
            failed = self.alerts_failed(),
            "responder stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ResponderState::Running => {
                if self.task.as_ref().is_some_and(|t| t.is_finished()) {
                    HealthStatus::Degraded("alert channel closed".to_owned())
                } else if self.pipeline.dispatcher().is_closed() {
                    HealthStatus::Degraded("record queue closed".to_owned())
                } else {
                    HealthStatus::Healthy
                }
            }
            ResponderState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ResponderState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

fn spawn_run<D: SessionDirectory + 'static>(
    runs: &mut JoinSet<()>,
    pipeline: &Arc<DisableEventPipeline<D>>,
    counters: &Arc<Counters>,
    alert: AlertEvent,
) {
    counters.received.fetch_add(1, Ordering::Relaxed);
    let pipeline = Arc::clone(pipeline);
    runs.spawn(async move {
        if let Err(e) = pipeline.process(&alert).await {
            error!(
                username = %alert.username,
                trace_id = %alert.metadata.trace_id,
                error = %e,
                "disable request aborted"
            );
        }
    });
}

fn reap(result: Result<(), tokio::task::JoinError>, counters: &Counters) {
    match result {
        Ok(()) => {
            counters.completed.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "alert processing task failed");
        }
    }
}

/// 대응 엔진 빌더
///
/// 엔진을 구성하고 필요한 채널을 생성합니다.
pub struct ResponderBuilder<D: SessionDirectory + 'static> {
    config: ResponderConfig,
    directory: Option<D>,
    alert_rx: Option<mpsc::Receiver<AlertEvent>>,
    record_tx: Option<mpsc::Sender<EventRecord>>,
}

impl<D: SessionDirectory + 'static> ResponderBuilder<D> {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: ResponderConfig::default(),
            directory: None,
            alert_rx: None,
            record_tx: None,
        }
    }

    /// 엔진 설정을 지정합니다.
    pub fn config(mut self, config: ResponderConfig) -> Self {
        self.config = config;
        self
    }

    /// 세션 디렉토리를 지정합니다.
    pub fn session_directory(mut self, directory: D) -> Self {
        self.directory = Some(directory);
        self
    }

    /// 알림 수신 채널을 지정합니다.
    ///
    /// `lockout-daemon`에서 HTTP 수집기의 송신측과 짝을 이루는 수신측을 연결합니다.
    pub fn alert_receiver(mut self, rx: mpsc::Receiver<AlertEvent>) -> Self {
        self.alert_rx = Some(rx);
        self
    }

    /// 외부 레코드 큐 송신측을 지정합니다.
    ///
    /// 지정하지 않으면 `queue_capacity` 용량의 큐를 새로 만듭니다.
    pub fn record_sender(mut self, tx: mpsc::Sender<EventRecord>) -> Self {
        self.record_tx = Some(tx);
        self
    }

    /// 엔진을 빌드합니다.
    ///
    /// # Returns
    /// - `Responder`: 엔진 인스턴스
    /// - `Option<mpsc::Receiver<EventRecord>>`: 레코드 큐 수신측
    ///   (외부 `record_sender`를 지정한 경우 None)
    pub fn build(
        self,
    ) -> Result<(Responder<D>, Option<mpsc::Receiver<EventRecord>>), ResponderError> {
        self.config.validate()?;

        let directory = self.directory.ok_or_else(|| ResponderError::Config {
            field: "session_directory".to_owned(),
            reason: "session directory must be provided".to_owned(),
        })?;
        let alert_rx = self.alert_rx.ok_or_else(|| ResponderError::Config {
            field: "alert_receiver".to_owned(),
            reason: "alert receiver must be provided".to_owned(),
        })?;

        let (dispatcher, record_rx) = match self.record_tx {
            Some(tx) => (EventRecordDispatcher::from_sender(tx), None),
            None => {
                let (dispatcher, rx) = EventRecordDispatcher::new(self.config.queue_capacity);
                (dispatcher, Some(rx))
            }
        };

        let pipeline = DisableEventPipeline::from_config(&self.config, directory, dispatcher);

        let responder = Responder {
            config: self.config,
            state: ResponderState::Initialized,
            pipeline: Arc::new(pipeline),
            alert_rx: Some(alert_rx),
            shutdown_tx: None,
            task: None,
            counters: Arc::new(Counters::default()),
        };

        Ok((responder, record_rx))
    }
}

impl<D: SessionDirectory + 'static> Default for ResponderBuilder<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use lockout_core::{Action, ResponseError, SessionTermination, UserSession};

    use super::*;

    struct NoSessions;

    impl SessionDirectory for NoSessions {
        async fn resolve_sessions(
            &self,
            _username: &str,
            _active_file: &Path,
            _search_delay: Duration,
            _search_retries: u32,
        ) -> Result<Vec<UserSession>, ResponseError> {
            Ok(Vec::new())
        }

        async fn terminate_sessions(
            &self,
            _sessions: &[UserSession],
            _executable: &Path,
        ) -> Vec<SessionTermination> {
            Vec::new()
        }
    }

    fn config(dir: &tempfile::TempDir) -> ResponderConfig {
        let path = |name: &str| dir.path().join(name).display().to_string();
        std::fs::write(dir.path().join("users.ignored"), "").unwrap();
        std::fs::write(dir.path().join("ips.ignored"), "").unwrap();
        crate::config::ResponderConfigBuilder::new()
            .ignored_files(path("users.ignored"), path("ips.ignored"))
            .disabled_users_file(path("users.disabled"))
            .reported_log_file(path("reported.log"))
            .ezproxy("/usr/local/ezproxy/ezproxy", path("ezproxy.hst"))
            .session_search(1, 0)
            .build()
            .unwrap()
    }

    #[test]
    fn build_requires_directory_and_receiver() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = mpsc::channel(4);
        let err = ResponderBuilder::<NoSessions>::new()
            .config(config(&dir))
            .alert_receiver(rx)
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("session_directory"));

        let err = ResponderBuilder::new()
            .config(config(&dir))
            .session_directory(NoSessions)
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("alert_receiver"));
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = mpsc::channel(4);
        let (mut responder, record_rx) = ResponderBuilder::new()
            .config(config(&dir))
            .session_directory(NoSessions)
            .alert_receiver(rx)
            .build()
            .unwrap();
        assert!(record_rx.is_some());
        assert_eq!(responder.state_name(), "initialized");
        assert!(responder.health_check().await.is_unhealthy());

        responder.start().await.unwrap();
        assert!(responder.health_check().await.is_healthy());
        assert!(responder.start().await.is_err());

        responder.stop().await.unwrap();
        assert_eq!(responder.state_name(), "stopped");
        assert!(responder.stop().await.is_err());
        // 수신 채널은 이미 소비됨
        assert!(responder.start().await.is_err());
    }

    #[tokio::test]
    async fn closed_record_queue_degrades_health() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = mpsc::channel(4);
        let (mut responder, record_rx) = ResponderBuilder::new()
            .config(config(&dir))
            .session_directory(NoSessions)
            .alert_receiver(rx)
            .build()
            .unwrap();
        drop(record_rx);

        responder.start().await.unwrap();
        assert!(matches!(
            responder.health_check().await,
            HealthStatus::Degraded(_)
        ));
        responder.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_finishes_queued_alerts() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel(8);
        let (mut responder, record_rx) = ResponderBuilder::new()
            .config(config(&dir))
            .session_directory(NoSessions)
            .alert_receiver(rx)
            .build()
            .unwrap();
        let mut record_rx = record_rx.unwrap();

        responder.start().await.unwrap();
        tx.send(AlertEvent::new("alice", "10.0.0.5")).await.unwrap();
        tx.send(AlertEvent::new("carol", "10.0.0.6")).await.unwrap();
        responder.stop().await.unwrap();

        assert_eq!(responder.alerts_received(), 2);
        assert_eq!(responder.alerts_completed(), 2);

        let mut disabled = 0;
        while let Ok(record) = record_rx.try_recv() {
            if record.action == Action::DisabledUsername {
                disabled += 1;
            }
        }
        assert_eq!(disabled, 2);
    }
}
