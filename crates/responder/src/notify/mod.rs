//! 알림 전달: notifier 계약과 전달 워커
//!
//! [`Notifier`]는 판단 레코드를 외부로 내보내는 협력자입니다 (보고 로그, webhook 등).
//! [`NotifyWorker`]는 dispatcher 큐의 유일한 소비자로, 큐 순서대로 모든 notifier에
//! 레코드를 전달합니다. 한 notifier의 실패는 기록만 하고 다른 notifier나
//! 다음 레코드의 전달을 막지 않습니다.

pub mod reported_log;
pub mod webhook;

use std::future::Future;

use metrics::counter;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use lockout_core::metrics as m;
use lockout_core::{BoxFuture, EventRecord};

use crate::error::ResponderError;

pub use reported_log::ReportedEventsLog;
pub use webhook::WebhookNotifier;

/// 레코드 전달 trait
pub trait Notifier: Send + Sync {
    /// notifier 이름 (로그/메트릭 레이블)
    fn name(&self) -> &str;

    /// 레코드 하나를 전달합니다.
    fn notify(
        &self,
        record: &EventRecord,
    ) -> impl Future<Output = Result<(), ResponderError>> + Send;
}

/// dyn-compatible 레코드 전달 trait
///
/// [`Notifier`]를 구현한 타입은 자동으로 구현됩니다.
pub trait DynNotifier: Send + Sync {
    /// notifier 이름
    fn name(&self) -> &str;

    /// 레코드 하나를 전달합니다.
    fn notify<'a>(&'a self, record: &'a EventRecord) -> BoxFuture<'a, Result<(), ResponderError>>;
}

impl<T: Notifier> DynNotifier for T {
    fn name(&self) -> &str {
        Notifier::name(self)
    }

    fn notify<'a>(&'a self, record: &'a EventRecord) -> BoxFuture<'a, Result<(), ResponderError>> {
        Box::pin(Notifier::notify(self, record))
    }
}

/// 워커 처리 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// 처리한 레코드 수
    pub records: u64,
    /// notifier 실패 횟수
    pub failures: u64,
}

/// 레코드 전달 워커
pub struct NotifyWorker {
    rx: mpsc::Receiver<EventRecord>,
    notifiers: Vec<Box<dyn DynNotifier>>,
    stats: WorkerStats,
}

impl NotifyWorker {
    /// dispatcher 큐 수신측으로 워커를 생성합니다.
    pub fn new(rx: mpsc::Receiver<EventRecord>) -> Self {
        Self {
            rx,
            notifiers: Vec::new(),
            stats: WorkerStats::default(),
        }
    }

    /// notifier를 추가합니다.
    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifiers.push(Box::new(notifier));
        self
    }

    /// boxed notifier를 추가합니다.
    pub fn add_boxed(&mut self, notifier: Box<dyn DynNotifier>) {
        self.notifiers.push(notifier);
    }

    /// 등록된 notifier 수
    pub fn notifier_count(&self) -> usize {
        self.notifiers.len()
    }

    /// 큐가 닫히거나 종료 신호를 받을 때까지 레코드를 전달합니다.
    ///
    /// 종료 신호를 받으면 큐를 닫고 이미 들어와 있는 레코드를 모두 전달한 뒤 반환합니다.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> WorkerStats {
        info!(notifiers = self.notifiers.len(), "notify worker started");

        loop {
            tokio::select! {
                biased;
                maybe_record = self.rx.recv() => {
                    match maybe_record {
                        Some(record) => self.deliver(&record).await,
                        None => {
                            debug!("record queue closed, notify worker exiting");
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    self.drain().await;
                    break;
                }
            }
        }

        info!(
            records = self.stats.records,
            failures = self.stats.failures,
            "notify worker stopped"
        );
        self.stats
    }

    /// 큐를 닫고 남은 레코드를 전달합니다.
    async fn drain(&mut self) {
        self.rx.close();
        let mut drained = 0u64;
        while let Some(record) = self.rx.recv().await {
            self.deliver(&record).await;
            drained += 1;
        }
        info!(drained, "notify worker drained record queue");
    }

    async fn deliver(&mut self, record: &EventRecord) {
        self.stats.records += 1;
        for notifier in &self.notifiers {
            match notifier.notify(record).await {
                Ok(()) => {
                    counter!(m::NOTIFY_RECORDS_DELIVERED_TOTAL, m::LABEL_NOTIFIER => notifier.name().to_owned())
                        .increment(1);
                }
                Err(e) => {
                    self.stats.failures += 1;
                    counter!(m::NOTIFY_FAILURES_TOTAL, m::LABEL_NOTIFIER => notifier.name().to_owned())
                        .increment(1);
                    warn!(
                        notifier = notifier.name(),
                        action = %record.action,
                        username = %record.alert.username,
                        error = %e,
                        "failed to deliver event record"
                    );
                }
            }
        }
    }
}

/// 워커를 spawn하고 핸들을 반환합니다.
pub fn spawn_notify_worker(
    worker: NotifyWorker,
    shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<WorkerStats> {
    tokio::spawn(worker.run(shutdown))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use lockout_core::{Action, AlertEvent};

    use super::*;
    use crate::dispatcher::EventRecordDispatcher;

    /// 받은 레코드의 action을 기록하는 notifier
    #[derive(Clone, Default)]
    struct Collecting {
        seen: Arc<Mutex<Vec<Action>>>,
    }

    impl Notifier for Collecting {
        fn name(&self) -> &str {
            "collecting"
        }

        async fn notify(&self, record: &EventRecord) -> Result<(), ResponderError> {
            self.seen.lock().unwrap().push(record.action);
            Ok(())
        }
    }

    /// 항상 실패하는 notifier
    #[derive(Clone, Default)]
    struct Failing {
        calls: Arc<AtomicUsize>,
    }

    impl Notifier for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn notify(&self, _record: &EventRecord) -> Result<(), ResponderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ResponderError::Notify {
                notifier: "failing".to_owned(),
                reason: "boom".to_owned(),
            })
        }
    }

    fn record(action: Action) -> EventRecord {
        EventRecord::new(&AlertEvent::new("alice", "10.0.0.5"), action, "")
    }

    #[tokio::test]
    async fn delivers_in_queue_order_despite_failing_notifier() {
        let (dispatcher, rx) = EventRecordDispatcher::new(16);
        let collecting = Collecting::default();
        let failing = Failing::default();
        let worker = NotifyWorker::new(rx)
            .with_notifier(failing.clone())
            .with_notifier(collecting.clone());
        assert_eq!(worker.notifier_count(), 2);

        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = spawn_notify_worker(worker, shutdown_rx);

        dispatcher.enqueue(record(Action::DisableRequestReceived));
        dispatcher.enqueue(record(Action::DisablingUsername));
        dispatcher.enqueue(record(Action::DisabledUsername));
        drop(dispatcher);

        let stats = handle.await.unwrap();
        assert_eq!(stats.records, 3);
        assert_eq!(stats.failures, 3);
        assert_eq!(failing.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *collecting.seen.lock().unwrap(),
            vec![
                Action::DisableRequestReceived,
                Action::DisablingUsername,
                Action::DisabledUsername
            ]
        );
    }

    #[tokio::test]
    async fn shutdown_drains_buffered_records() {
        let (dispatcher, rx) = EventRecordDispatcher::new(16);
        let collecting = Collecting::default();
        let worker = NotifyWorker::new(rx).with_notifier(collecting.clone());

        // 워커 시작 전에 버퍼에 쌓아 둠
        for _ in 0..5 {
            dispatcher.enqueue(record(Action::UsernameAlreadyDisabled));
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        shutdown_tx.send(()).unwrap();
        let stats = spawn_notify_worker(worker, shutdown_rx).await.unwrap();

        // dispatcher가 살아 있어도 종료 후에는 모두 전달됨
        assert_eq!(stats.records, 5);
        assert_eq!(collecting.seen.lock().unwrap().len(), 5);
        assert!(dispatcher.is_closed());
    }
}
