//! 판단 레코드 전달
//!
//! [`EventRecordDispatcher`]는 완성된 [`EventRecord`]를 bounded 큐에 넣습니다.
//! 큐의 유일한 소비자는 [`NotifyWorker`](crate::notify::NotifyWorker)이므로,
//! 큐에 들어간 순서가 notifier에 전달되는 순서입니다.
//!
//! 파이프라인은 큐 상태 때문에 멈추지 않습니다. 큐가 가득 차면 별도 태스크가
//! 전송을 이어받으며, 이 경우에만 레코드 간 순서가 보장되지 않습니다.

use metrics::counter;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, warn};

use lockout_core::EventRecord;
use lockout_core::metrics as m;

/// `enqueue()` 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 큐에 바로 들어감
    Queued,
    /// 큐가 가득 차 별도 태스크가 전송함
    Deferred,
    /// 큐가 닫혀 버려짐
    Dropped,
}

/// 판단 레코드 전달자
#[derive(Debug, Clone)]
pub struct EventRecordDispatcher {
    tx: mpsc::Sender<EventRecord>,
}

impl EventRecordDispatcher {
    /// 용량 `capacity`의 큐를 만들고 전달자와 수신측을 반환합니다.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EventRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// 기존 송신측으로 전달자를 생성합니다.
    pub fn from_sender(tx: mpsc::Sender<EventRecord>) -> Self {
        Self { tx }
    }

    /// 큐가 닫혔는지 확인합니다.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// 레코드를 큐에 넣습니다. 호출자를 블로킹하지 않습니다.
    ///
    /// 에러를 담은 레코드는 여기서 `error!`로 한 번 기록됩니다.
    pub fn enqueue(&self, record: EventRecord) -> DispatchOutcome {
        if let Some(err) = &record.error {
            error!(
                username = %record.alert.username,
                user_ip = %record.alert.user_ip,
                action = %record.action,
                error = %err,
                "{}",
                record.note
            );
        } else {
            debug!(
                username = %record.alert.username,
                action = %record.action,
                "dispatching event record"
            );
        }

        let action = record.action.as_str();
        match self.tx.try_send(record) {
            Ok(()) => {
                counter!(m::RESPONDER_RECORDS_DISPATCHED_TOTAL, m::LABEL_ACTION => action)
                    .increment(1);
                DispatchOutcome::Queued
            }
            Err(TrySendError::Full(record)) => {
                counter!(m::RESPONDER_RECORDS_DEFERRED_TOTAL).increment(1);
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    match tx.send(record).await {
                        Ok(()) => {
                            counter!(m::RESPONDER_RECORDS_DISPATCHED_TOTAL, m::LABEL_ACTION => action)
                                .increment(1);
                        }
                        Err(e) => {
                            counter!(m::RESPONDER_RECORDS_DROPPED_TOTAL).increment(1);
                            warn!(action = %e.0.action, "record queue closed before deferred send");
                        }
                    }
                });
                DispatchOutcome::Deferred
            }
            Err(TrySendError::Closed(record)) => {
                counter!(m::RESPONDER_RECORDS_DROPPED_TOTAL).increment(1);
                warn!(
                    username = %record.alert.username,
                    action = %record.action,
                    "record queue closed, dropping event record"
                );
                DispatchOutcome::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use lockout_core::{Action, AlertEvent};

    use super::*;

    fn record(action: Action) -> EventRecord {
        EventRecord::new(&AlertEvent::new("alice", "10.0.0.5"), action, "")
    }

    #[tokio::test]
    async fn queued_records_arrive_in_order() {
        let (dispatcher, mut rx) = EventRecordDispatcher::new(8);
        assert_eq!(
            dispatcher.enqueue(record(Action::DisableRequestReceived)),
            DispatchOutcome::Queued
        );
        assert_eq!(
            dispatcher.enqueue(record(Action::DisablingUsername)),
            DispatchOutcome::Queued
        );

        assert_eq!(rx.recv().await.unwrap().action, Action::DisableRequestReceived);
        assert_eq!(rx.recv().await.unwrap().action, Action::DisablingUsername);
    }

    #[tokio::test]
    async fn full_queue_defers_without_blocking() {
        let (dispatcher, mut rx) = EventRecordDispatcher::new(1);
        assert_eq!(
            dispatcher.enqueue(record(Action::DisableRequestReceived)),
            DispatchOutcome::Queued
        );
        assert_eq!(
            dispatcher.enqueue(record(Action::DisabledUsername)),
            DispatchOutcome::Deferred
        );

        // 소비하면 지연된 레코드도 도착함
        assert_eq!(rx.recv().await.unwrap().action, Action::DisableRequestReceived);
        assert_eq!(rx.recv().await.unwrap().action, Action::DisabledUsername);
    }

    #[tokio::test]
    async fn closed_queue_drops() {
        let (dispatcher, rx) = EventRecordDispatcher::new(4);
        drop(rx);
        assert!(dispatcher.is_closed());
        assert_eq!(
            dispatcher.enqueue(record(Action::DisabledUsername)),
            DispatchOutcome::Dropped
        );
    }
}
