//! 알림 하나의 처리 파이프라인
//!
//! [`DisableEventPipeline`]은 무시 목록, 차단 목록, 세션 종료를 차례로 실행하고
//! 판단 지점마다 [`EventRecord`]를 하나씩 dispatcher에 넘깁니다.
//! 상태 전이는 [`PipelineState::next`]가 결정하며, 이 모듈은 각 상태의 I/O만 담당합니다.
//!
//! 실패는 호출자에게 전파되지 않고 에러를 담은 레코드로 변환됩니다.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info, warn};

use lockout_core::metrics as m;
use lockout_core::{Action, AlertEvent, EventRecord, RecordDetail, UserSession};

use crate::config::ResponderConfig;
use crate::dispatcher::EventRecordDispatcher;
use crate::error::ResponderError;
use crate::ignore::{IgnoreListChecker, IgnoreVerdict};
use crate::registry::{DisableResult, DisabledAccountRegistry};
use crate::session::SessionDirectory;
use crate::state::{
    DisableStatus, IgnoreStatus, LookupStatus, MutationStatus, Outcome, PipelineState, StageEvent,
    TransitionPolicy,
};
use crate::termination::TerminationOrchestrator;

/// 알림 처리 파이프라인
///
/// 여러 알림이 같은 인스턴스를 동시에 사용할 수 있습니다.
/// 차단 목록은 `Arc`로 공유되어 모든 실행이 하나의 잠금을 거칩니다.
pub struct DisableEventPipeline<D> {
    ignore: IgnoreListChecker,
    registry: Arc<DisabledAccountRegistry>,
    termination: TerminationOrchestrator<D>,
    dispatcher: EventRecordDispatcher,
    policy: TransitionPolicy,
}

impl<D: SessionDirectory> DisableEventPipeline<D> {
    /// 구성 요소로 파이프라인을 생성합니다.
    pub fn new(
        ignore: IgnoreListChecker,
        registry: Arc<DisabledAccountRegistry>,
        termination: TerminationOrchestrator<D>,
        dispatcher: EventRecordDispatcher,
        policy: TransitionPolicy,
    ) -> Self {
        Self {
            ignore,
            registry,
            termination,
            dispatcher,
            policy,
        }
    }

    /// 엔진 설정으로 파이프라인을 생성합니다.
    pub fn from_config(
        config: &ResponderConfig,
        directory: D,
        dispatcher: EventRecordDispatcher,
    ) -> Self {
        Self::new(
            IgnoreListChecker::new(
                &config.ignored_users_file,
                &config.ignored_ips_file,
                &config.ignored_comment_marker,
            ),
            Arc::new(DisabledAccountRegistry::from_config(config)),
            TerminationOrchestrator::from_config(directory, config),
            dispatcher,
            TransitionPolicy::from(config),
        )
    }

    /// 전이 정책
    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// 공유 차단 목록
    pub fn registry(&self) -> &Arc<DisabledAccountRegistry> {
        &self.registry
    }

    /// 레코드 전달자
    pub fn dispatcher(&self) -> &EventRecordDispatcher {
        &self.dispatcher
    }

    /// 알림 하나를 종료 상태까지 처리합니다.
    ///
    /// 처리 중 발생한 실패는 레코드로 전달되며 여기서 반환되지 않습니다.
    /// `Err`는 상태 기계가 받을 수 없는 이벤트를 만난 경우뿐입니다.
    pub async fn process(&self, alert: &AlertEvent) -> Result<Outcome, ResponderError> {
        info!(
            username = %alert.username,
            user_ip = %alert.user_ip,
            trace_id = %alert.metadata.trace_id,
            "processing disable request"
        );
        self.emit(EventRecord::new(
            alert,
            Action::DisableRequestReceived,
            format!(
                "Received disable request for username {:?} from IP {:?}",
                alert.username, alert.user_ip
            ),
        ));

        let mut state = PipelineState::Received;
        let mut sessions: Vec<UserSession> = Vec::new();

        loop {
            let event = match state {
                PipelineState::Received => self.check_ignored(alert).await,
                PipelineState::DisableCheck => self.check_disabled(alert).await,
                PipelineState::Disabling => self.apply_disable(alert).await,
                PipelineState::TerminationDecision => {
                    let (status, found) = self.resolve_sessions(alert).await;
                    sessions = found;
                    StageEvent::SessionsResolved(status)
                }
                PipelineState::Terminating => self.terminate(alert, &sessions).await,
                PipelineState::Done(outcome) => {
                    counter!(m::RESPONDER_ALERTS_PROCESSED_TOTAL, m::LABEL_RESULT => outcome.to_string())
                        .increment(1);
                    info!(username = %alert.username, %outcome, "disable request finished");
                    return Ok(outcome);
                }
            };

            let next = state.next(event, &self.policy)?;
            debug!(from = ?state, to = ?next, "pipeline transition");
            state = next;
        }
    }

    async fn check_ignored(&self, alert: &AlertEvent) -> StageEvent {
        let verdict = self.ignore.check(alert).await;
        let status = match &verdict {
            IgnoreVerdict::NotIgnored => IgnoreStatus::Clear,
            IgnoreVerdict::IgnoredUsername { .. } | IgnoreVerdict::IgnoredIpAddress { .. } => {
                IgnoreStatus::Ignored
            }
            IgnoreVerdict::LookupFailed { error, .. } => {
                if self.policy.ignore_lookup_errors {
                    warn!(
                        username = %alert.username,
                        user_ip = %alert.user_ip,
                        error = %error,
                        "ignore list lookup failed, continuing as not ignored"
                    );
                    return StageEvent::IgnoreChecked(IgnoreStatus::LookupFailed);
                }
                IgnoreStatus::LookupFailed
            }
        };

        if let Some(record) = verdict.to_record(alert) {
            self.emit(record);
        }
        StageEvent::IgnoreChecked(status)
    }

    async fn check_disabled(&self, alert: &AlertEvent) -> StageEvent {
        let status = match self.registry.is_disabled(&alert.username).await {
            Ok(false) => DisableStatus::NotDisabled,
            Ok(true) => {
                self.emit_already_disabled(alert);
                DisableStatus::AlreadyDisabled
            }
            Err(e) if self.policy.ignore_lookup_errors => {
                warn!(
                    username = %alert.username,
                    error = %e,
                    "disabled users lookup failed, continuing as not disabled"
                );
                DisableStatus::LookupFailed
            }
            Err(e) => {
                self.emit(EventRecord::failure(
                    alert,
                    Action::DisableLookupFailure,
                    e,
                    "Disabled users lookup failed; username not disabled",
                ));
                DisableStatus::LookupFailed
            }
        };
        StageEvent::DisableChecked(status)
    }

    async fn apply_disable(&self, alert: &AlertEvent) -> StageEvent {
        self.emit(EventRecord::new(
            alert,
            Action::DisablingUsername,
            format!("Disabling username {:?}", alert.username),
        ));

        let status = match self.registry.disable(alert).await {
            Ok(DisableResult::Appended) => {
                counter!(m::RESPONDER_ACCOUNTS_DISABLED_TOTAL).increment(1);
                self.emit(EventRecord::new(
                    alert,
                    Action::DisabledUsername,
                    format!(
                        "Disabled username {:?} in {}",
                        alert.username,
                        self.registry.path().display()
                    ),
                ));
                MutationStatus::Appended
            }
            Ok(DisableResult::AlreadyPresent) => {
                self.emit_already_disabled(alert);
                MutationStatus::AlreadyPresent
            }
            Err(e) => {
                self.emit(EventRecord::failure(
                    alert,
                    Action::DisableFailure,
                    e,
                    format!("Failed to disable username {:?}", alert.username),
                ));
                MutationStatus::Failed
            }
        };
        StageEvent::DisableApplied(status)
    }

    /// 세션을 조회합니다. 종료가 비활성화되어도 기록을 위해 조회는 수행합니다.
    async fn resolve_sessions(&self, alert: &AlertEvent) -> (LookupStatus, Vec<UserSession>) {
        let terminate = self.policy.terminate_sessions;
        if !terminate {
            warn!(
                username = %alert.username,
                "session termination disabled, sessions are looked up but left active"
            );
        }

        match self.termination.lookup_sessions(&alert.username).await {
            Ok(sessions) => {
                if !terminate {
                    self.emit_skipped(alert, &sessions);
                }
                (LookupStatus::Found, sessions)
            }
            Err(e) => {
                self.emit(EventRecord::failure(
                    alert,
                    Action::SessionLookupFailure,
                    e,
                    format!("Failed to look up sessions for username {:?}", alert.username),
                ));
                if !terminate {
                    self.emit_skipped(alert, &[]);
                }
                (LookupStatus::Failed, Vec::new())
            }
        }
    }

    async fn terminate(&self, alert: &AlertEvent, sessions: &[UserSession]) -> StageEvent {
        for session in sessions {
            self.emit(
                EventRecord::new(
                    alert,
                    Action::TerminatingSession,
                    format!(
                        "Terminating session {} for username {:?}",
                        session.session_id, alert.username
                    ),
                )
                .with_detail(RecordDetail::Sessions {
                    session_ids: vec![session.session_id.clone()],
                }),
            );
        }

        let outcome = self.termination.terminate(&alert.username, sessions).await;
        let note = format!("{} for username {:?}", outcome.summary, alert.username);
        let record = match outcome.error() {
            None => EventRecord::new(alert, Action::TerminatedSessions, note),
            Some(err) => EventRecord::failure(alert, Action::TerminationFailure, err, note),
        };
        self.emit(record.with_detail(RecordDetail::Termination(outcome.summary)));

        StageEvent::SessionsTerminated
    }

    fn emit_already_disabled(&self, alert: &AlertEvent) {
        self.emit(EventRecord::new(
            alert,
            Action::UsernameAlreadyDisabled,
            format!(
                "Username {:?} already disabled in {}",
                alert.username,
                self.registry.path().display()
            ),
        ));
    }

    fn emit_skipped(&self, alert: &AlertEvent, sessions: &[UserSession]) {
        let session_ids: Vec<String> = sessions.iter().map(|s| s.session_id.clone()).collect();
        let listed = session_ids
            .iter()
            .map(|id| format!("{id:?}"))
            .collect::<Vec<_>>()
            .join(", ");
        self.emit(
            EventRecord::new(
                alert,
                Action::SkippedTerminateSessions,
                format!("Skipping termination of sessions: {listed}"),
            )
            .with_detail(RecordDetail::Sessions { session_ids }),
        );
    }

    fn emit(&self, record: EventRecord) {
        self.dispatcher.enqueue(record);
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use lockout_core::{ResponseError, SessionTermination};
    use tokio::sync::mpsc;

    use super::*;

    /// 고정 세션을 반환하는 디렉토리
    struct StubDirectory {
        ids: Vec<&'static str>,
        terminate_calls: AtomicUsize,
    }

    impl StubDirectory {
        fn new(ids: &[&'static str]) -> Self {
            Self {
                ids: ids.to_vec(),
                terminate_calls: AtomicUsize::new(0),
            }
        }
    }

    impl SessionDirectory for StubDirectory {
        async fn resolve_sessions(
            &self,
            username: &str,
            _active_file: &Path,
            _search_delay: Duration,
            _search_retries: u32,
        ) -> Result<Vec<UserSession>, ResponseError> {
            Ok(self
                .ids
                .iter()
                .map(|id| UserSession::new(*id, username))
                .collect())
        }

        async fn terminate_sessions(
            &self,
            sessions: &[UserSession],
            _executable: &Path,
        ) -> Vec<SessionTermination> {
            self.terminate_calls.fetch_add(1, Ordering::SeqCst);
            sessions
                .iter()
                .map(|s| SessionTermination::succeeded(s.session_id.clone()))
                .collect()
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        pipeline: DisableEventPipeline<StubDirectory>,
        rx: mpsc::Receiver<EventRecord>,
    }

    fn fixture(ids: &[&'static str], policy: TransitionPolicy) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("users.ignored"), "bob\n").unwrap();
        std::fs::write(dir.path().join("ips.ignored"), "192.0.2.1\n").unwrap();

        let (dispatcher, rx) = EventRecordDispatcher::new(64);
        let pipeline = DisableEventPipeline::new(
            IgnoreListChecker::new(
                dir.path().join("users.ignored"),
                dir.path().join("ips.ignored"),
                "#",
            ),
            Arc::new(DisabledAccountRegistry::new(
                dir.path().join("users.disabled"),
                "::deny",
                "{username}{suffix}",
                "#",
                0o644,
            )),
            TerminationOrchestrator::new(
                StubDirectory::new(ids),
                dir.path().join("ezproxy.hst"),
                "/usr/local/ezproxy/ezproxy",
                Duration::ZERO,
                1,
            ),
            dispatcher,
            policy,
        );
        Fixture { dir, pipeline, rx }
    }

    fn actions(rx: &mut mpsc::Receiver<EventRecord>) -> Vec<Action> {
        let mut out = Vec::new();
        while let Ok(record) = rx.try_recv() {
            out.push(record.action);
        }
        out
    }

    const TERMINATE: TransitionPolicy = TransitionPolicy {
        ignore_lookup_errors: false,
        terminate_sessions: true,
    };

    #[tokio::test]
    async fn new_user_is_disabled_and_sessions_terminated() {
        let mut f = fixture(&["abc123"], TERMINATE);
        let outcome = f
            .pipeline
            .process(&AlertEvent::new("alice", "10.0.0.5"))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Terminated);
        assert_eq!(
            actions(&mut f.rx),
            vec![
                Action::DisableRequestReceived,
                Action::DisablingUsername,
                Action::DisabledUsername,
                Action::TerminatingSession,
                Action::TerminatedSessions,
            ]
        );
        let content = std::fs::read_to_string(f.dir.path().join("users.disabled")).unwrap();
        assert_eq!(content, "alice::deny\n");
    }

    #[tokio::test]
    async fn second_run_reports_already_disabled() {
        let mut f = fixture(&["abc123"], TERMINATE);
        let alert = AlertEvent::new("alice", "10.0.0.5");
        f.pipeline.process(&alert).await.unwrap();
        actions(&mut f.rx);

        f.pipeline.process(&alert).await.unwrap();
        let second = actions(&mut f.rx);
        assert_eq!(second[1], Action::UsernameAlreadyDisabled);
        assert!(!second.contains(&Action::DisablingUsername));
    }

    #[tokio::test]
    async fn ignored_username_stops_without_mutation() {
        let mut f = fixture(&["abc123"], TERMINATE);
        let outcome = f
            .pipeline
            .process(&AlertEvent::new("bob", "10.0.0.5"))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Ignored);
        assert_eq!(
            actions(&mut f.rx),
            vec![Action::DisableRequestReceived, Action::IgnoredUsername]
        );
        assert!(!f.dir.path().join("users.disabled").exists());
    }

    #[tokio::test]
    async fn skip_path_lists_sessions_without_terminating() {
        let policy = TransitionPolicy {
            ignore_lookup_errors: false,
            terminate_sessions: false,
        };
        let mut f = fixture(&["abc", "def"], policy);
        let outcome = f
            .pipeline
            .process(&AlertEvent::new("alice", "10.0.0.5"))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Skipped);

        let mut last = None;
        while let Ok(record) = f.rx.try_recv() {
            last = Some(record);
        }
        let last = last.unwrap();
        assert_eq!(last.action, Action::SkippedTerminateSessions);
        assert_eq!(last.session_ids(), ["abc", "def"]);
        assert_eq!(last.note, "Skipping termination of sessions: \"abc\", \"def\"");
        assert_eq!(
            f.pipeline
                .termination
                .directory()
                .terminate_calls
                .load(Ordering::SeqCst),
            0
        );
    }

    #[tokio::test]
    async fn zero_sessions_is_single_lookup_failure() {
        let mut f = fixture(&[], TERMINATE);
        let outcome = f
            .pipeline
            .process(&AlertEvent::new("alice", "10.0.0.5"))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::LookupFailed);

        let records: Vec<_> = std::iter::from_fn(|| f.rx.try_recv().ok()).collect();
        let errors: Vec<_> = records.iter().filter(|r| r.is_error()).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].action, Action::SessionLookupFailure);
        assert!(
            !records
                .iter()
                .any(|r| r.action == Action::TerminatingSession)
        );
    }
}
