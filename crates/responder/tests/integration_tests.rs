//! 통합 테스트 -- 알림 처리 전체 흐름 검증
//!
//! 알림 수신 → 무시 목록 → 차단 목록 → 세션 종료 → 레코드 전달
//! 시나리오를 임시 파일과 mock 세션 디렉토리로 테스트합니다.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lockout_core::{
    Action, AlertEvent, EventRecord, HealthStatus, Pipeline, ResponseError, SessionTermination,
    UserSession,
};
use lockout_responder::{
    DisableEventPipeline, EventRecordDispatcher, Notifier, NotifyWorker, Outcome,
    ReportedEventsLog, ResponderBuilder, ResponderConfig, ResponderConfigBuilder, ResponderError,
    SessionDirectory, spawn_notify_worker,
};
use tokio::sync::{broadcast, mpsc};

// Mock session directory for integration tests
mod mock {
    use super::*;

    pub enum Lookup {
        Sessions(Vec<&'static str>),
        Fail(&'static str),
    }

    pub struct TestSessionDirectory {
        lookup: Lookup,
        failing_sessions: Vec<&'static str>,
        pub resolve_calls: AtomicUsize,
        pub terminated: Mutex<Vec<String>>,
    }

    impl TestSessionDirectory {
        pub fn with_sessions(ids: &[&'static str]) -> Self {
            Self::new(Lookup::Sessions(ids.to_vec()))
        }

        pub fn failing_lookup(reason: &'static str) -> Self {
            Self::new(Lookup::Fail(reason))
        }

        pub fn fail_termination_of(mut self, ids: &[&'static str]) -> Self {
            self.failing_sessions = ids.to_vec();
            self
        }

        fn new(lookup: Lookup) -> Self {
            Self {
                lookup,
                failing_sessions: Vec::new(),
                resolve_calls: AtomicUsize::new(0),
                terminated: Mutex::new(Vec::new()),
            }
        }
    }

    impl SessionDirectory for TestSessionDirectory {
        async fn resolve_sessions(
            &self,
            username: &str,
            _active_file: &Path,
            _search_delay: Duration,
            _search_retries: u32,
        ) -> Result<Vec<UserSession>, ResponseError> {
            self.resolve_calls.fetch_add(1, Ordering::SeqCst);
            match &self.lookup {
                Lookup::Sessions(ids) => Ok(ids
                    .iter()
                    .map(|id| UserSession::new(*id, username))
                    .collect()),
                Lookup::Fail(reason) => Err(ResponseError::SessionLookup {
                    username: username.to_owned(),
                    reason: (*reason).to_owned(),
                }),
            }
        }

        async fn terminate_sessions(
            &self,
            sessions: &[UserSession],
            _executable: &Path,
        ) -> Vec<SessionTermination> {
            sessions
                .iter()
                .map(|s| {
                    self.terminated.lock().unwrap().push(s.session_id.clone());
                    if self.failing_sessions.iter().any(|id| *id == s.session_id) {
                        SessionTermination::failed(s.session_id.clone(), "exit status: 1")
                    } else {
                        SessionTermination::succeeded(s.session_id.clone())
                    }
                })
                .collect()
        }
    }
}

use mock::TestSessionDirectory;

struct Env {
    dir: tempfile::TempDir,
}

impl Env {
    fn new() -> Self {
        let env = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        env.write("users.ignored", "");
        env.write("ips.ignored", "");
        env
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, content: &str) {
        std::fs::write(self.path(name), content).unwrap();
    }

    fn registry_content(&self) -> String {
        std::fs::read_to_string(self.path("users.disabled")).unwrap_or_default()
    }

    fn config(&self, terminate: bool, ignore_lookup_errors: bool) -> ResponderConfig {
        let p = |name: &str| self.path(name).display().to_string();
        ResponderConfigBuilder::new()
            .ignored_files(p("users.ignored"), p("ips.ignored"))
            .ignore_lookup_errors(ignore_lookup_errors)
            .disabled_users_file(p("users.disabled"))
            .entry_suffix("::deny")
            .reported_log_file(p("reported.log"))
            .ezproxy("/usr/local/ezproxy/ezproxy", p("ezproxy.hst"))
            .session_search(3, 0)
            .terminate_sessions(terminate)
            .build()
            .unwrap()
    }

    fn pipeline(
        &self,
        config: &ResponderConfig,
        directory: TestSessionDirectory,
    ) -> (
        DisableEventPipeline<TestSessionDirectory>,
        mpsc::Receiver<EventRecord>,
    ) {
        let (dispatcher, rx) = EventRecordDispatcher::new(128);
        (
            DisableEventPipeline::from_config(config, directory, dispatcher),
            rx,
        )
    }
}

fn drain(rx: &mut mpsc::Receiver<EventRecord>) -> Vec<EventRecord> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

fn actions(records: &[EventRecord]) -> Vec<Action> {
    records.iter().map(|r| r.action).collect()
}

fn alice() -> AlertEvent {
    AlertEvent::new("alice", "10.0.0.5")
}

#[tokio::test]
async fn end_to_end_disable_and_terminate() {
    let env = Env::new();
    let config = env.config(true, false);
    let (pipeline, mut rx) = env.pipeline(&config, TestSessionDirectory::with_sessions(&["abc123"]));

    let alert = alice();
    let outcome = pipeline.process(&alert).await.unwrap();
    assert_eq!(outcome, Outcome::Terminated);

    let records = drain(&mut rx);
    assert_eq!(
        actions(&records),
        vec![
            Action::DisableRequestReceived,
            Action::DisablingUsername,
            Action::DisabledUsername,
            Action::TerminatingSession,
            Action::TerminatedSessions,
        ]
    );
    assert_eq!(records[3].session_ids(), ["abc123"]);
    assert!(records.iter().all(|r| !r.is_error()));
    assert!(
        records
            .iter()
            .all(|r| r.metadata.trace_id == alert.metadata.trace_id)
    );

    match &records[4].detail {
        Some(lockout_core::RecordDetail::Termination(summary)) => {
            assert_eq!(summary.success_count(), 1);
            assert_eq!(summary.failure_count(), 0);
        }
        other => panic!("expected termination summary, got {other:?}"),
    }

    assert_eq!(env.registry_content(), "alice::deny\n");
    assert_eq!(pipeline.registry().path(), env.path("users.disabled"));
}

#[tokio::test]
async fn repeated_alert_writes_one_registry_entry() {
    let env = Env::new();
    let config = env.config(false, false);
    let (pipeline, mut rx) = env.pipeline(&config, TestSessionDirectory::with_sessions(&["abc"]));

    pipeline.process(&alice()).await.unwrap();
    pipeline.process(&alice()).await.unwrap();

    assert_eq!(env.registry_content(), "alice::deny\n");
    let records = drain(&mut rx);
    let already = records
        .iter()
        .filter(|r| r.action == Action::UsernameAlreadyDisabled)
        .count();
    assert_eq!(already, 1);
}

#[tokio::test]
async fn ignored_username_wins_regardless_of_ip_list() {
    let env = Env::new();
    env.write("users.ignored", "# service accounts\n  alice  \n");
    env.write("ips.ignored", "10.0.0.5\n");
    let config = env.config(true, false);
    let (pipeline, mut rx) = env.pipeline(&config, TestSessionDirectory::with_sessions(&["abc"]));

    assert_eq!(pipeline.process(&alice()).await.unwrap(), Outcome::Ignored);

    let records = drain(&mut rx);
    assert_eq!(
        actions(&records),
        vec![Action::DisableRequestReceived, Action::IgnoredUsername]
    );
    assert!(env.registry_content().is_empty());
}

#[tokio::test]
async fn ignored_ip_address_blocks_mutation() {
    let env = Env::new();
    env.write("users.ignored", "bob\n");
    env.write("ips.ignored", "10.0.0.5\n");
    let config = env.config(true, false);
    let directory = TestSessionDirectory::with_sessions(&["abc"]);
    let (pipeline, mut rx) = env.pipeline(&config, directory);

    assert_eq!(pipeline.process(&alice()).await.unwrap(), Outcome::Ignored);
    assert_eq!(
        actions(&drain(&mut rx)),
        vec![Action::DisableRequestReceived, Action::IgnoredIpAddress]
    );
    assert!(env.registry_content().is_empty());
}

#[tokio::test]
async fn unreadable_ignore_list_fails_closed() {
    let env = Env::new();
    std::fs::remove_file(env.path("users.ignored")).unwrap();
    let config = env.config(true, false);
    let (pipeline, mut rx) = env.pipeline(&config, TestSessionDirectory::with_sessions(&["abc"]));

    assert_eq!(
        pipeline.process(&alice()).await.unwrap(),
        Outcome::IgnoreLookupFailed
    );

    let records = drain(&mut rx);
    let errors: Vec<_> = records.iter().filter(|r| r.is_error()).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].action, Action::IgnoredUsernameLookupFailure);
    assert!(!env.path("users.disabled").exists());
}

#[tokio::test]
async fn unreadable_ignore_list_proceeds_when_opted_in() {
    let env = Env::new();
    std::fs::remove_file(env.path("ips.ignored")).unwrap();
    let config = env.config(false, true);
    let (pipeline, mut rx) = env.pipeline(&config, TestSessionDirectory::with_sessions(&["abc"]));

    assert_eq!(pipeline.process(&alice()).await.unwrap(), Outcome::Skipped);

    let records = drain(&mut rx);
    assert!(records.iter().all(|r| !r.is_error()));
    assert_eq!(records[1].action, Action::DisablingUsername);
    assert_eq!(env.registry_content(), "alice::deny\n");
}

#[tokio::test]
async fn skip_path_looks_up_but_never_terminates() {
    let env = Env::new();
    let config = env.config(false, false);
    let directory = TestSessionDirectory::with_sessions(&["abc", "def"]);
    let (dispatcher, mut rx) = EventRecordDispatcher::new(64);
    let pipeline = DisableEventPipeline::from_config(&config, directory, dispatcher);

    assert_eq!(pipeline.process(&alice()).await.unwrap(), Outcome::Skipped);

    let records = drain(&mut rx);
    let skipped = records.last().unwrap();
    assert_eq!(skipped.action, Action::SkippedTerminateSessions);
    assert_eq!(skipped.session_ids(), ["abc", "def"]);
    assert!(
        !records
            .iter()
            .any(|r| r.action == Action::TerminatingSession)
    );
}

#[tokio::test]
async fn zero_sessions_yields_one_lookup_failure() {
    let env = Env::new();
    let config = env.config(true, false);
    let (pipeline, mut rx) = env.pipeline(&config, TestSessionDirectory::with_sessions(&[]));

    assert_eq!(
        pipeline.process(&alice()).await.unwrap(),
        Outcome::LookupFailed
    );

    let records = drain(&mut rx);
    let errors: Vec<_> = records.iter().filter(|r| r.is_error()).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].action, Action::SessionLookupFailure);
    assert!(matches!(
        errors[0].error,
        Some(ResponseError::NoActiveSessions { attempts: 3, .. })
    ));
    // 차단은 이미 완료됨
    assert_eq!(env.registry_content(), "alice::deny\n");
}

#[tokio::test]
async fn lookup_error_on_skip_path_still_reports_skip() {
    let env = Env::new();
    let config = env.config(false, false);
    let (pipeline, mut rx) = env.pipeline(
        &config,
        TestSessionDirectory::failing_lookup("permission denied"),
    );

    assert_eq!(pipeline.process(&alice()).await.unwrap(), Outcome::Skipped);

    let records = drain(&mut rx);
    let all = actions(&records);
    assert_eq!(
        &all[all.len() - 2..],
        [Action::SessionLookupFailure, Action::SkippedTerminateSessions]
    );
    assert!(records.last().unwrap().session_ids().is_empty());
}

#[tokio::test]
async fn partial_termination_failure_is_one_aggregate_record() {
    let env = Env::new();
    let config = env.config(true, false);
    let directory =
        TestSessionDirectory::with_sessions(&["abc", "def", "ghi"]).fail_termination_of(&["def"]);
    let (pipeline, mut rx) = env.pipeline(&config, directory);

    assert_eq!(
        pipeline.process(&alice()).await.unwrap(),
        Outcome::Terminated
    );

    let records = drain(&mut rx);
    let terminating = records
        .iter()
        .filter(|r| r.action == Action::TerminatingSession)
        .count();
    assert_eq!(terminating, 3);

    let errors: Vec<_> = records.iter().filter(|r| r.is_error()).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].action, Action::TerminationFailure);
    match &errors[0].error {
        Some(ResponseError::Termination { failed, total, .. }) => {
            assert_eq!((*failed, *total), (1, 3));
        }
        other => panic!("expected termination error, got {other:?}"),
    }
}

#[tokio::test]
async fn registry_mutation_failure_is_terminal() {
    let env = Env::new();
    let mut config = env.config(true, false);
    config.disabled_users_file = env.path("missing-dir/users.disabled").display().to_string();
    let directory = TestSessionDirectory::with_sessions(&["abc"]);
    let (pipeline, mut rx) = env.pipeline(&config, directory);

    assert_eq!(
        pipeline.process(&alice()).await.unwrap(),
        Outcome::DisableMutationFailed
    );
    let records = drain(&mut rx);
    assert_eq!(records.last().unwrap().action, Action::DisableFailure);
    assert!(records.last().unwrap().is_error());
}

#[cfg(unix)]
#[tokio::test]
async fn unreadable_registry_still_appends_when_opted_in() {
    use std::os::unix::fs::PermissionsExt;

    let env = Env::new();
    env.write("users.disabled", "bob::deny\n");
    let registry = env.path("users.disabled");
    std::fs::set_permissions(&registry, std::fs::Permissions::from_mode(0o200)).unwrap();
    if std::fs::read(&registry).is_ok() {
        // 권한 검사가 우회되는 환경(root)에서는 읽기 실패를 재현할 수 없음
        return;
    }

    let config = env.config(false, true);
    let (pipeline, mut rx) = env.pipeline(&config, TestSessionDirectory::with_sessions(&["abc"]));
    let outcome = pipeline.process(&alice()).await.unwrap();
    assert_ne!(outcome, Outcome::DisableMutationFailed);
    assert_eq!(outcome, Outcome::Skipped);

    let records = drain(&mut rx);
    assert!(actions(&records).contains(&Action::DisabledUsername));
    assert!(!actions(&records).contains(&Action::DisableFailure));

    std::fs::set_permissions(&registry, std::fs::Permissions::from_mode(0o644)).unwrap();
    assert_eq!(env.registry_content(), "bob::deny\nalice::deny\n");
}

#[tokio::test]
async fn concurrent_alerts_for_distinct_users_all_land() {
    let env = Env::new();
    let config = env.config(false, false);
    let (dispatcher, _rx) = EventRecordDispatcher::new(1024);
    let pipeline = Arc::new(DisableEventPipeline::from_config(
        &config,
        TestSessionDirectory::with_sessions(&["s1"]),
        dispatcher,
    ));

    let mut handles = Vec::new();
    for i in 0..20 {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            // 같은 사용자 두 번씩
            let alert = AlertEvent::new(format!("user{}", i % 10), "10.0.0.5");
            pipeline.process(&alert).await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let content = env.registry_content();
    let mut lines: Vec<_> = content.lines().collect();
    lines.sort_unstable();
    let expected: Vec<String> = (0..10).map(|i| format!("user{i}::deny")).collect();
    assert_eq!(lines, expected);
}

// --- Responder + NotifyWorker ---

#[derive(Clone, Default)]
struct CollectingNotifier {
    records: Arc<Mutex<Vec<EventRecord>>>,
}

impl Notifier for CollectingNotifier {
    fn name(&self) -> &str {
        "collecting"
    }

    async fn notify(&self, record: &EventRecord) -> Result<(), ResponderError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[tokio::test]
async fn responder_delivers_records_to_notifiers() {
    let env = Env::new();
    let config = env.config(true, false);
    let (alert_tx, alert_rx) = mpsc::channel(16);

    let (mut responder, record_rx) = ResponderBuilder::new()
        .config(config.clone())
        .session_directory(TestSessionDirectory::with_sessions(&["abc123"]))
        .alert_receiver(alert_rx)
        .build()
        .unwrap();

    let collecting = CollectingNotifier::default();
    let worker = NotifyWorker::new(record_rx.unwrap())
        .with_notifier(ReportedEventsLog::from_config(&config))
        .with_notifier(collecting.clone());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let worker_handle = spawn_notify_worker(worker, shutdown_rx);

    responder.start().await.unwrap();
    assert_eq!(responder.health_check().await, HealthStatus::Healthy);

    alert_tx.send(alice()).await.unwrap();
    responder.stop().await.unwrap();
    shutdown_tx.send(()).unwrap();
    let stats = worker_handle.await.unwrap();

    assert_eq!(stats.records, 5);
    assert_eq!(stats.failures, 0);
    assert_eq!(
        actions(&collecting.records.lock().unwrap()),
        vec![
            Action::DisableRequestReceived,
            Action::DisablingUsername,
            Action::DisabledUsername,
            Action::TerminatingSession,
            Action::TerminatedSessions,
        ]
    );

    let log = std::fs::read_to_string(env.path("reported.log")).unwrap();
    let tags: Vec<_> = log
        .lines()
        .filter_map(|l| l.split_whitespace().nth(1))
        .collect();
    assert_eq!(
        tags,
        vec![
            "[REPORTED]",
            "[DISABLING]",
            "[DISABLED]",
            "[TERMINATING]",
            "[TERMINATED]"
        ]
    );
}
