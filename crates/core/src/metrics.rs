//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `lockout_`
//! - 모듈명: `ingest_`, `responder_`, `notify_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(lockout_core::metrics::RESPONDER_ACCOUNTS_DISABLED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 판단 결과 레이블 키 (`Action::as_str()`)
pub const LABEL_ACTION: &str = "action";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// notifier 이름 레이블 키 (reported_log, webhook)
pub const LABEL_NOTIFIER: &str = "notifier";

// ─── Ingest 메트릭 ──────────────────────────────────────────────────

/// Ingest: 수신된 알림 수 (counter)
pub const INGEST_ALERTS_RECEIVED_TOTAL: &str = "lockout_ingest_alerts_received_total";

/// Ingest: 검증 실패로 거부된 알림 수 (counter)
pub const INGEST_ALERTS_REJECTED_TOTAL: &str = "lockout_ingest_alerts_rejected_total";

// ─── Responder 메트릭 ───────────────────────────────────────────────

/// Responder: 처리 완료된 알림 수 (counter)
pub const RESPONDER_ALERTS_PROCESSED_TOTAL: &str = "lockout_responder_alerts_processed_total";

/// Responder: 차단 목록에 추가된 계정 수 (counter)
pub const RESPONDER_ACCOUNTS_DISABLED_TOTAL: &str = "lockout_responder_accounts_disabled_total";

/// Responder: 종료 시도된 세션 수 (counter, label: result)
pub const RESPONDER_SESSIONS_TERMINATED_TOTAL: &str =
    "lockout_responder_sessions_terminated_total";

/// Responder: 큐에 넣은 레코드 수 (counter, label: action)
pub const RESPONDER_RECORDS_DISPATCHED_TOTAL: &str = "lockout_responder_records_dispatched_total";

/// Responder: 큐가 가득 차 지연 전송된 레코드 수 (counter)
pub const RESPONDER_RECORDS_DEFERRED_TOTAL: &str = "lockout_responder_records_deferred_total";

/// Responder: 큐가 닫혀 버려진 레코드 수 (counter)
pub const RESPONDER_RECORDS_DROPPED_TOTAL: &str = "lockout_responder_records_dropped_total";

// ─── Notify 메트릭 ──────────────────────────────────────────────────

/// Notify: 전달된 레코드 수 (counter, label: notifier)
pub const NOTIFY_RECORDS_DELIVERED_TOTAL: &str = "lockout_notify_records_delivered_total";

/// Notify: 전달 실패 수 (counter, label: notifier)
pub const NOTIFY_FAILURES_TOTAL: &str = "lockout_notify_failures_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "lockout_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, labels: version)
pub const DAEMON_BUILD_INFO: &str = "lockout_daemon_build_info";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `lockout-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    // Ingest
    describe_counter!(
        INGEST_ALERTS_RECEIVED_TOTAL,
        "Total number of alerts accepted by the HTTP listener"
    );
    describe_counter!(
        INGEST_ALERTS_REJECTED_TOTAL,
        "Total number of alerts rejected before reaching the responder"
    );

    // Responder
    describe_counter!(
        RESPONDER_ALERTS_PROCESSED_TOTAL,
        "Total number of alerts that reached a terminal pipeline state"
    );
    describe_counter!(
        RESPONDER_ACCOUNTS_DISABLED_TOTAL,
        "Total number of accounts appended to the disabled users file"
    );
    describe_counter!(
        RESPONDER_SESSIONS_TERMINATED_TOTAL,
        "Session termination attempts by result"
    );
    describe_counter!(
        RESPONDER_RECORDS_DISPATCHED_TOTAL,
        "Event records handed to the notification queue by action"
    );
    describe_counter!(
        RESPONDER_RECORDS_DEFERRED_TOTAL,
        "Event records sent from a detached task because the queue was full"
    );
    describe_counter!(
        RESPONDER_RECORDS_DROPPED_TOTAL,
        "Event records dropped because the queue was closed"
    );

    // Notify
    describe_counter!(
        NOTIFY_RECORDS_DELIVERED_TOTAL,
        "Event records delivered by each notifier"
    );
    describe_counter!(
        NOTIFY_FAILURES_TOTAL,
        "Notifier delivery failures by notifier"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Lockout daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}
