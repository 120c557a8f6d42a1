//! 이벤트 시스템: 알림 입력과 판단 레코드
//!
//! 외부 수집기가 전달하는 [`AlertEvent`]가 엔진의 입력이며,
//! 엔진은 판단 지점마다 불변 [`EventRecord`]를 하나씩 생성합니다.
//! [`EventMetadata`]는 두 타입에 공통으로 포함되어 같은 알림에서 파생된
//! 레코드를 하나의 trace로 묶습니다.

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::ResponseError;
use crate::types::TerminationSummary;

// --- 모듈명 상수 ---

/// 알림 수집 모듈명
pub const MODULE_INGEST: &str = "ingest";
/// 대응 엔진 모듈명
pub const MODULE_RESPONDER: &str = "responder";

/// 알림과 레코드가 공유하는 추적 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// 이벤트 발생 시각
    pub timestamp: SystemTime,
    /// 이벤트를 생성한 모듈명 (예: "ingest", "responder")
    pub source_module: String,
    /// 분산 추적 ID: 같은 알림에서 파생된 레코드를 연결합니다
    pub trace_id: String,
}

impl EventMetadata {
    /// 기존 trace_id를 사용하여 새 메타데이터를 생성합니다.
    pub fn new(source_module: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: trace_id.into(),
        }
    }

    /// 새로운 UUID v4 trace_id를 생성하여 메타데이터를 만듭니다.
    pub fn with_new_trace(source_module: impl Into<String>) -> Self {
        Self::new(source_module, uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for EventMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] source={} trace={}",
            unix_timestamp_str(self.timestamp),
            self.source_module,
            self.trace_id,
        )
    }
}

/// 계정 오용 알림
///
/// 수집기가 `username`, `user_ip`가 비어 있지 않음을 검증한 뒤 전달합니다.
/// 수신 이후 변경되지 않으며, 엔진은 저장하지 않고 소비만 합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 메타데이터
    pub metadata: EventMetadata,
    /// 오용이 의심되는 사용자명
    pub username: String,
    /// 사용자 접속 IP
    pub user_ip: String,
    /// 알림 원본의 나머지 필드
    #[serde(default)]
    pub payload: BTreeMap<String, serde_json::Value>,
}

impl AlertEvent {
    /// 새로운 trace를 시작하는 알림을 생성합니다.
    pub fn new(username: impl Into<String>, user_ip: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::with_new_trace(MODULE_INGEST),
            username: username.into(),
            user_ip: user_ip.into(),
            payload: BTreeMap::new(),
        }
    }

    /// 알림 원본 필드를 설정합니다.
    pub fn with_payload(mut self, payload: BTreeMap<String, serde_json::Value>) -> Self {
        self.payload = payload;
        self
    }
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AlertEvent[{}] username={} ip={}",
            &self.id[..8.min(self.id.len())],
            self.username,
            self.user_ip,
        )
    }
}

/// 판단 결과 종류
///
/// 파이프라인의 각 판단 지점을 나타내는 닫힌 열거형입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// 차단 요청 수신
    DisableRequestReceived,
    /// 무시 목록에 있는 사용자명
    IgnoredUsername,
    /// 무시 목록에 있는 IP
    IgnoredIpAddress,
    /// 사용자명 무시 목록 조회 실패
    IgnoredUsernameLookupFailure,
    /// IP 무시 목록 조회 실패
    IgnoredIpAddressLookupFailure,
    /// 차단 목록 조회 실패
    DisableLookupFailure,
    /// 사용자명 차단 시작
    DisablingUsername,
    /// 사용자명 차단 완료
    DisabledUsername,
    /// 사용자명 차단 실패
    DisableFailure,
    /// 이미 차단된 사용자명
    UsernameAlreadyDisabled,
    /// 설정에 의해 세션 종료 건너뜀
    SkippedTerminateSessions,
    /// 세션 조회 실패
    SessionLookupFailure,
    /// 세션 종료 시작
    TerminatingSession,
    /// 세션 종료 완료 (집계)
    TerminatedSessions,
    /// 세션 종료 일부/전체 실패 (집계)
    TerminationFailure,
}

impl Action {
    /// 메트릭/직렬화용 고정 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DisableRequestReceived => "disable_request_received",
            Self::IgnoredUsername => "ignored_username",
            Self::IgnoredIpAddress => "ignored_ip_address",
            Self::IgnoredUsernameLookupFailure => "ignored_username_lookup_failure",
            Self::IgnoredIpAddressLookupFailure => "ignored_ip_address_lookup_failure",
            Self::DisableLookupFailure => "disable_lookup_failure",
            Self::DisablingUsername => "disabling_username",
            Self::DisabledUsername => "disabled_username",
            Self::DisableFailure => "disable_failure",
            Self::UsernameAlreadyDisabled => "username_already_disabled",
            Self::SkippedTerminateSessions => "skipped_terminate_sessions",
            Self::SessionLookupFailure => "session_lookup_failure",
            Self::TerminatingSession => "terminating_session",
            Self::TerminatedSessions => "terminated_sessions",
            Self::TerminationFailure => "termination_failure",
        }
    }

    /// 보고 로그(fail2ban 입력)에 쓰이는 태그를 반환합니다.
    pub fn log_tag(&self) -> &'static str {
        match self {
            Self::DisableRequestReceived => "REPORTED",
            Self::IgnoredUsername | Self::IgnoredIpAddress => "IGNORED",
            Self::DisablingUsername => "DISABLING",
            Self::DisabledUsername => "DISABLED",
            Self::UsernameAlreadyDisabled => "ALREADY-DISABLED",
            Self::SkippedTerminateSessions => "SKIPPED",
            Self::TerminatingSession => "TERMINATING",
            Self::TerminatedSessions => "TERMINATED",
            Self::IgnoredUsernameLookupFailure
            | Self::IgnoredIpAddressLookupFailure
            | Self::DisableLookupFailure
            | Self::DisableFailure
            | Self::SessionLookupFailure
            | Self::TerminationFailure => "FAILURE",
        }
    }

    /// 실패를 나타내는 종류인지 확인합니다.
    pub fn is_failure(&self) -> bool {
        self.log_tag() == "FAILURE"
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 레코드 부가 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordDetail {
    /// 일치한 무시 목록 파일
    IgnoreList {
        /// 무시 목록 경로
        path: String,
    },
    /// 대상 세션 ID 목록
    Sessions {
        /// 세션 ID (조회 순서)
        session_ids: Vec<String>,
    },
    /// 세션 종료 집계
    Termination(TerminationSummary),
}

/// 판단 레코드: 파이프라인 판단 지점마다 정확히 하나씩 생성
///
/// 생성 후에는 변경되지 않으며, dispatcher에 넘기는 순간 소유권이 이전됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// 레코드 고유 ID
    pub id: String,
    /// 레코드 메타데이터 (알림의 trace_id 승계)
    pub metadata: EventMetadata,
    /// 원본 알림
    pub alert: AlertEvent,
    /// 판단 결과 종류
    pub action: Action,
    /// 사람이 읽는 설명
    pub note: String,
    /// 실패 시 에러
    pub error: Option<ResponseError>,
    /// 부가 정보
    pub detail: Option<RecordDetail>,
}

impl EventRecord {
    /// 알림의 trace에 연결된 레코드를 생성합니다.
    pub fn new(alert: &AlertEvent, action: Action, note: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::new(MODULE_RESPONDER, alert.metadata.trace_id.clone()),
            alert: alert.clone(),
            action,
            note: note.into(),
            error: None,
            detail: None,
        }
    }

    /// 에러를 포함한 레코드를 생성합니다.
    pub fn failure(
        alert: &AlertEvent,
        action: Action,
        error: ResponseError,
        note: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(error),
            ..Self::new(alert, action, note)
        }
    }

    /// 부가 정보를 설정합니다.
    pub fn with_detail(mut self, detail: RecordDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// 레코드가 에러를 포함하는지 확인합니다.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// 레코드에 담긴 세션 ID 목록 (없으면 빈 slice)
    pub fn session_ids(&self) -> &[String] {
        match &self.detail {
            Some(RecordDetail::Sessions { session_ids }) => session_ids,
            _ => &[],
        }
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EventRecord[{}] action={} username={} ip={}",
            &self.id[..8.min(self.id.len())],
            self.action,
            self.alert.username,
            self.alert.user_ip,
        )?;
        if let Some(err) = &self.error {
            write!(f, " error={err}")?;
        }
        Ok(())
    }
}

/// SystemTime을 사람이 읽을 수 있는 형태로 변환합니다.
fn unix_timestamp_str(time: SystemTime) -> String {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => {
            let secs = duration.as_secs();
            format!("{secs}")
        }
        Err(_) => "unknown".to_owned(),
    }
}
