//! 에러 타입: 설정과 대응 단계 에러

use serde::{Deserialize, Serialize};

/// Lockout 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LockoutError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 알림 대응(차단/세션 종료) 에러
    #[error("response error: {0}")]
    Response(#[from] ResponseError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,

    /// 알림 전달 실패
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// 허용되지 않은 상태 전이
    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// 알림 대응 단계별 에러
///
/// 파이프라인 내부에서 발생한 모든 에러는 이 타입으로 변환되어
/// [`EventRecord`](crate::event::EventRecord)에 담긴 채 전달됩니다.
/// 레코드가 불변이고 여러 notifier로 복제되므로 `Clone`과 serde 직렬화를 모두 구현합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseError {
    /// 무시 목록 조회 실패
    #[error("error while checking ignored status of {subject} {value:?} in {path:?}: {reason}")]
    IgnoreLookup {
        /// 조회 대상 종류 ("username" 또는 "IP address")
        subject: String,
        /// 조회한 값
        value: String,
        /// 무시 목록 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 차단 목록 조회 실패
    #[error("error while checking disabled status for user {username:?} in {path:?}: {reason}")]
    DisableLookup {
        /// 대상 사용자명
        username: String,
        /// 차단 목록 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 차단 목록 기록 실패
    #[error("error updating disabled user file {path:?} for user {username:?}: {reason}")]
    DisableMutation {
        /// 대상 사용자명
        username: String,
        /// 차단 목록 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 세션 조회 실패
    #[error("error retrieving sessions for user {username:?}: {reason}")]
    SessionLookup {
        /// 대상 사용자명
        username: String,
        /// 실패 사유
        reason: String,
    },

    /// 재시도 후에도 활성 세션이 없음
    #[error("no active session found for user {username:?} in {path:?} after {attempts} attempt(s)")]
    NoActiveSessions {
        /// 대상 사용자명
        username: String,
        /// 프록시 상태 파일 경로
        path: String,
        /// 조회 시도 횟수
        attempts: u32,
    },

    /// 세션 종료 일부/전체 실패
    #[error("failed to terminate {failed} of {total} session(s) for user {username:?}: {reason}")]
    Termination {
        /// 대상 사용자명
        username: String,
        /// 실패한 세션 수
        failed: usize,
        /// 전체 세션 수
        total: usize,
        /// 실패 상세
        reason: String,
    },
}

impl ResponseError {
    /// 세션 조회 단계 에러인지 확인합니다 (0개 세션 포함).
    pub fn is_session_lookup(&self) -> bool {
        matches!(self, Self::SessionLookup { .. } | Self::NoActiveSessions { .. })
    }
}
