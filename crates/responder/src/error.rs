//! 대응 엔진 에러 타입
//!
//! [`ResponderError`]는 엔진 자체의 실패(설정, 채널, 알림 전달, 상태 전이)를 표현합니다.
//! 알림 처리 중 발생한 차단/세션 관련 실패는 이 타입이 아니라
//! [`ResponseError`](lockout_core::ResponseError)로 레코드에 담겨 전달됩니다.

use lockout_core::error::{ConfigError, LockoutError, PipelineError};

/// 대응 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ResponderError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// 파일 I/O 에러
    #[error("io error: {path}: {source}")]
    Io {
        /// 대상 파일 경로
        path: String,
        /// 원인
        #[source]
        source: std::io::Error,
    },

    /// notifier 전달 실패
    #[error("notifier '{notifier}' failed: {reason}")]
    Notify {
        /// notifier 이름
        notifier: String,
        /// 실패 사유
        reason: String,
    },

    /// 허용되지 않은 상태 전이
    #[error("invalid transition from {state} on {event}")]
    InvalidTransition {
        /// 현재 상태
        state: String,
        /// 입력 이벤트
        event: String,
    },
}

impl From<ResponderError> for LockoutError {
    fn from(err: ResponderError) -> Self {
        match err {
            ResponderError::Config { field, reason } => {
                LockoutError::Config(ConfigError::InvalidValue { field, reason })
            }
            ResponderError::Channel(msg) => LockoutError::Pipeline(PipelineError::ChannelSend(msg)),
            ResponderError::Io { source, .. } => LockoutError::Io(source),
            err @ ResponderError::Notify { .. } => {
                LockoutError::Pipeline(PipelineError::Delivery(err.to_string()))
            }
            err @ ResponderError::InvalidTransition { .. } => {
                LockoutError::Pipeline(PipelineError::InvalidState(err.to_string()))
            }
        }
    }
}
