//! 알림 처리 상태 기계
//!
//! 알림 하나의 처리 흐름을 [`PipelineState`]와 순수 전이 함수 [`PipelineState::next`]로
//! 표현합니다. I/O는 [`DisableEventPipeline`](crate::pipeline::DisableEventPipeline)이
//! 수행하고, 그 결과를 [`StageEvent`]로 넘겨 다음 상태를 결정합니다.
//!
//! ```text
//! Received
//!   -> Done(Ignored) | Done(IgnoreLookupFailed) | DisableCheck
//! DisableCheck
//!   -> Done(DisableLookupFailed) | TerminationDecision (이미 차단됨) | Disabling
//! Disabling
//!   -> Done(DisableMutationFailed) | TerminationDecision
//! TerminationDecision
//!   -> Done(Skipped) | Done(LookupFailed) | Terminating
//! Terminating
//!   -> Done(Terminated)
//! ```

use std::fmt;

use serde::Serialize;

use crate::config::ResponderConfig;
use crate::error::ResponderError;

/// 처리 종료 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// 무시 목록에 의해 종료
    Ignored,
    /// 무시 목록 조회 실패로 종료
    IgnoreLookupFailed,
    /// 차단 목록 조회 실패로 종료
    DisableLookupFailed,
    /// 차단 목록 기록 실패로 종료
    DisableMutationFailed,
    /// 설정에 의해 세션 종료를 건너뜀
    Skipped,
    /// 세션 조회 실패로 종료
    LookupFailed,
    /// 세션 종료 시도 완료
    Terminated,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ignored => "ignored",
            Self::IgnoreLookupFailed => "ignore_lookup_failed",
            Self::DisableLookupFailed => "disable_lookup_failed",
            Self::DisableMutationFailed => "disable_mutation_failed",
            Self::Skipped => "skipped",
            Self::LookupFailed => "lookup_failed",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// 처리 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// 알림 수신 직후
    Received,
    /// 무시 목록 통과, 차단 여부 확인 전
    DisableCheck,
    /// 차단 목록에 없음, 기록 전
    Disabling,
    /// 차단 완료(또는 이미 차단됨), 세션 처리 결정 전
    TerminationDecision,
    /// 세션 조회 완료, 종료 전
    Terminating,
    /// 종료 상태
    Done(Outcome),
}

impl PipelineState {
    /// 종료 상태인지 확인합니다.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// 다음 상태를 계산합니다.
    ///
    /// 현재 상태에서 받을 수 없는 이벤트면 [`ResponderError::InvalidTransition`]을 반환합니다.
    pub fn next(self, event: StageEvent, policy: &TransitionPolicy) -> Result<Self, ResponderError> {
        use PipelineState as S;
        use StageEvent as E;

        let next = match (self, event) {
            (S::Received, E::IgnoreChecked(status)) => match status {
                IgnoreStatus::Clear => S::DisableCheck,
                IgnoreStatus::Ignored => S::Done(Outcome::Ignored),
                IgnoreStatus::LookupFailed if policy.ignore_lookup_errors => S::DisableCheck,
                IgnoreStatus::LookupFailed => S::Done(Outcome::IgnoreLookupFailed),
            },

            (S::DisableCheck, E::DisableChecked(status)) => match status {
                DisableStatus::NotDisabled => S::Disabling,
                DisableStatus::AlreadyDisabled => S::TerminationDecision,
                DisableStatus::LookupFailed if policy.ignore_lookup_errors => S::Disabling,
                DisableStatus::LookupFailed => S::Done(Outcome::DisableLookupFailed),
            },

            (S::Disabling, E::DisableApplied(status)) => match status {
                MutationStatus::Appended | MutationStatus::AlreadyPresent => S::TerminationDecision,
                MutationStatus::Failed => S::Done(Outcome::DisableMutationFailed),
            },

            (S::TerminationDecision, E::SessionsResolved(status)) => {
                match (policy.terminate_sessions, status) {
                    (false, _) => S::Done(Outcome::Skipped),
                    (true, LookupStatus::Found) => S::Terminating,
                    (true, LookupStatus::Failed) => S::Done(Outcome::LookupFailed),
                }
            }

            (S::Terminating, E::SessionsTerminated) => S::Done(Outcome::Terminated),

            (state, event) => {
                return Err(ResponderError::InvalidTransition {
                    state: format!("{state:?}"),
                    event: format!("{event:?}"),
                });
            }
        };

        Ok(next)
    }
}

/// 상태 전이 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionPolicy {
    /// 조회 실패를 무시하고 진행
    pub ignore_lookup_errors: bool,
    /// 세션 종료 활성화
    pub terminate_sessions: bool,
}

impl From<&ResponderConfig> for TransitionPolicy {
    fn from(config: &ResponderConfig) -> Self {
        Self {
            ignore_lookup_errors: config.ignore_lookup_errors,
            terminate_sessions: config.terminate_sessions,
        }
    }
}

/// 단계 실행 결과: 상태 전이 입력
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    /// 무시 목록 검사 완료
    IgnoreChecked(IgnoreStatus),
    /// 차단 여부 확인 완료
    DisableChecked(DisableStatus),
    /// 차단 목록 기록 완료
    DisableApplied(MutationStatus),
    /// 세션 조회 완료
    SessionsResolved(LookupStatus),
    /// 세션 종료 완료
    SessionsTerminated,
}

/// 무시 목록 검사 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreStatus {
    Clear,
    Ignored,
    LookupFailed,
}

/// 차단 여부 확인 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableStatus {
    NotDisabled,
    AlreadyDisabled,
    LookupFailed,
}

/// 차단 목록 기록 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    Appended,
    AlreadyPresent,
    Failed,
}

/// 세션 조회 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStatus {
    Found,
    Failed,
}
