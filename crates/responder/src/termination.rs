//! 세션 종료 오케스트레이터
//!
//! [`TerminationOrchestrator`]는 설정된 재시도/대기 정책으로 [`SessionDirectory`]를
//! 호출하고, 세션별 종료 결과를 하나의 [`TerminationOutcome`]으로 집계합니다.

use std::path::{Path, PathBuf};
use std::time::Duration;

use metrics::counter;
use tracing::info;

use lockout_core::metrics as m;
use lockout_core::{ResponseError, TerminationSummary, UserSession};

use crate::config::ResponderConfig;
use crate::session::SessionDirectory;

/// 세션 종료 집계 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationOutcome {
    /// 대상 사용자명
    pub username: String,
    /// 세션별 결과
    pub summary: TerminationSummary,
}

impl TerminationOutcome {
    /// 일부 또는 전체 세션 종료가 실패했으면 집계 에러를 반환합니다.
    pub fn error(&self) -> Option<ResponseError> {
        if self.summary.all_succeeded() {
            return None;
        }

        let reason = self
            .summary
            .results
            .iter()
            .filter(|r| !r.success)
            .map(|r| {
                format!(
                    "{}: {}",
                    r.session_id,
                    r.error.as_deref().unwrap_or("unknown error")
                )
            })
            .collect::<Vec<_>>()
            .join("; ");

        Some(ResponseError::Termination {
            username: self.username.clone(),
            failed: self.summary.failure_count(),
            total: self.summary.results.len(),
            reason,
        })
    }
}

/// 세션 종료 오케스트레이터
pub struct TerminationOrchestrator<D> {
    directory: D,
    active_file: PathBuf,
    executable: PathBuf,
    search_delay: Duration,
    search_retries: u32,
}

impl<D: SessionDirectory> TerminationOrchestrator<D> {
    /// 새 오케스트레이터를 생성합니다.
    pub fn new(
        directory: D,
        active_file: impl Into<PathBuf>,
        executable: impl Into<PathBuf>,
        search_delay: Duration,
        search_retries: u32,
    ) -> Self {
        Self {
            directory,
            active_file: active_file.into(),
            executable: executable.into(),
            search_delay,
            search_retries,
        }
    }

    /// 엔진 설정에서 오케스트레이터를 생성합니다.
    pub fn from_config(directory: D, config: &ResponderConfig) -> Self {
        Self::new(
            directory,
            &config.active_file_path,
            &config.ezproxy_executable,
            config.search_delay(),
            config.search_retries,
        )
    }

    /// 활성 상태 파일 경로
    pub fn active_file(&self) -> &Path {
        &self.active_file
    }

    /// 세션 디렉토리
    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// 사용자의 활성 세션을 조회합니다.
    ///
    /// 알림은 최소 하나의 활성 세션을 전제로 하므로, 재시도 후에도
    /// 세션이 없으면 [`ResponseError::NoActiveSessions`]를 반환합니다.
    pub async fn lookup_sessions(&self, username: &str) -> Result<Vec<UserSession>, ResponseError> {
        let sessions = self
            .directory
            .resolve_sessions(
                username,
                &self.active_file,
                self.search_delay,
                self.search_retries,
            )
            .await?;

        if sessions.is_empty() {
            return Err(ResponseError::NoActiveSessions {
                username: username.to_owned(),
                path: self.active_file.display().to_string(),
                attempts: self.search_retries,
            });
        }

        info!(username, count = sessions.len(), "active sessions found");
        Ok(sessions)
    }

    /// 세션들을 종료하고 결과를 집계합니다.
    pub async fn terminate(&self, username: &str, sessions: &[UserSession]) -> TerminationOutcome {
        let results = self
            .directory
            .terminate_sessions(sessions, &self.executable)
            .await;
        let summary = TerminationSummary::new(results);

        counter!(m::RESPONDER_SESSIONS_TERMINATED_TOTAL, m::LABEL_RESULT => "success")
            .increment(summary.success_count() as u64);
        counter!(m::RESPONDER_SESSIONS_TERMINATED_TOTAL, m::LABEL_RESULT => "failure")
            .increment(summary.failure_count() as u64);

        info!(username, %summary, "session termination finished");
        TerminationOutcome {
            username: username.to_owned(),
            summary,
        }
    }
}
