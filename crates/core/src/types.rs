//! 도메인 타입: 세션 조회/종료 결과
//!
//! 세션 디렉토리가 생성하는 [`UserSession`]과 세션 종료 결과를 담는
//! [`SessionTermination`], [`TerminationSummary`]를 정의합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 프록시에서 활성 상태인 사용자 세션
///
/// 세션 디렉토리만 생성하며, 엔진은 읽기 전용으로 사용합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    /// 세션 ID
    pub session_id: String,
    /// 세션 소유 사용자명
    pub username: String,
    /// 프록시 고유 메타데이터 (상태 파일의 원본 필드 등)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<String>,
}

impl UserSession {
    /// 메타데이터 없이 세션을 생성합니다.
    pub fn new(session_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            username: username.into(),
            metadata: Vec::new(),
        }
    }
}

impl fmt::Display for UserSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (user={})", self.session_id, self.username)
    }
}

/// 단일 세션 종료 시도 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTermination {
    /// 대상 세션 ID
    pub session_id: String,
    /// 성공 여부
    pub success: bool,
    /// 종료 명령의 exit code (실행 자체가 실패하면 None)
    pub exit_code: Option<i32>,
    /// 종료 명령 표준 출력
    pub stdout: String,
    /// 종료 명령 표준 에러
    pub stderr: String,
    /// 실패 사유
    pub error: Option<String>,
}

impl SessionTermination {
    /// 성공 결과를 생성합니다.
    pub fn succeeded(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            success: true,
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            error: None,
        }
    }

    /// 실패 결과를 생성합니다.
    pub fn failed(session_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            error: Some(error.into()),
        }
    }
}

/// 사용자 세션 종료 집계
///
/// 세션별 결과를 하나의 레코드로 묶어 전달합니다.
/// 일부 세션만 실패해도 세션마다 레코드를 만들지 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationSummary {
    /// 세션별 종료 결과 (시도 순서)
    pub results: Vec<SessionTermination>,
}

impl TerminationSummary {
    /// 결과 목록으로 집계를 생성합니다.
    pub fn new(results: Vec<SessionTermination>) -> Self {
        Self { results }
    }

    /// 성공한 세션 수
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    /// 실패한 세션 수
    pub fn failure_count(&self) -> usize {
        self.results.len() - self.success_count()
    }

    /// 실패한 세션 ID 목록
    pub fn failed_session_ids(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.session_id.as_str())
            .collect()
    }

    /// 모든 세션이 종료되었는지 확인합니다.
    pub fn all_succeeded(&self) -> bool {
        self.failure_count() == 0
    }
}

impl fmt::Display for TerminationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} session(s) terminated, {} failure(s)",
            self.success_count(),
            self.failure_count()
        )
    }
}
