//! 세션 디렉토리: 프록시 활성 세션 조회 및 종료
//!
//! [`SessionDirectory`]는 사용자명을 현재 활성 세션 목록으로 변환하고,
//! 세션을 종료하는 외부 협력자의 계약입니다.
//! [`ActiveFileSessionDirectory`]는 EZproxy 활성 상태 파일과 `ezproxy -k` 명령으로
//! 이 계약을 구현합니다.
//!
//! # 상태 파일 형식
//!
//! ```text
//! S <session-id> <field> <field> ...
//! L <username> ...
//! ```
//!
//! `S` 줄이 세션을 열고, 바로 뒤따르는 `L` 줄이 그 세션의 로그인 사용자명입니다.
//! 다른 접두사의 줄은 무시합니다.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use lockout_core::{ResponseError, SessionTermination, UserSession};

/// 세션 디렉토리 계약
///
/// # 구현 시 주의사항
/// - `resolve_sessions()`는 `search_retries`번까지 조회하며, 각 시도 전에
///   `search_delay`만큼 대기합니다. 세션이 하나라도 발견되면 즉시 반환합니다.
/// - 재시도 후에도 세션이 없으면 빈 목록을 반환합니다.
///   0개를 에러로 볼지는 호출자가 결정합니다.
/// - `terminate_sessions()`는 입력 순서대로 세션별 결과를 하나씩 반환합니다.
pub trait SessionDirectory: Send + Sync {
    /// 사용자명의 활성 세션 목록을 조회합니다.
    fn resolve_sessions(
        &self,
        username: &str,
        active_file: &Path,
        search_delay: Duration,
        search_retries: u32,
    ) -> impl Future<Output = Result<Vec<UserSession>, ResponseError>> + Send;

    /// 세션들을 종료합니다.
    fn terminate_sessions(
        &self,
        sessions: &[UserSession],
        executable: &Path,
    ) -> impl Future<Output = Vec<SessionTermination>> + Send;
}

/// 상태 파일 텍스트에서 `username`의 세션을 추출합니다.
pub fn parse_active_sessions(text: &str, username: &str) -> Vec<UserSession> {
    let mut sessions = Vec::new();
    let mut pending: Option<(&str, Vec<String>)> = None;

    for line in text.lines() {
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("S") => {
                pending = fields
                    .next()
                    .map(|id| (id, fields.map(str::to_owned).collect()));
            }
            Some("L") => {
                let Some((id, metadata)) = pending.take() else {
                    continue;
                };
                if fields.next() == Some(username) {
                    sessions.push(UserSession {
                        session_id: id.to_owned(),
                        username: username.to_owned(),
                        metadata,
                    });
                }
            }
            _ => {}
        }
    }

    sessions
}

/// EZproxy 활성 상태 파일 기반 세션 디렉토리
#[derive(Debug, Clone, Default)]
pub struct ActiveFileSessionDirectory;

impl ActiveFileSessionDirectory {
    /// 새 디렉토리를 생성합니다.
    pub fn new() -> Self {
        Self
    }

    async fn terminate_one(session: &UserSession, executable: &Path) -> SessionTermination {
        let output = Command::new(executable)
            .arg("-k")
            .arg(&session.session_id)
            .output()
            .await;

        match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).trim().to_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
                let success = output.status.success();
                SessionTermination {
                    session_id: session.session_id.clone(),
                    success,
                    exit_code: output.status.code(),
                    error: (!success)
                        .then(|| format!("{} exited with {}", executable.display(), output.status)),
                    stdout,
                    stderr,
                }
            }
            Err(e) => SessionTermination::failed(
                session.session_id.clone(),
                format!("failed to run {}: {e}", executable.display()),
            ),
        }
    }
}

impl SessionDirectory for ActiveFileSessionDirectory {
    async fn resolve_sessions(
        &self,
        username: &str,
        active_file: &Path,
        search_delay: Duration,
        search_retries: u32,
    ) -> Result<Vec<UserSession>, ResponseError> {
        let attempts = search_retries.max(1);
        let mut last_error: Option<std::io::Error> = None;

        for attempt in 1..=attempts {
            tokio::time::sleep(search_delay).await;

            match tokio::fs::read_to_string(active_file).await {
                Ok(text) => {
                    last_error = None;
                    let sessions = parse_active_sessions(&text, username);
                    if !sessions.is_empty() {
                        debug!(
                            username,
                            attempt,
                            count = sessions.len(),
                            "active sessions found"
                        );
                        return Ok(sessions);
                    }
                    debug!(username, attempt, attempts, "no active session yet");
                }
                Err(e) => {
                    warn!(
                        username,
                        attempt,
                        path = %active_file.display(),
                        error = %e,
                        "failed to read active sessions file"
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(ResponseError::SessionLookup {
                username: username.to_owned(),
                reason: format!("{}: {e}", active_file.display()),
            }),
            None => Ok(Vec::new()),
        }
    }

    async fn terminate_sessions(
        &self,
        sessions: &[UserSession],
        executable: &Path,
    ) -> Vec<SessionTermination> {
        let mut results = Vec::with_capacity(sessions.len());
        for session in sessions {
            results.push(Self::terminate_one(session, executable).await);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTIVE_FILE: &str = "\
P 1 0
H 192.168.1.1 8080
S abc123 1 1586878845 1586878845 10.0.0.5 0
L alice 1586878845
S def456 1 1586878900 1586878900 10.0.0.6 0
L bob 1586878900
S ghi789 1 1586879000 1586879000 10.0.0.5 0
L alice 1586879000
S orphan 1 1586879100 1586879100 10.0.0.7 0
";

    #[test]
    fn parses_sessions_for_user_in_order() {
        let sessions = parse_active_sessions(ACTIVE_FILE, "alice");
        let ids: Vec<_> = sessions.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, ["abc123", "ghi789"]);
        assert_eq!(sessions[0].username, "alice");
        assert_eq!(sessions[0].metadata[3], "10.0.0.5");
    }

    #[test]
    fn session_without_login_line_is_ignored() {
        let sessions = parse_active_sessions(ACTIVE_FILE, "orphan");
        assert!(sessions.is_empty());
    }

    #[test]
    fn username_must_match_exactly() {
        assert!(parse_active_sessions(ACTIVE_FILE, "ali").is_empty());
        assert!(parse_active_sessions(ACTIVE_FILE, "Alice").is_empty());
    }

    #[test]
    fn login_line_pairs_with_preceding_session_only() {
        let text = "S one 1\nL carol\nL carol\n";
        let sessions = parse_active_sessions(text, "carol");
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_returns_empty_after_retries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ezproxy.hst");
        tokio::fs::write(&path, ACTIVE_FILE).await.unwrap();

        let sessions = ActiveFileSessionDirectory::new()
            .resolve_sessions("nobody", &path, Duration::from_secs(1), 3)
            .await
            .unwrap();
        assert!(sessions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_finds_sessions_written_late() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ezproxy.hst");
        tokio::fs::write(&path, "P 1 0\n").await.unwrap();

        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            tokio::fs::write(&writer_path, ACTIVE_FILE).await.unwrap();
        });

        let sessions = ActiveFileSessionDirectory::new()
            .resolve_sessions("alice", &path, Duration::from_secs(1), 7)
            .await
            .unwrap();
        writer.await.unwrap();
        assert_eq!(sessions.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_missing_file_is_lookup_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ActiveFileSessionDirectory::new()
            .resolve_sessions(
                "alice",
                &dir.path().join("absent.hst"),
                Duration::from_secs(1),
                2,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ResponseError::SessionLookup { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_reports_exit_status_per_session() {
        let sessions = vec![UserSession::new("abc123", "alice")];

        let ok = ActiveFileSessionDirectory::new()
            .terminate_sessions(&sessions, Path::new("/bin/true"))
            .await;
        assert_eq!(ok.len(), 1);
        assert!(ok[0].success);
        assert_eq!(ok[0].exit_code, Some(0));

        let failed = ActiveFileSessionDirectory::new()
            .terminate_sessions(&sessions, Path::new("/bin/false"))
            .await;
        assert!(!failed[0].success);
        assert!(failed[0].error.is_some());
    }

    #[tokio::test]
    async fn terminate_with_missing_executable_fails_session() {
        let sessions = vec![UserSession::new("abc123", "alice")];
        let results = ActiveFileSessionDirectory::new()
            .terminate_sessions(&sessions, Path::new("/nonexistent/ezproxy"))
            .await;
        assert!(!results[0].success);
        assert_eq!(results[0].exit_code, None);
    }
}
