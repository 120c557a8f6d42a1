//! 차단 계정 목록
//!
//! [`DisabledAccountRegistry`]는 EZproxy가 include하는 append-only 차단 목록 파일을
//! 관리합니다. 레지스트리 하나가 살아 있는 동안 하나의 `RwLock`을 모든 호출자가
//! 공유하므로, 멤버십 조회는 서로 동시에 실행되지만 기록과는 겹치지 않습니다.
//!
//! 같은 사용자명이 두 번 기록되지 않도록 `disable()`은 쓰기 잠금을 잡은 상태에서
//! 멤버십을 다시 확인한 뒤 기록합니다. 조회 오류 허용이 켜져 있으면 이 재확인의
//! 읽기 오류는 "항목 없음"으로 취급하고 기록을 계속합니다.

use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use lockout_core::{AlertEvent, ResponseError};

use crate::config::ResponderConfig;
use crate::lines::{append_line, file_contains_entry};

/// `disable()` 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableResult {
    /// 새 항목을 기록함
    Appended,
    /// 잠금 대기 중 다른 호출자가 먼저 기록함
    AlreadyPresent,
}

/// 차단 계정 목록
#[derive(Debug)]
pub struct DisabledAccountRegistry {
    path: PathBuf,
    entry_suffix: String,
    entry_template: String,
    comment_marker: String,
    permissions: u32,
    tolerate_lookup_errors: bool,
    lock: RwLock<()>,
}

impl DisabledAccountRegistry {
    /// 새 레지스트리를 생성합니다. 파일은 첫 기록 시 생성됩니다.
    pub fn new(
        path: impl Into<PathBuf>,
        entry_suffix: impl Into<String>,
        entry_template: impl Into<String>,
        comment_marker: impl Into<String>,
        permissions: u32,
    ) -> Self {
        Self {
            path: path.into(),
            entry_suffix: entry_suffix.into(),
            entry_template: entry_template.into(),
            comment_marker: comment_marker.into(),
            permissions,
            tolerate_lookup_errors: false,
            lock: RwLock::new(()),
        }
    }

    /// `disable()`의 재확인 읽기 오류를 허용할지 설정합니다.
    pub fn tolerate_lookup_errors(mut self, tolerate: bool) -> Self {
        self.tolerate_lookup_errors = tolerate;
        self
    }

    /// 엔진 설정에서 레지스트리를 생성합니다.
    pub fn from_config(config: &ResponderConfig) -> Self {
        Self::new(
            &config.disabled_users_file,
            &config.entry_suffix,
            &config.entry_template,
            &config.disabled_comment_marker,
            config.disabled_users_permissions,
        )
        .tolerate_lookup_errors(config.ignore_lookup_errors)
    }

    /// 목록 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 사용자명의 멤버십 키 (`username` + 접미사)
    pub fn entry_key(&self, username: &str) -> String {
        format!("{}{}", username.trim(), self.entry_suffix)
    }

    /// 알림에 대한 목록 항목을 렌더링합니다.
    pub fn render_entry(&self, alert: &AlertEvent) -> String {
        self.entry_template
            .replace("{username}", alert.username.trim())
            .replace("{suffix}", &self.entry_suffix)
            .replace("{user_ip}", alert.user_ip.trim())
            .replace("{alert_id}", &alert.id)
    }

    /// 사용자명이 이미 차단되었는지 확인합니다.
    ///
    /// 목록 파일이 아직 없으면 차단된 사용자가 없는 것으로 봅니다.
    pub async fn is_disabled(&self, username: &str) -> Result<bool, ResponseError> {
        let _guard = self.lock.read().await;
        self.contains(username).await
    }

    /// 사용자명을 목록에 추가합니다.
    ///
    /// 쓰기 잠금 안에서 멤버십을 다시 확인하므로, 같은 사용자명에 대한
    /// 동시 호출 중 하나만 `Appended`를 받습니다.
    pub async fn disable(&self, alert: &AlertEvent) -> Result<DisableResult, ResponseError> {
        let _guard = self.lock.write().await;

        match self.contains(&alert.username).await {
            Ok(true) => {
                debug!(username = %alert.username, "entry appeared while waiting for registry lock");
                return Ok(DisableResult::AlreadyPresent);
            }
            Ok(false) => {}
            Err(e) if self.tolerate_lookup_errors => {
                warn!(
                    username = %alert.username,
                    error = %e,
                    "registry re-check failed, appending anyway"
                );
            }
            Err(e) => return Err(e),
        }

        let entry = self.render_entry(alert);
        append_line(&self.path, &entry, self.permissions)
            .await
            .map_err(|e| ResponseError::DisableMutation {
                username: alert.username.clone(),
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;

        info!(
            username = %alert.username,
            path = %self.path.display(),
            "appended entry to disabled users file"
        );
        Ok(DisableResult::Appended)
    }

    async fn contains(&self, username: &str) -> Result<bool, ResponseError> {
        let key = self.entry_key(username);
        let result = file_contains_entry(&self.path, &self.comment_marker, |entry| {
            entry_matches_key(entry, &key)
        })
        .await;

        match result {
            Ok(found) => Ok(found),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ResponseError::DisableLookup {
                username: username.to_owned(),
                path: self.path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// 항목이 키와 같거나, 키 뒤에 공백으로 구분된 부가 정보가 붙은 형태인지 확인합니다.
fn entry_matches_key(entry: &str, key: &str) -> bool {
    match entry.strip_prefix(key) {
        Some("") => true,
        Some(rest) => rest.starts_with(char::is_whitespace),
        None => false,
    }
}
