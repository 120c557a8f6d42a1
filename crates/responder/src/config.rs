//! 대응 엔진 설정
//!
//! [`ResponderConfig`]는 core의 [`LockoutConfig`](lockout_core::LockoutConfig)에서
//! 엔진이 사용하는 섹션(`disabled_users`, `reported_users`, `ignored`, `ezproxy`, `notify`)만
//! 모아 평탄화한 설정입니다.
//!
//! # 사용 예시
//! ```ignore
//! use lockout_core::LockoutConfig;
//! use lockout_responder::config::ResponderConfig;
//!
//! let core_config = LockoutConfig::default();
//! let config = ResponderConfig::from_core(&core_config);
//! config.validate()?;
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use lockout_core::LockoutConfig;
use lockout_core::config::check_entry_template;

use crate::error::ResponderError;

/// 대응 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderConfig {
    // --- 무시 목록 ---
    /// 무시할 사용자명 목록 파일
    pub ignored_users_file: String,
    /// 무시할 IP 목록 파일
    pub ignored_ips_file: String,
    /// 무시 목록 주석 접두사
    pub ignored_comment_marker: String,
    /// 조회 실패를 무시하고 진행할지 여부
    pub ignore_lookup_errors: bool,

    // --- 차단 목록 ---
    /// 차단 목록 파일
    pub disabled_users_file: String,
    /// 사용자명 접미사
    pub entry_suffix: String,
    /// 항목 렌더링 템플릿
    pub entry_template: String,
    /// 차단 목록 주석 접두사
    pub disabled_comment_marker: String,
    /// 차단 목록 생성 권한
    pub disabled_users_permissions: u32,

    // --- 보고 로그 ---
    /// 보고 이벤트 로그 파일
    pub reported_log_file: String,
    /// 보고 이벤트 로그 생성 권한
    pub reported_log_permissions: u32,

    // --- 세션 ---
    /// EZproxy 실행 파일
    pub ezproxy_executable: String,
    /// EZproxy 활성 세션 상태 파일
    pub active_file_path: String,
    /// 세션 조회 재시도 횟수
    pub search_retries: u32,
    /// 세션 조회 간격 (초)
    pub search_delay_secs: u64,
    /// 세션 종료 활성화
    pub terminate_sessions: bool,

    // --- 전달 ---
    /// 수신 알림 채널 용량
    pub alert_channel_capacity: usize,
    /// 레코드 큐 용량
    pub queue_capacity: usize,
    /// Webhook URL (빈 문자열이면 비활성화)
    pub webhook_url: String,
    /// Webhook 재시도 횟수
    pub webhook_retries: u32,
    /// Webhook 재시도 간격 (초)
    pub webhook_delay_secs: u64,
    /// Webhook 요청 타임아웃 (초)
    pub webhook_timeout_secs: u64,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self::from_core(&LockoutConfig::default())
    }
}

/// 설정 상한값 상수
const MAX_SEARCH_RETRIES: u32 = 100;
const MAX_SEARCH_DELAY_SECS: u64 = 60;
const MAX_WEBHOOK_RETRIES: u32 = 20;
const MAX_WEBHOOK_DELAY_SECS: u64 = 300;
const MAX_WEBHOOK_TIMEOUT_SECS: u64 = 120;
const MAX_CHANNEL_CAPACITY: usize = 100_000;

impl ResponderConfig {
    /// core 통합 설정에서 엔진 설정을 생성합니다.
    pub fn from_core(core: &LockoutConfig) -> Self {
        Self {
            ignored_users_file: core.ignored.users_file.clone(),
            ignored_ips_file: core.ignored.ip_addresses_file.clone(),
            ignored_comment_marker: core.ignored.comment_marker.clone(),
            ignore_lookup_errors: core.ignored.ignore_lookup_errors,
            disabled_users_file: core.disabled_users.file_path.clone(),
            entry_suffix: core.disabled_users.entry_suffix.clone(),
            entry_template: core.disabled_users.entry_template.clone(),
            disabled_comment_marker: core.disabled_users.comment_marker.clone(),
            disabled_users_permissions: core.disabled_users.file_permissions,
            reported_log_file: core.reported_users.log_file_path.clone(),
            reported_log_permissions: core.reported_users.file_permissions,
            ezproxy_executable: core.ezproxy.executable_path.clone(),
            active_file_path: core.ezproxy.active_file_path.clone(),
            search_retries: core.ezproxy.search_retries,
            search_delay_secs: core.ezproxy.search_delay_secs,
            terminate_sessions: core.ezproxy.terminate_sessions,
            alert_channel_capacity: core.server.alert_channel_capacity,
            queue_capacity: core.notify.queue_capacity,
            webhook_url: core.notify.webhook_url.clone(),
            webhook_retries: core.notify.webhook_retries,
            webhook_delay_secs: core.notify.webhook_delay_secs,
            webhook_timeout_secs: core.notify.webhook_timeout_secs,
        }
    }

    /// 세션 조회 간격
    pub fn search_delay(&self) -> Duration {
        Duration::from_secs(self.search_delay_secs)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ResponderError> {
        if let Err(reason) = check_entry_template(&self.entry_template) {
            return Err(config_err("entry_template", reason));
        }

        if self.entry_suffix.contains(char::is_whitespace) {
            return Err(config_err("entry_suffix", "must not contain whitespace"));
        }

        if self.disabled_comment_marker.trim().is_empty()
            || self.ignored_comment_marker.trim().is_empty()
        {
            return Err(config_err("comment_marker", "must not be empty"));
        }

        if self.disabled_users_file.is_empty() {
            return Err(config_err("disabled_users_file", "must not be empty"));
        }

        if self.search_retries == 0 || self.search_retries > MAX_SEARCH_RETRIES {
            return Err(config_err(
                "search_retries",
                format!("must be 1-{MAX_SEARCH_RETRIES}"),
            ));
        }

        if self.search_delay_secs > MAX_SEARCH_DELAY_SECS {
            return Err(config_err(
                "search_delay_secs",
                format!("must be 0-{MAX_SEARCH_DELAY_SECS}"),
            ));
        }

        if self.terminate_sessions && self.ezproxy_executable.is_empty() {
            return Err(config_err(
                "ezproxy_executable",
                "must not be empty when terminate_sessions is enabled",
            ));
        }

        if self.queue_capacity == 0 || self.queue_capacity > MAX_CHANNEL_CAPACITY {
            return Err(config_err(
                "queue_capacity",
                format!("must be 1-{MAX_CHANNEL_CAPACITY}"),
            ));
        }

        if self.alert_channel_capacity == 0 || self.alert_channel_capacity > MAX_CHANNEL_CAPACITY {
            return Err(config_err(
                "alert_channel_capacity",
                format!("must be 1-{MAX_CHANNEL_CAPACITY}"),
            ));
        }

        if self.webhook_retries > MAX_WEBHOOK_RETRIES {
            return Err(config_err(
                "webhook_retries",
                format!("must be 0-{MAX_WEBHOOK_RETRIES}"),
            ));
        }

        if self.webhook_delay_secs > MAX_WEBHOOK_DELAY_SECS {
            return Err(config_err(
                "webhook_delay_secs",
                format!("must be 0-{MAX_WEBHOOK_DELAY_SECS}"),
            ));
        }

        if self.webhook_timeout_secs == 0 || self.webhook_timeout_secs > MAX_WEBHOOK_TIMEOUT_SECS {
            return Err(config_err(
                "webhook_timeout_secs",
                format!("must be 1-{MAX_WEBHOOK_TIMEOUT_SECS}"),
            ));
        }

        if !self.webhook_url.is_empty()
            && !(self.webhook_url.starts_with("http://") || self.webhook_url.starts_with("https://"))
        {
            return Err(config_err("webhook_url", "must be an http(s) URL"));
        }

        Ok(())
    }
}

fn config_err(field: &str, reason: impl Into<String>) -> ResponderError {
    ResponderError::Config {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

/// 대응 엔진 설정 빌더
///
/// 테스트와 임베딩 용도로 파일 경로를 개별 지정할 때 사용합니다.
#[derive(Default)]
pub struct ResponderConfigBuilder {
    config: ResponderConfig,
}

impl ResponderConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 무시 목록 파일을 설정합니다.
    pub fn ignored_files(mut self, users: impl Into<String>, ips: impl Into<String>) -> Self {
        self.config.ignored_users_file = users.into();
        self.config.ignored_ips_file = ips.into();
        self
    }

    /// 조회 실패 무시 여부를 설정합니다.
    pub fn ignore_lookup_errors(mut self, ignore: bool) -> Self {
        self.config.ignore_lookup_errors = ignore;
        self
    }

    /// 차단 목록 파일을 설정합니다.
    pub fn disabled_users_file(mut self, path: impl Into<String>) -> Self {
        self.config.disabled_users_file = path.into();
        self
    }

    /// 사용자명 접미사를 설정합니다.
    pub fn entry_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.entry_suffix = suffix.into();
        self
    }

    /// 항목 템플릿을 설정합니다.
    pub fn entry_template(mut self, template: impl Into<String>) -> Self {
        self.config.entry_template = template.into();
        self
    }

    /// 보고 이벤트 로그 파일을 설정합니다.
    pub fn reported_log_file(mut self, path: impl Into<String>) -> Self {
        self.config.reported_log_file = path.into();
        self
    }

    /// EZproxy 실행 파일과 상태 파일을 설정합니다.
    pub fn ezproxy(mut self, executable: impl Into<String>, active_file: impl Into<String>) -> Self {
        self.config.ezproxy_executable = executable.into();
        self.config.active_file_path = active_file.into();
        self
    }

    /// 세션 조회 재시도 정책을 설정합니다.
    pub fn session_search(mut self, retries: u32, delay_secs: u64) -> Self {
        self.config.search_retries = retries;
        self.config.search_delay_secs = delay_secs;
        self
    }

    /// 세션 종료 활성화 여부를 설정합니다.
    pub fn terminate_sessions(mut self, terminate: bool) -> Self {
        self.config.terminate_sessions = terminate;
        self
    }

    /// 레코드 큐 용량을 설정합니다.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Webhook URL을 설정합니다.
    pub fn webhook_url(mut self, url: impl Into<String>) -> Self {
        self.config.webhook_url = url.into();
        self
    }

    /// Webhook 재시도 정책을 설정합니다.
    pub fn webhook_retry(mut self, retries: u32, delay_secs: u64) -> Self {
        self.config.webhook_retries = retries;
        self.config.webhook_delay_secs = delay_secs;
        self
    }

    /// 설정을 검증하고 반환합니다.
    pub fn build(self) -> Result<ResponderConfig, ResponderError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
