//! 설정 관리: lockout.toml 파싱 및 런타임 설정
//!
//! [`LockoutConfig`]는 엔진과 데몬의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LOCKOUT_EZPROXY_SEARCH_RETRIES=3` 형식)
//! 3. 설정 파일 (`lockout.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), lockout_core::error::LockoutError> {
//! use lockout_core::config::LockoutConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = LockoutConfig::load("lockout.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LockoutConfig::parse("[ezproxy]\nterminate_sessions = true")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LockoutError};

/// 차단 목록 항목의 멤버십 키 (항목 템플릿은 이 문자열로 시작해야 함)
pub const ENTRY_KEY_PREFIX: &str = "{username}{suffix}";

/// 차단 목록 항목 템플릿을 검사하고, 거부 사유를 반환합니다.
///
/// 멤버십 조회는 `사용자명 + 접미사`를 줄 첫 토큰으로 비교합니다.
/// 따라서 템플릿은 한 줄이어야 하고 [`ENTRY_KEY_PREFIX`] 바로 뒤는 끝이거나 공백이어야 합니다.
pub fn check_entry_template(template: &str) -> Result<(), String> {
    if template.contains(['\n', '\r']) {
        return Err("must be a single line".to_owned());
    }
    match template.strip_prefix(ENTRY_KEY_PREFIX) {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => Ok(()),
        Some(_) => Err(format!(
            "{ENTRY_KEY_PREFIX} must be followed by whitespace or end the entry"
        )),
        None => Err(format!("must start with {ENTRY_KEY_PREFIX}")),
    }
}

/// 허용되는 최대 파일 권한 비트
const MAX_FILE_PERMISSIONS: u32 = 0o777;

/// Lockout 통합 설정
///
/// `lockout.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockoutConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 알림 수신 서버 설정
    #[serde(default)]
    pub server: ServerConfig,
    /// 차단 목록 설정
    #[serde(default)]
    pub disabled_users: DisabledUsersConfig,
    /// 보고 이벤트 로그 설정
    #[serde(default)]
    pub reported_users: ReportedUsersConfig,
    /// 무시 목록 설정
    #[serde(default)]
    pub ignored: IgnoredConfig,
    /// EZproxy 세션 설정
    #[serde(default)]
    pub ezproxy: EzproxyConfig,
    /// 알림 전달 설정
    #[serde(default)]
    pub notify: NotifyConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl LockoutConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LockoutError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LockoutError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LockoutError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LockoutError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LockoutError> {
        toml::from_str(toml_str).map_err(|e| {
            LockoutError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOCKOUT_{SECTION}_{FIELD}`
    /// 예: `LOCKOUT_IGNORED_IGNORE_LOOKUP_ERRORS=true`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOCKOUT_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOCKOUT_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "LOCKOUT_GENERAL_PID_FILE");

        // Server
        override_string(&mut self.server.listen_addr, "LOCKOUT_SERVER_LISTEN_ADDR");
        override_u16(&mut self.server.port, "LOCKOUT_SERVER_PORT");
        override_usize(
            &mut self.server.alert_channel_capacity,
            "LOCKOUT_SERVER_ALERT_CHANNEL_CAPACITY",
        );

        // Disabled users
        override_string(
            &mut self.disabled_users.file_path,
            "LOCKOUT_DISABLED_USERS_FILE_PATH",
        );
        override_string(
            &mut self.disabled_users.entry_suffix,
            "LOCKOUT_DISABLED_USERS_ENTRY_SUFFIX",
        );
        override_permissions(
            &mut self.disabled_users.file_permissions,
            "LOCKOUT_DISABLED_USERS_FILE_PERMISSIONS",
        );
        override_string(
            &mut self.disabled_users.entry_template,
            "LOCKOUT_DISABLED_USERS_ENTRY_TEMPLATE",
        );
        override_string(
            &mut self.disabled_users.comment_marker,
            "LOCKOUT_DISABLED_USERS_COMMENT_MARKER",
        );

        // Reported users
        override_string(
            &mut self.reported_users.log_file_path,
            "LOCKOUT_REPORTED_USERS_LOG_FILE_PATH",
        );
        override_permissions(
            &mut self.reported_users.file_permissions,
            "LOCKOUT_REPORTED_USERS_FILE_PERMISSIONS",
        );

        // Ignored
        override_string(&mut self.ignored.users_file, "LOCKOUT_IGNORED_USERS_FILE");
        override_string(
            &mut self.ignored.ip_addresses_file,
            "LOCKOUT_IGNORED_IP_ADDRESSES_FILE",
        );
        override_string(
            &mut self.ignored.comment_marker,
            "LOCKOUT_IGNORED_COMMENT_MARKER",
        );
        override_bool(
            &mut self.ignored.ignore_lookup_errors,
            "LOCKOUT_IGNORED_IGNORE_LOOKUP_ERRORS",
        );

        // EZproxy
        override_string(
            &mut self.ezproxy.executable_path,
            "LOCKOUT_EZPROXY_EXECUTABLE_PATH",
        );
        override_string(
            &mut self.ezproxy.active_file_path,
            "LOCKOUT_EZPROXY_ACTIVE_FILE_PATH",
        );
        override_u32(
            &mut self.ezproxy.search_retries,
            "LOCKOUT_EZPROXY_SEARCH_RETRIES",
        );
        override_u64(
            &mut self.ezproxy.search_delay_secs,
            "LOCKOUT_EZPROXY_SEARCH_DELAY_SECS",
        );
        override_bool(
            &mut self.ezproxy.terminate_sessions,
            "LOCKOUT_EZPROXY_TERMINATE_SESSIONS",
        );

        // Notify
        override_usize(
            &mut self.notify.queue_capacity,
            "LOCKOUT_NOTIFY_QUEUE_CAPACITY",
        );
        override_string(&mut self.notify.webhook_url, "LOCKOUT_NOTIFY_WEBHOOK_URL");
        override_u32(
            &mut self.notify.webhook_retries,
            "LOCKOUT_NOTIFY_WEBHOOK_RETRIES",
        );
        override_u64(
            &mut self.notify.webhook_delay_secs,
            "LOCKOUT_NOTIFY_WEBHOOK_DELAY_SECS",
        );
        override_u64(
            &mut self.notify.webhook_timeout_secs,
            "LOCKOUT_NOTIFY_WEBHOOK_TIMEOUT_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "LOCKOUT_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "LOCKOUT_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "LOCKOUT_METRICS_PORT");
        override_string(&mut self.metrics.endpoint, "LOCKOUT_METRICS_ENDPOINT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LockoutError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.server.alert_channel_capacity == 0 {
            return Err(invalid(
                "server.alert_channel_capacity",
                "must be greater than 0",
            ));
        }

        if self.disabled_users.file_path.is_empty() {
            return Err(invalid("disabled_users.file_path", "must not be empty"));
        }

        if let Err(reason) = check_entry_template(&self.disabled_users.entry_template) {
            return Err(invalid("disabled_users.entry_template", reason));
        }

        if self.disabled_users.entry_suffix.contains(char::is_whitespace) {
            return Err(invalid(
                "disabled_users.entry_suffix",
                "must not contain whitespace",
            ));
        }

        if self.disabled_users.comment_marker.trim().is_empty() {
            return Err(invalid("disabled_users.comment_marker", "must not be empty"));
        }

        if self.ignored.comment_marker.trim().is_empty() {
            return Err(invalid("ignored.comment_marker", "must not be empty"));
        }

        check_permissions(
            "disabled_users.file_permissions",
            self.disabled_users.file_permissions,
        )?;
        check_permissions(
            "reported_users.file_permissions",
            self.reported_users.file_permissions,
        )?;

        if self.ezproxy.terminate_sessions && self.ezproxy.executable_path.is_empty() {
            return Err(invalid(
                "ezproxy.executable_path",
                "must not be empty when terminate_sessions is enabled",
            ));
        }

        if self.ezproxy.active_file_path.is_empty() {
            return Err(invalid("ezproxy.active_file_path", "must not be empty"));
        }

        if self.notify.queue_capacity == 0 {
            return Err(invalid("notify.queue_capacity", "must be greater than 0"));
        }

        if self.metrics.enabled && !self.metrics.endpoint.starts_with('/') {
            return Err(invalid("metrics.endpoint", "must start with '/'"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> LockoutError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

fn check_permissions(field: &str, mode: u32) -> Result<(), LockoutError> {
    if mode > MAX_FILE_PERMISSIONS {
        return Err(invalid(
            field,
            format!("{mode:#o} exceeds {MAX_FILE_PERMISSIONS:#o}"),
        ));
    }
    Ok(())
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 생성하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: "/var/run/lockout.pid".to_owned(),
        }
    }
}

/// 알림 수신 서버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인드 주소
    pub listen_addr: String,
    /// 바인드 포트
    pub port: u16,
    /// 수신 알림 채널 용량
    pub alert_channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1".to_owned(),
            port: 8000,
            alert_channel_capacity: 256,
        }
    }
}

/// 차단 목록 설정
///
/// EZproxy는 이 파일을 user 파일에 include하여 접근을 거부합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisabledUsersConfig {
    /// 차단 목록 파일 경로
    pub file_path: String,
    /// 사용자명 뒤에 붙는 접미사
    pub entry_suffix: String,
    /// 파일 생성 권한 (예: 0o644)
    pub file_permissions: u32,
    /// 항목 렌더링 템플릿
    ///
    /// 지원 placeholder: `{username}`, `{suffix}`, `{user_ip}`, `{alert_id}`
    pub entry_template: String,
    /// 주석 줄 접두사
    pub comment_marker: String,
}

impl Default for DisabledUsersConfig {
    fn default() -> Self {
        Self {
            file_path: "/var/cache/lockout/users.brick-disabled.txt".to_owned(),
            entry_suffix: "::deny".to_owned(),
            file_permissions: 0o644,
            entry_template: "{username}{suffix}".to_owned(),
            comment_marker: "#".to_owned(),
        }
    }
}

/// 보고 이벤트 로그 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportedUsersConfig {
    /// 로그 파일 경로
    pub log_file_path: String,
    /// 파일 생성 권한
    pub file_permissions: u32,
}

impl Default for ReportedUsersConfig {
    fn default() -> Self {
        Self {
            log_file_path: "/var/log/lockout/users.brick-reported.log".to_owned(),
            file_permissions: 0o644,
        }
    }
}

/// 무시 목록 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoredConfig {
    /// 무시할 사용자명 목록 파일
    pub users_file: String,
    /// 무시할 IP 목록 파일
    pub ip_addresses_file: String,
    /// 주석 줄 접두사
    pub comment_marker: String,
    /// 조회 실패를 무시하고 진행할지 여부 (기본: 실패 시 차단 중단)
    pub ignore_lookup_errors: bool,
}

impl Default for IgnoredConfig {
    fn default() -> Self {
        Self {
            users_file: "/etc/lockout/users.brick-ignored.txt".to_owned(),
            ip_addresses_file: "/etc/lockout/ips.brick-ignored.txt".to_owned(),
            comment_marker: "#".to_owned(),
            ignore_lookup_errors: false,
        }
    }
}

/// EZproxy 세션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EzproxyConfig {
    /// EZproxy 실행 파일 경로
    pub executable_path: String,
    /// 활성 세션 상태 파일 경로
    pub active_file_path: String,
    /// 세션 조회 재시도 횟수
    pub search_retries: u32,
    /// 재시도 간격 (초)
    pub search_delay_secs: u64,
    /// 세션 종료 활성화
    pub terminate_sessions: bool,
}

impl Default for EzproxyConfig {
    fn default() -> Self {
        Self {
            executable_path: "/usr/local/ezproxy/ezproxy".to_owned(),
            active_file_path: "/usr/local/ezproxy/ezproxy.hst".to_owned(),
            search_retries: 7,
            search_delay_secs: 1,
            terminate_sessions: false,
        }
    }
}

/// 알림 전달 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
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

impl NotifyConfig {
    /// Webhook 전달이 설정되었는지 확인합니다.
    pub fn webhook_enabled(&self) -> bool {
        !self.webhook_url.is_empty()
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            webhook_url: String::new(),
            webhook_retries: 2,
            webhook_delay_secs: 5,
            webhook_timeout_secs: 10,
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus exporter 활성화
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 바인드 포트
    pub port: u16,
    /// 엔드포인트 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

/// 8진수 권한 문자열 (`0644`, `0o644`, `644`)을 파싱합니다.
fn override_permissions(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match parse_octal_mode(&val) {
            Some(parsed) => *target = parsed,
            None => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse octal permissions from env var, ignoring"
            ),
        }
    }
}

fn parse_octal_mode(val: &str) -> Option<u32> {
    let trimmed = val.trim();
    let digits = trimmed.strip_prefix("0o").unwrap_or(trimmed);
    u32::from_str_radix(digits, 8).ok()
}
