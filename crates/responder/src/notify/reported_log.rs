//! 보고 이벤트 로그
//!
//! 레코드마다 한 줄을 append합니다. fail2ban 필터가 이 줄을 매칭합니다.
//!
//! ```text
//! 2026-10-16T09:12:44+09:00 [DISABLED] username="alice" ip="10.0.0.5" note="..."
//! 2026-10-16T09:12:45+09:00 [FAILURE] username="alice" ip="10.0.0.5" note="..." error="..."
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat};

use lockout_core::EventRecord;

use crate::config::ResponderConfig;
use crate::error::ResponderError;
use crate::lines::append_line;
use crate::notify::Notifier;

/// 보고 이벤트 로그 notifier
#[derive(Debug, Clone)]
pub struct ReportedEventsLog {
    path: PathBuf,
    permissions: u32,
}

impl ReportedEventsLog {
    /// 새 로그를 생성합니다. 파일은 첫 기록 시 생성됩니다.
    pub fn new(path: impl Into<PathBuf>, permissions: u32) -> Self {
        Self {
            path: path.into(),
            permissions,
        }
    }

    /// 엔진 설정에서 로그를 생성합니다.
    pub fn from_config(config: &ResponderConfig) -> Self {
        Self::new(&config.reported_log_file, config.reported_log_permissions)
    }

    /// 로그 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// 레코드를 로그 한 줄로 포맷합니다.
pub fn format_line(record: &EventRecord) -> String {
    let timestamp: DateTime<Local> = record.metadata.timestamp.into();
    let mut line = format!(
        "{} [{}] username=\"{}\" ip=\"{}\" note=\"{}\"",
        timestamp.to_rfc3339_opts(SecondsFormat::Secs, false),
        record.action.log_tag(),
        escape(&record.alert.username),
        escape(&record.alert.user_ip),
        escape(&record.note),
    );
    if let Some(err) = &record.error {
        line.push_str(&format!(" error=\"{}\"", escape(&err.to_string())));
    }
    line
}

/// 따옴표와 개행을 이스케이프하여 한 줄 한 레코드를 유지합니다.
fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

impl Notifier for ReportedEventsLog {
    fn name(&self) -> &str {
        "reported_log"
    }

    async fn notify(&self, record: &EventRecord) -> Result<(), ResponderError> {
        append_line(&self.path, &format_line(record), self.permissions)
            .await
            .map_err(|source| ResponderError::Io {
                path: self.path.display().to_string(),
                source,
            })
    }
}
