//! 무시 목록 검사
//!
//! [`IgnoreListChecker`]는 알림의 사용자명, 그다음 IP를 운영자가 관리하는
//! 무시 목록과 대조합니다. 조회 실패는 기본적으로 "무시됨"으로 취급하여
//! 차단을 막습니다 (fail-safe). 실패를 무시하고 진행할지는 파이프라인이
//! `ignore_lookup_errors` 설정으로 결정합니다.

use std::path::{Path, PathBuf};

use tracing::debug;

use lockout_core::{Action, AlertEvent, EventRecord, RecordDetail, ResponseError};

use crate::lines::file_contains_line;

/// 무시 목록 조회 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreVerdict {
    /// 어느 목록에도 없음
    NotIgnored,
    /// 사용자명이 무시 목록에 있음
    IgnoredUsername {
        /// 일치한 목록 파일
        list: PathBuf,
    },
    /// IP가 무시 목록에 있음
    IgnoredIpAddress {
        /// 일치한 목록 파일
        list: PathBuf,
    },
    /// 목록을 읽지 못함
    LookupFailed {
        /// 실패한 대상이 IP 목록인지 여부
        ip_list: bool,
        /// 조회 에러
        error: ResponseError,
    },
}

impl IgnoreVerdict {
    /// 차단을 건너뛰어야 하는지 확인합니다.
    ///
    /// 조회 실패도 `true`입니다.
    pub fn is_ignored(&self) -> bool {
        !matches!(self, Self::NotIgnored)
    }

    /// 조회 에러를 반환합니다.
    pub fn error(&self) -> Option<&ResponseError> {
        match self {
            Self::LookupFailed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// 판단 레코드를 생성합니다. `NotIgnored`이면 레코드가 없습니다.
    pub fn to_record(&self, alert: &AlertEvent) -> Option<EventRecord> {
        match self {
            Self::NotIgnored => None,
            Self::IgnoredUsername { list } => Some(
                EventRecord::new(
                    alert,
                    Action::IgnoredUsername,
                    format!(
                        "Ignoring disable request for username {:?} per entry in {}",
                        alert.username,
                        list.display()
                    ),
                )
                .with_detail(RecordDetail::IgnoreList {
                    path: list.display().to_string(),
                }),
            ),
            Self::IgnoredIpAddress { list } => Some(
                EventRecord::new(
                    alert,
                    Action::IgnoredIpAddress,
                    format!(
                        "Ignoring disable request for IP {:?} (username {:?}) per entry in {}",
                        alert.user_ip,
                        alert.username,
                        list.display()
                    ),
                )
                .with_detail(RecordDetail::IgnoreList {
                    path: list.display().to_string(),
                }),
            ),
            Self::LookupFailed { ip_list, error } => {
                let action = if *ip_list {
                    Action::IgnoredIpAddressLookupFailure
                } else {
                    Action::IgnoredUsernameLookupFailure
                };
                Some(EventRecord::failure(
                    alert,
                    action,
                    error.clone(),
                    "Ignore list lookup failed; disable request not processed",
                ))
            }
        }
    }
}

/// 무시 목록 검사기
#[derive(Debug, Clone)]
pub struct IgnoreListChecker {
    users_file: PathBuf,
    ips_file: PathBuf,
    comment_marker: String,
}

impl IgnoreListChecker {
    /// 새 검사기를 생성합니다.
    pub fn new(
        users_file: impl Into<PathBuf>,
        ips_file: impl Into<PathBuf>,
        comment_marker: impl Into<String>,
    ) -> Self {
        Self {
            users_file: users_file.into(),
            ips_file: ips_file.into(),
            comment_marker: comment_marker.into(),
        }
    }

    /// 사용자명 목록 경로
    pub fn users_file(&self) -> &Path {
        &self.users_file
    }

    /// IP 목록 경로
    pub fn ips_file(&self) -> &Path {
        &self.ips_file
    }

    /// 알림이 무시 대상인지 검사합니다.
    ///
    /// 사용자명을 먼저 확인하고, 일치하거나 실패하면 IP 목록은 읽지 않습니다.
    pub async fn check(&self, alert: &AlertEvent) -> IgnoreVerdict {
        match file_contains_line(&self.users_file, &alert.username, &self.comment_marker).await {
            Ok(true) => {
                debug!(username = %alert.username, "username found in ignore list");
                return IgnoreVerdict::IgnoredUsername {
                    list: self.users_file.clone(),
                };
            }
            Ok(false) => {}
            Err(e) => {
                return IgnoreVerdict::LookupFailed {
                    ip_list: false,
                    error: ResponseError::IgnoreLookup {
                        subject: "username".to_owned(),
                        value: alert.username.clone(),
                        path: self.users_file.display().to_string(),
                        reason: e.to_string(),
                    },
                };
            }
        }

        match file_contains_line(&self.ips_file, &alert.user_ip, &self.comment_marker).await {
            Ok(true) => {
                debug!(user_ip = %alert.user_ip, "IP address found in ignore list");
                IgnoreVerdict::IgnoredIpAddress {
                    list: self.ips_file.clone(),
                }
            }
            Ok(false) => IgnoreVerdict::NotIgnored,
            Err(e) => IgnoreVerdict::LookupFailed {
                ip_list: true,
                error: ResponseError::IgnoreLookup {
                    subject: "IP address".to_owned(),
                    value: alert.user_ip.clone(),
                    path: self.ips_file.display().to_string(),
                    reason: e.to_string(),
                },
            },
        }
    }
}
