//! Webhook notifier
//!
//! 레코드를 JSON으로 직렬화하여 설정된 URL로 POST합니다.
//! 실패하면 `retries`번까지 `delay` 간격으로 다시 시도합니다.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use lockout_core::EventRecord;

use crate::config::ResponderConfig;
use crate::error::ResponderError;
use crate::notify::Notifier;

/// Webhook notifier
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    retries: u32,
    delay: Duration,
}

impl WebhookNotifier {
    /// 새 notifier를 생성합니다.
    pub fn new(
        url: impl Into<String>,
        retries: u32,
        delay: Duration,
        timeout: Duration,
    ) -> Result<Self, ResponderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResponderError::Config {
                field: "webhook_url".to_owned(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            url: url.into(),
            retries,
            delay,
        })
    }

    /// 엔진 설정에서 notifier를 생성합니다. URL이 비어 있으면 `None`입니다.
    pub fn from_config(config: &ResponderConfig) -> Result<Option<Self>, ResponderError> {
        if config.webhook_url.is_empty() {
            return Ok(None);
        }
        Self::new(
            &config.webhook_url,
            config.webhook_retries,
            Duration::from_secs(config.webhook_delay_secs),
            Duration::from_secs(config.webhook_timeout_secs),
        )
        .map(Some)
    }

    async fn post_once(&self, record: &EventRecord) -> Result<(), String> {
        let response = self
            .client
            .post(&self.url)
            .json(record)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("unexpected status {status}"))
        }
    }
}

impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, record: &EventRecord) -> Result<(), ResponderError> {
        let attempts = self.retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.post_once(record).await {
                Ok(()) => {
                    debug!(attempt, action = %record.action, "webhook delivered");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "webhook delivery attempt failed");
                    last_error = e;
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.delay).await;
            }
        }

        Err(ResponderError::Notify {
            notifier: "webhook".to_owned(),
            reason: format!("{last_error} (after {attempts} attempt(s))"),
        })
    }
}
