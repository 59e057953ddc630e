//! Outbound SMS for share links

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::config::SmsSettings;

#[derive(Error, Debug)]
pub enum SmsError {
    #[error("SMS delivery is disabled")]
    Disabled,

    #[error("SMS gateway request failed: {0}")]
    Transport(String),

    #[error("SMS gateway rejected message (status {status}): {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError>;
}

/// Build the sender for the configured gateway
pub fn from_settings(settings: &SmsSettings) -> Arc<dyn SmsSender> {
    if settings.enabled {
        Arc::new(TwilioSms::new(settings.clone()))
    } else {
        Arc::new(DisabledSms)
    }
}

pub struct DisabledSms;

#[async_trait]
impl SmsSender for DisabledSms {
    async fn send(&self, _to: &str, _body: &str) -> Result<(), SmsError> {
        Err(SmsError::Disabled)
    }
}

/// Twilio-style Messages API: form post with basic auth
pub struct TwilioSms {
    settings: SmsSettings,
    client: reqwest::Client,
}

impl TwilioSms {
    pub fn new(settings: SmsSettings) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Messages.json",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.account_sid
        )
    }
}

#[async_trait]
impl SmsSender for TwilioSms {
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError> {
        let url = self.messages_url();
        let form = [
            ("To", to),
            ("From", self.settings.from_number.as_str()),
            ("Body", body),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.settings.account_sid, Some(&self.settings.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| SmsError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(status = %status, "SMS sent successfully");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "SMS gateway returned non-success status");
            Err(SmsError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Keeps messages in memory instead of sending them
#[derive(Default)]
pub struct RecordingSms {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSms {
    pub fn new() -> Self {
        Self::default()
    }

    /// (recipient, body) pairs in send order
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SmsSender for RecordingSms {
    async fn send(&self, to: &str, body: &str) -> Result<(), SmsError> {
        self.sent
            .lock()
            .map_err(|_| SmsError::Transport("recorder poisoned".to_string()))?
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}
