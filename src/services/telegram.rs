//! Telegram Bot API notifier.
//!
//! Every message goes to the team chat; direct notifications mention the
//! recipient by handle.

use crate::config::TelegramConfig;
use crate::error::AppError;
use crate::services::external::Notifier;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Prefix `text` with a mention of `recipient`.
pub fn mention(recipient: &str, text: &str) -> String {
    format!("@{} {}", recipient.trim_start_matches('@'), text)
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.token,
            method
        )
    }

    async fn send_message(&self, text: &str) -> Result<(), AppError> {
        let body = SendMessage {
            chat_id: self.config.chat_id,
            text,
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let parsed = response.json::<TelegramResponse>().await.ok();

        match parsed {
            Some(r) if r.ok => Ok(()),
            Some(r) => Err(AppError::notification(
                r.description
                    .unwrap_or_else(|| format!("sendMessage failed ({})", status.as_u16())),
            )),
            None => Err(AppError::notification(format!(
                "sendMessage failed ({})",
                status.as_u16()
            ))),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, recipient: &str, text: &str) -> Result<(), AppError> {
        self.send_message(&mention(recipient, text)).await
    }

    async fn broadcast(&self, text: &str) -> Result<(), AppError> {
        self.send_message(text).await
    }
}
