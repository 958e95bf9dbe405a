//! Publishing notifications to the destination channel.

use crate::relay::config::TelegramConfig;
use crate::relay::links::ActionLink;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

/// Buttons per inline-keyboard row.
const BUTTONS_PER_ROW: usize = 3;

/// A fully formatted message ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub chat_id: i64,
    pub text: String,
    pub links: Vec<ActionLink>,
    pub suppress_link_preview: bool,
}

/// Destination for formatted notifications.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: &OutboundMessage) -> Result<()>;
}

/// Envelope every Bot API method responds with.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

/// `sendMessage` request body for one outbound message.
pub(crate) fn send_message_body(message: &OutboundMessage) -> Value {
    let mut body = json!({
        "chat_id": message.chat_id,
        "text": message.text,
        "link_preview_options": { "is_disabled": message.suppress_link_preview },
    });

    if !message.links.is_empty() {
        let rows: Vec<Vec<Value>> = message
            .links
            .chunks(BUTTONS_PER_ROW)
            .map(|row| {
                row.iter()
                    .map(|link| json!({ "text": link.label, "url": link.url }))
                    .collect()
            })
            .collect();
        body["reply_markup"] = json!({ "inline_keyboard": rows });
    }

    body
}

/// Publishes through the Telegram Bot API.
pub struct TelegramPublisher {
    http_client: Client,
    api_base: String,
    bot_token: String,
}

impl TelegramPublisher {
    pub fn new(http_client: Client, config: &TelegramConfig, bot_token: &str) -> Self {
        Self {
            http_client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
        }
    }

    pub fn http_client(config: &TelegramConfig) -> Result<Client> {
        Client::builder()
            .timeout(Duration::from_secs(config.publish_timeout_secs))
            .build()
            .context("Failed to build publisher HTTP client")
    }
}

#[async_trait]
impl Publisher for TelegramPublisher {
    #[instrument(skip(self, message), fields(chat_id = message.chat_id, links = message.links.len()))]
    async fn publish(&self, message: &OutboundMessage) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);

        let response = self
            .http_client
            .post(&url)
            .json(&send_message_body(message))
            .send()
            .await
            .context("sendMessage request failed")?;

        let status = response.status();
        let body: ApiResponse<Value> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse sendMessage response ({})", status))?;

        if !status.is_success() || !body.ok {
            return Err(anyhow!(
                "sendMessage rejected ({}): {}",
                status,
                body.description.unwrap_or_else(|| "no description".to_string())
            ));
        }

        debug!("Message delivered to {}", message.chat_id);
        Ok(())
    }
}
