//! Message source: Telegram Bot API long-polling.
//!
//! The bot must be a member of every monitored chat (with privacy mode off for
//! groups) to receive their messages.

use crate::relay::config::TelegramConfig;
use crate::relay::ingestion::IngestionHandler;
use crate::relay::publisher::ApiResponse;
use crate::types::{InboundMessage, SenderIdentity, SourceChat};
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Pause after a failed poll before trying again.
const ERROR_BACKOFF: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub channel_post: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Message {
    pub chat: Chat,
    pub from: Option<User>,
    pub sender_chat: Option<Chat>,
    pub text: Option<String>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Chat {
    pub id: i64,
    pub title: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct User {
    pub id: i64,
    pub username: Option<String>,
}

impl Chat {
    fn label(&self) -> String {
        self.title
            .clone()
            .or_else(|| self.username.clone())
            .or_else(|| self.first_name.clone())
            .unwrap_or_else(|| self.id.to_string())
    }

    fn as_sender(&self) -> SenderIdentity {
        SenderIdentity::Channel {
            id: self.id,
            title: self.label(),
            username: self.username.clone(),
        }
    }
}

impl Update {
    /// Convert to the pipeline's message shape; `None` for update kinds we don't consume.
    pub(crate) fn into_inbound(self) -> Option<InboundMessage> {
        let message = self.message.or(self.channel_post)?;

        let sender = match (&message.sender_chat, &message.from) {
            (Some(chat), _) => chat.as_sender(),
            (None, Some(user)) => SenderIdentity::User {
                id: user.id,
                username: user.username.clone(),
            },
            (None, None) => message.chat.as_sender(),
        };

        Some(InboundMessage {
            source: SourceChat {
                id: message.chat.id,
                label: message.chat.label(),
            },
            sender,
            text: message.text.or(message.caption).unwrap_or_default(),
        })
    }
}

/// Polls `getUpdates` and feeds every message to the ingestion handler.
pub struct BotUpdatesSource {
    http_client: Client,
    api_base: String,
    bot_token: String,
    poll_timeout_secs: u64,
    offset: Option<i64>,
}

impl BotUpdatesSource {
    pub fn new(config: &TelegramConfig, bot_token: &str) -> Result<Self> {
        // The HTTP timeout must outlast the server-side long-poll.
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 10))
            .build()
            .context("Failed to build update poller HTTP client")?;

        Ok(Self {
            http_client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
            poll_timeout_secs: config.poll_timeout_secs,
            offset: None,
        })
    }

    async fn poll(&self) -> Result<Vec<Update>> {
        let url = format!("{}/bot{}/getUpdates", self.api_base, self.bot_token);
        let mut query = vec![
            ("timeout", self.poll_timeout_secs.to_string()),
            ("allowed_updates", r#"["message","channel_post"]"#.to_string()),
        ];
        if let Some(offset) = self.offset {
            query.push(("offset", offset.to_string()));
        }

        let response: ApiResponse<Vec<Update>> = self
            .http_client
            .get(&url)
            .query(&query)
            .send()
            .await
            .context("getUpdates request failed")?
            .json()
            .await
            .context("Failed to parse getUpdates response")?;

        if !response.ok {
            return Err(anyhow!(
                "getUpdates rejected: {}",
                response.description.unwrap_or_else(|| "no description".to_string())
            ));
        }
        Ok(response.result.unwrap_or_default())
    }

    /// Poll forever, handing each message to `handler`. Errors back off and retry.
    pub async fn run(mut self, handler: Arc<IngestionHandler>) {
        info!("BotUpdatesSource is polling for messages...");
        loop {
            let updates = match self.poll().await {
                Ok(updates) => updates,
                Err(e) => {
                    warn!("Polling failed, retrying in {:?}: {:#}", ERROR_BACKOFF, e);
                    sleep(ERROR_BACKOFF).await;
                    continue;
                }
            };

            for update in updates {
                self.offset = Some(update.update_id + 1);
                match update.into_inbound() {
                    Some(message) => {
                        let outcome = handler.handle(&message);
                        debug!("Message in {}: {:?}", message.source.label, outcome);
                    }
                    None => debug!("Skipping update without a message"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Vec<Update> {
        let response: ApiResponse<Vec<Update>> = serde_json::from_str(json).unwrap();
        assert!(response.ok);
        response.result.unwrap()
    }

    #[test]
    fn test_group_message_from_user() {
        let updates = parse(
            r#"{"ok":true,"result":[{"update_id":10,"message":{
                "message_id":1,"date":0,
                "chat":{"id":-1002260267566,"type":"supergroup","title":"Alpha Calls"},
                "from":{"id":555,"is_bot":false,"first_name":"Alice","username":"alice"},
                "text":"buy 0x1111111111111111111111111111111111111111 now"}}]}"#,
        );
        let inbound = updates[0].clone().into_inbound().unwrap();

        assert_eq!(inbound.source, SourceChat { id: -1002260267566, label: "Alpha Calls".to_string() });
        assert_eq!(
            inbound.sender,
            SenderIdentity::User { id: 555, username: Some("alice".to_string()) }
        );
        assert!(inbound.text.contains("0x1111"));
    }

    #[test]
    fn test_channel_post_is_attributed_to_channel() {
        let updates = parse(
            r#"{"ok":true,"result":[{"update_id":11,"channel_post":{
                "message_id":2,"date":0,
                "chat":{"id":-1004796838775,"type":"channel","title":"Signals","username":"signals"},
                "sender_chat":{"id":-1004796838775,"type":"channel","title":"Signals","username":"signals"},
                "caption":"chart attached"}}]}"#,
        );
        let inbound = updates[0].clone().into_inbound().unwrap();

        assert_eq!(
            inbound.sender,
            SenderIdentity::Channel {
                id: -1004796838775,
                title: "Signals".to_string(),
                username: Some("signals".to_string())
            }
        );
        assert_eq!(inbound.text, "chart attached");
    }

    #[test]
    fn test_message_without_sender_or_text() {
        let updates = parse(
            r#"{"ok":true,"result":[
                {"update_id":12,"channel_post":{"message_id":3,"date":0,"chat":{"id":-100,"type":"channel"}}},
                {"update_id":13,"edited_message":{"message_id":4,"date":0,"chat":{"id":1,"type":"private"}}}
            ]}"#,
        );
        let inbound = updates[0].clone().into_inbound().unwrap();
        assert_eq!(inbound.text, "");
        assert_eq!(inbound.source.label, "-100");
        assert!(matches!(inbound.sender, SenderIdentity::Channel { id: -100, .. }));

        assert!(updates[1].clone().into_inbound().is_none());
    }
}
