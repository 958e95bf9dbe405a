//! Relay configuration loaded from environment variables.

use crate::relay::buffer::OverflowPolicy;
use crate::relay::links::LinkTemplate;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Complete relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Telegram bot token used by both the update poller and the publisher
    pub bot_token: String,
    /// Destination channel for notifications
    pub target_chat_id: i64,
    /// Monitored chats, each entry a numeric id or a chat title
    pub monitored_sources: Vec<String>,
    /// Sender allow-list, each entry a numeric id or a username; empty disables it
    pub allowed_senders: Vec<String>,
    /// Action links attached to every notification
    pub link_templates: Vec<LinkTemplate>,
    /// Seconds between drain cycles
    pub drain_interval_secs: u64,
    /// Buffer capacity; `None` means unbounded
    pub buffer_capacity: Option<usize>,
    /// What to do when the buffer is full
    pub overflow_policy: OverflowPolicy,
    /// SQLite file backing the dedup store
    pub dedup_db_path: String,
    pub enrichment: EnrichmentConfig,
    pub telegram: TelegramConfig,
    /// Maximum tracing level
    pub log_level: String,
}

/// First backoff delay between enrichment retries.
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);
/// Cap on a single backoff delay between enrichment retries.
pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

/// Market-data lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    pub base_url: String,
    /// Per-request HTTP timeout
    pub timeout_secs: u64,
    pub retry_attempts: usize,
    pub requests_per_minute: u32,
}

/// Bot API settings shared by the poller and the publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub api_base: String,
    pub publish_timeout_secs: u64,
    pub poll_timeout_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.dexscreener.com".to_string(),
            timeout_secs: 10,
            retry_attempts: 2,
            requests_per_minute: 300,
        }
    }
}

impl EnrichmentConfig {
    /// Upper bound for one whole lookup: every attempt running into the
    /// per-request timeout, plus the longest possible backoff between them.
    pub fn lookup_budget(&self) -> Duration {
        let attempts = self.retry_attempts as u32 + 1;
        Duration::from_secs(self.timeout_secs) * attempts + RETRY_MAX_DELAY * (attempts - 1)
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            publish_timeout_secs: 10,
            poll_timeout_secs: 30,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            target_chat_id: 0,
            monitored_sources: Vec::new(),
            allowed_senders: Vec::new(),
            link_templates: LinkTemplate::defaults(),
            drain_interval_secs: 5,
            buffer_capacity: Some(10_000),
            overflow_policy: OverflowPolicy::DropOldest,
            dedup_db_path: "./processed.db".to_string(),
            enrichment: EnrichmentConfig::default(),
            telegram: TelegramConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        config.bot_token = get("BOT_TOKEN").ok_or_else(|| anyhow!("BOT_TOKEN must be set"))?;
        config.target_chat_id = get("TARGET_CHAT_ID")
            .ok_or_else(|| anyhow!("TARGET_CHAT_ID must be set"))?
            .parse::<i64>()
            .context("TARGET_CHAT_ID must be an integer")?;

        if let Some(v) = get("MONITORED_SOURCES") {
            config.monitored_sources = split_list(&v);
        }
        if let Some(v) = get("ALLOWED_SENDERS") {
            config.allowed_senders = split_list(&v);
        }
        if let Some(v) = get("LINK_TEMPLATES") {
            config.link_templates =
                serde_json::from_str(&v).context("LINK_TEMPLATES must be a JSON array")?;
        }
        if let Some(v) = get("DRAIN_INTERVAL_SECS") {
            config.drain_interval_secs = parse_key("DRAIN_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("BUFFER_CAPACITY") {
            let capacity: usize = parse_key("BUFFER_CAPACITY", &v)?;
            config.buffer_capacity = (capacity > 0).then_some(capacity);
        }
        if let Some(v) = get("BUFFER_OVERFLOW") {
            config.overflow_policy = v.parse()?;
        }
        if let Some(v) = get("DEDUP_DB_PATH") {
            config.dedup_db_path = v;
        }
        if let Some(v) = get("DEXSCREENER_BASE_URL") {
            config.enrichment.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("ENRICHMENT_TIMEOUT_SECS") {
            config.enrichment.timeout_secs = parse_key("ENRICHMENT_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("ENRICHMENT_RETRY_ATTEMPTS") {
            config.enrichment.retry_attempts = parse_key("ENRICHMENT_RETRY_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("ENRICHMENT_REQUESTS_PER_MINUTE") {
            config.enrichment.requests_per_minute =
                parse_key("ENRICHMENT_REQUESTS_PER_MINUTE", &v)?;
        }
        if let Some(v) = get("TELEGRAM_API_BASE") {
            config.telegram.api_base = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("PUBLISH_TIMEOUT_SECS") {
            config.telegram.publish_timeout_secs = parse_key("PUBLISH_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("POLL_TIMEOUT_SECS") {
            config.telegram.poll_timeout_secs = parse_key("POLL_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            config.log_level = v;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.drain_interval_secs == 0 {
            return Err(anyhow!("DRAIN_INTERVAL_SECS must be greater than zero"));
        }
        if self.enrichment.requests_per_minute == 0 {
            return Err(anyhow!("ENRICHMENT_REQUESTS_PER_MINUTE must be greater than zero"));
        }
        for template in &self.link_templates {
            template.validate()?;
        }
        self.tracing_level()?;
        Ok(())
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_interval_secs)
    }

    pub fn tracing_level(&self) -> Result<Level> {
        Level::from_str(&self.log_level)
            .map_err(|_| anyhow!("invalid LOG_LEVEL: {}", self.log_level))
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_key<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("{} has an invalid value: {}", key, value))
}
