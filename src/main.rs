//! Main entry point for the ca-relay service
//!
//! Wires the Telegram update poller and the drain scheduler around a shared
//! candidate buffer and runs both until Ctrl-C.

use anyhow::{anyhow, Result};
use ca_relay::relay::{
    BotUpdatesSource, CandidateBuffer, DedupStore, DexScreenerClient, DrainScheduler, IngestionHandler,
    RelayConfig, SchedulerSettings, SqliteDedupStore, TelegramPublisher,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = RelayConfig::from_env()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level()?)
        .init();

    info!("Starting ca-relay");
    if config.monitored_sources.is_empty() {
        warn!("MONITORED_SOURCES is empty; every message will be ignored");
    }

    let store = SqliteDedupStore::open(&config.dedup_db_path).await?;
    if !store.health_check().await? {
        return Err(anyhow!("Dedup store at {} failed its health check", config.dedup_db_path));
    }
    info!("Dedup store holds {} processed addresses", store.count().await?);
    let buffer = Arc::new(CandidateBuffer::new(config.buffer_capacity, config.overflow_policy));

    let enrichment = DexScreenerClient::new(
        DexScreenerClient::http_client(&config.enrichment)?,
        &config.enrichment,
    );
    let publisher = TelegramPublisher::new(
        TelegramPublisher::http_client(&config.telegram)?,
        &config.telegram,
        &config.bot_token,
    );

    let scheduler = DrainScheduler::new(
        buffer.clone(),
        store.clone(),
        Arc::new(enrichment),
        Arc::new(publisher),
        config.link_templates.clone(),
        SchedulerSettings {
            target_chat_id: config.target_chat_id,
            interval: config.drain_interval(),
            enrichment_timeout: config.enrichment.lookup_budget(),
            publish_timeout: Duration::from_secs(config.telegram.publish_timeout_secs),
        },
    );

    let handler = Arc::new(IngestionHandler::new(
        buffer.clone(),
        &config.monitored_sources,
        &config.allowed_senders,
    ));
    let source = BotUpdatesSource::new(&config.telegram, &config.bot_token)?;

    let scheduler_handle = tokio::spawn(scheduler.run());
    let source_handle = tokio::spawn(source.run(handler));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown requested");
        }
        result = scheduler_handle => {
            error!("DrainScheduler stopped unexpectedly: {:?}", result);
        }
        result = source_handle => {
            error!("BotUpdatesSource stopped unexpectedly: {:?}", result);
        }
    }

    let pending = buffer.len();
    if pending > 0 {
        warn!("Exiting with {} unprocessed candidates in the buffer", pending);
    }
    store.close().await;

    Ok(())
}
