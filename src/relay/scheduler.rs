//! Drain scheduler: periodically empties the candidate buffer and forwards
//! each new address exactly once.
//!
//! Per candidate: dedup check, enrichment, format, publish, then record in the
//! dedup store. The store is written only after a successful publish, so a
//! crash between the two can lead to one duplicate publish after restart.

use crate::relay::buffer::CandidateBuffer;
use crate::relay::dedup_store::{DedupStore, InsertOutcome};
use crate::relay::enrichment::EnrichmentSource;
use crate::relay::formatter::format_notification;
use crate::relay::links::{build_links, LinkTemplate};
use crate::relay::publisher::{OutboundMessage, Publisher};
use crate::types::Candidate;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};

/// What happened to one drained candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOutcome {
    Published,
    /// Already in the dedup store; nothing sent
    AlreadyProcessed,
    /// Lookup failed or timed out; left unmarked for a future retry
    EnrichmentUnavailable,
    /// Send failed or timed out; left unmarked for a future retry
    PublishFailed,
    /// Dedup store read or write failed
    StoreFailed,
}

/// Tally of one drain cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub drained: usize,
    pub published: usize,
    pub already_processed: usize,
    pub enrichment_unavailable: usize,
    pub publish_failed: usize,
    pub store_failed: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: CandidateOutcome) {
        match outcome {
            CandidateOutcome::Published => self.published += 1,
            CandidateOutcome::AlreadyProcessed => self.already_processed += 1,
            CandidateOutcome::EnrichmentUnavailable => self.enrichment_unavailable += 1,
            CandidateOutcome::PublishFailed => self.publish_failed += 1,
            CandidateOutcome::StoreFailed => self.store_failed += 1,
        }
    }
}

/// Timing knobs for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub target_chat_id: i64,
    pub interval: Duration,
    /// Bound on a whole lookup, retries included
    pub enrichment_timeout: Duration,
    pub publish_timeout: Duration,
}

/// Single background task draining the buffer on a fixed period.
pub struct DrainScheduler {
    buffer: Arc<CandidateBuffer>,
    store: Arc<dyn DedupStore>,
    enrichment: Arc<dyn EnrichmentSource>,
    publisher: Arc<dyn Publisher>,
    link_templates: Vec<LinkTemplate>,
    settings: SchedulerSettings,
}

impl DrainScheduler {
    pub fn new(
        buffer: Arc<CandidateBuffer>,
        store: Arc<dyn DedupStore>,
        enrichment: Arc<dyn EnrichmentSource>,
        publisher: Arc<dyn Publisher>,
        link_templates: Vec<LinkTemplate>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            buffer,
            store,
            enrichment,
            publisher,
            link_templates,
            settings,
        }
    }

    /// Drain forever. Errors are logged per candidate; the loop never exits on its own.
    pub async fn run(self) {
        info!(
            "DrainScheduler is running (every {:?}, target {})",
            self.settings.interval, self.settings.target_chat_id
        );
        loop {
            let report = self.run_cycle().await;
            if report.drained > 0 {
                info!(
                    "Drain cycle: {} drained, {} published, {} duplicate, {} unavailable, {} publish failed, {} store failed, {} buffer overflows so far",
                    report.drained,
                    report.published,
                    report.already_processed,
                    report.enrichment_unavailable,
                    report.publish_failed,
                    report.store_failed,
                    self.buffer.overflow_count()
                );
            }
            sleep(self.settings.interval).await;
        }
    }

    /// One drain cycle: take everything queued and process it in FIFO order.
    pub async fn run_cycle(&self) -> CycleReport {
        let candidates = self.buffer.drain_all();
        let mut report = CycleReport {
            drained: candidates.len(),
            ..CycleReport::default()
        };

        for candidate in &candidates {
            let outcome = self.process_candidate(candidate).await;
            report.record(outcome);
        }
        report
    }

    /// Handle one candidate end to end.
    #[instrument(skip(self, candidate), fields(address = %candidate.address, chain = %candidate.chain))]
    pub async fn process_candidate(&self, candidate: &Candidate) -> CandidateOutcome {
        let key = candidate.dedup_key();

        match self.store.contains(&key, candidate.chain).await {
            Ok(true) => {
                debug!("Already processed, skipping");
                return CandidateOutcome::AlreadyProcessed;
            }
            Ok(false) => {}
            Err(e) => {
                error!("Dedup lookup failed, deferring candidate: {:?}", e);
                return CandidateOutcome::StoreFailed;
            }
        }

        let snapshot = match timeout(
            self.settings.enrichment_timeout,
            self.enrichment.lookup(candidate.chain, &candidate.address),
        )
        .await
        {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                warn!("Enrichment unavailable: {:#}", e);
                return CandidateOutcome::EnrichmentUnavailable;
            }
            Err(_) => {
                warn!("Enrichment timed out after {:?}", self.settings.enrichment_timeout);
                return CandidateOutcome::EnrichmentUnavailable;
            }
        };

        let message = OutboundMessage {
            chat_id: self.settings.target_chat_id,
            text: format_notification(candidate, &snapshot, chrono::Utc::now()),
            links: build_links(&self.link_templates, &candidate.address, candidate.chain),
            suppress_link_preview: true,
        };

        match timeout(self.settings.publish_timeout, self.publisher.publish(&message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Publish failed: {:#}", e);
                return CandidateOutcome::PublishFailed;
            }
            Err(_) => {
                warn!("Publish timed out after {:?}", self.settings.publish_timeout);
                return CandidateOutcome::PublishFailed;
            }
        }

        match self.store.insert(&key, candidate.chain).await {
            Ok(InsertOutcome::Inserted) => {
                info!("Forwarded {} ({})", snapshot.symbol, candidate.address);
                CandidateOutcome::Published
            }
            Ok(InsertOutcome::AlreadyExists) => {
                warn!("Published, but address was already recorded as processed");
                CandidateOutcome::Published
            }
            Err(e) => {
                // The message is out; without the record a later mention may be forwarded again.
                error!("Published but failed to record as processed: {:?}", e);
                CandidateOutcome::StoreFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::dedup_store::SqliteDedupStore;
    use crate::relay::enrichment::MarketSnapshot;
    use crate::types::Chain;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct SlowEnrichment;

    #[async_trait]
    impl EnrichmentSource for SlowEnrichment {
        async fn lookup(&self, _chain: Chain, _address: &str) -> Result<MarketSnapshot> {
            sleep(Duration::from_secs(60)).await;
            Err(anyhow!("unreachable"))
        }
    }

    struct FixedEnrichment;

    #[async_trait]
    impl EnrichmentSource for FixedEnrichment {
        async fn lookup(&self, _chain: Chain, _address: &str) -> Result<MarketSnapshot> {
            Ok(MarketSnapshot {
                display_name: "Foo".to_string(),
                symbol: "FOO".to_string(),
                market_cap: Some(1000.0),
                dex_id: "x".to_string(),
                pair_created_at: None,
                liquidity_usd: Some(500.0),
                chart_url: "http://x".to_string(),
                chain_id: "solana".to_string(),
                price_usd: None,
            })
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, message: &OutboundMessage) -> Result<()> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn settings() -> SchedulerSettings {
        SchedulerSettings {
            target_chat_id: 42,
            interval: Duration::from_millis(10),
            enrichment_timeout: Duration::from_millis(50),
            publish_timeout: Duration::from_millis(50),
        }
    }

    fn candidate(address: &str, chain: Chain) -> Candidate {
        Candidate {
            source_label: "Alpha Calls".to_string(),
            sender_label: Some("@alice".to_string()),
            raw_text: address.to_string(),
            address: address.to_string(),
            chain,
        }
    }

    #[tokio::test]
    async fn test_empty_cycle_does_nothing() -> Result<()> {
        let scheduler = DrainScheduler::new(
            Arc::new(CandidateBuffer::unbounded()),
            SqliteDedupStore::in_memory().await?,
            Arc::new(FixedEnrichment),
            Arc::new(RecordingPublisher::default()),
            vec![],
            settings(),
        );
        assert_eq!(scheduler.run_cycle().await, CycleReport::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_enrichment_timeout_is_unavailable() -> Result<()> {
        let buffer = Arc::new(CandidateBuffer::unbounded());
        let store = SqliteDedupStore::in_memory().await?;
        let publisher = Arc::new(RecordingPublisher::default());
        let scheduler = DrainScheduler::new(
            buffer.clone(),
            store.clone(),
            Arc::new(SlowEnrichment),
            publisher.clone(),
            vec![],
            settings(),
        );

        buffer.append(candidate("Mint1111111111111111111111111111111", Chain::Solana));
        let report = scheduler.run_cycle().await;

        assert_eq!(report.enrichment_unavailable, 1);
        assert!(publisher.sent.lock().unwrap().is_empty());
        assert_eq!(store.count().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_links_and_target_are_applied() -> Result<()> {
        let buffer = Arc::new(CandidateBuffer::unbounded());
        let publisher = Arc::new(RecordingPublisher::default());
        let templates = vec![
            LinkTemplate::new("Buy", "https://t.me/somebot?start={address}").with_suffix(Chain::Solana, "-sol"),
        ];
        let scheduler = DrainScheduler::new(
            buffer.clone(),
            SqliteDedupStore::in_memory().await?,
            Arc::new(FixedEnrichment),
            publisher.clone(),
            templates,
            settings(),
        );

        let mint = "Mint1111111111111111111111111111111";
        buffer.append(candidate(mint, Chain::Solana));
        scheduler.run_cycle().await;

        let sent = publisher.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chat_id, 42);
        assert!(sent[0].suppress_link_preview);
        assert_eq!(sent[0].links[0].url, format!("https://t.me/somebot?start={}-sol", mint));
        Ok(())
    }

    #[tokio::test]
    async fn test_evm_dedup_ignores_checksum_case() -> Result<()> {
        let buffer = Arc::new(CandidateBuffer::unbounded());
        let store = SqliteDedupStore::in_memory().await?;
        let publisher = Arc::new(RecordingPublisher::default());
        let scheduler = DrainScheduler::new(
            buffer.clone(),
            store.clone(),
            Arc::new(FixedEnrichment),
            publisher.clone(),
            vec![],
            settings(),
        );

        buffer.append(candidate("0xAbCdEf0000000000000000000000000000000001", Chain::Evm));
        buffer.append(candidate("0xabcdef0000000000000000000000000000000001", Chain::Evm));
        let report = scheduler.run_cycle().await;

        assert_eq!(report.published, 1);
        assert_eq!(report.already_processed, 1);
        assert!(store.contains("0xabcdef0000000000000000000000000000000001", Chain::Evm).await?);
        Ok(())
    }
}
