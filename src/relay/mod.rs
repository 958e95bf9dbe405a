//! Relay module - the buffering, deduplication and forwarding pipeline.
//!
//! Message source -> ingestion handler -> candidate buffer -> drain scheduler
//! -> {dedup store, enrichment} -> publisher.

pub mod buffer;
pub mod config;
pub mod dedup_store;
pub mod enrichment;
pub mod extractor;
pub mod formatter;
pub mod ingestion;
pub mod links;
pub mod publisher;
pub mod scheduler;
pub mod source;

// Re-export main types
pub use buffer::{AppendOutcome, CandidateBuffer, OverflowPolicy};
pub use config::{EnrichmentConfig, RelayConfig, TelegramConfig};
pub use dedup_store::{DedupStore, InsertOutcome, SqliteDedupStore};
pub use enrichment::{DexScreenerClient, EnrichmentSource, MarketSnapshot};
pub use ingestion::{IngestOutcome, IngestionHandler};
pub use links::{ActionLink, LinkTemplate};
pub use publisher::{OutboundMessage, Publisher, TelegramPublisher};
pub use scheduler::{CandidateOutcome, CycleReport, DrainScheduler, SchedulerSettings};
pub use source::BotUpdatesSource;
