//! ca-relay - forwards blockchain addresses spotted in monitored chats
//!
//! Inbound chat messages are filtered and scanned for EVM and Solana addresses.
//! New addresses are enriched with market data and published once to a
//! destination channel; a SQLite dedup store keeps them from being forwarded twice.

pub mod types;
pub mod relay;

// Re-export main types for convenience
pub use types::{Candidate, Chain, InboundMessage, SenderIdentity, SourceChat};
