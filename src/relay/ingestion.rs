//! Ingestion handler: filters inbound messages and queues address candidates.
//!
//! Runs once per inbound message. It never performs network I/O and never
//! publishes; the drain scheduler owns everything downstream of the buffer.

use crate::relay::buffer::{AppendOutcome, CandidateBuffer};
use crate::relay::extractor;
use crate::types::{Candidate, InboundMessage, SenderIdentity};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Queued(Candidate),
    UnmonitoredSource,
    UnauthorizedSender,
    NoAddress,
    /// Buffer was full under the reject policy
    BufferFull,
}

/// Bot API supergroup and channel ids carry a `-100` prefix that MTProto ids lack.
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// Reduce a chat id to its bare positive form so either id flavour matches.
pub fn canonical_chat_id(id: i64) -> i64 {
    if id <= -CHANNEL_ID_OFFSET {
        -id - CHANNEL_ID_OFFSET
    } else {
        id.abs()
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().trim_start_matches('@').to_lowercase()
}

/// Filter entries that match by numeric id or by name.
#[derive(Debug, Clone, Default)]
struct IdentityFilter {
    ids: Vec<i64>,
    names: Vec<String>,
}

impl IdentityFilter {
    fn from_entries(entries: &[String]) -> Self {
        let mut filter = Self::default();
        for entry in entries {
            match entry.trim().parse::<i64>() {
                Ok(id) => filter.ids.push(canonical_chat_id(id)),
                Err(_) => filter.names.push(normalize_name(entry)),
            }
        }
        filter
    }

    fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.names.is_empty()
    }

    fn matches(&self, id: i64, name: Option<&str>) -> bool {
        if self.ids.contains(&canonical_chat_id(id)) {
            return true;
        }
        match name {
            Some(name) => self.names.contains(&normalize_name(name)),
            None => false,
        }
    }
}

/// Turns inbound messages into buffered candidates.
pub struct IngestionHandler {
    buffer: Arc<CandidateBuffer>,
    monitored: IdentityFilter,
    allowed: IdentityFilter,
}

impl IngestionHandler {
    /// `monitored_sources` and `allowed_senders` take numeric ids or names; an
    /// empty allow-list admits every sender.
    pub fn new(
        buffer: Arc<CandidateBuffer>,
        monitored_sources: &[String],
        allowed_senders: &[String],
    ) -> Self {
        Self {
            buffer,
            monitored: IdentityFilter::from_entries(monitored_sources),
            allowed: IdentityFilter::from_entries(allowed_senders),
        }
    }

    fn is_authorized(&self, message: &InboundMessage) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        match &message.sender {
            SenderIdentity::Channel { id, title, username } => {
                self.allowed.matches(*id, username.as_deref())
                    || self.allowed.matches(*id, Some(title))
            }
            SenderIdentity::User { id, username } => self.allowed.matches(*id, username.as_deref()),
        }
    }

    /// Filter, extract, and queue. Never blocks on I/O.
    pub fn handle(&self, message: &InboundMessage) -> IngestOutcome {
        let source = &message.source;

        if !self.monitored.matches(source.id, Some(&source.label)) {
            debug!("Ignored message from unmonitored chat {} ({})", source.id, source.label);
            return IngestOutcome::UnmonitoredSource;
        }

        if !self.is_authorized(message) {
            debug!("Unauthorized sender {} in {}", message.sender.label(), source.label);
            return IngestOutcome::UnauthorizedSender;
        }

        let Some((address, chain)) = extractor::first_address(&message.text) else {
            debug!("No address in message from {} in {}", message.sender.label(), source.label);
            return IngestOutcome::NoAddress;
        };

        let candidate = Candidate {
            source_label: source.label.clone(),
            sender_label: Some(message.sender.label()),
            raw_text: message.text.clone(),
            address,
            chain,
        };

        match self.buffer.append(candidate.clone()) {
            AppendOutcome::Queued => {
                info!(
                    "Queued {} address {} from {} in {}",
                    candidate.chain,
                    candidate.address,
                    message.sender.label(),
                    source.label
                );
                IngestOutcome::Queued(candidate)
            }
            AppendOutcome::QueuedDroppedOldest(evicted) => {
                warn!(
                    "Buffer full, dropped oldest candidate {} to queue {}",
                    evicted.address, candidate.address
                );
                IngestOutcome::Queued(candidate)
            }
            AppendOutcome::Rejected => {
                warn!("Buffer full, rejected candidate {}", candidate.address);
                IngestOutcome::BufferFull
            }
        }
    }
}
