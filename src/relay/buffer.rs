//! Candidate buffer shared between ingestion and the drain scheduler.
//!
//! The lock is held only for the in-memory append or swap, never across I/O.

use crate::types::Candidate;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Behaviour when appending to a full buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest pending candidate to make room
    DropOldest,
    /// Refuse the new candidate
    Reject,
}

impl FromStr for OverflowPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop_oldest" => Ok(OverflowPolicy::DropOldest),
            "reject" => Ok(OverflowPolicy::Reject),
            other => Err(anyhow!("unknown buffer overflow policy: {}", other)),
        }
    }
}

/// Result of a single append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Queued,
    /// Queued after evicting the oldest entry
    QueuedDroppedOldest(Candidate),
    /// Buffer full under `Reject`; the candidate was not queued
    Rejected,
}

/// FIFO queue of pending candidates.
#[derive(Debug)]
pub struct CandidateBuffer {
    queue: Mutex<VecDeque<Candidate>>,
    capacity: Option<usize>,
    policy: OverflowPolicy,
    overflowed: AtomicU64,
}

impl CandidateBuffer {
    pub fn unbounded() -> Self {
        Self::new(None, OverflowPolicy::DropOldest)
    }

    pub fn new(capacity: Option<usize>, policy: OverflowPolicy) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            capacity,
            policy,
            overflowed: AtomicU64::new(0),
        }
    }

    // A panic while holding the lock cannot leave the deque half-written, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Candidate>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a candidate to the tail.
    pub fn append(&self, candidate: Candidate) -> AppendOutcome {
        let mut queue = self.lock();
        match self.capacity {
            Some(capacity) if queue.len() >= capacity => {
                self.overflowed.fetch_add(1, Ordering::Relaxed);
                match self.policy {
                    OverflowPolicy::Reject => AppendOutcome::Rejected,
                    OverflowPolicy::DropOldest => {
                        let evicted = queue.pop_front();
                        queue.push_back(candidate);
                        match evicted {
                            Some(old) => AppendOutcome::QueuedDroppedOldest(old),
                            None => AppendOutcome::Queued,
                        }
                    }
                }
            }
            _ => {
                queue.push_back(candidate);
                AppendOutcome::Queued
            }
        }
    }

    /// Take everything queued so far, leaving the buffer empty.
    pub fn drain_all(&self) -> Vec<Candidate> {
        let taken = std::mem::take(&mut *self.lock());
        taken.into()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of appends that hit the capacity limit so far.
    pub fn overflow_count(&self) -> u64 {
        self.overflowed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chain;
    use std::sync::Arc;

    fn candidate(n: usize) -> Candidate {
        Candidate {
            source_label: "test".to_string(),
            sender_label: None,
            raw_text: String::new(),
            address: format!("addr{}", n),
            chain: Chain::Solana,
        }
    }

    #[test]
    fn test_drain_is_fifo_and_empties_buffer() {
        let buffer = CandidateBuffer::unbounded();
        for n in 0..3 {
            assert_eq!(buffer.append(candidate(n)), AppendOutcome::Queued);
        }
        assert_eq!(buffer.len(), 3);

        let drained = buffer.drain_all();
        let addresses: Vec<_> = drained.iter().map(|c| c.address.as_str()).collect();
        assert_eq!(addresses, vec!["addr0", "addr1", "addr2"]);

        assert!(buffer.is_empty());
        assert!(buffer.drain_all().is_empty());
    }

    #[test]
    fn test_drop_oldest_policy() {
        let buffer = CandidateBuffer::new(Some(2), OverflowPolicy::DropOldest);
        buffer.append(candidate(0));
        buffer.append(candidate(1));
        assert_eq!(
            buffer.append(candidate(2)),
            AppendOutcome::QueuedDroppedOldest(candidate(0))
        );
        assert_eq!(buffer.overflow_count(), 1);

        let addresses: Vec<_> = buffer.drain_all().into_iter().map(|c| c.address).collect();
        assert_eq!(addresses, vec!["addr1", "addr2"]);
    }

    #[test]
    fn test_reject_policy() {
        let buffer = CandidateBuffer::new(Some(1), OverflowPolicy::Reject);
        assert_eq!(buffer.append(candidate(0)), AppendOutcome::Queued);
        assert_eq!(buffer.append(candidate(1)), AppendOutcome::Rejected);
        assert_eq!(buffer.drain_all(), vec![candidate(0)]);
        assert_eq!(buffer.overflow_count(), 1);
    }

    #[test]
    fn test_concurrent_appends_and_drains_lose_nothing() {
        let buffer = Arc::new(CandidateBuffer::unbounded());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let buffer = buffer.clone();
                std::thread::spawn(move || {
                    for n in 0..250 {
                        buffer.append(candidate(w * 1000 + n));
                    }
                })
            })
            .collect();

        let mut seen = Vec::new();
        while writers.iter().any(|h| !h.is_finished()) {
            seen.extend(buffer.drain_all());
        }
        for writer in writers {
            writer.join().unwrap();
        }
        seen.extend(buffer.drain_all());

        assert_eq!(seen.len(), 1000);
        let mut addresses: Vec<_> = seen.into_iter().map(|c| c.address).collect();
        addresses.sort();
        addresses.dedup();
        assert_eq!(addresses.len(), 1000);
    }

    #[test]
    fn test_overflow_policy_parsing() {
        assert_eq!("drop_oldest".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::DropOldest);
        assert_eq!("REJECT".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::Reject);
        assert!("block".parse::<OverflowPolicy>().is_err());
    }
}
