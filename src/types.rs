//! Core types shared by the relay pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Blockchain address family.
///
/// Variant order is the extraction precedence: when a message carries both
/// kinds of address, the EVM one wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Chain {
    /// Ethereum-compatible 20-byte hex address
    Evm,
    /// Base58 Solana public key
    Solana,
}

impl Chain {
    /// Stable identifier used in storage and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Evm => "EVM",
            Chain::Solana => "SOLANA",
        }
    }

    /// Normalised form of `address` used for deduplication.
    ///
    /// EVM addresses are case-insensitive (checksum casing is presentation only),
    /// Solana base58 keys are not.
    pub fn dedup_key(&self, address: &str) -> String {
        match self {
            Chain::Evm => address.to_ascii_lowercase(),
            Chain::Solana => address.to_string(),
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EVM" => Ok(Chain::Evm),
            "SOLANA" | "SOL" => Ok(Chain::Solana),
            other => Err(anyhow::anyhow!("unknown chain: {}", other)),
        }
    }
}

/// Chat a message arrived in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceChat {
    /// Numeric chat identifier as delivered by the message source
    pub id: i64,
    /// Chat title, or a fallback identifier when the chat has none
    pub label: String,
}

/// Who authored an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SenderIdentity {
    /// A user account
    User { id: i64, username: Option<String> },
    /// A channel or group posting as itself
    Channel {
        id: i64,
        title: String,
        username: Option<String>,
    },
}

impl SenderIdentity {
    pub fn id(&self) -> i64 {
        match self {
            SenderIdentity::User { id, .. } | SenderIdentity::Channel { id, .. } => *id,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            SenderIdentity::User { username, .. } | SenderIdentity::Channel { username, .. } => {
                username.as_deref()
            }
        }
    }

    /// Human-readable label: channel title, `@username`, or the numeric id.
    pub fn label(&self) -> String {
        match self {
            SenderIdentity::Channel { title, .. } => title.clone(),
            SenderIdentity::User { id, username } => match username {
                Some(name) => format!("@{}", name),
                None => id.to_string(),
            },
        }
    }
}

/// A parsed inbound chat message handed to the ingestion handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub source: SourceChat,
    pub sender: SenderIdentity,
    /// Message text; empty when the message had none
    pub text: String,
}

/// One extracted address pending dedup, enrichment and publishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Title or identifier of the originating chat
    pub source_label: String,
    /// Originating sender, when known
    pub sender_label: Option<String>,
    /// Original message text
    pub raw_text: String,
    /// Address literal as it appeared in the text
    pub address: String,
    pub chain: Chain,
}

impl Candidate {
    /// Key under which this candidate is deduplicated.
    pub fn dedup_key(&self) -> String {
        self.chain.dedup_key(&self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_round_trips_through_str() {
        assert_eq!("EVM".parse::<Chain>().unwrap(), Chain::Evm);
        assert_eq!("solana".parse::<Chain>().unwrap(), Chain::Solana);
        assert!("bitcoin".parse::<Chain>().is_err());
        assert_eq!(Chain::Solana.to_string(), "SOLANA");
    }

    #[test]
    fn test_evm_dedup_key_ignores_case() {
        let checksummed = "0xAbCdEf0000000000000000000000000000000001";
        assert_eq!(
            Chain::Evm.dedup_key(checksummed),
            "0xabcdef0000000000000000000000000000000001"
        );
        let sol = "So11111111111111111111111111111111111111112";
        assert_eq!(Chain::Solana.dedup_key(sol), sol);
    }

    #[test]
    fn test_sender_labels() {
        let user = SenderIdentity::User { id: 7, username: Some("alice".to_string()) };
        assert_eq!(user.label(), "@alice");
        let anon = SenderIdentity::User { id: 7, username: None };
        assert_eq!(anon.label(), "7");
        let channel = SenderIdentity::Channel {
            id: 100,
            title: "Alpha Calls".to_string(),
            username: None,
        };
        assert_eq!(channel.label(), "Alpha Calls");
    }
}
