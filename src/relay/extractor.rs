//! Address extraction from free-form message text.

use crate::types::Chain;
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

static EVM_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b0x[a-fA-F0-9]{40}\b").expect("valid EVM pattern"));

static SOLANA_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[1-9A-HJ-NP-Za-km-z]{32,44}\b").expect("valid Solana pattern"));

/// Extract every address found in `text`.
///
/// All EVM matches come first (in text order), then all Solana matches. Solana
/// matches that overlap an EVM match are dropped.
pub fn extract(text: &str) -> Vec<(String, Chain)> {
    let evm: Vec<Range<usize>> = EVM_ADDRESS.find_iter(text).map(|m| m.range()).collect();

    let mut found: Vec<(String, Chain)> = evm
        .iter()
        .map(|range| (text[range.clone()].to_string(), Chain::Evm))
        .collect();

    found.extend(
        SOLANA_ADDRESS
            .find_iter(text)
            .filter(|m| !evm.iter().any(|r| r.start < m.end() && m.start() < r.end))
            .map(|m| (m.as_str().to_string(), Chain::Solana)),
    );

    found
}

/// First address by chain precedence, if any.
pub fn first_address(text: &str) -> Option<(String, Chain)> {
    extract(text).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVM: &str = "0x1111111111111111111111111111111111111111";
    const SOL: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";

    #[test]
    fn test_no_address() {
        assert!(extract("gm everyone, nothing to see").is_empty());
        assert!(extract("").is_empty());
    }

    #[test]
    fn test_evm_address() {
        let found = extract(&format!("buy {} now", EVM));
        assert_eq!(found, vec![(EVM.to_string(), Chain::Evm)]);
    }

    #[test]
    fn test_solana_address() {
        let found = extract(&format!("ape {}", SOL));
        assert_eq!(found, vec![(SOL.to_string(), Chain::Solana)]);
    }

    #[test]
    fn test_evm_takes_precedence_over_solana() {
        let text = format!("sol: {} eth: {}", SOL, EVM);
        let found = extract(&text);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].1, Chain::Evm);
        assert_eq!(found[1].1, Chain::Solana);
        assert_eq!(first_address(&text), Some((EVM.to_string(), Chain::Evm)));
    }

    #[test]
    fn test_evm_body_is_not_reported_as_solana() {
        // "x111..." inside an EVM address is valid base58 of Solana length.
        let found = extract(EVM);
        assert_eq!(found, vec![(EVM.to_string(), Chain::Evm)]);
    }

    #[test]
    fn test_too_long_hex_is_ignored() {
        let text = format!("{}ff", EVM);
        assert!(extract(&text).iter().all(|(_, chain)| *chain != Chain::Evm));
    }

    #[test]
    fn test_base58_excluded_characters() {
        // '0', 'O', 'I' and 'l' are not in the base58 alphabet.
        let text = "0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl";
        assert!(extract(text).is_empty());
    }
}
