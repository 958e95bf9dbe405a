//! Action-link templates attached to published notifications.

use crate::types::Chain;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Token replaced by the candidate address in every template.
pub const ADDRESS_PLACEHOLDER: &str = "{address}";

/// A labelled URL template, e.g. `https://dexscreener.com/search?q={address}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkTemplate {
    pub label: String,
    pub template: String,
    /// Optional text appended after substitution, keyed by chain name (`EVM`, `SOLANA`)
    #[serde(default)]
    pub chain_suffix: HashMap<String, String>,
}

/// A rendered button: label plus final URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLink {
    pub label: String,
    pub url: String,
}

impl LinkTemplate {
    pub fn new(label: &str, template: &str) -> Self {
        Self {
            label: label.to_string(),
            template: template.to_string(),
            chain_suffix: HashMap::new(),
        }
    }

    pub fn with_suffix(mut self, chain: Chain, suffix: &str) -> Self {
        self.chain_suffix.insert(chain.as_str().to_string(), suffix.to_string());
        self
    }

    pub fn defaults() -> Vec<Self> {
        vec![
            LinkTemplate::new("DexScreener", "https://dexscreener.com/search?q={address}"),
            LinkTemplate::new("GMGN", "https://gmgn.ai/search?q={address}"),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(anyhow!("link template has an empty label"));
        }
        if !self.template.contains(ADDRESS_PLACEHOLDER) {
            return Err(anyhow!(
                "link template '{}' is missing the {} placeholder",
                self.label,
                ADDRESS_PLACEHOLDER
            ));
        }
        for key in self.chain_suffix.keys() {
            key.parse::<Chain>()
                .map_err(|e| anyhow!("link template '{}': {}", self.label, e))?;
        }
        Ok(())
    }

    fn suffix_for(&self, chain: Chain) -> Option<&str> {
        self.chain_suffix
            .iter()
            .find(|(key, _)| key.parse::<Chain>().ok() == Some(chain))
            .map(|(_, suffix)| suffix.as_str())
    }

    pub fn render(&self, address: &str, chain: Chain) -> ActionLink {
        let mut url = self.template.replace(ADDRESS_PLACEHOLDER, address);
        if let Some(suffix) = self.suffix_for(chain) {
            url.push_str(suffix);
        }
        ActionLink {
            label: self.label.clone(),
            url,
        }
    }
}

/// Render every template for one address.
pub fn build_links(templates: &[LinkTemplate], address: &str, chain: Chain) -> Vec<ActionLink> {
    templates.iter().map(|t| t.render(address, chain)).collect()
}
