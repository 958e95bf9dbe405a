//! Market-data enrichment for candidate addresses.
//!
//! The DexScreener client fetches all trading pairs for a token and reduces
//! them to a single [`MarketSnapshot`]. Any failure (transport, HTTP status,
//! parse, or no matching pair) surfaces as an `Err`, which the drain scheduler
//! treats as "unavailable".

use crate::relay::config::{EnrichmentConfig, RETRY_BASE_DELAY, RETRY_MAX_DELAY};
use crate::types::Chain;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use tokio_retry::{strategy::ExponentialBackoff, Retry};
use tracing::{debug, instrument};

/// Descriptive market fields for one token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub display_name: String,
    pub symbol: String,
    /// Market cap in USD, falling back to FDV when not reported
    pub market_cap: Option<f64>,
    pub dex_id: String,
    pub pair_created_at: Option<DateTime<Utc>>,
    pub liquidity_usd: Option<f64>,
    pub chart_url: String,
    /// Chain the selected pair trades on, as named by the data provider
    pub chain_id: String,
    pub price_usd: Option<String>,
}

impl MarketSnapshot {
    /// Time since the pair was created, if known and not in the future.
    pub fn pair_age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.pair_created_at
            .map(|created| now - created)
            .filter(|age| *age >= chrono::Duration::zero())
    }
}

/// Anything that can describe a token by chain and address.
#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    async fn lookup(&self, chain: Chain, address: &str) -> Result<MarketSnapshot>;
}

// --- DexScreener wire types ---

#[derive(Debug, Deserialize)]
pub(crate) struct TokenPairsResponse {
    pub pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DexPair {
    pub chain_id: String,
    pub dex_id: String,
    pub url: String,
    pub base_token: PairToken,
    pub price_usd: Option<String>,
    pub liquidity: Option<PairLiquidity>,
    pub fdv: Option<f64>,
    pub market_cap: Option<f64>,
    /// Unix milliseconds
    pub pair_created_at: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PairToken {
    pub address: String,
    pub name: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PairLiquidity {
    pub usd: Option<f64>,
}

impl DexPair {
    fn liquidity_usd(&self) -> f64 {
        self.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0)
    }

    fn trades_on(&self, chain: Chain) -> bool {
        let is_solana = self.chain_id.eq_ignore_ascii_case("solana");
        match chain {
            Chain::Solana => is_solana,
            Chain::Evm => !is_solana,
        }
    }

    fn into_snapshot(self) -> MarketSnapshot {
        let liquidity_usd = self.liquidity.as_ref().and_then(|l| l.usd);
        MarketSnapshot {
            display_name: self.base_token.name,
            symbol: self.base_token.symbol,
            market_cap: self.market_cap.or(self.fdv),
            dex_id: self.dex_id,
            pair_created_at: self
                .pair_created_at
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            liquidity_usd,
            chart_url: self.url,
            chain_id: self.chain_id,
            price_usd: self.price_usd,
        }
    }
}

/// Choose the pair that best describes `address` on `chain`.
///
/// Pairs on the wrong chain family are ignored; pairs whose base token is the
/// queried address win over pairs where it is the quote token; liquidity breaks ties.
pub(crate) fn select_pair(pairs: Vec<DexPair>, chain: Chain, address: &str) -> Option<DexPair> {
    let key = chain.dedup_key(address);
    pairs
        .into_iter()
        .filter(|pair| pair.trades_on(chain))
        .max_by(|a, b| {
            let a_base = chain.dedup_key(&a.base_token.address) == key;
            let b_base = chain.dedup_key(&b.base_token.address) == key;
            a_base
                .cmp(&b_base)
                .then(a.liquidity_usd().total_cmp(&b.liquidity_usd()))
        })
}

/// DexScreener-backed enrichment client.
pub struct DexScreenerClient {
    http_client: Client,
    base_url: String,
    retry_attempts: usize,
    limiter: DefaultDirectRateLimiter,
}

impl DexScreenerClient {
    pub fn new(http_client: Client, config: &EnrichmentConfig) -> Self {
        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry_attempts: config.retry_attempts,
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        }
    }

    /// Build an HTTP client with the configured per-request timeout.
    pub fn http_client(config: &EnrichmentConfig) -> Result<Client> {
        Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build enrichment HTTP client")
    }

    /// One request; `Ok(None)` means the provider knows no pairs for the token.
    async fn fetch_pairs(&self, address: &str) -> Result<Option<Vec<DexPair>>> {
        self.limiter.until_ready().await;

        let url = format!("{}/latest/dex/tokens/{}", self.base_url, address);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .context("DexScreener request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("DexScreener returned {}", response.status()));
        }

        let body: TokenPairsResponse = response
            .json()
            .await
            .context("Failed to parse DexScreener response")?;

        Ok(body.pairs.filter(|pairs| !pairs.is_empty()))
    }
}

#[async_trait]
impl EnrichmentSource for DexScreenerClient {
    #[instrument(skip(self))]
    async fn lookup(&self, chain: Chain, address: &str) -> Result<MarketSnapshot> {
        let retry_strategy = ExponentialBackoff::from_millis(RETRY_BASE_DELAY.as_millis() as u64)
            .max_delay(RETRY_MAX_DELAY)
            .take(self.retry_attempts);

        let pairs = Retry::spawn(retry_strategy, || self.fetch_pairs(address))
            .await?
            .ok_or_else(|| anyhow!("no trading pairs listed"))?;

        let pair = select_pair(pairs, chain, address)
            .ok_or_else(|| anyhow!("no {} pair found", chain))?;

        debug!("Selected {} pair on {}", pair.dex_id, pair.chain_id);
        Ok(pair.into_snapshot())
    }
}
