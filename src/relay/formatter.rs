//! Plain-text rendering of a published notification.

use crate::relay::enrichment::MarketSnapshot;
use crate::types::Candidate;
use chrono::{DateTime, Utc};

/// Longest excerpt of the original message carried in a notification.
pub const MAX_EXCERPT_CHARS: usize = 500;

const MISSING: &str = "n/a";

/// Compact USD amount: `$500`, `$1.5K`, `$2.35M`, `$1.20B`.
///
/// Unit thresholds sit at the point where the smaller unit would round up to
/// `1000`, so `999_999` renders as `$1.00M` rather than `$1000.0K`.
pub fn format_usd(value: f64) -> String {
    let abs = value.abs();
    if abs >= 999_995_000.0 {
        format!("${:.2}B", value / 1e9)
    } else if abs >= 999_950.0 {
        format!("${:.2}M", value / 1e6)
    } else if abs >= 999.5 {
        format!("${:.1}K", value / 1e3)
    } else {
        format!("${:.0}", value)
    }
}

/// Coarse age: `2d 3h`, `3h 12m`, `45m`, `<1m`.
pub fn format_age(age: chrono::Duration) -> String {
    let minutes = age.num_minutes();
    let (days, hours, mins) = (minutes / 1440, (minutes % 1440) / 60, minutes % 60);
    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else if mins > 0 {
        format!("{}m", mins)
    } else {
        "<1m".to_string()
    }
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(MAX_EXCERPT_CHARS).collect();
    cut.push('…');
    cut
}

/// Render the notification body for one enriched candidate.
pub fn format_notification(candidate: &Candidate, snapshot: &MarketSnapshot, now: DateTime<Utc>) -> String {
    let sender = candidate.sender_label.as_deref().unwrap_or("unknown");
    let market_cap = snapshot.market_cap.map(format_usd).unwrap_or_else(|| MISSING.to_string());
    let liquidity = snapshot.liquidity_usd.map(format_usd).unwrap_or_else(|| MISSING.to_string());
    let age = snapshot.pair_age(now).map(format_age).unwrap_or_else(|| MISSING.to_string());
    let price = snapshot
        .price_usd
        .as_deref()
        .map(|price| format!("${}", price))
        .unwrap_or_else(|| MISSING.to_string());

    let mut text = format!(
        "🔔 New {} call from {} in {}\n\n\
         🪙 {} (${})\n\
         🏦 DEX: {} ({})\n\
         💵 Price: {}\n\
         💰 Market cap: {}\n\
         💧 Liquidity: {}\n\
         ⏱ Pair age: {}\n\
         📈 Chart: {}\n\n\
         {}",
        candidate.chain,
        sender,
        candidate.source_label,
        snapshot.display_name,
        snapshot.symbol,
        snapshot.dex_id,
        snapshot.chain_id,
        price,
        market_cap,
        liquidity,
        age,
        snapshot.chart_url,
        candidate.address,
    );

    let excerpt = excerpt(&candidate.raw_text);
    if !excerpt.is_empty() {
        text.push_str("\n\n💬 ");
        text.push_str(&excerpt);
    }
    text
}
