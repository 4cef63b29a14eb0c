//! Market data client.
//!
//! Fetches raw token pair listings from a DexScreener-compatible endpoint
//! and converts them into [`TokenSnapshot`] candidates. No filtering or
//! validation happens here beyond type coercion: numeric fields arrive as
//! strings or numbers depending on the feed and coerce to 0 when missing or
//! malformed. Transport errors propagate; the engine treats them as an
//! empty candidate set.
//!
//! Response shape (only the fields we need):
//! `{"pairs":[{"baseToken":{"address","symbol"},"priceUsd","volume":{"h24"},
//!   "liquidity":{"usd"},"priceChange":{"h1"},"createdAt"}]}`

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use tracing::{debug, info};

use crate::config::MarketDataConfig;
use crate::types::{SafetyStatus, TokenSnapshot};

const SOURCE_NAME: &str = "dexscreener";

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Abstraction over the pair-listing feed, the seam the engine mocks in
/// tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch all currently listed pairs as snapshot candidates.
    async fn fetch_pairs(&self) -> Result<Vec<TokenSnapshot>>;
}

// ---------------------------------------------------------------------------
// API response types (feed JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PairsResponse {
    #[serde(default)]
    pairs: Vec<PairEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairEntry {
    #[serde(default)]
    base_token: BaseToken,
    /// Arrives as a string on the live feed, as a number on some mirrors.
    #[serde(default)]
    price_usd: serde_json::Value,
    #[serde(default)]
    volume: VolumeBlock,
    #[serde(default)]
    liquidity: LiquidityBlock,
    #[serde(default)]
    price_change: PriceChangeBlock,
    /// ISO-8601, `Z`-suffixed. Absent or unparseable → no age known.
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BaseToken {
    #[serde(default)]
    address: String,
    #[serde(default)]
    symbol: String,
}

#[derive(Debug, Default, Deserialize)]
struct VolumeBlock {
    #[serde(default)]
    h24: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct LiquidityBlock {
    #[serde(default)]
    usd: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct PriceChangeBlock {
    #[serde(default)]
    h1: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Coercion helpers
// ---------------------------------------------------------------------------

/// Coerce a JSON value (string, number, or anything else) to a `Decimal`,
/// defaulting to 0 on missing or malformed input.
fn decimal_or_zero(value: &serde_json::Value) -> Decimal {
    match value {
        serde_json::Value::String(s) => Decimal::from_str(s.trim()).unwrap_or_default(),
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).unwrap_or_default(),
        _ => Decimal::ZERO,
    }
}

fn parse_created_at(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the pair-listing endpoint.
pub struct DexScreenerClient {
    http: Client,
    endpoint: String,
}

impl DexScreenerClient {
    pub fn new(cfg: &MarketDataConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .user_agent("KESTREL/0.1.0 (token-sniper-agent)")
            .build()
            .context("Failed to build HTTP client for market data")?;

        Ok(Self {
            http,
            endpoint: cfg.endpoint.clone(),
        })
    }

    /// Convert one feed entry to a snapshot candidate. Safety fields start
    /// at their defaults; the scorer fills them in later.
    fn to_snapshot(entry: &PairEntry, observed_at: DateTime<Utc>) -> TokenSnapshot {
        TokenSnapshot {
            address: entry.base_token.address.clone(),
            symbol: entry.base_token.symbol.clone(),
            price: decimal_or_zero(&entry.price_usd),
            volume_24h: decimal_or_zero(&entry.volume.h24),
            liquidity: decimal_or_zero(&entry.liquidity.usd),
            price_change_1h: decimal_or_zero(&entry.price_change.h1),
            created_at: parse_created_at(entry.created_at.as_deref()),
            safety_score: 0,
            safety_status: SafetyStatus::Unknown,
            observed_at,
        }
    }
}

#[async_trait]
impl MarketDataSource for DexScreenerClient {
    async fn fetch_pairs(&self) -> Result<Vec<TokenSnapshot>> {
        debug!(endpoint = %self.endpoint, "Fetching token pairs");

        let resp = self
            .http
            .get(&self.endpoint)
            .send()
            .await
            .with_context(|| format!("{SOURCE_NAME} request failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("{SOURCE_NAME} API error {status}");
        }

        let parsed: PairsResponse = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse {SOURCE_NAME} response"))?;

        let observed_at = Utc::now();
        let snapshots: Vec<TokenSnapshot> = parsed
            .pairs
            .iter()
            .map(|entry| Self::to_snapshot(entry, observed_at))
            .collect();

        info!(count = snapshots.len(), "Token pairs fetched");
        Ok(snapshots)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
