//! Candidate filtering.
//!
//! Pure threshold checks over fetched snapshots: no network, no storage,
//! no clock reads. The evaluation instant is a parameter, so identical
//! inputs always produce identical output. Output preserves input order;
//! no ranking is applied.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::FilterConfig;
use crate::types::TokenSnapshot;

/// Apply all inclusion rules to a candidate set.
///
/// A candidate survives iff:
/// - its symbol is not blacklisted,
/// - 24h volume ≥ `min_volume_24h`,
/// - liquidity ≥ `min_liquidity`,
/// - price ≥ `min_price`,
/// - price ≤ `max_price_change_1h` (the config value is named for an
///   hourly percentage-change bound but is compared against the absolute
///   price; long-standing behavior, kept as-is),
/// - the pair is at least `min_age_hours` old. A pair without a creation
///   timestamp is treated as too young: an unknown age and a brand-new
///   listing are indistinguishable from here.
pub fn apply(
    candidates: Vec<TokenSnapshot>,
    cfg: &FilterConfig,
    now: DateTime<Utc>,
) -> Vec<TokenSnapshot> {
    let before = candidates.len();

    let kept: Vec<TokenSnapshot> = candidates
        .into_iter()
        .filter(|token| passes(token, cfg, now))
        .collect();

    debug!(before, after = kept.len(), "Candidates filtered");
    kept
}

fn passes(token: &TokenSnapshot, cfg: &FilterConfig, now: DateTime<Utc>) -> bool {
    if cfg.blacklist.iter().any(|sym| sym == &token.symbol) {
        return false;
    }
    if token.volume_24h < cfg.min_volume_24h {
        return false;
    }
    if token.liquidity < cfg.min_liquidity {
        return false;
    }
    if token.price < cfg.min_price {
        return false;
    }
    if token.price > cfg.max_price_change_1h {
        return false;
    }
    match token.age_hours(now) {
        Some(age) if age >= cfg.min_age_hours => true,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
