//! Shared types for the KESTREL agent.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that market, engine,
//! and dashboard modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Exit thresholds
// ---------------------------------------------------------------------------

/// Take-profit trigger: exit when price reaches entry × 10.
pub const TAKE_PROFIT_MULTIPLIER: Decimal = dec!(10);

/// Stop-loss trigger: exit when price falls to entry × 0.8.
pub const STOP_LOSS_MULTIPLIER: Decimal = dec!(0.8);

/// On take-profit, sell 85% of the original entry amount.
pub const TAKE_PROFIT_SELL_FRACTION: Decimal = dec!(0.85);

// ---------------------------------------------------------------------------
// TokenSnapshot
// ---------------------------------------------------------------------------

/// A point-in-time observation of a tradable token.
///
/// Keyed by `address`; a new fetch overwrites the prior snapshot for the
/// same address. Only the latest observation is retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSnapshot {
    /// On-chain mint address; the primary key.
    pub address: String,
    pub symbol: String,
    /// Current price in USD.
    pub price: Decimal,
    /// Trailing 24-hour volume in USD.
    pub volume_24h: Decimal,
    /// Pooled liquidity in USD.
    pub liquidity: Decimal,
    /// 1-hour price change as reported by the feed. Carried for display;
    /// the filter compares `price` against the configured bound instead.
    pub price_change_1h: Decimal,
    /// Pair creation time, if the feed reported a parseable timestamp.
    pub created_at: Option<DateTime<Utc>>,
    /// Safety oracle score (0–100). 0 until scored.
    pub safety_score: u8,
    pub safety_status: SafetyStatus,
    pub observed_at: DateTime<Utc>,
}

impl fmt::Display for TokenSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) ${} | vol ${} | liq ${} | {} {}",
            self.symbol,
            self.address,
            self.price,
            self.volume_24h,
            self.liquidity,
            self.safety_score,
            self.safety_status,
        )
    }
}

impl TokenSnapshot {
    /// Age of the token pair relative to `now`, if the feed reported a
    /// creation time.
    pub fn age_hours(&self, now: DateTime<Utc>) -> Option<i64> {
        self.created_at.map(|c| (now - c).num_hours())
    }

    /// Helper to build a test candidate with sensible defaults.
    #[cfg(test)]
    pub fn sample(address: &str, symbol: &str) -> Self {
        TokenSnapshot {
            address: address.to_string(),
            symbol: symbol.to_string(),
            price: dec!(0.01),
            volume_24h: dec!(10000),
            liquidity: dec!(5000),
            price_change_1h: dec!(100),
            created_at: Some(Utc::now() - chrono::Duration::hours(48)),
            safety_score: 0,
            safety_status: SafetyStatus::Unknown,
            observed_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Verdict from the safety oracle.
///
/// Only `Good` may trigger an entry; `Unknown` covers every oracle failure
/// and is never tradable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SafetyStatus {
    Good,
    Bad,
    Unknown,
}

impl SafetyStatus {
    /// Stable text form used by the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyStatus::Good => "Good",
            SafetyStatus::Bad => "Bad",
            SafetyStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for SafetyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SafetyStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Good" => Ok(SafetyStatus::Good),
            "Bad" => Ok(SafetyStatus::Bad),
            "Unknown" => Ok(SafetyStatus::Unknown),
            _ => Err(anyhow::anyhow!("Unknown safety status: {s}")),
        }
    }
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "Buy",
            TradeSide::Sell => "Sell",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TradeSide {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(TradeSide::Buy),
            "sell" => Ok(TradeSide::Sell),
            _ => Err(anyhow::anyhow!("Unknown trade side: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

/// An immutable record of a dispatched buy or sell command.
///
/// Append-only: the id is assigned by the store at insert and a trade is
/// never updated or deleted afterwards. Trades may outlive the snapshot of
/// the token they reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub token_address: String,
    pub side: TradeSide,
    /// Amount in SOL committed by the command.
    pub amount: Decimal,
    /// Most recently known price at dispatch time; 0 if unknown.
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {} SOL of {} @ ${}",
            self.id, self.side, self.amount, self.token_address, self.price,
        )
    }
}

// ---------------------------------------------------------------------------
// OpenPosition
// ---------------------------------------------------------------------------

/// The current exposure on a token, reconstructed from the trade log.
///
/// An address has an open position iff its most recent trade is a Buy.
/// Not persisted as its own table; derived on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub token_address: String,
    pub entry_price: Decimal,
    pub entry_amount: Decimal,
}

impl OpenPosition {
    /// Price at which the take-profit exit triggers.
    pub fn take_profit_price(&self) -> Decimal {
        self.entry_price * TAKE_PROFIT_MULTIPLIER
    }

    /// Price at which the stop-loss exit triggers.
    pub fn stop_loss_price(&self) -> Decimal {
        self.entry_price * STOP_LOSS_MULTIPLIER
    }
}

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// Summary of a single fetch→filter→score→trade cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_number: u64,
    pub tokens_fetched: usize,
    pub tokens_filtered: usize,
    pub buys_dispatched: usize,
    pub sells_dispatched: usize,
    pub token_errors: usize,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cycle #{}: fetched={} filtered={} buys={} sells={} errors={}",
            self.cycle_number,
            self.tokens_fetched,
            self.tokens_filtered,
            self.buys_dispatched,
            self.sells_dispatched,
            self.token_errors,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for KESTREL.
#[derive(Debug, thiserror::Error)]
pub enum KestrelError {
    #[error("Transport error ({source_name}): {message}")]
    Transport { source_name: String, message: String },

    #[error("Data error: {0}")]
    Data(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Storage error: {0}")]
    Store(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- SafetyStatus tests --

    #[test]
    fn test_safety_status_display() {
        assert_eq!(format!("{}", SafetyStatus::Good), "Good");
        assert_eq!(format!("{}", SafetyStatus::Bad), "Bad");
        assert_eq!(format!("{}", SafetyStatus::Unknown), "Unknown");
    }

    #[test]
    fn test_safety_status_from_str_roundtrip() {
        for status in [SafetyStatus::Good, SafetyStatus::Bad, SafetyStatus::Unknown] {
            let parsed: SafetyStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("good".parse::<SafetyStatus>().is_err()); // case-sensitive
        assert!("nonsense".parse::<SafetyStatus>().is_err());
    }

    #[test]
    fn test_safety_status_serialization_roundtrip() {
        let json = serde_json::to_string(&SafetyStatus::Good).unwrap();
        assert_eq!(json, "\"Good\"");
        let parsed: SafetyStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, SafetyStatus::Good);
    }

    // -- TradeSide tests --

    #[test]
    fn test_trade_side_display() {
        assert_eq!(format!("{}", TradeSide::Buy), "Buy");
        assert_eq!(format!("{}", TradeSide::Sell), "Sell");
    }

    #[test]
    fn test_trade_side_from_str_case_insensitive() {
        assert_eq!("buy".parse::<TradeSide>().unwrap(), TradeSide::Buy);
        assert_eq!("SELL".parse::<TradeSide>().unwrap(), TradeSide::Sell);
        assert!("hold".parse::<TradeSide>().is_err());
    }

    // -- TokenSnapshot tests --

    #[test]
    fn test_snapshot_age_hours() {
        let mut snap = TokenSnapshot::sample("A", "TOK");
        snap.created_at = Some(Utc::now() - chrono::Duration::hours(48));
        let age = snap.age_hours(Utc::now()).unwrap();
        assert!((47..=48).contains(&age));
    }

    #[test]
    fn test_snapshot_age_unknown() {
        let mut snap = TokenSnapshot::sample("A", "TOK");
        snap.created_at = None;
        assert!(snap.age_hours(Utc::now()).is_none());
    }

    #[test]
    fn test_snapshot_serialization_roundtrip() {
        let snap = TokenSnapshot::sample("4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R", "TOKEN1");
        let json = serde_json::to_string(&snap).unwrap();
        let parsed: TokenSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.address, snap.address);
        assert_eq!(parsed.symbol, "TOKEN1");
        assert_eq!(parsed.safety_status, SafetyStatus::Unknown);
        assert_eq!(parsed.price, snap.price);
    }

    #[test]
    fn test_snapshot_display() {
        let snap = TokenSnapshot::sample("ADDR", "TOK");
        let display = format!("{snap}");
        assert!(display.contains("TOK"));
        assert!(display.contains("ADDR"));
    }

    // -- OpenPosition tests --

    #[test]
    fn test_take_profit_price_exact() {
        let pos = OpenPosition {
            token_address: "A".into(),
            entry_price: dec!(0.004),
            entry_amount: dec!(0.05),
        };
        assert_eq!(pos.take_profit_price(), dec!(0.04));
    }

    #[test]
    fn test_stop_loss_price_exact() {
        let pos = OpenPosition {
            token_address: "A".into(),
            entry_price: dec!(0.004),
            entry_amount: dec!(0.05),
        };
        assert_eq!(pos.stop_loss_price(), dec!(0.0032));
    }

    // -- Trade tests --

    #[test]
    fn test_trade_display() {
        let trade = Trade {
            id: 7,
            token_address: "ADDR".into(),
            side: TradeSide::Buy,
            amount: dec!(0.05),
            price: dec!(0.01),
            created_at: Utc::now(),
        };
        let display = format!("{trade}");
        assert!(display.contains("#7"));
        assert!(display.contains("Buy"));
        assert!(display.contains("ADDR"));
    }

    #[test]
    fn test_trade_serialization_roundtrip() {
        let trade = Trade {
            id: 1,
            token_address: "ADDR".into(),
            side: TradeSide::Sell,
            amount: dec!(0.1),
            price: dec!(0),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&trade).unwrap();
        let parsed: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, 1);
        assert_eq!(parsed.side, TradeSide::Sell);
    }

    // -- CycleReport tests --

    #[test]
    fn test_cycle_report_display() {
        let report = CycleReport {
            cycle_number: 42,
            tokens_fetched: 150,
            tokens_filtered: 5,
            buys_dispatched: 1,
            sells_dispatched: 2,
            token_errors: 0,
        };
        let display = format!("{report}");
        assert!(display.contains("#42"));
        assert!(display.contains("fetched=150"));
    }

    // -- KestrelError tests --

    #[test]
    fn test_error_display() {
        let e = KestrelError::Transport {
            source_name: "dexscreener".into(),
            message: "connection timeout".into(),
        };
        assert_eq!(
            format!("{e}"),
            "Transport error (dexscreener): connection timeout"
        );

        let e = KestrelError::Dispatch("telegram send failed".into());
        assert!(format!("{e}").contains("telegram send failed"));
    }
}
