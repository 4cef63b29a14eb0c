//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Process-environment overrides (`KESTREL_*`) take precedence over file
//! values. Secrets (API keys, bot tokens) are referenced by env-var name in
//! the config and resolved at runtime via `std::env::var`; the file holds
//! only the variable names.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    pub poll_interval_secs: u64,
    /// SQLite database path shared by the engine and the dashboard.
    pub database_path: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "KESTREL-001".into(),
            poll_interval_secs: 300,
            database_path: "kestrel.db".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MarketDataConfig {
    /// Pair-listing endpoint, DexScreener-compatible response shape.
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.dexscreener.com/latest/dex/search?q=SOL".into(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SafetyConfig {
    pub base_url: String,
    /// Env var holding the bearer token for the safety oracle.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.solsniffer.com/v1/token".into(),
            api_key_env: "SOLSNIFFER_API_KEY".into(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token_env: String,
    pub chat_id_env: String,
    /// Handle of the execution agent addressed in command messages.
    pub executor_handle: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token_env: "TELEGRAM_NOTIFICATION_BOT_TOKEN".into(),
            chat_id_env: "TELEGRAM_NOTIFICATION_CHAT_ID".into(),
            executor_handle: "@ToxiSolBot".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WalletConfig {
    pub rpc_url: String,
    /// Public key of the trading wallet. Required at startup.
    pub address: String,
    pub timeout_secs: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".into(),
            address: String::new(),
            timeout_secs: 10,
        }
    }
}

/// Candidate inclusion thresholds. See `filter::apply` for the rules.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    pub min_volume_24h: Decimal,
    pub min_liquidity: Decimal,
    pub min_price: Decimal,
    /// Upper bound compared against the absolute price, despite the name.
    /// See `filter::apply`.
    pub max_price_change_1h: Decimal,
    pub min_age_hours: i64,
    /// Symbols never traded, exact match.
    pub blacklist: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_volume_24h: dec!(10000),
            min_liquidity: dec!(5000),
            min_price: dec!(0.0001),
            max_price_change_1h: dec!(500),
            min_age_hours: 24,
            blacklist: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TradingConfig {
    /// Fraction of the wallet balance committed per entry.
    pub balance_fraction: Decimal,
    /// Absolute ceiling on a single entry, in SOL.
    pub max_position: Decimal,
    /// Slippage tolerance quoted in the command message, percent.
    pub slippage_pct: Decimal,
    /// Fixed amount used by manual dashboard trades, in SOL.
    pub default_trade_amount: Decimal,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            balance_fraction: dec!(0.05),
            max_position: dec!(0.1),
            slippage_pct: dec!(1),
            default_trade_amount: dec!(0.01),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 10000,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, then apply `KESTREL_*`
    /// environment overrides. A missing file is not an error; defaults
    /// plus environment are enough to run.
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {path}"))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {path}"))?
        } else {
            info!(path, "No config file found, using defaults");
            AppConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Environment variables take precedence over file values.
    fn apply_env_overrides(&mut self) {
        env_override("KESTREL_POLL_INTERVAL_SECS", &mut self.agent.poll_interval_secs);
        env_override("KESTREL_MARKET_ENDPOINT", &mut self.market_data.endpoint);
        env_override("KESTREL_SAFETY_BASE_URL", &mut self.safety.base_url);
        env_override("KESTREL_EXECUTOR_HANDLE", &mut self.telegram.executor_handle);
        env_override("KESTREL_WALLET_RPC_URL", &mut self.wallet.rpc_url);
        env_override("KESTREL_WALLET_ADDRESS", &mut self.wallet.address);
        env_override("KESTREL_MIN_VOLUME_24H", &mut self.filters.min_volume_24h);
        env_override("KESTREL_MIN_LIQUIDITY", &mut self.filters.min_liquidity);
        env_override("KESTREL_MIN_PRICE", &mut self.filters.min_price);
        env_override("KESTREL_MAX_PRICE_CHANGE_1H", &mut self.filters.max_price_change_1h);
        env_override("KESTREL_MIN_AGE_HOURS", &mut self.filters.min_age_hours);
        env_override("KESTREL_DASHBOARD_PORT", &mut self.dashboard.port);
        env_override("KESTREL_DATABASE_PATH", &mut self.agent.database_path);
    }

    /// Startup validation of required identity fields. Credentials resolved
    /// via [`AppConfig::resolve_env`] fail at their resolution site; this
    /// covers the plain-value requirements.
    pub fn validate(&self) -> Result<()> {
        if self.wallet.address.trim().is_empty() {
            anyhow::bail!("wallet.address is required (or set KESTREL_WALLET_ADDRESS)");
        }
        Ok(())
    }
}

/// Overwrite `slot` with the parsed value of `var` when it is set and parses.
fn env_override<T: FromStr>(var: &str, slot: &mut T) {
    if let Ok(raw) = std::env::var(var) {
        if let Ok(value) = raw.parse::<T>() {
            *slot = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.poll_interval_secs, 300);
        assert_eq!(cfg.filters.min_volume_24h, dec!(10000));
        assert_eq!(cfg.filters.min_age_hours, 24);
        assert_eq!(cfg.trading.balance_fraction, dec!(0.05));
        assert_eq!(cfg.trading.max_position, dec!(0.1));
        assert_eq!(cfg.market_data.timeout_secs, 10);
        assert!(cfg.dashboard.enabled);
    }

    #[test]
    fn test_parse_partial_toml() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [agent]
            name = "KESTREL-TEST"
            poll_interval_secs = 60

            [filters]
            min_liquidity = 2500.0
            blacklist = ["SCAM", "RUG"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.agent.name, "KESTREL-TEST");
        assert_eq!(cfg.agent.poll_interval_secs, 60);
        assert_eq!(cfg.filters.min_liquidity, dec!(2500));
        assert_eq!(cfg.filters.blacklist, vec!["SCAM", "RUG"]);
        // Untouched sections keep defaults
        assert_eq!(cfg.trading.max_position, dec!(0.1));
        assert_eq!(cfg.telegram.executor_handle, "@ToxiSolBot");
    }

    #[test]
    fn test_validate_requires_wallet_address() {
        let mut cfg = AppConfig::default();
        assert!(cfg.validate().is_err());
        cfg.wallet.address = "956FpaMnWhqK91NtD4xbjwTvCbcXWHpPSCDmXb9WoMq".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_resolve_env_missing() {
        assert!(AppConfig::resolve_env("KESTREL_TEST_DOES_NOT_EXIST_XYZ").is_err());
    }

    #[test]
    fn test_env_override_parses() {
        std::env::set_var("KESTREL_TEST_OVERRIDE_U64", "42");
        let mut slot: u64 = 7;
        env_override("KESTREL_TEST_OVERRIDE_U64", &mut slot);
        assert_eq!(slot, 42);
        std::env::remove_var("KESTREL_TEST_OVERRIDE_U64");
    }

    #[test]
    fn test_env_override_ignores_unparseable() {
        std::env::set_var("KESTREL_TEST_OVERRIDE_BAD", "not-a-number");
        let mut slot: u64 = 7;
        env_override("KESTREL_TEST_OVERRIDE_BAD", &mut slot);
        assert_eq!(slot, 7);
        std::env::remove_var("KESTREL_TEST_OVERRIDE_BAD");
    }
}
