//! Wallet balance provider.
//!
//! Reads the trading wallet's balance over Solana JSON-RPC. Errors
//! propagate to the engine, which responds by skipping entries for the
//! cycle instead of sizing positions against a stale or default value.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::WalletConfig;

const LAMPORTS_PER_SOL: Decimal = dec!(1000000000);

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Current wallet balance in SOL.
    async fn balance(&self) -> Result<Decimal>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<RpcResult>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResult {
    value: u64,
}

/// JSON-RPC `getBalance` client.
pub struct SolanaRpcWallet {
    http: Client,
    rpc_url: String,
    address: String,
}

impl SolanaRpcWallet {
    pub fn new(cfg: &WalletConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("Failed to build HTTP client for wallet RPC")?;

        Ok(Self {
            http,
            rpc_url: cfg.rpc_url.clone(),
            address: cfg.address.clone(),
        })
    }

    fn lamports_to_sol(lamports: u64) -> Decimal {
        Decimal::from(lamports) / LAMPORTS_PER_SOL
    }
}

#[async_trait]
impl BalanceSource for SolanaRpcWallet {
    async fn balance(&self) -> Result<Decimal> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getBalance",
            "params": [self.address],
        });

        let resp = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .context("Wallet RPC request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Wallet RPC error {status}");
        }

        let parsed: RpcResponse = resp
            .json()
            .await
            .context("Failed to parse wallet RPC response")?;

        if let Some(err) = parsed.error {
            anyhow::bail!("Wallet RPC returned error: {err}");
        }

        let lamports = parsed
            .result
            .context("Wallet RPC response missing result")?
            .value;

        let sol = Self::lamports_to_sol(lamports);
        debug!(wallet = %self.address, balance_sol = %sol, "Wallet balance read");
        Ok(sol)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
