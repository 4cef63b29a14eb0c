//! Trade dispatch.
//!
//! Formats trade commands and sends them to the external execution agent
//! over Telegram, then records the resulting trade in the store. A failed
//! send never creates a trade record: to the rest of the system a failed
//! dispatch looks like nothing happened, and the next qualifying cycle may
//! retry.
//!
//! The check→send→record sequence is serialized behind one async mutex
//! shared by the strategy loop and the manual-trade handler, which is what
//! enforces the one-open-position-per-address invariant.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::store::TokenStore;
use crate::types::{KestrelError, Trade, TradeSide};

// ---------------------------------------------------------------------------
// Command sink
// ---------------------------------------------------------------------------

/// Where formatted trade commands go. The execution agent reads free text;
/// success only means the message reached the channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Telegram Bot API sink addressed at the configured chat.
pub struct TelegramNotifier {
    http: Client,
    bot_token: SecretString,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: SecretString, chat_id: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client for Telegram")?;

        Ok(Self {
            http,
            bot_token,
            chat_id,
        })
    }
}

#[async_trait]
impl CommandSink for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.bot_token.expose_secret(),
        );
        let body = json!({
            "chat_id": self.chat_id,
            "text": text,
        });

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Telegram sendMessage request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Telegram sendMessage returned {status}");
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Shared dispatch path for the strategy loop and the dashboard's manual
/// trade handler.
pub struct TradeDispatcher {
    sink: Box<dyn CommandSink>,
    store: TokenStore,
    executor_handle: String,
    slippage_pct: Decimal,
    write_lock: Mutex<()>,
}

impl TradeDispatcher {
    pub fn new(
        sink: Box<dyn CommandSink>,
        store: TokenStore,
        executor_handle: String,
        slippage_pct: Decimal,
    ) -> Self {
        Self {
            sink,
            store,
            executor_handle,
            slippage_pct,
            write_lock: Mutex::new(()),
        }
    }

    /// Send one trade command and record it.
    ///
    /// Rejected without sending anything when:
    /// - `amount` is not positive,
    /// - `side` is Buy and the address already has an open position,
    /// - `side` is Sell and the address has no open position.
    ///
    /// On send failure the error is returned and no trade is recorded.
    pub async fn dispatch(
        &self,
        address: &str,
        side: TradeSide,
        amount: Decimal,
    ) -> Result<Trade> {
        if amount <= Decimal::ZERO {
            anyhow::bail!(KestrelError::Dispatch(format!(
                "refusing {side} for {address}: non-positive amount {amount}"
            )));
        }

        let _guard = self.write_lock.lock().await;

        let open = self.store.open_position_for(address).await?;
        match side {
            TradeSide::Buy if open.is_some() => {
                anyhow::bail!(KestrelError::Dispatch(format!(
                    "refusing Buy for {address}: position already open"
                )));
            }
            TradeSide::Sell if open.is_none() => {
                anyhow::bail!(KestrelError::Dispatch(format!(
                    "refusing Sell for {address}: no open position"
                )));
            }
            _ => {}
        }

        let command = self.format_command(side, amount, address);

        if let Err(e) = self.sink.send(&command).await {
            error!(token = %address, side = %side, error = %e, "Trade dispatch failed");
            return Err(e.context(format!("dispatch of {side} for {address} failed")));
        }

        // Price at dispatch: the most recently known snapshot price, 0 if
        // this address has never been observed.
        let price = self
            .store
            .snapshot_for(address)
            .await?
            .map(|snap| snap.price)
            .unwrap_or(Decimal::ZERO);

        let trade = self.store.append_trade(address, side, amount, price).await?;

        info!(
            trade_id = trade.id,
            token = %address,
            side = %side,
            amount = %amount,
            price = %price,
            "Trade dispatched and recorded"
        );

        Ok(trade)
    }

    fn format_command(&self, side: TradeSide, amount: Decimal, address: &str) -> String {
        format!(
            "{side} {amount} SOL of {address} (slippage {}%) via {}",
            self.slippage_pct, self.executor_handle,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenSnapshot;
    use rust_decimal_macros::dec;
    use std::sync::{Arc, Mutex as StdMutex};

    /// In-memory sink that records every command and can be told to fail.
    struct RecordingSink {
        sent: Arc<StdMutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl CommandSink for RecordingSink {
        async fn send(&self, text: &str) -> Result<()> {
            if self.fail {
                anyhow::bail!("sink offline");
            }
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    async fn dispatcher(fail: bool) -> (TradeDispatcher, Arc<StdMutex<Vec<String>>>, TokenStore) {
        let store = TokenStore::open_in_memory().await.unwrap();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let sink = RecordingSink {
            sent: Arc::clone(&sent),
            fail,
        };
        let dispatcher = TradeDispatcher::new(
            Box::new(sink),
            store.clone(),
            "@ToxiSolBot".into(),
            dec!(1),
        );
        (dispatcher, sent, store)
    }

    #[tokio::test]
    async fn test_buy_records_trade_with_snapshot_price() {
        let (dispatcher, sent, store) = dispatcher(false).await;
        let mut snap = TokenSnapshot::sample("ADDR-A", "TOK");
        snap.price = dec!(0.004);
        store.upsert_snapshots(&[snap]).await.unwrap();

        let trade = dispatcher
            .dispatch("ADDR-A", TradeSide::Buy, dec!(0.05))
            .await
            .unwrap();

        assert_eq!(trade.side, TradeSide::Buy);
        assert_eq!(trade.amount, dec!(0.05));
        assert_eq!(trade.price, dec!(0.004));
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_buy_unknown_price_records_zero() {
        let (dispatcher, _sent, _store) = dispatcher(false).await;
        let trade = dispatcher
            .dispatch("NEVER-SEEN", TradeSide::Buy, dec!(0.05))
            .await
            .unwrap();
        assert_eq!(trade.price, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_second_buy_rejected_while_open() {
        let (dispatcher, sent, _store) = dispatcher(false).await;
        dispatcher
            .dispatch("ADDR-A", TradeSide::Buy, dec!(0.05))
            .await
            .unwrap();

        let err = dispatcher
            .dispatch("ADDR-A", TradeSide::Buy, dec!(0.05))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("position already open"));
        assert_eq!(sent.lock().unwrap().len(), 1); // second command never sent
    }

    #[tokio::test]
    async fn test_sell_without_position_rejected() {
        let (dispatcher, sent, _store) = dispatcher(false).await;
        let err = dispatcher
            .dispatch("ADDR-A", TradeSide::Sell, dec!(0.05))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no open position"));
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_buy_then_sell_then_rebuy() {
        let (dispatcher, _sent, store) = dispatcher(false).await;
        dispatcher
            .dispatch("ADDR-A", TradeSide::Buy, dec!(0.05))
            .await
            .unwrap();
        dispatcher
            .dispatch("ADDR-A", TradeSide::Sell, dec!(0.05))
            .await
            .unwrap();
        // Position closed → a fresh Buy is allowed again
        dispatcher
            .dispatch("ADDR-A", TradeSide::Buy, dec!(0.02))
            .await
            .unwrap();

        let pos = store.open_position_for("ADDR-A").await.unwrap().unwrap();
        assert_eq!(pos.entry_amount, dec!(0.02));
    }

    #[tokio::test]
    async fn test_failed_send_records_nothing() {
        let (dispatcher, _sent, store) = dispatcher(true).await;
        let result = dispatcher
            .dispatch("ADDR-A", TradeSide::Buy, dec!(0.05))
            .await;

        assert!(result.is_err());
        assert!(store.latest_trade_for("ADDR-A").await.unwrap().is_none());
        assert!(store.open_position_for("ADDR-A").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_positive_amount_rejected() {
        let (dispatcher, sent, _store) = dispatcher(false).await;
        assert!(dispatcher
            .dispatch("ADDR-A", TradeSide::Buy, Decimal::ZERO)
            .await
            .is_err());
        assert!(dispatcher
            .dispatch("ADDR-A", TradeSide::Buy, dec!(-0.05))
            .await
            .is_err());
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_command_format() {
        let (dispatcher, sent, _store) = dispatcher(false).await;
        dispatcher
            .dispatch("4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R", TradeSide::Buy, dec!(0.05))
            .await
            .unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(
            sent[0],
            "Buy 0.05 SOL of 4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R (slippage 1%) via @ToxiSolBot"
        );
    }

    #[test]
    fn test_notifier_construction() {
        let notifier = TelegramNotifier::new(
            SecretString::new("123:abc".into()),
            "-100123".into(),
        );
        assert!(notifier.is_ok());
    }
}
