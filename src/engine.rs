//! Core engine — the fetch → filter → score → trade cycle.
//!
//! Owns the per-token position state machine: NoPosition → Open →
//! {ClosedTakeProfit, ClosedStopLoss}, with closed tokens free to reopen
//! later. One cycle runs to completion before the next starts; every
//! external call inside it may block past the poll interval and the loop
//! simply runs late rather than overlapping.
//!
//! Error policy: a failure while processing one token is logged and must
//! not abort the remaining tokens, the cycle, or the loop.

use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{FilterConfig, TradingConfig};
use crate::dispatch::TradeDispatcher;
use crate::filter;
use crate::market::MarketDataSource;
use crate::safety::{SafetyScorer, GOOD_SCORE_THRESHOLD};
use crate::store::TokenStore;
use crate::types::{
    CycleReport, SafetyStatus, TokenSnapshot, TradeSide, TAKE_PROFIT_SELL_FRACTION,
};
use crate::wallet::BalanceSource;

// ---------------------------------------------------------------------------
// Per-token outcome
// ---------------------------------------------------------------------------

/// What happened to one token during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenAction {
    /// Opened a new position.
    Entered,
    /// Closed via take-profit.
    ExitTakeProfit,
    /// Closed via stop-loss.
    ExitStopLoss,
    /// No trade this cycle.
    Held,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The trading decision engine. Constructed once at startup; `run_cycle`
/// is invoked on the poll interval by the main loop.
pub struct StrategyEngine {
    market: Box<dyn MarketDataSource>,
    safety: Box<dyn SafetyScorer>,
    wallet: Box<dyn BalanceSource>,
    dispatcher: Arc<TradeDispatcher>,
    store: TokenStore,
    filters: FilterConfig,
    trading: TradingConfig,
    cycle_count: u64,
}

impl StrategyEngine {
    pub fn new(
        market: Box<dyn MarketDataSource>,
        safety: Box<dyn SafetyScorer>,
        wallet: Box<dyn BalanceSource>,
        dispatcher: Arc<TradeDispatcher>,
        store: TokenStore,
        filters: FilterConfig,
        trading: TradingConfig,
    ) -> Self {
        Self {
            market,
            safety,
            wallet,
            dispatcher,
            store,
            filters,
            trading,
            cycle_count: 0,
        }
    }

    /// Run one full cycle. Never returns an error: every failure inside is
    /// downgraded to a log line so the loop survives indefinitely.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle_count += 1;
        let mut report = CycleReport {
            cycle_number: self.cycle_count,
            ..CycleReport::default()
        };

        info!(cycle = self.cycle_count, "Starting cycle");

        // 1. Fetch. No data is a normal, retryable outcome.
        let candidates = match self.market.fetch_pairs().await {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!(error = %e, "Market data fetch failed, continuing with empty set");
                Vec::new()
            }
        };
        report.tokens_fetched = candidates.len();

        // 2. Filter.
        let mut filtered = filter::apply(candidates, &self.filters, Utc::now());
        report.tokens_filtered = filtered.len();

        // 3. Wallet balance, read once per cycle. Unavailable balance
        //    disables entries; exits still run.
        let balance = if filtered.is_empty() {
            None
        } else {
            match self.wallet.balance().await {
                Ok(b) => Some(b),
                Err(e) => {
                    warn!(error = %e, "Wallet balance unavailable, entries disabled this cycle");
                    None
                }
            }
        };

        // 4. Score and trade, token by token.
        for snap in filtered.iter_mut() {
            match self.process_token(snap, balance).await {
                Ok(TokenAction::Entered) => report.buys_dispatched += 1,
                Ok(TokenAction::ExitTakeProfit) | Ok(TokenAction::ExitStopLoss) => {
                    report.sells_dispatched += 1;
                }
                Ok(TokenAction::Held) => {}
                Err(e) => {
                    error!(token = %snap.address, error = %e, "Token processing failed, continuing");
                    report.token_errors += 1;
                }
            }
        }

        // 5. Persist the scored snapshot set regardless of trades. A write
        //    failure skips this cycle's persist; existing rows are intact.
        if let Err(e) = self.store.upsert_snapshots(&filtered).await {
            error!(error = %e, "Snapshot persist failed, skipping this cycle's write");
        }

        info!(
            cycle = report.cycle_number,
            fetched = report.tokens_fetched,
            filtered = report.tokens_filtered,
            buys = report.buys_dispatched,
            sells = report.sells_dispatched,
            errors = report.token_errors,
            "Cycle complete"
        );

        report
    }

    /// Score one token, persist its snapshot, then run the entry or exit
    /// rule for it. The snapshot goes in first so any trade dispatched
    /// below records this observation as its price-at-dispatch.
    async fn process_token(
        &self,
        snap: &mut TokenSnapshot,
        balance: Option<Decimal>,
    ) -> Result<TokenAction> {
        let safety = self.safety.score(&snap.address).await;
        snap.safety_score = safety.score;
        snap.safety_status = safety.status;

        self.store
            .upsert_snapshots(std::slice::from_ref(snap))
            .await?;

        match self.store.open_position_for(&snap.address).await? {
            None => self.try_enter(snap, balance).await,
            Some(position) => {
                // Take-profit first; the two conditions are mutually
                // exclusive within a cycle.
                if snap.price >= position.take_profit_price() {
                    let amount = position.entry_amount * TAKE_PROFIT_SELL_FRACTION;
                    self.dispatcher
                        .dispatch(&snap.address, TradeSide::Sell, amount)
                        .await?;
                    info!(
                        token = %snap.address,
                        entry = %position.entry_price,
                        price = %snap.price,
                        "Take-profit exit"
                    );
                    Ok(TokenAction::ExitTakeProfit)
                } else if snap.price <= position.stop_loss_price() {
                    self.dispatcher
                        .dispatch(&snap.address, TradeSide::Sell, position.entry_amount)
                        .await?;
                    info!(
                        token = %snap.address,
                        entry = %position.entry_price,
                        price = %snap.price,
                        "Stop-loss exit"
                    );
                    Ok(TokenAction::ExitStopLoss)
                } else {
                    Ok(TokenAction::Held)
                }
            }
        }
    }

    async fn try_enter(
        &self,
        snap: &TokenSnapshot,
        balance: Option<Decimal>,
    ) -> Result<TokenAction> {
        if snap.safety_status != SafetyStatus::Good || snap.safety_score < GOOD_SCORE_THRESHOLD {
            return Ok(TokenAction::Held);
        }

        let Some(balance) = balance else {
            debug!(token = %snap.address, "Entry candidate skipped: no balance this cycle");
            return Ok(TokenAction::Held);
        };

        let amount = self.entry_amount(balance);
        if amount <= Decimal::ZERO {
            debug!(token = %snap.address, balance = %balance, "Entry candidate skipped: zero-sized entry");
            return Ok(TokenAction::Held);
        }

        self.dispatcher
            .dispatch(&snap.address, TradeSide::Buy, amount)
            .await?;
        info!(
            token = %snap.address,
            score = snap.safety_score,
            amount = %amount,
            price = %snap.price,
            "Position opened"
        );
        Ok(TokenAction::Entered)
    }

    /// Entry size: a fraction of the balance, capped at an absolute
    /// ceiling.
    fn entry_amount(&self, balance: Decimal) -> Decimal {
        (balance * self.trading.balance_fraction).min(self.trading.max_position)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
