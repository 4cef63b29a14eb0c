//! Dashboard API route handlers.
//!
//! Read endpoints return JSON straight from the store and degrade to empty
//! data when the store is unavailable. The manual trade endpoint shares
//! the strategy loop's dispatcher, so manual trades obey the same
//! position invariants as automatic ones.

use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::Redirect,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::dispatch::TradeDispatcher;
use crate::store::TokenStore;
use crate::types::{TokenSnapshot, Trade, TradeSide};

/// Trades shown on the dashboard's recent-trades panel.
const TRADE_HISTORY_LIMIT: i64 = 100;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub store: TokenStore,
    pub dispatcher: Arc<TradeDispatcher>,
    /// Fixed amount (SOL) used for manual Buy/Sell requests.
    pub default_trade_amount: Decimal,
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TradeForm {
    pub token_address: String,
    pub action: String,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/tokens: all current snapshots, newest observation first.
pub async fn get_tokens(State(state): State<AppState>) -> Json<Vec<TokenSnapshot>> {
    match state.store.all_snapshots().await {
        Ok(snapshots) => Json(snapshots),
        Err(e) => {
            warn!(error = %e, "Snapshot read failed, serving empty token list");
            Json(Vec::new())
        }
    }
}

/// GET /api/trades: the most recent trades, newest first.
pub async fn get_trades(State(state): State<AppState>) -> Json<Vec<Trade>> {
    match state.store.recent_trades(TRADE_HISTORY_LIMIT).await {
        Ok(trades) => Json(trades),
        Err(e) => {
            warn!(error = %e, "Trade read failed, serving empty trade list");
            Json(Vec::new())
        }
    }
}

/// POST /trade: manual Buy/Sell dispatch with the fixed default amount.
///
/// Always redirects back to the dashboard; failures are logged, not
/// rendered.
pub async fn post_trade(
    State(state): State<AppState>,
    Form(form): Form<TradeForm>,
) -> Redirect {
    match TradeSide::from_str(&form.action) {
        Ok(side) => {
            match state
                .dispatcher
                .dispatch(&form.token_address, side, state.default_trade_amount)
                .await
            {
                Ok(trade) => {
                    info!(trade_id = trade.id, token = %form.token_address, side = %side, "Manual trade dispatched");
                }
                Err(e) => {
                    warn!(token = %form.token_address, side = %side, error = %e, "Manual trade failed");
                }
            }
        }
        Err(_) => {
            warn!(action = %form.action, "Manual trade with unknown action ignored");
        }
    }

    Redirect::to("/")
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::MockCommandSink;
    use rust_decimal_macros::dec;

    async fn handler_state() -> AppState {
        let store = TokenStore::open_in_memory().await.unwrap();
        let mut sink = MockCommandSink::new();
        sink.expect_send().returning(|_| Ok(()));
        let dispatcher = Arc::new(TradeDispatcher::new(
            Box::new(sink),
            store.clone(),
            "@ToxiSolBot".into(),
            dec!(1),
        ));
        Arc::new(DashboardState {
            store,
            dispatcher,
            default_trade_amount: dec!(0.01),
        })
    }

    #[tokio::test]
    async fn test_get_tokens_empty() {
        let state = handler_state().await;
        let Json(tokens) = get_tokens(State(state)).await;
        assert!(tokens.is_empty());
    }

    #[tokio::test]
    async fn test_get_trades_empty() {
        let state = handler_state().await;
        let Json(trades) = get_trades(State(state)).await;
        assert!(trades.is_empty());
    }

    #[tokio::test]
    async fn test_post_trade_buy_then_sell() {
        let state = handler_state().await;

        post_trade(
            State(Arc::clone(&state)),
            Form(TradeForm {
                token_address: "ADDR-A".into(),
                action: "Buy".into(),
            }),
        )
        .await;
        assert!(state.store.open_position_for("ADDR-A").await.unwrap().is_some());

        post_trade(
            State(Arc::clone(&state)),
            Form(TradeForm {
                token_address: "ADDR-A".into(),
                action: "Sell".into(),
            }),
        )
        .await;
        assert!(state.store.open_position_for("ADDR-A").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_post_trade_action_case_insensitive() {
        let state = handler_state().await;
        post_trade(
            State(Arc::clone(&state)),
            Form(TradeForm {
                token_address: "ADDR-A".into(),
                action: "buy".into(),
            }),
        )
        .await;
        assert!(state.store.latest_trade_for("ADDR-A").await.unwrap().is_some());
    }
}
