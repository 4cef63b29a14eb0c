//! KESTREL — Autonomous Token Sniper Agent
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the token store, spawns the dashboard, and runs the main
//! fetch→filter→score→trade loop with graceful shutdown.

use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use kestrel::config::AppConfig;
use kestrel::dashboard::routes::DashboardState;
use kestrel::dashboard::spawn_dashboard;
use kestrel::dispatch::{TelegramNotifier, TradeDispatcher};
use kestrel::engine::StrategyEngine;
use kestrel::market::DexScreenerClient;
use kestrel::safety::SolsnifferClient;
use kestrel::store::TokenStore;
use kestrel::wallet::SolanaRpcWallet;

const BANNER: &str = r#"
 _  _______ ____ _____ ____  _____ _
| |/ / ____/ ___|_   _|  _ \| ____| |
| ' /|  _| \___ \ | | | |_) |  _| | |
| . \| |___ ___) || | |  _ <| |___| |___
|_|\_\_____|____/ |_| |_| \_\_____|_____|

  Keen-Eyed Sniper for Token Risk Evaluation & Liquidation
  v0.1.0 — Autonomous Agent
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML + environment overrides
    let cfg = AppConfig::load("config.toml")?;
    cfg.validate()?;

    // Initialise structured logging
    init_logging();

    // Required credentials; missing values abort startup.
    let bot_token = SecretString::new(AppConfig::resolve_env(&cfg.telegram.bot_token_env)?);
    let chat_id = AppConfig::resolve_env(&cfg.telegram.chat_id_env)?;
    let safety_key = SecretString::new(AppConfig::resolve_env(&cfg.safety.api_key_env)?);

    // Print startup banner
    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        poll_interval_secs = cfg.agent.poll_interval_secs,
        wallet = %cfg.wallet.address,
        executor = %cfg.telegram.executor_handle,
        "KESTREL starting up"
    );

    // -- Initialise components -------------------------------------------

    let store = TokenStore::open(&cfg.agent.database_path).await?;

    let market = DexScreenerClient::new(&cfg.market_data)?;
    let safety = SolsnifferClient::new(&cfg.safety, safety_key)?;
    let wallet = SolanaRpcWallet::new(&cfg.wallet)?;

    let notifier = TelegramNotifier::new(bot_token, chat_id)?;
    let dispatcher = Arc::new(TradeDispatcher::new(
        Box::new(notifier),
        store.clone(),
        cfg.telegram.executor_handle.clone(),
        cfg.trading.slippage_pct,
    ));

    let mut engine = StrategyEngine::new(
        Box::new(market),
        Box::new(safety),
        Box::new(wallet),
        Arc::clone(&dispatcher),
        store.clone(),
        cfg.filters.clone(),
        cfg.trading.clone(),
    );

    // -- Dashboard -------------------------------------------------------

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState {
            store: store.clone(),
            dispatcher: Arc::clone(&dispatcher),
            default_trade_amount: cfg.trading.default_trade_amount,
        });
        spawn_dashboard(state, cfg.dashboard.port)?;
    }

    // -- Main loop -------------------------------------------------------

    let poll_interval = Duration::from_secs(cfg.agent.poll_interval_secs);
    let mut interval = tokio::time::interval(poll_interval);
    // A slow cycle runs late instead of firing catch-up ticks back to back.
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.agent.poll_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                engine.run_cycle().await;
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!("KESTREL shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("kestrel=info"));

    let json_logging = std::env::var("KESTREL_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
