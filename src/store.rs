//! Persistence layer.
//!
//! The single source of truth shared by the strategy loop and the
//! dashboard: a SQLite database holding the latest token snapshots
//! (keyed by address, last-write-wins) and an append-only trade log.
//! One pool serves both the writer task and read-only request handlers;
//! snapshot overwrites happen inside a transaction so readers never see a
//! half-written cycle.
//!
//! Decimals and timestamps are stored as canonical text (sqlx's SQLite
//! driver has no native `Decimal` column type); the conversion lives
//! entirely at this boundary.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use crate::types::{OpenPosition, SafetyStatus, TokenSnapshot, Trade, TradeSide};

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Handle to the token/trade database. Cheap to clone; all clones share
/// the same pool.
#[derive(Clone)]
pub struct TokenStore {
    pool: SqlitePool,
}

impl TokenStore {
    /// Open (creating if missing) the database at `path` and ensure the
    /// schema exists.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database at {path}"))?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(path, "Token store opened");
        Ok(store)
    }

    /// In-memory store for tests. A single connection keeps the database
    /// alive for the pool's lifetime.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tokens (
                address         TEXT PRIMARY KEY,
                symbol          TEXT NOT NULL,
                price           TEXT NOT NULL,
                volume_24h      TEXT NOT NULL,
                liquidity       TEXT NOT NULL,
                price_change_1h TEXT NOT NULL,
                created_at      TEXT,
                safety_score    INTEGER NOT NULL DEFAULT 0,
                safety_status   TEXT NOT NULL DEFAULT 'Unknown',
                observed_at     TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create tokens table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                token_address TEXT NOT NULL,
                side          TEXT NOT NULL,
                amount        TEXT NOT NULL,
                price         TEXT NOT NULL,
                created_at    TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create trades table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_trades_token ON trades (token_address, id)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create trades index")?;

        Ok(())
    }

    // -- Snapshots -------------------------------------------------------

    /// Overwrite the stored snapshot for every address in `snapshots`,
    /// in one transaction. Addresses absent from the batch are untouched.
    pub async fn upsert_snapshots(&self, snapshots: &[TokenSnapshot]) -> Result<()> {
        if snapshots.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        for snap in snapshots {
            sqlx::query(
                r#"
                INSERT INTO tokens
                    (address, symbol, price, volume_24h, liquidity,
                     price_change_1h, created_at, safety_score, safety_status, observed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(address) DO UPDATE SET
                    symbol          = excluded.symbol,
                    price           = excluded.price,
                    volume_24h      = excluded.volume_24h,
                    liquidity       = excluded.liquidity,
                    price_change_1h = excluded.price_change_1h,
                    created_at      = excluded.created_at,
                    safety_score    = excluded.safety_score,
                    safety_status   = excluded.safety_status,
                    observed_at     = excluded.observed_at
                "#,
            )
            .bind(&snap.address)
            .bind(&snap.symbol)
            .bind(snap.price.to_string())
            .bind(snap.volume_24h.to_string())
            .bind(snap.liquidity.to_string())
            .bind(snap.price_change_1h.to_string())
            .bind(snap.created_at.map(|dt| dt.to_rfc3339()))
            .bind(snap.safety_score as i64)
            .bind(snap.safety_status.as_str())
            .bind(snap.observed_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert snapshot for {}", snap.address))?;
        }

        tx.commit().await.context("Failed to commit snapshot upsert")?;
        debug!(count = snapshots.len(), "Snapshots upserted");
        Ok(())
    }

    /// All current snapshots, most recently observed first.
    pub async fn all_snapshots(&self) -> Result<Vec<TokenSnapshot>> {
        let rows = sqlx::query("SELECT * FROM tokens ORDER BY observed_at DESC, address ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to read snapshots")?;

        rows.iter().map(row_to_snapshot).collect()
    }

    /// Latest snapshot for one address.
    pub async fn snapshot_for(&self, address: &str) -> Result<Option<TokenSnapshot>> {
        let row = sqlx::query("SELECT * FROM tokens WHERE address = ?1")
            .bind(address)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to read snapshot for {address}"))?;

        row.as_ref().map(row_to_snapshot).transpose()
    }

    // -- Trades ----------------------------------------------------------

    /// Append a trade record and return it with its assigned id.
    pub async fn append_trade(
        &self,
        token_address: &str,
        side: TradeSide,
        amount: Decimal,
        price: Decimal,
    ) -> Result<Trade> {
        let created_at = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO trades (token_address, side, amount, price, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(token_address)
        .bind(side.as_str())
        .bind(amount.to_string())
        .bind(price.to_string())
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to append trade for {token_address}"))?;

        Ok(Trade {
            id: result.last_insert_rowid(),
            token_address: token_address.to_string(),
            side,
            amount,
            price,
            created_at,
        })
    }

    /// Most recent trade for an address, if any.
    pub async fn latest_trade_for(&self, address: &str) -> Result<Option<Trade>> {
        let row = sqlx::query(
            "SELECT * FROM trades WHERE token_address = ?1 ORDER BY id DESC LIMIT 1",
        )
        .bind(address)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to read latest trade for {address}"))?;

        row.as_ref().map(row_to_trade).transpose()
    }

    /// Reconstruct the open position for an address from the trade log:
    /// open iff the most recent trade is a Buy.
    pub async fn open_position_for(&self, address: &str) -> Result<Option<OpenPosition>> {
        let latest = self.latest_trade_for(address).await?;
        Ok(latest.and_then(|trade| match trade.side {
            TradeSide::Buy => Some(OpenPosition {
                token_address: trade.token_address,
                entry_price: trade.price,
                entry_amount: trade.amount,
            }),
            TradeSide::Sell => None,
        }))
    }

    /// The `limit` most recent trades across all addresses, newest first.
    pub async fn recent_trades(&self, limit: i64) -> Result<Vec<Trade>> {
        let rows = sqlx::query("SELECT * FROM trades ORDER BY id DESC LIMIT ?1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Failed to read recent trades")?;

        rows.iter().map(row_to_trade).collect()
    }
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

fn parse_decimal(raw: &str, column: &str) -> Result<Decimal> {
    Decimal::from_str(raw).with_context(|| format!("Invalid decimal in column {column}: {raw}"))
}

fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp in column {column}: {raw}"))
}

fn row_to_snapshot(row: &SqliteRow) -> Result<TokenSnapshot> {
    let created_at: Option<String> = row.try_get("created_at")?;
    let score: i64 = row.try_get("safety_score")?;
    let status: String = row.try_get("safety_status")?;

    Ok(TokenSnapshot {
        address: row.try_get("address")?,
        symbol: row.try_get("symbol")?,
        price: parse_decimal(row.try_get("price")?, "price")?,
        volume_24h: parse_decimal(row.try_get("volume_24h")?, "volume_24h")?,
        liquidity: parse_decimal(row.try_get("liquidity")?, "liquidity")?,
        price_change_1h: parse_decimal(row.try_get("price_change_1h")?, "price_change_1h")?,
        created_at: created_at
            .map(|raw| parse_timestamp(&raw, "created_at"))
            .transpose()?,
        safety_score: score.clamp(0, 100) as u8,
        safety_status: SafetyStatus::from_str(&status)?,
        observed_at: parse_timestamp(row.try_get("observed_at")?, "observed_at")?,
    })
}

fn row_to_trade(row: &SqliteRow) -> Result<Trade> {
    let side: String = row.try_get("side")?;

    Ok(Trade {
        id: row.try_get("id")?,
        token_address: row.try_get("token_address")?,
        side: TradeSide::from_str(&side)?,
        amount: parse_decimal(row.try_get("amount")?, "amount")?,
        price: parse_decimal(row.try_get("price")?, "price")?,
        created_at: parse_timestamp(row.try_get("created_at")?, "created_at")?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
