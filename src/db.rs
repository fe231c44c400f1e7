//! # db — SQLite Database Layer
//!
//! Pool construction, embedded migrations, pool seeding and the trade
//! bookkeeping shared by the manual-trade endpoint and the automated
//! executor.
//!
//! ## Setup
//! 1. Set `DATABASE_URL` in `.env` (defaults to `sqlite://papertrader.db`)
//! 2. Migrations run automatically at startup

use std::str::FromStr;

use anyhow::Context;
use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tracing::info;

use crate::config::DEFAULT_TICKER_POOL;
use crate::error::AppError;
use crate::models::{Holding, TickerPrice, Trade, TradeAction, Trader};

const MIGRATION_SQL: &str = include_str!("../migrations/001_init.sql");

/// Round a monetary amount to whole cents.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ─── Pool Init ────────────────────────────────────────────────────────────────

/// Open the pool and apply migrations.
pub async fn init_pool(database_url: &str) -> anyhow::Result<SqlitePool> {
    info!("Connecting to SQLite...");

    // An in-memory database exists per connection, so the pool must not
    // fan out across connections when one is used.
    let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

    let options = SqliteConnectOptions::from_str(database_url)
        .context("Invalid DATABASE_URL")?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect_with(options)
        .await
        .context("Failed to connect to SQLite")?;

    run_migrations(&pool).await?;

    info!("✅ SQLite connected and migrations applied");
    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    // SQLite prepares one statement at a time, so the embedded migration
    // file is executed statement by statement.
    for statement in MIGRATION_SQL.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Migration statement failed: {statement}"))?;
    }

    Ok(())
}

/// Seed `ticker_pool` with the built-in per-timezone lists when empty.
pub async fn seed_ticker_pool(pool: &SqlitePool) -> anyhow::Result<()> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ticker_pool")
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Ok(());
    }

    for &(ticker, name, exchange, timezone, sector, source) in DEFAULT_TICKER_POOL {
        sqlx::query(
            r#"
            INSERT INTO ticker_pool (ticker, name, exchange, timezone, sector, source, created_at, last_updated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticker, exchange) DO NOTHING
            "#,
        )
        .bind(ticker)
        .bind(name)
        .bind(exchange)
        .bind(timezone)
        .bind(sector)
        .bind(source)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(pool)
        .await?;
    }

    info!(tickers = DEFAULT_TICKER_POOL.len(), "🌱 Seeded ticker pool");
    Ok(())
}

// ─── Trader Lookup ────────────────────────────────────────────────────────────

pub async fn get_trader(pool: &SqlitePool, trader_id: i64) -> Result<Option<Trader>, AppError> {
    let trader = sqlx::query_as::<_, Trader>("SELECT * FROM traders WHERE id = ?")
        .bind(trader_id)
        .fetch_optional(pool)
        .await?;

    Ok(trader)
}

/// Fetch a trader or fail with 404.
pub async fn require_trader(pool: &SqlitePool, trader_id: i64) -> Result<Trader, AppError> {
    get_trader(pool, trader_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Trader {trader_id} not found")))
}

// ─── Portfolio Lookup ─────────────────────────────────────────────────────────

pub async fn portfolio_for(pool: &SqlitePool, trader_id: i64) -> Result<Vec<Holding>, AppError> {
    let holdings = sqlx::query_as::<_, Holding>(
        "SELECT * FROM portfolio WHERE trader_id = ? ORDER BY ticker",
    )
    .bind(trader_id)
    .fetch_all(pool)
    .await?;

    Ok(holdings)
}

/// Tickers a trader currently holds (quantity > 0).
pub async fn held_tickers(pool: &SqlitePool, trader_id: i64) -> Result<Vec<String>, AppError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT ticker FROM portfolio WHERE trader_id = ? AND quantity > 0 ORDER BY ticker",
    )
    .bind(trader_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(t,)| t).collect())
}

/// Distinct held tickers across every trader — the set the price-update task
/// refreshes.
pub async fn all_held_tickers(pool: &SqlitePool) -> Result<Vec<String>, AppError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT ticker FROM portfolio WHERE quantity > 0 ORDER BY ticker",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(t,)| t).collect())
}

// ─── Ticker Prices ────────────────────────────────────────────────────────────

pub async fn upsert_ticker_price(
    pool: &SqlitePool,
    ticker: &str,
    price: f64,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO ticker_prices (ticker, current_price, last_updated)
        VALUES (?, ?, ?)
        ON CONFLICT(ticker) DO UPDATE SET
            current_price = excluded.current_price,
            last_updated  = excluded.last_updated
        "#,
    )
    .bind(ticker)
    .bind(price)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn price_for(pool: &SqlitePool, ticker: &str) -> Result<Option<TickerPrice>, AppError> {
    let price = sqlx::query_as::<_, TickerPrice>("SELECT * FROM ticker_prices WHERE ticker = ?")
        .bind(ticker)
        .fetch_optional(pool)
        .await?;

    Ok(price)
}

// ─── Trade Execution ──────────────────────────────────────────────────────────

/// Indicator snapshot and decision metadata recorded alongside a trade.
#[derive(Debug, Clone, Default)]
pub struct TradeMeta {
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub recommendation: Option<String>,
    pub confidence: Option<f64>,
    pub notes: Option<String>,
}

/// Buy `quantity` shares of `ticker` at `price` for a trader.
///
/// Deducts cash, upserts the portfolio row (recomputing the average price)
/// and inserts the trade record, all in one transaction.  Fails with
/// `BadRequest` when the quantity is non-positive or cash is short.
pub async fn execute_buy(
    pool: &SqlitePool,
    trader_id: i64,
    ticker: &str,
    quantity: i64,
    price: f64,
    meta: TradeMeta,
) -> Result<Trade, AppError> {
    if quantity <= 0 {
        return Err(AppError::BadRequest("Quantity must be positive".into()));
    }

    let total_amount = round_cents(quantity as f64 * price);
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    let trader = sqlx::query_as::<_, Trader>("SELECT * FROM traders WHERE id = ?")
        .bind(trader_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Trader {trader_id} not found")))?;

    if trader.current_balance < total_amount {
        return Err(AppError::BadRequest(
            "Insufficient balance for this trade".into(),
        ));
    }

    let balance_after = round_cents(trader.current_balance - total_amount);

    sqlx::query("UPDATE traders SET current_balance = ?, last_trade_at = ? WHERE id = ?")
        .bind(balance_after)
        .bind(now)
        .bind(trader_id)
        .execute(&mut *tx)
        .await?;

    // ── Upsert the portfolio row ─────────────────────────────────────────────
    let existing = sqlx::query_as::<_, Holding>(
        "SELECT * FROM portfolio WHERE trader_id = ? AND ticker = ?",
    )
    .bind(trader_id)
    .bind(ticker)
    .fetch_optional(&mut *tx)
    .await?;

    match existing {
        Some(holding) => {
            let new_total_cost = round_cents(holding.total_cost + total_amount);
            let new_quantity = holding.quantity + quantity;
            let new_average = new_total_cost / new_quantity as f64;

            sqlx::query(
                r#"
                UPDATE portfolio
                SET quantity = ?, average_price = ?, total_cost = ?, last_updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(new_quantity)
            .bind(new_average)
            .bind(new_total_cost)
            .bind(now)
            .bind(holding.id)
            .execute(&mut *tx)
            .await?;
        }
        None => {
            sqlx::query(
                r#"
                INSERT INTO portfolio
                    (trader_id, ticker, quantity, average_price, total_cost,
                     first_purchased_at, last_updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(trader_id)
            .bind(ticker)
            .bind(quantity)
            .bind(price)
            .bind(total_amount)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
    }

    let trade = insert_trade(
        &mut tx,
        trader_id,
        ticker,
        TradeAction::Buy,
        quantity,
        price,
        total_amount,
        balance_after,
        &meta,
    )
    .await?;

    tx.commit().await?;
    Ok(trade)
}

/// Sell `quantity` shares of `ticker` at `price` for a trader.
///
/// Credits cash, shrinks the portfolio row (deleting it when the position is
/// fully closed) and inserts the trade record.  Fails with `BadRequest` when
/// the trader does not hold enough shares.
pub async fn execute_sell(
    pool: &SqlitePool,
    trader_id: i64,
    ticker: &str,
    quantity: i64,
    price: f64,
    meta: TradeMeta,
) -> Result<Trade, AppError> {
    if quantity <= 0 {
        return Err(AppError::BadRequest("Quantity must be positive".into()));
    }

    let total_amount = round_cents(quantity as f64 * price);
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    let trader = sqlx::query_as::<_, Trader>("SELECT * FROM traders WHERE id = ?")
        .bind(trader_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Trader {trader_id} not found")))?;

    let holding = sqlx::query_as::<_, Holding>(
        "SELECT * FROM portfolio WHERE trader_id = ? AND ticker = ?",
    )
    .bind(trader_id)
    .bind(ticker)
    .fetch_optional(&mut *tx)
    .await?;

    let holding = match holding {
        Some(h) if h.quantity >= quantity => h,
        _ => {
            return Err(AppError::BadRequest("Insufficient shares to sell".into()));
        }
    };

    let balance_after = round_cents(trader.current_balance + total_amount);

    sqlx::query("UPDATE traders SET current_balance = ?, last_trade_at = ? WHERE id = ?")
        .bind(balance_after)
        .bind(now)
        .bind(trader_id)
        .execute(&mut *tx)
        .await?;

    let remaining = holding.quantity - quantity;
    if remaining == 0 {
        sqlx::query("DELETE FROM portfolio WHERE id = ?")
            .bind(holding.id)
            .execute(&mut *tx)
            .await?;
    } else {
        // Cost basis shrinks at the average price; the average itself is
        // unchanged by a sale.
        let new_total_cost = round_cents(holding.total_cost - holding.average_price * quantity as f64);
        sqlx::query(
            "UPDATE portfolio SET quantity = ?, total_cost = ?, last_updated_at = ? WHERE id = ?",
        )
        .bind(remaining)
        .bind(new_total_cost)
        .bind(now)
        .bind(holding.id)
        .execute(&mut *tx)
        .await?;
    }

    let trade = insert_trade(
        &mut tx,
        trader_id,
        ticker,
        TradeAction::Sell,
        quantity,
        price,
        total_amount,
        balance_after,
        &meta,
    )
    .await?;

    tx.commit().await?;
    Ok(trade)
}

#[allow(clippy::too_many_arguments)]
async fn insert_trade(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    trader_id: i64,
    ticker: &str,
    action: TradeAction,
    quantity: i64,
    price: f64,
    total_amount: f64,
    balance_after: f64,
    meta: &TradeMeta,
) -> Result<Trade, AppError> {
    let now = Utc::now();

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO trades
            (trader_id, ticker, action, quantity, price, total_amount, balance_after,
             rsi, macd, sma_20, sma_50, recommendation, confidence, notes, executed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(trader_id)
    .bind(ticker)
    .bind(action)
    .bind(quantity)
    .bind(price)
    .bind(total_amount)
    .bind(balance_after)
    .bind(meta.rsi)
    .bind(meta.macd)
    .bind(meta.sma_20)
    .bind(meta.sma_50)
    .bind(meta.recommendation.as_deref())
    .bind(meta.confidence)
    .bind(meta.notes.as_deref())
    .bind(now)
    .fetch_one(&mut **tx)
    .await?;

    Ok(Trade {
        id,
        trader_id,
        ticker: ticker.to_string(),
        action,
        quantity,
        price,
        total_amount,
        balance_after,
        rsi: meta.rsi,
        macd: meta.macd,
        sma_20: meta.sma_20,
        sma_50: meta.sma_50,
        recommendation: meta.recommendation.clone(),
        confidence: meta.confidence,
        notes: meta.notes.clone(),
        executed_at: now,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;

    pub(crate) async fn test_pool() -> SqlitePool {
        init_pool("sqlite::memory:").await.unwrap()
    }

    pub(crate) async fn make_trader(pool: &SqlitePool, name: &str, balance: f64) -> i64 {
        sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO traders (name, initial_balance, current_balance, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(balance)
        .bind(balance)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
        .unwrap()
        .0
    }

    #[tokio::test]
    async fn buy_deducts_cash_and_opens_position() {
        let pool = test_pool().await;
        let id = make_trader(&pool, "Buyer", 10_000.0).await;

        let trade = execute_buy(&pool, id, "AAPL", 10, 150.0, TradeMeta::default())
            .await
            .unwrap();

        assert_eq!(trade.total_amount, 1500.0);
        assert_eq!(trade.balance_after, 8500.0);

        let trader = require_trader(&pool, id).await.unwrap();
        assert_relative_eq!(trader.current_balance, 8500.0);
        assert!(trader.last_trade_at.is_some());

        let holdings = portfolio_for(&pool, id).await.unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].quantity, 10);
        assert_relative_eq!(holdings[0].average_price, 150.0);
    }

    #[tokio::test]
    async fn repeat_buy_recomputes_average_price() {
        let pool = test_pool().await;
        let id = make_trader(&pool, "Averager", 10_000.0).await;

        execute_buy(&pool, id, "AAPL", 10, 100.0, TradeMeta::default())
            .await
            .unwrap();
        execute_buy(&pool, id, "AAPL", 10, 200.0, TradeMeta::default())
            .await
            .unwrap();

        let holdings = portfolio_for(&pool, id).await.unwrap();
        assert_eq!(holdings[0].quantity, 20);
        assert_relative_eq!(holdings[0].average_price, 150.0);
        assert_relative_eq!(holdings[0].total_cost, 3000.0);
    }

    #[tokio::test]
    async fn buy_rejects_insufficient_balance() {
        let pool = test_pool().await;
        let id = make_trader(&pool, "Broke", 100.0).await;

        let err = execute_buy(&pool, id, "AAPL", 10, 150.0, TradeMeta::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
        // Balance untouched
        let trader = require_trader(&pool, id).await.unwrap();
        assert_relative_eq!(trader.current_balance, 100.0);
    }

    #[tokio::test]
    async fn partial_sell_keeps_average_price() {
        let pool = test_pool().await;
        let id = make_trader(&pool, "Seller", 10_000.0).await;

        execute_buy(&pool, id, "AAPL", 10, 100.0, TradeMeta::default())
            .await
            .unwrap();
        let trade = execute_sell(&pool, id, "AAPL", 4, 120.0, TradeMeta::default())
            .await
            .unwrap();

        assert_relative_eq!(trade.total_amount, 480.0);

        let holdings = portfolio_for(&pool, id).await.unwrap();
        assert_eq!(holdings[0].quantity, 6);
        assert_relative_eq!(holdings[0].average_price, 100.0);
        assert_relative_eq!(holdings[0].total_cost, 600.0);

        let trader = require_trader(&pool, id).await.unwrap();
        assert_relative_eq!(trader.current_balance, 9000.0 + 480.0);
    }

    #[tokio::test]
    async fn full_sell_deletes_position() {
        let pool = test_pool().await;
        let id = make_trader(&pool, "Closer", 10_000.0).await;

        execute_buy(&pool, id, "AAPL", 5, 100.0, TradeMeta::default())
            .await
            .unwrap();
        execute_sell(&pool, id, "AAPL", 5, 110.0, TradeMeta::default())
            .await
            .unwrap();

        let holdings = portfolio_for(&pool, id).await.unwrap();
        assert!(holdings.is_empty());
    }

    #[tokio::test]
    async fn sell_rejects_unheld_shares() {
        let pool = test_pool().await;
        let id = make_trader(&pool, "Shortless", 10_000.0).await;

        let err = execute_sell(&pool, id, "AAPL", 1, 100.0, TradeMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        execute_buy(&pool, id, "AAPL", 2, 100.0, TradeMeta::default())
            .await
            .unwrap();
        let err = execute_sell(&pool, id, "AAPL", 3, 100.0, TradeMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn seed_is_idempotent() {
        let pool = test_pool().await;
        seed_ticker_pool(&pool).await.unwrap();
        seed_ticker_pool(&pool).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ticker_pool")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, crate::config::DEFAULT_TICKER_POOL.len() as i64);
    }

    #[tokio::test]
    async fn deleting_trader_cascades() {
        let pool = test_pool().await;
        let id = make_trader(&pool, "Doomed", 10_000.0).await;
        execute_buy(&pool, id, "AAPL", 5, 100.0, TradeMeta::default())
            .await
            .unwrap();

        sqlx::query("DELETE FROM traders WHERE id = ?")
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();

        let (trades,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trades")
            .fetch_one(&pool)
            .await
            .unwrap();
        let (positions,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM portfolio")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(trades, 0);
        assert_eq!(positions, 0);
    }

    #[test]
    fn round_cents_rounds_to_two_decimals() {
        assert_relative_eq!(round_cents(10.006), 10.01);
        assert_relative_eq!(round_cents(10.004), 10.0);
        assert_relative_eq!(round_cents(1499.999999), 1500.0);
    }
}
