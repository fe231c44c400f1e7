//! # engine::watchlist
//!
//! Assembles the set of tickers a trader evaluates in one session:
//!
//! 1. **Portfolio first** — every held position is always analyzed
//! 2. **Custom watchlist** — a random sample, when the trader opted in
//! 3. **Timezone pool**   — otherwise a random discovery sample from
//!    `ticker_pool`, with the picks recorded in `ticker_rotation`

use chrono::Utc;
use rand::seq::SliceRandom;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db;
use crate::error::AppError;
use crate::models::{PoolTicker, RotationRecord, Trader};

// ─── Session Watchlist ────────────────────────────────────────────────────────

/// Tickers this trader should analyze right now: held positions plus a
/// discovery sample.
pub async fn session_watchlist(pool: &SqlitePool, trader: &Trader) -> Result<Vec<String>, AppError> {
    let held = db::held_tickers(pool, trader.id).await?;
    info!(trader = %trader.name, holdings = held.len(), "Building session watchlist");

    let discovery_limit = if trader.watchlist_size > 0 {
        trader.watchlist_size as usize
    } else {
        6
    };

    let discovery = if trader.use_custom_watchlist && !trader.custom_watchlist_symbols().is_empty()
    {
        let custom = trader.custom_watchlist_symbols();
        info!(trader = %trader.name, tickers = custom.len(), "Using custom watchlist");

        let mut available: Vec<String> =
            custom.into_iter().filter(|t| !held.contains(t)).collect();
        // ThreadRng is !Send; keep it out of scope across the awaits below.
        {
            let mut rng = rand::thread_rng();
            available.shuffle(&mut rng);
        }
        available.truncate(discovery_limit);
        available
    } else {
        info!(trader = %trader.name, timezone = %trader.trading_timezone, "Using timezone ticker pool");
        discovery_from_pool(pool, trader.id, &trader.trading_timezone, discovery_limit, &held)
            .await?
    };

    // Portfolio first, then discovery, no duplicates.
    let mut final_tickers = held.clone();
    for ticker in discovery {
        if !final_tickers.contains(&ticker) {
            final_tickers.push(ticker);
        }
    }

    info!(
        trader = %trader.name,
        total = final_tickers.len(),
        portfolio = held.len(),
        "Session watchlist ready"
    );

    Ok(final_tickers)
}

/// Random sample from the active pool for a timezone, excluding held tickers.
/// Selected tickers are recorded for rotation tracking.
async fn discovery_from_pool(
    pool: &SqlitePool,
    trader_id: i64,
    timezone: &str,
    limit: usize,
    exclude: &[String],
) -> Result<Vec<String>, AppError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT ticker FROM ticker_pool WHERE timezone = ? AND is_active = 1",
    )
    .bind(timezone)
    .fetch_all(pool)
    .await?;

    let mut available: Vec<String> = rows
        .into_iter()
        .map(|(t,)| t)
        .filter(|t| !exclude.contains(t))
        .collect();

    if available.is_empty() {
        warn!(timezone, "No tickers available in pool");
        return Ok(Vec::new());
    }

    {
        let mut rng = rand::thread_rng();
        available.shuffle(&mut rng);
    }
    available.truncate(limit);

    track_rotation(pool, Some(trader_id), timezone, &available).await?;

    Ok(available)
}

/// Upsert rotation records for the tickers just sampled.
pub async fn track_rotation(
    pool: &SqlitePool,
    trader_id: Option<i64>,
    timezone: &str,
    tickers: &[String],
) -> Result<(), AppError> {
    for ticker in tickers {
        sqlx::query(
            r#"
            INSERT INTO ticker_rotation (ticker, timezone, trader_id, last_analyzed_at, analysis_count)
            VALUES (?, ?, ?, ?, 1)
            ON CONFLICT(ticker, timezone, trader_id) DO UPDATE SET
                last_analyzed_at = excluded.last_analyzed_at,
                analysis_count   = analysis_count + 1
            "#,
        )
        .bind(ticker)
        .bind(timezone)
        .bind(trader_id)
        .bind(Utc::now())
        .execute(pool)
        .await?;
    }

    Ok(())
}

// ─── Custom Watchlist Management ──────────────────────────────────────────────

/// Store a normalized (trimmed, uppercased, deduplicated) custom watchlist
/// and switch the trader over to it.
pub async fn set_custom_watchlist(
    pool: &SqlitePool,
    trader_id: i64,
    tickers: &[String],
) -> Result<Vec<String>, AppError> {
    let mut normalized: Vec<String> = Vec::new();
    for raw in tickers {
        let ticker = raw.trim().to_uppercase();
        if !ticker.is_empty() && !normalized.contains(&ticker) {
            normalized.push(ticker);
        }
    }

    if normalized.is_empty() {
        return Err(AppError::BadRequest(
            "Watchlist must contain at least one ticker".into(),
        ));
    }

    let json = serde_json::to_string(&normalized)
        .map_err(|e| AppError::Internal(e.into()))?;

    sqlx::query(
        "UPDATE traders SET custom_watchlist = ?, use_custom_watchlist = 1 WHERE id = ?",
    )
    .bind(json)
    .bind(trader_id)
    .execute(pool)
    .await?;

    info!(trader_id, tickers = normalized.len(), "Set custom watchlist");
    Ok(normalized)
}

/// Clear the custom watchlist and revert to the timezone pool.
pub async fn clear_custom_watchlist(pool: &SqlitePool, trader_id: i64) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE traders SET custom_watchlist = NULL, use_custom_watchlist = 0 WHERE id = ?",
    )
    .bind(trader_id)
    .execute(pool)
    .await?;

    info!(trader_id, "Cleared custom watchlist");
    Ok(())
}

// ─── Views ────────────────────────────────────────────────────────────────────

/// The pool a trader draws discovery tickers from: its custom list (resolved
/// against `ticker_pool`) or the active rows for its timezone.
pub async fn effective_pool(pool: &SqlitePool, trader: &Trader) -> Result<Vec<PoolTicker>, AppError> {
    let custom = trader.custom_watchlist_symbols();

    let rows = if trader.use_custom_watchlist && !custom.is_empty() {
        let all = sqlx::query_as::<_, PoolTicker>("SELECT * FROM ticker_pool ORDER BY ticker")
            .fetch_all(pool)
            .await?;
        all.into_iter().filter(|t| custom.contains(&t.ticker)).collect()
    } else {
        sqlx::query_as::<_, PoolTicker>(
            "SELECT * FROM ticker_pool WHERE timezone = ? AND is_active = 1 ORDER BY ticker",
        )
        .bind(&trader.trading_timezone)
        .fetch_all(pool)
        .await?
    };

    Ok(rows)
}

/// Recent rotation records for a trader.
pub async fn rotation_history(
    pool: &SqlitePool,
    trader_id: i64,
    limit: i64,
) -> Result<Vec<RotationRecord>, AppError> {
    let records = sqlx::query_as::<_, RotationRecord>(
        r#"
        SELECT * FROM ticker_rotation
        WHERE trader_id = ?
        ORDER BY last_analyzed_at DESC
        LIMIT ?
        "#,
    )
    .bind(trader_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{make_trader, test_pool};
    use crate::db::TradeMeta;

    async fn trader_by_id(pool: &SqlitePool, id: i64) -> Trader {
        db::require_trader(pool, id).await.unwrap()
    }

    #[tokio::test]
    async fn held_positions_are_always_included() {
        let pool = test_pool().await;
        db::seed_ticker_pool(&pool).await.unwrap();
        let id = make_trader(&pool, "Holder", 10_000.0).await;

        db::execute_buy(&pool, id, "ZZZZ", 1, 10.0, TradeMeta::default())
            .await
            .unwrap();

        let trader = trader_by_id(&pool, id).await;
        let watchlist = session_watchlist(&pool, &trader).await.unwrap();

        // The held ticker leads even though it is not in the pool.
        assert_eq!(watchlist[0], "ZZZZ");
        assert!(watchlist.len() > 1, "discovery sample expected");
        assert!(watchlist.len() <= 1 + trader.watchlist_size as usize);
    }

    #[tokio::test]
    async fn custom_watchlist_excludes_held_tickers() {
        let pool = test_pool().await;
        let id = make_trader(&pool, "Customizer", 10_000.0).await;

        db::execute_buy(&pool, id, "AAPL", 1, 10.0, TradeMeta::default())
            .await
            .unwrap();
        set_custom_watchlist(
            &pool,
            id,
            &["AAPL".into(), "MSFT".into(), "NVDA".into()],
        )
        .await
        .unwrap();

        let trader = trader_by_id(&pool, id).await;
        let watchlist = session_watchlist(&pool, &trader).await.unwrap();

        assert_eq!(watchlist.iter().filter(|t| *t == "AAPL").count(), 1);
        assert!(watchlist.contains(&"MSFT".to_string()));
        assert!(watchlist.contains(&"NVDA".to_string()));
    }

    #[tokio::test]
    async fn set_custom_watchlist_normalizes_input() {
        let pool = test_pool().await;
        let id = make_trader(&pool, "Messy", 10_000.0).await;

        let stored = set_custom_watchlist(
            &pool,
            id,
            &[" aapl ".into(), "MSFT".into(), "aapl".into(), "".into()],
        )
        .await
        .unwrap();

        assert_eq!(stored, vec!["AAPL", "MSFT"]);

        let trader = trader_by_id(&pool, id).await;
        assert!(trader.use_custom_watchlist);
        assert_eq!(trader.custom_watchlist_symbols(), vec!["AAPL", "MSFT"]);
    }

    #[tokio::test]
    async fn set_custom_watchlist_rejects_empty() {
        let pool = test_pool().await;
        let id = make_trader(&pool, "Empty", 10_000.0).await;

        let err = set_custom_watchlist(&pool, id, &["  ".into()]).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn clear_reverts_to_timezone_pool() {
        let pool = test_pool().await;
        db::seed_ticker_pool(&pool).await.unwrap();
        let id = make_trader(&pool, "Reverter", 10_000.0).await;

        set_custom_watchlist(&pool, id, &["AAPL".into()]).await.unwrap();
        clear_custom_watchlist(&pool, id).await.unwrap();

        let trader = trader_by_id(&pool, id).await;
        assert!(!trader.use_custom_watchlist);

        let pool_view = effective_pool(&pool, &trader).await.unwrap();
        assert!(pool_view.iter().all(|t| t.timezone == "America/New_York"));
        assert!(!pool_view.is_empty());
    }

    #[tokio::test]
    async fn rotation_records_accumulate() {
        let pool = test_pool().await;
        let id = make_trader(&pool, "Rotator", 10_000.0).await;

        let tickers = vec!["AAPL".to_string(), "MSFT".to_string()];
        track_rotation(&pool, Some(id), "America/New_York", &tickers)
            .await
            .unwrap();
        track_rotation(&pool, Some(id), "America/New_York", &tickers[..1].to_vec())
            .await
            .unwrap();

        let history = rotation_history(&pool, id, 50).await.unwrap();
        assert_eq!(history.len(), 2);

        let aapl = history.iter().find(|r| r.ticker == "AAPL").unwrap();
        assert_eq!(aapl.analysis_count, 2);
    }
}
