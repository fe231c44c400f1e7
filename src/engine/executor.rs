//! # engine::executor
//!
//! **Trade Executor** — the cron-triggered batch that walks every active
//! trader in a timezone, analyzes its session watchlist and records the
//! resulting buys/sells.
//!
//! Failure policy is per-ticker try/log/continue; only quota exhaustion stops
//! a session early, and an up-front capacity estimate aborts it entirely when
//! the daily quota clearly cannot cover the batch.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{risk_profile, AVG_TICKERS_PER_TRADER};
use crate::db::{self, TradeMeta};
use crate::engine::indicators::IndicatorSeries;
use crate::engine::scorer::{trading_decision, DecisionAction, TradeDecision};
use crate::engine::watchlist;
use crate::error::AppError;
use crate::limiter::{CapacityEstimate, UsageToday};
use crate::market::OutputSize;
use crate::models::{TradeAction, Trader, TraderStatus};
use crate::state::AppState;

// ─── Report Types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ExecutedTrade {
    pub trader: String,
    pub action: TradeAction,
    pub ticker: String,
    pub quantity: i64,
    pub price: f64,
    pub total_amount: f64,
}

#[derive(Debug, Serialize)]
pub struct SessionReport {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timezone: String,
    pub time_of_day: String,
    pub traders_processed: usize,
    pub trades_executed: usize,
    pub api_calls_made: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity_info: Option<CapacityEstimate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_usage: Option<UsageToday>,
    pub trades: Vec<ExecutedTrade>,
}

#[derive(Debug, Serialize)]
pub struct PriceRefreshReport {
    pub status: String,
    pub updated: usize,
    pub errors: Vec<String>,
}

// ─── Position Sizing ──────────────────────────────────────────────────────────

/// Shares to buy: the risk profile's fraction of cash, floored to whole
/// shares.
pub fn buy_quantity(balance: f64, position_size: f64, price: f64) -> i64 {
    if price <= 0.0 {
        return 0;
    }
    (balance * position_size / price).floor() as i64
}

/// Shares to sell: half the position, or all of it for tiny holdings.
pub fn sell_quantity(held: i64) -> i64 {
    if held > 2 {
        held / 2
    } else {
        held
    }
}

// ─── Session Runner ───────────────────────────────────────────────────────────

/// Execute trading decisions for every active trader in `timezone`.
pub async fn run_trading_session(
    state: &AppState,
    timezone: &str,
    time_of_day: &str,
) -> Result<SessionReport, AppError> {
    info!(timezone, time_of_day, "🚀 Starting trading session");

    let traders = sqlx::query_as::<_, Trader>(
        "SELECT * FROM traders WHERE status = ? AND trading_timezone = ? ORDER BY id",
    )
    .bind(TraderStatus::Active)
    .bind(timezone)
    .fetch_all(&state.db)
    .await?;

    if traders.is_empty() {
        info!(timezone, "No active traders found");
        return Ok(SessionReport {
            status: "success".into(),
            message: Some(format!("No active traders in timezone {timezone}")),
            timezone: timezone.into(),
            time_of_day: time_of_day.into(),
            traders_processed: 0,
            trades_executed: 0,
            api_calls_made: 0,
            capacity_info: None,
            api_usage: None,
            trades: Vec::new(),
        });
    }

    info!(count = traders.len(), timezone, "Found active traders");

    // ── Capacity check before burning any quota ──────────────────────────────
    let capacity = state
        .limiter
        .estimate_capacity(&state.db, traders.len() as i64, AVG_TICKERS_PER_TRADER)
        .await?;
    info!("{}", capacity.message);

    if !capacity.can_proceed {
        warn!("⚠️ Insufficient API capacity - aborting trading session");
        return Ok(SessionReport {
            status: "aborted".into(),
            message: Some("Insufficient API quota remaining".into()),
            timezone: timezone.into(),
            time_of_day: time_of_day.into(),
            traders_processed: 0,
            trades_executed: 0,
            api_calls_made: 0,
            capacity_info: Some(capacity),
            api_usage: None,
            trades: Vec::new(),
        });
    }

    let mut executed: Vec<ExecutedTrade> = Vec::new();
    let mut api_calls_made: u64 = 0;

    for trader in &traders {
        info!(trader = %trader.name, timezone, "📊 Processing trader");

        let tickers = watchlist::session_watchlist(&state.db, trader).await?;
        if tickers.is_empty() {
            warn!(trader = %trader.name, "No tickers in watchlist");
            continue;
        }

        let held = db::held_tickers(&state.db, trader.id).await?;

        for ticker in &tickers {
            let quota = state.limiter.can_make_request(&state.db).await?;
            if !quota.is_allowed() {
                warn!(reason = quota.reason(), "⚠️ API limit reached - stopping analysis");
                break;
            }

            state.limiter.throttle().await;

            let decision = analyze_ticker(state, ticker, trader).await;
            state.limiter.record_call(&state.db).await?;
            api_calls_made += 1;

            let Some(decision) = decision else { continue };

            match decision.action {
                DecisionAction::Buy => {
                    if let Some(trade) =
                        try_buy(state, trader, ticker, &decision, timezone, time_of_day).await
                    {
                        executed.push(trade);
                    }
                }
                DecisionAction::Sell if held.contains(ticker) => {
                    if let Some(trade) =
                        try_sell(state, trader, ticker, &decision, timezone, time_of_day).await
                    {
                        executed.push(trade);
                    }
                }
                _ => {}
            }
        }
    }

    info!(
        timezone,
        time_of_day,
        traders = traders.len(),
        trades = executed.len(),
        api_calls = api_calls_made,
        "✅ Completed trading session"
    );

    // ── Keep mark-to-market prices fresh ─────────────────────────────────────
    match refresh_held_prices(state).await {
        Ok(report) => info!(updated = report.updated, "Updated portfolio prices"),
        Err(e) => error!(error = %e, "Error updating portfolio prices"),
    }

    let usage = state.limiter.usage_stats(&state.db, 1).await?;

    Ok(SessionReport {
        status: "success".into(),
        message: None,
        timezone: timezone.into(),
        time_of_day: time_of_day.into(),
        traders_processed: traders.len(),
        trades_executed: executed.len(),
        api_calls_made,
        capacity_info: None,
        api_usage: Some(usage.today),
        trades: executed,
    })
}

/// Fetch, compute and decide for one ticker.  All failures are logged and
/// collapse to `None` so the session continues.
async fn analyze_ticker(state: &AppState, ticker: &str, trader: &Trader) -> Option<TradeDecision> {
    info!(ticker, "Analyzing...");

    let bars = match state.market.daily_closes(ticker, OutputSize::Compact).await {
        Ok(bars) => bars,
        Err(e) => {
            error!(ticker, error = %e, "Error analyzing ticker");
            return None;
        }
    };

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let series = IndicatorSeries::compute(&closes);

    let Some(snapshot) = series.snapshot() else {
        warn!(ticker, rows = closes.len(), "Insufficient data");
        return None;
    };

    let decision = trading_decision(ticker, &snapshot, trader.risk_tolerance);
    info!(
        ticker,
        action = ?decision.action,
        confidence = decision.confidence,
        price = decision.current_price,
        "Decision ready"
    );

    Some(decision)
}

async fn try_buy(
    state: &AppState,
    trader: &Trader,
    ticker: &str,
    decision: &TradeDecision,
    timezone: &str,
    time_of_day: &str,
) -> Option<ExecutedTrade> {
    // Balance may have moved earlier in this session; size against the
    // current value.
    let current = db::require_trader(&state.db, trader.id).await.ok()?;
    let profile = risk_profile(current.risk_tolerance);
    let quantity = buy_quantity(current.current_balance, profile.position_size, decision.current_price);

    if quantity <= 0 {
        info!(trader = %trader.name, ticker, "Insufficient funds for buy");
        return None;
    }

    let meta = decision_meta(decision, "BUY", timezone, time_of_day);
    match db::execute_buy(&state.db, trader.id, ticker, quantity, decision.current_price, meta).await
    {
        Ok(trade) => {
            info!(
                trader = %trader.name,
                ticker,
                quantity,
                price = decision.current_price,
                "💰 Bought"
            );
            Some(ExecutedTrade {
                trader: trader.name.clone(),
                action: TradeAction::Buy,
                ticker: ticker.to_string(),
                quantity,
                price: decision.current_price,
                total_amount: trade.total_amount,
            })
        }
        Err(e) => {
            error!(trader = %trader.name, ticker, error = %e, "Buy failed");
            None
        }
    }
}

async fn try_sell(
    state: &AppState,
    trader: &Trader,
    ticker: &str,
    decision: &TradeDecision,
    timezone: &str,
    time_of_day: &str,
) -> Option<ExecutedTrade> {
    let holdings = db::portfolio_for(&state.db, trader.id).await.ok()?;
    let held = holdings.iter().find(|h| h.ticker == *ticker)?;

    let quantity = sell_quantity(held.quantity);
    if quantity <= 0 {
        return None;
    }

    let meta = decision_meta(decision, "SELL", timezone, time_of_day);
    match db::execute_sell(&state.db, trader.id, ticker, quantity, decision.current_price, meta)
        .await
    {
        Ok(trade) => {
            info!(
                trader = %trader.name,
                ticker,
                quantity,
                price = decision.current_price,
                "💸 Sold"
            );
            Some(ExecutedTrade {
                trader: trader.name.clone(),
                action: TradeAction::Sell,
                ticker: ticker.to_string(),
                quantity,
                price: decision.current_price,
                total_amount: trade.total_amount,
            })
        }
        Err(e) => {
            error!(trader = %trader.name, ticker, error = %e, "Sell failed");
            None
        }
    }
}

fn decision_meta(
    decision: &TradeDecision,
    recommendation: &str,
    timezone: &str,
    time_of_day: &str,
) -> TradeMeta {
    TradeMeta {
        rsi: decision.rsi,
        macd: decision.macd,
        sma_20: decision.sma_20,
        sma_50: decision.sma_50,
        recommendation: Some(recommendation.to_string()),
        confidence: Some(decision.confidence as f64),
        notes: Some(format!(
            "Automated {timezone} {time_of_day} trade: {}",
            decision.signals.join(", ")
        )),
    }
}

// ─── Price Refresh ────────────────────────────────────────────────────────────

/// Refresh `ticker_prices` for every held ticker via the quote endpoint.
/// Per-ticker failures are collected, not fatal.
pub async fn refresh_held_prices(state: &AppState) -> Result<PriceRefreshReport, AppError> {
    let tickers = db::all_held_tickers(&state.db).await?;

    if tickers.is_empty() {
        info!("No tickers to update");
        return Ok(PriceRefreshReport {
            status: "success".into(),
            updated: 0,
            errors: Vec::new(),
        });
    }

    let mut updated = 0;
    let mut errors = Vec::new();

    for ticker in &tickers {
        match state.market.global_quote(ticker).await {
            Ok(price) => {
                db::upsert_ticker_price(&state.db, ticker, price).await?;
                state.limiter.record_call(&state.db).await?;
                updated += 1;
                info!(ticker, price, "Updated price");
            }
            Err(e) => {
                let msg = format!("Error updating {ticker}: {e}");
                error!("{msg}");
                errors.push(msg);
            }
        }
    }

    Ok(PriceRefreshReport {
        status: if errors.is_empty() { "success" } else { "partial" }.into(),
        updated,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_quantity_floors_to_whole_shares() {
        // 10% of 10_000 = 1000 → 6 shares at 150
        assert_eq!(buy_quantity(10_000.0, 0.10, 150.0), 6);
        assert_eq!(buy_quantity(10_000.0, 0.05, 150.0), 3);
    }

    #[test]
    fn buy_quantity_is_zero_when_cash_is_short() {
        assert_eq!(buy_quantity(100.0, 0.05, 150.0), 0);
        assert_eq!(buy_quantity(10_000.0, 0.10, 0.0), 0);
    }

    #[test]
    fn sell_quantity_halves_large_positions() {
        assert_eq!(sell_quantity(10), 5);
        assert_eq!(sell_quantity(9), 4);
    }

    #[test]
    fn sell_quantity_closes_tiny_positions() {
        assert_eq!(sell_quantity(2), 2);
        assert_eq!(sell_quantity(1), 1);
        assert_eq!(sell_quantity(0), 0);
    }
}
