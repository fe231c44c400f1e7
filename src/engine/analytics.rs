//! # engine::analytics
//!
//! Derived portfolio figures: the rich per-trader summary returned by the
//! trader endpoints, and the after-close portfolio health check.
//!
//! Realized P/L compares each sell against the running average buy price of
//! the ticker at that point in the history; unrealized P/L marks open
//! positions to the latest known price in `ticker_prices`, falling back to
//! cost basis when no price has been recorded yet.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db;
use crate::error::AppError;
use crate::models::{RiskTolerance, Trade, TradeAction, Trader, TraderStatus};

// ─── Trader Summary ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TraderSummary {
    pub id: i64,
    pub name: String,
    pub status: TraderStatus,
    pub initial_balance: f64,
    pub current_balance: f64,
    pub portfolio_value: f64,
    pub portfolio_cost_basis: f64,
    pub unrealized_pl: f64,
    pub unrealized_pl_percentage: f64,
    pub realized_pl: f64,
    pub total_value: f64,
    pub strategy_name: String,
    pub risk_tolerance: RiskTolerance,
    pub trading_ethos: Option<String>,
    pub trading_timezone: String,
    pub custom_watchlist: Option<Vec<String>>,
    pub watchlist_size: i64,
    pub use_custom_watchlist: bool,
    pub created_at: DateTime<Utc>,
    pub last_trade_at: Option<DateTime<Utc>>,
    pub total_trades: i64,
    pub buy_trades: i64,
    pub sell_trades: i64,
    pub winning_trades: i64,
    pub losing_trades: i64,
    pub win_rate: f64,
    pub avg_buy_amount: f64,
    pub avg_sell_amount: f64,
    pub profit_loss: f64,
    pub profit_loss_percentage: f64,
}

/// Build the full summary for one trader.
pub async fn trader_summary(pool: &SqlitePool, trader: &Trader) -> Result<TraderSummary, AppError> {
    // ── Mark holdings to market ───────────────────────────────────────────────
    let holdings = db::portfolio_for(pool, trader.id).await?;

    let mut portfolio_market_value = 0.0;
    let mut portfolio_cost_basis = 0.0;
    for holding in &holdings {
        portfolio_cost_basis += holding.total_cost;

        let marked = match db::price_for(pool, &holding.ticker).await? {
            Some(price) if holding.quantity > 0 => price.current_price * holding.quantity as f64,
            _ => holding.total_cost,
        };
        portfolio_market_value += marked;
    }

    let unrealized_pl = portfolio_market_value - portfolio_cost_basis;
    let total_value = trader.current_balance + portfolio_market_value;

    // ── Walk the trade history ────────────────────────────────────────────────
    let trades = sqlx::query_as::<_, Trade>(
        "SELECT * FROM trades WHERE trader_id = ? ORDER BY executed_at, id",
    )
    .bind(trader.id)
    .fetch_all(pool)
    .await?;

    let buys: Vec<&Trade> = trades.iter().filter(|t| t.action == TradeAction::Buy).collect();
    let sells: Vec<&Trade> = trades.iter().filter(|t| t.action == TradeAction::Sell).collect();

    // Realized P/L: each sell vs the average buy price seen so far.
    let mut buy_history: HashMap<&str, Vec<(f64, i64)>> = HashMap::new();
    let mut realized_pl = 0.0;
    for trade in &trades {
        match trade.action {
            TradeAction::Buy => {
                buy_history
                    .entry(trade.ticker.as_str())
                    .or_default()
                    .push((trade.price, trade.quantity));
            }
            TradeAction::Sell => {
                if let Some(avg) = average_buy_price(buy_history.get(trade.ticker.as_str())) {
                    realized_pl += (trade.price - avg) * trade.quantity as f64;
                }
            }
        }
    }

    // Win rate: each sell vs the average over the complete buy history.
    let mut winning_trades = 0;
    let mut losing_trades = 0;
    for sell in &sells {
        if let Some(avg) = average_buy_price(buy_history.get(sell.ticker.as_str())) {
            if sell.price > avg {
                winning_trades += 1;
            } else {
                losing_trades += 1;
            }
        }
    }

    let win_rate = if sells.is_empty() {
        0.0
    } else {
        winning_trades as f64 / sells.len() as f64 * 100.0
    };

    let avg_buy_amount = mean(buys.iter().map(|t| t.total_amount));
    let avg_sell_amount = mean(sells.iter().map(|t| t.total_amount));

    let profit_loss = total_value - trader.initial_balance;
    let profit_loss_percentage = if trader.initial_balance > 0.0 {
        profit_loss / trader.initial_balance * 100.0
    } else {
        0.0
    };

    Ok(TraderSummary {
        id: trader.id,
        name: trader.name.clone(),
        status: trader.status,
        initial_balance: trader.initial_balance,
        current_balance: trader.current_balance,
        portfolio_value: portfolio_market_value,
        portfolio_cost_basis,
        unrealized_pl,
        unrealized_pl_percentage: if portfolio_cost_basis > 0.0 {
            unrealized_pl / portfolio_cost_basis * 100.0
        } else {
            0.0
        },
        realized_pl,
        total_value,
        strategy_name: trader.strategy_name.clone(),
        risk_tolerance: trader.risk_tolerance,
        trading_ethos: trader.trading_ethos.clone(),
        trading_timezone: trader.trading_timezone.clone(),
        custom_watchlist: trader.custom_watchlist.as_ref().map(|_| trader.custom_watchlist_symbols()),
        watchlist_size: trader.watchlist_size,
        use_custom_watchlist: trader.use_custom_watchlist,
        created_at: trader.created_at,
        last_trade_at: trader.last_trade_at,
        total_trades: trades.len() as i64,
        buy_trades: buys.len() as i64,
        sell_trades: sells.len() as i64,
        winning_trades,
        losing_trades,
        win_rate,
        avg_buy_amount,
        avg_sell_amount,
        profit_loss,
        profit_loss_percentage,
    })
}

fn average_buy_price(history: Option<&Vec<(f64, i64)>>) -> Option<f64> {
    let history = history?;
    let total_qty: i64 = history.iter().map(|(_, q)| q).sum();
    if total_qty == 0 {
        return None;
    }
    let total_cost: f64 = history.iter().map(|(p, q)| p * *q as f64).sum();
    Some(total_cost / total_qty as f64)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

// ─── Portfolio Health Check ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TraderHealth {
    pub trader_id: i64,
    pub trader_name: String,
    pub cash_balance: f64,
    /// Cost-basis value of open positions.
    pub portfolio_value: f64,
    pub total_value: f64,
    pub initial_balance: f64,
    pub profit_loss: f64,
    pub profit_loss_pct: f64,
    pub positions: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub traders: Vec<TraderHealth>,
}

/// Post-close health snapshot across every trader, at cost basis.
pub async fn portfolio_health(pool: &SqlitePool) -> Result<HealthReport, AppError> {
    let traders = sqlx::query_as::<_, Trader>("SELECT * FROM traders ORDER BY id")
        .fetch_all(pool)
        .await?;

    let mut results = Vec::with_capacity(traders.len());
    for trader in traders {
        let holdings = db::portfolio_for(pool, trader.id).await?;
        let portfolio_value: f64 = holdings.iter().map(|h| h.total_cost).sum();
        let total_value = trader.current_balance + portfolio_value;
        let profit_loss = total_value - trader.initial_balance;
        let profit_loss_pct = if trader.initial_balance > 0.0 {
            profit_loss / trader.initial_balance * 100.0
        } else {
            0.0
        };

        tracing::info!(
            trader = %trader.name,
            total_value,
            profit_loss_pct,
            "Portfolio health"
        );

        results.push(TraderHealth {
            trader_id: trader.id,
            trader_name: trader.name,
            cash_balance: trader.current_balance,
            portfolio_value,
            total_value,
            initial_balance: trader.initial_balance,
            profit_loss,
            profit_loss_pct,
            positions: holdings.len() as i64,
        });
    }

    Ok(HealthReport {
        status: "success".to_string(),
        timestamp: Utc::now(),
        traders: results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{make_trader, test_pool};
    use crate::db::TradeMeta;
    use approx::assert_relative_eq;

    #[tokio::test]
    async fn summary_tracks_realized_and_unrealized_pl() {
        let pool = test_pool().await;
        let id = make_trader(&pool, "Analyst", 10_000.0).await;

        // Buy 10 @ 100, sell 5 @ 120 → realized +100, 5 left at cost 500
        db::execute_buy(&pool, id, "AAPL", 10, 100.0, TradeMeta::default())
            .await
            .unwrap();
        db::execute_sell(&pool, id, "AAPL", 5, 120.0, TradeMeta::default())
            .await
            .unwrap();
        db::upsert_ticker_price(&pool, "AAPL", 130.0).await.unwrap();

        let trader = db::require_trader(&pool, id).await.unwrap();
        let summary = trader_summary(&pool, &trader).await.unwrap();

        assert_relative_eq!(summary.realized_pl, 100.0);
        assert_relative_eq!(summary.portfolio_cost_basis, 500.0);
        assert_relative_eq!(summary.portfolio_value, 650.0);
        assert_relative_eq!(summary.unrealized_pl, 150.0);
        assert_eq!(summary.total_trades, 2);
        assert_eq!(summary.winning_trades, 1);
        assert_relative_eq!(summary.win_rate, 100.0);
        // cash 9000 + 600 proceeds + 650 marked holdings
        assert_relative_eq!(summary.total_value, 9600.0 + 650.0);
    }

    #[tokio::test]
    async fn summary_falls_back_to_cost_basis_without_prices() {
        let pool = test_pool().await;
        let id = make_trader(&pool, "Unpriced", 10_000.0).await;

        db::execute_buy(&pool, id, "MSFT", 4, 250.0, TradeMeta::default())
            .await
            .unwrap();

        let trader = db::require_trader(&pool, id).await.unwrap();
        let summary = trader_summary(&pool, &trader).await.unwrap();

        assert_relative_eq!(summary.portfolio_value, 1000.0);
        assert_relative_eq!(summary.unrealized_pl, 0.0);
        assert_eq!(summary.sell_trades, 0);
        assert_relative_eq!(summary.win_rate, 0.0);
    }

    #[tokio::test]
    async fn health_report_uses_cost_basis() {
        let pool = test_pool().await;
        let id = make_trader(&pool, "Healthy", 10_000.0).await;
        db::execute_buy(&pool, id, "AAPL", 10, 100.0, TradeMeta::default())
            .await
            .unwrap();

        let report = portfolio_health(&pool).await.unwrap();
        assert_eq!(report.traders.len(), 1);

        let health = &report.traders[0];
        assert_eq!(health.trader_id, id);
        assert_relative_eq!(health.cash_balance, 9000.0);
        assert_relative_eq!(health.portfolio_value, 1000.0);
        assert_relative_eq!(health.total_value, 10_000.0);
        assert_relative_eq!(health.profit_loss, 0.0);
        assert_eq!(health.positions, 1);
    }
}
