//! # models::trade
//!
//! Immutable record of an executed buy or sell, including the indicator
//! snapshot that justified the decision at the time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── TradeAction ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

// ─── Trade ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Trade {
    pub id: i64,
    pub trader_id: i64,
    pub ticker: String,
    pub action: TradeAction,
    pub quantity: i64,
    pub price: f64,
    pub total_amount: f64,
    /// Cash balance of the trader immediately after this trade settled.
    pub balance_after: f64,
    // Technical indicators at time of trade
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    // Decision metadata
    pub recommendation: Option<String>,
    pub confidence: Option<f64>,
    pub notes: Option<String>,
    pub executed_at: DateTime<Utc>,
}

/// A trade joined with its trader's name, the shape the history endpoints
/// return.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TradeRecord {
    pub id: i64,
    pub trader_id: i64,
    pub trader_name: String,
    pub ticker: String,
    pub action: TradeAction,
    pub quantity: i64,
    pub price: f64,
    pub total_amount: f64,
    pub balance_after: f64,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub recommendation: Option<String>,
    pub confidence: Option<f64>,
    pub notes: Option<String>,
    pub executed_at: DateTime<Utc>,
}
