//! # models::ticker
//!
//! Lookup and log tables: the discovery pool, last-known prices, rotation
//! tracking and the daily API-usage counter.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// A ticker available for discovery sampling, grouped by exchange timezone.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PoolTicker {
    pub id: i64,
    pub ticker: String,
    pub name: Option<String>,
    pub exchange: String,
    pub timezone: String,
    pub market_cap: Option<f64>,
    pub sector: Option<String>,
    pub is_active: bool,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Latest market price for a ticker (single source of truth for
/// mark-to-market valuations).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TickerPrice {
    pub ticker: String,
    pub current_price: f64,
    pub last_updated: DateTime<Utc>,
}

/// Tracks which pool tickers a trader's discovery sampling has visited.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RotationRecord {
    pub id: i64,
    pub ticker: String,
    pub timezone: String,
    pub trader_id: Option<i64>,
    pub last_analyzed_at: DateTime<Utc>,
    pub analysis_count: i64,
}

/// One row per calendar day of market-data API usage.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ApiUsageRow {
    pub id: i64,
    pub date: NaiveDate,
    pub call_count: i64,
    pub last_reset: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
