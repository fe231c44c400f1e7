//! # models::trader
//!
//! The simulated account at the centre of the system.  A `Trader` owns a cash
//! balance, a risk profile and (optionally) a custom watchlist; its holdings
//! and trade history live in their own tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── TraderStatus ─────────────────────────────────────────────────────────────

/// Lifecycle state of a trader.  Only `Active` traders take part in
/// scheduled trading sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TraderStatus {
    Active,
    Paused,
    Archived,
}

// ─── RiskTolerance ────────────────────────────────────────────────────────────

/// Selects the score thresholds and position-size fraction used when turning
/// an indicator score into a trade (see [`crate::config::risk_profile`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum RiskTolerance {
    Low,
    Medium,
    High,
}

impl Default for RiskTolerance {
    fn default() -> Self {
        Self::Medium
    }
}

// ─── Trader ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Trader {
    pub id: i64,
    pub name: String,
    pub status: TraderStatus,
    pub initial_balance: f64,
    pub current_balance: f64,
    pub strategy_name: String,
    pub risk_tolerance: RiskTolerance,
    pub trading_ethos: Option<String>,
    /// Opaque IANA timezone label used to group traders into sessions.
    pub trading_timezone: String,
    /// JSON array of ticker symbols; see [`Trader::custom_watchlist_symbols`].
    pub custom_watchlist: Option<String>,
    /// Discovery tickers sampled per session (on top of held positions).
    pub watchlist_size: i64,
    pub use_custom_watchlist: bool,
    pub created_at: DateTime<Utc>,
    pub last_trade_at: Option<DateTime<Utc>>,
}

impl Trader {
    /// Decode the stored custom watchlist.  A missing or malformed column
    /// reads as an empty list.
    pub fn custom_watchlist_symbols(&self) -> Vec<String> {
        self.custom_watchlist
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }

    pub fn is_active(&self) -> bool {
        self.status == TraderStatus::Active
    }
}
