//! # models
//!
//! Row types for every table plus the enums they embed.  All of them derive
//! `sqlx::FromRow` so the runtime-bound queries in `db` and the route handlers
//! can map rows without boilerplate.

pub mod portfolio;
pub mod ticker;
pub mod trade;
pub mod trader;

pub use portfolio::{Holding, HoldingView};
pub use ticker::{ApiUsageRow, PoolTicker, RotationRecord, TickerPrice};
pub use trade::{Trade, TradeAction, TradeRecord};
pub use trader::{RiskTolerance, Trader, TraderStatus};
