//! # models::portfolio
//!
//! Current holdings.  One row per (trader, ticker); the row disappears when a
//! position is fully sold.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Holding {
    pub id: i64,
    pub trader_id: i64,
    pub ticker: String,
    pub quantity: i64,
    /// Volume-weighted average purchase price.
    pub average_price: f64,
    pub total_cost: f64,
    pub first_purchased_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

/// A holding decorated with mark-to-market figures, when a current price is
/// known for the ticker.
#[derive(Debug, Clone, Serialize)]
pub struct HoldingView {
    #[serde(flatten)]
    pub holding: Holding,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_loss_percentage: Option<f64>,
}

impl HoldingView {
    pub fn new(holding: Holding, current_price: Option<f64>) -> Self {
        match current_price {
            Some(price) => {
                let current_value = price * holding.quantity as f64;
                let profit_loss = current_value - holding.total_cost;
                let profit_loss_percentage = if holding.total_cost > 0.0 {
                    profit_loss / holding.total_cost * 100.0
                } else {
                    0.0
                };
                Self {
                    holding,
                    current_price: Some(price),
                    current_value: Some(current_value),
                    profit_loss: Some(profit_loss),
                    profit_loss_percentage: Some(profit_loss_percentage),
                }
            }
            None => Self {
                holding,
                current_price: None,
                current_value: None,
                profit_loss: None,
                profit_loss_percentage: None,
            },
        }
    }
}
