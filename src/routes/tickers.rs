//! # routes::tickers
//!
//! Read-only lookups: the discovery pool and the market-data quota stats.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::models::PoolTicker;
use crate::state::SharedState;

// ─── GET /api/ticker-pool ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PoolQuery {
    pub timezone: Option<String>,
    pub active: Option<bool>,
}

pub async fn ticker_pool(
    State(state): State<SharedState>,
    Query(query): Query<PoolQuery>,
) -> Result<impl IntoResponse, AppError> {
    let rows = sqlx::query_as::<_, PoolTicker>("SELECT * FROM ticker_pool ORDER BY ticker")
        .fetch_all(&state.db)
        .await?;

    let tickers: Vec<PoolTicker> = rows
        .into_iter()
        .filter(|t| {
            query
                .timezone
                .as_deref()
                .map(|tz| t.timezone == tz)
                .unwrap_or(true)
                && query.active.map(|a| t.is_active == a).unwrap_or(true)
        })
        .collect();

    Ok(Json(json!({
        "count":   tickers.len(),
        "tickers": tickers,
    })))
}

// ─── GET /api/api-usage ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub days: Option<i64>,
}

pub async fn api_usage(
    State(state): State<SharedState>,
    Query(query): Query<UsageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let days = query.days.unwrap_or(7).clamp(1, 90);
    let stats = state.limiter.usage_stats(&state.db, days).await?;

    Ok(Json(stats))
}
