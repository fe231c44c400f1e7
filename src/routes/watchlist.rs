//! # routes::watchlist
//!
//! Per-trader watchlist management: view the effective discovery pool, set a
//! custom list, revert to the timezone pool, and inspect rotation history.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::db;
use crate::engine::watchlist;
use crate::error::AppError;
use crate::state::SharedState;

// ─── GET /api/traders/:id/watchlist ───────────────────────────────────────────

pub async fn get_watchlist(
    State(state): State<SharedState>,
    Path(trader_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let trader = db::require_trader(&state.db, trader_id).await?;
    let pool = watchlist::effective_pool(&state.db, &trader).await?;

    Ok(Json(json!({
        "trader_id":            trader_id,
        "use_custom_watchlist": trader.use_custom_watchlist,
        "custom_watchlist":     trader.custom_watchlist_symbols(),
        "watchlist_size":       trader.watchlist_size,
        "timezone":             trader.trading_timezone,
        "pool":                 pool,
    })))
}

// ─── PUT /api/traders/:id/watchlist ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SetWatchlistBody {
    #[serde(default)]
    pub tickers: Vec<String>,
    pub watchlist_size: Option<i64>,
}

pub async fn set_watchlist(
    State(state): State<SharedState>,
    Path(trader_id): Path<i64>,
    Json(body): Json<SetWatchlistBody>,
) -> Result<impl IntoResponse, AppError> {
    db::require_trader(&state.db, trader_id).await?;

    if matches!(body.watchlist_size, Some(size) if size <= 0) {
        return Err(AppError::BadRequest(
            "Watchlist size must be positive".into(),
        ));
    }

    let stored = watchlist::set_custom_watchlist(&state.db, trader_id, &body.tickers).await?;

    if let Some(size) = body.watchlist_size {
        sqlx::query("UPDATE traders SET watchlist_size = ? WHERE id = ?")
            .bind(size)
            .bind(trader_id)
            .execute(&state.db)
            .await?;
    }

    let trader = db::require_trader(&state.db, trader_id).await?;
    Ok(Json(json!({
        "trader_id":            trader_id,
        "use_custom_watchlist": true,
        "custom_watchlist":     stored,
        "watchlist_size":       trader.watchlist_size,
    })))
}

// ─── DELETE /api/traders/:id/watchlist ────────────────────────────────────────

pub async fn clear_watchlist(
    State(state): State<SharedState>,
    Path(trader_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    db::require_trader(&state.db, trader_id).await?;
    watchlist::clear_custom_watchlist(&state.db, trader_id).await?;

    Ok(Json(json!({
        "trader_id": trader_id,
        "message":   "Custom watchlist cleared, reverted to timezone pool",
    })))
}

// ─── GET /api/traders/:id/watchlist/history ───────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

pub async fn watchlist_history(
    State(state): State<SharedState>,
    Path(trader_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    db::require_trader(&state.db, trader_id).await?;

    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let records = watchlist::rotation_history(&state.db, trader_id, limit).await?;

    Ok(Json(json!({
        "trader_id": trader_id,
        "count":     records.len(),
        "history":   records,
    })))
}
