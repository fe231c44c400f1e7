//! # routes::scheduled
//!
//! Webhook endpoints for the external cron (GitHub Actions).  All POST
//! routes here sit behind the scheduler API key; the health probe is open.

use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::config::DEFAULT_TIMEZONE;
use crate::engine::{analytics, executor};
use crate::error::AppError;
use crate::state::SharedState;

// ─── POST /api/scheduled/execute-trades ───────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteTradesBody {
    pub timezone: Option<String>,
    pub time_of_day: Option<String>,
}

pub async fn execute_trades(
    State(state): State<SharedState>,
    body: Option<Json<ExecuteTradesBody>>,
) -> Result<impl IntoResponse, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let timezone = body.timezone.unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
    let time_of_day = body.time_of_day.unwrap_or_else(|| "morning".to_string());

    info!(timezone, time_of_day, "📊 Scheduled trade execution triggered");

    let report = executor::run_trading_session(&state, &timezone, &time_of_day).await?;

    info!(trades = report.trades_executed, "✅ Trade execution completed");

    Ok(Json(json!({
        "status":  "success",
        "message": format!("Executed {time_of_day} trades for {timezone}"),
        "result":  report,
    })))
}

// ─── POST /api/scheduled/portfolio-health-check ───────────────────────────────

pub async fn portfolio_health_check(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, AppError> {
    info!("📊 Portfolio health check triggered");

    let report = analytics::portfolio_health(&state.db).await?;

    info!(traders = report.traders.len(), "✅ Portfolio health check completed");

    Ok(Json(json!({
        "status":  "success",
        "message": "Portfolio health check completed",
        "result":  report,
    })))
}

// ─── POST /api/scheduled/update-prices ────────────────────────────────────────

pub async fn update_prices(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, AppError> {
    info!("📊 Scheduled price update triggered");

    let report = executor::refresh_held_prices(&state).await?;

    info!(updated = report.updated, "✅ Price update completed");

    Ok(Json(json!({
        "status":  "success",
        "message": format!("Updated prices for {} tickers", report.updated),
        "result":  report,
    })))
}

// ─── GET /api/scheduled/health ────────────────────────────────────────────────

/// Liveness probe for the scheduler.  Unauthenticated so the cron can verify
/// the app is reachable before spending an authenticated call.
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status":    "healthy",
        "timestamp": Utc::now(),
        "message":   "Scheduled task endpoint is operational",
    }))
}
