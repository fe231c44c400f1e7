//! # routes::analyze
//!
//! On-demand indicator analysis for a list of tickers.  Per-ticker failures
//! are reported inline so one bad symbol never sinks the whole request.

use axum::{extract::State, response::IntoResponse, Json};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::{ANALYSIS_MIN_ROWS, ANALYSIS_WINDOW_DAYS};
use crate::engine::indicators::IndicatorSeries;
use crate::engine::scorer::display_signals;
use crate::error::AppError;
use crate::market::OutputSize;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub tickers: Vec<String>,
}

// ─── POST /analyze ────────────────────────────────────────────────────────────

pub async fn analyze(
    State(state): State<SharedState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.tickers.is_empty() {
        return Err(AppError::BadRequest("No tickers provided".into()));
    }

    let mut results = Vec::with_capacity(req.tickers.len());

    for raw in &req.tickers {
        let ticker = raw.trim().to_uppercase();
        if ticker.is_empty() {
            continue;
        }

        match analyze_one(&state, &ticker).await {
            Ok(signals) => results.push(signals),
            Err(message) => {
                warn!(ticker, message, "Analysis failed");
                results.push(json!({ "ticker": ticker, "error": message }));
            }
        }
    }

    Ok(Json(json!({ "results": results })))
}

/// Fetch, trim to the analysis window, compute indicators and render display
/// signals for one ticker.  Errors come back as user-facing strings.
async fn analyze_one(state: &SharedState, ticker: &str) -> Result<Value, String> {
    info!(ticker, "Fetching data");

    let bars = state
        .market
        .daily_closes(ticker, OutputSize::Full)
        .await
        .map_err(|e| format!("Error analyzing ticker: {e}"))?;

    // Last ~6 months only; older history just dilutes the indicators.
    let cutoff = Utc::now().date_naive() - Duration::days(ANALYSIS_WINDOW_DAYS);
    let window: Vec<f64> = bars
        .iter()
        .filter(|b| b.date >= cutoff)
        .map(|b| b.close)
        .collect();

    info!(ticker, rows = window.len(), "Retrieved rows");

    if window.len() < ANALYSIS_MIN_ROWS {
        return Err("Invalid ticker or insufficient data available".into());
    }

    let series = IndicatorSeries::compute(&window);
    let snapshot = series
        .snapshot()
        .ok_or_else(|| "Insufficient data for analysis".to_string())?;

    let signals = display_signals(ticker, &snapshot);

    let first_close = window.first().copied().unwrap_or(0.0);
    let price_change_6mo = if first_close > 0.0 {
        (snapshot.close - first_close) / first_close * 100.0
    } else {
        0.0
    };

    let mut value = serde_json::to_value(&signals).map_err(|e| e.to_string())?;
    if let Some(obj) = value.as_object_mut() {
        // The daily endpoint carries no company names; echo the symbol.
        obj.insert("company_name".into(), json!(ticker));
        obj.insert(
            "price_change_6mo".into(),
            json!((price_change_6mo * 100.0).round() / 100.0),
        );
    }

    Ok(value)
}
