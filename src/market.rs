//! # market — Market-Data API Client
//!
//! Thin client for an Alpha Vantage-style quote API.  Two read paths:
//!
//! - `daily_closes`  — the daily close series used by the indicator engine
//! - `global_quote`  — the latest price used by the price-update task
//!
//! The vendor signals quota exhaustion with a 200 response whose body carries
//! a `Note` / `Information` field instead of data; both are mapped to
//! [`AppError::MarketData`] so callers see one failure shape.

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, error};

use crate::config::MARKET_REQUEST_TIMEOUT;
use crate::error::AppError;

// ─── Types ────────────────────────────────────────────────────────────────────

/// One day of the close series, ascending by date after parsing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub close: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSize {
    /// Most recent ~100 data points — enough for the 50-day indicators.
    Compact,
    /// Full history — the `/analyze` endpoint trims it to its own window.
    Full,
}

impl OutputSize {
    fn as_param(self) -> &'static str {
        match self {
            OutputSize::Compact => "compact",
            OutputSize::Full => "full",
        }
    }
}

// ─── Client ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MarketDataClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl MarketDataClient {
    pub fn new(base_url: &str, api_key: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(MARKET_REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Fetch the daily close series for `symbol`, oldest first.
    pub async fn daily_closes(
        &self,
        symbol: &str,
        output_size: OutputSize,
    ) -> Result<Vec<DailyBar>, AppError> {
        let url = format!(
            "{}/query?function=TIME_SERIES_DAILY&symbol={}&outputsize={}&apikey={}",
            self.base_url,
            symbol,
            output_size.as_param(),
            self.api_key
        );

        debug!(symbol, size = output_size.as_param(), "Fetching daily series");
        let body = self.fetch_json(&url).await?;
        parse_daily_series(&body)
    }

    /// Fetch the latest quoted price for `symbol`.
    pub async fn global_quote(&self, symbol: &str) -> Result<f64, AppError> {
        let url = format!(
            "{}/query?function=GLOBAL_QUOTE&symbol={}&apikey={}",
            self.base_url, symbol, self.api_key
        );

        debug!(symbol, "Fetching global quote");
        let body = self.fetch_json(&url).await?;
        parse_global_quote(&body)
    }

    async fn fetch_json(&self, url: &str) -> Result<Value, AppError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            error!(error = %e, "Market-data API unreachable");
            AppError::MarketData(format!("Market-data API unreachable: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(http_status = %status, body = %body, "Market-data API returned HTTP error");
            return Err(AppError::MarketData(format!(
                "Market-data API HTTP {status}: {body}"
            )));
        }

        response.json().await.map_err(|e| {
            error!(error = %e, "Market-data response parse failed");
            AppError::MarketData(format!("Market-data response parse error: {e}"))
        })
    }
}

// ─── Parsing ──────────────────────────────────────────────────────────────────

/// Reject the vendor's "200 OK but actually an error" payloads.
fn check_vendor_error(body: &Value) -> Result<(), AppError> {
    if let Some(msg) = body.get("Error Message").and_then(Value::as_str) {
        return Err(AppError::MarketData(format!(
            "Invalid ticker symbol or API error: {msg}"
        )));
    }
    // "Note" and "Information" both mean the quota is spent.
    for key in ["Note", "Information"] {
        if body.get(key).is_some() {
            return Err(AppError::MarketData(
                "API rate limit reached. Please try again later.".into(),
            ));
        }
    }
    Ok(())
}

pub fn parse_daily_series(body: &Value) -> Result<Vec<DailyBar>, AppError> {
    check_vendor_error(body)?;

    let series = body
        .get("Time Series (Daily)")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            AppError::MarketData("Missing 'Time Series (Daily)' in response".into())
        })?;

    let mut bars = Vec::with_capacity(series.len());
    for (date_str, fields) in series {
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
            AppError::MarketData(format!("Bad date key '{date_str}': {e}"))
        })?;
        let close = fields
            .get("4. close")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| {
                AppError::MarketData(format!("Missing close price for {date_str}"))
            })?;

        bars.push(DailyBar { date, close });
    }

    // The vendor returns newest first; the indicator engine wants oldest first.
    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

pub fn parse_global_quote(body: &Value) -> Result<f64, AppError> {
    check_vendor_error(body)?;

    body.get("Global Quote")
        .and_then(|q| q.get("05. price"))
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| AppError::MarketData("Missing price in quote response".into()))
}
