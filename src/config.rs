//! # config
//!
//! Runtime configuration (`.env` driven) plus the static trading parameters:
//! risk profiles, indicator windows, signal score weights and the built-in
//! per-timezone ticker pools used to seed an empty database.

use std::time::Duration;

use crate::models::trader::RiskTolerance;

// ─── App Config ───────────────────────────────────────────────────────────────

/// Environment-derived settings, loaded once at startup and shared via state.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite connection string.
    pub database_url: String,
    /// Static key guarding the `/api/scheduled/*` endpoints.
    pub scheduler_api_key: String,
    /// Market-data API key.
    pub market_api_key: String,
    /// Market-data API base URL (overridable for tests).
    pub market_base_url: String,
    /// Listen address, e.g. `0.0.0.0:3000`.
    pub bind_addr: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env_str("DATABASE_URL", "sqlite://papertrader.db"),
            scheduler_api_key: env_str("SCHEDULER_API_KEY", "change-me-in-production"),
            market_api_key: env_str("MARKET_API_KEY", "demo"),
            market_base_url: env_str("MARKET_BASE_URL", "https://www.alphavantage.co"),
            bind_addr: env_str("BIND_ADDR", "0.0.0.0:3000"),
        }
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub(crate) fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

pub(crate) fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

// ─── Risk Profiles ────────────────────────────────────────────────────────────

/// Per-tolerance trading parameters.
#[derive(Debug, Clone, Copy)]
pub struct RiskProfile {
    /// Score needed to trigger a buy.
    pub buy_threshold: i32,
    /// Score needed to trigger a sell (negative).
    pub sell_threshold: i32,
    /// Fraction of the cash balance committed per buy.
    pub position_size: f64,
}

pub fn risk_profile(tolerance: RiskTolerance) -> RiskProfile {
    match tolerance {
        RiskTolerance::Low => RiskProfile {
            buy_threshold: 35,
            sell_threshold: -35,
            position_size: 0.05,
        },
        RiskTolerance::Medium => RiskProfile {
            buy_threshold: 18,
            sell_threshold: -18,
            position_size: 0.10,
        },
        RiskTolerance::High => RiskProfile {
            buy_threshold: 15,
            sell_threshold: -15,
            position_size: 0.15,
        },
    }
}

// ─── Indicator Parameters ─────────────────────────────────────────────────────

pub const SMA_SHORT_WINDOW: usize = 20;
pub const SMA_LONG_WINDOW: usize = 50;
pub const EMA_SHORT_SPAN: usize = 12;
pub const EMA_LONG_SPAN: usize = 26;
pub const MACD_SIGNAL_SPAN: usize = 9;
pub const RSI_WINDOW: usize = 14;
pub const MOMENTUM_PERIODS: usize = 10;
/// Minimum data points needed for a reliable indicator snapshot.
pub const MIN_DATA_POINTS: usize = 50;

// ─── Signal Score Weights ─────────────────────────────────────────────────────

pub const SCORE_STRONG_TREND: i32 = 20;
pub const SCORE_WEAK_TREND: i32 = 10;
pub const SCORE_RSI_EXTREME: i32 = 15;
pub const SCORE_MACD_CROSSOVER: i32 = 15;
pub const SCORE_STRONG_MOMENTUM: i32 = 10;

pub const RSI_OVERSOLD: f64 = 30.0;
pub const RSI_OVERBOUGHT: f64 = 70.0;
pub const RSI_NEUTRAL_LOWER: f64 = 40.0;
pub const RSI_NEUTRAL_UPPER: f64 = 60.0;

pub const MOMENTUM_STRONG_POSITIVE: f64 = 5.0;
pub const MOMENTUM_STRONG_NEGATIVE: f64 = -5.0;

// ─── Display Thresholds (the /analyze endpoint) ──────────────────────────────

pub const DISPLAY_STRONG_BUY_THRESHOLD: i32 = 30;
pub const DISPLAY_BUY_THRESHOLD: i32 = 15;
pub const DISPLAY_STRONG_SELL_THRESHOLD: i32 = -30;
pub const DISPLAY_SELL_THRESHOLD: i32 = -15;

// ─── Market Data / Analysis Windows ───────────────────────────────────────────

/// The `/analyze` endpoint trims the daily series to this many calendar days.
pub const ANALYSIS_WINDOW_DAYS: i64 = 180;
/// Rows below this count are treated as an invalid ticker on `/analyze`.
pub const ANALYSIS_MIN_ROWS: usize = 10;
/// Outbound HTTP timeout for market-data requests.
pub const MARKET_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Rough per-trader API call estimate used for pre-session capacity checks
/// (2-3 portfolio holdings + 5-8 discovery tickers).
pub const AVG_TICKERS_PER_TRADER: i64 = 8;

// ─── Built-in Ticker Pools ────────────────────────────────────────────────────

/// Starter pool seeded into `ticker_pool` when the table is empty:
/// (ticker, company, exchange, timezone, sector, source).
pub const DEFAULT_TICKER_POOL: &[(&str, &str, &str, &str, &str, &str)] = &[
    // NYSE / NASDAQ
    ("AAPL",   "Apple Inc.",                    "NYSE/NASDAQ", "America/New_York", "Technology",             "sp500"),
    ("MSFT",   "Microsoft Corporation",         "NYSE/NASDAQ", "America/New_York", "Technology",             "sp500"),
    ("GOOGL",  "Alphabet Inc.",                 "NYSE/NASDAQ", "America/New_York", "Communication Services", "sp500"),
    ("AMZN",   "Amazon.com Inc.",               "NYSE/NASDAQ", "America/New_York", "Consumer Discretionary", "sp500"),
    ("TSLA",   "Tesla Inc.",                    "NYSE/NASDAQ", "America/New_York", "Consumer Discretionary", "sp500"),
    ("NVDA",   "NVIDIA Corporation",            "NYSE/NASDAQ", "America/New_York", "Technology",             "sp500"),
    ("META",   "Meta Platforms Inc.",           "NYSE/NASDAQ", "America/New_York", "Communication Services", "sp500"),
    // LSE
    ("BARC.L", "Barclays plc",                  "LSE",         "Europe/London",    "Finance",                "ftse100"),
    ("HSBA.L", "HSBC Holdings plc",             "LSE",         "Europe/London",    "Finance",                "ftse100"),
    ("BP.L",   "BP plc",                        "LSE",         "Europe/London",    "Energy",                 "ftse100"),
    ("SHEL.L", "Shell plc",                     "LSE",         "Europe/London",    "Energy",                 "ftse100"),
    ("VOD.L",  "Vodafone Group plc",            "LSE",         "Europe/London",    "Telecommunications",     "ftse100"),
    ("GSK.L",  "GSK plc",                       "LSE",         "Europe/London",    "Healthcare",             "ftse100"),
    ("AZN.L",  "AstraZeneca plc",               "LSE",         "Europe/London",    "Healthcare",             "ftse100"),
    // TSE
    ("7203.T", "Toyota Motor Corporation",      "TSE",         "Asia/Tokyo",       "Consumer Discretionary", "nikkei225"),
    ("6758.T", "Sony Group Corporation",        "TSE",         "Asia/Tokyo",       "Technology",             "nikkei225"),
    ("9984.T", "SoftBank Group Corp.",          "TSE",         "Asia/Tokyo",       "Communication Services", "nikkei225"),
    ("8306.T", "Mitsubishi UFJ Financial Group", "TSE",        "Asia/Tokyo",       "Finance",                "nikkei225"),
    ("9432.T", "Nippon Telegraph and Telephone", "TSE",        "Asia/Tokyo",       "Telecommunications",     "nikkei225"),
    ("6861.T", "Keyence Corporation",           "TSE",         "Asia/Tokyo",       "Technology",             "nikkei225"),
    ("6501.T", "Hitachi Ltd.",                  "TSE",         "Asia/Tokyo",       "Industrials",            "nikkei225"),
];

/// Fallback timezone when a trader carries an unknown one.
pub const DEFAULT_TIMEZONE: &str = "America/New_York";
