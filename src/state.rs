//! # state
//!
//! Top-level shared state injected into every Axum handler: the connection
//! pool, the market-data client, the API-quota limiter and the app config.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db;
use crate::limiter::{ApiLimiter, LimiterConfig};
use crate::market::MarketDataClient;

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub market: MarketDataClient,
    pub limiter: ApiLimiter,
    pub config: AppConfig,
}

/// Convenience type alias
pub type SharedState = Arc<AppState>;

/// Open the pool, seed the ticker pool and assemble the shared state.
pub async fn build_state(config: AppConfig) -> anyhow::Result<SharedState> {
    let pool = db::init_pool(&config.database_url).await?;
    db::seed_ticker_pool(&pool).await?;

    let market = MarketDataClient::new(&config.market_base_url, &config.market_api_key)?;
    let limiter = ApiLimiter::new(LimiterConfig::from_env());

    Ok(Arc::new(AppState {
        db: pool,
        market,
        limiter,
        config,
    }))
}
