//! # routes
//!
//! The REST surface.
//!
//! | Method | Path                                   | Description                    |
//! |--------|----------------------------------------|--------------------------------|
//! | POST   | `/analyze`                             | On-demand indicator analysis   |
//! | GET    | `/api/traders`                         | List traders with summaries    |
//! | POST   | `/api/traders`                         | Create a trader                |
//! | GET    | `/api/traders/:id`                     | Trader summary                 |
//! | PUT    | `/api/traders/:id`                     | Update a trader                |
//! | DELETE | `/api/traders/:id`                     | Delete a trader                |
//! | GET    | `/api/traders/:id/trades`              | Paginated trade history        |
//! | POST   | `/api/traders/:id/trades`              | Manual trade execution         |
//! | GET    | `/api/traders/:id/portfolio`           | Holdings, marked to market     |
//! | GET    | `/api/traders/:id/watchlist`           | Effective watchlist / pool     |
//! | PUT    | `/api/traders/:id/watchlist`           | Set custom watchlist           |
//! | DELETE | `/api/traders/:id/watchlist`           | Revert to timezone pool        |
//! | GET    | `/api/traders/:id/watchlist/history`   | Rotation history               |
//! | GET    | `/api/trades`                          | Cross-trader trade history     |
//! | GET    | `/api/ticker-pool`                     | Discovery pool                 |
//! | GET    | `/api/api-usage`                       | Market-data quota stats        |
//! | POST   | `/api/scheduled/execute-trades`        | 🔑 Run a trading session       |
//! | POST   | `/api/scheduled/portfolio-health-check`| 🔑 Health report               |
//! | POST   | `/api/scheduled/update-prices`         | 🔑 Refresh held-ticker prices  |
//! | GET    | `/api/scheduled/health`                | Liveness probe (no auth)       |

pub mod analyze;
pub mod scheduled;
pub mod tickers;
pub mod traders;
pub mod watchlist;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::require_api_key;
use crate::state::SharedState;

/// Assemble the full application router.
pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Only the cron-facing endpoints sit behind the key; the health probe
    // stays open so the scheduler can verify the app is up.
    let scheduled = Router::new()
        .route("/api/scheduled/execute-trades", post(scheduled::execute_trades))
        .route(
            "/api/scheduled/portfolio-health-check",
            post(scheduled::portfolio_health_check),
        )
        .route("/api/scheduled/update-prices", post(scheduled::update_prices))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        // ── Analysis ──────────────────────────────────────────────────────────
        .route("/analyze", post(analyze::analyze))
        // ── Traders ───────────────────────────────────────────────────────────
        .route(
            "/api/traders",
            get(traders::list_traders).post(traders::create_trader),
        )
        .route(
            "/api/traders/:id",
            get(traders::get_trader)
                .put(traders::update_trader)
                .delete(traders::delete_trader),
        )
        .route(
            "/api/traders/:id/trades",
            get(traders::trader_trades).post(traders::execute_trade),
        )
        .route("/api/traders/:id/portfolio", get(traders::trader_portfolio))
        // ── Watchlists ────────────────────────────────────────────────────────
        .route(
            "/api/traders/:id/watchlist",
            get(watchlist::get_watchlist)
                .put(watchlist::set_watchlist)
                .delete(watchlist::clear_watchlist),
        )
        .route(
            "/api/traders/:id/watchlist/history",
            get(watchlist::watchlist_history),
        )
        // ── History / Lookups ─────────────────────────────────────────────────
        .route("/api/trades", get(traders::all_trades))
        .route("/api/ticker-pool", get(tickers::ticker_pool))
        .route("/api/api-usage", get(tickers::api_usage))
        // ── Scheduled ─────────────────────────────────────────────────────────
        .route("/api/scheduled/health", get(scheduled::health))
        .merge(scheduled)
        // ── Middleware ────────────────────────────────────────────────────────
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
