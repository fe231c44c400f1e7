//! # Papertrader — Simulated Stock-Trading Backend
//!
//! ```text
//!  ┌─────────────┐  POST /api/scheduled/execute-trades  ┌──────────────────────────┐
//!  │  Cron       │ ───────────────────────────────────▶ │ AppState                 │
//!  │  (webhook)  │  POST /api/scheduled/update-prices   │ ├─ SqlitePool            │
//!  └─────────────┘                                      │ ├─ MarketDataClient      │
//!                                                       │ ├─ ApiLimiter  ⏱️        │
//!  ┌─────────────┐  POST /analyze                       │ └─ AppConfig             │
//!  │  Dashboard  │  GET  /api/traders/*                 └──────────────────────────┘
//!  └─────────────┘  GET  /api/ticker-pool
//! ```

use std::net::SocketAddr;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use papertrader::config::AppConfig;
use papertrader::routes;
use papertrader::state::build_state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("papertrader=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║           PAPERTRADER — Trading Backend               ║
  ║  Analyze · Traders · Watchlists · Scheduled Sessions  ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Config + shared state (pool, migrations, seed) ─────────────────────
    let config = AppConfig::from_env();
    let bind_addr = config.bind_addr.clone();
    let state = build_state(config).await?;

    // ── 4. Router ─────────────────────────────────────────────────────────────
    let app = routes::router(state);

    // ── 5. Bind & Serve ───────────────────────────────────────────────────────
    let addr: SocketAddr = bind_addr.parse()?;

    info!(?addr, "🚀 Papertrader server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
