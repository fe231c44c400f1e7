//! # routes::traders
//!
//! Trader CRUD, trade history and manual trade execution.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::db::{self, TradeMeta};
use crate::engine::analytics::trader_summary;
use crate::error::AppError;
use crate::models::{HoldingView, RiskTolerance, TradeAction, TradeRecord, Trader, TraderStatus};
use crate::state::SharedState;

/// Traders start with at least this much simulated cash.
const MIN_INITIAL_BALANCE: f64 = 100.0;
const DEFAULT_INITIAL_BALANCE: f64 = 10_000.0;

// ─── GET /api/traders ─────────────────────────────────────────────────────────

pub async fn list_traders(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, AppError> {
    let traders = sqlx::query_as::<_, Trader>("SELECT * FROM traders ORDER BY id")
        .fetch_all(&state.db)
        .await?;

    let mut summaries = Vec::with_capacity(traders.len());
    for trader in &traders {
        summaries.push(trader_summary(&state.db, trader).await?);
    }

    Ok(Json(json!({ "traders": summaries })))
}

// ─── POST /api/traders ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateTraderBody {
    pub name: Option<String>,
    pub initial_balance: Option<f64>,
    pub strategy_name: Option<String>,
    pub risk_tolerance: Option<RiskTolerance>,
    pub trading_ethos: Option<String>,
    pub trading_timezone: Option<String>,
}

pub async fn create_trader(
    State(state): State<SharedState>,
    Json(body): Json<CreateTraderBody>,
) -> Result<impl IntoResponse, AppError> {
    let name = match body.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return Err(AppError::BadRequest("Trader name is required".into())),
    };

    let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM traders WHERE name = ?")
        .bind(&name)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(AppError::BadRequest(
            "Trader with this name already exists".into(),
        ));
    }

    let initial_balance = body.initial_balance.unwrap_or(DEFAULT_INITIAL_BALANCE);
    if initial_balance < MIN_INITIAL_BALANCE {
        return Err(AppError::BadRequest(format!(
            "Initial balance must be at least ${MIN_INITIAL_BALANCE:.0}"
        )));
    }

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO traders
            (name, status, initial_balance, current_balance, strategy_name,
             risk_tolerance, trading_ethos, trading_timezone, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&name)
    .bind(TraderStatus::Active)
    .bind(initial_balance)
    .bind(initial_balance)
    .bind(body.strategy_name.as_deref().unwrap_or("default"))
    .bind(body.risk_tolerance.unwrap_or_default())
    .bind(body.trading_ethos.as_deref())
    .bind(
        body.trading_timezone
            .as_deref()
            .unwrap_or(crate::config::DEFAULT_TIMEZONE),
    )
    .bind(chrono::Utc::now())
    .fetch_one(&state.db)
    .await?;

    let trader = db::require_trader(&state.db, id).await?;
    info!(trader = %trader.name, balance = initial_balance, "Created new trader");

    let summary = trader_summary(&state.db, &trader).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

// ─── GET /api/traders/:id ─────────────────────────────────────────────────────

pub async fn get_trader(
    State(state): State<SharedState>,
    Path(trader_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let trader = db::require_trader(&state.db, trader_id).await?;
    let summary = trader_summary(&state.db, &trader).await?;
    Ok(Json(summary))
}

// ─── PUT /api/traders/:id ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UpdateTraderBody {
    pub name: Option<String>,
    pub status: Option<TraderStatus>,
    pub strategy_name: Option<String>,
    pub risk_tolerance: Option<RiskTolerance>,
    pub trading_ethos: Option<String>,
    pub trading_timezone: Option<String>,
    pub watchlist_size: Option<i64>,
}

pub async fn update_trader(
    State(state): State<SharedState>,
    Path(trader_id): Path<i64>,
    Json(body): Json<UpdateTraderBody>,
) -> Result<impl IntoResponse, AppError> {
    let mut trader = db::require_trader(&state.db, trader_id).await?;

    if let Some(name) = body.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::BadRequest("Trader name cannot be empty".into()));
        }
        if name != trader.name {
            let taken: Option<(i64,)> =
                sqlx::query_as("SELECT id FROM traders WHERE name = ? AND id != ?")
                    .bind(&name)
                    .bind(trader_id)
                    .fetch_optional(&state.db)
                    .await?;
            if taken.is_some() {
                return Err(AppError::BadRequest(
                    "Trader with this name already exists".into(),
                ));
            }
        }
        trader.name = name;
    }
    if let Some(status) = body.status {
        trader.status = status;
    }
    if let Some(strategy_name) = body.strategy_name {
        trader.strategy_name = strategy_name;
    }
    if let Some(risk_tolerance) = body.risk_tolerance {
        trader.risk_tolerance = risk_tolerance;
    }
    if let Some(trading_ethos) = body.trading_ethos {
        trader.trading_ethos = Some(trading_ethos);
    }
    if let Some(trading_timezone) = body.trading_timezone {
        trader.trading_timezone = trading_timezone;
    }
    if let Some(watchlist_size) = body.watchlist_size {
        if watchlist_size <= 0 {
            return Err(AppError::BadRequest(
                "Watchlist size must be positive".into(),
            ));
        }
        trader.watchlist_size = watchlist_size;
    }

    sqlx::query(
        r#"
        UPDATE traders
        SET name = ?, status = ?, strategy_name = ?, risk_tolerance = ?,
            trading_ethos = ?, trading_timezone = ?, watchlist_size = ?
        WHERE id = ?
        "#,
    )
    .bind(&trader.name)
    .bind(trader.status)
    .bind(&trader.strategy_name)
    .bind(trader.risk_tolerance)
    .bind(trader.trading_ethos.as_deref())
    .bind(&trader.trading_timezone)
    .bind(trader.watchlist_size)
    .bind(trader_id)
    .execute(&state.db)
    .await?;

    info!(trader = %trader.name, "Updated trader");

    let trader = db::require_trader(&state.db, trader_id).await?;
    let summary = trader_summary(&state.db, &trader).await?;
    Ok(Json(summary))
}

// ─── DELETE /api/traders/:id ──────────────────────────────────────────────────

pub async fn delete_trader(
    State(state): State<SharedState>,
    Path(trader_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let trader = db::require_trader(&state.db, trader_id).await?;

    sqlx::query("DELETE FROM traders WHERE id = ?")
        .bind(trader_id)
        .execute(&state.db)
        .await?;

    info!(trader = %trader.name, "Deleted trader");
    Ok(Json(json!({ "message": "Trader deleted successfully" })))
}

// ─── Pagination ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub ticker: Option<String>,
}

impl PageQuery {
    fn resolve(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(50).clamp(1, 500);
        (page, per_page)
    }
}

fn page_count(total: i64, per_page: i64) -> i64 {
    (total + per_page - 1) / per_page
}

// ─── GET /api/traders/:id/trades ──────────────────────────────────────────────

pub async fn trader_trades(
    State(state): State<SharedState>,
    Path(trader_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    db::require_trader(&state.db, trader_id).await?;
    let (page, per_page) = query.resolve();

    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trades WHERE trader_id = ?")
        .bind(trader_id)
        .fetch_one(&state.db)
        .await?;

    let trades = sqlx::query_as::<_, TradeRecord>(
        r#"
        SELECT t.*, tr.name AS trader_name
        FROM trades t
        JOIN traders tr ON tr.id = t.trader_id
        WHERE t.trader_id = ?
        ORDER BY t.executed_at DESC, t.id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(trader_id)
    .bind(per_page)
    .bind((page - 1) * per_page)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({
        "trades":       trades,
        "total":        total,
        "pages":        page_count(total, per_page),
        "current_page": page,
    })))
}

// ─── POST /api/traders/:id/trades ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ManualTradeBody {
    pub ticker: Option<String>,
    pub action: Option<TradeAction>,
    pub quantity: Option<i64>,
    pub price: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub recommendation: Option<String>,
    pub confidence: Option<f64>,
    pub notes: Option<String>,
}

pub async fn execute_trade(
    State(state): State<SharedState>,
    Path(trader_id): Path<i64>,
    Json(body): Json<ManualTradeBody>,
) -> Result<impl IntoResponse, AppError> {
    let trader = db::require_trader(&state.db, trader_id).await?;

    let ticker = body
        .ticker
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::BadRequest("ticker is required".into()))?
        .to_string();
    let action = body
        .action
        .ok_or_else(|| AppError::BadRequest("action is required".into()))?;
    let quantity = body
        .quantity
        .ok_or_else(|| AppError::BadRequest("quantity is required".into()))?;
    let price = body
        .price
        .ok_or_else(|| AppError::BadRequest("price is required".into()))?;

    if !trader.is_active() {
        return Err(AppError::BadRequest("Trader is not active".into()));
    }
    if price <= 0.0 {
        return Err(AppError::BadRequest("Price must be positive".into()));
    }

    let meta = TradeMeta {
        rsi: body.rsi,
        macd: body.macd,
        sma_20: body.sma_20,
        sma_50: body.sma_50,
        recommendation: body.recommendation,
        confidence: body.confidence,
        notes: body.notes,
    };

    let trade = match action {
        TradeAction::Buy => {
            db::execute_buy(&state.db, trader_id, &ticker, quantity, price, meta).await?
        }
        TradeAction::Sell => {
            db::execute_sell(&state.db, trader_id, &ticker, quantity, price, meta).await?
        }
    };

    info!(
        trader = %trader.name,
        ticker = %trade.ticker,
        action = ?trade.action,
        quantity = trade.quantity,
        "Executed trade"
    );

    Ok((StatusCode::CREATED, Json(trade)))
}

// ─── GET /api/traders/:id/portfolio ───────────────────────────────────────────

pub async fn trader_portfolio(
    State(state): State<SharedState>,
    Path(trader_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let trader = db::require_trader(&state.db, trader_id).await?;
    let holdings = db::portfolio_for(&state.db, trader_id).await?;

    let mut views = Vec::with_capacity(holdings.len());
    for holding in holdings {
        let price = db::price_for(&state.db, &holding.ticker)
            .await?
            .map(|p| p.current_price);
        views.push(HoldingView::new(holding, price));
    }

    Ok(Json(json!({
        "trader_id":       trader_id,
        "trader_name":     trader.name,
        "current_balance": trader.current_balance,
        "portfolio":       views,
    })))
}

// ─── GET /api/trades ──────────────────────────────────────────────────────────

pub async fn all_trades(
    State(state): State<SharedState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (page, per_page) = query.resolve();
    let ticker = query.ticker.as_deref().map(str::to_uppercase);

    let (total,): (i64,) = match &ticker {
        Some(ticker) => sqlx::query_as("SELECT COUNT(*) FROM trades WHERE ticker = ?")
            .bind(ticker)
            .fetch_one(&state.db)
            .await?,
        None => sqlx::query_as("SELECT COUNT(*) FROM trades")
            .fetch_one(&state.db)
            .await?,
    };

    let base = r#"
        SELECT t.*, tr.name AS trader_name
        FROM trades t
        JOIN traders tr ON tr.id = t.trader_id
    "#;

    let trades = match &ticker {
        Some(ticker) => {
            sqlx::query_as::<_, TradeRecord>(&format!(
                "{base} WHERE t.ticker = ? ORDER BY t.executed_at DESC, t.id DESC LIMIT ? OFFSET ?"
            ))
            .bind(ticker)
            .bind(per_page)
            .bind((page - 1) * per_page)
            .fetch_all(&state.db)
            .await?
        }
        None => {
            sqlx::query_as::<_, TradeRecord>(&format!(
                "{base} ORDER BY t.executed_at DESC, t.id DESC LIMIT ? OFFSET ?"
            ))
            .bind(per_page)
            .bind((page - 1) * per_page)
            .fetch_all(&state.db)
            .await?
        }
    };

    Ok(Json(json!({
        "trades":       trades,
        "total":        total,
        "pages":        page_count(total, per_page),
        "current_page": page,
    })))
}
