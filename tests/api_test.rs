//! End-to-end tests for the REST surface, driven through the axum router
//! with an in-memory SQLite pool.  Nothing here touches the network: the
//! market-data base URL points at a closed port, and the only analysis test
//! asserts the inline per-ticker error path.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use papertrader::config::AppConfig;
use papertrader::limiter::{ApiLimiter, LimiterConfig};
use papertrader::market::MarketDataClient;
use papertrader::routes;
use papertrader::state::AppState;

const SCHEDULER_KEY: &str = "test-scheduler-key";

async fn test_app() -> Router {
    let pool = papertrader::db::init_pool("sqlite::memory:").await.unwrap();
    papertrader::db::seed_ticker_pool(&pool).await.unwrap();

    let config = AppConfig {
        database_url: "sqlite::memory:".into(),
        scheduler_api_key: SCHEDULER_KEY.into(),
        market_api_key: "test".into(),
        // A port nothing listens on; any fetch fails immediately.
        market_base_url: "http://127.0.0.1:9".into(),
        bind_addr: "127.0.0.1:0".into(),
    };

    let market = MarketDataClient::new(&config.market_base_url, &config.market_api_key).unwrap();
    let limiter = ApiLimiter::new(LimiterConfig {
        min_interval_secs: 0,
        ..LimiterConfig::default()
    });

    routes::router(Arc::new(AppState {
        db: pool,
        market,
        limiter,
        config,
    }))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    send_with_headers(app, method, uri, body, &[]).await
}

async fn send_with_headers(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }

    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, value)
}

async fn create_trader(app: &Router, name: &str, balance: f64) -> i64 {
    let (status, body) = send(
        app,
        "POST",
        "/api/traders",
        Some(json!({ "name": name, "initial_balance": balance })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create trader failed: {body}");
    body["id"].as_i64().unwrap()
}

mod trader_endpoints {
    use super::*;

    #[tokio::test]
    async fn list_is_empty_initially() {
        let app = test_app().await;

        let (status, body) = send(&app, "GET", "/api/traders", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["traders"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn create_returns_full_summary() {
        let app = test_app().await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/traders",
            Some(json!({
                "name": "New Trader",
                "initial_balance": 15000.0,
                "risk_tolerance": "high",
                "trading_ethos": "Growth focused strategy"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["name"], "New Trader");
        assert_eq!(body["status"], "active");
        assert_eq!(body["initial_balance"], 15000.0);
        assert_eq!(body["current_balance"], 15000.0);
        assert_eq!(body["risk_tolerance"], "high");
        assert_eq!(body["trading_ethos"], "Growth focused strategy");
        assert_eq!(body["total_trades"], 0);
        assert_eq!(body["trading_timezone"], "America/New_York");
    }

    #[tokio::test]
    async fn create_requires_a_name() {
        let app = test_app().await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/traders",
            Some(json!({ "initial_balance": 10000.0 })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("name"));
    }

    #[tokio::test]
    async fn create_rejects_duplicate_names() {
        let app = test_app().await;
        create_trader(&app, "Dup", 10_000.0).await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/traders",
            Some(json!({ "name": "Dup" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("already exists"));
    }

    #[tokio::test]
    async fn create_rejects_tiny_balances() {
        let app = test_app().await;

        let (status, _) = send(
            &app,
            "POST",
            "/api/traders",
            Some(json!({ "name": "Pauper", "initial_balance": 99.99 })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_by_id_and_missing_id() {
        let app = test_app().await;
        let id = create_trader(&app, "Findable", 10_000.0).await;

        let (status, body) = send(&app, "GET", &format!("/api/traders/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"].as_i64().unwrap(), id);

        let (status, _) = send(&app, "GET", "/api/traders/99999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_changes_fields() {
        let app = test_app().await;
        let id = create_trader(&app, "Before", 10_000.0).await;

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/api/traders/{id}"),
            Some(json!({
                "name": "After",
                "status": "paused",
                "risk_tolerance": "low",
                "trading_ethos": "Conservative approach"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "After");
        assert_eq!(body["status"], "paused");
        assert_eq!(body["risk_tolerance"], "low");
        assert_eq!(body["trading_ethos"], "Conservative approach");
    }

    #[tokio::test]
    async fn update_rejects_invalid_status() {
        let app = test_app().await;
        let id = create_trader(&app, "Strict", 10_000.0).await;

        let (status, _) = send(
            &app,
            "PUT",
            &format!("/api/traders/{id}"),
            Some(json!({ "status": "sleeping" })),
        )
        .await;

        // Serde rejects the unknown enum variant before the handler runs.
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn delete_removes_trader() {
        let app = test_app().await;
        let id = create_trader(&app, "Doomed", 10_000.0).await;

        let (status, body) = send(&app, "DELETE", &format!("/api/traders/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].as_str().unwrap().contains("deleted"));

        let (status, _) = send(&app, "GET", &format!("/api/traders/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

mod trade_endpoints {
    use super::*;

    async fn buy(app: &Router, id: i64, ticker: &str, quantity: i64, price: f64) -> (StatusCode, Value) {
        send(
            app,
            "POST",
            &format!("/api/traders/{id}/trades"),
            Some(json!({
                "ticker": ticker,
                "action": "buy",
                "quantity": quantity,
                "price": price
            })),
        )
        .await
    }

    #[tokio::test]
    async fn buy_updates_balance_and_portfolio() {
        let app = test_app().await;
        let id = create_trader(&app, "Buyer", 10_000.0).await;

        let (status, trade) = buy(&app, id, "AAPL", 10, 150.0).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(trade["action"], "buy");
        assert_eq!(trade["total_amount"], 1500.0);
        assert_eq!(trade["balance_after"], 8500.0);

        let (_, portfolio) = send(&app, "GET", &format!("/api/traders/{id}/portfolio"), None).await;
        assert_eq!(portfolio["current_balance"], 8500.0);
        let holdings = portfolio["portfolio"].as_array().unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0]["ticker"], "AAPL");
        assert_eq!(holdings[0]["quantity"], 10);
    }

    #[tokio::test]
    async fn sell_reduces_position() {
        let app = test_app().await;
        let id = create_trader(&app, "Seller", 10_000.0).await;
        buy(&app, id, "AAPL", 10, 100.0).await;

        let (status, trade) = send(
            &app,
            "POST",
            &format!("/api/traders/{id}/trades"),
            Some(json!({ "ticker": "AAPL", "action": "sell", "quantity": 4, "price": 120.0 })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(trade["action"], "sell");
        assert_eq!(trade["balance_after"], 9480.0);

        let (_, portfolio) = send(&app, "GET", &format!("/api/traders/{id}/portfolio"), None).await;
        assert_eq!(portfolio["portfolio"][0]["quantity"], 6);
    }

    #[tokio::test]
    async fn buy_rejects_insufficient_balance() {
        let app = test_app().await;
        let id = create_trader(&app, "Overreacher", 1000.0).await;

        let (status, body) = buy(&app, id, "AAPL", 100, 150.0).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Insufficient balance"));
    }

    #[tokio::test]
    async fn sell_rejects_unheld_shares() {
        let app = test_app().await;
        let id = create_trader(&app, "Shortless", 10_000.0).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/traders/{id}/trades"),
            Some(json!({ "ticker": "AAPL", "action": "sell", "quantity": 1, "price": 100.0 })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Insufficient shares"));
    }

    #[tokio::test]
    async fn inactive_traders_cannot_trade() {
        let app = test_app().await;
        let id = create_trader(&app, "Paused", 10_000.0).await;
        send(
            &app,
            "PUT",
            &format!("/api/traders/{id}"),
            Some(json!({ "status": "paused" })),
        )
        .await;

        let (status, body) = buy(&app, id, "AAPL", 1, 100.0).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("not active"));
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let app = test_app().await;
        let id = create_trader(&app, "Sloppy", 10_000.0).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/traders/{id}/trades"),
            Some(json!({ "ticker": "AAPL", "action": "buy" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("required"));
    }

    #[tokio::test]
    async fn history_is_paginated() {
        let app = test_app().await;
        let id = create_trader(&app, "Busy", 100_000.0).await;
        for i in 0..3 {
            buy(&app, id, "AAPL", 1, 100.0 + i as f64).await;
        }

        let (status, body) = send(
            &app,
            "GET",
            &format!("/api/traders/{id}/trades?page=1&per_page=2"),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 3);
        assert_eq!(body["pages"], 2);
        assert_eq!(body["current_page"], 1);
        assert_eq!(body["trades"].as_array().unwrap().len(), 2);
        assert_eq!(body["trades"][0]["trader_name"], "Busy");
    }

    #[tokio::test]
    async fn all_trades_filters_by_ticker() {
        let app = test_app().await;
        let id = create_trader(&app, "Mixed", 100_000.0).await;
        buy(&app, id, "AAPL", 1, 100.0).await;
        buy(&app, id, "MSFT", 1, 200.0).await;

        let (status, body) = send(&app, "GET", "/api/trades?ticker=aapl", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["trades"][0]["ticker"], "AAPL");
    }
}

mod watchlist_endpoints {
    use super::*;

    #[tokio::test]
    async fn default_watchlist_uses_timezone_pool() {
        let app = test_app().await;
        let id = create_trader(&app, "Pooled", 10_000.0).await;

        let (status, body) = send(&app, "GET", &format!("/api/traders/{id}/watchlist"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["use_custom_watchlist"], false);
        assert_eq!(body["timezone"], "America/New_York");
        // Seeded NY pool has 7 tickers
        assert_eq!(body["pool"].as_array().unwrap().len(), 7);
    }

    #[tokio::test]
    async fn set_and_clear_custom_watchlist() {
        let app = test_app().await;
        let id = create_trader(&app, "Customizer", 10_000.0).await;

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/api/traders/{id}/watchlist"),
            Some(json!({ "tickers": [" aapl", "MSFT", "aapl"], "watchlist_size": 4 })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["custom_watchlist"], json!(["AAPL", "MSFT"]));
        assert_eq!(body["watchlist_size"], 4);

        let (status, body) = send(&app, "DELETE", &format!("/api/traders/{id}/watchlist"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].as_str().unwrap().contains("reverted"));

        let (_, body) = send(&app, "GET", &format!("/api/traders/{id}/watchlist"), None).await;
        assert_eq!(body["use_custom_watchlist"], false);
    }

    #[tokio::test]
    async fn empty_watchlist_is_rejected() {
        let app = test_app().await;
        let id = create_trader(&app, "Empty", 10_000.0).await;

        let (status, _) = send(
            &app,
            "PUT",
            &format!("/api/traders/{id}/watchlist"),
            Some(json!({ "tickers": [] })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn history_starts_empty() {
        let app = test_app().await;
        let id = create_trader(&app, "Fresh", 10_000.0).await;

        let (status, body) = send(
            &app,
            "GET",
            &format!("/api/traders/{id}/watchlist/history"),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
    }
}

mod lookup_endpoints {
    use super::*;

    #[tokio::test]
    async fn ticker_pool_filters_by_timezone() {
        let app = test_app().await;

        let (status, body) = send(&app, "GET", "/api/ticker-pool", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 21);

        let (_, body) = send(
            &app,
            "GET",
            "/api/ticker-pool?timezone=Europe/London",
            None,
        )
        .await;
        assert_eq!(body["count"], 7);
        assert!(body["tickers"]
            .as_array()
            .unwrap()
            .iter()
            .all(|t| t["exchange"] == "LSE"));
    }

    #[tokio::test]
    async fn api_usage_reports_quota() {
        let app = test_app().await;

        let (status, body) = send(&app, "GET", "/api/api-usage?days=3", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["today"]["calls"], 0);
        assert_eq!(body["limits"]["daily"], 25);
        assert_eq!(body["recent"]["days"], 3);
    }

    #[tokio::test]
    async fn analyze_requires_tickers() {
        let app = test_app().await;

        let (status, _) = send(&app, "POST", "/analyze", Some(json!({ "tickers": [] }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn analyze_reports_per_ticker_errors_inline() {
        let app = test_app().await;

        // Nothing listens on the market-data port; each ticker fails inline.
        let (status, body) = send(
            &app,
            "POST",
            "/analyze",
            Some(json!({ "tickers": ["AAPL"] })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["ticker"], "AAPL");
        assert!(results[0]["error"].as_str().unwrap().contains("Error analyzing ticker"));
    }
}

mod scheduled_endpoints {
    use super::*;

    #[tokio::test]
    async fn health_probe_needs_no_auth() {
        let app = test_app().await;

        let (status, body) = send(&app, "GET", "/api/scheduled/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn missing_key_is_unauthorized() {
        let app = test_app().await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/scheduled/execute-trades",
            Some(json!({})),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].as_str().unwrap().contains("Invalid API key"));
    }

    #[tokio::test]
    async fn wrong_key_is_unauthorized() {
        let app = test_app().await;

        let (status, _) = send_with_headers(
            &app,
            "POST",
            "/api/scheduled/execute-trades",
            Some(json!({})),
            &[("X-API-Key", "nope")],
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn execute_trades_with_no_traders_is_a_noop() {
        let app = test_app().await;

        let (status, body) = send_with_headers(
            &app,
            "POST",
            "/api/scheduled/execute-trades",
            Some(json!({ "timezone": "Europe/London", "time_of_day": "midday" })),
            &[("X-API-Key", SCHEDULER_KEY)],
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["result"]["traders_processed"], 0);
        assert!(body["result"]["message"]
            .as_str()
            .unwrap()
            .contains("No active traders"));
    }

    #[tokio::test]
    async fn api_key_works_in_query_string() {
        let app = test_app().await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/scheduled/portfolio-health-check?api_key={SCHEDULER_KEY}"),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["result"]["traders"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn health_check_reports_each_trader() {
        let app = test_app().await;
        let id = create_trader(&app, "Tracked", 10_000.0).await;
        send(
            &app,
            "POST",
            &format!("/api/traders/{id}/trades"),
            Some(json!({ "ticker": "AAPL", "action": "buy", "quantity": 10, "price": 100.0 })),
        )
        .await;

        let (status, body) = send_with_headers(
            &app,
            "POST",
            "/api/scheduled/portfolio-health-check",
            None,
            &[("X-API-Key", SCHEDULER_KEY)],
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let traders = body["result"]["traders"].as_array().unwrap();
        assert_eq!(traders.len(), 1);
        assert_eq!(traders[0]["positions"], 1);
        assert_eq!(traders[0]["total_value"], 10_000.0);
    }

    #[tokio::test]
    async fn update_prices_with_nothing_held_updates_zero() {
        let app = test_app().await;

        let (status, body) = send_with_headers(
            &app,
            "POST",
            "/api/scheduled/update-prices",
            None,
            &[("X-API-Key", SCHEDULER_KEY)],
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["updated"], 0);
    }
}
