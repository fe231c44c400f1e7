//! # auth — Scheduler API Key Middleware
//!
//! Guards the `/api/scheduled/*` endpoints with a static key so only the
//! external cron (GitHub Actions) can trigger trading sessions.
//!
//! The key is accepted from the `X-API-Key` header or an `api_key` query
//! parameter and compared against `SCHEDULER_API_KEY`.
//!
//! ## Usage
//! ```bash
//! curl -X POST -H "X-API-Key: <key>" http://localhost:3000/api/scheduled/execute-trades
//! ```

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::state::SharedState;

/// Axum middleware — reject requests without a valid scheduler key.
pub async fn require_api_key(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let expected = state.config.scheduler_api_key.as_str();

    // Owned copy; `request` is consumed by `next.run` on the happy path.
    let provided: String = {
        let header_key = request
            .headers()
            .get("X-API-Key")
            .and_then(|v| v.to_str().ok());

        let query_key = request
            .uri()
            .query()
            .and_then(|q| q.split('&').find_map(|pair| pair.strip_prefix("api_key=")));

        header_key.or(query_key).unwrap_or("").to_string()
    };

    if !provided.is_empty() && provided == expected {
        next.run(request).await
    } else {
        warn!(path = %request.uri().path(), "❌ Unauthorized scheduled-task request");
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "ok":    false,
                "error": "Unauthorized - Invalid API key",
                "hint":  "Set the X-API-Key header or api_key query parameter"
            })),
        )
            .into_response()
    }
}
