//! # limiter — Market-Data Quota Engine
//!
//! The last gate before any outbound market-data call.  Keeps the backend
//! inside the vendor's free-tier limits:
//!
//! 1. **Daily cap**      — calls per calendar day, persisted in `api_usage_log`
//! 2. **Safety buffer**  — calls held back from the daily cap
//! 3. **Minute cap**     — calls per rolling minute, tracked in-memory
//! 4. **Throttle**       — fixed minimum delay between consecutive calls

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{env_i64, env_u64};
use crate::error::AppError;
use crate::models::ApiUsageRow;

// ─── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Calls allowed per calendar day (0 = unlimited).
    pub daily_limit: i64,
    /// Calls allowed per rolling minute.
    pub minute_limit: u32,
    /// Calls held back from the daily cap.
    pub safety_buffer: i64,
    /// Minimum seconds between consecutive calls.
    pub min_interval_secs: u64,
}

impl LimiterConfig {
    pub fn from_env() -> Self {
        Self {
            daily_limit: env_i64("API_DAILY_LIMIT", 25),
            minute_limit: env_i64("API_MINUTE_LIMIT", 5) as u32,
            safety_buffer: env_i64("API_SAFETY_BUFFER", 2),
            min_interval_secs: env_u64("API_MIN_INTERVAL_SECS", 12),
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            daily_limit: 25,
            minute_limit: 5,
            safety_buffer: 2,
            min_interval_secs: 12,
        }
    }
}

// ─── Internal State ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MinuteWindow {
    window_start: Option<Instant>,
    count: u32,
    last_request: Option<Instant>,
}

// ─── Decision ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum QuotaDecision {
    Allowed(String),
    Denied(String),
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed(_))
    }

    pub fn reason(&self) -> &str {
        match self {
            QuotaDecision::Allowed(r) | QuotaDecision::Denied(r) => r,
        }
    }
}

// ─── Status Types (for /api/api-usage) ───────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub calls: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageToday {
    pub date: NaiveDate,
    pub calls: i64,
    pub remaining: i64,
    pub limit: i64,
    pub percentage_used: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageRecent {
    pub days: i64,
    pub total_calls: i64,
    pub avg_daily: f64,
    pub daily_breakdown: Vec<DailyUsage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageLimits {
    pub daily: i64,
    pub per_minute: u32,
    pub min_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageStats {
    pub today: UsageToday,
    pub recent: UsageRecent,
    pub limits: UsageLimits,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapacityEstimate {
    pub can_proceed: bool,
    pub current_usage: i64,
    pub estimated_calls: i64,
    pub remaining: i64,
    pub buffer: i64,
    pub message: String,
}

// ─── Limiter ──────────────────────────────────────────────────────────────────

pub struct ApiLimiter {
    window: Mutex<MinuteWindow>,
    config: LimiterConfig,
}

impl ApiLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            window: Mutex::new(MinuteWindow::default()),
            config,
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    // ─── Pre-Call Check ───────────────────────────────────────────────────────

    /// Can another market-data call be made right now?
    pub async fn can_make_request(&self, pool: &SqlitePool) -> Result<QuotaDecision, AppError> {
        let today_count = self.today_count(pool).await?;

        // [1] Daily cap (minus the safety buffer)
        if self.config.daily_limit > 0 {
            let remaining = self.config.daily_limit - today_count - self.config.safety_buffer;
            if remaining <= 0 {
                return Ok(QuotaDecision::Denied(format!(
                    "Daily limit reached ({today_count}/{} calls)",
                    self.config.daily_limit
                )));
            }
        }

        // [2] Minute cap
        let mut window = self.window.lock().await;
        if let Some(start) = window.window_start {
            if start.elapsed() >= Duration::from_secs(60) {
                window.window_start = Some(Instant::now());
                window.count = 0;
            }
        } else {
            window.window_start = Some(Instant::now());
            window.count = 0;
        }

        if window.count >= self.config.minute_limit {
            return Ok(QuotaDecision::Denied(format!(
                "Minute limit reached ({}/{} calls)",
                window.count, self.config.minute_limit
            )));
        }

        Ok(QuotaDecision::Allowed(format!(
            "OK ({today_count}/{} daily, {}/{}/min)",
            self.config.daily_limit, window.count, self.config.minute_limit
        )))
    }

    // ─── Throttle ─────────────────────────────────────────────────────────────

    /// Sleep long enough to respect the per-minute pacing, then claim a slot
    /// in the current minute window.
    pub async fn throttle(&self) {
        let min_interval = Duration::from_secs(self.config.min_interval_secs);

        // Compute the wait while holding the lock, sleep without it.
        let wait = {
            let window = self.window.lock().await;
            match window.last_request {
                Some(last) => min_interval.saturating_sub(last.elapsed()),
                None => Duration::ZERO,
            }
        };

        if !wait.is_zero() {
            info!(wait_secs = wait.as_secs_f64(), "⏱️  Throttling to respect rate limit");
            tokio::time::sleep(wait).await;
        }

        let mut window = self.window.lock().await;
        window.last_request = Some(Instant::now());
        window.count += 1;
    }

    // ─── Recording ────────────────────────────────────────────────────────────

    /// Record one call against today's counter.
    pub async fn record_call(&self, pool: &SqlitePool) -> Result<(), AppError> {
        let today = Utc::now().date_naive();

        sqlx::query(
            r#"
            INSERT INTO api_usage_log (date, call_count, last_reset, created_at)
            VALUES (?, 1, ?, ?)
            ON CONFLICT(date) DO UPDATE SET call_count = call_count + 1
            "#,
        )
        .bind(today)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(pool)
        .await?;

        debug!("Recorded market-data API call");
        Ok(())
    }

    /// Reset a day's counter (mainly for testing and manual intervention).
    pub async fn reset_daily(
        &self,
        pool: &SqlitePool,
        date: Option<NaiveDate>,
    ) -> Result<(), AppError> {
        let target = date.unwrap_or_else(|| Utc::now().date_naive());

        sqlx::query("UPDATE api_usage_log SET call_count = 0, last_reset = ? WHERE date = ?")
            .bind(Utc::now())
            .bind(target)
            .execute(pool)
            .await?;

        info!(%target, "Reset daily API usage");
        Ok(())
    }

    // ─── Capacity / Stats ─────────────────────────────────────────────────────

    /// Is there enough quota left to run a whole trading session?
    pub async fn estimate_capacity(
        &self,
        pool: &SqlitePool,
        traders_count: i64,
        tickers_per_trader: i64,
    ) -> Result<CapacityEstimate, AppError> {
        let current_usage = self.today_count(pool).await?;
        let estimated_calls = traders_count * tickers_per_trader;
        let remaining = self.config.daily_limit - current_usage;
        let can_proceed = self.config.daily_limit == 0
            || estimated_calls <= remaining - self.config.safety_buffer;

        let message = format!(
            "{} capacity: {estimated_calls} calls needed, {remaining} remaining",
            if can_proceed { "✅ Sufficient" } else { "❌ Insufficient" }
        );

        Ok(CapacityEstimate {
            can_proceed,
            current_usage,
            estimated_calls,
            remaining,
            buffer: self.config.safety_buffer,
            message,
        })
    }

    pub async fn usage_stats(&self, pool: &SqlitePool, days: i64) -> Result<UsageStats, AppError> {
        let today = Utc::now().date_naive();
        let today_count = self.today_count(pool).await?;

        let start = today - chrono::Duration::days(days);
        let recent_rows = sqlx::query_as::<_, ApiUsageRow>(
            "SELECT * FROM api_usage_log WHERE date >= ? ORDER BY date DESC",
        )
        .bind(start)
        .fetch_all(pool)
        .await?;

        let total_calls: i64 = recent_rows.iter().map(|r| r.call_count).sum();
        let avg_daily = if recent_rows.is_empty() {
            0.0
        } else {
            total_calls as f64 / recent_rows.len() as f64
        };

        Ok(UsageStats {
            today: UsageToday {
                date: today,
                calls: today_count,
                remaining: (self.config.daily_limit - today_count).max(0),
                limit: self.config.daily_limit,
                percentage_used: if self.config.daily_limit > 0 {
                    today_count as f64 / self.config.daily_limit as f64 * 100.0
                } else {
                    0.0
                },
            },
            recent: UsageRecent {
                days,
                total_calls,
                avg_daily: (avg_daily * 10.0).round() / 10.0,
                daily_breakdown: recent_rows
                    .into_iter()
                    .map(|r| DailyUsage {
                        date: r.date,
                        calls: r.call_count,
                    })
                    .collect(),
            },
            limits: UsageLimits {
                daily: self.config.daily_limit,
                per_minute: self.config.minute_limit,
                min_interval_secs: self.config.min_interval_secs,
            },
        })
    }

    async fn today_count(&self, pool: &SqlitePool) -> Result<i64, AppError> {
        let today = Utc::now().date_naive();
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT call_count FROM api_usage_log WHERE date = ?")
                .bind(today)
                .fetch_optional(pool)
                .await?;

        Ok(row.map(|(c,)| c).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::test_pool;

    fn fast_limiter() -> ApiLimiter {
        ApiLimiter::new(LimiterConfig {
            daily_limit: 5,
            minute_limit: 3,
            safety_buffer: 1,
            min_interval_secs: 0,
        })
    }

    #[tokio::test]
    async fn allows_under_quota() {
        let pool = test_pool().await;
        let limiter = fast_limiter();

        let decision = limiter.can_make_request(&pool).await.unwrap();
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn denies_when_daily_cap_spent() {
        let pool = test_pool().await;
        let limiter = fast_limiter();

        // Daily limit 5, buffer 1 → the 4th call must be denied.
        for _ in 0..4 {
            limiter.record_call(&pool).await.unwrap();
        }

        let decision = limiter.can_make_request(&pool).await.unwrap();
        assert!(!decision.is_allowed());
        assert!(decision.reason().contains("Daily limit"));
    }

    #[tokio::test]
    async fn denies_when_minute_window_full() {
        let pool = test_pool().await;
        let limiter = fast_limiter();

        for _ in 0..3 {
            assert!(limiter.can_make_request(&pool).await.unwrap().is_allowed());
            limiter.throttle().await;
        }

        let decision = limiter.can_make_request(&pool).await.unwrap();
        assert!(!decision.is_allowed());
        assert!(decision.reason().contains("Minute limit"));
    }

    #[tokio::test]
    async fn record_call_upserts_daily_row() {
        let pool = test_pool().await;
        let limiter = fast_limiter();

        limiter.record_call(&pool).await.unwrap();
        limiter.record_call(&pool).await.unwrap();

        let stats = limiter.usage_stats(&pool, 1).await.unwrap();
        assert_eq!(stats.today.calls, 2);
        assert_eq!(stats.today.remaining, 3);
    }

    #[tokio::test]
    async fn capacity_estimate_blocks_oversized_sessions() {
        let pool = test_pool().await;
        let limiter = fast_limiter();

        let fits = limiter.estimate_capacity(&pool, 1, 2).await.unwrap();
        assert!(fits.can_proceed);

        let too_big = limiter.estimate_capacity(&pool, 3, 8).await.unwrap();
        assert!(!too_big.can_proceed);
        assert!(too_big.message.contains("Insufficient"));
    }

    #[tokio::test]
    async fn reset_clears_daily_counter() {
        let pool = test_pool().await;
        let limiter = fast_limiter();

        limiter.record_call(&pool).await.unwrap();
        limiter.reset_daily(&pool, None).await.unwrap();

        let stats = limiter.usage_stats(&pool, 1).await.unwrap();
        assert_eq!(stats.today.calls, 0);
    }
}
