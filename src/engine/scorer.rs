//! # engine::scorer
//!
//! Maps an [`IndicatorSnapshot`] to a signed score via fixed additive rules,
//! then to either user-facing display signals (the `/analyze` endpoint) or an
//! automated trading decision (the executor).  Same scoring core, different
//! thresholds and message register.

use serde::Serialize;

use crate::config::{
    risk_profile, DISPLAY_BUY_THRESHOLD, DISPLAY_SELL_THRESHOLD, DISPLAY_STRONG_BUY_THRESHOLD,
    DISPLAY_STRONG_SELL_THRESHOLD, MOMENTUM_STRONG_NEGATIVE, MOMENTUM_STRONG_POSITIVE,
    RSI_NEUTRAL_LOWER, RSI_NEUTRAL_UPPER, RSI_OVERBOUGHT, RSI_OVERSOLD, SCORE_MACD_CROSSOVER,
    SCORE_RSI_EXTREME, SCORE_STRONG_MOMENTUM, SCORE_STRONG_TREND, SCORE_WEAK_TREND,
};
use crate::engine::indicators::IndicatorSnapshot;
use crate::models::trader::RiskTolerance;

// ─── Score ────────────────────────────────────────────────────────────────────

/// Signed score plus the human-readable signals that produced it.
#[derive(Debug, Clone)]
pub struct ScoreBreakdown {
    pub score: i32,
    pub signals: Vec<String>,
}

/// Score the latest snapshot.  `display_mode` switches the message register
/// (emoji-rich for the UI, plain for trade notes) and adds the neutral-RSI
/// note that only the UI shows.
pub fn score_snapshot(s: &IndicatorSnapshot, display_mode: bool) -> ScoreBreakdown {
    let mut score = 0;
    let mut signals = Vec::new();

    // ── Trend ─────────────────────────────────────────────────────────────────
    if let (Some(sma_20), Some(sma_50)) = (s.sma_20, s.sma_50) {
        if s.close > sma_20 && sma_20 > sma_50 {
            signals.push(if display_mode {
                "✅ Strong uptrend: Price above both moving averages".to_string()
            } else {
                "Strong uptrend".to_string()
            });
            score += SCORE_STRONG_TREND;
        } else if s.close > sma_20 {
            signals.push(if display_mode {
                "↗️ Uptrend: Price above 20-day MA".to_string()
            } else {
                "Uptrend".to_string()
            });
            score += SCORE_WEAK_TREND;
        } else if s.close < sma_20 && sma_20 < sma_50 {
            signals.push(if display_mode {
                "❌ Strong downtrend: Price below both moving averages".to_string()
            } else {
                "Strong downtrend".to_string()
            });
            score -= SCORE_STRONG_TREND;
        } else if s.close < sma_20 {
            signals.push(if display_mode {
                "↘️ Downtrend: Price below 20-day MA".to_string()
            } else {
                "Downtrend".to_string()
            });
            score -= SCORE_WEAK_TREND;
        }
    }

    // ── RSI ───────────────────────────────────────────────────────────────────
    if let Some(rsi) = s.rsi {
        if rsi < RSI_OVERSOLD {
            signals.push(if display_mode {
                format!("🔥 Oversold (RSI: {rsi:.1}) - potential buy opportunity")
            } else {
                format!("Oversold (RSI: {rsi:.1})")
            });
            score += SCORE_RSI_EXTREME;
        } else if rsi > RSI_OVERBOUGHT {
            signals.push(if display_mode {
                format!("⚠️ Overbought (RSI: {rsi:.1}) - potential sell signal")
            } else {
                format!("Overbought (RSI: {rsi:.1})")
            });
            score -= SCORE_RSI_EXTREME;
        } else if (RSI_NEUTRAL_LOWER..=RSI_NEUTRAL_UPPER).contains(&rsi) && display_mode {
            signals.push(format!("⚖️ Neutral momentum (RSI: {rsi:.1})"));
        }
    }

    // ── MACD Crossover ────────────────────────────────────────────────────────
    if s.macd > s.signal_line && s.prev_macd <= s.prev_signal {
        signals.push(if display_mode {
            "📈 MACD bullish crossover - buy signal".to_string()
        } else {
            "MACD bullish crossover".to_string()
        });
        score += SCORE_MACD_CROSSOVER;
    } else if s.macd < s.signal_line && s.prev_macd >= s.prev_signal {
        signals.push(if display_mode {
            "📉 MACD bearish crossover - sell signal".to_string()
        } else {
            "MACD bearish crossover".to_string()
        });
        score -= SCORE_MACD_CROSSOVER;
    }

    // ── Momentum ──────────────────────────────────────────────────────────────
    if let Some(momentum) = s.momentum {
        if momentum > MOMENTUM_STRONG_POSITIVE {
            signals.push(if display_mode {
                format!("🚀 Strong positive momentum ({momentum:.1}%)")
            } else {
                format!("Strong positive momentum ({momentum:.1}%)")
            });
            score += SCORE_STRONG_MOMENTUM;
        } else if momentum < MOMENTUM_STRONG_NEGATIVE {
            signals.push(if display_mode {
                format!("⬇️ Strong negative momentum ({momentum:.1}%)")
            } else {
                format!("Strong negative momentum ({momentum:.1}%)")
            });
            score -= SCORE_STRONG_MOMENTUM;
        }
    }

    ScoreBreakdown { score, signals }
}

// ─── Display Signals (/analyze) ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct DisplaySignals {
    pub ticker: String,
    pub current_price: f64,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub momentum: Option<f64>,
    pub recommendation: String,
    pub confidence: i32,
    pub signals: Vec<String>,
}

pub fn display_signals(ticker: &str, s: &IndicatorSnapshot) -> DisplaySignals {
    let ScoreBreakdown { score, signals } = score_snapshot(s, true);

    let (recommendation, confidence) = if score >= DISPLAY_STRONG_BUY_THRESHOLD {
        ("STRONG BUY", (80 + score - DISPLAY_STRONG_BUY_THRESHOLD).min(95))
    } else if score >= DISPLAY_BUY_THRESHOLD {
        ("BUY", 65 + score - DISPLAY_BUY_THRESHOLD)
    } else if score <= DISPLAY_STRONG_SELL_THRESHOLD {
        ("STRONG SELL", (80 - score + DISPLAY_STRONG_SELL_THRESHOLD).min(95))
    } else if score <= DISPLAY_SELL_THRESHOLD {
        ("SELL", 65 - score + DISPLAY_SELL_THRESHOLD)
    } else {
        ("HOLD", 50 + score.abs())
    };

    DisplaySignals {
        ticker: ticker.to_string(),
        current_price: round2(s.close),
        sma_20: s.sma_20.map(round2),
        sma_50: s.sma_50.map(round2),
        rsi: s.rsi.map(round2),
        macd: Some(round2(s.macd)),
        momentum: s.momentum.map(round2),
        recommendation: recommendation.to_string(),
        confidence,
        signals,
    }
}

// ─── Trading Decision (executor) ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeDecision {
    pub ticker: String,
    pub current_price: f64,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub action: DecisionAction,
    pub confidence: i32,
    pub signals: Vec<String>,
}

/// Turn a snapshot into an automated buy/sell/hold decision using the
/// trader's risk-tolerance thresholds.
pub fn trading_decision(
    ticker: &str,
    s: &IndicatorSnapshot,
    tolerance: RiskTolerance,
) -> TradeDecision {
    let ScoreBreakdown { score, signals } = score_snapshot(s, false);
    let profile = risk_profile(tolerance);

    let (action, confidence) = if score >= profile.buy_threshold {
        (DecisionAction::Buy, (70 + score - profile.buy_threshold).min(95))
    } else if score <= profile.sell_threshold {
        (
            DecisionAction::Sell,
            (70 + (score - profile.sell_threshold).abs()).min(95),
        )
    } else {
        (DecisionAction::Hold, 50 + score.abs())
    };

    TradeDecision {
        ticker: ticker.to_string(),
        current_price: s.close,
        sma_20: s.sma_20,
        sma_50: s.sma_50,
        rsi: s.rsi,
        macd: Some(s.macd),
        action,
        confidence,
        signals,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
