//! # engine::indicators
//!
//! Pure, stateless indicator math over a daily close series (oldest first).
//!
//! Conventions:
//! - SMA / RSI / momentum are `None` during their warmup window.
//! - EMA is seeded with the first close and defined from index 0, so MACD and
//!   its signal line are too.
//! - RSI uses a simple rolling mean of gains/losses, not Wilder smoothing.

use crate::config::{
    EMA_LONG_SPAN, EMA_SHORT_SPAN, MACD_SIGNAL_SPAN, MIN_DATA_POINTS, MOMENTUM_PERIODS,
    RSI_WINDOW, SMA_LONG_WINDOW, SMA_SHORT_WINDOW,
};

// ─── Series ───────────────────────────────────────────────────────────────────

/// All indicator columns computed over one close series.
#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub close: Vec<f64>,
    pub sma_20: Vec<Option<f64>>,
    pub sma_50: Vec<Option<f64>>,
    pub ema_12: Vec<f64>,
    pub ema_26: Vec<f64>,
    pub macd: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub rsi: Vec<Option<f64>>,
    pub momentum: Vec<Option<f64>>,
}

/// The last two rows of an [`IndicatorSeries`], which is everything the
/// scorer needs (the previous MACD/signal pair detects crossovers).
#[derive(Debug, Clone, Copy)]
pub struct IndicatorSnapshot {
    pub close: f64,
    pub prev_close: f64,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub macd: f64,
    pub signal_line: f64,
    pub prev_macd: f64,
    pub prev_signal: f64,
    pub rsi: Option<f64>,
    pub momentum: Option<f64>,
}

impl IndicatorSeries {
    /// Compute every indicator for `closes` (oldest first).
    pub fn compute(closes: &[f64]) -> Self {
        let ema_12 = ema(closes, EMA_SHORT_SPAN);
        let ema_26 = ema(closes, EMA_LONG_SPAN);

        let macd: Vec<f64> = ema_12
            .iter()
            .zip(&ema_26)
            .map(|(short, long)| short - long)
            .collect();
        let signal_line = ema(&macd, MACD_SIGNAL_SPAN);

        Self {
            close: closes.to_vec(),
            sma_20: sma(closes, SMA_SHORT_WINDOW),
            sma_50: sma(closes, SMA_LONG_WINDOW),
            ema_12,
            ema_26,
            macd,
            signal_line,
            rsi: rsi(closes, RSI_WINDOW),
            momentum: momentum(closes, MOMENTUM_PERIODS),
        }
    }

    /// Enough history for the slowest indicator (SMA-50) to be meaningful?
    pub fn has_sufficient_data(&self) -> bool {
        self.close.len() >= MIN_DATA_POINTS
    }

    /// Latest-row snapshot, or `None` when the series is too short for a
    /// reliable read.
    pub fn snapshot(&self) -> Option<IndicatorSnapshot> {
        if !self.has_sufficient_data() {
            return None;
        }

        let last = self.close.len() - 1;
        let prev = last - 1;

        Some(IndicatorSnapshot {
            close: self.close[last],
            prev_close: self.close[prev],
            sma_20: self.sma_20[last],
            sma_50: self.sma_50[last],
            macd: self.macd[last],
            signal_line: self.signal_line[last],
            prev_macd: self.macd[prev],
            prev_signal: self.signal_line[prev],
            rsi: self.rsi[last],
            momentum: self.momentum[last],
        })
    }
}

// ─── Building Blocks ──────────────────────────────────────────────────────────

/// Rolling mean; `None` until `window` values have been seen.
fn sma(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    let mut running_sum = 0.0;

    for i in 0..values.len() {
        running_sum += values[i];
        if i >= window {
            running_sum -= values[i - window];
        }
        if i + 1 >= window {
            out.push(Some(running_sum / window as f64));
        } else {
            out.push(None);
        }
    }

    out
}

/// Recursive EMA seeded with the first value (`alpha = 2 / (span + 1)`).
fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut current = match values.first() {
        Some(&v) => v,
        None => return out,
    };
    out.push(current);

    for &value in &values[1..] {
        current = alpha * value + (1.0 - alpha) * current;
        out.push(current);
    }

    out
}

/// RSI over a simple rolling mean of one-day gains and losses.
fn rsi(closes: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if closes.len() < 2 || window == 0 {
        return out;
    }

    let mut gains = Vec::with_capacity(closes.len() - 1);
    let mut losses = Vec::with_capacity(closes.len() - 1);
    for pair in closes.windows(2) {
        let delta = pair[1] - pair[0];
        gains.push(delta.max(0.0));
        losses.push((-delta).max(0.0));
    }

    // RSI for close index i uses the `window` deltas ending at delta index i-1.
    for i in window..closes.len() {
        let start = i - window;
        let avg_gain: f64 = gains[start..i].iter().sum::<f64>() / window as f64;
        let avg_loss: f64 = losses[start..i].iter().sum::<f64>() / window as f64;

        out[i] = if avg_loss == 0.0 && avg_gain == 0.0 {
            // Flat series: 0/0 has no meaningful RSI.
            None
        } else if avg_loss == 0.0 {
            Some(100.0)
        } else {
            Some(100.0 - 100.0 / (1.0 + avg_gain / avg_loss))
        };
    }

    out
}

/// Percent change over `periods` steps, ×100.
fn momentum(closes: &[f64], periods: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];

    for i in periods..closes.len() {
        let base = closes[i - periods];
        if base != 0.0 {
            out[i] = Some((closes[i] / base - 1.0) * 100.0);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rising_series(len: usize) -> Vec<f64> {
        (0..len).map(|i| 100.0 + i as f64).collect()
    }

    #[test]
    fn sma_respects_warmup() {
        let values = rising_series(25);
        let series = sma(&values, 20);

        for point in series.iter().take(19) {
            assert!(point.is_none());
        }
        // Mean of 100..=119
        assert_relative_eq!(series[19].unwrap(), 109.5);
        assert_relative_eq!(series[20].unwrap(), 110.5);
    }

    #[test]
    fn ema_is_seeded_with_first_value() {
        let values = vec![10.0, 20.0];
        let series = ema(&values, 3);

        assert_relative_eq!(series[0], 10.0);
        // alpha = 0.5 → 0.5*20 + 0.5*10
        assert_relative_eq!(series[1], 15.0);
    }

    #[test]
    fn macd_is_fast_ema_minus_slow_ema() {
        let closes = rising_series(60);
        let series = IndicatorSeries::compute(&closes);

        for i in 0..closes.len() {
            assert_relative_eq!(series.macd[i], series.ema_12[i] - series.ema_26[i]);
        }
    }

    #[test]
    fn rsi_is_100_for_monotonic_gains() {
        let closes = rising_series(20);
        let series = rsi(&closes, 14);

        assert!(series[13].is_none());
        assert_relative_eq!(series[14].unwrap(), 100.0);
    }

    #[test]
    fn rsi_is_0_for_monotonic_losses() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let series = rsi(&closes, 14);

        assert_relative_eq!(series[14].unwrap(), 0.0);
    }

    #[test]
    fn rsi_is_undefined_for_flat_series() {
        let closes = vec![100.0; 20];
        let series = rsi(&closes, 14);

        assert!(series[14].is_none());
    }

    #[test]
    fn rsi_stays_in_range() {
        let closes: Vec<f64> = (0..60)
            .map(|i| 100.0 + ((i % 7) as f64 - 3.0) * 2.0)
            .collect();
        let series = rsi(&closes, 14);

        for value in series.into_iter().flatten() {
            assert!((0.0..=100.0).contains(&value), "RSI {value} out of range");
        }
    }

    #[test]
    fn momentum_is_percent_change() {
        let closes = rising_series(15);
        let series = momentum(&closes, 10);

        assert!(series[9].is_none());
        // close[10] = 110, close[0] = 100 → +10%
        assert_relative_eq!(series[10].unwrap(), 10.0);
    }

    #[test]
    fn snapshot_requires_min_data_points() {
        let short = IndicatorSeries::compute(&rising_series(49));
        assert!(short.snapshot().is_none());

        let long = IndicatorSeries::compute(&rising_series(50));
        let snapshot = long.snapshot().unwrap();
        assert_relative_eq!(snapshot.close, 149.0);
        assert_relative_eq!(snapshot.prev_close, 148.0);
        assert!(snapshot.sma_50.is_some());
    }
}
