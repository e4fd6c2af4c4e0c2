//! Technical indicators over daily bars: RSI, MACD, Bollinger %B, moving
//! averages, rate of change and relative volume.

use statrs::statistics::Statistics;

/// Bars needed before any indicator is trusted.
pub const MIN_BARS: usize = 30;

const RSI_PERIOD: usize = 14;
const BB_PERIOD: usize = 20;
const BB_WIDTH: f64 = 2.0;
const VOLUME_PERIOD: usize = 20;

/// Indicator values at the latest bar, plus the previous bar where a
/// crossover needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSet {
    pub price: f64,
    pub prev_close: f64,
    pub rsi: f64,
    pub macd_hist: f64,
    pub prev_macd_hist: f64,
    /// Position within the Bollinger bands (0 = lower, 1 = upper)
    pub bb_pct: f64,
    pub sma10: f64,
    pub sma20: f64,
    pub ema9: f64,
    pub prev_ema9: f64,
    pub prev_sma20: f64,
    /// Percent change over 5 and 10 bars
    pub roc5: f64,
    pub roc10: f64,
    /// Latest volume / 20-bar mean volume
    pub volume_ratio: f64,
}

impl IndicatorSet {
    /// Compute from closes and volumes (oldest first). Returns `None` with
    /// fewer than `MIN_BARS` closes.
    pub fn compute(closes: &[f64], volumes: &[f64]) -> Option<Self> {
        if closes.len() < MIN_BARS || closes.iter().any(|c| !c.is_finite() || *c <= 0.0) {
            return None;
        }

        let n = closes.len();
        let price = closes[n - 1];
        let prev = &closes[..n - 1];

        let macd_line: Vec<f64> = ema_series(closes, 12)
            .iter()
            .zip(ema_series(closes, 26))
            .map(|(fast, slow)| fast - slow)
            .collect();
        let signal_line = ema_series(&macd_line, 9);
        let hist = |i: usize| macd_line[i] - signal_line[i];

        let ema9 = ema_series(closes, 9);

        Some(Self {
            price,
            prev_close: closes[n - 2],
            rsi: rsi(closes, RSI_PERIOD),
            macd_hist: hist(n - 1),
            prev_macd_hist: hist(n - 2),
            bb_pct: bollinger_pct(closes, BB_PERIOD, BB_WIDTH),
            sma10: sma(closes, 10),
            sma20: sma(closes, 20),
            ema9: ema9[n - 1],
            prev_ema9: ema9[n - 2],
            prev_sma20: sma(prev, 20),
            roc5: roc(closes, 5),
            roc10: roc(closes, 10),
            volume_ratio: volume_ratio(volumes, VOLUME_PERIOD),
        })
    }

    /// Close-to-close return of the latest bar.
    pub fn daily_return(&self) -> f64 {
        if self.prev_close == 0.0 {
            return 0.0;
        }
        (self.price - self.prev_close) / self.prev_close
    }
}

/// Mean of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> f64 {
    let window = &values[values.len().saturating_sub(period)..];
    if window.is_empty() {
        return f64::NAN;
    }
    window.iter().mean()
}

/// Exponential moving average with `alpha = 2 / (span + 1)`, seeded with the
/// first value. Same length as the input.
pub fn ema_series(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = None;
    for &v in values {
        let next = match prev {
            None => v,
            Some(p) => alpha * v + (1.0 - alpha) * p,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// RSI from simple averages of the last `period` gains and losses.
pub fn rsi(closes: &[f64], period: usize) -> f64 {
    if closes.len() <= period {
        return 50.0;
    }
    let changes: Vec<f64> = closes[closes.len() - period - 1..]
        .windows(2)
        .map(|w| w[1] - w[0])
        .collect();

    let avg_gain = changes.iter().map(|c| c.max(0.0)).sum::<f64>() / period as f64;
    let avg_loss = changes.iter().map(|c| (-c).max(0.0)).sum::<f64>() / period as f64;

    match (avg_gain > 0.0, avg_loss > 0.0) {
        (false, false) => 50.0,
        (_, false) => 100.0,
        _ => 100.0 - 100.0 / (1.0 + avg_gain / avg_loss),
    }
}

/// Where the last close sits between the lower and upper Bollinger bands.
/// Uses the sample standard deviation. A flat window gives 0.5.
pub fn bollinger_pct(closes: &[f64], period: usize, width: f64) -> f64 {
    let window = &closes[closes.len().saturating_sub(period)..];
    if window.len() < 2 {
        return 0.5;
    }
    let mid = window.iter().mean();
    let std_dev = window.iter().std_dev();
    let band = 2.0 * width * std_dev;
    if band <= 0.0 || !band.is_finite() {
        return 0.5;
    }
    let lower = mid - width * std_dev;
    (window[window.len() - 1] - lower) / band
}

/// Percent change over the last `period` bars.
pub fn roc(closes: &[f64], period: usize) -> f64 {
    if closes.len() <= period {
        return 0.0;
    }
    let base = closes[closes.len() - 1 - period];
    if base == 0.0 {
        return 0.0;
    }
    (closes[closes.len() - 1] / base - 1.0) * 100.0
}

/// Latest volume relative to the mean over the last `period` bars.
/// Returns 1.0 when volume data is missing.
/// A zero mean divides by one instead.
pub fn volume_ratio(volumes: &[f64], period: usize) -> f64 {
    let Some(&latest) = volumes.last() else {
        return 1.0;
    };
    let avg = sma(volumes, period);
    if avg > 0.0 {
        latest / avg
    } else {
        latest
    }
}
