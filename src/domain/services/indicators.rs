//! Stateless technical indicators over ordered close-price sequences.
//!
//! All functions are pure: identical inputs always yield identical outputs.
//! Insufficient input is a non-error "not yet" condition, answered with a
//! neutral value rather than a failure.

/// Default RSI lookback.
pub const RSI_PERIOD: usize = 14;

/// Closes required before MACD produces a non-neutral result.
const MACD_MIN_CLOSES: usize = 50;

/// Floor applied to the average loss so RSI never divides by zero.
const MIN_AVG_LOSS: f64 = 0.0001;

/// Exponential moving average seeded with the simple average of the first
/// `period` values. `None` when the input is shorter than the period.
pub fn ema(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let mut value = closes[..period].iter().sum::<f64>() / period as f64;
    let multiplier = 2.0 / (period as f64 + 1.0);
    for &close in &closes[period..] {
        value = (close - value) * multiplier + value;
    }
    Some(value)
}

/// Relative strength index over the first `period` deltas. Returns a neutral
/// 50.0 when fewer than `period + 1` closes are available.
pub fn rsi(closes: &[f64], period: usize) -> f64 {
    if period == 0 || closes.len() < period + 1 {
        return 50.0;
    }
    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }
    let avg_gain = gains / period as f64;
    let avg_loss = (losses / period as f64).max(MIN_AVG_LOSS);
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// MACD line, signal line, and histogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdOutput {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

impl MacdOutput {
    pub fn neutral() -> Self {
        MacdOutput {
            macd: 0.0,
            signal: 0.0,
            histogram: 0.0,
        }
    }
}

/// EMA over a fixed slice, degrading to the last value when the slice is
/// shorter than the period. Only used inside the rolling MACD recomputation.
fn window_ema(data: &[f64], period: usize) -> f64 {
    match data.last() {
        None => 0.0,
        Some(&last) if data.len() < period => last,
        Some(_) => {
            let mut value = data[..period].iter().sum::<f64>() / period as f64;
            let multiplier = 2.0 / (period as f64 + 1.0);
            for &v in &data[period..] {
                value = v * multiplier + value * (1.0 - multiplier);
            }
            value
        }
    }
}

/// 12/26 EMA difference with a 9-period signal, recomputed over a rolling
/// window. Returns the neutral triple when fewer than 50 closes are
/// available.
pub fn macd(closes: &[f64]) -> MacdOutput {
    if closes.len() < MACD_MIN_CLOSES {
        return MacdOutput::neutral();
    }

    let mut series = Vec::with_capacity(closes.len() - 26);
    for i in 26..closes.len() {
        let short = window_ema(&closes[i - 11..=i], 12);
        let long = window_ema(&closes[i - 25..=i], 26);
        series.push(short - long);
    }

    let macd_line = series.last().copied().unwrap_or(0.0);
    let tail_start = series.len().saturating_sub(9);
    let signal = window_ema(&series[tail_start..], 9);

    MacdOutput {
        macd: macd_line,
        signal,
        histogram: macd_line - signal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_requires_period_values() {
        assert!(ema(&[1.0, 2.0], 3).is_none());
        assert!(ema(&[], 1).is_none());
        assert!(ema(&[1.0], 0).is_none());
    }

    #[test]
    fn test_ema_of_constant_series_is_constant() {
        let closes = vec![100.0; 30];
        let value = ema(&closes, 9).unwrap();
        assert!((value - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_ema_seeds_with_simple_average() {
        // Exactly `period` values: the EMA is the SMA.
        let closes = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(ema(&closes, 4), Some(2.5));
    }

    #[test]
    fn test_ema_tracks_rising_series() {
        let closes: Vec<f64> = (1..=40).map(|i| i as f64).collect();
        let fast = ema(&closes, 9).unwrap();
        let slow = ema(&closes, 21).unwrap();
        assert!(fast > slow, "fast EMA should sit above slow in an uptrend");
    }

    #[test]
    fn test_rsi_neutral_on_insufficient_data() {
        assert_eq!(rsi(&[100.0, 101.0], RSI_PERIOD), 50.0);
    }

    #[test]
    fn test_rsi_bounded() {
        let rising: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let falling: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let up = rsi(&rising, RSI_PERIOD);
        let down = rsi(&falling, RSI_PERIOD);
        assert!((0.0..=100.0).contains(&up));
        assert!((0.0..=100.0).contains(&down));
        assert!(up > 90.0);
        assert!(down < 10.0);
    }

    #[test]
    fn test_rsi_all_gains_does_not_divide_by_zero() {
        let rising: Vec<f64> = (0..16).map(|i| 100.0 + i as f64).collect();
        let value = rsi(&rising, RSI_PERIOD);
        assert!(value.is_finite());
        assert!(value > 99.0);
    }

    #[test]
    fn test_macd_neutral_under_fifty_closes() {
        let closes = vec![100.0; 49];
        assert_eq!(macd(&closes), MacdOutput::neutral());
    }

    #[test]
    fn test_macd_flat_series_has_zero_histogram() {
        let closes = vec![100.0; 60];
        let out = macd(&closes);
        assert!(out.macd.abs() < 1e-9);
        assert!(out.histogram.abs() < 1e-9);
    }

    #[test]
    fn test_macd_positive_in_uptrend() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 0.5).collect();
        let out = macd(&closes);
        assert!(out.macd > 0.0);
    }

    #[test]
    fn test_indicators_are_deterministic() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + ((i * 7) % 13) as f64 * 0.3).collect();
        assert_eq!(ema(&closes, 9), ema(&closes, 9));
        assert_eq!(rsi(&closes, RSI_PERIOD), rsi(&closes, RSI_PERIOD));
        assert_eq!(macd(&closes), macd(&closes));
    }
}
