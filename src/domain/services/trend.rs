use crate::config::TrendConfig;
use crate::domain::entities::alert::{Side, TrendDetails};
use crate::domain::entities::candle::Candle;
use crate::domain::services::indicators::{self, RSI_PERIOD};
use std::collections::VecDeque;

/// How the qualifier read the recent candle structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendContext {
    InsufficientData,
    NoTrend,
    PotentialTrend,
    StrongTrendStart,
}

impl TrendContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendContext::InsufficientData => "INSUFFICIENT_DATA",
            TrendContext::NoTrend => "NO_TREND",
            TrendContext::PotentialTrend => "POTENTIAL_TREND",
            TrendContext::StrongTrendStart => "STRONG_TREND_START",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrendAssessment {
    pub context: TrendContext,
    pub details: TrendDetails,
}

impl TrendAssessment {
    pub fn is_strong(&self) -> bool {
        self.context == TrendContext::StrongTrendStart
    }

    fn insufficient() -> Self {
        TrendAssessment {
            context: TrendContext::InsufficientData,
            details: TrendDetails {
                consolidation_range_pct: 0.0,
                breakout_percent: 0.0,
                volume_ratio: 0.0,
                trend_confirmed: false,
                context: TrendContext::InsufficientData.as_str().to_string(),
                conditions_met: 0,
            },
        }
    }
}

/// Scores six independent conditions over the completed candle window:
/// consolidation, low volatility, momentum, breakout, volume confirmation,
/// and recent green candles. Four or more make a strong trend start, exactly
/// three a potential one.
#[derive(Debug, Clone)]
pub struct TrendQualifier {
    config: TrendConfig,
}

impl TrendQualifier {
    pub fn new(config: TrendConfig) -> Self {
        TrendQualifier { config }
    }

    /// Assess the completed candle history together with the change percent
    /// of the candle that triggered the candidate.
    pub fn qualify(&self, candles: &VecDeque<Candle>, candle_change_pct: f64) -> TrendAssessment {
        let cfg = &self.config;
        if candles.len() < cfg.min_candles + 3 {
            return TrendAssessment::insufficient();
        }

        let start = candles.len() - cfg.min_candles;
        let closes: Vec<f64> = candles.iter().skip(start).map(|c| c.close).collect();
        let volumes: Vec<f64> = candles.iter().skip(start).map(|c| c.quote_volume).collect();

        let min_close = closes.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_close = closes.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let consolidation_range_pct = if min_close > 0.0 {
            (max_close - min_close) / min_close * 100.0
        } else {
            0.0
        };
        let consolidating = consolidation_range_pct <= cfg.consolidation_max_pct;

        let moves: Vec<f64> = closes
            .windows(2)
            .map(|w| ((w[1] - w[0]) / w[0]).abs() * 100.0)
            .collect();
        let avg_move_pct = if moves.is_empty() {
            0.0
        } else {
            moves.iter().sum::<f64>() / moves.len() as f64
        };
        let low_volatility = avg_move_pct < cfg.low_volatility_max_pct;

        let rsi = indicators::rsi(&closes, RSI_PERIOD);
        let macd = indicators::macd(&closes);
        let momentum_ok = rsi >= 45.0 && macd.histogram > -0.0005;

        let breakout = candle_change_pct >= cfg.breakout_min_pct;

        let baseline_len = volumes.len().saturating_sub(3).max(1);
        let avg_volume = volumes[..volumes.len().saturating_sub(3)]
            .iter()
            .sum::<f64>()
            / baseline_len as f64;
        let current_volume = *volumes.last().unwrap_or(&0.0);
        let volume_ratio = if avg_volume > 0.0 {
            current_volume / avg_volume
        } else {
            0.0
        };
        let volume_confirmed = volume_ratio >= cfg.volume_confirm_ratio;

        let green_count = candles
            .iter()
            .skip(candles.len() - cfg.confirm_candles)
            .filter(|c| c.is_green())
            .count();
        let trend_confirmed = green_count >= cfg.confirm_candles - 1;

        let conditions_met = [
            consolidating,
            low_volatility,
            momentum_ok,
            breakout,
            volume_confirmed,
            trend_confirmed,
        ]
        .iter()
        .filter(|&&met| met)
        .count() as u32;

        let context = if conditions_met >= 4 {
            TrendContext::StrongTrendStart
        } else if conditions_met == 3 {
            TrendContext::PotentialTrend
        } else {
            TrendContext::NoTrend
        };

        TrendAssessment {
            context,
            details: TrendDetails {
                consolidation_range_pct,
                breakout_percent: candle_change_pct,
                volume_ratio,
                trend_confirmed,
                context: context.as_str().to_string(),
                conditions_met,
            },
        }
    }
}

/// Direction of the higher-timeframe EMA cross. `None` while fewer than 21
/// closes are available.
pub fn ema_trend(closes_15m: &[f64]) -> Option<Side> {
    let fast = indicators::ema(closes_15m, 9)?;
    let slow = indicators::ema(closes_15m, 21)?;
    Some(if fast > slow { Side::Long } else { Side::Short })
}
