use crate::config::StrategyConfig;
use crate::domain::entities::alert::EliteType;

/// RSI required on top of the institution score threshold.
const INSTITUTION_RSI_MIN: f64 = 58.0;

/// Multiplier applied to the whale threshold when the symbol pumped again
/// inside the follow-up window: repeat activity lowers the bar.
const FOLLOW_UP_RELAX: f64 = 0.85;

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub elite_type: EliteType,
    pub reason: &'static str,
    pub auto_trade: bool,
}

/// Ordered classification of an analyzed candidate. Checked top-down; the
/// first matching tier wins, and `PumpStart` is the floor that always
/// matches.
pub fn classify(
    whale_score: u32,
    rsi: f64,
    strong_trend: bool,
    is_follow_up: bool,
    strategy: &StrategyConfig,
) -> Classification {
    let score = whale_score as f64;

    let whale_threshold = if is_follow_up {
        strategy.whale_min_score * FOLLOW_UP_RELAX
    } else {
        strategy.whale_min_score
    };
    let institution_threshold = (whale_threshold - 5.0).max(45.0);
    let trend_threshold = (whale_threshold - 25.0).max(35.0);

    if score >= whale_threshold {
        Classification {
            elite_type: EliteType::WhaleAccumulation,
            reason: "WHALE ACCUMULATION",
            auto_trade: strategy.whale_detection_enabled,
        }
    } else if score >= institution_threshold && rsi >= INSTITUTION_RSI_MIN {
        Classification {
            elite_type: EliteType::InstitutionEntry,
            reason: "INSTITUTIONAL ENTRY",
            auto_trade: strategy.whale_detection_enabled,
        }
    } else if strong_trend && score >= trend_threshold {
        Classification {
            elite_type: EliteType::TrendStart,
            reason: "TREND START",
            auto_trade: true,
        }
    } else {
        Classification {
            elite_type: EliteType::PumpStart,
            reason: "PUMP DETECTED",
            auto_trade: false,
        }
    }
}
