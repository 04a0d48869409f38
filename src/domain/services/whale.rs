use crate::config::{ManipulationConfig, WhaleConfig};
use crate::domain::entities::market::Stats24h;

/// Microstructure inputs for whale scoring, derived from recent trades, the
/// order book, and derivatives metrics.
#[derive(Debug, Clone)]
pub struct WhaleInputs {
    /// Trades whose notional exceeded the large-trade threshold.
    pub large_order_count: usize,
    /// Buy volume over total volume, in [0, 1].
    pub buy_pressure: f64,
    /// Aggregate bid depth over aggregate ask depth.
    pub order_book_imbalance: f64,
    pub support: f64,
    pub resistance: f64,
    pub open_interest: Option<f64>,
    pub funding_rate: Option<f64>,
}

/// Additive whale score in [0, 100]. Each component has a fixed cap, so no
/// single input can dominate.
pub fn whale_score(inputs: &WhaleInputs, config: &WhaleConfig) -> u32 {
    let mut score = 0.0;

    score += (inputs.large_order_count as f64 * 5.0).min(30.0);

    let pressure_deviation = (inputs.buy_pressure - 0.5).abs();
    score += (pressure_deviation * 60.0).min(30.0);

    // A tight support/resistance band means price is coiled.
    let band_pct = if inputs.support > 0.0 {
        (inputs.resistance - inputs.support) / inputs.support * 100.0
    } else {
        100.0
    };
    score += if band_pct < 2.0 {
        20.0
    } else if band_pct < 3.0 {
        10.0
    } else {
        5.0
    };

    if matches!(inputs.open_interest, Some(oi) if oi > config.open_interest_floor) {
        score += 10.0;
    }
    if matches!(inputs.funding_rate, Some(rate) if rate.abs() > config.funding_rate_floor) {
        score += 10.0;
    }
    if inputs.order_book_imbalance >= config.imbalance_high
        || inputs.order_book_imbalance <= config.imbalance_low
    {
        score += 15.0;
    }

    (score.round() as u32).min(100)
}

/// A symbol the manipulation gate refused to analyze.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManipulationRisk {
    pub reason: String,
    pub should_blacklist: bool,
}

/// Screen a candidate against thin-volume, extreme-range, and
/// pump-frequency manipulation patterns. `Ok(())` means clean.
pub fn check_manipulation(
    stats: &Stats24h,
    hourly_pump_count: u32,
    config: &ManipulationConfig,
) -> Result<(), ManipulationRisk> {
    if stats.quote_volume < config.min_24h_quote_volume {
        return Err(ManipulationRisk {
            reason: format!("Low 24h volume (${:.2}M)", stats.quote_volume / 1e6),
            should_blacklist: true,
        });
    }

    if stats.low > 0.0 {
        let range_pct = (stats.high - stats.low) / stats.low * 100.0;
        if range_pct > config.max_volatility_range_pct {
            return Err(ManipulationRisk {
                reason: format!("Extreme volatility ({:.1}%)", range_pct),
                should_blacklist: true,
            });
        }
    }

    if hourly_pump_count >= config.max_pump_frequency_per_hour {
        return Err(ManipulationRisk {
            reason: format!("Excessive pump frequency ({}/hour)", hourly_pump_count),
            should_blacklist: false,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_inputs() -> WhaleInputs {
        WhaleInputs {
            large_order_count: 0,
            buy_pressure: 0.5,
            order_book_imbalance: 1.0,
            support: 100.0,
            resistance: 110.0,
            open_interest: None,
            funding_rate: None,
        }
    }

    #[test]
    fn test_quiet_market_scores_only_band_floor() {
        // Wide band, balanced pressure, no derivatives signals: 5 points.
        assert_eq!(whale_score(&quiet_inputs(), &WhaleConfig::default()), 5);
    }

    #[test]
    fn test_large_order_component_is_capped() {
        let mut inputs = quiet_inputs();
        inputs.large_order_count = 4;
        assert_eq!(whale_score(&inputs, &WhaleConfig::default()), 25);
        inputs.large_order_count = 50;
        assert_eq!(whale_score(&inputs, &WhaleConfig::default()), 35);
    }

    #[test]
    fn test_buy_pressure_deviation_is_symmetric() {
        let config = WhaleConfig::default();
        let mut buyers = quiet_inputs();
        buyers.buy_pressure = 0.8;
        let mut sellers = quiet_inputs();
        sellers.buy_pressure = 0.2;
        assert_eq!(whale_score(&buyers, &config), whale_score(&sellers, &config));
        assert_eq!(whale_score(&buyers, &config), 5 + 18);
    }

    #[test]
    fn test_tight_band_and_derivatives_stack_up() {
        let config = WhaleConfig::default();
        let inputs = WhaleInputs {
            large_order_count: 6,
            buy_pressure: 0.95,
            order_book_imbalance: 3.0,
            support: 100.0,
            resistance: 101.5,
            open_interest: Some(5_000_000.0),
            funding_rate: Some(0.0003),
        };
        // 30 + 27 + 20 + 10 + 10 + 15 = 112, capped at 100.
        assert_eq!(whale_score(&inputs, &config), 100);
    }

    #[test]
    fn test_ask_heavy_imbalance_also_counts() {
        let config = WhaleConfig::default();
        let mut inputs = quiet_inputs();
        inputs.order_book_imbalance = 0.3;
        assert_eq!(whale_score(&inputs, &config), 20);
    }

    fn healthy_stats() -> Stats24h {
        Stats24h {
            high: 105.0,
            low: 95.0,
            quote_volume: 50_000_000.0,
        }
    }

    #[test]
    fn test_clean_symbol_passes_gate() {
        let config = ManipulationConfig::default();
        assert!(check_manipulation(&healthy_stats(), 0, &config).is_ok());
    }

    #[test]
    fn test_thin_volume_blacklists() {
        let config = ManipulationConfig::default();
        let stats = Stats24h {
            quote_volume: 500_000.0,
            ..healthy_stats()
        };
        let risk = check_manipulation(&stats, 0, &config).unwrap_err();
        assert!(risk.should_blacklist);
        assert!(risk.reason.contains("$0.50M"));
    }

    #[test]
    fn test_extreme_range_blacklists() {
        let config = ManipulationConfig::default();
        let stats = Stats24h {
            high: 140.0,
            low: 100.0,
            quote_volume: 50_000_000.0,
        };
        let risk = check_manipulation(&stats, 0, &config).unwrap_err();
        assert!(risk.should_blacklist);
        assert!(risk.reason.starts_with("Extreme volatility"));
    }

    #[test]
    fn test_pump_frequency_is_risky_but_not_blacklisted() {
        let config = ManipulationConfig::default();
        let risk = check_manipulation(&healthy_stats(), 5, &config).unwrap_err();
        assert!(!risk.should_blacklist);
        assert!(risk.reason.contains("5/hour"));
    }
}
