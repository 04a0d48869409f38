use crate::config::PumpConfig;
use crate::domain::services::candle_aggregator::SymbolState;
use std::collections::HashMap;

const HOUR_MS: i64 = 3_600_000;

/// A raw anomaly on the ticker stream: the in-progress candle moved hard on
/// unusual volume. Candidates, not alerts; deep analysis decides what they
/// become.
#[derive(Debug, Clone)]
pub struct PumpSignal {
    pub symbol: String,
    /// Percent change of the in-progress candle, signed.
    pub change_percent: f64,
    /// Current minute volume relative to the trailing average.
    pub volume_ratio: f64,
    pub price: f64,
    /// Open of the in-progress candle.
    pub reference_price: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct SymbolTracker {
    last_signal_ms: i64,
    hourly_count: u32,
    hour: i64,
}

/// Detects per-minute pump candidates with per-symbol cooldown and an hourly
/// frequency counter consumed by the manipulation gate.
#[derive(Debug)]
pub struct PumpDetector {
    config: PumpConfig,
    trackers: HashMap<String, SymbolTracker>,
}

impl PumpDetector {
    pub fn new(config: PumpConfig) -> Self {
        PumpDetector {
            config,
            trackers: HashMap::new(),
        }
    }

    /// Evaluate one symbol against the pump conditions. Emits at most one
    /// signal per symbol per cooldown window.
    pub fn check(&mut self, state: &SymbolState, now_ms: i64) -> Option<PumpSignal> {
        let change = state.current.change_percent();
        if change.abs() < self.config.price_change_min {
            return None;
        }

        let volume_ratio = self.volume_ratio(state)?;
        if volume_ratio < self.config.volume_ratio_min {
            return None;
        }

        if let Some(tracker) = self.trackers.get(&state.symbol) {
            if now_ms - tracker.last_signal_ms < self.config.cooldown_ms {
                return None;
            }
        }

        self.record_signal(&state.symbol, now_ms);
        Some(PumpSignal {
            symbol: state.symbol.clone(),
            change_percent: change,
            volume_ratio,
            price: state.current.close,
            reference_price: state.current.open,
        })
    }

    /// Current minute volume over the average of the trailing completed
    /// minutes, excluding the most recent one. Needs at least two completed
    /// candles; a zero average yields no ratio.
    fn volume_ratio(&self, state: &SymbolState) -> Option<f64> {
        let start = state.history.len().saturating_sub(self.config.window_len);
        let window: Vec<f64> = state
            .history
            .iter()
            .skip(start)
            .map(|c| c.quote_volume)
            .collect();
        if window.len() < 2 {
            return None;
        }
        let baseline = &window[..window.len() - 1];
        let avg = baseline.iter().sum::<f64>() / baseline.len() as f64;
        if avg <= 0.0 {
            return None;
        }
        Some(state.current.quote_volume / avg)
    }

    fn record_signal(&mut self, symbol: &str, now_ms: i64) {
        let hour = now_ms / HOUR_MS;
        let tracker = self.trackers.entry(symbol.to_string()).or_default();
        if tracker.hour != hour {
            tracker.hour = hour;
            tracker.hourly_count = 0;
        }
        tracker.hourly_count += 1;
        tracker.last_signal_ms = now_ms;
    }

    /// Signals recorded for this symbol in the current hour.
    pub fn hourly_count(&self, symbol: &str, now_ms: i64) -> u32 {
        match self.trackers.get(symbol) {
            Some(tracker) if tracker.hour == now_ms / HOUR_MS => tracker.hourly_count,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::market::Tick;
    use crate::domain::services::candle_aggregator::CandleAggregator;

    fn tick(price: f64, cum_vol: f64, ts: i64) -> Tick {
        Tick {
            symbol: "BTCUSDT".to_string(),
            price,
            quote_volume_24h: cum_vol,
            change_24h: 0.0,
            timestamp_ms: ts,
        }
    }

    /// Five quiet minutes of 100 quote volume each, then a spiking minute.
    fn pumped_state(spike_change_pct: f64, spike_volume: f64) -> CandleAggregator {
        let mut agg = CandleAggregator::new(60);
        let mut cum = 0.0;
        agg.apply_tick(&tick(100.0, cum, 0));
        for minute in 0..5 {
            cum += 100.0;
            agg.apply_tick(&tick(100.0, cum, minute * 60_000 + 30_000));
            agg.apply_tick(&tick(100.0, cum, (minute + 1) * 60_000));
        }
        cum += spike_volume;
        let spike_price = 100.0 * (1.0 + spike_change_pct / 100.0);
        agg.apply_tick(&tick(spike_price, cum, 5 * 60_000 + 30_000));
        agg
    }

    #[test]
    fn test_detects_price_and_volume_spike() {
        let mut detector = PumpDetector::new(PumpConfig::default());
        let agg = pumped_state(1.5, 300.0);
        let signal = detector
            .check(agg.get("BTCUSDT").unwrap(), 5 * 60_000 + 30_000)
            .expect("spike should qualify");
        assert!((signal.change_percent - 1.5).abs() < 1e-9);
        assert!(signal.volume_ratio >= 2.2);
        assert_eq!(signal.reference_price, 100.0);
    }

    #[test]
    fn test_price_move_without_volume_is_ignored() {
        let mut detector = PumpDetector::new(PumpConfig::default());
        let agg = pumped_state(1.5, 100.0);
        assert!(detector
            .check(agg.get("BTCUSDT").unwrap(), 5 * 60_000 + 30_000)
            .is_none());
    }

    #[test]
    fn test_volume_spike_without_price_move_is_ignored() {
        let mut detector = PumpDetector::new(PumpConfig::default());
        let agg = pumped_state(0.4, 500.0);
        assert!(detector
            .check(agg.get("BTCUSDT").unwrap(), 5 * 60_000 + 30_000)
            .is_none());
    }

    #[test]
    fn test_negative_move_qualifies() {
        let mut detector = PumpDetector::new(PumpConfig::default());
        let agg = pumped_state(-1.5, 300.0);
        let signal = detector
            .check(agg.get("BTCUSDT").unwrap(), 5 * 60_000 + 30_000)
            .expect("dump should qualify");
        assert!(signal.change_percent < 0.0);
    }

    #[test]
    fn test_needs_two_completed_candles() {
        let mut detector = PumpDetector::new(PumpConfig::default());
        let mut agg = CandleAggregator::new(60);
        agg.apply_tick(&tick(100.0, 0.0, 0));
        agg.apply_tick(&tick(100.0, 100.0, 60_000));
        agg.apply_tick(&tick(102.0, 600.0, 90_000));
        assert!(detector.check(agg.get("BTCUSDT").unwrap(), 90_000).is_none());
    }

    #[test]
    fn test_cooldown_suppresses_repeat_signals() {
        let mut detector = PumpDetector::new(PumpConfig::default());
        let agg = pumped_state(2.0, 400.0);
        let state = agg.get("BTCUSDT").unwrap();
        let t0 = 5 * 60_000 + 30_000;
        assert!(detector.check(state, t0).is_some());
        assert!(detector.check(state, t0 + 60_000).is_none());
        assert!(detector.check(state, t0 + 300_000).is_some());
    }

    #[test]
    fn test_hourly_count_resets_on_hour_change() {
        let mut detector = PumpDetector::new(PumpConfig::default());
        let agg = pumped_state(2.0, 400.0);
        let state = agg.get("BTCUSDT").unwrap();
        let t0 = 5 * 60_000 + 30_000;
        detector.check(state, t0);
        detector.check(state, t0 + 300_000);
        assert_eq!(detector.hourly_count("BTCUSDT", t0 + 300_000), 2);
        // Next hour: the counter restarts.
        detector.check(state, HOUR_MS + t0);
        assert_eq!(detector.hourly_count("BTCUSDT", HOUR_MS + t0), 1);
        assert_eq!(detector.hourly_count("ETHUSDT", t0), 0);
    }
}
