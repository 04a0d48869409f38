use crate::domain::entities::candle::Candle;
use crate::domain::entities::market::Tick;
use std::collections::{HashMap, VecDeque};

/// Minute bucket width in milliseconds.
const BUCKET_MS: i64 = 60_000;

/// Per-symbol aggregate: the in-progress minute candle, a bounded window of
/// completed candles, and the bookkeeping needed to derive per-tick volume
/// from a cumulative 24h counter.
#[derive(Debug, Clone)]
pub struct SymbolState {
    pub symbol: String,
    /// Candle for the current minute, updated on every tick.
    pub current: Candle,
    /// Completed minute candles, oldest first.
    pub history: VecDeque<Candle>,
    /// Cumulative 24h quote volume reported by the previous tick.
    last_cumulative_quote_volume: f64,
    /// Latest observed price, also used by mark-to-market.
    pub last_price: f64,
    pub change_24h: f64,
    pub quote_volume_24h: f64,
    pub last_update_ms: i64,
}

/// Builds and maintains 1-minute candles for every symbol seen on the feed.
///
/// Candle state is owned here and survives feed reconnects; a dropped
/// connection only pauses accumulation, it never resets history.
#[derive(Debug, Default)]
pub struct CandleAggregator {
    states: HashMap<String, SymbolState>,
    history_len: usize,
}

/// Outcome of folding one tick into the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick landed in the current minute.
    Updated,
    /// The tick opened a new minute; the previous candle rolled into history.
    MinuteRolled,
}

impl CandleAggregator {
    pub fn new(history_len: usize) -> Self {
        CandleAggregator {
            states: HashMap::new(),
            history_len,
        }
    }

    /// Fold one tick into its symbol's aggregate, creating the aggregate on
    /// first sight.
    pub fn apply_tick(&mut self, tick: &Tick) -> TickOutcome {
        let bucket = tick.timestamp_ms / BUCKET_MS;
        let history_len = self.history_len;

        match self.states.get_mut(&tick.symbol) {
            None => {
                self.states.insert(
                    tick.symbol.clone(),
                    SymbolState {
                        symbol: tick.symbol.clone(),
                        current: Candle::seed(bucket, tick.price),
                        history: VecDeque::with_capacity(history_len),
                        last_cumulative_quote_volume: tick.quote_volume_24h,
                        last_price: tick.price,
                        change_24h: tick.change_24h,
                        quote_volume_24h: tick.quote_volume_24h,
                        last_update_ms: tick.timestamp_ms,
                    },
                );
                TickOutcome::Updated
            }
            Some(state) => {
                // The 24h counter is cumulative and resets on its own
                // schedule; a negative delta means a counter reset, not
                // negative volume.
                let delta =
                    (tick.quote_volume_24h - state.last_cumulative_quote_volume).max(0.0);
                state.last_cumulative_quote_volume = tick.quote_volume_24h;
                state.last_price = tick.price;
                state.change_24h = tick.change_24h;
                state.quote_volume_24h = tick.quote_volume_24h;
                state.last_update_ms = tick.timestamp_ms;

                if bucket != state.current.bucket {
                    let completed = std::mem::replace(
                        &mut state.current,
                        Candle::seed(bucket, tick.price),
                    );
                    state.history.push_back(completed);
                    while state.history.len() > history_len {
                        state.history.pop_front();
                    }
                    state.current.apply(tick.price, delta);
                    TickOutcome::MinuteRolled
                } else {
                    state.current.apply(tick.price, delta);
                    TickOutcome::Updated
                }
            }
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolState> {
        self.states.get(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &SymbolState> {
        self.states.values()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(symbol: &str, price: f64, cum_vol: f64, ts: i64) -> Tick {
        Tick {
            symbol: symbol.to_string(),
            price,
            quote_volume_24h: cum_vol,
            change_24h: 0.0,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn test_first_tick_seeds_with_zero_volume() {
        let mut agg = CandleAggregator::new(60);
        agg.apply_tick(&tick("BTCUSDT", 100.0, 1_000_000.0, 0));
        let state = agg.get("BTCUSDT").unwrap();
        assert_eq!(state.current.open, 100.0);
        assert_eq!(state.current.quote_volume, 0.0);
        assert!(state.history.is_empty());
    }

    #[test]
    fn test_volume_is_cumulative_delta() {
        let mut agg = CandleAggregator::new(60);
        agg.apply_tick(&tick("BTCUSDT", 100.0, 1_000.0, 0));
        agg.apply_tick(&tick("BTCUSDT", 101.0, 1_150.0, 1_000));
        agg.apply_tick(&tick("BTCUSDT", 102.0, 1_200.0, 2_000));
        let state = agg.get("BTCUSDT").unwrap();
        assert!((state.current.quote_volume - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_counter_reset_floors_delta_at_zero() {
        let mut agg = CandleAggregator::new(60);
        agg.apply_tick(&tick("BTCUSDT", 100.0, 5_000.0, 0));
        agg.apply_tick(&tick("BTCUSDT", 100.0, 100.0, 1_000));
        let state = agg.get("BTCUSDT").unwrap();
        assert_eq!(state.current.quote_volume, 0.0);
        assert_eq!(state.last_cumulative_quote_volume, 100.0);
    }

    #[test]
    fn test_minute_boundary_rolls_candle() {
        let mut agg = CandleAggregator::new(60);
        agg.apply_tick(&tick("BTCUSDT", 100.0, 1_000.0, 0));
        agg.apply_tick(&tick("BTCUSDT", 101.0, 1_100.0, 30_000));
        let outcome = agg.apply_tick(&tick("BTCUSDT", 102.0, 1_250.0, 61_000));
        assert_eq!(outcome, TickOutcome::MinuteRolled);
        let state = agg.get("BTCUSDT").unwrap();
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history[0].close, 101.0);
        assert_eq!(state.current.open, 102.0);
        // The rolling tick's volume belongs to the new minute.
        assert!((state.current.quote_volume - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_history_is_bounded_fifo() {
        let mut agg = CandleAggregator::new(3);
        for minute in 0..6 {
            agg.apply_tick(&tick(
                "BTCUSDT",
                100.0 + minute as f64,
                1_000.0 + minute as f64,
                minute * 60_000,
            ));
        }
        let state = agg.get("BTCUSDT").unwrap();
        assert_eq!(state.history.len(), 3);
        // Oldest surviving candle opened at minute 2.
        assert_eq!(state.history[0].bucket, 2);
        assert_eq!(state.history[2].bucket, 4);
    }

    #[test]
    fn test_symbols_are_isolated() {
        let mut agg = CandleAggregator::new(60);
        agg.apply_tick(&tick("BTCUSDT", 100.0, 1_000.0, 0));
        agg.apply_tick(&tick("ETHUSDT", 10.0, 500.0, 0));
        agg.apply_tick(&tick("BTCUSDT", 105.0, 1_200.0, 1_000));
        assert_eq!(agg.len(), 2);
        assert_eq!(agg.get("ETHUSDT").unwrap().current.close, 10.0);
        assert_eq!(agg.get("BTCUSDT").unwrap().current.close, 105.0);
    }
}
