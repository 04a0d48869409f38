use serde::Serialize;

/// One fixed-duration (1-minute) OHLCV aggregate.
///
/// Mutated in place while its bucket is current; immutable once rolled into
/// history.
#[derive(Debug, Clone, Serialize)]
pub struct Candle {
    /// Minute bucket id: floor(unix_ms / 60_000).
    pub bucket: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Approximated base volume accumulated over the bucket.
    pub volume: f64,
    /// Quote volume accumulated over the bucket.
    pub quote_volume: f64,
}

impl Candle {
    /// Seed a fresh candle from the first tick of a bucket. The seed carries
    /// zero volume; it is an in-progress candle, not a completed one.
    pub fn seed(bucket: i64, price: f64) -> Self {
        Candle {
            bucket,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
            quote_volume: 0.0,
        }
    }

    /// Fold a tick into the in-progress candle.
    pub fn apply(&mut self, price: f64, quote_volume_delta: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.quote_volume += quote_volume_delta;
        if price > 0.0 {
            self.volume += quote_volume_delta / price;
        }
    }

    /// Percent change of close vs open.
    pub fn change_percent(&self) -> f64 {
        if self.open == 0.0 {
            return 0.0;
        }
        ((self.close - self.open) / self.open) * 100.0
    }

    pub fn is_green(&self) -> bool {
        self.close > self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_has_zero_volume() {
        let c = Candle::seed(100, 50.0);
        assert_eq!(c.open, 50.0);
        assert_eq!(c.high, 50.0);
        assert_eq!(c.low, 50.0);
        assert_eq!(c.close, 50.0);
        assert_eq!(c.volume, 0.0);
        assert_eq!(c.quote_volume, 0.0);
    }

    #[test]
    fn test_apply_updates_range_and_volume() {
        let mut c = Candle::seed(100, 50.0);
        c.apply(52.0, 104.0);
        c.apply(49.0, 49.0);
        assert_eq!(c.high, 52.0);
        assert_eq!(c.low, 49.0);
        assert_eq!(c.close, 49.0);
        assert_eq!(c.quote_volume, 153.0);
        assert!(c.volume > 0.0);
    }

    #[test]
    fn test_change_percent() {
        let mut c = Candle::seed(100, 100.0);
        c.apply(101.3, 0.0);
        assert!((c.change_percent() - 1.3).abs() < 1e-9);
        assert!(c.is_green());
    }
}
