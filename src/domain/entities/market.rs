use serde::Serialize;

/// One symbol entry from a ticker stream batch. Transient: nothing outside
/// the derived aggregates retains it.
#[derive(Debug, Clone)]
pub struct Tick {
    pub symbol: String,
    /// Last traded price.
    pub price: f64,
    /// Cumulative 24h quote volume as reported by the feed.
    pub quote_volume_24h: f64,
    /// 24h percent change.
    pub change_24h: f64,
    /// Arrival time, unix milliseconds.
    pub timestamp_ms: i64,
}

/// Latest observed state of a symbol, the read model behind the market
/// overview and the position mark-to-market loop.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolSnapshot {
    pub symbol: String,
    pub price: f64,
    pub change_24h: f64,
    pub quote_volume_24h: f64,
}

/// 24h statistics used by the manipulation gate.
#[derive(Debug, Clone)]
pub struct Stats24h {
    pub high: f64,
    pub low: f64,
    pub quote_volume: f64,
}
