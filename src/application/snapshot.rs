//! On-demand candidate snapshots.
//!
//! Deep analysis needs order flow, book depth, structure levels, and
//! higher-timeframe closes that the ticker stream cannot provide. Fetches
//! are cached per symbol and deduplicated so a burst of triggers never
//! multiplies REST traffic.

use crate::config::{ProviderConfig, WhaleConfig};
use crate::domain::services::whale::WhaleInputs;
use crate::infrastructure::market_data::{AggTrade, MarketDataProvider, OrderBook};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Closes used to derive support and resistance.
const STRUCTURE_WINDOW: usize = 10;

/// Minimum 5m closes required for a usable snapshot.
const MIN_5M_CLOSES: usize = 10;

/// Everything deep analysis knows about a symbol beyond its local candles.
#[derive(Debug, Clone)]
pub struct CandidateSnapshot {
    pub symbol: String,
    pub support: f64,
    pub resistance: f64,
    pub large_order_count: usize,
    pub buy_pressure: f64,
    pub order_book_imbalance: f64,
    pub open_interest: Option<f64>,
    pub funding_rate: Option<f64>,
    pub closes_15m: Vec<f64>,
    pub fetched_at_ms: i64,
}

impl CandidateSnapshot {
    pub fn whale_inputs(&self) -> WhaleInputs {
        WhaleInputs {
            large_order_count: self.large_order_count,
            buy_pressure: self.buy_pressure,
            order_book_imbalance: self.order_book_imbalance,
            support: self.support,
            resistance: self.resistance,
            open_interest: self.open_interest,
            funding_rate: self.funding_rate,
        }
    }
}

/// Buy volume share and large-trade count from recent aggregated trades.
/// A trade is a buy when the buyer was the aggressor.
fn order_flow(trades: &[AggTrade], large_trade_multiplier: f64) -> (f64, usize) {
    if trades.is_empty() {
        return (0.5, 0);
    }
    let total: f64 = trades.iter().map(|t| t.quote_quantity()).sum();
    let average = total / trades.len() as f64;
    let large_threshold = average * large_trade_multiplier;
    let large_count = trades
        .iter()
        .filter(|t| t.quote_quantity() > large_threshold)
        .count();

    let buy_volume: f64 = trades
        .iter()
        .filter(|t| !t.is_buyer_maker)
        .map(|t| t.quote_quantity())
        .sum();
    let sell_volume = total - buy_volume;
    let denominator = buy_volume + sell_volume;
    let buy_pressure = if denominator > 0.0 {
        buy_volume / denominator
    } else {
        0.5
    };
    (buy_pressure, large_count)
}

/// Cached, deduplicated snapshot fetching on top of a [`MarketDataProvider`].
pub struct SnapshotProvider {
    market_data: Arc<dyn MarketDataProvider>,
    config: ProviderConfig,
    whale: WhaleConfig,
    cache: Mutex<HashMap<String, CandidateSnapshot>>,
    in_flight: Mutex<HashSet<String>>,
}

impl SnapshotProvider {
    pub fn new(
        market_data: Arc<dyn MarketDataProvider>,
        config: ProviderConfig,
        whale: WhaleConfig,
    ) -> Self {
        SnapshotProvider {
            market_data,
            config,
            whale,
            cache: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Snapshot for the symbol, served from cache while fresh. Returns
    /// `None` when data is unavailable or another fetch for the same symbol
    /// is already running.
    pub async fn fetch(&self, symbol: &str, now_ms: i64) -> Option<CandidateSnapshot> {
        if let Some(cached) = self.cached(symbol, now_ms) {
            return Some(cached);
        }
        if !self.begin_fetch(symbol) {
            debug!(symbol, "Snapshot fetch already in flight");
            return None;
        }
        let snapshot = self.fetch_fresh(symbol, now_ms).await;
        self.end_fetch(symbol);
        if let Some(snapshot) = &snapshot {
            self.cache
                .lock()
                .expect("snapshot cache poisoned")
                .insert(symbol.to_string(), snapshot.clone());
        }
        snapshot
    }

    fn cached(&self, symbol: &str, now_ms: i64) -> Option<CandidateSnapshot> {
        let cache = self.cache.lock().expect("snapshot cache poisoned");
        cache
            .get(symbol)
            .filter(|s| now_ms - s.fetched_at_ms < self.config.cache_duration_ms)
            .cloned()
    }

    fn begin_fetch(&self, symbol: &str) -> bool {
        self.in_flight
            .lock()
            .expect("in-flight set poisoned")
            .insert(symbol.to_string())
    }

    fn end_fetch(&self, symbol: &str) {
        self.in_flight
            .lock()
            .expect("in-flight set poisoned")
            .remove(symbol);
    }

    async fn fetch_fresh(&self, symbol: &str, now_ms: i64) -> Option<CandidateSnapshot> {
        let (klines_5m, klines_15m, trades, book, open_interest, funding_rate) = tokio::join!(
            self.market_data
                .klines(symbol, "5m", self.config.klines_5m_limit),
            self.market_data
                .klines(symbol, "15m", self.config.klines_15m_limit),
            self.market_data
                .agg_trades(symbol, self.config.agg_trades_limit),
            self.market_data.order_book(symbol, self.config.order_book_depth),
            self.market_data.open_interest(symbol),
            self.market_data.funding_rate(symbol),
        );

        let klines_5m = match klines_5m {
            Ok(k) => k,
            Err(e) => {
                warn!(symbol, error = %e, "5m klines fetch failed");
                return None;
            }
        };
        if klines_5m.len() < MIN_5M_CLOSES {
            debug!(symbol, have = klines_5m.len(), "Too few 5m closes for a snapshot");
            return None;
        }

        let closes_15m: Vec<f64> = match klines_15m {
            Ok(k) => k.iter().map(|k| k.close).collect(),
            Err(e) => {
                warn!(symbol, error = %e, "15m klines fetch failed");
                return None;
            }
        };

        let trades = match trades {
            Ok(t) => t,
            Err(e) => {
                warn!(symbol, error = %e, "aggTrades fetch failed");
                return None;
            }
        };
        let (buy_pressure, large_order_count) =
            order_flow(&trades, self.whale.large_trade_multiplier);

        // Book, OI, and funding are enrichments: degrade, don't fail.
        let order_book_imbalance = book.unwrap_or_else(|_| OrderBook::default()).imbalance();
        let open_interest = open_interest.ok().flatten();
        let funding_rate = funding_rate.ok().flatten();

        let structure: Vec<f64> = klines_5m
            .iter()
            .rev()
            .take(STRUCTURE_WINDOW)
            .map(|k| k.close)
            .collect();
        let support = structure.iter().cloned().fold(f64::INFINITY, f64::min);
        let resistance = structure.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        Some(CandidateSnapshot {
            symbol: symbol.to_string(),
            support,
            resistance,
            large_order_count,
            buy_pressure,
            order_book_imbalance,
            open_interest,
            funding_rate,
            closes_15m,
            fetched_at_ms: now_ms,
        })
    }
}
