//! End-to-end pipeline scenarios: ticker batches through detection, deep
//! analysis, classification, and the simulated ledger, with market data
//! served from a canned provider.

use async_trait::async_trait;
use pumpwatch::application::engine::{AppState, Engine, TradeOverrides};
use pumpwatch::config::{StrategyConfig, SystemConfig};
use pumpwatch::domain::entities::alert::{EliteType, Side};
use pumpwatch::domain::entities::market::{Stats24h, Tick};
use pumpwatch::domain::errors::{MarketDataError, RejectReason};
use pumpwatch::infrastructure::market_data::{AggTrade, Kline, MarketDataProvider, OrderBook};
use pumpwatch::infrastructure::processed_alerts::{ProcessedAlertStore, ProcessedAlerts};
use std::sync::{Arc, Mutex};

const SYMBOL: &str = "ALPHAUSDT";
const MINUTE_MS: i64 = 60_000;

/// Canned market data: healthy 24h stats, whale-heavy order flow, a tight
/// 5m structure band, and a configurable 15m trend.
struct FakeMarketData {
    stats: Stats24h,
    closes_15m: Vec<f64>,
    closes_5m: Vec<f64>,
}

impl Default for FakeMarketData {
    fn default() -> Self {
        FakeMarketData {
            stats: Stats24h {
                high: 103.0,
                low: 99.0,
                quote_volume: 50_000_000.0,
            },
            closes_15m: (0..24).map(|i| 100.0 + i as f64 * 0.2).collect(),
            closes_5m: (0..12).map(|i| 100.0 + (i % 3) as f64 * 0.3).collect(),
        }
    }
}

fn klines_from(closes: &[f64]) -> Vec<Kline> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Kline {
            open_time_ms: i as i64 * 300_000,
            open: close,
            high: close,
            low: close,
            close,
            quote_volume: 1_000.0,
        })
        .collect()
}

#[async_trait]
impl MarketDataProvider for FakeMarketData {
    async fn klines(
        &self,
        _symbol: &str,
        interval: &str,
        _limit: usize,
    ) -> Result<Vec<Kline>, MarketDataError> {
        Ok(match interval {
            "5m" => klines_from(&self.closes_5m),
            _ => klines_from(&self.closes_15m),
        })
    }

    async fn agg_trades(
        &self,
        _symbol: &str,
        _limit: usize,
    ) -> Result<Vec<AggTrade>, MarketDataError> {
        // Fifty small buys plus one block buy: strong buy pressure and one
        // outsized trade.
        let mut trades: Vec<AggTrade> = (0..50)
            .map(|_| AggTrade {
                price: 100.0,
                quantity: 1.0,
                is_buyer_maker: false,
            })
            .collect();
        trades.push(AggTrade {
            price: 100.0,
            quantity: 100.0,
            is_buyer_maker: false,
        });
        Ok(trades)
    }

    async fn order_book(&self, _symbol: &str, _depth: usize) -> Result<OrderBook, MarketDataError> {
        Ok(OrderBook {
            bids: vec![(99.9, 30.0)],
            asks: vec![(100.1, 10.0)],
        })
    }

    async fn open_interest(&self, _symbol: &str) -> Result<Option<f64>, MarketDataError> {
        Ok(Some(2_000_000.0))
    }

    async fn funding_rate(&self, _symbol: &str) -> Result<Option<f64>, MarketDataError> {
        Ok(Some(0.0003))
    }

    async fn stats_24h(&self, _symbol: &str) -> Result<Stats24h, MarketDataError> {
        Ok(self.stats.clone())
    }
}

#[derive(Default)]
struct MemoryStore {
    saved: Mutex<Vec<String>>,
}

impl ProcessedAlertStore for MemoryStore {
    fn load(&self) -> Vec<String> {
        self.saved.lock().unwrap().clone()
    }

    fn save(&self, ids: &[String]) {
        *self.saved.lock().unwrap() = ids.to_vec();
    }
}

fn app_state(market_data: FakeMarketData) -> Arc<AppState> {
    let system = SystemConfig::default();
    let processed = ProcessedAlerts::new(system.max_alerts, Box::new(MemoryStore::default()));
    Arc::new(AppState::new(
        system,
        StrategyConfig::default(),
        Arc::new(market_data),
        processed,
    ))
}

fn tick(price: f64, cumulative_volume: f64, ts: i64) -> Tick {
    Tick {
        symbol: SYMBOL.to_string(),
        price,
        quote_volume_24h: cumulative_volume,
        change_24h: 1.0,
        timestamp_ms: ts,
    }
}

/// Nineteen quiet, slowly rising minutes of 100 quote volume each, then a
/// +1.5% spike on 4x volume. Returns the spike tick timestamp.
fn feed_quiet_then_spike(engine: &Engine) -> i64 {
    let mut cumulative = 0.0;
    for minute in 0..=18 {
        let price = 100.0 + minute as f64 * 0.05;
        cumulative += 100.0;
        engine.handle_batch(vec![tick(price, cumulative, minute * MINUTE_MS)], minute * MINUTE_MS);
    }
    let price = 100.0 + 18.0 * 0.05;
    let spike_ts = 18 * MINUTE_MS + 30_000;
    cumulative += 300.0;
    let queued = engine.handle_batch(vec![tick(price * 1.015, cumulative, spike_ts)], spike_ts);
    assert_eq!(queued, 1, "the spike should queue exactly one candidate");
    spike_ts
}

#[tokio::test]
async fn test_pump_flows_into_whale_alert_and_auto_trade() {
    let state = app_state(FakeMarketData::default());
    let engine = Engine::new(state.clone());

    let spike_ts = feed_quiet_then_spike(&engine);

    let due = state
        .scheduler
        .lock()
        .unwrap()
        .take_due(spike_ts + 2_000);
    assert_eq!(due.len(), 1);
    let signal = due.into_iter().next().unwrap();
    assert!(signal.change_percent >= 1.0);
    assert!(signal.volume_ratio >= 2.2);

    let alert = Engine::analyze_candidate(&state, signal, spike_ts + 2_000)
        .await
        .expect("candidate should survive every gate");
    // 30 (pressure) + 5 (one block trade) + 20 (tight band) + 10 (OI)
    // + 10 (funding) + 15 (imbalance) = 90.
    assert_eq!(alert.elite_type, EliteType::WhaleAccumulation);
    assert_eq!(alert.side, Side::Long);
    assert!(alert.auto_trade);
    assert_eq!(alert.whale_details.as_ref().unwrap().score, 90);

    Engine::publish_alert(&state, alert.clone(), spike_ts + 2_000);

    let alerts = state.alerts.lock().unwrap();
    assert_eq!(alerts.len(), 1);
    drop(alerts);

    let trading = state.trading.lock().unwrap();
    assert_eq!(trading.positions().len(), 1);
    let position = &trading.positions()[0];
    assert_eq!(position.symbol, SYMBOL);
    assert_eq!(position.side, Side::Long);
    assert_eq!(position.alert_type, Some(EliteType::WhaleAccumulation));
    drop(trading);

    assert!(state.processed.lock().unwrap().contains(&alert.id));

    // Re-publishing the same alert must not double-open.
    Engine::publish_alert(&state, alert, spike_ts + 3_000);
    assert_eq!(state.trading.lock().unwrap().positions().len(), 1);
}

#[tokio::test]
async fn test_thin_volume_symbol_is_rejected_and_blacklisted() {
    let market_data = FakeMarketData {
        stats: Stats24h {
            high: 103.0,
            low: 99.0,
            quote_volume: 500_000.0,
        },
        ..FakeMarketData::default()
    };
    let state = app_state(market_data);
    let engine = Engine::new(state.clone());

    let spike_ts = feed_quiet_then_spike(&engine);
    let signal = state
        .scheduler
        .lock()
        .unwrap()
        .take_due(spike_ts + 2_000)
        .into_iter()
        .next()
        .unwrap();

    let rejection = Engine::analyze_candidate(&state, signal, spike_ts + 2_000)
        .await
        .unwrap_err();
    assert!(matches!(
        rejection,
        RejectReason::ManipulationRisk {
            should_blacklist: true,
            ..
        }
    ));
    let strategy = state.strategy_snapshot();
    assert!(strategy.is_blacklisted(SYMBOL, "USDT"));

    // Blacklisted symbols no longer queue candidates.
    let later = spike_ts + 400_000;
    let queued = engine.handle_batch(vec![tick(105.0, 100_000.0, later)], later);
    assert_eq!(queued, 0);
}

#[tokio::test]
async fn test_counter_trend_candidate_is_rejected() {
    let market_data = FakeMarketData {
        closes_15m: (0..24).map(|i| 110.0 - i as f64 * 0.4).collect(),
        ..FakeMarketData::default()
    };
    let state = app_state(market_data);
    let engine = Engine::new(state.clone());

    let spike_ts = feed_quiet_then_spike(&engine);
    let signal = state
        .scheduler
        .lock()
        .unwrap()
        .take_due(spike_ts + 2_000)
        .into_iter()
        .next()
        .unwrap();

    let rejection = Engine::analyze_candidate(&state, signal, spike_ts + 2_000)
        .await
        .unwrap_err();
    assert!(matches!(rejection, RejectReason::TrendCandleMismatch { .. }));
    assert!(state.trading.lock().unwrap().positions().is_empty());
}

#[tokio::test]
async fn test_short_rejected_while_shorts_disabled() {
    let state = app_state(FakeMarketData {
        closes_15m: (0..24).map(|i| 110.0 - i as f64 * 0.4).collect(),
        ..FakeMarketData::default()
    });
    let engine = Engine::new(state.clone());

    // Quiet minutes, then a -1.5% dump on heavy volume.
    let mut cumulative = 0.0;
    for minute in 0..=18 {
        cumulative += 100.0;
        engine.handle_batch(
            vec![tick(100.0, cumulative, minute * MINUTE_MS)],
            minute * MINUTE_MS,
        );
    }
    let dump_ts = 18 * MINUTE_MS + 30_000;
    cumulative += 300.0;
    let queued = engine.handle_batch(vec![tick(98.5, cumulative, dump_ts)], dump_ts);
    assert_eq!(queued, 1);

    let signal = state
        .scheduler
        .lock()
        .unwrap()
        .take_due(dump_ts + 2_000)
        .into_iter()
        .next()
        .unwrap();
    let rejection = Engine::analyze_candidate(&state, signal, dump_ts + 2_000)
        .await
        .unwrap_err();
    // The downtrend matches the dump, but shorts are disabled by default.
    assert!(matches!(rejection, RejectReason::DirectionDisabled { .. }));
}

#[tokio::test]
async fn test_manual_trade_and_take_profit_round_trip() {
    let state = app_state(FakeMarketData::default());
    let engine = Engine::new(state.clone());

    engine.handle_batch(vec![tick(100.0, 1_000.0, 0)], 0);
    let position = state
        .manual_trade(SYMBOL, Side::Long, &TradeOverrides::default(), 0)
        .unwrap();
    assert!((position.entry_price - 100.0).abs() < 1e-9);

    // Price reaches TP1: 40% closes, stop moves to breakeven.
    engine.handle_batch(vec![tick(101.5, 1_100.0, 30_000)], 30_000);
    Engine::mark_positions(&state, 30_000);
    {
        let trading = state.trading.lock().unwrap();
        assert_eq!(trading.positions().len(), 1);
        let open = &trading.positions()[0];
        assert!(open.tp1_hit);
        assert!((open.stop_loss - 100.0).abs() < 1e-9);
        assert_eq!(trading.history().count(), 1);
    }

    // Pullback to breakeven stops out the remainder.
    engine.handle_batch(vec![tick(100.0, 1_150.0, 60_000)], 60_000);
    Engine::mark_positions(&state, 60_000);
    let trading = state.trading.lock().unwrap();
    assert!(trading.positions().is_empty());
    assert_eq!(trading.history().count(), 2);
}

#[tokio::test]
async fn test_manual_trade_overrides_replace_strategy_settings() {
    let state = app_state(FakeMarketData::default());
    let engine = Engine::new(state.clone());

    engine.handle_batch(vec![tick(100.0, 1_000.0, 0)], 0);
    let overrides = TradeOverrides {
        leverage: Some(5.0),
        risk_per_trade: Some(2.0),
        stop_loss_percent: Some(4.0),
        ..TradeOverrides::default()
    };
    let position = state
        .manual_trade(SYMBOL, Side::Long, &overrides, 0)
        .unwrap();
    // 2% of 10000 risked over a 4-point stop: 50 units at 5x leverage.
    assert!((position.quantity - 50.0).abs() < 1e-9);
    assert!((position.margin - 1_000.0).abs() < 1e-9);
    assert!((position.stop_loss - 96.0).abs() < 1e-9);

    let bad = TradeOverrides {
        leverage: Some(500.0),
        ..TradeOverrides::default()
    };
    assert!(state
        .manual_trade(SYMBOL, Side::Short, &bad, 0)
        .is_err());
    // The live settings are untouched by per-trade overrides.
    assert!((state.strategy_snapshot().leverage - 15.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_emergency_stop_flattens_and_disables_auto_trading() {
    let state = app_state(FakeMarketData::default());
    let engine = Engine::new(state.clone());

    engine.handle_batch(vec![tick(100.0, 1_000.0, 0)], 0);
    state
        .manual_trade(SYMBOL, Side::Long, &TradeOverrides::default(), 0)
        .unwrap();
    assert_eq!(state.trading.lock().unwrap().positions().len(), 1);

    let closed = state.emergency_stop(1_000);
    assert_eq!(closed.len(), 1);
    assert!(state.trading.lock().unwrap().positions().is_empty());
    assert!(!state.strategy_snapshot().auto_trading);
}
