//! Orchestration: ticker batches in, classified alerts and simulated trades
//! out.
//!
//! All mutable state hangs off [`AppState`] behind short-lived synchronous
//! locks; the only awaits happen against the market data provider, with no
//! lock held across them.

use crate::config::{StrategyConfig, SystemConfig};
use crate::domain::entities::alert::{Side, TradingAlert};
use crate::domain::entities::market::{SymbolSnapshot, Tick};
use crate::domain::entities::position::{Position, PositionSource};
use crate::domain::entities::trade_history::{CloseReason, TradeHistoryItem};
use crate::domain::errors::{RejectReason, TradeError};
use crate::domain::services::candle_aggregator::CandleAggregator;
use crate::domain::services::classifier;
use crate::domain::services::indicators::{self, RSI_PERIOD};
use crate::domain::services::paper_engine::{OpenRequest, PaperTradingEngine};
use crate::domain::services::pump_detector::{PumpDetector, PumpSignal};
use crate::domain::services::trend::{self, TrendQualifier};
use crate::domain::services::whale;
use crate::application::scheduler::AnalysisScheduler;
use crate::application::snapshot::SnapshotProvider;
use crate::infrastructure::market_data::MarketDataProvider;
use crate::infrastructure::processed_alerts::ProcessedAlerts;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Completed 1m candles required before technical filtering.
const MIN_1M_CANDLES: usize = 5;

/// Closes fed into the technical filters.
const FILTER_WINDOW: usize = 15;

/// 15m closes required for the EMA direction gate.
const EMA_GATE_MIN_CLOSES: usize = 21;

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Per-request strategy overrides for a manual trade. Unset fields fall
/// back to the live strategy settings.
#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
pub struct TradeOverrides {
    pub leverage: Option<f64>,
    pub risk_per_trade: Option<f64>,
    pub stop_loss_percent: Option<f64>,
    pub tp1_percent: Option<f64>,
    pub tp2_percent: Option<f64>,
}

impl TradeOverrides {
    fn apply(&self, strategy: &mut StrategyConfig) -> Result<(), TradeError> {
        if let Some(leverage) = self.leverage {
            if !(1.0..=125.0).contains(&leverage) {
                return Err(TradeError::InvalidParameters(format!(
                    "leverage {} out of range",
                    leverage
                )));
            }
            strategy.leverage = leverage;
        }
        if let Some(risk) = self.risk_per_trade {
            if risk <= 0.0 || risk > 100.0 {
                return Err(TradeError::InvalidParameters(format!(
                    "risk per trade {} out of range",
                    risk
                )));
            }
            strategy.risk_per_trade = risk;
        }
        if let Some(stop) = self.stop_loss_percent {
            if stop <= 0.0 || stop >= 100.0 {
                return Err(TradeError::InvalidParameters(format!(
                    "stop-loss percent {} out of range",
                    stop
                )));
            }
            strategy.stop_loss_percent = stop;
        }
        if let Some(tp1) = self.tp1_percent {
            if tp1 <= 0.0 {
                return Err(TradeError::InvalidParameters(
                    "tp1 percent must be positive".to_string(),
                ));
            }
            strategy.tp1_percent = tp1;
        }
        if let Some(tp2) = self.tp2_percent {
            if tp2 <= 0.0 {
                return Err(TradeError::InvalidParameters(
                    "tp2 percent must be positive".to_string(),
                ));
            }
            strategy.tp2_percent = tp2;
        }
        Ok(())
    }
}

/// Ledger summary served by the account endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AccountOverview {
    pub balance: f64,
    pub initial_balance: f64,
    pub daily_loss: f64,
    pub equity: f64,
    pub open_positions: usize,
}

/// Shared mutable state behind the engine and the HTTP API.
pub struct AppState {
    pub system: SystemConfig,
    pub strategy: RwLock<StrategyConfig>,
    pub aggregator: Mutex<CandleAggregator>,
    pub detector: Mutex<PumpDetector>,
    pub scheduler: Mutex<AnalysisScheduler>,
    pub trend: TrendQualifier,
    pub snapshots: SnapshotProvider,
    pub market_data: Arc<dyn MarketDataProvider>,
    pub trading: Mutex<PaperTradingEngine>,
    pub alerts: Mutex<VecDeque<TradingAlert>>,
    pub processed: Mutex<ProcessedAlerts>,
    pub last_alert_ms: Mutex<HashMap<String, i64>>,
}

impl AppState {
    pub fn new(
        system: SystemConfig,
        strategy: StrategyConfig,
        market_data: Arc<dyn MarketDataProvider>,
        processed: ProcessedAlerts,
    ) -> Self {
        AppState {
            aggregator: Mutex::new(CandleAggregator::new(system.candle_history_len)),
            detector: Mutex::new(PumpDetector::new(system.pump.clone())),
            scheduler: Mutex::new(AnalysisScheduler::new(system.analysis.clone())),
            trend: TrendQualifier::new(system.trend.clone()),
            snapshots: SnapshotProvider::new(
                market_data.clone(),
                system.provider.clone(),
                system.whale.clone(),
            ),
            trading: Mutex::new(PaperTradingEngine::new(
                system.initial_balance,
                system.fee_rate,
                system.max_history,
            )),
            alerts: Mutex::new(VecDeque::new()),
            processed: Mutex::new(processed),
            last_alert_ms: Mutex::new(HashMap::new()),
            strategy: RwLock::new(strategy),
            market_data,
            system,
        }
    }

    pub fn strategy_snapshot(&self) -> StrategyConfig {
        self.strategy.read().expect("strategy lock poisoned").clone()
    }

    /// Latest observed state of every tracked symbol.
    pub fn market_overview(&self) -> Vec<SymbolSnapshot> {
        let aggregator = self.aggregator.lock().expect("aggregator lock poisoned");
        let mut overview: Vec<SymbolSnapshot> = aggregator
            .symbols()
            .map(|s| SymbolSnapshot {
                symbol: s.symbol.clone(),
                price: s.last_price,
                change_24h: s.change_24h,
                quote_volume_24h: s.quote_volume_24h,
            })
            .collect();
        overview.sort_by(|a, b| {
            b.quote_volume_24h
                .partial_cmp(&a.quote_volume_24h)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        overview
    }

    fn last_price(&self, symbol: &str) -> Option<f64> {
        self.aggregator
            .lock()
            .expect("aggregator lock poisoned")
            .get(symbol)
            .map(|s| s.last_price)
            .filter(|p| *p > 0.0)
    }

    fn open_position_prices(&self) -> HashMap<String, f64> {
        let symbols: Vec<String> = {
            let trading = self.trading.lock().expect("trading lock poisoned");
            trading.positions().iter().map(|p| p.symbol.clone()).collect()
        };
        let aggregator = self.aggregator.lock().expect("aggregator lock poisoned");
        symbols
            .into_iter()
            .filter_map(|symbol| {
                let price = aggregator.get(&symbol).map(|s| s.last_price)?;
                (price > 0.0).then_some((symbol, price))
            })
            .collect()
    }

    /// Ledger summary for the API: balance plus derived equity.
    pub fn account_overview(&self) -> AccountOverview {
        let prices = self.open_position_prices();
        let trading = self.trading.lock().expect("trading lock poisoned");
        let account = trading.account();
        AccountOverview {
            balance: account.balance,
            initial_balance: account.initial_balance,
            daily_loss: account.daily_loss,
            equity: trading.equity(&prices),
            open_positions: trading.positions().len(),
        }
    }

    /// Open a position at the latest market price on user request. Any
    /// override replaces the corresponding strategy setting for this trade
    /// only.
    pub fn manual_trade(
        &self,
        symbol: &str,
        side: Side,
        overrides: &TradeOverrides,
        now_ms: i64,
    ) -> Result<Position, TradeError> {
        let price = self
            .last_price(symbol)
            .ok_or_else(|| TradeError::NoMarketPrice(symbol.to_string()))?;
        let mut strategy = self.strategy_snapshot();
        overrides.apply(&mut strategy)?;
        let request = OpenRequest {
            symbol: symbol.to_string(),
            side,
            price,
            source: PositionSource::Manual,
            alert_type: None,
            support_level: None,
            resistance_level: None,
        };
        self.trading
            .lock()
            .expect("trading lock poisoned")
            .open(request, &strategy, now_ms)
    }

    /// Close one position at the latest market price on user request.
    pub fn manual_close(&self, position_id: &str, now_ms: i64) -> Result<TradeHistoryItem, TradeError> {
        let symbol = {
            let trading = self.trading.lock().expect("trading lock poisoned");
            trading
                .positions()
                .iter()
                .find(|p| p.id == position_id)
                .map(|p| p.symbol.clone())
                .ok_or_else(|| TradeError::PositionNotFound(position_id.to_string()))?
        };
        let price = self
            .last_price(&symbol)
            .ok_or(TradeError::NoMarketPrice(symbol))?;
        self.trading
            .lock()
            .expect("trading lock poisoned")
            .close(position_id, price, CloseReason::Manual, now_ms)
    }

    /// Disable auto-trading and flatten every open position.
    pub fn emergency_stop(&self, now_ms: i64) -> Vec<TradeHistoryItem> {
        {
            let mut strategy = self.strategy.write().expect("strategy lock poisoned");
            strategy.auto_trading = false;
        }
        let prices = self.open_position_prices();
        let closed = self
            .trading
            .lock()
            .expect("trading lock poisoned")
            .liquidate_all(&prices, now_ms);
        warn!(closed = closed.len(), "Emergency stop: all positions liquidated");
        closed
    }
}

/// Drives the full pipeline off the tick channel.
pub struct Engine {
    state: Arc<AppState>,
}

impl Engine {
    pub fn new(state: Arc<AppState>) -> Self {
        Engine { state }
    }

    pub async fn run(
        self,
        mut ticks: mpsc::Receiver<Vec<Tick>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut position_timer = tokio::time::interval(std::time::Duration::from_millis(
            self.state.system.position_tick_ms,
        ));
        position_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Engine shutting down");
                        return;
                    }
                }
                batch = ticks.recv() => match batch {
                    Some(batch) => {
                        let now = now_ms();
                        self.handle_batch(batch, now);
                        self.dispatch_due(now);
                    }
                    None => {
                        info!("Tick channel closed, engine stopping");
                        return;
                    }
                },
                _ = position_timer.tick() => {
                    let now = now_ms();
                    Self::mark_positions(&self.state, now);
                    self.dispatch_due(now);
                }
            }
        }
    }

    /// Fold a ticker batch into the candle aggregates and queue any pump
    /// candidates it produces. Returns the number of candidates queued.
    pub fn handle_batch(&self, ticks: Vec<Tick>, now_ms: i64) -> usize {
        let strategy = self.state.strategy_snapshot();
        let quote_suffix = &self.state.system.feed.quote_suffix;

        let mut aggregator = self
            .state
            .aggregator
            .lock()
            .expect("aggregator lock poisoned");
        let mut detector = self.state.detector.lock().expect("detector lock poisoned");
        let mut scheduler = self.state.scheduler.lock().expect("scheduler lock poisoned");

        let mut queued = 0;
        for tick in &ticks {
            aggregator.apply_tick(tick);

            if !strategy.pump_detection_enabled {
                continue;
            }
            if strategy.is_blacklisted(&tick.symbol, quote_suffix) {
                continue;
            }
            let Some(symbol_state) = aggregator.get(&tick.symbol) else {
                continue;
            };
            if let Some(signal) = detector.check(symbol_state, now_ms) {
                debug!(
                    symbol = %signal.symbol,
                    change = signal.change_percent,
                    volume_ratio = signal.volume_ratio,
                    "Pump candidate"
                );
                if scheduler.enqueue(signal, now_ms) {
                    queued += 1;
                }
            }
        }
        queued
    }

    /// Spawn analysis tasks for every candidate whose debounce elapsed.
    pub fn dispatch_due(&self, now_ms: i64) {
        let due = self
            .state
            .scheduler
            .lock()
            .expect("scheduler lock poisoned")
            .take_due(now_ms);
        for signal in due {
            let state = self.state.clone();
            tokio::spawn(async move {
                let symbol = signal.symbol.clone();
                let started = now_ms;
                match Self::analyze_candidate(&state, signal, started).await {
                    Ok(alert) => Self::publish_alert(&state, alert, started),
                    Err(reason) => debug!(symbol = %symbol, %reason, "Candidate rejected"),
                }
                state
                    .scheduler
                    .lock()
                    .expect("scheduler lock poisoned")
                    .finish(&symbol);
            });
        }
    }

    /// The deep-analysis pipeline: manipulation gate, snapshot, EMA
    /// direction gate, technical filters, whale and trend scoring, then
    /// classification.
    pub async fn analyze_candidate(
        state: &Arc<AppState>,
        signal: PumpSignal,
        now_ms: i64,
    ) -> Result<TradingAlert, RejectReason> {
        let symbol = signal.symbol.clone();

        // Manipulation gate. Stats being unavailable is not evidence of
        // manipulation, so a fetch failure passes the candidate through.
        if let Ok(stats) = state.market_data.stats_24h(&symbol).await {
            let hourly = state
                .detector
                .lock()
                .expect("detector lock poisoned")
                .hourly_count(&symbol, now_ms);
            if let Err(risk) =
                whale::check_manipulation(&stats, hourly, &state.system.manipulation)
            {
                if risk.should_blacklist {
                    let mut strategy = state.strategy.write().expect("strategy lock poisoned");
                    if !strategy.is_blacklisted(&symbol, &state.system.feed.quote_suffix) {
                        info!(symbol = %symbol, reason = %risk.reason, "Blacklisting symbol");
                        strategy.blacklist.push(symbol.clone());
                    }
                }
                return Err(RejectReason::ManipulationRisk {
                    reason: risk.reason,
                    should_blacklist: risk.should_blacklist,
                });
            }
        }

        let snapshot = state
            .snapshots
            .fetch(&symbol, now_ms)
            .await
            .ok_or(RejectReason::SnapshotUnavailable)?;

        let (history, closes) = {
            let aggregator = state.aggregator.lock().expect("aggregator lock poisoned");
            let symbol_state = aggregator.get(&symbol).ok_or(
                RejectReason::InsufficientCandles {
                    have: 0,
                    need: MIN_1M_CANDLES,
                },
            )?;
            let history = symbol_state.history.clone();
            let start = history.len().saturating_sub(FILTER_WINDOW);
            let closes: Vec<f64> = history.iter().skip(start).map(|c| c.close).collect();
            (history, closes)
        };
        if history.len() < MIN_1M_CANDLES {
            return Err(RejectReason::InsufficientCandles {
                have: history.len(),
                need: MIN_1M_CANDLES,
            });
        }

        // Higher-timeframe direction gate.
        if snapshot.closes_15m.len() < EMA_GATE_MIN_CLOSES {
            return Err(RejectReason::InsufficientTimeframe {
                have: snapshot.closes_15m.len(),
                need: EMA_GATE_MIN_CLOSES,
            });
        }
        let ema_side = trend::ema_trend(&snapshot.closes_15m).ok_or(
            RejectReason::InsufficientTimeframe {
                have: snapshot.closes_15m.len(),
                need: EMA_GATE_MIN_CLOSES,
            },
        )?;
        let side = if signal.change_percent > 0.0 {
            Side::Long
        } else {
            Side::Short
        };
        if side != ema_side {
            return Err(RejectReason::TrendCandleMismatch {
                trend: ema_side.to_string(),
            });
        }

        let strategy = state.strategy_snapshot();
        if (side == Side::Long && !strategy.long_enabled)
            || (side == Side::Short && !strategy.short_enabled)
        {
            return Err(RejectReason::DirectionDisabled {
                side: side.to_string(),
            });
        }

        // Technical filters over the recent 1m closes.
        let min_close = closes.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_close = closes.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let cons_range = if min_close > 0.0 {
            (max_close - min_close) / min_close * 100.0
        } else {
            0.0
        };
        let avg_change = if closes.len() > 1 {
            closes
                .windows(2)
                .map(|w| (w[1] - w[0]).abs())
                .sum::<f64>()
                / (closes.len() - 1) as f64
        } else {
            0.0
        };
        let last_close = closes.last().copied().unwrap_or(signal.price);
        let volatility_pct = if last_close > 0.0 {
            avg_change / last_close * 100.0
        } else {
            0.0
        };
        let rsi = indicators::rsi(&closes, RSI_PERIOD);
        let macd = indicators::macd(&closes);

        let cons_ok = cons_range <= 4.0;
        let vol_ok = volatility_pct < 2.0;
        let rsi_ok = rsi >= 45.0;
        let macd_ok = macd.histogram > -0.0005;
        if !(cons_ok && vol_ok && rsi_ok && macd_ok) {
            return Err(RejectReason::TechnicalFilters {
                detail: format!(
                    "cons={:.2}% vol={:.2}% rsi={:.1} macd_hist={:.5}",
                    cons_range, volatility_pct, rsi, macd.histogram
                ),
            });
        }

        let score = whale::whale_score(&snapshot.whale_inputs(), &state.system.whale);
        let assessment = state.trend.qualify(&history, signal.change_percent);

        let is_follow_up = {
            let last_alerts = state.last_alert_ms.lock().expect("alert times poisoned");
            last_alerts
                .get(&symbol)
                .is_some_and(|&last| now_ms - last < state.system.analysis.follow_up_window_ms)
        };
        let classification =
            classifier::classify(score, rsi, assessment.is_strong(), is_follow_up, &strategy);

        let alert = TradingAlert {
            id: TradingAlert::make_id(classification.elite_type, &symbol, now_ms),
            symbol,
            side,
            reason: classification.reason.to_string(),
            change_percent: signal.change_percent,
            price: signal.price,
            reference_price: signal.reference_price,
            timestamp_ms: now_ms,
            elite_type: classification.elite_type,
            volume_multiplier: signal.volume_ratio,
            auto_trade: classification.auto_trade,
            support_level: Some(snapshot.support),
            resistance_level: Some(snapshot.resistance),
            whale_details: Some(crate::domain::entities::alert::WhaleDetails {
                score,
                large_orders: snapshot.large_order_count,
                order_book_imbalance: snapshot.order_book_imbalance,
                buy_pressure: snapshot.buy_pressure,
                support_level: snapshot.support,
                resistance_level: snapshot.resistance,
            }),
            trend_details: assessment.is_strong().then(|| assessment.details.clone()),
        };
        Ok(alert)
    }

    /// Record the alert and hand it to the auto-trader.
    pub fn publish_alert(state: &Arc<AppState>, alert: TradingAlert, now_ms: i64) {
        info!(
            symbol = %alert.symbol,
            side = %alert.side,
            elite_type = ?alert.elite_type,
            change = alert.change_percent,
            auto_trade = alert.auto_trade,
            "Alert"
        );
        {
            let mut last_alerts = state.last_alert_ms.lock().expect("alert times poisoned");
            last_alerts.insert(alert.symbol.clone(), now_ms);
        }
        {
            let mut alerts = state.alerts.lock().expect("alerts lock poisoned");
            alerts.push_front(alert.clone());
            alerts.truncate(state.system.max_alerts);
        }
        Self::execute_auto_trade(state, &alert, now_ms);
    }

    /// Consume an alert into a simulated position when policy allows.
    pub fn execute_auto_trade(state: &Arc<AppState>, alert: &TradingAlert, now_ms: i64) {
        let strategy = state.strategy_snapshot();
        if !strategy.auto_trading || !alert.auto_trade {
            return;
        }
        if strategy.elite_mode && !alert.is_elite() {
            return;
        }

        {
            let mut processed = state.processed.lock().expect("processed lock poisoned");
            if !processed.insert(&alert.id) {
                debug!(id = %alert.id, "Alert already consumed");
                return;
            }
        }

        let request = OpenRequest {
            symbol: alert.symbol.clone(),
            side: alert.side,
            price: alert.price,
            source: PositionSource::Auto,
            alert_type: Some(alert.elite_type),
            support_level: alert.support_level,
            resistance_level: alert.resistance_level,
        };
        let result = state
            .trading
            .lock()
            .expect("trading lock poisoned")
            .open(request, &strategy, now_ms);
        match result {
            Ok(position) => info!(
                symbol = %position.symbol,
                side = %position.side,
                id = %position.id,
                "Auto trade opened"
            ),
            Err(e) => debug!(symbol = %alert.symbol, error = %e, "Auto trade skipped"),
        }
    }

    /// Mark every open position to the latest prices.
    pub fn mark_positions(state: &Arc<AppState>, now_ms: i64) {
        let prices = state.open_position_prices();
        if prices.is_empty() {
            return;
        }
        let strategy = state.strategy_snapshot();
        state
            .trading
            .lock()
            .expect("trading lock poisoned")
            .mark_to_market(&prices, &strategy, now_ms);
    }
}
