use crate::config::StrategyConfig;
use crate::domain::entities::account::AccountState;
use crate::domain::entities::alert::{EliteType, Side};
use crate::domain::entities::position::{PartialCloses, Position, PositionSource};
use crate::domain::entities::trade_history::{CloseReason, TradeHistoryItem};
use crate::domain::errors::TradeError;
use crate::domain::value_objects::price::Price;
use crate::domain::value_objects::quantity::Quantity;
use std::collections::{HashMap, VecDeque};
use tracing::info;

/// Offset applied to a support/resistance level when it is used as a
/// dynamic stop.
const DYNAMIC_STOP_OFFSET: f64 = 0.002;

/// Request to open a simulated position.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub source: PositionSource,
    pub alert_type: Option<EliteType>,
    pub support_level: Option<f64>,
    pub resistance_level: Option<f64>,
}

/// Simulated position ledger: sizing, margin accounting, staged take-profits,
/// trailing stops, and a bounded close history.
///
/// Margin conservation is the core invariant: every unit of margin reserved
/// at open is returned to the balance by the time the position fully closes,
/// proportionally on partial closes and in full on the final close.
#[derive(Debug)]
pub struct PaperTradingEngine {
    account: AccountState,
    positions: Vec<Position>,
    history: VecDeque<TradeHistoryItem>,
    fee_rate: f64,
    max_history: usize,
    next_position_seq: u64,
}

impl PaperTradingEngine {
    pub fn new(initial_balance: f64, fee_rate: f64, max_history: usize) -> Self {
        PaperTradingEngine {
            account: AccountState::new(initial_balance),
            positions: Vec::new(),
            history: VecDeque::new(),
            fee_rate,
            max_history,
            next_position_seq: 0,
        }
    }

    pub fn account(&self) -> &AccountState {
        &self.account
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn history(&self) -> impl Iterator<Item = &TradeHistoryItem> {
        self.history.iter()
    }

    /// Balance plus reserved margin plus unrealized PnL of every open
    /// position at the given prices.
    pub fn equity(&self, prices: &HashMap<String, f64>) -> f64 {
        let open_value: f64 = self
            .positions
            .iter()
            .map(|p| {
                let price = prices.get(&p.symbol).copied().unwrap_or(p.entry_price);
                p.margin + p.unrealized_pnl(price)
            })
            .sum();
        self.account.balance + open_value
    }

    /// Open a position sized so the stop-loss distance risks
    /// `risk_per_trade` percent of the current balance.
    pub fn open(
        &mut self,
        request: OpenRequest,
        strategy: &StrategyConfig,
        now_ms: i64,
    ) -> Result<Position, TradeError> {
        let entry_price = Price::new(request.price)?;
        if entry_price.value() <= 0.0 {
            return Err(TradeError::InvalidParameters(
                "price must be positive".to_string(),
            ));
        }

        if self.positions.len() >= strategy.max_concurrent_trades {
            return Err(TradeError::PositionLimitReached {
                limit: strategy.max_concurrent_trades,
            });
        }

        if self
            .positions
            .iter()
            .any(|p| p.symbol == request.symbol && p.side == request.side)
        {
            return Err(TradeError::DuplicatePosition {
                side: request.side.to_string(),
                symbol: request.symbol.clone(),
            });
        }

        let cooldown_ms = strategy.cooldown_minutes as i64 * 60_000;
        let recently_closed = self.history.iter().any(|item| {
            item.symbol == request.symbol
                && item.side == request.side
                && item.full_close
                && now_ms - item.closed_at_ms < cooldown_ms
        });
        if recently_closed {
            return Err(TradeError::RecentlyClosed {
                symbol: request.symbol.clone(),
            });
        }

        let risk_amount = self.account.balance * strategy.risk_per_trade / 100.0;
        let stop_distance = request.price * strategy.stop_loss_percent / 100.0;
        if stop_distance <= 0.0 {
            return Err(TradeError::InvalidParameters(
                "stop-loss distance must be positive".to_string(),
            ));
        }
        let quantity = Quantity::new(risk_amount / stop_distance)?.value();

        let notional = quantity * request.price;
        let margin = notional / strategy.leverage;
        let entry_fee = notional * self.fee_rate;
        let required = margin + entry_fee;
        if required > self.account.balance {
            return Err(TradeError::InsufficientBalance {
                required,
                available: self.account.balance,
            });
        }

        let stop_loss = self.initial_stop(&request, strategy);
        let (tp1, tp2) = match request.side {
            Side::Long => (
                request.price * (1.0 + strategy.tp1_percent / 100.0),
                request.price * (1.0 + strategy.tp2_percent / 100.0),
            ),
            Side::Short => (
                request.price * (1.0 - strategy.tp1_percent / 100.0),
                request.price * (1.0 - strategy.tp2_percent / 100.0),
            ),
        };

        self.account.reserve(margin, entry_fee, now_ms);
        self.next_position_seq += 1;

        let position = Position {
            id: format!("pos-{}-{}", self.next_position_seq, request.symbol),
            symbol: request.symbol,
            side: request.side,
            entry_price: request.price,
            quantity,
            initial_quantity: quantity,
            leverage: strategy.leverage,
            margin,
            fees: entry_fee,
            stop_loss,
            tp1,
            tp2,
            tp1_hit: false,
            tp2_hit: false,
            trailing_active: false,
            watermark: request.price,
            partial_closes: PartialCloses::default(),
            min_price: request.price,
            max_price: request.price,
            opened_at_ms: now_ms,
            source: request.source,
            alert_type: request.alert_type,
            support_level: request.support_level,
            resistance_level: request.resistance_level,
        };

        info!(
            symbol = %position.symbol,
            side = %position.side,
            quantity = position.quantity,
            margin = position.margin,
            stop_loss = position.stop_loss,
            "Opened position"
        );

        self.positions.push(position.clone());
        Ok(position)
    }

    /// Percent-based stop, overridden by the nearest structure level when
    /// dynamic stops are enabled and the level sits on the protective side.
    fn initial_stop(&self, request: &OpenRequest, strategy: &StrategyConfig) -> f64 {
        let percent_stop = match request.side {
            Side::Long => request.price * (1.0 - strategy.stop_loss_percent / 100.0),
            Side::Short => request.price * (1.0 + strategy.stop_loss_percent / 100.0),
        };
        if !strategy.use_dynamic_stop_loss {
            return percent_stop;
        }
        match request.side {
            Side::Long => match request.support_level {
                Some(support) if support > 0.0 => {
                    let dynamic = support * (1.0 - DYNAMIC_STOP_OFFSET);
                    if dynamic < request.price {
                        dynamic
                    } else {
                        percent_stop
                    }
                }
                _ => percent_stop,
            },
            Side::Short => match request.resistance_level {
                Some(resistance) if resistance > 0.0 => {
                    let dynamic = resistance * (1.0 + DYNAMIC_STOP_OFFSET);
                    if dynamic > request.price {
                        dynamic
                    } else {
                        percent_stop
                    }
                }
                _ => percent_stop,
            },
        }
    }

    /// Re-evaluate every open position at the latest prices. Stop-loss is
    /// checked before take-profits; at most one transition fires per
    /// position per tick, then an active trailing stop ratchets.
    pub fn mark_to_market(
        &mut self,
        prices: &HashMap<String, f64>,
        strategy: &StrategyConfig,
        now_ms: i64,
    ) -> Vec<TradeHistoryItem> {
        let mut events = Vec::new();
        let mut index = 0;
        while index < self.positions.len() {
            let price = match prices.get(&self.positions[index].symbol) {
                Some(&p) if p > 0.0 => p,
                _ => {
                    index += 1;
                    continue;
                }
            };

            self.positions[index].observe_price(price);

            if self.positions[index].stop_hit(price) {
                let reason = if self.positions[index].trailing_active {
                    CloseReason::TrailingStop
                } else {
                    CloseReason::StopLoss
                };
                let position = self.positions.remove(index);
                events.push(self.settle_full_close(position, price, reason, now_ms));
                continue;
            }

            if self.positions[index].tp1_reached(price) {
                let close_quantity = self.positions[index].initial_quantity
                    * strategy.tp1_close_percent
                    / 100.0;
                let item = self.settle_partial_close(
                    index,
                    close_quantity,
                    price,
                    CloseReason::TakeProfit1,
                    now_ms,
                );
                let position = &mut self.positions[index];
                position.tp1_hit = true;
                position.partial_closes.tp1 = close_quantity;
                // Breakeven: a winner never turns into a full loser.
                position.stop_loss = position.entry_price;
                events.push(item);
            } else if self.positions[index].tp2_reached(price) {
                let close_quantity =
                    self.positions[index].quantity * strategy.tp2_close_percent / 100.0;
                let item = self.settle_partial_close(
                    index,
                    close_quantity,
                    price,
                    CloseReason::TakeProfit2,
                    now_ms,
                );
                let position = &mut self.positions[index];
                position.tp2_hit = true;
                position.partial_closes.tp2 = close_quantity;
                position.trailing_active = true;
                position.stop_loss = position.tp1;
                position.watermark = price;
                events.push(item);
            }

            if self.positions[index].trailing_active {
                Self::ratchet_trailing_stop(&mut self.positions[index], price, strategy);
            }

            index += 1;
        }
        events
    }

    /// Move the watermark in the profitable direction only, and the stop
    /// with it. The stop never loosens.
    fn ratchet_trailing_stop(position: &mut Position, price: f64, strategy: &StrategyConfig) {
        let trail = strategy.trailing_percent / 100.0;
        match position.side {
            Side::Long => {
                position.watermark = position.watermark.max(price);
                let candidate = position.watermark * (1.0 - trail);
                position.stop_loss = position.stop_loss.max(candidate);
            }
            Side::Short => {
                position.watermark = position.watermark.min(price);
                let candidate = position.watermark * (1.0 + trail);
                position.stop_loss = position.stop_loss.min(candidate);
            }
        }
    }

    /// Close a position on demand at the given market price.
    pub fn close(
        &mut self,
        position_id: &str,
        price: f64,
        reason: CloseReason,
        now_ms: i64,
    ) -> Result<TradeHistoryItem, TradeError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(TradeError::InvalidParameters(format!(
                "price {} is not tradable",
                price
            )));
        }
        let index = self
            .positions
            .iter()
            .position(|p| p.id == position_id)
            .ok_or_else(|| TradeError::PositionNotFound(position_id.to_string()))?;
        let position = self.positions.remove(index);
        Ok(self.settle_full_close(position, price, reason, now_ms))
    }

    /// Close every open position at the latest known price. Positions with
    /// no quote fall back to their entry price.
    pub fn liquidate_all(
        &mut self,
        prices: &HashMap<String, f64>,
        now_ms: i64,
    ) -> Vec<TradeHistoryItem> {
        let open = std::mem::take(&mut self.positions);
        open.into_iter()
            .map(|position| {
                let price = prices
                    .get(&position.symbol)
                    .copied()
                    .unwrap_or(position.entry_price);
                self.settle_full_close(position, price, CloseReason::EmergencyStop, now_ms)
            })
            .collect()
    }

    fn settle_full_close(
        &mut self,
        position: Position,
        exit_price: f64,
        reason: CloseReason,
        now_ms: i64,
    ) -> TradeHistoryItem {
        let quantity = position.quantity;
        let close_fee = quantity * exit_price * self.fee_rate;
        let pnl = position.directional_diff(exit_price) * quantity - close_fee;
        let released_margin = position.margin;
        self.account.realize(pnl + released_margin, pnl, now_ms);

        let pnl_percent = if released_margin > 0.0 {
            pnl / released_margin * 100.0
        } else {
            0.0
        };

        info!(
            symbol = %position.symbol,
            side = %position.side,
            reason = %reason,
            pnl = pnl,
            balance = self.account.balance,
            "Closed position"
        );

        let item = TradeHistoryItem {
            id: position.id,
            symbol: position.symbol,
            side: position.side,
            leverage: position.leverage,
            quantity,
            entry_price: position.entry_price,
            exit_price,
            pnl,
            pnl_percent,
            fees: position.fees + close_fee,
            reason,
            full_close: true,
            opened_at_ms: position.opened_at_ms,
            closed_at_ms: now_ms,
            balance_after: self.account.balance,
            min_price_during_trade: position.min_price,
            max_price_during_trade: position.max_price,
            source: position.source,
            alert_type: position.alert_type,
        };
        self.push_history(item.clone());
        item
    }

    fn settle_partial_close(
        &mut self,
        index: usize,
        close_quantity: f64,
        exit_price: f64,
        reason: CloseReason,
        now_ms: i64,
    ) -> TradeHistoryItem {
        let position = &mut self.positions[index];
        let close_fee = close_quantity * exit_price * self.fee_rate;
        let pnl = position.directional_diff(exit_price) * close_quantity - close_fee;
        let released_margin = position.margin * close_quantity / position.quantity;

        position.quantity -= close_quantity;
        position.margin -= released_margin;
        position.fees += close_fee;
        self.account.realize(pnl + released_margin, pnl, now_ms);

        info!(
            symbol = %position.symbol,
            side = %position.side,
            reason = %reason,
            quantity = close_quantity,
            pnl = pnl,
            "Partial close"
        );

        let item = TradeHistoryItem {
            id: position.id.clone(),
            symbol: position.symbol.clone(),
            side: position.side,
            leverage: position.leverage,
            quantity: close_quantity,
            entry_price: position.entry_price,
            exit_price,
            pnl,
            pnl_percent: if released_margin > 0.0 {
                pnl / released_margin * 100.0
            } else {
                0.0
            },
            fees: close_fee,
            reason,
            full_close: false,
            opened_at_ms: position.opened_at_ms,
            closed_at_ms: now_ms,
            balance_after: self.account.balance,
            min_price_during_trade: position.min_price,
            max_price_during_trade: position.max_price,
            source: position.source,
            alert_type: position.alert_type,
        };
        self.push_history(item.clone());
        item
    }

    fn push_history(&mut self, item: TradeHistoryItem) {
        self.history.push_front(item);
        self.history.truncate(self.max_history);
    }
}
