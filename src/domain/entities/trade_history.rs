use crate::domain::entities::alert::{EliteType, Side};
use crate::domain::entities::position::PositionSource;
use serde::Serialize;

/// Why a position (or part of one) was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    StopLoss,
    TrailingStop,
    TakeProfit1,
    TakeProfit2,
    Manual,
    EmergencyStop,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::StopLoss => write!(f, "STOP LOSS"),
            CloseReason::TrailingStop => write!(f, "TRAILING SL"),
            CloseReason::TakeProfit1 => write!(f, "TP1"),
            CloseReason::TakeProfit2 => write!(f, "TP2"),
            CloseReason::Manual => write!(f, "MANUAL EXIT"),
            CloseReason::EmergencyStop => write!(f, "EMERGENCY STOP"),
        }
    }
}

/// Immutable record of a full or partial close, appended to the bounded
/// trade-history log.
#[derive(Debug, Clone, Serialize)]
pub struct TradeHistoryItem {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub leverage: f64,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub pnl: f64,
    pub pnl_percent: f64,
    pub fees: f64,
    pub reason: CloseReason,
    /// False for TP1/TP2 partial fills, true when the position left the book.
    pub full_close: bool,
    pub opened_at_ms: i64,
    pub closed_at_ms: i64,
    pub balance_after: f64,
    pub min_price_during_trade: f64,
    pub max_price_during_trade: f64,
    pub source: PositionSource,
    pub alert_type: Option<EliteType>,
}
