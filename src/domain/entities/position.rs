use crate::domain::entities::alert::{EliteType, Side};
use serde::Serialize;

/// How the position was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSource {
    Auto,
    Manual,
}

/// Quantity closed at each take-profit level.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PartialCloses {
    pub tp1: f64,
    pub tp2: f64,
}

/// A simulated leveraged position.
///
/// Lifecycle: OPEN → (TP1 hit)? → (TP2 hit, trailing active)? → closed, with
/// stop-loss reachable from any non-closed state. `quantity` only ever
/// decreases; `initial_quantity - quantity` always equals the sum of the
/// partial-close ledger.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub entry_price: f64,
    pub quantity: f64,
    pub initial_quantity: f64,
    pub leverage: f64,
    pub margin: f64,
    pub fees: f64,
    pub stop_loss: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub tp1_hit: bool,
    pub tp2_hit: bool,
    pub trailing_active: bool,
    /// Best price seen since trailing activated: highest for longs, lowest
    /// for shorts.
    pub watermark: f64,
    pub partial_closes: PartialCloses,
    pub min_price: f64,
    pub max_price: f64,
    pub opened_at_ms: i64,
    pub source: PositionSource,
    pub alert_type: Option<EliteType>,
    pub support_level: Option<f64>,
    pub resistance_level: Option<f64>,
}

impl Position {
    /// Directional price difference at `price` (positive = in profit).
    pub fn directional_diff(&self, price: f64) -> f64 {
        match self.side {
            Side::Long => price - self.entry_price,
            Side::Short => self.entry_price - price,
        }
    }

    /// Unrealized PnL of the remaining quantity, before fees.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.directional_diff(price) * self.quantity
    }

    pub fn stop_hit(&self, price: f64) -> bool {
        match self.side {
            Side::Long => price <= self.stop_loss,
            Side::Short => price >= self.stop_loss,
        }
    }

    pub fn tp1_reached(&self, price: f64) -> bool {
        !self.tp1_hit
            && match self.side {
                Side::Long => price >= self.tp1,
                Side::Short => price <= self.tp1,
            }
    }

    pub fn tp2_reached(&self, price: f64) -> bool {
        self.tp1_hit
            && !self.tp2_hit
            && match self.side {
                Side::Long => price >= self.tp2,
                Side::Short => price <= self.tp2,
            }
    }

    /// Record the running price extremes observed during the trade.
    pub fn observe_price(&mut self, price: f64) {
        self.max_price = self.max_price.max(price);
        self.min_price = self.min_price.min(price);
    }
}
