use serde::{Deserialize, Serialize};

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Long,
    Short,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Alert classification. Everything except `PumpStart` is an elite alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EliteType {
    WhaleAccumulation,
    InstitutionEntry,
    TrendStart,
    PumpStart,
}

impl EliteType {
    pub fn tag(&self) -> &'static str {
        match self {
            EliteType::WhaleAccumulation => "whale_accumulation",
            EliteType::InstitutionEntry => "institution_entry",
            EliteType::TrendStart => "trend_start",
            EliteType::PumpStart => "pump_start",
        }
    }
}

/// Whale-activity detail block attached to every alert.
#[derive(Debug, Clone, Serialize)]
pub struct WhaleDetails {
    pub score: u32,
    pub large_orders: usize,
    pub order_book_imbalance: f64,
    pub buy_pressure: f64,
    pub support_level: f64,
    pub resistance_level: f64,
}

/// Trend detail block, present only when the qualifier flagged a trend start.
#[derive(Debug, Clone, Serialize)]
pub struct TrendDetails {
    pub consolidation_range_pct: f64,
    pub breakout_percent: f64,
    pub volume_ratio: f64,
    pub trend_confirmed: bool,
    pub context: String,
    pub conditions_met: u32,
}

/// A classified, directional trading alert. Immutable once created; the
/// auto-trade path consumes each id at most once.
#[derive(Debug, Clone, Serialize)]
pub struct TradingAlert {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub reason: String,
    pub change_percent: f64,
    pub price: f64,
    pub reference_price: f64,
    pub timestamp_ms: i64,
    pub elite_type: EliteType,
    pub volume_multiplier: f64,
    pub auto_trade: bool,
    pub support_level: Option<f64>,
    pub resistance_level: Option<f64>,
    pub whale_details: Option<WhaleDetails>,
    pub trend_details: Option<TrendDetails>,
}

impl TradingAlert {
    pub fn make_id(elite_type: EliteType, symbol: &str, timestamp_ms: i64) -> String {
        format!("{}-{}-{}", elite_type.tag(), symbol, timestamp_ms)
    }

    pub fn is_elite(&self) -> bool {
        self.elite_type != EliteType::PumpStart
    }
}
