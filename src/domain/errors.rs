use serde::Serialize;
use thiserror::Error;

/// Validation failures on raw numeric inputs.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Value must be finite")]
    MustBeFinite,
}

/// Ticker stream connectivity errors.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Failed to parse ticker message: {0}")]
    MessageParse(String),

    #[error("Reconnection limit exceeded after {attempts} attempts")]
    ReconnectLimitExceeded { attempts: u32 },
}

/// Errors from the extended snapshot / 24h stats providers.
#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid payload from {endpoint}: {reason}")]
    InvalidPayload { endpoint: String, reason: String },
}

/// Deterministic policy rejections for a pump candidate.
///
/// Every discarded trigger carries one of these so the decision is auditable.
/// None of them corrupt shared state: trackers and candles are updated before
/// the rejection checks run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    #[error("manipulation risk: {reason}")]
    ManipulationRisk { reason: String, should_blacklist: bool },

    #[error("candidate snapshot unavailable")]
    SnapshotUnavailable,

    #[error("insufficient candle history ({have}/{need})")]
    InsufficientCandles { have: usize, need: usize },

    #[error("insufficient 15m closes for EMA gate ({have}/{need})")]
    InsufficientTimeframe { have: usize, need: usize },

    #[error("candle direction disagrees with EMA trend ({trend})")]
    TrendCandleMismatch { trend: String },

    #[error("direction {side} is disabled")]
    DirectionDisabled { side: String },

    #[error("technical filters failed: {detail}")]
    TechnicalFilters { detail: String },
}

/// Errors from the simulated position ledger.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum TradeError {
    #[error("Insufficient balance: required {required:.2}, available {available:.2}")]
    InsufficientBalance { required: f64, available: f64 },

    #[error("Concurrent position limit reached ({limit})")]
    PositionLimitReached { limit: usize },

    #[error("Position already open for {symbol} {side}")]
    DuplicatePosition { side: String, symbol: String },

    #[error("Same-direction trade on {symbol} closed too recently")]
    RecentlyClosed { symbol: String },

    #[error("Position {0} not found")]
    PositionNotFound(String),

    #[error("No market price available for {0}")]
    NoMarketPrice(String),

    #[error("Invalid trade parameters: {0}")]
    InvalidParameters(String),
}

impl From<ValidationError> for TradeError {
    fn from(e: ValidationError) -> Self {
        TradeError::InvalidParameters(e.to_string())
    }
}
