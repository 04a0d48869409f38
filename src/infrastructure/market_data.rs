//! REST access to the futures market data endpoints used by deep analysis.
//!
//! Everything the pipeline needs beyond the ticker stream comes through the
//! [`MarketDataProvider`] trait so tests can substitute canned data.

use crate::config::ProviderConfig;
use crate::domain::entities::market::Stats24h;
use crate::domain::errors::MarketDataError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::Value;

static SHARED_HTTP: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .unwrap_or_default()
});

/// One OHLCV bar from the klines endpoint.
#[derive(Debug, Clone)]
pub struct Kline {
    pub open_time_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub quote_volume: f64,
}

/// One aggregated trade.
#[derive(Debug, Clone)]
pub struct AggTrade {
    pub price: f64,
    pub quantity: f64,
    /// True when the buyer was the passive side, i.e. the trade was a sell.
    pub is_buyer_maker: bool,
}

impl AggTrade {
    pub fn quote_quantity(&self) -> f64 {
        self.price * self.quantity
    }
}

/// Top levels of the order book.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    /// (price, quantity) pairs, best first.
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

impl OrderBook {
    /// Aggregate bid quantity over aggregate ask quantity. Neutral 1.0 when
    /// either side is empty.
    pub fn imbalance(&self) -> f64 {
        let bid_total: f64 = self.bids.iter().map(|(_, q)| q).sum();
        let ask_total: f64 = self.asks.iter().map(|(_, q)| q).sum();
        if bid_total <= 0.0 || ask_total <= 0.0 {
            return 1.0;
        }
        bid_total / ask_total
    }
}

/// Read-side port for everything deep analysis fetches on demand.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Kline>, MarketDataError>;

    async fn agg_trades(&self, symbol: &str, limit: usize)
        -> Result<Vec<AggTrade>, MarketDataError>;

    async fn order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, MarketDataError>;

    /// `None` when the venue does not report open interest for the symbol.
    async fn open_interest(&self, symbol: &str) -> Result<Option<f64>, MarketDataError>;

    /// Latest funding rate, `None` when unavailable.
    async fn funding_rate(&self, symbol: &str) -> Result<Option<f64>, MarketDataError>;

    async fn stats_24h(&self, symbol: &str) -> Result<Stats24h, MarketDataError>;
}

/// Binance USDⓈ-M futures REST client.
#[derive(Debug, Clone)]
pub struct BinanceFuturesClient {
    http: reqwest::Client,
    base_url: String,
}

impl BinanceFuturesClient {
    pub fn new(config: &ProviderConfig) -> Self {
        BinanceFuturesClient {
            http: SHARED_HTTP.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, MarketDataError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.get(&url).query(query).send().await?;
        let response = response.error_for_status()?;
        Ok(response.json::<Value>().await?)
    }
}

fn field_f64(value: &Value, field: &str, endpoint: &str) -> Result<f64, MarketDataError> {
    parse_numeric(&value[field]).ok_or_else(|| MarketDataError::InvalidPayload {
        endpoint: endpoint.to_string(),
        reason: format!("missing or non-numeric field `{}`", field),
    })
}

/// The API reports numbers as JSON strings; accept both forms.
fn parse_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn parse_kline_row(row: &Value, endpoint: &str) -> Result<Kline, MarketDataError> {
    let invalid = |reason: &str| MarketDataError::InvalidPayload {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };
    let cells = row.as_array().ok_or_else(|| invalid("kline row is not an array"))?;
    if cells.len() < 8 {
        return Err(invalid("kline row too short"));
    }
    Ok(Kline {
        open_time_ms: cells[0].as_i64().ok_or_else(|| invalid("bad open time"))?,
        open: parse_numeric(&cells[1]).ok_or_else(|| invalid("bad open"))?,
        high: parse_numeric(&cells[2]).ok_or_else(|| invalid("bad high"))?,
        low: parse_numeric(&cells[3]).ok_or_else(|| invalid("bad low"))?,
        close: parse_numeric(&cells[4]).ok_or_else(|| invalid("bad close"))?,
        quote_volume: parse_numeric(&cells[7]).ok_or_else(|| invalid("bad quote volume"))?,
    })
}

fn parse_book_side(value: &Value) -> Vec<(f64, f64)> {
    value
        .as_array()
        .map(|levels| {
            levels
                .iter()
                .filter_map(|level| {
                    let cells = level.as_array()?;
                    Some((parse_numeric(cells.first()?)?, parse_numeric(cells.get(1)?)?))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl MarketDataProvider for BinanceFuturesClient {
    async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Kline>, MarketDataError> {
        let payload = self
            .get_json(
                "/fapi/v1/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        let rows = payload.as_array().ok_or_else(|| MarketDataError::InvalidPayload {
            endpoint: "klines".to_string(),
            reason: "expected an array".to_string(),
        })?;
        rows.iter().map(|row| parse_kline_row(row, "klines")).collect()
    }

    async fn agg_trades(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<AggTrade>, MarketDataError> {
        let payload = self
            .get_json(
                "/fapi/v1/aggTrades",
                &[("symbol", symbol.to_string()), ("limit", limit.to_string())],
            )
            .await?;
        let rows = payload.as_array().ok_or_else(|| MarketDataError::InvalidPayload {
            endpoint: "aggTrades".to_string(),
            reason: "expected an array".to_string(),
        })?;
        rows.iter()
            .map(|row| {
                Ok(AggTrade {
                    price: field_f64(row, "p", "aggTrades")?,
                    quantity: field_f64(row, "q", "aggTrades")?,
                    is_buyer_maker: row["m"].as_bool().unwrap_or(false),
                })
            })
            .collect()
    }

    async fn order_book(&self, symbol: &str, depth: usize) -> Result<OrderBook, MarketDataError> {
        let payload = self
            .get_json(
                "/fapi/v1/depth",
                &[("symbol", symbol.to_string()), ("limit", depth.to_string())],
            )
            .await?;
        Ok(OrderBook {
            bids: parse_book_side(&payload["bids"]),
            asks: parse_book_side(&payload["asks"]),
        })
    }

    async fn open_interest(&self, symbol: &str) -> Result<Option<f64>, MarketDataError> {
        let payload = self
            .get_json("/fapi/v1/openInterest", &[("symbol", symbol.to_string())])
            .await?;
        Ok(parse_numeric(&payload["openInterest"]))
    }

    async fn funding_rate(&self, symbol: &str) -> Result<Option<f64>, MarketDataError> {
        let payload = self
            .get_json("/fapi/v1/premiumIndex", &[("symbol", symbol.to_string())])
            .await?;
        Ok(parse_numeric(&payload["lastFundingRate"]))
    }

    async fn stats_24h(&self, symbol: &str) -> Result<Stats24h, MarketDataError> {
        let payload = self
            .get_json("/fapi/v1/ticker/24hr", &[("symbol", symbol.to_string())])
            .await?;
        Ok(Stats24h {
            high: field_f64(&payload, "highPrice", "ticker/24hr")?,
            low: field_f64(&payload, "lowPrice", "ticker/24hr")?,
            quote_volume: field_f64(&payload, "quoteVolume", "ticker/24hr")?,
        })
    }
}
