//! Ticker stream ingestion.
//!
//! A single actor owns the websocket connection and pushes parsed tick
//! batches into the engine's channel. Reconnects are bounded; candle state
//! lives upstream, so a reconnect never loses aggregated history.

use crate::config::FeedConfig;
use crate::domain::entities::market::Tick;
use crate::domain::errors::FeedError;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct RawTicker {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "c")]
    last_price: String,
    #[serde(rename = "q")]
    quote_volume: String,
    #[serde(rename = "P")]
    change_percent: String,
    #[serde(rename = "E")]
    event_time_ms: i64,
}

/// Parse one `!ticker@arr` frame, keeping only symbols quoted in
/// `quote_suffix`. Entries with unparseable numbers are dropped, not fatal.
pub fn parse_ticker_batch(text: &str, quote_suffix: &str) -> Result<Vec<Tick>, FeedError> {
    let raw: Vec<RawTicker> =
        serde_json::from_str(text).map_err(|e| FeedError::MessageParse(e.to_string()))?;
    Ok(raw
        .into_iter()
        .filter(|t| t.symbol.ends_with(quote_suffix))
        .filter_map(|t| {
            Some(Tick {
                price: t.last_price.parse().ok()?,
                quote_volume_24h: t.quote_volume.parse().ok()?,
                change_24h: t.change_percent.parse().ok()?,
                timestamp_ms: t.event_time_ms,
                symbol: t.symbol,
            })
        })
        .collect())
}

/// Owns the ticker websocket and feeds tick batches downstream until shut
/// down or out of reconnect attempts.
pub struct MarketFeed {
    config: FeedConfig,
    events: mpsc::Sender<Vec<Tick>>,
    shutdown: watch::Receiver<bool>,
}

impl MarketFeed {
    pub fn spawn(
        config: FeedConfig,
        events: mpsc::Sender<Vec<Tick>>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<Result<(), FeedError>> {
        let feed = MarketFeed {
            config,
            events,
            shutdown,
        };
        tokio::spawn(feed.run())
    }

    async fn run(mut self) -> Result<(), FeedError> {
        let mut attempts: u32 = 0;
        loop {
            if *self.shutdown.borrow() {
                return Ok(());
            }

            match connect_async(self.config.url.as_str()).await {
                Ok((stream, _)) => {
                    info!(url = %self.config.url, "Ticker stream connected");
                    attempts = 0;
                    if let Err(e) = self.pump(stream).await {
                        warn!(error = %e, "Ticker stream dropped");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Ticker stream connection failed");
                }
            }

            if *self.shutdown.borrow() {
                return Ok(());
            }

            attempts += 1;
            if attempts >= self.config.max_reconnect_attempts {
                return Err(FeedError::ReconnectLimitExceeded { attempts });
            }
            info!(
                attempt = attempts,
                max = self.config.max_reconnect_attempts,
                "Reconnecting ticker stream"
            );

            let delay = std::time::Duration::from_millis(self.config.reconnect_delay_ms);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.changed() => return Ok(()),
            }
        }
    }

    /// Read frames until the connection drops, the engine goes away, or
    /// shutdown is signalled. `Ok` means a clean stop, `Err` a reconnectable
    /// failure.
    async fn pump(
        &mut self,
        stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) -> Result<(), FeedError> {
        let (mut write, mut read) = stream.split();
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => return Ok(()),
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        match parse_ticker_batch(&text, &self.config.quote_suffix) {
                            Ok(ticks) if !ticks.is_empty() => {
                                if self.events.send(ticks).await.is_err() {
                                    // Engine gone; nothing left to feed.
                                    return Ok(());
                                }
                            }
                            Ok(_) => {}
                            Err(e) => debug!(error = %e, "Skipping unparseable frame"),
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if write.send(Message::Pong(payload)).await.is_err() {
                            return Err(FeedError::ConnectionFailed(
                                "failed to answer ping".to_string(),
                            ));
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(FeedError::ConnectionFailed(
                            "stream closed by remote".to_string(),
                        ));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Err(FeedError::ConnectionFailed(e.to_string()));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ticker_batch_filters_quote_suffix() {
        let frame = r#"[
            {"s":"BTCUSDT","c":"42000.5","q":"1500000.0","P":"2.31","E":1700000000000},
            {"s":"ETHBTC","c":"0.055","q":"900.0","P":"-0.4","E":1700000000000},
            {"s":"SOLUSDT","c":"98.7","q":"450000.0","P":"5.12","E":1700000000001}
        ]"#;
        let ticks = parse_ticker_batch(frame, "USDT").unwrap();
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].symbol, "BTCUSDT");
        assert_eq!(ticks[0].price, 42000.5);
        assert_eq!(ticks[1].change_24h, 5.12);
        assert_eq!(ticks[1].timestamp_ms, 1700000000001);
    }

    #[test]
    fn test_parse_ticker_batch_drops_bad_numbers() {
        let frame = r#"[
            {"s":"BTCUSDT","c":"not-a-price","q":"1.0","P":"0.0","E":1},
            {"s":"ETHUSDT","c":"2000.0","q":"1.0","P":"0.0","E":1}
        ]"#;
        let ticks = parse_ticker_batch(frame, "USDT").unwrap();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].symbol, "ETHUSDT");
    }

    #[test]
    fn test_parse_ticker_batch_rejects_non_array() {
        assert!(parse_ticker_batch("{\"e\":\"pong\"}", "USDT").is_err());
        assert!(parse_ticker_batch("garbage", "USDT").is_err());
    }
}
