use serde::{Deserialize, Serialize};

/// Pump detection thresholds.
#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// Minimum absolute percent change of the in-progress candle.
    pub price_change_min: f64,
    /// Minimum ratio of current minute volume to the trailing average.
    pub volume_ratio_min: f64,
    /// Per-symbol cooldown between pump alerts.
    pub cooldown_ms: i64,
    /// Completed-minute volumes kept per symbol.
    pub window_len: usize,
}

impl Default for PumpConfig {
    fn default() -> Self {
        PumpConfig {
            price_change_min: 1.0,
            volume_ratio_min: 2.2,
            cooldown_ms: 300_000,
            window_len: 10,
        }
    }
}

/// Trend qualification thresholds.
#[derive(Debug, Clone)]
pub struct TrendConfig {
    pub min_candles: usize,
    pub consolidation_max_pct: f64,
    pub low_volatility_max_pct: f64,
    pub breakout_min_pct: f64,
    pub volume_confirm_ratio: f64,
    pub confirm_candles: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        TrendConfig {
            min_candles: 15,
            consolidation_max_pct: 4.0,
            low_volatility_max_pct: 2.0,
            breakout_min_pct: 1.2,
            volume_confirm_ratio: 1.6,
            confirm_candles: 2,
        }
    }
}

/// Whale scoring parameters.
#[derive(Debug, Clone)]
pub struct WhaleConfig {
    /// A trade is "large" when its notional exceeds this multiple of the
    /// average trade size.
    pub large_trade_multiplier: f64,
    pub open_interest_floor: f64,
    pub funding_rate_floor: f64,
    pub imbalance_high: f64,
    pub imbalance_low: f64,
}

impl Default for WhaleConfig {
    fn default() -> Self {
        WhaleConfig {
            large_trade_multiplier: 5.0,
            open_interest_floor: 1_000_000.0,
            funding_rate_floor: 0.0001,
            imbalance_high: 2.5,
            imbalance_low: 0.4,
        }
    }
}

/// Manipulation gate thresholds.
#[derive(Debug, Clone)]
pub struct ManipulationConfig {
    pub min_24h_quote_volume: f64,
    pub max_volatility_range_pct: f64,
    pub max_pump_frequency_per_hour: u32,
}

impl Default for ManipulationConfig {
    fn default() -> Self {
        ManipulationConfig {
            min_24h_quote_volume: 1_000_000.0,
            max_volatility_range_pct: 30.0,
            max_pump_frequency_per_hour: 5,
        }
    }
}

/// Deep-analysis scheduling limits.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub queue_debounce_ms: u64,
    pub min_reanalysis_interval_ms: i64,
    pub max_concurrent: usize,
    /// Same-symbol alerts within this window relax classifier thresholds.
    pub follow_up_window_ms: i64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            queue_debounce_ms: 2_000,
            min_reanalysis_interval_ms: 60_000,
            max_concurrent: 3,
            follow_up_window_ms: 600_000,
        }
    }
}

/// Extended snapshot provider limits.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub klines_5m_limit: usize,
    pub klines_15m_limit: usize,
    pub agg_trades_limit: usize,
    pub order_book_depth: usize,
    pub cache_duration_ms: i64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            base_url: "https://fapi.binance.com".to_string(),
            klines_5m_limit: 24,
            klines_15m_limit: 16,
            agg_trades_limit: 500,
            order_book_depth: 20,
            cache_duration_ms: 60_000,
        }
    }
}

/// Ticker stream connectivity.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub url: String,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    /// Only symbols quoted in this asset are ingested.
    pub quote_suffix: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            url: "wss://fstream.binance.com/ws/!ticker@arr".to_string(),
            reconnect_delay_ms: 3_000,
            max_reconnect_attempts: 5,
            quote_suffix: "USDT".to_string(),
        }
    }
}

/// Static system tuning, fixed at startup.
#[derive(Debug, Clone)]
pub struct SystemConfig {
    pub pump: PumpConfig,
    pub trend: TrendConfig,
    pub whale: WhaleConfig,
    pub manipulation: ManipulationConfig,
    pub analysis: AnalysisConfig,
    pub provider: ProviderConfig,
    pub feed: FeedConfig,
    pub candle_history_len: usize,
    pub max_alerts: usize,
    pub max_history: usize,
    pub fee_rate: f64,
    pub position_tick_ms: u64,
    pub initial_balance: f64,
    pub processed_alerts_path: String,
    pub listen_addr: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            pump: PumpConfig::default(),
            trend: TrendConfig::default(),
            whale: WhaleConfig::default(),
            manipulation: ManipulationConfig::default(),
            analysis: AnalysisConfig::default(),
            provider: ProviderConfig::default(),
            feed: FeedConfig::default(),
            candle_history_len: 60,
            max_alerts: 1_000,
            max_history: 500,
            fee_rate: 0.0005,
            position_tick_ms: 1_000,
            initial_balance: 10_000.0,
            processed_alerts_path: "processed_alerts.json".to_string(),
            listen_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

impl SystemConfig {
    /// Load system tuning from environment variables, falling back to the
    /// defaults on missing or out-of-range values.
    pub fn from_env() -> SystemConfig {
        let mut config = SystemConfig::default();

        if let Ok(url) = std::env::var("FEED_URL") {
            match url::Url::parse(&url) {
                Ok(_) => config.feed.url = url,
                Err(e) => {
                    tracing::warn!("Invalid FEED_URL: {}, using default", e);
                }
            }
        }

        if let Ok(addr) = std::env::var("LISTEN_ADDR") {
            if !addr.is_empty() {
                config.listen_addr = addr;
            }
        }

        if let Ok(path) = std::env::var("PROCESSED_ALERTS_PATH") {
            if !path.is_empty() {
                config.processed_alerts_path = path;
            }
        }

        if let Ok(balance) = std::env::var("INITIAL_BALANCE") {
            match balance.parse::<f64>() {
                Ok(value) if value > 0.0 => config.initial_balance = value,
                Ok(value) => {
                    tracing::warn!(
                        "Invalid INITIAL_BALANCE value: {} (must be positive), using default: {}",
                        value,
                        config.initial_balance
                    );
                }
                Err(e) => {
                    tracing::warn!("Failed to parse INITIAL_BALANCE: {}, using default", e);
                }
            }
        }

        if let Ok(min_vol) = std::env::var("MANIPULATION_MIN_24H_VOLUME") {
            if let Ok(value) = min_vol.parse::<f64>() {
                if value >= 0.0 {
                    config.manipulation.min_24h_quote_volume = value;
                }
            }
        }

        if let Ok(pct) = std::env::var("PUMP_PRICE_CHANGE_MIN") {
            if let Ok(value) = pct.parse::<f64>() {
                if (0.1..=10.0).contains(&value) {
                    config.pump.price_change_min = value;
                }
            }
        }

        if let Ok(ratio) = std::env::var("PUMP_VOLUME_RATIO_MIN") {
            if let Ok(value) = ratio.parse::<f64>() {
                if value >= 1.0 {
                    config.pump.volume_ratio_min = value;
                }
            }
        }

        config
    }
}

/// Trading strategy settings, mutable at runtime through the API and
/// effective on the next evaluation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub auto_trading: bool,
    pub elite_mode: bool,
    pub pump_detection_enabled: bool,
    pub whale_detection_enabled: bool,
    pub long_enabled: bool,
    pub short_enabled: bool,
    pub leverage: f64,
    pub risk_per_trade: f64,
    pub stop_loss_percent: f64,
    pub tp1_percent: f64,
    pub tp2_percent: f64,
    pub trailing_percent: f64,
    pub tp1_close_percent: f64,
    pub tp2_close_percent: f64,
    pub cooldown_minutes: u32,
    pub max_concurrent_trades: usize,
    pub blacklist: Vec<String>,
    pub whale_min_score: f64,
    pub use_dynamic_stop_loss: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            auto_trading: true,
            elite_mode: true,
            pump_detection_enabled: true,
            whale_detection_enabled: true,
            long_enabled: true,
            short_enabled: false,
            leverage: 15.0,
            risk_per_trade: 1.0,
            stop_loss_percent: 2.0,
            tp1_percent: 1.5,
            tp2_percent: 4.0,
            trailing_percent: 2.0,
            tp1_close_percent: 40.0,
            tp2_close_percent: 30.0,
            cooldown_minutes: 5,
            max_concurrent_trades: 10,
            blacklist: vec![
                "FLOW".to_string(),
                "FOGO".to_string(),
                "BOME".to_string(),
                "CELO".to_string(),
            ],
            whale_min_score: 75.0,
            use_dynamic_stop_loss: false,
        }
    }
}

impl StrategyConfig {
    /// Load strategy settings from environment variables.
    pub fn from_env() -> StrategyConfig {
        let mut config = StrategyConfig::default();

        if let Ok(enabled) = std::env::var("AUTO_TRADING") {
            config.auto_trading = enabled.to_lowercase() == "true" || enabled == "1";
        }

        if let Ok(enabled) = std::env::var("LONG_ENABLED") {
            config.long_enabled = enabled.to_lowercase() == "true" || enabled == "1";
        }

        if let Ok(enabled) = std::env::var("SHORT_ENABLED") {
            config.short_enabled = enabled.to_lowercase() == "true" || enabled == "1";
        }

        if let Ok(risk) = std::env::var("RISK_PER_TRADE") {
            if let Ok(value) = risk.parse::<f64>() {
                if (0.1..=10.0).contains(&value) {
                    config.risk_per_trade = value;
                }
            }
        }

        if let Ok(lev) = std::env::var("LEVERAGE") {
            if let Ok(value) = lev.parse::<f64>() {
                if (1.0..=125.0).contains(&value) {
                    config.leverage = value;
                }
            }
        }

        if let Ok(sl) = std::env::var("STOP_LOSS_PERCENT") {
            if let Ok(value) = sl.parse::<f64>() {
                if value > 0.0 && value < 100.0 {
                    config.stop_loss_percent = value;
                }
            }
        }

        if let Ok(max_trades) = std::env::var("MAX_CONCURRENT_TRADES") {
            if let Ok(value) = max_trades.parse::<usize>() {
                if value > 0 && value <= 100 {
                    config.max_concurrent_trades = value;
                }
            }
        }

        if let Ok(score) = std::env::var("WHALE_MIN_SCORE") {
            if let Ok(value) = score.parse::<f64>() {
                if (0.0..=100.0).contains(&value) {
                    config.whale_min_score = value;
                }
            }
        }

        if let Ok(blacklist) = std::env::var("BLACKLIST") {
            config.blacklist = blacklist
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        config
    }

    /// Blacklist matching on the base asset: "FLOWUSDT" matches "FLOW".
    pub fn is_blacklisted(&self, symbol: &str, quote_suffix: &str) -> bool {
        if symbol.is_empty() {
            return false;
        }
        let clean = symbol
            .to_uppercase()
            .trim_end_matches(&quote_suffix.to_uppercase())
            .trim()
            .to_string();
        self.blacklist.iter().any(|b| {
            b.to_uppercase()
                .trim_end_matches(&quote_suffix.to_uppercase())
                .trim()
                == clean
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_system_config() {
        let config = SystemConfig::default();
        assert_eq!(config.pump.price_change_min, 1.0);
        assert_eq!(config.pump.volume_ratio_min, 2.2);
        assert_eq!(config.analysis.max_concurrent, 3);
        assert_eq!(config.candle_history_len, 60);
        assert_eq!(config.fee_rate, 0.0005);
    }

    #[test]
    fn test_default_strategy_config() {
        let config = StrategyConfig::default();
        assert!(config.auto_trading);
        assert!(config.long_enabled);
        assert!(!config.short_enabled);
        assert_eq!(config.whale_min_score, 75.0);
        assert_eq!(config.tp1_close_percent, 40.0);
    }

    #[test]
    fn test_is_blacklisted_strips_quote_suffix() {
        let config = StrategyConfig::default();
        assert!(config.is_blacklisted("FLOWUSDT", "USDT"));
        assert!(config.is_blacklisted("flow", "USDT"));
        assert!(!config.is_blacklisted("BTCUSDT", "USDT"));
        assert!(!config.is_blacklisted("", "USDT"));
    }

    #[test]
    fn test_strategy_config_round_trips_through_json() {
        let config = StrategyConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: StrategyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_concurrent_trades, config.max_concurrent_trades);
        assert_eq!(back.blacklist, config.blacklist);
    }

    #[test]
    fn test_partial_strategy_config_uses_defaults() {
        let back: StrategyConfig = serde_json::from_str(r#"{"leverage": 5.0}"#).unwrap();
        assert_eq!(back.leverage, 5.0);
        assert!(back.auto_trading);
    }
}
