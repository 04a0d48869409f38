pub mod api;
pub mod market_data;
pub mod market_feed;
pub mod processed_alerts;
