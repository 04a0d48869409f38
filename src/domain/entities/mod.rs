pub mod account;
pub mod alert;
pub mod candle;
pub mod market;
pub mod position;
pub mod trade_history;
