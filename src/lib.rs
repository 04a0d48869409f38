//! Real-time pump detection and simulated trading over a futures ticker
//! stream.
//!
//! The pipeline: the ticker feed builds per-symbol 1-minute candles, the
//! pump detector flags price/volume anomalies, deep analysis enriches each
//! candidate with order flow and higher-timeframe context, the classifier
//! grades it, and qualifying alerts drive a paper-trading ledger. An HTTP
//! API exposes state and manual controls.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
