pub mod candle_aggregator;
pub mod classifier;
pub mod indicators;
pub mod paper_engine;
pub mod pump_detector;
pub mod trend;
pub mod whale;
