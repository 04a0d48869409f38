pub mod engine;
pub mod scheduler;
pub mod snapshot;
