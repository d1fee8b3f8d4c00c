//! Logging and counters for the engine
//!
//! - `Logger`: synchronous structured JSON log lines
//! - `Metrics`: process-wide atomic counters

mod logger;
mod metrics;

pub use logger::{Level, Logger};
pub use metrics::Metrics;
