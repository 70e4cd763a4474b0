//! Per-stream call statistics.

pub mod aggregator;

pub use aggregator::{
    StatSnapshot, StatWindow, StatWindowHandle, StatsAggregator, DEFAULT_MAX_STAT_INTERVAL,
};
