//! Output module for session metrics and reports
//!
//! This module handles:
//! - Per-worker counters (`SessionMetrics`)
//! - Merging counters into one persisted `SessionSummary`
//! - Printing harvest statistics

mod aggregator;
pub mod metrics;
pub mod stats;

pub use aggregator::{MetricsAggregator, SessionSummary};
pub use metrics::{Counter, SessionMetrics};
pub use stats::{load_statistics, print_statistics, HarvestStatistics};
