//! Per-worker session counters
//!
//! Every worker owns one `SessionMetrics` value. Values are merged additively
//! when workers finish, either directly or through a summary envelope on the
//! work queue.

use crate::state::FailureKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Named counters recorded by the crawl stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    /// Seconds spent extracting and storing new listings
    TotalTimeInfo,
    /// Seconds spent per subcategory walk
    TotalTimeSubcat,
    /// Seconds spent per category
    TotalTimeCat,
    /// Seconds spent in listing inserts
    TotalTimeInsert,
    /// Seconds spent in existence checks
    TotalTimeSelect,
    /// Seconds spent fetching descriptions that were saved
    TotalTimeJd,
    SslErrors,
    ProxyErrors,
    ConnErrors,
    RequestErrors,
    OtherErrors,
    StoreErrors,
    TotalSubcat,
    JobsListed,
    JobsSaved,
    JobsMissing,
    JobsSkipped,
    JobsAbandoned,
    PagesSkipped,
}

impl Counter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TotalTimeInfo => "total_time_info",
            Self::TotalTimeSubcat => "total_time_subcat",
            Self::TotalTimeCat => "total_time_cat",
            Self::TotalTimeInsert => "total_time_insert",
            Self::TotalTimeSelect => "total_time_select",
            Self::TotalTimeJd => "total_time_jd",
            Self::SslErrors => "ssl_errors",
            Self::ProxyErrors => "proxy_errors",
            Self::ConnErrors => "conn_errors",
            Self::RequestErrors => "request_errors",
            Self::OtherErrors => "other_errors",
            Self::StoreErrors => "store_errors",
            Self::TotalSubcat => "total_subcat",
            Self::JobsListed => "jobs_listed",
            Self::JobsSaved => "jobs_saved",
            Self::JobsMissing => "jobs_missing",
            Self::JobsSkipped => "jobs_skipped",
            Self::JobsAbandoned => "jobs_abandoned",
            Self::PagesSkipped => "pages_skipped",
        }
    }

    /// The error counter incremented for a transport failure
    pub fn for_failure(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Ssl => Self::SslErrors,
            FailureKind::Proxy => Self::ProxyErrors,
            FailureKind::Connection => Self::ConnErrors,
            FailureKind::Request => Self::RequestErrors,
            FailureKind::Unknown => Self::OtherErrors,
        }
    }
}

/// Additive named counters for one worker or one whole session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionMetrics {
    counters: BTreeMap<String, f64>,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one to a counter
    pub fn incr(&mut self, counter: Counter) {
        self.add(counter, 1.0);
    }

    /// Adds an arbitrary amount to a counter
    pub fn add(&mut self, counter: Counter, amount: f64) {
        *self
            .counters
            .entry(counter.as_str().to_string())
            .or_insert(0.0) += amount;
    }

    /// Adds elapsed seconds to a timing counter
    pub fn add_duration(&mut self, counter: Counter, elapsed: Duration) {
        self.add(counter, elapsed.as_secs_f64());
    }

    /// Current value of a counter (0.0 when never touched)
    pub fn get(&self, counter: Counter) -> f64 {
        self.get_named(counter.as_str())
    }

    /// Current value of a counter by name
    pub fn get_named(&self, name: &str) -> f64 {
        self.counters.get(name).copied().unwrap_or(0.0)
    }

    /// Merges another set of counters into this one
    ///
    /// Counters unknown to this build are kept, so summaries written by
    /// newer workers are not lost.
    pub fn merge(&mut self, other: &SessionMetrics) {
        for (name, value) in &other.counters {
            *self.counters.entry(name.clone()).or_insert(0.0) += value;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.counters.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incr_and_get() {
        let mut metrics = SessionMetrics::new();
        assert_eq!(metrics.get(Counter::ProxyErrors), 0.0);

        metrics.incr(Counter::ProxyErrors);
        metrics.incr(Counter::ProxyErrors);
        assert_eq!(metrics.get(Counter::ProxyErrors), 2.0);
    }

    #[test]
    fn test_merge_is_additive() {
        let mut a = SessionMetrics::new();
        a.add(Counter::TotalTimeJd, 1.5);
        a.incr(Counter::JobsSaved);

        let mut b = SessionMetrics::new();
        b.add(Counter::TotalTimeJd, 2.0);
        b.incr(Counter::ConnErrors);

        a.merge(&b);

        assert_eq!(a.get(Counter::TotalTimeJd), 3.5);
        assert_eq!(a.get(Counter::JobsSaved), 1.0);
        assert_eq!(a.get(Counter::ConnErrors), 1.0);
    }

    #[test]
    fn test_merge_keeps_unknown_counters() {
        let other: SessionMetrics = serde_json::from_str(r#"{"future_counter": 4.0}"#).unwrap();
        let mut metrics = SessionMetrics::new();
        metrics.merge(&other);
        assert_eq!(metrics.get_named("future_counter"), 4.0);
    }

    #[test]
    fn test_serializes_as_flat_map() {
        let mut metrics = SessionMetrics::new();
        metrics.incr(Counter::SslErrors);
        let json = serde_json::to_string(&metrics).unwrap();
        assert_eq!(json, r#"{"ssl_errors":1.0}"#);
    }

    #[test]
    fn test_failure_counters() {
        assert_eq!(Counter::for_failure(FailureKind::Proxy), Counter::ProxyErrors);
        assert_eq!(Counter::for_failure(FailureKind::Unknown), Counter::OtherErrors);
    }
}
