//! Metrics aggregation
//!
//! Merges the counters of every worker into one session record, derives
//! per-unit averages and persists the result through the gateway.

use crate::output::metrics::{Counter, SessionMetrics};
use crate::queue::{QueueEnvelope, QueueHandle, QueueResult};
use crate::storage::{Gateway, StorageResult, TIMESTAMP_FORMAT};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One persisted row describing a finished session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub site: String,
    pub config_hash: String,
    pub session_start: String,
    pub session_finish: String,

    /// Listings stored for the site when the session finished
    pub total_jobs: u64,
    /// Listings added by this session
    pub last_session_jobs: i64,
    /// Listings whose description was never fetched
    pub null_jd: u64,
    /// Listings stored with the missing-content sentinel
    pub missing_jd: u64,
    pub total_cat: u32,

    pub avg_time_info: f64,
    pub avg_time_insert: f64,
    pub avg_time_select: f64,
    pub avg_time_jd: f64,
    pub avg_time_subcat: f64,
    pub avg_time_cat: f64,

    pub counters: SessionMetrics,
}

/// Accumulates worker metrics over one session
pub struct MetricsAggregator {
    site: String,
    config_hash: String,
    started_at: DateTime<Utc>,
    start_total: Option<u64>,
    total_cat: u32,
    metrics: SessionMetrics,
}

impl MetricsAggregator {
    /// Starts a session, capturing the current listing total
    ///
    /// A failed count is logged and treated as unknown; the session still
    /// runs.
    pub fn begin(gateway: &dyn Gateway, site: &str, config_hash: &str, total_cat: u32) -> Self {
        let start_total = match gateway.count_total(site) {
            Ok(total) => Some(total),
            Err(e) => {
                warn!(site, error = %e, "Failed to count stored listings at session start");
                None
            }
        };

        Self {
            site: site.to_string(),
            config_hash: config_hash.to_string(),
            started_at: Utc::now(),
            start_total,
            total_cat,
            metrics: SessionMetrics::new(),
        }
    }

    /// Merges one worker's counters
    pub fn absorb(&mut self, metrics: &SessionMetrics) {
        self.metrics.merge(metrics);
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// Pulls every summary left on the queue into this session
    ///
    /// Job ids found while draining are put back at the tail so a later
    /// content run still sees them.
    pub fn drain_queue(&mut self, queue: &QueueHandle) -> QueueResult<usize> {
        let mut summaries = 0;
        let mut job_ids = Vec::new();

        while let Some(envelope) = queue.try_pop()? {
            match envelope {
                QueueEnvelope::Summary(metrics) => {
                    self.absorb(&metrics);
                    summaries += 1;
                }
                QueueEnvelope::JobId(id) => job_ids.push(id),
            }
        }

        if !job_ids.is_empty() {
            debug!(count = job_ids.len(), "Requeueing job ids found while draining summaries");
        }
        for id in job_ids {
            queue.put(&QueueEnvelope::JobId(id))?;
        }

        Ok(summaries)
    }

    /// Builds the session summary from the merged counters and store totals
    pub fn summarize(&self, gateway: &dyn Gateway) -> SessionSummary {
        let total_jobs = guarded_count(gateway.count_total(&self.site), "total");
        let null_jd = guarded_count(gateway.count_null_content(&self.site), "null content");
        let missing_jd = guarded_count(
            gateway.count_sentinel_content(&self.site),
            "missing content",
        );

        let last_session_jobs = match self.start_total {
            Some(start) => total_jobs as i64 - start as i64,
            None => 0,
        };
        let new_jobs = last_session_jobs as f64;
        let m = &self.metrics;

        SessionSummary {
            site: self.site.clone(),
            config_hash: self.config_hash.clone(),
            session_start: self.started_at.format(TIMESTAMP_FORMAT).to_string(),
            session_finish: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
            total_jobs,
            last_session_jobs,
            null_jd,
            missing_jd,
            total_cat: self.total_cat,
            avg_time_info: average(m.get(Counter::TotalTimeInfo), new_jobs),
            avg_time_insert: average(m.get(Counter::TotalTimeInsert), new_jobs),
            avg_time_select: average(m.get(Counter::TotalTimeSelect), new_jobs),
            avg_time_jd: average(m.get(Counter::TotalTimeJd), new_jobs),
            avg_time_subcat: average(
                m.get(Counter::TotalTimeSubcat),
                m.get(Counter::TotalSubcat),
            ),
            avg_time_cat: average(m.get(Counter::TotalTimeCat), self.total_cat as f64),
            counters: self.metrics.clone(),
        }
    }

    /// Summarizes the session and persists it
    pub fn finish(self, gateway: &dyn Gateway) -> StorageResult<SessionSummary> {
        let summary = self.summarize(gateway);
        gateway.record_session(&summary)?;
        Ok(summary)
    }
}

/// Divides and rounds to 5 decimals, falling back to 0.0
fn average(total: f64, units: f64) -> f64 {
    if units <= 0.0 {
        return 0.0;
    }
    let avg = total / units;
    if !avg.is_finite() {
        return 0.0;
    }
    (avg * 100_000.0).round() / 100_000.0
}

fn guarded_count(result: StorageResult<u64>, what: &str) -> u64 {
    match result {
        Ok(count) => count,
        Err(e) => {
            warn!(error = %e, "Failed to count {} listings", what);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use crate::storage::{JobContent, ListingRecord, SqliteGateway};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_average_guards() {
        assert_eq!(average(10.0, 0.0), 0.0);
        assert_eq!(average(10.0, -2.0), 0.0);
        assert_eq!(average(f64::NAN, 3.0), 0.0);
        assert_eq!(average(1.0, 3.0), 0.33333);
        assert_eq!(average(4.0, 2.0), 2.0);
    }

    #[test]
    fn test_summary_totals_and_averages() {
        let gateway = SqliteGateway::new_in_memory().unwrap();
        gateway
            .insert_listing("jora", &ListingRecord::new("old"))
            .unwrap();

        let mut aggregator = MetricsAggregator::begin(&gateway, "jora", "abc", 2);

        for id in ["1", "2"] {
            gateway
                .insert_listing("jora", &ListingRecord::new(id))
                .unwrap();
        }
        gateway
            .write_content("jora", "1", &JobContent::Missing)
            .unwrap();

        let mut worker = SessionMetrics::new();
        worker.add(Counter::TotalTimeInfo, 3.0);
        worker.add(Counter::TotalTimeCat, 5.0);
        worker.incr(Counter::ProxyErrors);
        aggregator.absorb(&worker);
        aggregator.absorb(&worker);

        let summary = aggregator.finish(&gateway).unwrap();
        assert_eq!(summary.total_jobs, 3);
        assert_eq!(summary.last_session_jobs, 2);
        assert_eq!(summary.null_jd, 2);
        assert_eq!(summary.missing_jd, 1);
        assert_eq!(summary.avg_time_info, 3.0);
        assert_eq!(summary.avg_time_cat, 5.0);
        // No subcategories were walked
        assert_eq!(summary.avg_time_subcat, 0.0);
        assert_eq!(summary.counters.get(Counter::ProxyErrors), 2.0);

        let stored = gateway.latest_session("jora").unwrap().unwrap();
        assert_eq!(stored, summary);
    }

    #[test]
    fn test_drain_queue_keeps_job_ids() {
        let queue = QueueHandle::new(
            Arc::new(MemoryQueue::new()),
            "jora_queue",
            Duration::from_millis(5),
        );
        let mut worker = SessionMetrics::new();
        worker.incr(Counter::JobsListed);

        queue.put(&QueueEnvelope::JobId("1".to_string())).unwrap();
        queue.put(&QueueEnvelope::Summary(worker.clone())).unwrap();
        queue.put(&QueueEnvelope::Summary(worker)).unwrap();

        let gateway = SqliteGateway::new_in_memory().unwrap();
        let mut aggregator = MetricsAggregator::begin(&gateway, "jora", "abc", 1);

        assert_eq!(aggregator.drain_queue(&queue).unwrap(), 2);
        assert_eq!(aggregator.metrics().get(Counter::JobsListed), 2.0);
        assert_eq!(queue.size().unwrap(), 1);
        assert_eq!(
            queue.try_pop().unwrap(),
            Some(QueueEnvelope::JobId("1".to_string()))
        );
    }
}
