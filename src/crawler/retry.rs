//! Transport failure handling shared by the listing and content stages
//!
//! Every failed request is counted, followed by a short backoff and an
//! identity rotation. A kind that fails `escalation_threshold` times in a row
//! forces a pool refresh instead; a refresh that loads a new set already
//! points at its head. Unknown failures are capped.

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::TransportFailure;
use crate::output::{Counter, SessionMetrics};
use crate::rotation::RotationPool;
use crate::state::{Escalation, FailureKind, FetchAttemptContext};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry limits derived from the crawler configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub backoff: Duration,
    pub escalation_threshold: u32,
    pub max_unknown_failures: u32,
    pub max_redirects: u32,
    pub listing_max_redirects: u32,
    pub max_content_misses: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            backoff: Duration::from_millis(config.backoff_ms),
            escalation_threshold: config.escalation_threshold,
            max_unknown_failures: config.max_unknown_failures,
            max_redirects: config.max_redirects,
            listing_max_redirects: config.listing_max_redirects,
            max_content_misses: config.max_content_misses,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CrawlerConfig::default())
    }
}

/// What to do after a transport failure was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Issue the request again with the (new) current identity
    Retry,

    /// Unknown failures hit their cap
    GiveUp,

    /// Stop signal arrived during the backoff
    Cancelled,
}

/// Counts, backs off, escalates and rotates after one failed request
pub async fn handle_transport_failure(
    failure: &TransportFailure,
    attempt: &mut FetchAttemptContext,
    pool: &mut RotationPool,
    policy: &RetryPolicy,
    metrics: &mut SessionMetrics,
    cancel: &CancellationToken,
) -> RetryDecision {
    metrics.incr(Counter::for_failure(failure.kind));
    let escalation = attempt.record_failure(failure.kind, policy.escalation_threshold);

    if failure.kind == FailureKind::Unknown
        && attempt.unknown_failures() >= policy.max_unknown_failures
    {
        tracing::warn!(
            failures = attempt.unknown_failures(),
            "Giving up after repeated unknown failures: {}",
            failure.message
        );
        return RetryDecision::GiveUp;
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => return RetryDecision::Cancelled,
        _ = tokio::time::sleep(policy.backoff) => {}
    }

    let refreshed = if escalation == Escalation::Refresh {
        tracing::debug!(kind = %failure.kind, "Failure threshold reached, refreshing proxies");
        pool.refresh().await
    } else {
        false
    };
    if !refreshed {
        pool.advance();
    }

    RetryDecision::Retry
}
