//! Content stage: the per-job fetch state machine
//!
//! ```text
//! Start ──content stored──────────────────────────────▶ Skipped
//!   │
//!   ▼
//! Fetching ──200 + description──────────────────────────▶ Saved
//!   │  ▲     404/410/expired ──▶ write <missing> ────────▶ Saved
//!   │  │     3xx ──▶ refresh or rotate (cap) ────────────▶ GiveUp
//!   │  │     200 without description ──▶ rotate (cap) ───▶ GiveUp
//!   │  │     other status ───────────────────────────────▶ GiveUp
//!   ▼  │
//! Retry{Ssl,Proxy,Conn,Request,Unknown}
//! ```
//!
//! A stop signal ends the loop from any state without writing.

use crate::crawler::context::PipelineContext;
use crate::crawler::fetcher::{RawResponse, TransportFailure};
use crate::crawler::retry::{handle_transport_failure, RetryDecision};
use crate::output::{Counter, SessionMetrics};
use crate::rotation::RotationPool;
use crate::state::{FetchAttemptContext, FetchState};
use crate::storage::JobContent;
use std::time::Instant;

/// What was written for a saved job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedAs {
    Description,
    Missing,
}

/// Why a job was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    TooManyRedirects,
    /// Description never found; the sentinel was written
    ContentNotFound,
    UnexpectedStatus(u16),
    UnknownFailures,
    /// The gateway failed; the job stays without content for a later run
    Store,
}

/// Terminal result of one job id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Saved(SavedAs),
    Skipped,
    GiveUp(GiveUpReason),
    Cancelled,
}

impl FetchOutcome {
    /// The terminal state this outcome corresponds to
    pub fn state(&self) -> FetchState {
        match self {
            Self::Saved(_) => FetchState::Saved,
            Self::Skipped => FetchState::Skipped,
            Self::GiveUp(_) => FetchState::GiveUp,
            Self::Cancelled => FetchState::Cancelled,
        }
    }
}

/// Next step after a state was handled
enum Step {
    Next(FetchState),
    Done(FetchOutcome),
}

/// Fetches full descriptions for job ids, one at a time
pub struct ContentStage {
    ctx: PipelineContext,
    pool: RotationPool,
    metrics: SessionMetrics,
}

impl ContentStage {
    pub fn new(ctx: PipelineContext, pool: RotationPool) -> Self {
        Self {
            ctx,
            pool,
            metrics: SessionMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    pub fn into_metrics(self) -> SessionMetrics {
        self.metrics
    }

    pub fn pool(&self) -> &RotationPool {
        &self.pool
    }

    /// Drives one job id to a terminal state
    pub async fn fetch_job(&mut self, job_id: &str) -> FetchOutcome {
        let started = Instant::now();
        let url = self.ctx.extractor.content_url(job_id);
        let mut attempt = FetchAttemptContext::new();
        let mut state = FetchState::Start;
        let mut last_failure: Option<TransportFailure> = None;

        let outcome = loop {
            if self.ctx.is_cancelled() {
                break FetchOutcome::Cancelled;
            }
            tracing::trace!(job_id, state = %state, "Fetch state");

            let step = match state {
                FetchState::Start => self.check_existing(job_id),
                FetchState::Fetching => {
                    let identity = self.pool.current();
                    let result = tokio::select! {
                        biased;
                        _ = self.ctx.cancel.cancelled() => break FetchOutcome::Cancelled,
                        result = self.ctx.fetcher.fetch(&url, &identity) => result,
                    };

                    match result {
                        Ok(response) => {
                            attempt.clear_transport_failures();
                            self.handle_response(job_id, response, &mut attempt).await
                        }
                        Err(failure) => {
                            tracing::debug!(job_id, proxy = %identity.proxy, "{}", failure);
                            let next = failure.kind.retry_state();
                            last_failure = Some(failure);
                            Step::Next(next)
                        }
                    }
                }
                retry if retry.is_retry() => match last_failure.take() {
                    Some(failure) => self.retry(&failure, &mut attempt).await,
                    None => Step::Next(FetchState::Fetching),
                },
                // Terminal states are returned through Step::Done
                _ => Step::Next(FetchState::Fetching),
            };

            match step {
                Step::Next(next) => state = next,
                Step::Done(outcome) => break outcome,
            }
        };

        self.record_outcome(job_id, outcome, started);
        outcome
    }

    fn check_existing(&mut self, job_id: &str) -> Step {
        match self.ctx.gateway.content_exists(&self.ctx.site, job_id) {
            Ok(true) => Step::Done(FetchOutcome::Skipped),
            Ok(false) => Step::Next(FetchState::Fetching),
            Err(e) => {
                tracing::warn!(job_id, "Failed to check stored content: {}", e);
                self.metrics.incr(Counter::StoreErrors);
                Step::Done(FetchOutcome::GiveUp(GiveUpReason::Store))
            }
        }
    }

    async fn handle_response(
        &mut self,
        job_id: &str,
        response: RawResponse,
        attempt: &mut FetchAttemptContext,
    ) -> Step {
        if response.is_redirect() {
            let redirects = attempt.record_redirect();
            tracing::debug!(job_id, status = response.status, redirects, "Redirected");
            if redirects >= self.ctx.policy.max_redirects {
                return Step::Done(FetchOutcome::GiveUp(GiveUpReason::TooManyRedirects));
            }
            // A loaded set starts at its head; otherwise move on
            if !self.pool.refresh().await {
                self.pool.advance();
            }
            return Step::Next(FetchState::Fetching);
        }

        if response.is_gone() {
            return self.save(job_id, JobContent::Missing);
        }

        if !response.is_ok() {
            tracing::debug!(job_id, status = response.status, "Unexpected status");
            return Step::Done(FetchOutcome::GiveUp(GiveUpReason::UnexpectedStatus(
                response.status,
            )));
        }

        if self.ctx.extractor.is_expired(&response.body) {
            return self.save(job_id, JobContent::Missing);
        }

        if let Some(description) = self.ctx.extractor.extract_content(&response.body) {
            return self.save(job_id, JobContent::Description(description));
        }

        let misses = attempt.record_content_miss();
        tracing::debug!(job_id, misses, "No description on page");
        if misses >= self.ctx.policy.max_content_misses {
            return match self.save(job_id, JobContent::Missing) {
                Step::Done(FetchOutcome::Saved(_)) => {
                    Step::Done(FetchOutcome::GiveUp(GiveUpReason::ContentNotFound))
                }
                other => other,
            };
        }
        self.pool.advance();
        Step::Next(FetchState::Fetching)
    }

    async fn retry(&mut self, failure: &TransportFailure, attempt: &mut FetchAttemptContext) -> Step {
        let decision = handle_transport_failure(
            failure,
            attempt,
            &mut self.pool,
            &self.ctx.policy,
            &mut self.metrics,
            &self.ctx.cancel,
        )
        .await;

        match decision {
            RetryDecision::Retry => Step::Next(FetchState::Fetching),
            RetryDecision::GiveUp => Step::Done(FetchOutcome::GiveUp(GiveUpReason::UnknownFailures)),
            RetryDecision::Cancelled => Step::Done(FetchOutcome::Cancelled),
        }
    }

    fn save(&mut self, job_id: &str, content: JobContent) -> Step {
        let saved_as = if content.is_missing() {
            SavedAs::Missing
        } else {
            SavedAs::Description
        };

        match self
            .ctx
            .gateway
            .write_content(&self.ctx.site, job_id, &content)
        {
            Ok(true) => Step::Done(FetchOutcome::Saved(saved_as)),
            // Another worker wrote it first, or the listing is gone
            Ok(false) => Step::Done(FetchOutcome::Skipped),
            Err(e) => {
                tracing::warn!(job_id, "Failed to write content: {}", e);
                self.metrics.incr(Counter::StoreErrors);
                Step::Done(FetchOutcome::GiveUp(GiveUpReason::Store))
            }
        }
    }

    fn record_outcome(&mut self, job_id: &str, outcome: FetchOutcome, started: Instant) {
        match outcome {
            FetchOutcome::Saved(SavedAs::Description) => {
                self.metrics.incr(Counter::JobsSaved);
                self.metrics
                    .add_duration(Counter::TotalTimeJd, started.elapsed());
                tracing::info!(job_id, "Saved description");
            }
            FetchOutcome::Saved(SavedAs::Missing) => {
                self.metrics.incr(Counter::JobsMissing);
                self.metrics
                    .add_duration(Counter::TotalTimeJd, started.elapsed());
                tracing::info!(job_id, "Job no longer available");
            }
            FetchOutcome::Skipped => {
                self.metrics.incr(Counter::JobsSkipped);
                tracing::debug!(job_id, "Content already stored");
            }
            FetchOutcome::GiveUp(reason) => {
                self.metrics.incr(Counter::JobsAbandoned);
                if reason == GiveUpReason::ContentNotFound {
                    self.metrics.incr(Counter::JobsMissing);
                }
                tracing::info!(job_id, ?reason, "Gave up on job");
            }
            FetchOutcome::Cancelled => {
                tracing::debug!(job_id, "Fetch cancelled");
            }
        }
    }
}
