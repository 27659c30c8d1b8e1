//! Harvest coordinator - worker pools and the run modes built on them
//!
//! This module wires the stages together:
//! - Opening the gateway and the durable queue
//! - Running one listing worker per category under a concurrency cap
//! - Running content workers until the queue holds only summaries
//! - Replaying jobs whose content is still missing
//! - Merging every worker's metrics into a persisted session summary

use crate::config::Config;
use crate::crawler::content::{ContentStage, FetchOutcome};
use crate::crawler::context::PipelineContext;
use crate::crawler::fetcher::HttpFetcher;
use crate::crawler::listing::ListingStage;
use crate::crawler::retry::RetryPolicy;
use crate::extract::SelectorExtractor;
use crate::output::{MetricsAggregator, SessionMetrics, SessionSummary};
use crate::queue::{QueueEnvelope, QueueError, QueueHandle, SqliteQueue};
use crate::rotation::source_from_config;
use crate::storage::SqliteGateway;
use crate::HarvestError;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// How often a blocked queue pop re-checks the backend
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why a content worker stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Only summaries were left on the queue
    Halted,
    /// Too many consecutive pops timed out
    QueueDrained,
    /// The queue backend failed
    QueueFailed,
    /// No rotation pool could be loaded
    PoolUnavailable,
    Cancelled,
}

/// What one content worker hands back to the coordinator
#[derive(Debug)]
pub struct ContentWorkerReport {
    pub worker: usize,
    pub exit: WorkerExit,
    /// `None` once the metrics were forwarded on the queue as a summary
    pub metrics: Option<SessionMetrics>,
}

/// Outcome of the listing pool
#[derive(Debug, Default)]
pub struct ListingReport {
    pub categories: usize,
    pub subcategories: usize,
    pub failed_categories: usize,
    /// Metrics that could not be posted to the queue
    pub unposted: SessionMetrics,
}

/// Result of one listing worker task
struct CategoryRun {
    subcategories: usize,
    pool_failed: bool,
    unposted: Option<SessionMetrics>,
}

/// Main harvest coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    config_hash: String,
    ctx: PipelineContext,
}

impl Coordinator {
    /// Creates a coordinator over the configured database and proxy source
    ///
    /// # Arguments
    ///
    /// * `config` - The validated harvester configuration
    /// * `config_hash` - Hash of the config file, recorded with each session
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Storage and queue are open
    /// * `Err(HarvestError)` - The store, queue, selectors or proxy source
    ///   could not be set up
    pub fn new(config: Config, config_hash: String) -> Result<Self, HarvestError> {
        let database_path = Path::new(&config.storage.database_path);
        let gateway = SqliteGateway::new(database_path)?;
        let backend = SqliteQueue::new(database_path)?;
        let queue = QueueHandle::new(
            Arc::new(backend),
            config.storage.queue_key_for(&config.site.name),
            QUEUE_POLL_INTERVAL,
        );
        let extractor = SelectorExtractor::from_config(&config.site, &config.selectors)?;
        let proxy_source = source_from_config(&config.identity)?;

        let ctx = PipelineContext {
            site: config.site.name.clone(),
            crawler: config.crawler.clone(),
            policy: RetryPolicy::from_config(&config.crawler),
            fetcher: Arc::new(HttpFetcher::new()),
            extractor: Arc::new(extractor),
            gateway: Arc::new(gateway),
            queue,
            proxy_source,
            user_agents: config.identity.user_agents.clone(),
            cancel: CancellationToken::new(),
        };

        tracing::info!(
            "Opened harvest store {} for site {}",
            config.storage.database_path,
            config.site.name
        );

        Ok(Self::with_context(config, config_hash, ctx))
    }

    /// Creates a coordinator around an already assembled pipeline
    pub fn with_context(config: Config, config_hash: String, ctx: PipelineContext) -> Self {
        Self {
            config: Arc::new(config),
            config_hash,
            ctx,
        }
    }

    /// Token that stops every worker when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Listing stage followed by the content stage, then one session record
    pub async fn run(&self) -> Result<SessionSummary, HarvestError> {
        tracing::info!("Starting harvest of {}", self.ctx.site);
        let mut aggregator = self.begin_session();

        let listing = self.run_listing_pool().await;
        if !listing.unposted.is_empty() {
            aggregator.absorb(&listing.unposted);
        }

        if self.ctx.is_cancelled() {
            tracing::warn!("Harvest cancelled after listing stage");
        } else {
            let reports = self.run_content_pool(self.config.categories.len()).await;
            absorb_reports(&mut aggregator, reports);
        }

        self.finish_session(aggregator)
    }

    /// Listing stage only
    ///
    /// Worker summaries stay on the queue for the next content run.
    pub async fn run_info(&self) -> Result<ListingReport, HarvestError> {
        tracing::info!("Starting listing harvest of {}", self.ctx.site);
        let report = self.run_listing_pool().await;

        tracing::info!(
            "Listing stage finished: {} categories, {} subcategories, {} failed",
            report.categories,
            report.subcategories,
            report.failed_categories
        );

        Ok(report)
    }

    /// Content stage only, over whatever the queue already holds
    pub async fn run_content(&self) -> Result<SessionSummary, HarvestError> {
        tracing::info!(
            "Starting content harvest of {} ({} queued)",
            self.ctx.site,
            self.ctx.queue.size()?
        );
        let mut aggregator = self.begin_session();

        let reports = self.run_content_pool(self.config.categories.len()).await;
        absorb_reports(&mut aggregator, reports);

        self.finish_session(aggregator)
    }

    /// Fetches content for every stored listing that still has none
    pub async fn run_missing_content(&self) -> Result<SessionSummary, HarvestError> {
        let mut aggregator = self.begin_session();
        let job_ids = self.ctx.gateway.list_missing_content_ids(&self.ctx.site)?;
        tracing::info!("Recovering content for {} jobs", job_ids.len());

        if !job_ids.is_empty() {
            let workers = (self.ctx.crawler.recovery_workers as usize).min(job_ids.len());
            let backlog = Arc::new(Mutex::new(VecDeque::from(job_ids)));
            let mut tasks = JoinSet::new();

            for _ in 0..workers {
                tasks.spawn(recovery_worker(self.ctx.clone(), backlog.clone()));
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(metrics) => aggregator.absorb(&metrics),
                    Err(e) => tracing::error!("Recovery worker failed: {}", e),
                }
            }
        }

        let summary = aggregator.finish(self.ctx.gateway.as_ref())?;
        Ok(summary)
    }

    fn begin_session(&self) -> MetricsAggregator {
        MetricsAggregator::begin(
            self.ctx.gateway.as_ref(),
            &self.ctx.site,
            &self.config_hash,
            self.config.categories.len() as u32,
        )
    }

    fn finish_session(
        &self,
        mut aggregator: MetricsAggregator,
    ) -> Result<SessionSummary, HarvestError> {
        let drained = aggregator.drain_queue(&self.ctx.queue)?;
        tracing::debug!("Drained {} summaries from the queue", drained);

        let summary = aggregator.finish(self.ctx.gateway.as_ref())?;
        tracing::info!(
            "Session finished: {} jobs stored, {} new, {} without content",
            summary.total_jobs,
            summary.last_session_jobs,
            summary.null_jd
        );
        Ok(summary)
    }

    /// One listing worker per category, at most `listing_workers` at a time
    ///
    /// Every worker posts exactly one summary, even when it failed.
    async fn run_listing_pool(&self) -> ListingReport {
        let semaphore = Arc::new(Semaphore::new(self.ctx.crawler.listing_workers as usize));
        let mut tasks = JoinSet::new();

        for category in self.config.categories.iter().cloned() {
            let ctx = self.ctx.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                listing_worker(ctx, category).await
            });
        }

        let mut report = ListingReport::default();
        while let Some(joined) = tasks.join_next().await {
            report.categories += 1;
            match joined {
                Ok(run) => {
                    report.subcategories += run.subcategories;
                    if run.pool_failed {
                        report.failed_categories += 1;
                    }
                    if let Some(metrics) = run.unposted {
                        report.unposted.merge(&metrics);
                    }
                }
                Err(e) => {
                    tracing::error!("Listing worker failed: {}", e);
                    report.failed_categories += 1;
                    if let Some(metrics) = post_summary(&self.ctx.queue, SessionMetrics::new()) {
                        report.unposted.merge(&metrics);
                    }
                }
            }
        }

        report
    }

    /// Runs `content_workers` workers until each one exits
    async fn run_content_pool(&self, expected_summaries: usize) -> Vec<ContentWorkerReport> {
        let mut tasks = JoinSet::new();
        for worker in 0..self.ctx.crawler.content_workers as usize {
            tasks.spawn(content_worker(self.ctx.clone(), worker, expected_summaries));
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    tracing::debug!("Content worker {} exited: {:?}", report.worker, report.exit);
                    reports.push(report);
                }
                Err(e) => tracing::error!("Content worker failed: {}", e),
            }
        }
        reports
    }
}

fn absorb_reports(aggregator: &mut MetricsAggregator, reports: Vec<ContentWorkerReport>) {
    for metrics in reports.into_iter().filter_map(|r| r.metrics) {
        aggregator.absorb(&metrics);
    }
}

/// Puts `metrics` on the queue as a summary, handing them back on failure
fn post_summary(queue: &QueueHandle, metrics: SessionMetrics) -> Option<SessionMetrics> {
    let envelope = QueueEnvelope::Summary(metrics);
    match queue.put(&envelope) {
        Ok(()) => None,
        Err(e) => {
            tracing::error!("Failed to post worker summary: {}", e);
            match envelope {
                QueueEnvelope::Summary(metrics) => Some(metrics),
                QueueEnvelope::JobId(_) => None,
            }
        }
    }
}

async fn listing_worker(ctx: PipelineContext, category: String) -> CategoryRun {
    let (metrics, subcategories, pool_failed) = match ctx.load_pool().await {
        Ok(pool) => {
            let mut stage = ListingStage::new(ctx.clone(), pool);
            let stops = stage.run_category(&category).await;
            (stage.into_metrics(), stops.len(), false)
        }
        Err(e) => {
            tracing::error!("No rotation pool for category {}: {}", category, e);
            (SessionMetrics::new(), 0, true)
        }
    };

    CategoryRun {
        subcategories,
        pool_failed,
        unposted: post_summary(&ctx.queue, metrics),
    }
}

/// Pops job ids until the queue holds nothing but summaries
///
/// Summaries are put straight back. A worker halts once it has seen at
/// least `expected_summaries` summaries in a row and that run covers the
/// whole queue, then forwards its own metrics as one more summary.
async fn content_worker(
    ctx: PipelineContext,
    worker: usize,
    expected_summaries: usize,
) -> ContentWorkerReport {
    let pool = match ctx.load_pool().await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Content worker {} has no rotation pool: {}", worker, e);
            return ContentWorkerReport {
                worker,
                exit: WorkerExit::PoolUnavailable,
                metrics: Some(SessionMetrics::new()),
            };
        }
    };

    let mut stage = ContentStage::new(ctx.clone(), pool);
    let timeout = Duration::from_millis(ctx.crawler.pop_timeout_ms);
    let mut carried = SessionMetrics::new();
    let mut empty_pops = 0;
    let mut summaries_in_a_row = 0usize;

    let exit = loop {
        let popped = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break WorkerExit::Cancelled,
            popped = ctx.queue.pop(timeout) => popped,
        };

        match popped {
            Ok(None) => {
                empty_pops += 1;
                tracing::debug!("Content worker {} found the queue empty ({})", worker, empty_pops);
                if empty_pops >= ctx.crawler.max_empty_pops {
                    break WorkerExit::QueueDrained;
                }
            }
            Ok(Some(QueueEnvelope::JobId(job_id))) => {
                empty_pops = 0;
                summaries_in_a_row = 0;
                if stage.fetch_job(&job_id).await == FetchOutcome::Cancelled {
                    break WorkerExit::Cancelled;
                }
            }
            Ok(Some(QueueEnvelope::Summary(metrics))) => {
                empty_pops = 0;
                summaries_in_a_row += 1;

                if let Some(metrics) = post_summary(&ctx.queue, metrics) {
                    carried.merge(&metrics);
                    break WorkerExit::QueueFailed;
                }

                match ctx.queue.size() {
                    Ok(queued)
                        if summaries_in_a_row >= expected_summaries
                            && summaries_in_a_row as u64 >= queued =>
                    {
                        break WorkerExit::Halted;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("Content worker {} cannot size the queue: {}", worker, e);
                        break WorkerExit::QueueFailed;
                    }
                }

                tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => break WorkerExit::Cancelled,
                    _ = tokio::time::sleep(ctx.policy.backoff) => {}
                }
            }
            Err(e @ QueueError::Decode { .. }) => {
                tracing::warn!("Content worker {} dropped a queue entry: {}", worker, e);
            }
            Err(e) => {
                tracing::error!("Content worker {} lost the queue: {}", worker, e);
                break WorkerExit::QueueFailed;
            }
        }
    };

    let mut metrics = stage.into_metrics();
    metrics.merge(&carried);

    let metrics = if exit == WorkerExit::Halted {
        post_summary(&ctx.queue, metrics)
    } else {
        Some(metrics)
    };

    tracing::info!("Content worker {} stopped: {:?}", worker, exit);
    ContentWorkerReport {
        worker,
        exit,
        metrics,
    }
}

async fn next_job(backlog: &Mutex<VecDeque<String>>) -> Option<String> {
    backlog.lock().await.pop_front()
}

async fn recovery_worker(ctx: PipelineContext, backlog: Arc<Mutex<VecDeque<String>>>) -> SessionMetrics {
    let pool = match ctx.load_pool().await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Recovery worker has no rotation pool: {}", e);
            return SessionMetrics::new();
        }
    };

    let mut stage = ContentStage::new(ctx, pool);
    while let Some(job_id) = next_job(&backlog).await {
        if stage.fetch_job(&job_id).await == FetchOutcome::Cancelled {
            break;
        }
    }
    stage.into_metrics()
}
