//! Listing stage: category → subcategory → page walk
//!
//! New listings are written through the gateway and their ids enqueued for
//! the content stage. Pagination of a subcategory stops at the first
//! posting outside the day window, on a zero-results page, on an empty
//! page, or after enough consecutive pages of already-known ids.

use crate::crawler::context::PipelineContext;
use crate::crawler::fetcher::RawResponse;
use crate::crawler::retry::{handle_transport_failure, RetryDecision};
use crate::extract::Subcategory;
use crate::output::{Counter, SessionMetrics};
use crate::queue::QueueEnvelope;
use crate::rotation::RotationPool;
use crate::state::FetchAttemptContext;
use std::time::Instant;

/// Listing-page redirects beyond this count also refresh the pool
const REFRESH_AFTER_REDIRECTS: u32 = 2;

/// Why pagination of a subcategory ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubcategoryStop {
    /// A posting older than the day window was reached
    DayLimit,
    /// Too many consecutive pages contained only known ids
    SkippedPages,
    /// The page reported no results
    ZeroResults,
    /// The page had no listing entries
    NoListings,
    /// The page could not be fetched
    PageUnavailable,
    Cancelled,
}

/// Result of fetching one listing or category page
enum PageFetch {
    Page(String),
    Unavailable,
    Cancelled,
}

/// Discovers listings for the categories handed to it
pub struct ListingStage {
    ctx: PipelineContext,
    pool: RotationPool,
    metrics: SessionMetrics,
}

impl ListingStage {
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

    /// Walks every subcategory of one category
    ///
    /// A category page without subcategory links is treated as its own
    /// single subcategory.
    pub async fn run_category(&mut self, category: &str) -> Vec<(Subcategory, SubcategoryStop)> {
        let started = Instant::now();
        let category_url = self.ctx.extractor.category_url(category);
        tracing::info!(category, "Start scraping category");

        let subcategories = match self.fetch_page(&category_url).await {
            PageFetch::Page(body) => {
                let found = self
                    .ctx
                    .extractor
                    .list_subcategories(&body, &category_url);
                if found.is_empty() {
                    vec![Subcategory {
                        name: category.to_string(),
                        url: category_url.clone(),
                    }]
                } else {
                    found
                }
            }
            PageFetch::Unavailable => {
                tracing::warn!(category, url = %category_url, "Category page unavailable");
                Vec::new()
            }
            PageFetch::Cancelled => Vec::new(),
        };

        let mut results = Vec::with_capacity(subcategories.len());
        for subcategory in subcategories {
            if self.ctx.is_cancelled() {
                break;
            }
            let stop = self.run_subcategory(category, &subcategory).await;
            self.metrics.incr(Counter::TotalSubcat);
            results.push((subcategory, stop));
        }

        self.metrics
            .add_duration(Counter::TotalTimeCat, started.elapsed());
        tracing::info!(
            category,
            subcategories = results.len(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Finished category"
        );
        results
    }

    /// Paginates one subcategory until a stop condition is met
    pub async fn run_subcategory(&mut self, category: &str, subcategory: &Subcategory) -> SubcategoryStop {
        let started = Instant::now();
        let crawler = self.ctx.crawler.clone();
        let mut page_number = 1;
        let mut skipped_pages = 0;

        tracing::debug!(category, subcategory = %subcategory.name, "Start scraping subcategory");

        let stop = 'pages: loop {
            if self.ctx.is_cancelled() {
                break SubcategoryStop::Cancelled;
            }

            let url = match self
                .ctx
                .extractor
                .listing_page_url(&subcategory.url, page_number)
            {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(url = %subcategory.url, "Invalid subcategory URL: {}", e);
                    break SubcategoryStop::PageUnavailable;
                }
            };

            let body = match self.fetch_page(&url).await {
                PageFetch::Page(body) => body,
                PageFetch::Unavailable => break SubcategoryStop::PageUnavailable,
                PageFetch::Cancelled => break SubcategoryStop::Cancelled,
            };

            if self.ctx.extractor.is_zero_results(&body) {
                break SubcategoryStop::ZeroResults;
            }

            let entries = self.ctx.extractor.listing_entries(&body);
            if entries.is_empty() {
                break SubcategoryStop::NoListings;
            }

            let mut seen = 0;
            let mut page_skipped = false;

            for entry in &entries {
                let entry_started = Instant::now();

                let select_started = Instant::now();
                let exists = self.ctx.gateway.exists(&self.ctx.site, &entry.job_id);
                self.metrics
                    .add_duration(Counter::TotalTimeSelect, select_started.elapsed());

                match exists {
                    Ok(true) => {
                        seen += 1;
                        if seen > crawler.seen_per_page_threshold {
                            page_skipped = true;
                            break;
                        }
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(job_id = %entry.job_id, "Existence check failed: {}", e);
                        self.metrics.incr(Counter::StoreErrors);
                        continue;
                    }
                }

                let extraction = self.ctx.extractor.extract_listing(entry, crawler.day_limit);
                if !extraction.within_day_limit {
                    tracing::info!(
                        subcategory = %subcategory.name,
                        page = page_number,
                        "Reached listings older than the day limit"
                    );
                    break 'pages SubcategoryStop::DayLimit;
                }
                let Some(mut record) = extraction.record else {
                    continue;
                };
                record.category = category.to_string();
                record.subcategory = subcategory.name.clone();

                let insert_started = Instant::now();
                let inserted = self.ctx.gateway.insert_listing(&self.ctx.site, &record);
                self.metrics
                    .add_duration(Counter::TotalTimeInsert, insert_started.elapsed());

                match inserted {
                    Ok(true) => {
                        if let Err(e) = self.ctx.queue.put(&QueueEnvelope::JobId(record.job_id.clone())) {
                            // The row keeps NULL content, so a recovery run still finds it
                            tracing::warn!(job_id = %record.job_id, "Failed to enqueue job: {}", e);
                            self.metrics.incr(Counter::StoreErrors);
                        }
                        self.metrics.incr(Counter::JobsListed);
                        self.metrics
                            .add_duration(Counter::TotalTimeInfo, entry_started.elapsed());
                        tracing::debug!(
                            job_id = %record.job_id,
                            title = record.attribute("title").unwrap_or_default(),
                            "Stored listing"
                        );
                    }
                    // Another worker stored it between the check and the insert
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(job_id = %record.job_id, "Failed to store listing: {}", e);
                        self.metrics.incr(Counter::StoreErrors);
                    }
                }
            }

            if page_skipped {
                self.metrics.incr(Counter::PagesSkipped);
                skipped_pages += 1;
                tracing::debug!(page = page_number, skipped_pages, "Page of known listings");
                if skipped_pages >= crawler.max_skipped_pages {
                    break SubcategoryStop::SkippedPages;
                }
            } else {
                skipped_pages = 0;
            }

            page_number += 1;
        };

        self.metrics
            .add_duration(Counter::TotalTimeSubcat, started.elapsed());
        tracing::debug!(subcategory = %subcategory.name, ?stop, pages = page_number, "Finished subcategory");
        stop
    }

    /// Fetches a listing or category page, retrying transport failures
    ///
    /// Redirects rotate the identity; past two redirects the pool is
    /// refreshed instead (falling back to a rotation when the refresh keeps
    /// the old set), and past `listing_max_redirects` the page is abandoned.
    async fn fetch_page(&mut self, url: &str) -> PageFetch {
        let mut attempt = FetchAttemptContext::new();

        loop {
            if self.ctx.is_cancelled() {
                return PageFetch::Cancelled;
            }

            let identity = self.pool.current();
            let result = tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => return PageFetch::Cancelled,
                result = self.ctx.fetcher.fetch(url, &identity) => result,
            };

            match result {
                Ok(RawResponse { status, body, .. }) => {
                    attempt.clear_transport_failures();

                    if (300..400).contains(&status) {
                        let redirects = attempt.record_redirect();
                        tracing::debug!(url, status, redirects, "Listing page redirected");
                        if redirects > self.ctx.policy.listing_max_redirects {
                            return PageFetch::Unavailable;
                        }
                        let refreshed =
                            redirects > REFRESH_AFTER_REDIRECTS && self.pool.refresh().await;
                        if !refreshed {
                            self.pool.advance();
                        }
                        continue;
                    }

                    if status == 200 {
                        return PageFetch::Page(body);
                    }

                    tracing::debug!(url, status, "Listing page unavailable");
                    return PageFetch::Unavailable;
                }
                Err(failure) => {
                    tracing::debug!(url, proxy = %identity.proxy, "{}", failure);
                    let decision = handle_transport_failure(
                        &failure,
                        &mut attempt,
                        &mut self.pool,
                        &self.ctx.policy,
                        &mut self.metrics,
                        &self.ctx.cancel,
                    )
                    .await;

                    match decision {
                        RetryDecision::Retry => {}
                        RetryDecision::GiveUp => return PageFetch::Unavailable,
                        RetryDecision::Cancelled => return PageFetch::Cancelled,
                    }
                }
            }
        }
    }
}
