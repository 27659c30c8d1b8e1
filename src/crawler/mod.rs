//! Crawler module for listing discovery and content fetching
//!
//! This module contains the harvesting logic, including:
//! - HTTP fetching through rotating proxies and user agents
//! - Transport failure handling with backoff and pool refreshes
//! - The listing stage (category → subcategory → page walk)
//! - The content stage (one fetch state machine run per job)
//! - Worker pools and their termination protocol

mod content;
mod context;
mod coordinator;
mod fetcher;
mod listing;
mod retry;

pub use content::{ContentStage, FetchOutcome, GiveUpReason, SavedAs};
pub use context::PipelineContext;
pub use coordinator::{ContentWorkerReport, Coordinator, ListingReport, WorkerExit};
pub use fetcher::{
    build_http_client, classify_error, HttpFetcher, PageFetcher, RawResponse, TransportFailure,
};
pub use listing::{ListingStage, SubcategoryStop};
pub use retry::{handle_transport_failure, RetryDecision, RetryPolicy};

use crate::config::Config;
use crate::output::SessionSummary;
use crate::HarvestError;

/// Runs a complete harvest: listing stage, content stage, session record
///
/// # Arguments
///
/// * `config` - The harvester configuration
/// * `config_hash` - Hash of the config file, stored with the session
///
/// # Returns
///
/// * `Ok(SessionSummary)` - The persisted session
/// * `Err(HarvestError)` - Storage or queue could not be opened or written
pub async fn harvest(config: Config, config_hash: String) -> Result<SessionSummary, HarvestError> {
    Coordinator::new(config, config_hash)?.run().await
}
