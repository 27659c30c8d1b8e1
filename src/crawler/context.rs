use crate::config::CrawlerConfig;
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::retry::RetryPolicy;
use crate::extract::Extractor;
use crate::queue::QueueHandle;
use crate::rotation::{ProxySource, RotationPool};
use crate::storage::Gateway;
use crate::HarvestError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a stage worker needs, shared by cheap clones
///
/// Collaborators are injected as trait objects so each site pipeline is
/// assembled by composition.
#[derive(Clone)]
pub struct PipelineContext {
    pub site: String,
    pub crawler: CrawlerConfig,
    pub policy: RetryPolicy,
    pub fetcher: Arc<dyn PageFetcher>,
    pub extractor: Arc<dyn Extractor>,
    pub gateway: Arc<dyn Gateway>,
    pub queue: QueueHandle,
    pub proxy_source: Arc<dyn ProxySource>,
    pub user_agents: Vec<String>,
    pub cancel: CancellationToken,
}

impl PipelineContext {
    /// Loads a fresh rotation pool for one worker
    pub async fn load_pool(&self) -> Result<RotationPool, HarvestError> {
        RotationPool::load(self.proxy_source.clone(), self.user_agents.clone()).await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
