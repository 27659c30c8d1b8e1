use crate::rotation::{ProxyEndpoint, ProxySource};
use crate::HarvestError;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outbound identity used for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub proxy: ProxyEndpoint,
    pub user_agent: String,
}

/// Cyclic set of proxies and user agents owned by one worker
///
/// The proxy set is never empty after a successful [`RotationPool::load`];
/// a failed [`RotationPool::refresh`] keeps the previous set in place.
pub struct RotationPool {
    source: Arc<dyn ProxySource>,
    proxies: Vec<ProxyEndpoint>,
    proxy_cursor: usize,
    user_agents: Vec<String>,
    agent_cursor: usize,
    refreshes: u64,
}

impl std::fmt::Debug for RotationPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationPool")
            .field("proxies", &self.proxies.len())
            .field("proxy_cursor", &self.proxy_cursor)
            .field("user_agents", &self.user_agents.len())
            .field("refreshes", &self.refreshes)
            .finish()
    }
}

impl RotationPool {
    /// Loads the initial proxy set from `source`
    ///
    /// # Errors
    ///
    /// Fails when the source cannot be read, returns no endpoints, or
    /// `user_agents` is empty.
    pub async fn load(
        source: Arc<dyn ProxySource>,
        user_agents: Vec<String>,
    ) -> Result<Self, HarvestError> {
        if user_agents.is_empty() {
            return Err(HarvestError::Rotation(
                "at least one user agent is required".to_string(),
            ));
        }

        let proxies = source.fetch().await?;
        if proxies.is_empty() {
            return Err(HarvestError::Rotation(
                "proxy source returned no endpoints".to_string(),
            ));
        }

        info!(proxies = proxies.len(), "Loaded rotation pool");

        Ok(Self {
            source,
            proxies,
            proxy_cursor: 0,
            user_agents,
            agent_cursor: 0,
            refreshes: 0,
        })
    }

    /// Identity at the cursor
    pub fn current(&self) -> Identity {
        Identity {
            proxy: self.proxies[self.proxy_cursor].clone(),
            user_agent: self.user_agents[self.agent_cursor].clone(),
        }
    }

    /// Moves to the next proxy and user agent, wrapping at the end
    pub fn advance(&mut self) {
        self.proxy_cursor = (self.proxy_cursor + 1) % self.proxies.len();
        self.agent_cursor = (self.agent_cursor + 1) % self.user_agents.len();
    }

    /// Re-reads the proxy list and restarts both cursors
    ///
    /// Returns `false` when the source failed or returned nothing; the pool
    /// then keeps its previous set and cursor.
    pub async fn refresh(&mut self) -> bool {
        self.refreshes += 1;

        match self.source.fetch().await {
            Ok(proxies) if !proxies.is_empty() => {
                debug!(proxies = proxies.len(), "Refreshed rotation pool");
                self.proxies = proxies;
                self.proxy_cursor = 0;
                self.agent_cursor = 0;
                true
            }
            Ok(_) => {
                warn!("Proxy source returned no endpoints; keeping previous set");
                false
            }
            Err(e) => {
                warn!(error = %e, "Proxy refresh failed; keeping previous set");
                false
            }
        }
    }

    /// Number of proxies in the current set
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// How many refreshes were attempted, successful or not
    pub fn refresh_count(&self) -> u64 {
        self.refreshes
    }
}
