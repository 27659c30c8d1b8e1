//! Shared fixtures for unit tests

use crate::config::parse_config;
use crate::crawler::{PageFetcher, PipelineContext, RawResponse, RetryPolicy, TransportFailure};
use crate::extract::SelectorExtractor;
use crate::queue::{MemoryQueue, QueueHandle};
use crate::rotation::{Identity, ProxyEndpoint, ProxySource};
use crate::state::FailureKind;
use crate::storage::SqliteGateway;
use crate::{Config, HarvestError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub(crate) const TEST_CONFIG: &str = r#"
categories = ["Accounting"]

[site]
name = "testjobs"
category-url = "https://jobs.test/category/{category}"
content-url = "https://jobs.test/job/{job_id}"

[crawler]
listing-workers = 2
content-workers = 2
recovery-workers = 2
pop-timeout-ms = 100
backoff-ms = 1

[identity]
user-agents = ["agent-a", "agent-b"]

[storage]
database-path = ":memory:"

[selectors]
subcategory = "a.subcategory"
article = "article.job"
job-id-attr = "data-job-id"
title = "h2"
listing-date = "span.date"
content = ["div.description"]
expired = "div.expired"
zero-results = "div.no-results"
"#;

pub(crate) fn test_config() -> Config {
    parse_config(TEST_CONFIG).unwrap()
}

/// A canned response
pub(crate) fn page(status: u16, body: &str) -> Result<RawResponse, TransportFailure> {
    Ok(RawResponse {
        status,
        body: body.to_string(),
        final_url: String::new(),
    })
}

/// A listing page with one article per `(job_id, age)` pair
pub(crate) fn listing_page(entries: &[(&str, &str)]) -> String {
    let articles: String = entries
        .iter()
        .map(|(id, age)| {
            format!(
                r#"<article class="job" data-job-id="{id}"><h2>Job {id}</h2><span class="date">{age} ago</span></article>"#
            )
        })
        .collect();
    format!("<html><body>{}</body></html>", articles)
}

/// Replays responses in order and records every request
pub(crate) struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<RawResponse, TransportFailure>>>,
    requests: Mutex<Vec<(String, Identity)>>,
}

impl ScriptedFetcher {
    pub(crate) fn new(script: Vec<Result<RawResponse, TransportFailure>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<(String, Identity)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, identity: &Identity) -> Result<RawResponse, TransportFailure> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), identity.clone()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportFailure::new(FailureKind::Unknown, "script exhausted")))
    }
}

/// Answers by URL, 404 for anything unrouted; safe under concurrency
pub(crate) struct RoutedFetcher {
    routes: HashMap<String, RawResponse>,
    hits: AtomicUsize,
}

impl RoutedFetcher {
    pub(crate) fn new(routes: Vec<(String, u16, String)>) -> Self {
        let routes = routes
            .into_iter()
            .map(|(url, status, body)| {
                (
                    url.clone(),
                    RawResponse {
                        status,
                        body,
                        final_url: url,
                    },
                )
            })
            .collect();
        Self {
            routes,
            hits: AtomicUsize::new(0),
        }
    }

    pub(crate) fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for RoutedFetcher {
    async fn fetch(&self, url: &str, _identity: &Identity) -> Result<RawResponse, TransportFailure> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        Ok(self.routes.get(url).cloned().unwrap_or(RawResponse {
            status: 404,
            body: String::new(),
            final_url: url.to_string(),
        }))
    }
}

/// Proxy source that counts fetches and can be told to fail
pub(crate) struct CountingProxySource {
    proxies: Mutex<Vec<ProxyEndpoint>>,
    fail: AtomicBool,
    fetches: AtomicUsize,
}

impl CountingProxySource {
    pub(crate) fn new(proxies: Vec<ProxyEndpoint>) -> Self {
        Self {
            proxies: Mutex::new(proxies),
            fail: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
        }
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_next(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_proxies(&self, proxies: Vec<ProxyEndpoint>) {
        *self.proxies.lock().unwrap() = proxies;
    }
}

#[async_trait]
impl ProxySource for CountingProxySource {
    async fn fetch(&self) -> Result<Vec<ProxyEndpoint>, HarvestError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(HarvestError::ProxySource("source offline".to_string()));
        }
        Ok(self.proxies.lock().unwrap().clone())
    }
}

/// A context over in-memory storage and queue, a single user agent and a
/// 1ms backoff
pub(crate) fn test_context(
    fetcher: Arc<dyn PageFetcher>,
    source: Arc<dyn ProxySource>,
) -> PipelineContext {
    let config = test_config();
    let extractor = SelectorExtractor::from_config(&config.site, &config.selectors).unwrap();
    let queue = QueueHandle::new(
        Arc::new(MemoryQueue::new()),
        config.storage.queue_key_for(&config.site.name),
        Duration::from_millis(5),
    );

    PipelineContext {
        site: config.site.name.clone(),
        policy: RetryPolicy::from_config(&config.crawler),
        crawler: config.crawler,
        fetcher,
        extractor: Arc::new(extractor),
        gateway: Arc::new(SqliteGateway::new_in_memory().unwrap()),
        queue,
        proxy_source: source,
        user_agents: vec!["agent-a".to_string()],
        cancel: CancellationToken::new(),
    }
}
