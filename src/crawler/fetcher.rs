//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the harvester, including:
//! - Building one HTTP client per proxy endpoint, cached up to a bound
//! - Sending the rotating user agent with every request
//! - Leaving redirects to the caller
//! - Classifying transport failures into a `FailureKind`

use crate::rotation::{Identity, ProxyEndpoint};
use crate::state::FailureKind;
use async_trait::async_trait;
use reqwest::{header::USER_AGENT, redirect::Policy, Client, Proxy};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

/// Any HTTP response, whatever its status
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    pub final_url: String,
}

impl RawResponse {
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// 404 or 410: the page is gone for good
    pub fn is_gone(&self) -> bool {
        matches!(self.status, 404 | 410)
    }
}

/// A request that produced no HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TransportFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure: {}", self.kind, self.message)
    }
}

/// Issues one GET request with a given identity
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, identity: &Identity) -> Result<RawResponse, TransportFailure>;
}

/// Builds an HTTP client routed through `proxy`
///
/// Redirects are never followed; the caller counts them.
pub fn build_http_client(proxy: &ProxyEndpoint) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true);

    builder = match proxy.proxy_url() {
        Some(proxy_url) => builder.proxy(Proxy::all(proxy_url)?),
        // Ignore HTTP_PROXY and friends for direct routes
        None => builder.no_proxy(),
    };

    builder.build()
}

/// Clients kept by an `HttpFetcher` unless told otherwise
const DEFAULT_CLIENT_CACHE: usize = 64;

struct CachedClient {
    client: Client,
    last_used: u64,
}

/// Per-proxy clients, least recently used evicted past `capacity`
struct ClientCache {
    entries: HashMap<ProxyEndpoint, CachedClient>,
    capacity: usize,
    tick: u64,
}

impl ClientCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            tick: 0,
        }
    }

    fn get_or_build(&mut self, proxy: &ProxyEndpoint) -> Result<Client, reqwest::Error> {
        self.tick += 1;
        let tick = self.tick;

        if let Some(entry) = self.entries.get_mut(proxy) {
            entry.last_used = tick;
            return Ok(entry.client.clone());
        }

        let client = build_http_client(proxy)?;
        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(
            proxy.clone(),
            CachedClient {
                client: client.clone(),
                last_used: tick,
            },
        );
        Ok(client)
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(proxy, _)| proxy.clone());

        if let Some(proxy) = oldest {
            self.entries.remove(&proxy);
        }
    }
}

/// reqwest-backed fetcher with a bounded client cache keyed by proxy
///
/// Proxy refreshes bring in new endpoints over a long run; clients for
/// endpoints that fell out of the pool age out of the cache.
pub struct HttpFetcher {
    clients: Mutex<ClientCache>,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CLIENT_CACHE)
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fetcher holding at most `capacity` clients (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            clients: Mutex::new(ClientCache::new(capacity)),
        }
    }

    fn client_for(&self, proxy: &ProxyEndpoint) -> Result<Client, TransportFailure> {
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| TransportFailure::new(FailureKind::Unknown, "client cache poisoned"))?;

        clients
            .get_or_build(proxy)
            .map_err(|e| TransportFailure::new(classify_error(&e, !proxy.is_direct()), e.to_string()))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, identity: &Identity) -> Result<RawResponse, TransportFailure> {
        let client = self.client_for(&identity.proxy)?;
        let proxied = !identity.proxy.is_direct();

        let response = client
            .get(url)
            .header(USER_AGENT, identity.user_agent.as_str())
            .send()
            .await
            .map_err(|e| TransportFailure::new(classify_error(&e, proxied), describe(&e)))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| TransportFailure::new(classify_error(&e, proxied), describe(&e)))?;

        Ok(RawResponse {
            status,
            body,
            final_url,
        })
    }
}

/// Maps a reqwest error onto a failure kind
///
/// # Classification
///
/// | Condition | Kind |
/// |-----------|------|
/// | TLS / certificate error anywhere in the chain | `Ssl` |
/// | Connect error or "proxy" in the chain while proxied | `Proxy` |
/// | Connect error | `Connection` |
/// | Client could not be built | `Unknown` |
/// | Anything else (timeouts, bodies, decoding) | `Request` |
pub fn classify_error(error: &reqwest::Error, proxied: bool) -> FailureKind {
    let chain = describe(error).to_lowercase();

    if chain.contains("certificate") || chain.contains("tls") || chain.contains("ssl") {
        FailureKind::Ssl
    } else if proxied && (error.is_connect() || chain.contains("proxy")) {
        FailureKind::Proxy
    } else if error.is_connect() {
        FailureKind::Connection
    } else if error.is_builder() {
        FailureKind::Unknown
    } else {
        FailureKind::Request
    }
}

/// The error and all of its sources, joined
fn describe(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_direct_and_proxied_clients() {
        assert!(build_http_client(&ProxyEndpoint::Direct).is_ok());
        assert!(build_http_client(&ProxyEndpoint::Http("127.0.0.1:8080".to_string())).is_ok());
    }

    #[test]
    fn test_client_cache_reuses_clients() {
        let fetcher = HttpFetcher::new();
        let proxy = ProxyEndpoint::Http("127.0.0.1:8080".to_string());
        fetcher.client_for(&proxy).unwrap();
        fetcher.client_for(&proxy).unwrap();
        fetcher.client_for(&ProxyEndpoint::Direct).unwrap();
        assert_eq!(fetcher.clients.lock().unwrap().entries.len(), 2);
    }

    #[test]
    fn test_client_cache_stays_bounded_across_refreshes() {
        let fetcher = HttpFetcher::with_capacity(50);

        // Ten refreshes, each bringing fifty new endpoints
        for refresh in 0..10 {
            for i in 0..50 {
                let proxy = ProxyEndpoint::Http(format!("10.{}.0.{}:8080", refresh, i));
                fetcher.client_for(&proxy).unwrap();
            }
        }

        let clients = fetcher.clients.lock().unwrap();
        assert_eq!(clients.entries.len(), 50);
        // The latest set is the one still cached
        for i in 0..50 {
            let proxy = ProxyEndpoint::Http(format!("10.9.0.{}:8080", i));
            assert!(clients.entries.contains_key(&proxy));
        }
    }

    #[test]
    fn test_client_cache_evicts_least_recently_used() {
        let fetcher = HttpFetcher::with_capacity(2);
        let a = ProxyEndpoint::Http("10.0.0.1:80".to_string());
        let b = ProxyEndpoint::Http("10.0.0.2:80".to_string());
        let c = ProxyEndpoint::Http("10.0.0.3:80".to_string());

        fetcher.client_for(&a).unwrap();
        fetcher.client_for(&b).unwrap();
        fetcher.client_for(&a).unwrap();
        fetcher.client_for(&c).unwrap();

        let clients = fetcher.clients.lock().unwrap();
        assert_eq!(clients.entries.len(), 2);
        assert!(clients.entries.contains_key(&a));
        assert!(!clients.entries.contains_key(&b));
        assert!(clients.entries.contains_key(&c));
    }

    #[test]
    fn test_response_status_helpers() {
        let response = |status| RawResponse {
            status,
            body: String::new(),
            final_url: String::new(),
        };
        assert!(response(302).is_redirect());
        assert!(response(410).is_gone());
        assert!(response(200).is_ok());
        assert!(!response(500).is_gone());
    }

    #[tokio::test]
    async fn test_refused_connection_is_classified() {
        // Nothing listens on port 9 of localhost
        let fetcher = HttpFetcher::new();
        let identity = Identity {
            proxy: ProxyEndpoint::Direct,
            user_agent: "test-agent".to_string(),
        };
        let failure = fetcher
            .fetch("http://127.0.0.1:9/", &identity)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::Connection);

        let proxied = Identity {
            proxy: ProxyEndpoint::Http("127.0.0.1:9".to_string()),
            user_agent: "test-agent".to_string(),
        };
        let failure = fetcher
            .fetch("http://example.invalid/", &proxied)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::Proxy);
    }
}
