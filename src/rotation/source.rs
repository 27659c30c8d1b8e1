//! Proxy list sources
//!
//! A source returns the current list of proxy endpoints on demand. Lists are
//! plain text, one `host:port` per line; blank lines and `#` comments are
//! ignored.

use crate::config::IdentityConfig;
use crate::HarvestError;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// One outbound network route
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProxyEndpoint {
    /// No proxy; connect to the site directly
    Direct,

    /// HTTP proxy at `host:port`
    Http(String),
}

impl ProxyEndpoint {
    /// Proxy URL suitable for `reqwest::Proxy::all`
    pub fn proxy_url(&self) -> Option<String> {
        match self {
            Self::Direct => None,
            Self::Http(addr) => Some(format!("http://{}", addr)),
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Self::Direct)
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Http(addr) => write!(f, "{}", addr),
        }
    }
}

/// Supplier of proxy endpoints
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Downloads or reads the current endpoint list
    async fn fetch(&self) -> Result<Vec<ProxyEndpoint>, HarvestError>;
}

/// Source that always yields a single direct route
#[derive(Debug, Default)]
pub struct DirectSource;

#[async_trait]
impl ProxySource for DirectSource {
    async fn fetch(&self) -> Result<Vec<ProxyEndpoint>, HarvestError> {
        Ok(vec![ProxyEndpoint::Direct])
    }
}

/// Source backed by a local text file, re-read on every fetch
#[derive(Debug)]
pub struct FileProxySource {
    path: PathBuf,
}

impl FileProxySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ProxySource for FileProxySource {
    async fn fetch(&self) -> Result<Vec<ProxyEndpoint>, HarvestError> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        Ok(parse_proxy_list(&text))
    }
}

/// Source backed by a remote plain-text list
pub struct HttpProxySource {
    client: reqwest::Client,
    url: String,
}

impl HttpProxySource {
    pub fn new(url: impl Into<String>) -> Result<Self, HarvestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ProxySource for HttpProxySource {
    async fn fetch(&self) -> Result<Vec<ProxyEndpoint>, HarvestError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| HarvestError::Http {
                url: self.url.clone(),
                source: e,
            })?;

        if !response.status().is_success() {
            return Err(HarvestError::ProxySource(format!(
                "{} returned {}",
                self.url,
                response.status()
            )));
        }

        let text = response.text().await?;
        Ok(parse_proxy_list(&text))
    }
}

/// Builds the source selected by the identity configuration
pub fn source_from_config(identity: &IdentityConfig) -> Result<Arc<dyn ProxySource>, HarvestError> {
    if let Some(url) = &identity.proxy_list_url {
        return Ok(Arc::new(HttpProxySource::new(url)?));
    }
    if let Some(path) = &identity.proxy_file {
        return Ok(Arc::new(FileProxySource::new(path)));
    }
    Ok(Arc::new(DirectSource))
}

/// Parses a `host:port` list, skipping malformed lines
pub fn parse_proxy_list(text: &str) -> Vec<ProxyEndpoint> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let addr = line
                .strip_prefix("http://")
                .unwrap_or(line)
                .trim_end_matches('/');
            match addr.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                    Some(ProxyEndpoint::Http(addr.to_string()))
                }
                _ => {
                    warn!(line, "Skipping malformed proxy entry");
                    None
                }
            }
        })
        .collect()
}
