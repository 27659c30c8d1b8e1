//! Job Harvester: a resumable two-stage job-board crawler
//!
//! This crate discovers job listings from paginated category pages, stores
//! them once per job id, and fetches each job's full description through a
//! durable work queue, rotating proxies and user agents to survive blocking.

pub mod config;
pub mod crawler;
pub mod extract;
pub mod output;
pub mod queue;
pub mod rotation;
pub mod state;
pub mod storage;

#[cfg(test)]
mod testing;

use thiserror::Error;

/// Main error type for Job Harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] queue::QueueError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Proxy source error: {0}")]
    ProxySource(String),

    #[error("Rotation pool error: {0}")]
    Rotation(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),
}

/// Result type alias for Job Harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use output::{SessionMetrics, SessionSummary};
pub use queue::QueueEnvelope;
pub use rotation::RotationPool;
pub use state::{FailureKind, FetchState};
pub use storage::{JobContent, ListingRecord, MISSING_CONTENT};
