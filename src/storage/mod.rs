//! Storage module: the persistence gateway
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - Idempotent listing inserts keyed by (site, job id)
//! - Write-once job descriptions
//! - Totals used by the session summary
//! - Session summary persistence

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteGateway;
pub use traits::{Gateway, StorageError, StorageResult};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stored in place of a description when the job page exists no more
pub const MISSING_CONTENT: &str = "<missing>";

/// Timestamp format used for scrape and posting times
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Summary attributes of one job discovered on a listing page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub job_id: String,
    pub scraped_at: String,
    pub attributes: BTreeMap<String, String>,
    pub category: String,
    pub subcategory: String,
}

impl ListingRecord {
    /// Creates an untagged record stamped with the current time
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            scraped_at: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
            attributes: BTreeMap::new(),
            category: String::new(),
            subcategory: String::new(),
        }
    }

    /// Sets an attribute, returning the record for chaining
    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Full description of a job, or the marker for "fetched but unavailable"
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobContent {
    Description(String),
    Missing,
}

impl JobContent {
    /// Value written to the content column
    pub fn as_db_str(&self) -> &str {
        match self {
            Self::Description(text) => text,
            Self::Missing => MISSING_CONTENT,
        }
    }

    /// Parses a content column value; `None` means not fetched yet
    pub fn from_db(value: Option<String>) -> Option<Self> {
        value.map(|v| {
            if v == MISSING_CONTENT {
                Self::Missing
            } else {
                Self::Description(v)
            }
        })
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}
