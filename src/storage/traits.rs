//! Storage traits and error types
//!
//! This module defines the trait interface for the persistence gateway and
//! associated error types.

use crate::output::SessionSummary;
use crate::storage::{JobContent, ListingRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage connection lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for persistence gateway implementations
///
/// All operations are keyed by site so that several job boards can share
/// one store. Implementations must make each single operation atomic and
/// must be safe to share between workers.
pub trait Gateway: Send + Sync {
    // ===== Existence Checks =====

    /// Returns true if a listing for this job id is stored
    fn exists(&self, site: &str, job_id: &str) -> StorageResult<bool>;

    /// Returns true if the job's content column is non-null
    fn content_exists(&self, site: &str, job_id: &str) -> StorageResult<bool>;

    // ===== Idempotent Writes =====

    /// Stores a listing unless one already exists for its job id
    ///
    /// # Returns
    ///
    /// `true` if a row was inserted, `false` if the job id was already known
    fn insert_listing(&self, site: &str, record: &ListingRecord) -> StorageResult<bool>;

    /// Writes the job's content unless non-null content is already stored
    ///
    /// # Returns
    ///
    /// `true` if the content was written, `false` if the row is missing or
    /// already carries content
    fn write_content(&self, site: &str, job_id: &str, content: &JobContent)
        -> StorageResult<bool>;

    // ===== Reads =====

    /// Gets a stored listing
    fn get_listing(&self, site: &str, job_id: &str) -> StorageResult<Option<ListingRecord>>;

    /// Gets stored content; `None` when absent or not yet fetched
    fn get_content(&self, site: &str, job_id: &str) -> StorageResult<Option<JobContent>>;

    /// Job ids whose content has never been written, oldest first
    fn list_missing_content_ids(&self, site: &str) -> StorageResult<Vec<String>>;

    // ===== Statistics =====

    /// Number of listings stored for the site
    fn count_total(&self, site: &str) -> StorageResult<u64>;

    /// Number of listings whose content was never written
    fn count_null_content(&self, site: &str) -> StorageResult<u64>;

    /// Number of listings whose content is the missing sentinel
    fn count_sentinel_content(&self, site: &str) -> StorageResult<u64>;

    // ===== Session Summaries =====

    /// Persists one session summary row, returning its id
    fn record_session(&self, summary: &SessionSummary) -> StorageResult<i64>;

    /// Gets the most recently recorded session summary for the site
    fn latest_session(&self, site: &str) -> StorageResult<Option<SessionSummary>>;
}
