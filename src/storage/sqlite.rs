//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Gateway trait.

use crate::output::SessionSummary;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Gateway, StorageError, StorageResult};
use crate::storage::{JobContent, ListingRecord, MISSING_CONTENT, TIMESTAMP_FORMAT};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// How long a writer waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite persistence gateway
///
/// The connection sits behind a mutex so one gateway can be shared by every
/// worker; each trait method holds the lock for exactly one statement.
pub struct SqliteGateway {
    conn: Mutex<Connection>,
}

impl SqliteGateway {
    /// Opens (or creates) the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn count(&self, sql: &str, site: &str) -> StorageResult<u64> {
        let count: i64 = self.conn()?.query_row(sql, params![site], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

impl Gateway for SqliteGateway {
    // ===== Existence Checks =====

    fn exists(&self, site: &str, job_id: &str) -> StorageResult<bool> {
        let found = self
            .conn()?
            .query_row(
                "SELECT 1 FROM jobs WHERE site = ?1 AND job_id = ?2",
                params![site, job_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn content_exists(&self, site: &str, job_id: &str) -> StorageResult<bool> {
        let found = self
            .conn()?
            .query_row(
                "SELECT 1 FROM jobs WHERE site = ?1 AND job_id = ?2 AND content IS NOT NULL",
                params![site, job_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // ===== Idempotent Writes =====

    fn insert_listing(&self, site: &str, record: &ListingRecord) -> StorageResult<bool> {
        let info = serde_json::to_string(&record.attributes)?;
        let inserted = self.conn()?.execute(
            "INSERT OR IGNORE INTO jobs (site, job_id, scraped_at, category, subcategory, info)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                site,
                record.job_id,
                record.scraped_at,
                record.category,
                record.subcategory,
                info
            ],
        )?;
        Ok(inserted == 1)
    }

    fn write_content(
        &self,
        site: &str,
        job_id: &str,
        content: &JobContent,
    ) -> StorageResult<bool> {
        let now = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let updated = self.conn()?.execute(
            "UPDATE jobs SET content = ?1, content_at = ?2
             WHERE site = ?3 AND job_id = ?4 AND content IS NULL",
            params![content.as_db_str(), now, site, job_id],
        )?;
        Ok(updated == 1)
    }

    // ===== Reads =====

    fn get_listing(&self, site: &str, job_id: &str) -> StorageResult<Option<ListingRecord>> {
        let row = self
            .conn()?
            .query_row(
                "SELECT job_id, scraped_at, category, subcategory, info
                 FROM jobs WHERE site = ?1 AND job_id = ?2",
                params![site, job_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((job_id, scraped_at, category, subcategory, info)) => {
                let attributes: BTreeMap<String, String> = serde_json::from_str(&info)?;
                Ok(Some(ListingRecord {
                    job_id,
                    scraped_at,
                    attributes,
                    category,
                    subcategory,
                }))
            }
            None => Ok(None),
        }
    }

    fn get_content(&self, site: &str, job_id: &str) -> StorageResult<Option<JobContent>> {
        let content: Option<Option<String>> = self
            .conn()?
            .query_row(
                "SELECT content FROM jobs WHERE site = ?1 AND job_id = ?2",
                params![site, job_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(content.and_then(JobContent::from_db))
    }

    fn list_missing_content_ids(&self, site: &str) -> StorageResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT job_id FROM jobs WHERE site = ?1 AND content IS NULL ORDER BY id")?;
        let ids = stmt
            .query_map(params![site], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    // ===== Statistics =====

    fn count_total(&self, site: &str) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM jobs WHERE site = ?1", site)
    }

    fn count_null_content(&self, site: &str) -> StorageResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM jobs WHERE site = ?1 AND content IS NULL",
            site,
        )
    }

    fn count_sentinel_content(&self, site: &str) -> StorageResult<u64> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM jobs WHERE site = ?1 AND content = ?2",
            params![site, MISSING_CONTENT],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    // ===== Session Summaries =====

    fn record_session(&self, summary: &SessionSummary) -> StorageResult<i64> {
        let body = serde_json::to_string(summary)?;
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sessions (site, recorded_at, body) VALUES (?1, ?2, ?3)",
            params![summary.site, now, body],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn latest_session(&self, site: &str) -> StorageResult<Option<SessionSummary>> {
        let body: Option<String> = self
            .conn()?
            .query_row(
                "SELECT body FROM sessions WHERE site = ?1 ORDER BY id DESC LIMIT 1",
                params![site],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(job_id: &str) -> ListingRecord {
        let mut record = ListingRecord::new(job_id)
            .with_attribute("title", "Accountant")
            .with_attribute("company", MISSING_CONTENT);
        record.category = "Accounting".to_string();
        record.subcategory = "Payroll".to_string();
        record
    }

    #[test]
    fn test_create_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.db");
        let gateway = SqliteGateway::new(&path).unwrap();
        assert!(path.exists());
        assert_eq!(gateway.count_total("jora").unwrap(), 0);
    }

    #[test]
    fn test_insert_listing_is_idempotent() {
        let gateway = SqliteGateway::new_in_memory().unwrap();

        assert!(gateway.insert_listing("jora", &record("1")).unwrap());
        assert!(!gateway.insert_listing("jora", &record("1")).unwrap());
        assert!(gateway.insert_listing("seek", &record("1")).unwrap());

        assert_eq!(gateway.count_total("jora").unwrap(), 1);
        assert!(gateway.exists("jora", "1").unwrap());
        assert!(!gateway.exists("jora", "2").unwrap());
    }

    #[test]
    fn test_listing_roundtrip() {
        let gateway = SqliteGateway::new_in_memory().unwrap();
        let original = record("7");
        gateway.insert_listing("jora", &original).unwrap();

        let loaded = gateway.get_listing("jora", "7").unwrap().unwrap();
        assert_eq!(loaded, original);
        assert!(gateway.get_listing("jora", "8").unwrap().is_none());
    }

    #[test]
    fn test_content_is_written_once() {
        let gateway = SqliteGateway::new_in_memory().unwrap();
        gateway.insert_listing("jora", &record("1")).unwrap();
        assert!(!gateway.content_exists("jora", "1").unwrap());

        let first = JobContent::Description("<p>first</p>".to_string());
        assert!(gateway.write_content("jora", "1", &first).unwrap());
        assert!(gateway.content_exists("jora", "1").unwrap());

        // Neither a second description nor the sentinel overwrites it
        let second = JobContent::Description("<p>second</p>".to_string());
        assert!(!gateway.write_content("jora", "1", &second).unwrap());
        assert!(!gateway.write_content("jora", "1", &JobContent::Missing).unwrap());

        assert_eq!(gateway.get_content("jora", "1").unwrap(), Some(first));
    }

    #[test]
    fn test_write_content_without_listing() {
        let gateway = SqliteGateway::new_in_memory().unwrap();
        assert!(!gateway
            .write_content("jora", "404", &JobContent::Missing)
            .unwrap());
        assert_eq!(gateway.count_total("jora").unwrap(), 0);
    }

    #[test]
    fn test_counts_and_missing_ids() {
        let gateway = SqliteGateway::new_in_memory().unwrap();
        for id in ["1", "2", "3", "4"] {
            gateway.insert_listing("jora", &record(id)).unwrap();
        }
        gateway
            .write_content("jora", "1", &JobContent::Description("x".to_string()))
            .unwrap();
        gateway
            .write_content("jora", "3", &JobContent::Missing)
            .unwrap();

        assert_eq!(gateway.count_total("jora").unwrap(), 4);
        assert_eq!(gateway.count_null_content("jora").unwrap(), 2);
        assert_eq!(gateway.count_sentinel_content("jora").unwrap(), 1);
        assert_eq!(
            gateway.list_missing_content_ids("jora").unwrap(),
            vec!["2".to_string(), "4".to_string()]
        );
    }
}
