//! SQLite-backed durable work queue
//!
//! Entries survive process restarts and can be shared by several processes
//! pointing at the same database file.

use crate::queue::{QueueError, QueueResult, WorkQueue};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const QUEUE_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS queue_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    queue_key TEXT NOT NULL,
    payload TEXT NOT NULL,
    enqueued_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_queue_entries_key ON queue_entries(queue_key, id);
"#;

/// Durable queue stored in a SQLite table
pub struct SqliteQueue {
    conn: Mutex<Connection>,
}

impl SqliteQueue {
    /// Opens (or creates) the queue table in the database at `path`
    pub fn new(path: &Path) -> QueueResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(QUEUE_SCHEMA_SQL)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory queue
    pub fn new_in_memory() -> QueueResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(QUEUE_SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> QueueResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| QueueError::LockPoisoned)
    }
}

impl WorkQueue for SqliteQueue {
    fn push(&self, key: &str, payload: &str) -> QueueResult<()> {
        self.conn()?.execute(
            "INSERT INTO queue_entries (queue_key, payload, enqueued_at) VALUES (?1, ?2, ?3)",
            params![key, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn try_pop(&self, key: &str) -> QueueResult<Option<String>> {
        let mut conn = self.conn()?;
        // Immediate transaction so two processes never pop the same head
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let head: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, payload FROM queue_entries WHERE queue_key = ?1 ORDER BY id LIMIT 1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((id, _)) = &head {
            tx.execute("DELETE FROM queue_entries WHERE id = ?1", params![id])?;
        }
        tx.commit()?;

        Ok(head.map(|(_, payload)| payload))
    }

    fn len(&self, key: &str) -> QueueResult<u64> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM queue_entries WHERE queue_key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fifo_per_key() {
        let queue = SqliteQueue::new_in_memory().unwrap();
        queue.push("jora", "1").unwrap();
        queue.push("seek", "x").unwrap();
        queue.push("jora", "2").unwrap();

        assert_eq!(queue.len("jora").unwrap(), 2);
        assert_eq!(queue.try_pop("jora").unwrap(), Some("1".to_string()));
        assert_eq!(queue.try_pop("jora").unwrap(), Some("2".to_string()));
        assert_eq!(queue.try_pop("jora").unwrap(), None);
        assert_eq!(queue.len("seek").unwrap(), 1);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.db");

        {
            let queue = SqliteQueue::new(&path).unwrap();
            queue.push("jora", r#"{"kind":"job_id","value":"7"}"#).unwrap();
        }

        let reopened = SqliteQueue::new(&path).unwrap();
        assert_eq!(
            reopened.try_pop("jora").unwrap(),
            Some(r#"{"kind":"job_id","value":"7"}"#.to_string())
        );
    }

    #[test]
    fn test_two_connections_share_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.db");
        let a = SqliteQueue::new(&path).unwrap();
        let b = SqliteQueue::new(&path).unwrap();

        a.push("jora", "1").unwrap();
        a.push("jora", "2").unwrap();

        assert_eq!(b.try_pop("jora").unwrap(), Some("1".to_string()));
        assert_eq!(a.try_pop("jora").unwrap(), Some("2".to_string()));
        assert_eq!(b.len("jora").unwrap(), 0);
    }
}
