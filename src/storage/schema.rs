//! Database schema definitions
//!
//! This module contains the SQL schema for harvested jobs and session summaries.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per (site, job id); content stays NULL until the job page is fetched
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site TEXT NOT NULL,
    job_id TEXT NOT NULL,
    scraped_at TEXT NOT NULL,
    category TEXT NOT NULL,
    subcategory TEXT NOT NULL,
    info TEXT NOT NULL,
    content TEXT,
    content_at TEXT,
    UNIQUE(site, job_id)
);

CREATE INDEX IF NOT EXISTS idx_jobs_site ON jobs(site);
CREATE INDEX IF NOT EXISTS idx_jobs_content ON jobs(site, content);

-- One row per finished session
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    body TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_site ON sessions(site);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        initialize_schema(&conn).unwrap();
        let result = initialize_schema(&conn);

        assert!(result.is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["jobs", "sessions"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_job_ids_are_unique_per_site() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        let insert = "INSERT INTO jobs (site, job_id, scraped_at, category, subcategory, info) \
                      VALUES (?1, '1', 'now', 'c', 's', '{}')";
        conn.execute(insert, ["seek"]).unwrap();
        conn.execute(insert, ["jora"]).unwrap();
        assert!(conn.execute(insert, ["seek"]).is_err());
    }
}
