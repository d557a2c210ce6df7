//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::{CrawlRequest, RequestLabel, RequestState};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{RecordKind, RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
        Ok(RunRecord {
            id: row.get(0)?,
            started_at: row.get(1)?,
            finished_at: row.get(2)?,
            config_hash: row.get(3)?,
            status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                .unwrap_or(RunStatus::Running),
        })
    }

    /// Maps `url, label, retry_count, error_messages, state` columns
    fn request_from_row(row: &Row<'_>) -> rusqlite::Result<(CrawlRequest, RequestState)> {
        let label: String = row.get(1)?;
        let messages: String = row.get(3)?;
        let state: String = row.get(4)?;

        let request = CrawlRequest {
            url: row.get(0)?,
            label: RequestLabel::from_db_string(&label).unwrap_or(RequestLabel::Listing),
            retry_count: row.get(2)?,
            error_messages: serde_json::from_str(&messages).unwrap_or_default(),
        };

        Ok((
            request,
            RequestState::from_db_string(&state).unwrap_or(RequestState::Pending),
        ))
    }

    fn encode_messages(request: &CrawlRequest) -> StorageResult<String> {
        serde_json::to_string(&request.error_messages)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn ensure_updated(changed: usize, url: &str) -> StorageResult<()> {
        if changed == 0 {
            return Err(StorageError::RequestNotFound(url.to_string()));
        }
        Ok(())
    }
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                Self::run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                Self::run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Request Queue =====

    fn insert_request(&mut self, request: &CrawlRequest) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let messages = Self::encode_messages(request)?;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO requests (url, label, state, retry_count, error_messages, position, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5, (SELECT COALESCE(MAX(position), 0) + 1 FROM requests), ?6)",
            params![
                request.url,
                request.label.to_db_string(),
                RequestState::Pending.to_db_string(),
                request.retry_count,
                messages,
                now
            ],
        )?;
        Ok(inserted == 1)
    }

    fn requeue_request(&mut self, request: &CrawlRequest) -> StorageResult<()> {
        let messages = Self::encode_messages(request)?;
        let changed = self.conn.execute(
            "UPDATE requests
             SET state = ?1, retry_count = ?2, error_messages = ?3,
                 position = (SELECT COALESCE(MAX(position), 0) + 1 FROM requests)
             WHERE url = ?4",
            params![
                RequestState::Pending.to_db_string(),
                request.retry_count,
                messages,
                request.url
            ],
        )?;
        Self::ensure_updated(changed, &request.url)
    }

    fn release_request(&mut self, url: &str) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE requests
             SET state = ?1, position = (SELECT COALESCE(MIN(position), 0) - 1 FROM requests)
             WHERE url = ?2",
            params![RequestState::Pending.to_db_string(), url],
        )?;
        Self::ensure_updated(changed, url)
    }

    fn set_request_state(
        &mut self,
        request: &CrawlRequest,
        state: RequestState,
    ) -> StorageResult<()> {
        let messages = Self::encode_messages(request)?;
        let finished_at = state.is_terminal().then(|| Utc::now().to_rfc3339());
        let changed = self.conn.execute(
            "UPDATE requests
             SET state = ?1, retry_count = ?2, error_messages = ?3, finished_at = ?4
             WHERE url = ?5",
            params![
                state.to_db_string(),
                request.retry_count,
                messages,
                finished_at,
                request.url
            ],
        )?;
        Self::ensure_updated(changed, &request.url)
    }

    fn release_in_flight(&mut self) -> StorageResult<usize> {
        let changed = self.conn.execute(
            "UPDATE requests SET state = ?1 WHERE state = ?2",
            params![
                RequestState::Pending.to_db_string(),
                RequestState::InFlight.to_db_string()
            ],
        )?;
        Ok(changed)
    }

    fn load_seen(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT url FROM requests")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut seen = Vec::new();
        for row in rows {
            seen.push(row?);
        }
        Ok(seen)
    }

    fn load_pending(&self) -> StorageResult<Vec<CrawlRequest>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, label, retry_count, error_messages, state
             FROM requests WHERE state IN (?1, ?2) ORDER BY position ASC",
        )?;
        let rows = stmt.query_map(
            params![
                RequestState::Pending.to_db_string(),
                RequestState::InFlight.to_db_string()
            ],
            Self::request_from_row,
        )?;

        let mut pending = Vec::new();
        for row in rows {
            let (request, _) = row?;
            pending.push(request);
        }
        Ok(pending)
    }

    fn get_request(&self, url: &str) -> StorageResult<Option<(CrawlRequest, RequestState)>> {
        let request = self
            .conn
            .query_row(
                "SELECT url, label, retry_count, error_messages, state FROM requests WHERE url = ?1",
                params![url],
                Self::request_from_row,
            )
            .optional()?;
        Ok(request)
    }

    fn count_requests_by_state(&self, state: RequestState) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM requests WHERE state = ?1",
            params![state.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_requests_by_label(&self, label: RequestLabel) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM requests WHERE label = ?1",
            params![label.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Quota =====

    fn load_quota(&self) -> StorageResult<Option<u64>> {
        let scheduled: Option<i64> = self
            .conn
            .query_row("SELECT scheduled FROM quota WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(scheduled.map(|s| s as u64))
    }

    fn save_quota(&mut self, scheduled: u64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO quota (id, scheduled, updated_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET scheduled = excluded.scheduled, updated_at = excluded.updated_at",
            params![scheduled as i64, now],
        )?;
        Ok(())
    }

    // ===== Dataset =====

    fn insert_record(&mut self, url: &str, kind: RecordKind, body: &str) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO records (url, kind, body, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![url, kind.to_db_string(), body, now],
        )?;
        Ok(inserted == 1)
    }

    fn count_records(&self, kind: RecordKind) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE kind = ?1",
            params![kind.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn load_records(&self, kind: RecordKind) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM records WHERE kind = ?1 ORDER BY id ASC")?;
        let rows = stmt.query_map(params![kind.to_db_string()], |row| row.get::<_, String>(0))?;

        let mut bodies = Vec::new();
        for row in rows {
            bodies.push(row?);
        }
        Ok(bodies)
    }

    // ===== Maintenance =====

    fn checkpoint(&mut self) -> StorageResult<()> {
        // In-memory databases have no WAL; the pragma is then a no-op row.
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
            .optional()?;
        Ok(())
    }

    fn clear_crawl_state(&mut self) -> StorageResult<()> {
        self.conn.execute_batch(
            "
            DELETE FROM requests;
            DELETE FROM quota;
            DELETE FROM records;
        ",
        )?;
        Ok(())
    }
}
