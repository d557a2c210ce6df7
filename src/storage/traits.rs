//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::{CrawlRequest, RequestLabel, RequestState};
use crate::storage::{RecordKind, RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Request not found: {0}")]
    RequestNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines every durable operation the crawler needs. Each call
/// is written through immediately, so the state survives a crash at any
/// point between calls.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new crawl run and returns its ID
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Sets the final status of a run and stamps its finish time
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Request Queue =====

    /// Inserts a request at the back of the queue
    ///
    /// Returns false without changing anything if the URL was seen before.
    fn insert_request(&mut self, request: &CrawlRequest) -> StorageResult<bool>;

    /// Moves a request to the back of the queue as pending, storing its
    /// retry count and error history
    fn requeue_request(&mut self, request: &CrawlRequest) -> StorageResult<()>;

    /// Puts a request back at the front of the queue as pending
    fn release_request(&mut self, url: &str) -> StorageResult<()>;

    /// Sets the state of a request, persisting its retry bookkeeping
    fn set_request_state(
        &mut self,
        request: &CrawlRequest,
        state: RequestState,
    ) -> StorageResult<()>;

    /// Returns every in-flight request to pending, keeping queue positions
    ///
    /// Returns the number of requests released.
    fn release_in_flight(&mut self) -> StorageResult<usize>;

    /// Loads every URL ever enqueued
    fn load_seen(&self) -> StorageResult<Vec<String>>;

    /// Loads pending and in-flight requests in queue order
    fn load_pending(&self) -> StorageResult<Vec<CrawlRequest>>;

    /// Gets a single request by URL
    fn get_request(&self, url: &str) -> StorageResult<Option<(CrawlRequest, RequestState)>>;

    /// Counts requests in a state
    fn count_requests_by_state(&self, state: RequestState) -> StorageResult<u64>;

    /// Counts requests carrying a label, regardless of state
    fn count_requests_by_label(&self, label: RequestLabel) -> StorageResult<u64>;

    // ===== Quota =====

    /// Loads the persisted quota snapshot
    fn load_quota(&self) -> StorageResult<Option<u64>>;

    /// Persists the quota snapshot
    fn save_quota(&mut self, scheduled: u64) -> StorageResult<()>;

    // ===== Dataset =====

    /// Appends a dataset record
    ///
    /// Returns false if a record of the same kind already exists for the URL.
    fn insert_record(&mut self, url: &str, kind: RecordKind, body: &str) -> StorageResult<bool>;

    /// Counts dataset records of a kind
    fn count_records(&self, kind: RecordKind) -> StorageResult<u64>;

    /// Loads dataset record bodies of a kind in insertion order
    fn load_records(&self, kind: RecordKind) -> StorageResult<Vec<String>>;

    // ===== Maintenance =====

    /// Flushes the write-ahead log into the main database file
    fn checkpoint(&mut self) -> StorageResult<()>;

    /// Deletes all queue, quota and dataset state
    fn clear_crawl_state(&mut self) -> StorageResult<()>;
}
