//! Storage module for persisting crawl state
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - The request queue (seen-set and pending order)
//! - The item quota snapshot
//! - The append-only dataset
//! - Run tracking and resumption support

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::CatalogError;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage shared between the queue, the quota tracker and the output sinks
pub type SharedStorage = Arc<Mutex<dyn Storage + Send>>;

/// Initializes or opens a storage database
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(CatalogError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, CatalogError> {
    Ok(SqliteStorage::new(path)?)
}

/// Wraps a storage backend for sharing across workers
pub fn share<S: Storage + Send + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Locks shared storage, mapping poisoning to a storage error
pub fn lock(storage: &SharedStorage) -> StorageResult<MutexGuard<'_, dyn Storage + Send + 'static>> {
    storage.lock().map_err(|_| StorageError::LockPoisoned)
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Kind of dataset record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Extracted item record
    Item,

    /// Debug-only record for a request that exhausted its retries
    Failure,
}

impl RecordKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Failure => "failure",
        }
    }
}
