//! SQLite-based dataset sink
//!
//! This module provides a sink that appends records to the `records`
//! table of the crawl database. Records are unique per URL and kind, so a
//! record re-emitted after a restart is dropped.

use crate::output::traits::{OutputError, OutputResult, OutputSink};
use crate::output::DatasetRecord;
use crate::storage::{self, SharedStorage};

/// SQLite-based dataset sink
pub struct SqliteOutputSink {
    storage: SharedStorage,
}

impl SqliteOutputSink {
    /// Creates a new SQLite output sink
    ///
    /// # Arguments
    ///
    /// * `storage` - The storage backend to use
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }
}

impl OutputSink for SqliteOutputSink {
    fn push(&self, record: &DatasetRecord) -> OutputResult<()> {
        let body = record.to_json()?;

        let mut storage = storage::lock(&self.storage)
            .map_err(|e| OutputError::Storage(format!("Failed to lock storage: {}", e)))?;

        let inserted = storage
            .insert_record(&record.url, record.kind, &body)
            .map_err(|e| OutputError::Storage(e.to_string()))?;

        if !inserted {
            tracing::debug!(
                "Record for {} ({}) already stored, skipping",
                record.url,
                record.kind.to_db_string()
            );
        }

        Ok(())
    }

    fn flush(&self) -> OutputResult<()> {
        let mut storage = storage::lock(&self.storage)
            .map_err(|e| OutputError::Storage(format!("Failed to lock storage: {}", e)))?;

        storage
            .checkpoint()
            .map_err(|e| OutputError::Storage(e.to_string()))
    }
}
