//! Output sink traits and error types
//!
//! This module defines the trait interface for dataset sinks and record
//! extensions.

use crate::output::DatasetRecord;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to format output: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Output extension failed: {0}")]
    Extension(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Append-only destination for dataset records
///
/// Sinks are shared by every worker, so implementations must be
/// thread-safe. A sink may see the same record twice after a restart.
pub trait OutputSink: Send + Sync {
    /// Appends a record
    ///
    /// # Arguments
    ///
    /// * `record` - The record to append, already shaped for output
    fn push(&self, record: &DatasetRecord) -> OutputResult<()>;

    /// Flushes buffered records
    fn flush(&self) -> OutputResult<()> {
        Ok(())
    }
}

/// Transforms an item record before it is emitted
///
/// Extensions see the record as a JSON object. The `#debug` field is
/// restored after the extension runs, so it cannot be altered.
pub trait OutputExtension: Send + Sync {
    fn extend(&self, record: Map<String, Value>) -> OutputResult<Map<String, Value>>;
}

impl<F> OutputExtension for F
where
    F: Fn(Map<String, Value>) -> OutputResult<Map<String, Value>> + Send + Sync,
{
    fn extend(&self, record: Map<String, Value>) -> OutputResult<Map<String, Value>> {
        self(record)
    }
}
