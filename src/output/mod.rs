//! Output module for the crawl dataset
//!
//! This module handles:
//! - Shaping item and failure records
//! - Applying the configured output extension
//! - Appending records to SQLite and JSON-lines sinks
//! - Reporting crawl statistics

mod dataset;
mod extension;
mod jsonl;
mod record;
mod sqlite_output;
pub mod stats;
mod traits;

pub use dataset::Dataset;
pub use extension::FieldMapExtension;
pub use jsonl::JsonLinesSink;
pub use record::{DatasetRecord, DebugInfo, FailureRecord, ItemRecord};
pub use sqlite_output::SqliteOutputSink;
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use traits::{OutputError, OutputExtension, OutputResult, OutputSink};

/// Fields of an item record an extension may omit or rename
pub const ITEM_RECORD_FIELDS: [&str; 7] = [
    "title",
    "itemId",
    "brand",
    "price",
    "description",
    "color",
    "sizes",
];

/// Field holding request bookkeeping on every record
pub const DEBUG_FIELD: &str = "#debug";
