//! The crawl's dataset: shapes records and fans them out to every sink

use crate::output::record::to_object;
use crate::output::{
    DatasetRecord, FailureRecord, ItemRecord, OutputExtension, OutputResult, OutputSink,
    DEBUG_FIELD,
};
use crate::storage::RecordKind;
use std::sync::atomic::{AtomicU64, Ordering};

/// Append-only dataset shared by all workers
#[derive(Default)]
pub struct Dataset {
    sinks: Vec<Box<dyn OutputSink>>,
    extension: Option<Box<dyn OutputExtension>>,
    emitted: AtomicU64,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a destination for records
    pub fn with_sink(mut self, sink: impl OutputSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Replaces the item record transform
    pub fn set_extension(&mut self, extension: Box<dyn OutputExtension>) {
        self.extension = Some(extension);
    }

    /// Emits an item record, applying the extension first
    pub fn push_item(&self, record: &ItemRecord) -> OutputResult<()> {
        let mut body = to_object(record)?;
        let debug = body.remove(DEBUG_FIELD);

        if let Some(extension) = &self.extension {
            body = extension.extend(body)?;
        }

        // The extension never sees or shapes request bookkeeping
        body.remove(DEBUG_FIELD);
        if let Some(debug) = debug {
            body.insert(DEBUG_FIELD.to_string(), debug);
        }

        self.push(DatasetRecord {
            url: record.debug.url.clone(),
            kind: RecordKind::Item,
            body,
        })
    }

    /// Emits a failure record
    pub fn push_failure(&self, record: &FailureRecord) -> OutputResult<()> {
        self.push(DatasetRecord {
            url: record.debug.url.clone(),
            kind: RecordKind::Failure,
            body: to_object(record)?,
        })
    }

    fn push(&self, record: DatasetRecord) -> OutputResult<()> {
        for sink in &self.sinks {
            sink.push(&record)?;
        }
        self.emitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Number of records emitted by this process
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::SeqCst)
    }

    pub fn flush(&self) -> OutputResult<()> {
        for sink in &self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}
