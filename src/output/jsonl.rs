//! JSON-lines dataset sink
//!
//! Appends one JSON object per line to a file. The file is opened in append
//! mode, so a resumed crawl keeps adding to the same dataset.

use crate::output::traits::{OutputResult, OutputSink};
use crate::output::DatasetRecord;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

/// Sink writing records to a `.jsonl` file
pub struct JsonLinesSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Opens (or creates) the dataset file for appending
    pub fn open(path: &Path) -> OutputResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl OutputSink for JsonLinesSink {
    fn push(&self, record: &DatasetRecord) -> OutputResult<()> {
        let line = record.to_json()?;
        let mut writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        writeln!(writer, "{}", line)?;
        // Each record hits the file before the request is marked handled.
        writer.flush()?;
        Ok(())
    }

    fn flush(&self) -> OutputResult<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        writer.flush()?;
        Ok(())
    }
}
