//! Dataset record shapes

use crate::output::{OutputError, OutputResult};
use crate::state::{CrawlRequest, RequestLabel};
use crate::storage::RecordKind;
use serde::Serialize;
use serde_json::{Map, Value};

/// Request bookkeeping attached to every record under `#debug`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub url: String,
    pub label: RequestLabel,
    pub retry_count: u32,
    pub error_messages: Vec<String>,
}

impl From<&CrawlRequest> for DebugInfo {
    fn from(request: &CrawlRequest) -> Self {
        Self {
            url: request.url.clone(),
            label: request.label,
            retry_count: request.retry_count,
            error_messages: request.error_messages.clone(),
        }
    }
}

/// One extracted product
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub title: String,
    pub item_id: String,
    pub brand: Option<String>,
    pub price: String,
    pub description: String,
    pub color: String,
    pub sizes: Vec<String>,
    #[serde(rename = "#debug")]
    pub debug: DebugInfo,
}

/// Emitted once for a request that ran out of retries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    #[serde(rename = "#debug")]
    pub debug: DebugInfo,
}

impl From<&CrawlRequest> for FailureRecord {
    fn from(request: &CrawlRequest) -> Self {
        Self {
            debug: DebugInfo::from(request),
        }
    }
}

/// A record as handed to sinks: its source URL, kind and JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRecord {
    pub url: String,
    pub kind: RecordKind,
    pub body: Map<String, Value>,
}

impl DatasetRecord {
    /// Serializes the body as a single JSON line
    pub fn to_json(&self) -> OutputResult<String> {
        serde_json::to_string(&self.body).map_err(|e| OutputError::Format(e.to_string()))
    }
}

/// Serializes a record into a JSON object
pub(crate) fn to_object<T: Serialize>(record: &T) -> OutputResult<Map<String, Value>> {
    match serde_json::to_value(record).map_err(|e| OutputError::Format(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(OutputError::Format(format!(
            "record serialized to {} instead of an object",
            other
        ))),
    }
}
