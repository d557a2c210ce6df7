use crate::state::RequestLabel;

/// A URL scheduled for processing
///
/// The URL is the identity key: the queue records it in its seen-set the
/// first time it is enqueued and ignores it afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRequest {
    /// Absolute URL of the page
    pub url: String,

    /// Routes the request to the paginator or the item extractor
    pub label: RequestLabel,

    /// Attempts already made and failed
    pub retry_count: u32,

    /// One message per failed attempt, oldest first
    pub error_messages: Vec<String>,
}

impl CrawlRequest {
    /// Creates a fresh request with no attempts recorded
    pub fn new(url: impl Into<String>, label: RequestLabel) -> Self {
        Self {
            url: url.into(),
            label,
            retry_count: 0,
            error_messages: Vec::new(),
        }
    }

    /// Returns a copy scheduled for another attempt after `error`
    pub fn next_attempt(&self, error: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.retry_count += 1;
        next.error_messages.push(error.into());
        next
    }

    /// Returns a copy with `error` appended to the history, keeping the
    /// retry count (used when a request is given up on)
    pub fn with_error(&self, error: impl Into<String>) -> Self {
        let mut failed = self.clone();
        failed.error_messages.push(error.into());
        failed
    }
}
