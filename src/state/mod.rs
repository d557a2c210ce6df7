//! State module for tracking crawl progress
//!
//! This module provides the request-level state shared by the queue, the
//! worker pool and the storage layer.
//!
//! # Components
//!
//! - `RequestLabel`: Routes a request to pagination (listing) or extraction (item)
//! - `RequestState`: Tracks where a request is in its lifecycle (pending, in flight, handled, failed)
//! - `CrawlRequest`: A URL scheduled for processing together with its retry bookkeeping

mod request;
mod request_state;

// Re-export main types
pub use request::CrawlRequest;
pub use request_state::{RequestLabel, RequestState};
