//! Catalog-Crawler: a bounded, resumable catalog crawl orchestrator
//!
//! This crate walks paginated listing pages of a single catalog site,
//! schedules every product page it finds at most once (bounded by a global
//! item quota), and extracts one structured record per product page.
//! Queue and quota state live in SQLite so a crawl survives restarts.

pub mod config;
pub mod crawler;
pub mod output;
pub mod page;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Catalog-Crawler operations
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Page error: {0}")]
    Page(#[from] page::PageError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crawl control channel closed")]
    ControlClosed,

    #[error("Checkpoint failed: {0}")]
    Checkpoint(String),

    #[error("Crawl worker failed: {0}")]
    Worker(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid output extension: {0}")]
    InvalidExtension(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Catalog-Crawler operations
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlHandle, CrawlReport, Crawler, StopReason};
pub use state::{CrawlRequest, RequestLabel, RequestState};
