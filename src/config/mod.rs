//! Configuration module for Catalog-Crawler
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use catalog_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawl.toml")).unwrap();
//! println!("Crawler will use {} workers", config.crawler.max_concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BrowserConfig, Config, CrawlerConfig, ExtendOutputConfig, InputConfig, OutputConfig,
    SelectorConfig, SiteConfig, StartUrl,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
pub(crate) use validation::validate_extend_output;
