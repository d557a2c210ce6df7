//! Crawler module for catalog crawling
//!
//! This module contains the core crawling logic, including:
//! - A deduplicating, persistent request queue
//! - The global item quota
//! - Listing pagination and item extraction
//! - The worker pool and overall crawl coordination

mod control;
mod coordinator;
mod extractor;
mod paginator;
mod pool;
mod queue;
mod quota;

pub use control::{ControlSignal, CrawlHandle};
pub use coordinator::{plan_seeds, Crawler, SeedDecision, SeedSummary};
pub use extractor::{ItemExtractor, ItemScraper, ScrapedFields, SelectorScraper};
pub use paginator::{PaginationOutcome, PaginationSettings, PaginationState, Paginator};
pub use pool::{CrawlReport, CrawlWorkerPool, PoolResources, PoolSettings, StopReason};
pub use queue::RequestQueue;
pub use quota::{QuotaState, QuotaTracker, ScheduleOutcome};

use crate::config::Config;
use crate::page::PageClient;
use crate::storage;
use std::path::Path;
use std::sync::Arc;

/// Runs a complete crawl against the configured database
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the storage layer
/// 2. Resume or create a crawl run
/// 3. Seed the queue from the start URLs
/// 4. Process requests until the queue drains or a limit is hit
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the configuration file, recorded on the run
/// * `client` - Page client used to open every request
/// * `fresh` - Discard persisted crawl state before starting
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Crawl stopped cleanly
/// * `Err(CatalogError)` - Crawl failed
pub async fn crawl(
    config: Config,
    config_hash: &str,
    client: Arc<dyn PageClient>,
    fresh: bool,
) -> crate::Result<CrawlReport> {
    let storage = storage::open_storage(Path::new(&config.output.database_path))?;
    Crawler::new(config, config_hash, storage, client, fresh)?
        .run()
        .await
}
