//! Crawl coordinator
//!
//! This module wires the crawl together:
//! - Opening or resuming a crawl run
//! - Restoring the request queue and the item quota from storage
//! - Seeding the queue from the configured start URLs
//! - Running the worker pool and recording how the run ended

use crate::config::Config;
use crate::crawler::control::{ControlSignal, CrawlHandle};
use crate::crawler::{
    CrawlReport, CrawlWorkerPool, ItemExtractor, ItemScraper, PaginationSettings, PoolResources,
    PoolSettings, QuotaTracker, RequestQueue, ScheduleOutcome, SelectorScraper, StopReason,
};
use crate::output::{
    Dataset, FieldMapExtension, JsonLinesSink, OutputExtension, SqliteOutputSink,
};
use crate::page::PageClient;
use crate::state::{CrawlRequest, RequestLabel};
use crate::storage::{self, RunStatus, SharedStorage, Storage};
use crate::url::{infer_label, is_supported_url, normalize_url};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

/// What seeding does with one start URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedDecision {
    /// Enqueued with this label (items are subject to the quota)
    Accept(CrawlRequest),

    /// Outside the catalog site; ignored
    Rejected { url: String },
}

/// Counts from seeding the queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub listings: usize,
    pub items: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub quota_reached: bool,
}

/// Decides, without touching storage, how each start URL would be seeded
///
/// # Returns
///
/// * `Ok(Vec<SeedDecision>)` - One decision per start URL, in order
/// * `Err(CatalogError)` - A start URL could not be parsed
pub fn plan_seeds(config: &Config) -> crate::Result<Vec<SeedDecision>> {
    let mut decisions = Vec::with_capacity(config.input.start_urls.len());

    for start in &config.input.start_urls {
        let url = normalize_url(&start.url)?;

        if !is_supported_url(&url, &config.site) {
            decisions.push(SeedDecision::Rejected {
                url: url.to_string(),
            });
            continue;
        }

        let label = start
            .label
            .unwrap_or_else(|| infer_label(&url, &config.site));
        decisions.push(SeedDecision::Accept(CrawlRequest::new(url.as_str(), label)));
    }

    Ok(decisions)
}

/// A configured crawl, ready to seed and run
pub struct Crawler {
    config: Arc<Config>,
    storage: SharedStorage,
    queue: Arc<RequestQueue>,
    quota: Arc<QuotaTracker>,
    dataset: Dataset,
    client: Arc<dyn PageClient>,
    scraper: Arc<dyn ItemScraper>,
    run_id: i64,
    control_tx: mpsc::Sender<ControlSignal>,
    control_rx: mpsc::Receiver<ControlSignal>,
}

impl Crawler {
    /// Creates a crawler over `storage`, resuming any previous state
    ///
    /// # Arguments
    ///
    /// * `config` - The validated crawl configuration
    /// * `config_hash` - Hash recorded on the crawl run
    /// * `storage` - Backend holding queue, quota and dataset
    /// * `client` - Page client used to open every request
    /// * `fresh` - Discard all persisted crawl state first
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - State restored and output sinks opened
    /// * `Err(CatalogError)` - Storage, output or extension setup failed
    pub fn new<S: Storage + Send + 'static>(
        config: Config,
        config_hash: &str,
        mut storage: S,
        client: Arc<dyn PageClient>,
        fresh: bool,
    ) -> crate::Result<Self> {
        if fresh {
            tracing::info!("Clearing persisted crawl state");
            storage.clear_crawl_state()?;
        }

        let run_id = match storage.get_latest_run()? {
            Some(run) if !fresh && run.status == RunStatus::Running => {
                if run.config_hash != config_hash {
                    tracing::warn!(
                        "Configuration changed since run {} started (was {}, now {})",
                        run.id,
                        run.config_hash,
                        config_hash
                    );
                }
                tracing::info!("Resuming interrupted run {}", run.id);
                run.id
            }
            _ => {
                let id = storage.create_run(config_hash)?;
                tracing::info!("Starting run {}", id);
                id
            }
        };

        let storage = storage::share(storage);
        let queue = Arc::new(RequestQueue::restore(storage.clone())?);
        let quota = Arc::new(QuotaTracker::restore(
            config.input.max_items,
            storage.clone(),
        )?);

        let mut dataset = Dataset::new().with_sink(SqliteOutputSink::new(storage.clone()));
        if let Some(path) = &config.output.dataset_path {
            dataset = dataset.with_sink(JsonLinesSink::open(Path::new(path))?);
        }
        if let Some(extend) = &config.input.extend_output {
            dataset.set_extension(Box::new(FieldMapExtension::from_config(extend)?));
        }

        let scraper = Arc::new(SelectorScraper::new(config.site.selectors.clone()));
        let (control_tx, control_rx) = mpsc::channel(16);

        Ok(Self {
            config: Arc::new(config),
            storage,
            queue,
            quota,
            dataset,
            client,
            scraper,
            run_id,
            control_tx,
            control_rx,
        })
    }

    /// Replaces the site-specific field scraper
    pub fn with_scraper(mut self, scraper: Arc<dyn ItemScraper>) -> Self {
        self.scraper = scraper;
        self
    }

    /// Replaces the configured output extension with a registered one
    pub fn with_output_extension(mut self, extension: Box<dyn OutputExtension>) -> Self {
        self.dataset.set_extension(extension);
        self
    }

    /// Returns a handle for checkpointing or stopping the crawl
    pub fn handle(&self) -> CrawlHandle {
        CrawlHandle::new(self.control_tx.clone())
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    /// Enqueues the start URLs
    ///
    /// URLs outside the catalog site are skipped. Item seeds count against
    /// the quota, and seeding stops as soon as the quota is exhausted.
    /// Seeds seen by an earlier run are ignored.
    pub fn seed(&self) -> crate::Result<SeedSummary> {
        let mut summary = SeedSummary::default();

        for decision in plan_seeds(&self.config)? {
            if self.quota.is_exhausted() {
                summary.quota_reached = true;
                break;
            }

            let request = match decision {
                SeedDecision::Rejected { url } => {
                    tracing::warn!("Ignoring start URL outside the catalog site: {}", url);
                    summary.rejected += 1;
                    continue;
                }
                SeedDecision::Accept(request) => request,
            };

            match request.label {
                RequestLabel::Item => match self.quota.schedule_item(&self.queue, request)? {
                    ScheduleOutcome::Scheduled => summary.items += 1,
                    ScheduleOutcome::Duplicate => summary.duplicates += 1,
                    ScheduleOutcome::QuotaReached => {
                        summary.quota_reached = true;
                        break;
                    }
                },
                RequestLabel::Listing => {
                    if self.queue.enqueue(request)? {
                        summary.listings += 1;
                    } else {
                        summary.duplicates += 1;
                    }
                }
            }
        }

        if summary.quota_reached {
            tracing::info!("Item quota reached while seeding");
        }
        tracing::info!(
            "Seeded {} listings and {} items ({} already known, {} rejected)",
            summary.listings,
            summary.items,
            summary.duplicates,
            summary.rejected
        );

        Ok(summary)
    }

    /// Seeds the queue and runs the crawl to completion
    ///
    /// The run is marked `completed` when the queue drains, `interrupted`
    /// when the request cap or a shutdown stops it, and `failed` on error.
    pub async fn run(self) -> crate::Result<CrawlReport> {
        self.seed()?;

        let Crawler {
            config,
            storage,
            queue,
            quota,
            dataset,
            client,
            scraper,
            run_id,
            control_tx,
            control_rx,
        } = self;
        drop(control_tx);

        let dataset = Arc::new(dataset);
        let resources = PoolResources {
            queue,
            quota,
            storage: storage.clone(),
            client,
            extractor: ItemExtractor::new(scraper, dataset.clone()),
            dataset,
        };
        let settings = PoolSettings {
            max_concurrency: config.crawler.max_concurrency as usize,
            max_retries: config.crawler.max_request_retries,
            max_requests: config.crawler.max_requests_per_crawl,
        };
        let pagination = PaginationSettings::new(&config.crawler, &config.site.selectors);

        let result = CrawlWorkerPool::new(resources, settings, pagination)?
            .run(control_rx)
            .await;

        let status = match &result {
            Ok(report) if report.stop_reason == StopReason::Drained => RunStatus::Completed,
            Ok(_) => RunStatus::Interrupted,
            Err(_) => RunStatus::Failed,
        };
        storage::lock(&storage)?.finish_run(run_id, status)?;

        match &result {
            Ok(report) => tracing::info!(
                "Run {} {}: {} handled, {} failed, {} retries, {} records, {} items scheduled",
                run_id,
                status.to_db_string(),
                report.handled,
                report.failed,
                report.retries,
                report.records_emitted,
                report.items_scheduled
            ),
            Err(e) => tracing::error!("Run {} failed: {}", run_id, e),
        }

        result
    }
}
