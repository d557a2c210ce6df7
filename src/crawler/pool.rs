//! Bounded-concurrency worker pool
//!
//! Spawns `max-concurrency` workers that share one request queue. Each
//! worker:
//! - takes the oldest pending request
//! - opens it with the page client and routes it by label
//! - marks it handled, or applies the retry policy on failure
//!
//! The pool stops when the queue drains, when the processed-request cap is
//! hit, or when a shutdown signal arrives.

use crate::crawler::control::ControlSignal;
use crate::crawler::{ItemExtractor, PaginationSettings, Paginator, QuotaTracker, RequestQueue};
use crate::output::{Dataset, FailureRecord};
use crate::page::PageClient;
use crate::state::{CrawlRequest, RequestLabel, RequestState};
use crate::storage::{self, SharedStorage};
use crate::CatalogError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Why a crawl stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Nothing pending and nothing in flight
    Drained,

    /// `max-requests-per-crawl` requests finished
    RequestCap,

    /// A shutdown signal was received
    Shutdown,
}

/// Outcome of one crawl process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    pub handled: u64,
    pub failed: u64,
    pub retries: u64,
    pub records_emitted: u64,
    pub items_scheduled: u64,
    pub stop_reason: StopReason,
}

/// Limits applied by the pool
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub max_requests: u64,
}

/// Shared components the workers operate on
#[derive(Clone)]
pub struct PoolResources {
    pub queue: Arc<RequestQueue>,
    pub quota: Arc<QuotaTracker>,
    pub storage: SharedStorage,
    pub client: Arc<dyn PageClient>,
    pub extractor: ItemExtractor,
    pub dataset: Arc<Dataset>,
}

#[derive(Default)]
struct Counters {
    handled: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
}

struct Worker {
    resources: PoolResources,
    settings: PoolSettings,
    pagination: PaginationSettings,

    /// Finished requests plus requests currently being processed
    finished: AtomicU64,
    cap_reached: AtomicBool,
    counters: Counters,
}

/// Runs requests from the queue until the crawl stops
pub struct CrawlWorkerPool {
    worker: Arc<Worker>,
}

impl CrawlWorkerPool {
    /// Creates the pool, carrying over the finished-request count of
    /// earlier runs so the cap spans the whole crawl
    pub fn new(
        resources: PoolResources,
        settings: PoolSettings,
        pagination: PaginationSettings,
    ) -> crate::Result<Self> {
        let finished = {
            let guard = storage::lock(&resources.storage)?;
            guard.count_requests_by_state(RequestState::Handled)?
                + guard.count_requests_by_state(RequestState::Failed)?
        };

        Ok(Self {
            worker: Arc::new(Worker {
                resources,
                settings,
                pagination,
                finished: AtomicU64::new(finished),
                cap_reached: AtomicBool::new(false),
                counters: Counters::default(),
            }),
        })
    }

    /// Drives the crawl until it drains, hits the cap or is shut down
    ///
    /// Control signals are handled while workers run. Whatever the stop
    /// reason, in-flight requests go back to the queue and the quota is
    /// persisted before this returns.
    pub async fn run(
        self,
        mut control: mpsc::Receiver<ControlSignal>,
    ) -> crate::Result<CrawlReport> {
        let queue = self.worker.resources.queue.clone();
        let concurrency = self.worker.settings.max_concurrency.max(1);

        let mut workers = JoinSet::new();
        for id in 0..concurrency {
            let worker = self.worker.clone();
            workers.spawn(async move { worker.run(id).await });
        }

        tracing::info!(
            "Started {} workers ({} requests pending)",
            concurrency,
            queue.pending_len()
        );

        let mut control_open = true;
        let mut shutdown_ack = None;
        let mut failure: Option<CatalogError> = None;

        loop {
            tokio::select! {
                joined = workers.join_next() => match joined {
                    None => break,
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(e))) => {
                        tracing::error!("Worker stopped on error: {}", e);
                        queue.close();
                        workers.abort_all();
                        failure.get_or_insert(e);
                    }
                    Some(Err(e)) if e.is_cancelled() => {}
                    Some(Err(e)) => {
                        tracing::error!("Worker panicked: {}", e);
                        queue.close();
                        workers.abort_all();
                        failure.get_or_insert(CatalogError::Worker(e.to_string()));
                    }
                },
                signal = control.recv(), if control_open => match signal {
                    Some(ControlSignal::Checkpoint { ack }) => {
                        let result = self.checkpoint();
                        match &result {
                            Ok(()) => tracing::info!("Checkpoint written"),
                            Err(e) => tracing::error!("Checkpoint failed: {}", e),
                        }
                        let _ = ack.send(result.map_err(|e| e.to_string()));
                    }
                    Some(ControlSignal::Shutdown { ack }) => {
                        tracing::info!("Shutdown requested, stopping workers");
                        queue.close();
                        workers.abort_all();
                        shutdown_ack = Some(ack);
                    }
                    None => control_open = false,
                },
            }
        }

        let released = queue.release_in_flight()?;
        if released > 0 {
            tracing::info!("Returned {} in-flight requests to the queue", released);
        }

        let persisted = self.checkpoint();
        let shutdown = shutdown_ack.is_some();
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(persisted.as_ref().map(|_| ()).map_err(|e| e.to_string()));
        }

        if let Some(e) = failure {
            return Err(e);
        }
        persisted?;

        let stop_reason = if shutdown {
            StopReason::Shutdown
        } else if self.worker.cap_reached.load(Ordering::SeqCst) {
            StopReason::RequestCap
        } else {
            StopReason::Drained
        };

        Ok(self.report(stop_reason))
    }

    /// Persists quota and flushes storage and sinks
    fn checkpoint(&self) -> crate::Result<()> {
        let resources = &self.worker.resources;
        resources.quota.persist()?;
        resources.dataset.flush()?;
        storage::lock(&resources.storage)?.checkpoint()?;
        Ok(())
    }

    fn report(&self, stop_reason: StopReason) -> CrawlReport {
        let counters = &self.worker.counters;
        CrawlReport {
            handled: counters.handled.load(Ordering::SeqCst),
            failed: counters.failed.load(Ordering::SeqCst),
            retries: counters.retries.load(Ordering::SeqCst),
            records_emitted: self.worker.resources.dataset.emitted(),
            items_scheduled: self.worker.resources.quota.snapshot().scheduled,
            stop_reason,
        }
    }
}

impl Worker {
    async fn run(self: Arc<Self>, id: usize) -> crate::Result<()> {
        tracing::debug!("Worker {} started", id);
        let queue = &self.resources.queue;

        while let Some(request) = queue.dequeue().await? {
            if !self.reserve_cap_unit() {
                queue.release(request)?;
                if !self.cap_reached.swap(true, Ordering::SeqCst) {
                    tracing::info!(
                        "Reached max-requests-per-crawl ({}), stopping",
                        self.settings.max_requests
                    );
                }
                queue.close();
                break;
            }

            tracing::debug!(
                "Worker {} processing {} ({}, attempt {})",
                id,
                request.url,
                request.label,
                request.retry_count + 1
            );

            match self.process(&request).await {
                Ok(()) => {
                    queue.complete(&request, RequestState::Handled)?;
                    self.counters.handled.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => self.handle_failure(request, e)?,
            }
        }

        tracing::debug!("Worker {} finished", id);
        Ok(())
    }

    /// Claims one unit of the processed-request cap
    fn reserve_cap_unit(&self) -> bool {
        let max = self.settings.max_requests;
        self.finished
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .is_ok()
    }

    /// Opens the page and routes the request by label
    async fn process(&self, request: &CrawlRequest) -> crate::Result<()> {
        let resources = &self.resources;
        let mut session = resources.client.open(&request.url).await?;

        let result = match request.label {
            RequestLabel::Listing => Paginator::new(
                session.as_mut(),
                &resources.queue,
                &resources.quota,
                &self.pagination,
                &request.url,
            )
            .run()
            .await
            .map(|_| ()),
            RequestLabel::Item => resources.extractor.process(session.as_mut(), request).await,
        };

        if let Err(e) = session.close().await {
            tracing::debug!("Failed to close page for {}: {}", request.url, e);
        }

        result
    }

    /// Retries the request or gives up on it
    ///
    /// A retry goes to the back of the queue and hands back its cap unit.
    /// A request out of retries is marked failed and leaves one failure
    /// record in the dataset.
    fn handle_failure(&self, request: CrawlRequest, error: CatalogError) -> crate::Result<()> {
        let message = error.to_string();

        if request.retry_count < self.settings.max_retries {
            tracing::warn!(
                "Request {} failed (attempt {}), retrying: {}",
                request.url,
                request.retry_count + 1,
                message
            );
            self.finished.fetch_sub(1, Ordering::SeqCst);
            self.counters.retries.fetch_add(1, Ordering::SeqCst);
            self.resources.queue.reenqueue(request.next_attempt(message))?;
            return Ok(());
        }

        tracing::error!(
            "Request {} failed too many times ({} retries): {}",
            request.url,
            request.retry_count,
            message
        );

        let failed = request.with_error(message);
        self.resources
            .dataset
            .push_failure(&FailureRecord::from(&failed))?;
        self.resources
            .queue
            .complete(&failed, RequestState::Failed)?;
        self.counters.failed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CrawlerConfig, SelectorConfig};
    use crate::crawler::{ItemScraper, ScrapedFields};
    use crate::output::SqliteOutputSink;
    use crate::page::{ControlState, PageError, PageResult, PageSession};
    use crate::storage::{share, RecordKind, SqliteStorage};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Item pages that fail a scripted number of times before loading
    #[derive(Default)]
    struct FlakyClient {
        failures: Mutex<HashMap<String, u32>>,
        opened: Mutex<Vec<String>>,
        slow: bool,
        /// Page loads wait for a permit when set
        gate: Option<Arc<tokio::sync::Semaphore>>,
    }

    impl FlakyClient {
        fn failing(url: &str, times: u32) -> Self {
            let client = Self::default();
            client.failures.lock().unwrap().insert(url.to_string(), times);
            client
        }
    }

    struct Blank;

    #[async_trait]
    impl PageSession for Blank {
        async fn title(&mut self) -> PageResult<String> {
            Ok("Item".to_string())
        }
        async fn query_links(&mut self, _selector: &str) -> PageResult<Vec<String>> {
            Ok(Vec::new())
        }
        async fn control_state(&mut self, _s: &str, _c: &str) -> PageResult<ControlState> {
            Ok(ControlState::Missing)
        }
        async fn click_control(&mut self, selector: &str) -> PageResult<()> {
            Err(PageError::ControlNotFound(selector.to_string()))
        }
        async fn is_visible(&mut self, _selector: &str) -> PageResult<bool> {
            Ok(false)
        }
        async fn query_text(&mut self, _selector: &str) -> PageResult<String> {
            Ok(String::new())
        }
        async fn query_all_text(&mut self, _selector: &str) -> PageResult<Vec<String>> {
            Ok(Vec::new())
        }
        async fn read_global(&mut self, _name: &str) -> PageResult<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
        async fn close(self: Box<Self>) -> PageResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl PageClient for FlakyClient {
        async fn open(&self, url: &str) -> PageResult<Box<dyn PageSession>> {
            self.opened.lock().unwrap().push(url.to_string());
            if self.slow {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await.unwrap();
            }

            let mut failures = self.failures.lock().unwrap();
            if let Some(left) = failures.get_mut(url) {
                if *left > 0 {
                    *left -= 1;
                    return Err(PageError::Navigation {
                        url: url.to_string(),
                        message: "net::ERR_TIMED_OUT".to_string(),
                    });
                }
            }
            Ok(Box::new(Blank))
        }
    }

    struct NoFields;

    #[async_trait]
    impl ItemScraper for NoFields {
        async fn scrape(&self, _session: &mut dyn PageSession) -> PageResult<ScrapedFields> {
            Ok(ScrapedFields::default())
        }
    }

    struct Harness {
        storage: SharedStorage,
        queue: Arc<RequestQueue>,
        quota: Arc<QuotaTracker>,
        pool: CrawlWorkerPool,
    }

    fn harness(client: Arc<dyn PageClient>, max_retries: u32, max_requests: u64) -> Harness {
        let storage = share(SqliteStorage::new_in_memory().unwrap());
        let queue = Arc::new(RequestQueue::new(storage.clone()));
        let quota = Arc::new(QuotaTracker::new(None, storage.clone()));
        let dataset = Arc::new(Dataset::new().with_sink(SqliteOutputSink::new(storage.clone())));

        let resources = PoolResources {
            queue: queue.clone(),
            quota: quota.clone(),
            storage: storage.clone(),
            client,
            extractor: ItemExtractor::new(Arc::new(NoFields), dataset.clone()),
            dataset,
        };
        let settings = PoolSettings {
            max_concurrency: 3,
            max_retries,
            max_requests,
        };
        let pagination = PaginationSettings::new(&CrawlerConfig::default(), &SelectorConfig::default());

        Harness {
            storage,
            queue,
            quota,
            pool: CrawlWorkerPool::new(resources, settings, pagination).unwrap(),
        }
    }

    fn item(n: u32) -> CrawlRequest {
        CrawlRequest::new(format!("https://e.com/product/{}", n), RequestLabel::Item)
    }

    fn idle_control() -> (mpsc::Sender<ControlSignal>, mpsc::Receiver<ControlSignal>) {
        mpsc::channel(1)
    }

    #[tokio::test]
    async fn test_success_after_max_retries_counts_once() {
        let client = Arc::new(FlakyClient::failing("https://e.com/product/1", 2));
        let h = harness(client.clone(), 2, 1000);
        h.queue.enqueue(item(1)).unwrap();

        let (_tx, rx) = idle_control();
        let report = h.pool.run(rx).await.unwrap();

        assert_eq!(report.stop_reason, StopReason::Drained);
        assert_eq!(report.handled, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.retries, 2);
        assert_eq!(report.records_emitted, 1);

        let storage = storage::lock(&h.storage).unwrap();
        assert_eq!(storage.count_records(RecordKind::Item).unwrap(), 1);
        assert_eq!(storage.count_records(RecordKind::Failure).unwrap(), 0);
        let (request, state) = storage.get_request(&item(1).url).unwrap().unwrap();
        assert_eq!(state, RequestState::Handled);
        assert_eq!(request.retry_count, 2);
        assert_eq!(client.opened.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_emit_one_failure_record() {
        let client = Arc::new(FlakyClient::failing("https://e.com/product/1", 3));
        let h = harness(client.clone(), 2, 1000);
        h.queue.enqueue(item(1)).unwrap();

        let (_tx, rx) = idle_control();
        let report = h.pool.run(rx).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.handled, 0);
        assert_eq!(client.opened.lock().unwrap().len(), 3);

        let storage = storage::lock(&h.storage).unwrap();
        let failures = storage.load_records(RecordKind::Failure).unwrap();
        assert_eq!(failures.len(), 1);
        let body: serde_json::Value = serde_json::from_str(&failures[0]).unwrap();
        assert_eq!(body["#debug"]["retryCount"], serde_json::json!(2));
        assert_eq!(body["#debug"]["errorMessages"].as_array().unwrap().len(), 3);

        let (_, state) = storage.get_request(&item(1).url).unwrap().unwrap();
        assert_eq!(state, RequestState::Failed);
    }

    #[tokio::test]
    async fn test_request_cap_stops_pool() {
        let h = harness(Arc::new(FlakyClient::default()), 2, 4);
        for n in 0..10 {
            h.queue.enqueue(item(n)).unwrap();
        }

        let (_tx, rx) = idle_control();
        let report = h.pool.run(rx).await.unwrap();

        assert_eq!(report.stop_reason, StopReason::RequestCap);
        assert_eq!(report.handled, 4);
        assert_eq!(h.queue.pending_len(), 6);
        assert_eq!(h.queue.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_returns_in_flight_requests() {
        let client = Arc::new(FlakyClient {
            slow: true,
            ..FlakyClient::default()
        });
        let h = harness(client, 2, 1000);
        for n in 0..5 {
            h.queue.enqueue(item(n)).unwrap();
        }

        let (tx, rx) = mpsc::channel(1);
        let handle = crate::crawler::CrawlHandle::new(tx);
        let queue = h.queue.clone();
        let run = tokio::spawn(h.pool.run(rx));

        while queue.in_flight_len() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.shutdown().await.unwrap();

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.stop_reason, StopReason::Shutdown);
        assert_eq!(report.handled, 0);
        assert_eq!(queue.pending_len(), 5);

        let storage = storage::lock(&h.storage).unwrap();
        assert_eq!(storage.count_requests_by_state(RequestState::InFlight).unwrap(), 0);
        assert_eq!(storage.load_pending().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_checkpoint_persists_and_crawl_continues() {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let client = Arc::new(FlakyClient {
            gate: Some(gate.clone()),
            ..FlakyClient::default()
        });
        let h = harness(client, 2, 1000);
        for n in 0..5 {
            h.queue.enqueue(item(n)).unwrap();
            assert!(h.quota.try_reserve_item_slot());
        }
        assert_eq!(storage::lock(&h.storage).unwrap().load_quota().unwrap(), None);

        let (tx, rx) = mpsc::channel(1);
        let handle = crate::crawler::CrawlHandle::new(tx);
        let queue = h.queue.clone();
        let run = tokio::spawn(h.pool.run(rx));

        while queue.in_flight_len() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.checkpoint().await.unwrap();

        assert_eq!(storage::lock(&h.storage).unwrap().load_quota().unwrap(), Some(5));
        assert_eq!(queue.in_flight_len(), 3);

        gate.add_permits(100);
        let report = run.await.unwrap().unwrap();

        assert_eq!(report.stop_reason, StopReason::Drained);
        assert_eq!(report.handled, 5);
        assert_eq!(report.records_emitted, 5);
        assert_eq!(queue.pending_len(), 0);
    }
}
