//! Persistent, deduplicated FIFO request queue
//!
//! The queue keeps its seen-set and pending order in memory for fast
//! dispatch and writes every change through to storage, so a restarted
//! crawl picks up exactly where the previous process stopped.
//!
//! Completion is detected here: `dequeue` suspends while other workers
//! still hold requests (they may enqueue more) and reports the end of the
//! crawl once nothing is pending and nothing is in flight.

use crate::state::{CrawlRequest, RequestState};
use crate::storage::{self, SharedStorage, StorageResult};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Default)]
struct QueueInner {
    seen: HashSet<String>,
    pending: VecDeque<CrawlRequest>,
    /// Dequeued requests keyed by url, with their dequeue sequence number
    in_flight: HashMap<String, (u64, CrawlRequest)>,
    dequeued: u64,
    closed: bool,
}

/// Shared request queue
pub struct RequestQueue {
    inner: Mutex<QueueInner>,
    storage: SharedStorage,
    changed: Notify,
}

impl RequestQueue {
    /// Creates an empty queue over `storage`
    pub fn new(storage: SharedStorage) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            storage,
            changed: Notify::new(),
        }
    }

    /// Restores the queue from storage
    ///
    /// Requests a previous process left in flight become pending again at
    /// their original position.
    pub fn restore(storage: SharedStorage) -> StorageResult<Self> {
        let (seen, pending, released) = {
            let mut guard = storage::lock(&storage)?;
            let released = guard.release_in_flight()?;
            (guard.load_seen()?, guard.load_pending()?, released)
        };

        if released > 0 {
            tracing::info!("Returned {} interrupted requests to the queue", released);
        }
        tracing::info!(
            "Restored queue: {} seen, {} pending",
            seen.len(),
            pending.len()
        );

        let queue = Self::new(storage);
        {
            let mut inner = queue.lock_inner();
            inner.seen = seen.into_iter().collect();
            inner.pending = pending.into_iter().collect();
        }
        Ok(queue)
    }

    fn lock_inner(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Adds a request unless its URL was seen before
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The request was appended to the queue
    /// * `Ok(false)` - The URL was already known; nothing changed
    pub fn enqueue(&self, request: CrawlRequest) -> StorageResult<bool> {
        let mut inner = self.lock_inner();
        if inner.seen.contains(&request.url) {
            return Ok(false);
        }

        let added = storage::lock(&self.storage)?.insert_request(&request)?;
        inner.seen.insert(request.url.clone());
        if !added {
            // Known to storage but not to memory: a fresh queue over old state
            return Ok(false);
        }

        tracing::debug!("Enqueued {} ({})", request.url, request.label);
        inner.pending.push_back(request);
        drop(inner);

        self.changed.notify_waiters();
        Ok(true)
    }

    /// Takes the oldest pending request
    ///
    /// Suspends while the queue is empty but other requests are in flight.
    /// Returns `None` once the crawl is complete or the queue was closed.
    pub async fn dequeue(&self) -> StorageResult<Option<CrawlRequest>> {
        loop {
            let changed = self.changed.notified();

            {
                let mut inner = self.lock_inner();
                if inner.closed {
                    return Ok(None);
                }

                if let Some(request) = inner.pending.pop_front() {
                    let marked = storage::lock(&self.storage)
                        .and_then(|mut s| s.set_request_state(&request, RequestState::InFlight));
                    if let Err(e) = marked {
                        inner.pending.push_front(request);
                        return Err(e);
                    }

                    let seq = inner.dequeued;
                    inner.dequeued += 1;
                    inner.in_flight.insert(request.url.clone(), (seq, request.clone()));
                    return Ok(Some(request));
                }

                if inner.in_flight.is_empty() {
                    drop(inner);
                    // Wake every other idle worker so they see the drain too
                    self.changed.notify_waiters();
                    return Ok(None);
                }
            }

            changed.await;
        }
    }

    /// Records the final state of a dequeued request
    pub fn complete(&self, request: &CrawlRequest, state: RequestState) -> StorageResult<()> {
        let mut inner = self.lock_inner();
        storage::lock(&self.storage)?.set_request_state(request, state)?;
        inner.in_flight.remove(&request.url);
        drop(inner);

        self.changed.notify_waiters();
        Ok(())
    }

    /// Puts a failed request back at the end of the queue for another attempt
    ///
    /// The URL is already in the seen-set, so no dedup check is made.
    pub fn reenqueue(&self, request: CrawlRequest) -> StorageResult<()> {
        let mut inner = self.lock_inner();
        storage::lock(&self.storage)?.requeue_request(&request)?;
        inner.in_flight.remove(&request.url);
        inner.pending.push_back(request);
        drop(inner);

        self.changed.notify_waiters();
        Ok(())
    }

    /// Returns a dequeued request to the front of the queue untouched
    pub fn release(&self, request: CrawlRequest) -> StorageResult<()> {
        let mut inner = self.lock_inner();
        storage::lock(&self.storage)?.release_request(&request.url)?;
        inner.in_flight.remove(&request.url);
        inner.pending.push_front(request);
        drop(inner);

        self.changed.notify_waiters();
        Ok(())
    }

    /// Returns every in-flight request to the front of the queue
    ///
    /// Used when workers are cancelled so no dequeued request is lost.
    /// Released requests keep the order they were dequeued in, matching
    /// the positions storage restores them to.
    pub fn release_in_flight(&self) -> StorageResult<usize> {
        let mut inner = self.lock_inner();
        storage::lock(&self.storage)?.release_in_flight()?;

        let mut released: Vec<(u64, CrawlRequest)> =
            inner.in_flight.drain().map(|(_, entry)| entry).collect();
        released.sort_by_key(|(seq, _)| *seq);

        let count = released.len();
        for (_, request) in released.into_iter().rev() {
            inner.pending.push_front(request);
        }
        Ok(count)
    }

    /// Stops handing out requests; waiting workers return `None`
    pub fn close(&self) {
        self.lock_inner().closed = true;
        self.changed.notify_waiters();
    }

    /// Returns true if `url` was ever enqueued
    pub fn contains(&self, url: &str) -> bool {
        self.lock_inner().seen.contains(url)
    }

    pub fn pending_len(&self) -> usize {
        self.lock_inner().pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock_inner().in_flight.len()
    }

    pub fn seen_len(&self) -> usize {
        self.lock_inner().seen.len()
    }
}
