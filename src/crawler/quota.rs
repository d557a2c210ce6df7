//! Global item quota
//!
//! Counts item requests ever scheduled against an optional limit. The
//! count is checked and bumped under one lock so concurrent workers can
//! never push it past the limit, and it is persisted so a restart resumes
//! from the same count.

use crate::crawler::RequestQueue;
use crate::state::{CrawlRequest, RequestLabel};
use crate::storage::{self, SharedStorage, StorageResult};
use std::sync::{Mutex, MutexGuard};

/// Snapshot of the quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaState {
    /// Item requests scheduled so far
    pub scheduled: u64,

    /// Maximum number of item requests, unbounded when `None`
    pub limit: Option<u64>,
}

impl QuotaState {
    fn has_room(&self) -> bool {
        self.limit.map_or(true, |limit| self.scheduled < limit)
    }
}

/// Result of trying to schedule an item request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Enqueued and counted against the quota
    Scheduled,

    /// Already seen; the quota is unchanged
    Duplicate,

    /// No slot left; nothing was enqueued
    QuotaReached,
}

/// Process-wide item quota shared by every component that schedules items
pub struct QuotaTracker {
    state: Mutex<QuotaState>,
    storage: SharedStorage,
}

impl QuotaTracker {
    /// Creates a tracker starting from zero
    ///
    /// A limit of zero means no limit.
    pub fn new(limit: Option<u64>, storage: SharedStorage) -> Self {
        Self {
            state: Mutex::new(QuotaState {
                scheduled: 0,
                limit: limit.filter(|&l| l > 0),
            }),
            storage,
        }
    }

    /// Restores the count from storage
    ///
    /// The persisted snapshot is reconciled with the number of item
    /// requests in the queue, so a crash between an enqueue and its
    /// snapshot never under-counts.
    pub fn restore(limit: Option<u64>, storage: SharedStorage) -> StorageResult<Self> {
        let scheduled = {
            let guard = storage::lock(&storage)?;
            let snapshot = guard.load_quota()?.unwrap_or(0);
            let enqueued = guard.count_requests_by_label(RequestLabel::Item)?;
            snapshot.max(enqueued)
        };

        tracing::info!(
            "Restored item quota: {} scheduled (limit: {})",
            scheduled,
            limit
                .filter(|&l| l > 0)
                .map_or_else(|| "none".to_string(), |l| l.to_string())
        );

        let tracker = Self::new(limit, storage);
        tracker.restore_state(QuotaState { scheduled, limit });
        Ok(tracker)
    }

    fn lock_state(&self) -> MutexGuard<'_, QuotaState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Claims one item slot if any is left
    ///
    /// The check and the increment happen under one lock: with a limit of
    /// `L`, at most `L` calls ever return true.
    pub fn try_reserve_item_slot(&self) -> bool {
        let mut state = self.lock_state();
        if !state.has_room() {
            return false;
        }
        state.scheduled += 1;
        true
    }

    /// Enqueues an item request if a slot is left
    ///
    /// The quota lock is held across the check, the enqueue and the
    /// increment, so a URL that turns out to be a duplicate does not use
    /// up a slot.
    pub fn schedule_item(
        &self,
        queue: &RequestQueue,
        request: CrawlRequest,
    ) -> StorageResult<ScheduleOutcome> {
        let mut state = self.lock_state();
        if !state.has_room() {
            return Ok(ScheduleOutcome::QuotaReached);
        }

        if !queue.enqueue(request)? {
            return Ok(ScheduleOutcome::Duplicate);
        }

        state.scheduled += 1;
        storage::lock(&self.storage)?.save_quota(state.scheduled)?;
        Ok(ScheduleOutcome::Scheduled)
    }

    /// Returns true once no further item can be scheduled
    pub fn is_exhausted(&self) -> bool {
        !self.lock_state().has_room()
    }

    pub fn snapshot(&self) -> QuotaState {
        *self.lock_state()
    }

    /// Sets the count from an earlier snapshot, keeping this tracker's limit
    pub fn restore_state(&self, snapshot: QuotaState) {
        self.lock_state().scheduled = snapshot.scheduled;
    }

    /// Writes the current count to storage
    pub fn persist(&self) -> StorageResult<()> {
        let scheduled = self.lock_state().scheduled;
        storage::lock(&self.storage)?.save_quota(scheduled)
    }
}
