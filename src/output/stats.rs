//! Statistics generation from crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::state::{RequestLabel, RequestState};
use crate::storage::{RecordKind, RunRecord, Storage};
use crate::CatalogError;
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone, Default)]
pub struct CrawlStatistics {
    /// Total number of URLs ever enqueued
    pub total_requests: u64,

    /// Count of requests by state
    pub requests_by_state: HashMap<RequestState, u64>,

    /// Count of requests by label
    pub requests_by_label: HashMap<RequestLabel, u64>,

    /// Persisted quota snapshot
    pub items_scheduled: Option<u64>,

    pub item_records: u64,
    pub failure_records: u64,

    /// Most recent crawl run
    pub latest_run: Option<RunRecord>,
}

impl CrawlStatistics {
    /// Returns the number of requests in a state
    pub fn in_state(&self, state: RequestState) -> u64 {
        self.requests_by_state.get(&state).copied().unwrap_or(0)
    }

    /// Returns the share of finished requests that succeeded, as a percentage
    pub fn success_rate(&self) -> f64 {
        let handled = self.in_state(RequestState::Handled);
        let finished = handled + self.in_state(RequestState::Failed);
        if finished == 0 {
            return 0.0;
        }
        (handled as f64 / finished as f64) * 100.0
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(CatalogError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<CrawlStatistics, CatalogError> {
    let mut requests_by_state = HashMap::new();
    for state in RequestState::all_states() {
        let count = storage.count_requests_by_state(state)?;
        if count > 0 {
            requests_by_state.insert(state, count);
        }
    }

    let mut requests_by_label = HashMap::new();
    for label in [RequestLabel::Listing, RequestLabel::Item] {
        let count = storage.count_requests_by_label(label)?;
        if count > 0 {
            requests_by_label.insert(label, count);
        }
    }

    Ok(CrawlStatistics {
        total_requests: requests_by_label.values().sum(),
        requests_by_state,
        requests_by_label,
        items_scheduled: storage.load_quota()?,
        item_records: storage.count_records(RecordKind::Item)?,
        failure_records: storage.count_records(RecordKind::Failure)?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    if let Some(run) = &stats.latest_run {
        println!("Latest Run:");
        println!("  Id: {}", run.id);
        println!("  Status: {}", run.status.to_db_string());
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        println!("  Config hash: {}", run.config_hash);
        println!();
    }

    println!("Overview:");
    println!("  Total requests enqueued: {}", stats.total_requests);
    println!(
        "  Items scheduled (quota): {}",
        stats.items_scheduled.unwrap_or(0)
    );
    println!("  Item records: {}", stats.item_records);
    println!("  Failure records: {}", stats.failure_records);
    println!();

    println!("Requests by State:");
    for state in RequestState::all_states() {
        let count = stats.in_state(state);
        let percentage = if stats.total_requests > 0 {
            (count as f64 / stats.total_requests as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", state, count, percentage);
    }
    println!();

    println!("Requests by Label:");
    for label in [RequestLabel::Listing, RequestLabel::Item] {
        println!(
            "  {}: {}",
            label,
            stats.requests_by_label.get(&label).copied().unwrap_or(0)
        );
    }
    println!();

    println!(
        "Success Rate: {:.1}% ({} handled, {} failed)",
        stats.success_rate(),
        stats.in_state(RequestState::Handled),
        stats.in_state(RequestState::Failed)
    );
}
