//! Listing pagination
//!
//! A listing request walks its pages as an explicit state machine:
//!
//! ```text
//! Scanning -> AwaitingNextPage -> Scanning ...
//!                              -> Done          (next control inactive or missing)
//! Scanning -> QuotaReached                      (item quota exhausted)
//! AwaitingNextPage -> PageLimit                 (max-listing-pages walked)
//! ```
//!
//! A wait for the loading indicator that times out is tolerated: the next
//! page is scanned in whatever state it reached. Query and click errors
//! propagate and fail the request as a whole.

use crate::config::{CrawlerConfig, SelectorConfig};
use crate::crawler::{QuotaTracker, RequestQueue, ScheduleOutcome};
use crate::page::{wait_until_hidden, ControlState, PageSession, WaitOutcome};
use crate::state::{CrawlRequest, RequestLabel};
use crate::url::normalize_url;
use std::time::Duration;

/// Pagination state of one listing request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationState {
    Scanning,
    AwaitingNextPage,
    Done,
    QuotaReached,
    PageLimit,
}

impl PaginationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::QuotaReached | Self::PageLimit)
    }
}

/// Selectors and timings used while paginating
#[derive(Debug, Clone)]
pub struct PaginationSettings {
    pub item_link: String,
    pub next_page: String,
    pub inactive_class: String,
    pub loading: String,
    pub settle: Duration,
    pub load_timeout: Duration,
    pub poll: Duration,
    pub max_pages: u32,
}

impl PaginationSettings {
    pub fn new(crawler: &CrawlerConfig, selectors: &SelectorConfig) -> Self {
        Self {
            item_link: selectors.item_link.clone(),
            next_page: selectors.next_page.clone(),
            inactive_class: selectors.inactive_class.clone(),
            loading: selectors.loading.clone(),
            settle: Duration::from_millis(crawler.navigation_settle_ms),
            load_timeout: Duration::from_millis(crawler.load_timeout_ms),
            poll: Duration::from_millis(crawler.wait_poll_ms),
            max_pages: crawler.max_listing_pages,
        }
    }
}

/// Summary of a finished listing request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationOutcome {
    /// Listing pages scanned
    pub pages: u32,

    /// Item requests this listing scheduled
    pub scheduled: u64,

    /// Terminal state reached
    pub end: PaginationState,
}

/// Walks the pages of one listing request
pub struct Paginator<'a> {
    session: &'a mut dyn PageSession,
    queue: &'a RequestQueue,
    quota: &'a QuotaTracker,
    settings: &'a PaginationSettings,
    listing_url: &'a str,
    pages: u32,
    scheduled: u64,
}

impl<'a> Paginator<'a> {
    pub fn new(
        session: &'a mut dyn PageSession,
        queue: &'a RequestQueue,
        quota: &'a QuotaTracker,
        settings: &'a PaginationSettings,
        listing_url: &'a str,
    ) -> Self {
        Self {
            session,
            queue,
            quota,
            settings,
            listing_url,
            pages: 0,
            scheduled: 0,
        }
    }

    /// Runs the state machine to a terminal state
    pub async fn run(mut self) -> crate::Result<PaginationOutcome> {
        let mut state = PaginationState::Scanning;

        while !state.is_terminal() {
            state = match state {
                PaginationState::Scanning => self.scan().await?,
                PaginationState::AwaitingNextPage => self.advance().await?,
                terminal => terminal,
            };
        }

        tracing::debug!(
            "Listing {} finished after {} pages ({:?}), {} items scheduled",
            self.listing_url,
            self.pages,
            state,
            self.scheduled
        );

        Ok(PaginationOutcome {
            pages: self.pages,
            scheduled: self.scheduled,
            end: state,
        })
    }

    /// Schedules the item links on the current page
    async fn scan(&mut self) -> crate::Result<PaginationState> {
        if self.quota.is_exhausted() {
            return Ok(PaginationState::QuotaReached);
        }

        self.pages += 1;
        let links = self.session.query_links(&self.settings.item_link).await?;
        tracing::debug!(
            "Listing {} page {}: {} item links",
            self.listing_url,
            self.pages,
            links.len()
        );

        for link in links {
            let url = match normalize_url(&link) {
                Ok(url) => url,
                Err(e) => {
                    tracing::debug!("Skipping item link {}: {}", link, e);
                    continue;
                }
            };

            let request = CrawlRequest::new(url.as_str(), RequestLabel::Item);
            match self.quota.schedule_item(self.queue, request)? {
                ScheduleOutcome::Scheduled => self.scheduled += 1,
                ScheduleOutcome::Duplicate => {}
                ScheduleOutcome::QuotaReached => {
                    tracing::info!("Item quota reached while scanning {}", self.listing_url);
                    return Ok(PaginationState::QuotaReached);
                }
            }
        }

        Ok(PaginationState::AwaitingNextPage)
    }

    /// Moves to the next page or decides pagination is over
    async fn advance(&mut self) -> crate::Result<PaginationState> {
        let control = self
            .session
            .control_state(&self.settings.next_page, &self.settings.inactive_class)
            .await?;

        match control {
            ControlState::Inactive => return Ok(PaginationState::Done),
            ControlState::Missing => {
                tracing::debug!("No next-page control on {}", self.listing_url);
                return Ok(PaginationState::Done);
            }
            ControlState::Active => {}
        }

        if self.pages >= self.settings.max_pages {
            tracing::warn!(
                "Listing {} still has a next page after {} pages, stopping",
                self.listing_url,
                self.pages
            );
            return Ok(PaginationState::PageLimit);
        }

        self.session.click_control(&self.settings.next_page).await?;
        tokio::time::sleep(self.settings.settle).await;

        let waited = wait_until_hidden(
            &mut *self.session,
            &self.settings.loading,
            self.settings.load_timeout,
            self.settings.poll,
        )
        .await?;

        if waited == WaitOutcome::TimedOut {
            tracing::warn!(
                "Loading indicator on {} did not clear within {:?}, scanning anyway",
                self.listing_url,
                self.settings.load_timeout
            );
        }

        Ok(PaginationState::Scanning)
    }
}
