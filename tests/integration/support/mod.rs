//! Scripted catalog site used by the integration tests

use async_trait::async_trait;
use catalog_crawler::page::{ControlState, PageClient, PageError, PageResult, PageSession};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const BASE: &str = "https://www.forever21.com/us/shop/catalog";

pub fn listing_url(name: &str) -> String {
    format!("{}/category/f21/{}", BASE, name)
}

pub fn item_url(id: usize) -> String {
    format!("{}/product/f21/top/{}", BASE, id)
}

pub fn item_urls(ids: impl IntoIterator<Item = usize>) -> Vec<String> {
    ids.into_iter().map(item_url).collect()
}

/// A fake catalog: listings with fixed pages of item links, and item pages
/// that may fail a scripted number of times before loading
#[derive(Default)]
pub struct MockSite {
    listings: HashMap<String, Vec<Vec<String>>>,
    failures: Mutex<HashMap<String, u32>>,
    opened: Mutex<Vec<String>>,
    clicks: Arc<AtomicUsize>,
}

impl MockSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listing whose next control turns inactive on the last page
    pub fn with_listing(mut self, name: &str, pages: Vec<Vec<String>>) -> Self {
        self.listings.insert(listing_url(name), pages);
        self
    }

    /// Makes the page at `url` fail to load `times` times
    pub fn failing(self, url: &str, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(url.to_string(), times);
        self
    }

    /// Every URL opened so far, in order
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn clicks(&self) -> usize {
        self.clicks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageClient for MockSite {
    async fn open(&self, url: &str) -> PageResult<Box<dyn PageSession>> {
        self.opened.lock().unwrap().push(url.to_string());

        if let Some(remaining) = self.failures.lock().unwrap().get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(PageError::Navigation {
                    url: url.to_string(),
                    message: "net::ERR_CONNECTION_RESET".to_string(),
                });
            }
        }

        if let Some(pages) = self.listings.get(url) {
            return Ok(Box::new(ListingPage {
                pages: pages.clone(),
                current: 0,
                clicks: self.clicks.clone(),
            }));
        }

        if url.contains("/product/") {
            let id = url.rsplit('/').next().unwrap_or_default().to_string();
            return Ok(Box::new(ItemPage { id }));
        }

        Err(PageError::Navigation {
            url: url.to_string(),
            message: "404".to_string(),
        })
    }
}

struct ListingPage {
    pages: Vec<Vec<String>>,
    current: usize,
    clicks: Arc<AtomicUsize>,
}

impl ListingPage {
    fn on_last_page(&self) -> bool {
        self.current + 1 >= self.pages.len()
    }
}

#[async_trait]
impl PageSession for ListingPage {
    async fn title(&mut self) -> PageResult<String> {
        Ok("Women | Forever 21".to_string())
    }

    async fn query_links(&mut self, _selector: &str) -> PageResult<Vec<String>> {
        Ok(self.pages.get(self.current).cloned().unwrap_or_default())
    }

    async fn control_state(&mut self, _selector: &str, _class: &str) -> PageResult<ControlState> {
        if self.on_last_page() {
            Ok(ControlState::Inactive)
        } else {
            Ok(ControlState::Active)
        }
    }

    async fn click_control(&mut self, selector: &str) -> PageResult<()> {
        if self.on_last_page() {
            return Err(PageError::ControlNotFound(selector.to_string()));
        }
        self.clicks.fetch_add(1, Ordering::SeqCst);
        self.current += 1;
        Ok(())
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

    async fn read_global(&mut self, _name: &str) -> PageResult<Value> {
        Ok(Value::Null)
    }

    async fn close(self: Box<Self>) -> PageResult<()> {
        Ok(())
    }
}

struct ItemPage {
    id: String,
}

#[async_trait]
impl PageSession for ItemPage {
    async fn title(&mut self) -> PageResult<String> {
        Ok(format!("Top {} | Forever 21", self.id))
    }

    async fn query_links(&mut self, _selector: &str) -> PageResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn control_state(&mut self, _selector: &str, _class: &str) -> PageResult<ControlState> {
        Ok(ControlState::Missing)
    }

    async fn click_control(&mut self, selector: &str) -> PageResult<()> {
        Err(PageError::ControlNotFound(selector.to_string()))
    }

    async fn is_visible(&mut self, _selector: &str) -> PageResult<bool> {
        Ok(false)
    }

    async fn query_text(&mut self, selector: &str) -> PageResult<String> {
        Ok(match selector {
            "#ItemPrice span" => "$14.99".to_string(),
            "#selectedColorName" => "Black".to_string(),
            _ => format!("Description of {}", self.id),
        })
    }

    async fn query_all_text(&mut self, _selector: &str) -> PageResult<Vec<String>> {
        Ok(vec!["S".to_string(), "M".to_string()])
    }

    async fn read_global(&mut self, _name: &str) -> PageResult<Value> {
        Ok(Value::String("F21".to_string()))
    }

    async fn close(self: Box<Self>) -> PageResult<()> {
        Ok(())
    }
}
