//! Item extraction
//!
//! Site-specific field scraping sits behind `ItemScraper`; the extractor
//! adds the title and the item id and emits the record.

use crate::config::SelectorConfig;
use crate::output::{Dataset, DebugInfo, ItemRecord};
use crate::page::{PageResult, PageSession};
use crate::state::CrawlRequest;
use crate::url::item_id_from_url;
use async_trait::async_trait;
use std::sync::Arc;

/// Product fields read from a loaded item page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapedFields {
    pub brand: Option<String>,
    pub price: String,
    pub description: String,
    pub color: String,
    pub sizes: Vec<String>,
}

/// Reads product fields from an item page
#[async_trait]
pub trait ItemScraper: Send + Sync {
    async fn scrape(&self, session: &mut dyn PageSession) -> PageResult<ScrapedFields>;
}

/// Scrapes fields with the configured selectors
pub struct SelectorScraper {
    selectors: SelectorConfig,
}

impl SelectorScraper {
    pub fn new(selectors: SelectorConfig) -> Self {
        Self { selectors }
    }
}

#[async_trait]
impl ItemScraper for SelectorScraper {
    async fn scrape(&self, session: &mut dyn PageSession) -> PageResult<ScrapedFields> {
        let brand = match session.read_global(&self.selectors.brand_global).await? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        };

        Ok(ScrapedFields {
            brand,
            price: session.query_text(&self.selectors.price).await?,
            description: session.query_text(&self.selectors.description).await?,
            color: session.query_text(&self.selectors.color).await?,
            sizes: session.query_all_text(&self.selectors.sizes).await?,
        })
    }
}

/// Turns loaded item pages into dataset records
#[derive(Clone)]
pub struct ItemExtractor {
    scraper: Arc<dyn ItemScraper>,
    dataset: Arc<Dataset>,
}

impl ItemExtractor {
    pub fn new(scraper: Arc<dyn ItemScraper>, dataset: Arc<Dataset>) -> Self {
        Self { scraper, dataset }
    }

    /// Builds the record for a loaded item page
    pub async fn extract(
        &self,
        session: &mut dyn PageSession,
        request: &CrawlRequest,
    ) -> crate::Result<ItemRecord> {
        let title = session.title().await?;
        tracing::debug!("Title of {}: {}", request.url, title);

        let fields = self.scraper.scrape(session).await?;

        Ok(ItemRecord {
            title,
            item_id: item_id_from_url(&request.url),
            brand: fields.brand,
            price: fields.price,
            description: fields.description,
            color: fields.color,
            sizes: fields.sizes,
            debug: DebugInfo::from(request),
        })
    }

    /// Extracts the record and emits it to the dataset
    pub async fn process(
        &self,
        session: &mut dyn PageSession,
        request: &CrawlRequest,
    ) -> crate::Result<()> {
        let record = self.extract(session, request).await?;
        self.dataset.push_item(&record)?;
        Ok(())
    }
}
