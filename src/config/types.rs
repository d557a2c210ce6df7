use crate::state::RequestLabel;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for Catalog-Crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub input: InputConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub site: SiteConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
}

/// Crawl input: what to crawl and how to shape the output
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    /// Seed URLs, processed in order
    #[serde(rename = "start-urls")]
    pub start_urls: Vec<StartUrl>,

    /// Maximum number of item pages ever scheduled (unbounded when absent or 0)
    #[serde(rename = "max-items", default)]
    pub max_items: Option<u64>,

    /// Opaque options handed to the page client at launch
    #[serde(rename = "proxy-configuration", default)]
    pub proxy_configuration: Option<toml::Table>,

    /// Restricted record transform applied before records are emitted
    #[serde(rename = "extend-output", default)]
    pub extend_output: Option<ExtendOutputConfig>,
}

/// A seed URL with an optional explicit label
#[derive(Debug, Clone, Deserialize)]
pub struct StartUrl {
    pub url: String,

    /// Inferred from the URL shape when absent
    #[serde(default)]
    pub label: Option<RequestLabel>,
}

/// Declarative record transform
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtendOutputConfig {
    /// Record fields to drop
    #[serde(default)]
    pub omit: Vec<String>,

    /// Record fields to rename (old name -> new name)
    #[serde(default)]
    pub rename: BTreeMap<String, String>,

    /// Extra fields added to every item record
    #[serde(default)]
    pub constants: BTreeMap<String, toml::Value>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of requests processed concurrently
    #[serde(rename = "max-concurrency", default = "default_max_concurrency")]
    pub max_concurrency: u32,

    /// Attempts allowed after the first failure of a request
    #[serde(rename = "max-request-retries", default = "default_max_retries")]
    pub max_request_retries: u32,

    /// Crawl-wide cap on finished requests
    #[serde(
        rename = "max-requests-per-crawl",
        default = "default_max_requests_per_crawl"
    )]
    pub max_requests_per_crawl: u64,

    /// Fixed delay after clicking "next page" (milliseconds)
    #[serde(rename = "navigation-settle-ms", default = "default_settle_ms")]
    pub navigation_settle_ms: u64,

    /// Upper bound on waiting for the loading indicator to clear (milliseconds)
    #[serde(rename = "load-timeout-ms", default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,

    /// Polling interval while waiting for the loading indicator (milliseconds)
    #[serde(rename = "wait-poll-ms", default = "default_wait_poll_ms")]
    pub wait_poll_ms: u64,

    /// Maximum number of pages walked for one listing request
    #[serde(rename = "max-listing-pages", default = "default_max_listing_pages")]
    pub max_listing_pages: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_request_retries: default_max_retries(),
            max_requests_per_crawl: default_max_requests_per_crawl(),
            navigation_settle_ms: default_settle_ms(),
            load_timeout_ms: default_load_timeout_ms(),
            wait_poll_ms: default_wait_poll_ms(),
            max_listing_pages: default_max_listing_pages(),
        }
    }
}

/// The catalog site being crawled
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Seeds must live under this origin
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// Path fragment that marks a product page
    #[serde(rename = "item-path-marker", default = "default_item_path_marker")]
    pub item_path_marker: String,

    #[serde(default)]
    pub selectors: SelectorConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            item_path_marker: default_item_path_marker(),
            selectors: SelectorConfig::default(),
        }
    }
}

/// CSS selectors the page client evaluates on the site's markup
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    #[serde(rename = "item-link")]
    pub item_link: String,

    #[serde(rename = "next-page")]
    pub next_page: String,

    /// Class marking the "next page" control as disabled
    #[serde(rename = "inactive-class")]
    pub inactive_class: String,

    pub loading: String,
    pub price: String,
    pub description: String,
    pub color: String,
    pub sizes: String,

    /// Page-level variable holding the brand name
    #[serde(rename = "brand-global")]
    pub brand_global: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            item_link: "a.item_slider.product_link".to_string(),
            next_page: "#bottom-pager .p_next".to_string(),
            inactive_class: "inactive".to_string(),
            loading: ".loading".to_string(),
            price: "#ItemPrice span".to_string(),
            description: "#tabDescriptionContent".to_string(),
            color: "#selectedColorName".to_string(),
            sizes: "#sizeButton li span".to_string(),
            brand_global: "brand".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database holding crawl state and the dataset
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Optional JSON-lines copy of the dataset
    #[serde(rename = "dataset-path", default)]
    pub dataset_path: Option<String>,
}

/// Browser launch configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Explicit browser executable (auto-detected when absent)
    #[serde(default)]
    pub executable: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            executable: None,
        }
    }
}

fn default_max_concurrency() -> u32 {
    5
}

fn default_max_retries() -> u32 {
    2
}

fn default_max_requests_per_crawl() -> u64 {
    1000
}

fn default_settle_ms() -> u64 {
    500
}

fn default_load_timeout_ms() -> u64 {
    10_000
}

fn default_wait_poll_ms() -> u64 {
    100
}

fn default_max_listing_pages() -> u32 {
    500
}

fn default_base_url() -> String {
    "https://www.forever21.com/".to_string()
}

fn default_item_path_marker() -> String {
    "/product/".to_string()
}

fn default_headless() -> bool {
    true
}
