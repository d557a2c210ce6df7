//! URL handling module for Catalog-Crawler
//!
//! This module provides URL normalization, site matching, label inference
//! and item identifier derivation.

mod domain;
mod normalize;

use crate::config::SiteConfig;
use crate::state::RequestLabel;
use ::url::Url;

// Re-export main functions
pub use domain::{extract_domain, same_site};
pub use normalize::normalize_url;

/// Returns true if the URL belongs to the configured catalog site
///
/// # Examples
///
/// ```
/// use catalog_crawler::config::SiteConfig;
/// use catalog_crawler::url::{is_supported_url, normalize_url};
///
/// let site = SiteConfig::default();
/// let url = normalize_url("https://www.forever21.com/us/shop/catalog/category/f21/women").unwrap();
/// assert!(is_supported_url(&url, &site));
///
/// let url = normalize_url("https://example.com/x").unwrap();
/// assert!(!is_supported_url(&url, &site));
/// ```
pub fn is_supported_url(url: &Url, site: &SiteConfig) -> bool {
    match Url::parse(&site.base_url) {
        Ok(base) => same_site(url, &base),
        Err(_) => false,
    }
}

/// Infers the label of a seed URL from its shape
///
/// URLs containing the site's item path marker are product pages, all
/// others are treated as listings.
pub fn infer_label(url: &Url, site: &SiteConfig) -> RequestLabel {
    if url.as_str().contains(&site.item_path_marker) {
        RequestLabel::Item
    } else {
        RequestLabel::Listing
    }
}

/// Derives an item identifier from the trailing path segment of a URL
///
/// A trailing slash is ignored, so `/product/f21/top/123/` yields `123`.
/// Returns an empty string when the URL has no path segments.
pub fn item_id_from_url(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };

    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}
