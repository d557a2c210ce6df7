use crate::config::types::{
    Config, CrawlerConfig, ExtendOutputConfig, InputConfig, OutputConfig, SiteConfig,
};
use crate::output::{DEBUG_FIELD, ITEM_RECORD_FIELDS};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_input_config(&config.input)?;
    validate_crawler_config(&config.crawler)?;
    validate_site_config(&config.site)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates seeds, quota and the output extension
fn validate_input_config(config: &InputConfig) -> Result<(), ConfigError> {
    if config.start_urls.is_empty() {
        return Err(ConfigError::Validation(
            "start-urls must contain at least one url".to_string(),
        ));
    }

    for start in &config.start_urls {
        let url = Url::parse(&start.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid start URL '{}': {}", start.url, e))
        })?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConfigError::Validation(format!(
                "Start URL '{}' must use http or https",
                start.url
            )));
        }
    }

    if let Some(extend) = &config.extend_output {
        validate_extend_output(extend)?;
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrency < 1 || config.max_concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "max-concurrency must be between 1 and 100, got {}",
            config.max_concurrency
        )));
    }

    if config.max_requests_per_crawl < 1 {
        return Err(ConfigError::Validation(format!(
            "max-requests-per-crawl must be >= 1, got {}",
            config.max_requests_per_crawl
        )));
    }

    if config.wait_poll_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "wait-poll-ms must be >= 10ms, got {}ms",
            config.wait_poll_ms
        )));
    }

    if config.max_listing_pages < 1 {
        return Err(ConfigError::Validation(
            "max-listing-pages must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the site description
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let base = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if base.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' has no host",
            config.base_url
        )));
    }

    if config.item_path_marker.is_empty() {
        return Err(ConfigError::Validation(
            "item-path-marker cannot be empty".to_string(),
        ));
    }

    let selectors = &config.selectors;
    for (name, value) in [
        ("item-link", &selectors.item_link),
        ("next-page", &selectors.next_page),
        ("inactive-class", &selectors.inactive_class),
        ("loading", &selectors.loading),
        ("price", &selectors.price),
        ("description", &selectors.description),
        ("color", &selectors.color),
        ("sizes", &selectors.sizes),
        ("brand-global", &selectors.brand_global),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "selector '{}' cannot be empty",
                name
            )));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if matches!(&config.dataset_path, Some(path) if path.is_empty()) {
        return Err(ConfigError::Validation(
            "dataset-path cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates the declarative record transform
///
/// Only known record fields may be omitted or renamed, `#debug` is never
/// touched, and the resulting field names must not collide.
pub(crate) fn validate_extend_output(config: &ExtendOutputConfig) -> Result<(), ConfigError> {
    let known = |field: &str| ITEM_RECORD_FIELDS.contains(&field);

    for field in &config.omit {
        if !known(field) {
            return Err(ConfigError::InvalidExtension(format!(
                "cannot omit unknown field '{}'",
                field
            )));
        }
    }

    let mut produced: HashSet<&str> = ITEM_RECORD_FIELDS
        .iter()
        .copied()
        .filter(|f| !config.omit.iter().any(|o| o.as_str() == *f) && !config.rename.contains_key(*f))
        .collect();
    produced.insert(DEBUG_FIELD);

    for (from, to) in &config.rename {
        if !known(from) {
            return Err(ConfigError::InvalidExtension(format!(
                "cannot rename unknown field '{}'",
                from
            )));
        }
        if config.omit.contains(from) {
            return Err(ConfigError::InvalidExtension(format!(
                "field '{}' is both omitted and renamed",
                from
            )));
        }
        if to.trim().is_empty() {
            return Err(ConfigError::InvalidExtension(format!(
                "rename target for '{}' cannot be empty",
                from
            )));
        }
        if !produced.insert(to.as_str()) {
            return Err(ConfigError::InvalidExtension(format!(
                "rename target '{}' collides with another field",
                to
            )));
        }
    }

    for key in config.constants.keys() {
        if key.trim().is_empty() {
            return Err(ConfigError::InvalidExtension(
                "constant field name cannot be empty".to_string(),
            ));
        }
        if !produced.insert(key.as_str()) {
            return Err(ConfigError::InvalidExtension(format!(
                "constant '{}' collides with another field",
                key
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn extend(omit: &[&str], rename: &[(&str, &str)], constants: &[&str]) -> ExtendOutputConfig {
        ExtendOutputConfig {
            omit: omit.iter().map(|s| s.to_string()).collect(),
            rename: rename
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            constants: constants
                .iter()
                .map(|k| (k.to_string(), toml::Value::String("x".to_string())))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn test_valid_extension() {
        assert!(validate_extend_output(&extend(&["sizes"], &[("price", "cost")], &["shop"])).is_ok());
        assert!(validate_extend_output(&ExtendOutputConfig::default()).is_ok());
    }

    #[test]
    fn test_extension_rejects_unknown_fields() {
        assert!(validate_extend_output(&extend(&["weight"], &[], &[])).is_err());
        assert!(validate_extend_output(&extend(&[], &[("weight", "mass")], &[])).is_err());
    }

    #[test]
    fn test_extension_never_touches_debug() {
        assert!(validate_extend_output(&extend(&["#debug"], &[], &[])).is_err());
        assert!(validate_extend_output(&extend(&[], &[("title", "#debug")], &[])).is_err());
        assert!(validate_extend_output(&extend(&[], &[], &["#debug"])).is_err());
    }

    #[test]
    fn test_extension_rejects_collisions() {
        assert!(validate_extend_output(&extend(&[], &[("price", "title")], &[])).is_err());
        assert!(validate_extend_output(&extend(&[], &[], &["brand"])).is_err());
        assert!(validate_extend_output(&extend(&["brand"], &[], &["brand"])).is_ok());
        assert!(validate_extend_output(&extend(&["color"], &[("color", "hue")], &[])).is_err());
    }
}
