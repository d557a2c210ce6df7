use url::Url;

/// Extracts the domain from a URL
///
/// The host is lowercased and a leading `www.` is dropped, so that
/// `www.example.com` and `example.com` compare equal.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use catalog_crawler::url::extract_domain;
///
/// let url = Url::parse("https://WWW.Example.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| {
        let host = h.to_lowercase();
        match host.strip_prefix("www.") {
            Some(rest) => rest.to_string(),
            None => host,
        }
    })
}

/// Returns true if both URLs point at the same site
pub fn same_site(url: &Url, base: &Url) -> bool {
    match (extract_domain(url), extract_domain(base)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
