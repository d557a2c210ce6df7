use crate::UrlError;
use url::Url;

/// Normalizes a URL so it can serve as a request identity key
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Require an http or https scheme
/// 3. Require a host
/// 4. Remove the fragment (everything after #)
///
/// Path, query and host spelling are kept as-is: the catalog site encodes
/// product identity in them.
///
/// # Examples
///
/// ```
/// use catalog_crawler::url::normalize_url;
///
/// let url = normalize_url("https://www.forever21.com/us/shop/catalog/product/f21/top/1#reviews").unwrap();
/// assert_eq!(url.as_str(), "https://www.forever21.com/us/shop/catalog/product/f21/top/1");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain);
    }

    url.set_fragment(None);

    Ok(url)
}
