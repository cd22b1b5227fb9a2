use crate::ItemError;
use url::Url;

/// Parses and canonicalizes a work item target
///
/// # Canonicalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Accept only `http` and `https`
/// 3. Remove the fragment (never sent on the wire)
/// 4. Sort query parameters so equivalent targets fingerprint identically
/// 5. Remove an empty query string (trailing ?)
///
/// # Examples
///
/// ```
/// use tidepool::item::parse_target;
///
/// let url = parse_target("https://example.com/list?page=2&lang=en#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/list?lang=en&page=2");
/// ```
pub fn parse_target(target: &str) -> Result<Url, ItemError> {
    let mut url = Url::parse(target)?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ItemError::InvalidScheme(format!(
            "Only HTTP and HTTPS targets are supported, got: {}",
            url.scheme()
        )));
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        params.sort();

        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}
