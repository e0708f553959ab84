use url::Url;

/// Normalizes a URL into a frontier key
///
/// # Normalization Steps
///
/// 1. Trim surrounding whitespace
/// 2. Remove the fragment (everything from the first `#`)
/// 3. Remove trailing slashes
/// 4. Reject anything that is not an absolute HTTP(S) URL with a host
///
/// Case and percent-encoding are left untouched, so `http://A.test/x` and
/// `http://a.test/x` are different keys. Rejected input yields an empty key,
/// which every caller treats as "skip".
///
/// All trailing slashes are removed rather than just one so that applying
/// the function twice gives the same key as applying it once.
///
/// # Examples
///
/// ```
/// use driftnet::url::normalize;
///
/// assert_eq!(normalize("https://example.com/page/#top"), "https://example.com/page");
/// assert_eq!(normalize("mailto:someone@example.com"), "");
/// ```
pub fn normalize(url_str: &str) -> String {
    let trimmed = url_str.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let without_fragment = match trimmed.find('#') {
        Some(idx) => &trimmed[..idx],
        None => trimmed,
    };

    let key = without_fragment.trim_end_matches('/');

    if !is_fetchable(key) {
        return String::new();
    }

    key.to_string()
}

/// Checks that a candidate key parses as an HTTP(S) URL with a host
fn is_fetchable(key: &str) -> bool {
    match Url::parse(key) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().map(|h| !h.is_empty()).unwrap_or(false)
        }
        Err(_) => false,
    }
}
