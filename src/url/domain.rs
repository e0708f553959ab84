use url::Url;

/// Extracts the domain key of a URL
///
/// The domain is the lowercase host with any `www.` prefix removed. A
/// non-default port is kept (`host:port`) so that the domain still names a
/// reachable origin; the sitemap resolver builds `http://{domain}/robots.txt`
/// from it.
///
/// # Returns
///
/// * `Some(String)` - The domain key
/// * `None` - If the URL does not parse or has no host
///
/// # Examples
///
/// ```
/// use driftnet::url::domain_of;
///
/// assert_eq!(domain_of("https://WWW.Example.com/path"), Some("example.com".to_string()));
/// assert_eq!(domain_of("http://127.0.0.1:8080/x"), Some("127.0.0.1:8080".to_string()));
/// assert_eq!(domain_of("nonsense"), None);
/// ```
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    if host.is_empty() {
        return None;
    }

    let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);

    match parsed.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}
