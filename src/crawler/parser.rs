//! HTML link extraction
//!
//! This module turns a fetched document into the candidate URLs it points to.
//! Links are taken from:
//! - `<a href>` and `<link href>`
//! - `<script src>` and `<img src>`
//! - `<form action>` and `<button formaction>`

use crate::url::normalize;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Selector and attribute pairs scanned for links
const LINK_SOURCES: &[(&str, &str)] = &[
    ("a[href]", "href"),
    ("link[href]", "href"),
    ("script[src]", "src"),
    ("img[src]", "src"),
    ("form[action]", "action"),
    ("button[formaction]", "formaction"),
];

/// Link extraction capability consumed by workers
pub trait LinkExtractor: Send + Sync {
    /// Returns normalized absolute URLs found in `body`
    ///
    /// The result is de-duplicated and bounded in size. An error means the
    /// document could not be parsed at all.
    fn extract(&self, body: &str, base_url: &str) -> Result<Vec<String>, String>;
}

/// [`LinkExtractor`] backed by `scraper`
#[derive(Debug, Clone)]
pub struct HtmlLinkExtractor {
    limit: usize,
}

impl HtmlLinkExtractor {
    /// Creates an extractor returning at most `limit` links per document
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl Default for HtmlLinkExtractor {
    fn default() -> Self {
        Self::new(200)
    }
}

impl LinkExtractor for HtmlLinkExtractor {
    /// Extracts links in document order
    ///
    /// # Arguments
    ///
    /// * `body` - The HTML content to parse
    /// * `base_url` - The URL relative links are resolved against
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<String>)` - Normalized, de-duplicated links, first occurrence kept
    /// * `Err(String)` - The base URL is not a valid absolute URL
    ///
    /// # Example
    ///
    /// ```no_run
    /// use driftnet::crawler::{HtmlLinkExtractor, LinkExtractor};
    ///
    /// let html = r#"<html><body><a href="/page">Link</a></body></html>"#;
    /// let links = HtmlLinkExtractor::default()
    ///     .extract(html, "https://example.com/")
    ///     .unwrap();
    /// assert_eq!(links, vec!["https://example.com/page".to_string()]);
    /// ```
    fn extract(&self, body: &str, base_url: &str) -> Result<Vec<String>, String> {
        let base = Url::parse(base_url).map_err(|e| format!("invalid base URL {}: {}", base_url, e))?;
        let document = Html::parse_document(body);

        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for (selector, attr) in LINK_SOURCES {
            let selector =
                Selector::parse(selector).map_err(|e| format!("bad selector {}: {:?}", selector, e))?;

            for element in document.select(&selector) {
                if links.len() >= self.limit {
                    return Ok(links);
                }

                let Some(value) = element.value().attr(attr) else {
                    continue;
                };
                let Some(absolute) = resolve_link(value, &base) else {
                    continue;
                };

                let key = normalize(&absolute);
                if !key.is_empty() && seen.insert(key.clone()) {
                    links.push(key);
                }
            }
        }

        Ok(links)
    }
}

/// Resolves a link to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute.to_string()),
        _ => None,
    }
}
