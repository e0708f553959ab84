//! Sitemap discovery
//!
//! For every domain the resolver runs once: it reads `Sitemap:` lines from
//! robots.txt (HTTPS, then HTTP), adds the well-known sitemap locations and
//! expands each sitemap document. `<loc>` entries that name another sitemap
//! (`.xml` or `.xml.gz`) are expanded in turn; every other entry is admitted
//! to the frontier at depth 0.
//!
//! Discovery is best-effort. Fetch failures, empty bodies, bad gzip and
//! malformed XML are skipped without touching the error log.

use crate::crawler::fetcher::Fetcher;
use crate::crawler::frontier::Frontier;
use crate::url::normalize;
use flate2::read::GzDecoder;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::collections::{HashSet, VecDeque};
use std::io::Read;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use url::Url;

/// Well-known sitemap paths tried on both schemes
const WELL_KNOWN_PATHS: &[&str] = &[
    "/sitemap.xml",
    "/sitemap_index.xml",
    "/sitemap.xml.gz",
    "/sitemap_index.xml.gz",
];

/// Largest decompressed sitemap accepted (the sitemap protocol limit)
const MAX_SITEMAP_BYTES: u64 = 50 * 1024 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// `<loc>` entries of one sitemap document, split by kind
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SitemapEntries {
    /// Content URLs
    pub pages: Vec<String>,
    /// Nested sitemap documents
    pub sitemaps: Vec<String>,
}

/// Discovers and expands sitemaps, feeding their URLs to the frontier
pub struct SitemapResolver {
    fetcher: Arc<dyn Fetcher>,
    /// Domains whose discovery has started
    attempted: Mutex<HashSet<String>>,
    /// Sitemap URL keys already fetched
    processed: Mutex<HashSet<String>>,
}

impl SitemapResolver {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            attempted: Mutex::new(HashSet::new()),
            processed: Mutex::new(HashSet::new()),
        }
    }

    /// Runs sitemap discovery for `domain` unless it already ran
    ///
    /// Stops early once `shutdown` reads true.
    ///
    /// # Returns
    ///
    /// The number of URLs admitted to the frontier
    pub async fn ensure(
        &self,
        domain: &str,
        frontier: &Frontier,
        shutdown: &watch::Receiver<bool>,
    ) -> usize {
        let first = self
            .attempted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(domain.to_string());
        if !first {
            return 0;
        }

        let mut candidates = Vec::new();
        for scheme in ["https", "http"] {
            let robots = format!("{}://{}/robots.txt", scheme, domain);
            if let Ok(bytes) = self.fetcher.fetch_bytes(&robots).await {
                candidates.extend(sitemaps_from_robots(&String::from_utf8_lossy(&bytes), &robots));
            }
        }
        for scheme in ["https", "http"] {
            for path in WELL_KNOWN_PATHS {
                candidates.push(format!("{}://{}{}", scheme, domain, path));
            }
        }

        let admitted = self.resolve(candidates, frontier, shutdown).await;
        if admitted > 0 {
            tracing::info!("Sitemaps for {} added {} URLs", domain, admitted);
        }
        admitted
    }

    /// Expands the given sitemap URLs and everything they reference
    ///
    /// Each sitemap key is fetched at most once per resolver, so index cycles
    /// terminate.
    pub async fn resolve(
        &self,
        roots: Vec<String>,
        frontier: &Frontier,
        shutdown: &watch::Receiver<bool>,
    ) -> usize {
        let mut pending: VecDeque<String> = roots.into();
        let mut admitted = 0;

        while let Some(candidate) = pending.pop_front() {
            if *shutdown.borrow() {
                break;
            }

            let key = normalize(&candidate);
            if key.is_empty() || !self.mark_processed(&key) {
                continue;
            }

            let Some(xml) = self.fetch_sitemap(&key).await else {
                continue;
            };
            let entries = parse_sitemap(&xml);
            tracing::debug!(
                "Sitemap {}: {} pages, {} nested",
                key,
                entries.pages.len(),
                entries.sitemaps.len()
            );

            for page in &entries.pages {
                if *shutdown.borrow() {
                    return admitted;
                }
                if frontier.admit(page, 0).await.is_admitted() {
                    admitted += 1;
                }
            }
            pending.extend(entries.sitemaps);
        }

        admitted
    }

    fn mark_processed(&self, key: &str) -> bool {
        self.processed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string())
    }

    async fn fetch_sitemap(&self, url: &str) -> Option<String> {
        let bytes = match self.fetcher.fetch_bytes(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::trace!("Sitemap {} unavailable: {}", url, e);
                return None;
            }
        };
        if bytes.is_empty() {
            return None;
        }

        // The transport may already have removed a gzip content-encoding
        let text = if bytes.starts_with(&GZIP_MAGIC) {
            decompress(&bytes)?
        } else {
            String::from_utf8_lossy(&bytes).into_owned()
        };

        (!text.trim().is_empty()).then_some(text)
    }
}

fn decompress(bytes: &[u8]) -> Option<String> {
    let mut out = Vec::new();
    GzDecoder::new(bytes)
        .take(MAX_SITEMAP_BYTES)
        .read_to_end(&mut out)
        .ok()?;
    Some(String::from_utf8_lossy(&out).into_owned())
}

/// Collects `Sitemap:` directives from a robots.txt body
///
/// Directive names match case-insensitively; relative values resolve
/// against the robots.txt URL.
pub fn sitemaps_from_robots(body: &str, robots_url: &str) -> Vec<String> {
    let base = Url::parse(robots_url).ok();

    body.lines()
        .filter_map(|line| {
            let line = line.trim();
            let (name, value) = line.split_once(':')?;
            if !name.trim().eq_ignore_ascii_case("sitemap") {
                return None;
            }
            let value = value.trim();
            if value.is_empty() {
                return None;
            }
            match &base {
                Some(base) => base.join(value).ok().map(String::from),
                None => Some(value.to_string()),
            }
        })
        .collect()
}

/// Extracts `<loc>` entries from a sitemap or sitemap index
///
/// Element names match on their local part, case-insensitively, so
/// namespaced documents work. Malformed XML yields no entries at all.
pub fn parse_sitemap(xml: &str) -> SitemapEntries {
    let mut reader = Reader::from_str(xml);
    let mut entries = SitemapEntries::default();
    let mut in_loc = false;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if e.local_name().as_ref().eq_ignore_ascii_case(b"loc") {
                    in_loc = true;
                    text.clear();
                }
            }
            Ok(Event::Text(ref e)) if in_loc => match e.unescape() {
                Ok(value) => text.push_str(&value),
                Err(_) => return SitemapEntries::default(),
            },
            Ok(Event::CData(ref e)) if in_loc => {
                text.push_str(&String::from_utf8_lossy(e));
            }
            Ok(Event::End(ref e)) => {
                if in_loc && e.local_name().as_ref().eq_ignore_ascii_case(b"loc") {
                    in_loc = false;
                    let loc = text.trim();
                    if loc.ends_with(".xml") || loc.ends_with(".xml.gz") {
                        entries.sitemaps.push(loc.to_string());
                    } else if !loc.is_empty() {
                        entries.pages.push(loc.to_string());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::trace!("Malformed sitemap at {}: {}", reader.buffer_position(), e);
                return SitemapEntries::default();
            }
        }
    }

    entries
}
