//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry classification
//! - HTML link extraction and sitemap discovery
//! - The polite frontier with per-domain pacing and a global rate limit
//! - Worker tasks and overall crawl coordination

mod coordinator;
mod fetcher;
mod frontier;
mod limiter;
mod parser;
mod sitemap;
#[cfg(test)]
mod testing;
mod worker;

pub use coordinator::{
    load_seeds, run_crawl, Coordinator, CrawlReport, CrawlState, Startup, StopReason,
};
pub use fetcher::{build_http_client, Document, FetchError, Fetcher, HttpFetcher};
pub use frontier::{Admission, Frontier};
pub use limiter::RateLimiter;
pub use parser::{HtmlLinkExtractor, LinkExtractor};
pub use sitemap::{parse_sitemap, sitemaps_from_robots, SitemapEntries, SitemapResolver};
pub use worker::{run_worker, CrawlContext};
