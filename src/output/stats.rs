//! Statistics from the checkpoint database
//!
//! Backs the `--stats` mode: reads the last checkpoint and the persisted
//! error log without starting a crawl.

use crate::state::{ErrorKind, ErrorRecord};
use crate::storage::{Checkpoint, CheckpointStore, StorageResult};
use crate::url::domain_of;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Number of domains listed in the top-domains table
const TOP_DOMAINS: usize = 10;

/// Crawl statistics summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlStatistics {
    /// URLs waiting in the frontier (including ones in flight at save time)
    pub queued: usize,

    pub visited: usize,

    pub found: usize,

    /// Distinct domains among found URLs
    pub unique_domains: usize,

    /// Domains with the most found URLs, largest first
    pub top_domains: Vec<(String, usize)>,

    /// Error records per kind, largest first
    pub errors_by_kind: Vec<(ErrorKind, usize)>,

    pub config_hash: Option<String>,

    pub saved_at: Option<DateTime<Utc>>,
}

impl CrawlStatistics {
    /// Summarizes a checkpoint and an error log
    pub fn from_parts(checkpoint: &Checkpoint, errors: &[ErrorRecord]) -> Self {
        let mut per_domain: HashMap<String, usize> = HashMap::new();
        for url in &checkpoint.found {
            if let Some(domain) = domain_of(url) {
                *per_domain.entry(domain).or_insert(0) += 1;
            }
        }
        let unique_domains = per_domain.len();

        let mut top_domains: Vec<_> = per_domain.into_iter().collect();
        top_domains.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_domains.truncate(TOP_DOMAINS);

        let mut per_kind: HashMap<ErrorKind, usize> = HashMap::new();
        for record in errors {
            *per_kind.entry(record.kind).or_insert(0) += 1;
        }
        let mut errors_by_kind: Vec<_> = per_kind.into_iter().collect();
        errors_by_kind.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| a.0.to_db_string().cmp(&b.0.to_db_string()))
        });

        Self {
            queued: checkpoint.queued.len(),
            visited: checkpoint.visited.len(),
            found: checkpoint.found.len(),
            unique_domains,
            top_domains,
            errors_by_kind,
            config_hash: checkpoint.config_hash.clone(),
            saved_at: checkpoint.saved_at,
        }
    }

    pub fn total_errors(&self) -> usize {
        self.errors_by_kind.iter().map(|(_, count)| count).sum()
    }
}

/// Loads statistics from storage
///
/// # Returns
///
/// * `Ok(Some(CrawlStatistics))` - A checkpoint exists
/// * `Ok(None)` - Nothing has been saved yet
/// * `Err(StorageError)` - The database could not be read
pub fn load_statistics(store: &dyn CheckpointStore) -> StorageResult<Option<CrawlStatistics>> {
    let Some(checkpoint) = store.load()? else {
        return Ok(None);
    };
    let errors = store.load_errors()?;
    Ok(Some(CrawlStatistics::from_parts(&checkpoint, &errors)))
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Checkpoint:");
    match stats.saved_at {
        Some(saved_at) => println!("  Saved at: {}", saved_at.to_rfc3339()),
        None => println!("  Saved at: unknown"),
    }
    if let Some(hash) = &stats.config_hash {
        println!("  Config hash: {}", hash);
    }
    println!();

    println!("Frontier:");
    println!("  Queued: {}", stats.queued);
    println!("  Visited: {}", stats.visited);
    println!("  Found: {}", stats.found);
    println!("  Unique domains: {}", stats.unique_domains);
    println!();

    if !stats.top_domains.is_empty() {
        println!("Top Domains:");
        for (domain, count) in &stats.top_domains {
            println!("  {:>8}  {}", count, domain);
        }
        println!();
    }

    let total_errors = stats.total_errors();
    if total_errors > 0 {
        println!("Errors ({}):", total_errors);
        for (kind, count) in &stats.errors_by_kind {
            let percentage = (*count as f64 / total_errors as f64) * 100.0;
            println!("  {}: {} ({:.1}%)", kind, count, percentage);
        }
        println!();
    }

    let completion = if stats.found > 0 {
        (stats.visited as f64 / stats.found as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "Visited {:.1}% of found URLs ({} / {})",
        completion, stats.visited, stats.found
    );
}
