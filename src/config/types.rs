use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for a crawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub governor: GovernorConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Scheduling behavior of the crawl engine
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Number of concurrent workers
    pub workers: u32,

    /// Minimum time between two dispatches to the same domain (milliseconds)
    pub domain_delay_ms: u64,

    /// Admissions allowed per rate window
    pub global_rate: u32,

    /// Length of one rate window (milliseconds)
    pub rate_window_ms: u64,

    /// Maximum seed distance admitted; unlimited when absent
    pub max_depth: Option<u32>,

    /// Maximum number of registered domains; unlimited when absent
    pub max_domains: Option<usize>,

    /// Maximum links taken from one document
    pub links_per_document: usize,

    /// Rescan interval while no domain is eligible (milliseconds)
    pub dispatch_poll_ms: u64,

    /// Write a checkpoint after this many successful documents
    pub checkpoint_every: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 100,
            domain_delay_ms: 10_000,
            global_rate: 200,
            rate_window_ms: 1_000,
            max_depth: None,
            max_domains: None,
            links_per_document: 200,
            dispatch_poll_ms: 50,
            checkpoint_every: 1,
        }
    }
}

impl CrawlerConfig {
    pub fn domain_delay(&self) -> Duration {
        Duration::from_millis(self.domain_delay_ms)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms)
    }

    pub fn dispatch_poll(&self) -> Duration {
        Duration::from_millis(self.dispatch_poll_ms)
    }
}

/// HTTP transport limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FetcherConfig {
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_body_bytes: usize,

    /// Simultaneous requests across all hosts
    pub max_connections: usize,

    /// Simultaneous requests to one host
    pub max_connections_per_host: usize,

    /// Extra attempts for timeouts and connection failures
    pub retry_budget: u32,

    /// Backoff before retry `n` is `n * retry_backoff_ms`
    pub retry_backoff_ms: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 15,
            connect_timeout_secs: 10,
            max_body_bytes: 5 * 1024 * 1024,
            max_connections: 256,
            max_connections_per_host: 4,
            retry_budget: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl FetcherConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// When the supervisory loop stops the crawl
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ShutdownConfig {
    /// Total wall-clock budget
    pub deadline_secs: u64,

    /// How long the frontier must stay idle before the crawl stops
    pub idle_grace_secs: u64,

    /// Supervisory sampling interval (milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            deadline_secs: 600,
            idle_grace_secs: 5,
            poll_interval_ms: 200,
        }
    }
}

impl ShutdownConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn idle_grace(&self) -> Duration {
        Duration::from_secs(self.idle_grace_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Memory and cache ceilings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GovernorConfig {
    pub memory_ceiling_mb: u64,
    pub cache_ceiling_mb: u64,
    pub cache_dir: PathBuf,

    /// Store fetched HTML bodies under `cache_dir`
    pub cache_pages: bool,

    /// Minimum interval between two resource samples (milliseconds)
    pub sample_interval_ms: u64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            memory_ceiling_mb: 4096,
            cache_ceiling_mb: 1024,
            cache_dir: PathBuf::from("./crawler_build/cache"),
            cache_pages: false,
            sample_interval_ms: 1_000,
        }
    }
}

impl GovernorConfig {
    pub fn memory_ceiling_bytes(&self) -> u64 {
        self.memory_ceiling_mb.saturating_mul(1024 * 1024)
    }

    pub fn cache_ceiling_bytes(&self) -> u64 {
        self.cache_ceiling_mb.saturating_mul(1024 * 1024)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

/// Where state and inputs live on disk
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite checkpoint database
    pub database_path: PathBuf,

    /// Line-oriented seed URL list
    pub seeds_path: PathBuf,

    /// Maximum number of error records retained
    pub error_log_cap: usize,

    /// Telemetry report period (seconds)
    pub report_interval_secs: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./crawler_build/crawl.db"),
            seeds_path: PathBuf::from("startsearch.txt"),
            error_log_cap: 10_000,
            report_interval_secs: 10,
        }
    }
}

impl OutputConfig {
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}

impl Config {
    /// Builds a configuration with defaults everywhere except the user agent
    pub fn with_user_agent(user_agent: UserAgentConfig) -> Self {
        Self {
            crawler: CrawlerConfig::default(),
            fetcher: FetcherConfig::default(),
            user_agent,
            shutdown: ShutdownConfig::default(),
            governor: GovernorConfig::default(),
            output: OutputConfig::default(),
        }
    }
}
