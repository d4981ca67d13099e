use crate::config::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level engine configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub crawler: CrawlConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    /// Seed URLs used by the command-line runner
    #[serde(default)]
    pub seeds: Vec<String>,
}

/// How robots.txt decisions are applied to a crawl
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobotsMode {
    /// Fetch robots.txt and skip disallowed URLs
    #[default]
    Respect,
    /// Never fetch robots.txt; every URL is allowed
    Ignore,
}

/// Per-job crawl configuration
///
/// Every field has a default from [`defaults`], so a partial TOML table (or
/// an empty one) deserializes into a usable configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlConfig {
    /// Maximum link depth from the seed URL
    pub max_depth: u32,

    /// Maximum number of URLs admitted to the frontier
    pub max_urls: usize,

    /// Minimum seconds between requests to the same host
    pub delay: f64,

    /// Number of concurrent fetch workers
    pub concurrency: usize,

    /// Request timeout in seconds
    pub timeout: u64,

    /// Retry budget for network errors and 5xx responses
    pub retries: u32,

    /// Base retry backoff in milliseconds
    pub retry_backoff_ms: u64,

    pub follow_redirects: bool,

    /// Whether external links are enqueued for crawling
    pub crawl_external: bool,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Agent token used when evaluating robots.txt groups
    pub robots_user_agent: String,

    pub accept_language: String,

    pub respect_robots: bool,

    pub robots_mode: RobotsMode,

    pub include_extensions: Vec<String>,

    pub exclude_extensions: Vec<String>,

    /// Regular expressions a URL must match (any) to be crawled
    pub include_patterns: Vec<String>,

    /// Regular expressions that exclude a URL from crawling
    pub exclude_patterns: Vec<String>,

    /// Bodies larger than this many bytes are not analyzed
    pub max_file_size: u64,

    /// Resident memory budget in bytes
    pub memory_limit: u64,

    /// Glob/prefix patterns hiding issues at read time
    pub issue_exclusion_patterns: Vec<String>,

    /// Pages recorded between checkpoint flushes
    pub checkpoint_interval: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: defaults::MAX_DEPTH,
            max_urls: defaults::MAX_URLS,
            delay: defaults::DELAY_SECS,
            concurrency: defaults::CONCURRENCY,
            timeout: defaults::TIMEOUT_SECS,
            retries: defaults::RETRIES,
            retry_backoff_ms: defaults::RETRY_BACKOFF_MS,
            follow_redirects: true,
            crawl_external: false,
            user_agent: defaults::USER_AGENT.to_string(),
            robots_user_agent: defaults::ROBOTS_USER_AGENT.to_string(),
            accept_language: defaults::ACCEPT_LANGUAGE.to_string(),
            respect_robots: true,
            robots_mode: RobotsMode::Respect,
            include_extensions: defaults::string_list(defaults::INCLUDE_EXTENSIONS),
            exclude_extensions: defaults::string_list(defaults::EXCLUDE_EXTENSIONS),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            max_file_size: defaults::MAX_FILE_SIZE,
            memory_limit: defaults::MEMORY_LIMIT,
            issue_exclusion_patterns: defaults::default_issue_exclusion_patterns(),
            checkpoint_interval: defaults::CHECKPOINT_INTERVAL,
        }
    }
}

impl CrawlConfig {
    /// True when robots.txt must be fetched and enforced
    pub fn enforces_robots(&self) -> bool {
        self.respect_robots && self.robots_mode == RobotsMode::Respect
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn delay_duration(&self) -> Duration {
        Duration::from_secs_f64(self.delay.max(0.0))
    }
}

/// Checkpoint store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// Pages buffered before a non-forced batch is written
    pub batch_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "./newt-walker.db".to_string(),
            batch_size: 50,
        }
    }
}

/// Memory monitor thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct MemoryConfig {
    /// Fraction of `memory-limit` at which frontier growth is throttled
    pub soft_ratio: f64,

    /// Fraction of `memory-limit` at which the job is paused
    pub hard_ratio: f64,

    /// Minimum interval between process samples
    pub sample_interval_ms: u64,

    /// Longest time an enqueue waits for memory to drop below the soft threshold
    pub backpressure_wait_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            soft_ratio: 0.8,
            hard_ratio: 1.0,
            sample_interval_ms: 1000,
            backpressure_wait_ms: 5000,
        }
    }
}

/// Session registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RegistryConfig {
    /// Idle time after which a session's orchestrator is evicted
    pub idle_ttl_secs: u64,

    /// Interval of the background eviction sweep
    pub eviction_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 3600,
            eviction_interval_secs: 300,
        }
    }
}
