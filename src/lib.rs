//! Newt-Walker: a resumable SEO crawl engine
//!
//! This crate walks a site's link graph, evaluates every URL against
//! robots-exclusion policy, scores page content, detects SEO issues and
//! checkpoints its state so a crawl survives pauses, restarts and crashes.

pub mod analysis;
pub mod config;
pub mod crawler;
pub mod issues;
pub mod links;
pub mod memory;
pub mod registry;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Newt-Walker operations
#[derive(Debug, Error)]
pub enum WalkerError {
    #[error("A crawl is already running")]
    AlreadyRunning,

    #[error("Crawl job {job_id} not found")]
    NotFound { job_id: i64 },

    #[error("Not authorized to access crawl job {job_id}")]
    Unauthorized { job_id: i64 },

    #[error("Network error: {0}")]
    Network(#[from] crawler::NetworkError),

    #[error("Failed to fetch robots.txt from {url}: {reason}")]
    RobotsFetch { url: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Crawl job {job_id} was left running by a process that no longer exists")]
    CrashDetected { job_id: i64 },

    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidTransition {
        from: state::JobStatus,
        to: state::JobStatus,
    },

    #[error("No valid seed URLs were provided")]
    NoSeeds,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Newt-Walker operations
pub type Result<T> = std::result::Result<T, WalkerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use analysis::{ContentAnalyzer, ContentMetrics};
pub use config::{CrawlConfig, EngineConfig, RobotsMode};
pub use crawler::{CrawlOrchestrator, StatusQuery, StatusSnapshot};
pub use registry::InstanceRegistry;
pub use robots::RobotsPolicyEngine;
pub use state::JobStatus;
pub use url::{extract_domain, normalize_url};
