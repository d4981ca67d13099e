//! Configuration module for Newt-Walker
//!
//! This module handles the typed crawl configuration, its defaults table,
//! loading TOML engine configuration files and validating them.
//!
//! # Example
//!
//! ```no_run
//! use newt_walker::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("walker.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawler.max_depth);
//! ```

pub mod defaults;
mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CrawlConfig, EngineConfig, MemoryConfig, RegistryConfig, RobotsMode, StorageConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, config_fingerprint, load_config, load_config_with_hash};
pub use validation::{validate, validate_crawl_config};
