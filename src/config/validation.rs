use crate::config::types::{CrawlConfig, EngineConfig, MemoryConfig, StorageConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire engine configuration
pub fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
    validate_crawl_config(&config.crawler)?;
    validate_storage_config(&config.storage)?;
    validate_memory_config(&config.memory)?;
    validate_seeds(&config.seeds)?;
    Ok(())
}

/// Validates a crawl configuration
///
/// Also used by the orchestrator before a job starts and whenever the
/// configuration of a live job is replaced.
pub fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    if !config.delay.is_finite() || config.delay < 0.0 {
        return Err(ConfigError::Validation(format!(
            "delay must be a non-negative number of seconds, got {}",
            config.delay
        )));
    }

    if config.timeout < 1 {
        return Err(ConfigError::Validation(
            "timeout must be at least 1 second".to_string(),
        ));
    }

    if config.max_urls < 1 {
        return Err(ConfigError::Validation(format!(
            "max_urls must be >= 1, got {}",
            config.max_urls
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.robots_user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "robots_user_agent cannot be empty".to_string(),
        ));
    }

    if config.memory_limit == 0 {
        return Err(ConfigError::Validation(
            "memory_limit must be greater than zero".to_string(),
        ));
    }

    for ext in config
        .include_extensions
        .iter()
        .chain(config.exclude_extensions.iter())
    {
        validate_extension(ext)?;
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(
            "batch_size must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_memory_config(config: &MemoryConfig) -> Result<(), ConfigError> {
    if !(config.soft_ratio > 0.0 && config.soft_ratio <= config.hard_ratio) {
        return Err(ConfigError::Validation(format!(
            "memory ratios must satisfy 0 < soft-ratio <= hard-ratio, got {} and {}",
            config.soft_ratio, config.hard_ratio
        )));
    }

    Ok(())
}

fn validate_seeds(seeds: &[String]) -> Result<(), ConfigError> {
    for seed in seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "Seed URL must use http or https: {}",
                seed
            )));
        }
    }

    Ok(())
}

/// Extensions are bare alphanumeric tokens such as `html`
fn validate_extension(ext: &str) -> Result<(), ConfigError> {
    let ext = ext.trim_start_matches('.');
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ConfigError::InvalidPattern(format!(
            "Invalid file extension '{}'",
            ext
        )));
    }
    Ok(())
}
