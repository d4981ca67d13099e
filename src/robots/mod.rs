//! Robots.txt handling module
//!
//! This module provides parsing, fetching, caching and evaluation of
//! robots.txt policies, plus per-subdomain manual overrides and a log of
//! blocked URLs. [`RobotsPolicyEngine`] ties these together for a crawl.

mod blocked;
mod cache;
mod custom;
mod fetch;
mod parser;

pub use blocked::{BlockedCounts, BlockedRecord, BlockedTracker};
pub use cache::CachedRobots;
pub use custom::CustomRobotsManager;
pub use fetch::{fetch_robots, robots_url};
pub use parser::{
    path_with_query, Directive, PathTestResult, RobotsAnalysis, RobotsParseError, RobotsPolicy,
    UserAgentRules,
};

use crate::config::CrawlConfig;
use crate::crawler::{FetchOptions, Fetcher};
use crate::url::host_key;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
struct RobotsSettings {
    enforce: bool,
    robots_user_agent: String,
    fetch_options: FetchOptions,
}

impl RobotsSettings {
    fn from_config(config: &CrawlConfig) -> Self {
        Self {
            enforce: config.enforces_robots(),
            robots_user_agent: config.robots_user_agent.clone(),
            fetch_options: FetchOptions::from_config(config),
        }
    }
}

/// Robots-exclusion decisions for one crawl
///
/// Policies are resolved per `host[:port]`: a custom override wins, then a
/// fresh cached fetch, then a new fetch. A robots.txt that cannot be fetched
/// is cached as allow-all so the host stays crawlable.
pub struct RobotsPolicyEngine {
    fetcher: Arc<dyn Fetcher>,
    settings: RwLock<RobotsSettings>,
    cache: RwLock<HashMap<String, CachedRobots>>,
    /// One fetch at a time per host; later callers wait and read the cache
    fetch_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    custom: RwLock<CustomRobotsManager>,
    blocked: Mutex<BlockedTracker>,
}

impl RobotsPolicyEngine {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: &CrawlConfig) -> Self {
        Self {
            fetcher,
            settings: RwLock::new(RobotsSettings::from_config(config)),
            cache: RwLock::new(HashMap::new()),
            fetch_locks: Mutex::new(HashMap::new()),
            custom: RwLock::new(CustomRobotsManager::new()),
            blocked: Mutex::new(BlockedTracker::new()),
        }
    }

    /// Applies a new configuration to subsequent evaluations
    pub fn update_config(&self, config: &CrawlConfig) {
        *self.settings.write() = RobotsSettings::from_config(config);
    }

    pub fn is_enforcing(&self) -> bool {
        self.settings.read().enforce
    }

    /// Resolves the policy governing `url`
    pub async fn policy_for(&self, url: &Url) -> Arc<RobotsPolicy> {
        let Some(host) = host_key(url) else {
            return Arc::new(RobotsPolicy::allow_all());
        };

        if let Some(policy) = self.custom.read().policy(&host) {
            return policy;
        }

        if let Some(policy) = self.cached_policy(&host) {
            return policy;
        }

        let host_lock = Arc::clone(self.fetch_locks.lock().entry(host.clone()).or_default());
        let _fetching = host_lock.lock().await;
        if let Some(policy) = self.cached_policy(&host) {
            return policy;
        }

        let options = self.settings.read().fetch_options.clone();
        let entry = match fetch_robots(self.fetcher.as_ref(), url, &options).await {
            Ok(policy) => CachedRobots::new(policy),
            Err(e) => {
                tracing::warn!("{}; treating {} as unrestricted", e, host);
                CachedRobots::failed(e.to_string())
            }
        };

        let policy = Arc::clone(&entry.policy);
        self.cache.write().insert(host, entry);
        policy
    }

    fn cached_policy(&self, host: &str) -> Option<Arc<RobotsPolicy>> {
        self.cache
            .read()
            .get(host)
            .filter(|entry| !entry.is_stale())
            .map(|entry| Arc::clone(&entry.policy))
    }

    /// Decides whether `url` may be fetched
    ///
    /// Denials are recorded in the blocked tracker. Always true when robots
    /// enforcement is off.
    pub async fn is_allowed(&self, url: &Url, is_internal: bool) -> bool {
        let agent = {
            let settings = self.settings.read();
            if !settings.enforce {
                return true;
            }
            settings.robots_user_agent.clone()
        };

        let policy = self.policy_for(url).await;
        let path = path_with_query(url);
        let result = policy.test_path(&path, &agent);

        if !result.allowed {
            tracing::debug!("Blocked by robots.txt: {} ({})", url, result.reason);
            self.blocked
                .lock()
                .add_blocked(url.as_str(), &result.reason, is_internal);
        }

        result.allowed
    }

    /// Minimum spacing between requests to the host of `url` required by
    /// its robots.txt, from already-resolved policies only
    pub fn min_interval(&self, url: &Url) -> Option<Duration> {
        let settings = self.settings.read();
        if !settings.enforce {
            return None;
        }
        let host = host_key(url)?;

        let policy = match self.custom.read().policy(&host) {
            Some(policy) => policy,
            None => Arc::clone(&self.cache.read().get(&host)?.policy),
        };

        policy
            .min_interval(&settings.robots_user_agent)
            .map(Duration::from_secs_f64)
    }

    /// Analysis of the cached or overriding policy for a host
    pub fn analysis(&self, host: &str) -> Option<RobotsAnalysis> {
        let agent = self.settings.read().robots_user_agent.clone();
        let policy = match self.custom.read().policy(host) {
            Some(policy) => policy,
            None => Arc::clone(&self.cache.read().get(host)?.policy),
        };
        Some(policy.analysis(&agent))
    }

    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    pub fn add_custom(&self, subdomain: &str, content: &str) {
        tracing::info!("Custom robots.txt set for {}", subdomain);
        self.custom.write().add_subdomain(subdomain, content);
    }

    pub fn remove_custom(&self, subdomain: &str) -> bool {
        self.custom.write().remove_subdomain(subdomain)
    }

    pub fn custom_content(&self, subdomain: &str) -> Option<String> {
        self.custom.read().content(subdomain).map(str::to_string)
    }

    pub fn custom_subdomains(&self) -> Vec<String> {
        self.custom.read().subdomains()
    }

    pub fn test_custom_path(&self, subdomain: &str, path: &str) -> PathTestResult {
        let agent = self.settings.read().robots_user_agent.clone();
        self.custom.read().test_path(subdomain, path, &agent)
    }

    pub fn custom_overrides(&self) -> BTreeMap<String, String> {
        self.custom.read().to_map()
    }

    pub fn restore_custom(&self, map: &BTreeMap<String, String>) {
        *self.custom.write() = CustomRobotsManager::from_map(map);
    }

    pub fn clear_custom(&self) {
        self.custom.write().clear();
    }

    pub fn blocked_counts(&self) -> BlockedCounts {
        self.blocked.lock().counts()
    }

    pub fn blocked_internal(&self) -> Vec<BlockedRecord> {
        self.blocked.lock().internal().to_vec()
    }

    pub fn blocked_external(&self) -> Vec<BlockedRecord> {
        self.blocked.lock().external().to_vec()
    }

    pub fn clear_blocked(&self) {
        self.blocked.lock().clear();
    }
}
