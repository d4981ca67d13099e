//! Robots.txt caching
//!
//! Policies are cached per `host[:port]` and expire after 24 hours.

use crate::robots::RobotsPolicy;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// A cached robots.txt policy for one host
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub policy: Arc<RobotsPolicy>,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,

    /// Set when the fetch failed and the host is treated as open
    pub fetch_failed: bool,
}

impl CachedRobots {
    pub fn new(policy: RobotsPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
            fetched_at: Utc::now(),
            fetch_failed: false,
        }
    }

    /// An allow-all entry standing in for a robots.txt that could not be fetched
    pub fn failed(reason: String) -> Self {
        let mut policy = RobotsPolicy::allow_all();
        policy.push_error(reason);
        Self {
            policy: Arc::new(policy),
            fetched_at: Utc::now(),
            fetch_failed: true,
        }
    }

    /// Checks if the cached robots.txt is older than 24 hours
    pub fn is_stale(&self) -> bool {
        self.age() > Duration::hours(24)
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}
