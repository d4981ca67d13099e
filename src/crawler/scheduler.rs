//! Per-host request pacing
//!
//! Workers reserve a start slot for a host before fetching from it. The delay
//! between two requests to one host is the larger of the configured crawl
//! delay and the robots.txt crawl-delay or request-rate for that host.

use crate::state::DomainState;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Pacing state shared by all workers of a job
#[derive(Debug, Default)]
pub struct Scheduler {
    domains: Mutex<HashMap<String, DomainState>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next request slot for `host`
    ///
    /// Returns how long the caller has to sleep before sending.
    pub fn reserve(&self, host: &str, min_delay: Duration) -> Duration {
        let mut domains = self.domains.lock();
        domains
            .entry(host.to_string())
            .or_insert_with(DomainState::new)
            .reserve(Instant::now(), min_delay)
    }

    /// Reserves a slot and sleeps until it starts
    pub async fn wait_turn(&self, host: &str, min_delay: Duration) {
        let wait = self.reserve(host, min_delay);
        if !wait.is_zero() {
            tracing::trace!("Pacing {} for {:?}", host, wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Requests made to `host` since the last reset
    pub fn request_count(&self, host: &str) -> u64 {
        self.domains
            .lock()
            .get(host)
            .map_or(0, |state| state.request_count)
    }

    pub fn clear(&self) {
        self.domains.lock().clear();
    }
}

/// Delay between requests to one host
///
/// Takes the maximum of the configured delay and the robots.txt interval.
pub fn effective_delay(configured: Duration, robots: Option<Duration>) -> Duration {
    robots.map_or(configured, |r| configured.max(r))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hosts_are_paced_independently() {
        let scheduler = Scheduler::new();
        let delay = Duration::from_secs(10);

        assert_eq!(scheduler.reserve("a.com", delay), Duration::ZERO);
        assert_eq!(scheduler.reserve("b.com", delay), Duration::ZERO);
        assert!(scheduler.reserve("a.com", delay) > Duration::from_secs(9));

        assert_eq!(scheduler.request_count("a.com"), 2);
        assert_eq!(scheduler.request_count("b.com"), 1);
        assert_eq!(scheduler.request_count("c.com"), 0);
    }

    #[test]
    fn test_clear_resets_pacing() {
        let scheduler = Scheduler::new();
        scheduler.reserve("a.com", Duration::from_secs(10));
        scheduler.clear();
        assert_eq!(scheduler.reserve("a.com", Duration::from_secs(10)), Duration::ZERO);
    }

    #[test]
    fn test_effective_delay_uses_config() {
        assert_eq!(
            effective_delay(Duration::from_millis(1000), None),
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn test_effective_delay_with_robots_delay() {
        assert_eq!(
            effective_delay(Duration::from_millis(1000), Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_effective_delay_robots_smaller_than_config() {
        assert_eq!(
            effective_delay(Duration::from_millis(1000), Some(Duration::from_millis(500))),
            Duration::from_millis(1000)
        );
    }

    #[tokio::test]
    async fn test_wait_turn_without_delay_returns_immediately() {
        let scheduler = Scheduler::new();
        let start = Instant::now();
        scheduler.wait_turn("a.com", Duration::ZERO).await;
        scheduler.wait_turn("a.com", Duration::ZERO).await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
