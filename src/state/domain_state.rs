use std::time::{Duration, Instant};

/// Tracks request pacing for one host during crawling
///
/// Slots are reserved rather than checked, so concurrent workers aiming at
/// the same host queue up behind each other instead of racing.
#[derive(Debug, Clone, Default)]
pub struct DomainState {
    /// Number of requests made to this host in the current crawl
    pub request_count: u64,

    /// Start time of the most recently reserved request
    pub last_request_time: Option<Instant>,

    /// Earliest time the next request may start
    pub next_allowed: Option<Instant>,
}

impl DomainState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks if a request may start now
    pub fn can_request(&self, now: Instant) -> bool {
        self.next_allowed.map_or(true, |at| now >= at)
    }

    /// Time until the next request may start, or None if it may start now
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        match self.next_allowed {
            Some(at) if at > now => Some(at - now),
            _ => None,
        }
    }

    /// Reserves the next request slot
    ///
    /// # Arguments
    ///
    /// * `now` - The current time instant
    /// * `min_delay` - Spacing required after this request
    ///
    /// # Returns
    ///
    /// How long the caller must wait before sending its request
    pub fn reserve(&mut self, now: Instant, min_delay: Duration) -> Duration {
        let start = match self.next_allowed {
            Some(at) if at > now => at,
            _ => now,
        };
        self.next_allowed = Some(start + min_delay);
        self.last_request_time = Some(start);
        self.request_count += 1;
        start - now
    }
}
