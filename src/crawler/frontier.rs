//! Crawl frontier
//!
//! A FIFO queue of URLs waiting to be crawled plus the set of every URL ever
//! accepted into it. A URL enters the queue at most once per job; popped
//! entries stay tracked as in flight until the worker completes them, so a
//! checkpoint never drops a URL that was taken but not yet recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// A URL waiting to be crawled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierEntry {
    pub url: String,
    pub depth: u32,
    pub parent_url: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

impl FrontierEntry {
    pub fn new(url: &str, depth: u32, parent_url: Option<&str>) -> Self {
        Self {
            url: url.to_string(),
            depth,
            parent_url: parent_url.map(str::to_string),
            enqueued_at: Utc::now(),
        }
    }
}

/// Persistable frontier state
///
/// `pending` holds in-flight entries followed by queued ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierSnapshot {
    pub pending: Vec<FrontierEntry>,
    pub seen: Vec<String>,
    #[serde(default)]
    pub rejected: Vec<String>,
}

/// Outcome of offering a URL to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Added,
    /// Already queued, crawled, in flight or rejected
    Known,
    /// The job's URL budget is spent
    LimitReached,
}

#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<FrontierEntry>,
    seen: HashSet<String>,
    /// URLs evaluated and refused (robots, filters); never offered again
    rejected: HashSet<String>,
    in_flight: HashMap<String, FrontierEntry>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `url` has already been accepted or refused
    pub fn is_known(&self, url: &str) -> bool {
        self.seen.contains(url) || self.rejected.contains(url)
    }

    /// Adds an entry unless it is known or `max_urls` URLs were already accepted
    pub fn push(&mut self, entry: FrontierEntry, max_urls: usize) -> Enqueue {
        if self.is_known(&entry.url) {
            return Enqueue::Known;
        }
        if self.seen.len() >= max_urls {
            return Enqueue::LimitReached;
        }
        self.seen.insert(entry.url.clone());
        self.queue.push_back(entry);
        Enqueue::Added
    }

    /// Remembers a URL that must never be queued
    pub fn reject(&mut self, url: &str) {
        if !self.seen.contains(url) {
            self.rejected.insert(url.to_string());
        }
    }

    /// Takes the next entry and tracks it as in flight
    pub fn pop(&mut self) -> Option<FrontierEntry> {
        let entry = self.queue.pop_front()?;
        self.in_flight.insert(entry.url.clone(), entry.clone());
        Some(entry)
    }

    /// Marks an in-flight entry as done
    pub fn complete(&mut self, url: &str) {
        self.in_flight.remove(url);
    }

    /// Nothing queued and nothing in flight
    pub fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_empty()
    }

    /// Number of URLs ever accepted
    pub fn discovered(&self) -> usize {
        self.seen.len()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn snapshot(&self) -> FrontierSnapshot {
        let mut in_flight: Vec<FrontierEntry> = self.in_flight.values().cloned().collect();
        in_flight.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at).then_with(|| a.url.cmp(&b.url)));

        let mut seen: Vec<String> = self.seen.iter().cloned().collect();
        seen.sort();
        let mut rejected: Vec<String> = self.rejected.iter().cloned().collect();
        rejected.sort();

        FrontierSnapshot {
            pending: in_flight.into_iter().chain(self.queue.iter().cloned()).collect(),
            seen,
            rejected,
        }
    }

    /// Rebuilds the frontier from a checkpoint
    ///
    /// Entries whose URL is in `completed` were recorded after the checkpoint
    /// was taken and are not queued again.
    pub fn restore(&mut self, snapshot: FrontierSnapshot, completed: &HashSet<String>) {
        self.clear();
        self.seen.extend(snapshot.seen);
        self.seen.extend(completed.iter().cloned());
        self.rejected.extend(
            snapshot
                .rejected
                .into_iter()
                .filter(|url| !self.seen.contains(url)),
        );

        let mut queued = HashSet::new();
        for entry in snapshot.pending {
            if completed.contains(&entry.url) || !queued.insert(entry.url.clone()) {
                continue;
            }
            self.seen.insert(entry.url.clone());
            self.queue.push_back(entry);
        }
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.seen.clear();
        self.rejected.clear();
        self.in_flight.clear();
    }
}
