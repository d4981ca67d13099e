//! Point-in-time views of a crawl job for pollers

use crate::crawler::CrawledPage;
use crate::issues::Issue;
use crate::links::Link;
use crate::memory::{CollectionEstimate, MemoryStats};
use crate::robots::BlockedCounts;
use crate::state::JobStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cursor offsets of a status poll
///
/// Each `*_since` value is the number of records of that kind the caller
/// has already seen. `full_refresh` ignores the cursors and returns
/// everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusQuery {
    pub url_since: usize,
    pub link_since: usize,
    pub issue_since: usize,
    pub full_refresh: bool,
}

impl StatusQuery {
    /// A poll that returns every record
    pub fn full() -> Self {
        Self {
            full_refresh: true,
            ..Self::default()
        }
    }

    /// Continues from the cursors returned by a previous snapshot
    pub fn after(snapshot: &StatusSnapshot) -> Self {
        Self {
            url_since: snapshot.cursors.urls,
            link_since: snapshot.cursors.links,
            issue_since: snapshot.cursors.issues,
            full_refresh: false,
        }
    }
}

/// Progress counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlStats {
    /// URLs ever admitted to the frontier
    pub discovered: usize,
    /// Pages recorded, including failed fetches
    pub crawled: usize,
    pub queued: usize,
    pub in_flight: usize,
    pub links: usize,
    pub issues: usize,
    pub blocked: BlockedCounts,
    pub elapsed_secs: u64,
}

/// Totals to pass back as the next poll's cursors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursors {
    pub urls: usize,
    pub links: usize,
    pub issues: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryView {
    pub stats: MemoryStats,
    pub collections: CollectionEstimate,
}

/// A consistent view of one job
///
/// Counters and record slices are read under the same locks, so `cursors`
/// always equals the cursor offsets plus the lengths of the returned slices.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: JobStatus,
    pub job_id: Option<i64>,
    pub base_url: String,
    pub base_domain: String,
    pub started_at: Option<DateTime<Utc>>,
    pub stats: CrawlStats,
    pub urls: Vec<CrawledPage>,
    pub links: Vec<Link>,
    pub issues: Vec<Issue>,
    pub cursors: Cursors,
    /// True when the record slices start from zero
    pub full_refresh: bool,
    pub memory: MemoryView,
    /// Last job-level error, e.g. the storage failure that paused the job
    pub error: Option<String>,
}
