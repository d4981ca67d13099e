//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry logic
//! - HTML parsing and link extraction
//! - The deduplicated frontier and per-host pacing
//! - The job state machine and its worker pool
//! - Crash recovery at process start

mod coordinator;
mod fetcher;
mod frontier;
mod page;
mod parser;
mod recovery;
mod scheduler;
mod snapshot;
mod worker;

pub use coordinator::CrawlOrchestrator;
pub use fetcher::{
    build_http_client, fetch_with_retries, FetchOptions, FetchResponse, Fetcher, HttpFetcher,
    NetworkError, RedirectHop,
};
pub use frontier::{Enqueue, Frontier, FrontierEntry, FrontierSnapshot};
pub use page::CrawledPage;
pub use parser::{parse_html, ExtractedLink, ParsedPage};
pub use recovery::recover_crashed_jobs;
pub use scheduler::{effective_delay, Scheduler};
pub use snapshot::{CrawlStats, Cursors, MemoryView, StatusQuery, StatusSnapshot};
