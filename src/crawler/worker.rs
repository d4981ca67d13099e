//! Crawl workers
//!
//! Each worker pops frontier entries until the job leaves `running`, its
//! slot is retired, or the frontier drains. One entry goes through robots
//! evaluation, host pacing, fetch, extraction, recording and link
//! discovery before the next pop.

use crate::config::CrawlConfig;
use crate::crawler::coordinator::Shared;
use crate::crawler::fetcher::{fetch_with_retries, FetchOptions, FetchResponse};
use crate::crawler::frontier::{Enqueue, FrontierEntry};
use crate::crawler::parser::parse_html;
use crate::crawler::scheduler::effective_delay;
use crate::crawler::CrawledPage;
use crate::links::Link;
use crate::memory::MemoryState;
use crate::state::JobStatus;
use crate::url::{classify_scope, host_key};
use crate::Result;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};
use url::Url;

/// How long an idle worker sleeps before re-checking the frontier
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Shortest pause between memory samples while holding back the frontier
const BACKPRESSURE_POLL: Duration = Duration::from_millis(50);

enum Next {
    Entry(FrontierEntry),
    Drained,
    Wait,
}

pub(crate) async fn run_worker(shared: Arc<Shared>, slot: usize, generation: u64) {
    debug!("Worker {} started (generation {})", slot, generation);

    while shared.worker_should_run(slot, generation) {
        let next = {
            let mut frontier = shared.frontier.lock();
            match frontier.pop() {
                Some(entry) => Next::Entry(entry),
                None if frontier.is_drained() => Next::Drained,
                None => Next::Wait,
            }
        };

        let entry = match next {
            Next::Entry(entry) => entry,
            Next::Drained => {
                shared.finish(JobStatus::Completed, None);
                break;
            }
            Next::Wait => {
                let _ = tokio::time::timeout(IDLE_POLL, shared.work.notified()).await;
                continue;
            }
        };

        let url = entry.url.clone();
        let outcome = AssertUnwindSafe(process_entry(&shared, entry))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                shared.auto_pause(e.to_string());
                break;
            }
            Err(_) => {
                error!("Worker {} panicked while processing {}", slot, url);
                shared.finish(
                    JobStatus::Crashed,
                    Some(format!("Worker panicked while processing {}", url)),
                );
                break;
            }
        }
    }

    debug!("Worker {} stopped", slot);
}

/// Crawls one frontier entry
///
/// Only store failures are returned as errors; everything that goes wrong
/// with the page itself is recorded as data.
async fn process_entry(shared: &Shared, entry: FrontierEntry) -> Result<()> {
    let config = shared.config.read().clone();
    let base_domain = shared.base_domain();

    let url = match Url::parse(&entry.url) {
        Ok(url) => url,
        Err(e) => {
            warn!("Unparseable frontier URL {}: {}", entry.url, e);
            let page = CrawledPage::failed(
                &entry.url,
                entry.depth,
                entry.parent_url.as_deref(),
                e.to_string(),
            );
            shared.results.write().record_page(page, Vec::new());
            return complete(shared, &entry, &config);
        }
    };

    let is_internal = classify_scope(&url, &base_domain).is_internal();
    if !shared.robots.is_allowed(&url, is_internal).await {
        return complete(shared, &entry, &config);
    }

    if let Some(host) = host_key(&url) {
        let delay = effective_delay(config.delay_duration(), shared.robots.min_interval(&url));
        shared.scheduler.wait_turn(&host, delay).await;
    }

    debug!("Fetching {} (depth {})", url, entry.depth);
    let options = FetchOptions::from_config(&config);
    let backoff = Duration::from_millis(config.retry_backoff_ms);
    let fetched = fetch_with_retries(
        shared.fetcher.as_ref(),
        &url,
        &options,
        config.retries,
        backoff,
    )
    .await;

    let (page, links, children) = match fetched {
        Ok(response) => build_page(shared, &entry, &url, response, &base_domain),
        Err(e) => {
            warn!("Failed to fetch {}: {}", url, e);
            let page = CrawledPage::failed(
                &entry.url,
                entry.depth,
                entry.parent_url.as_deref(),
                e.to_string(),
            );
            (page, Vec::new(), Vec::new())
        }
    };

    let issues = shared.results.write().record_page(page, links);
    if !issues.is_empty() {
        trace!("{} issues on {}", issues.len(), url);
    }

    if entry.depth < config.max_depth && !children.is_empty() {
        handle_discovered_links(shared, &entry, children, &config, &base_domain).await?;
    }

    complete(shared, &entry, &config)
}

/// Fills a page record from a response
///
/// Returns the page, its outgoing links and the URLs worth following.
fn build_page(
    shared: &Shared,
    entry: &FrontierEntry,
    url: &Url,
    response: FetchResponse,
    base_domain: &str,
) -> (CrawledPage, Vec<Link>, Vec<Url>) {
    let mut page = CrawledPage::new(&entry.url, entry.depth, entry.parent_url.as_deref());
    page.status_code = response.status;
    page.content_type = response.content_type.clone();
    page.size_bytes = response.size_bytes;
    page.response_time_ms = response.elapsed.as_millis() as u64;
    page.redirect_chain = response.redirect_chain.clone();

    if !(200..300).contains(&response.status) || !response.is_html() {
        return (page, Vec::new(), Vec::new());
    }

    let parsed = parse_html(&response.body, &response.final_url);
    if !response.truncated {
        page.analysis = Some(shared.analyzer.analyze(&parsed.text));
    }

    let mut links = Vec::with_capacity(parsed.links.len());
    let mut children = Vec::with_capacity(parsed.links.len());
    for extracted in parsed.links {
        let link = Link::new(
            url,
            &extracted.url,
            &extracted.anchor_text,
            extracted.placement,
            extracted.nofollow,
            base_domain,
        );
        if link.is_internal {
            page.internal_links += 1;
        } else {
            page.external_links += 1;
        }
        links.push(link);
        children.push(extracted.url);
    }

    page.title = parsed.title;
    page.meta_description = parsed.meta_description;
    page.meta_robots = parsed.meta_robots;
    page.canonical_url = parsed.canonical_url;
    page.lang = parsed.lang;
    page.h1 = parsed.h1;
    page.h2 = parsed.h2;
    page.has_structured_data = parsed.has_structured_data;
    page.images_missing_alt = parsed.images_missing_alt;

    (page, links, children)
}

/// Enqueues in-scope links found on a page
///
/// Memory pressure is checked first: at the soft threshold results are
/// flushed and growth is held back for a while; at the hard threshold the
/// job pauses and nothing is enqueued.
async fn handle_discovered_links(
    shared: &Shared,
    entry: &FrontierEntry,
    children: Vec<Url>,
    config: &CrawlConfig,
    base_domain: &str,
) -> Result<()> {
    if !relieve_memory_pressure(shared).await? {
        return Ok(());
    }

    let mut added = 0;
    for child in children {
        let key = child.as_str();
        let known = shared.frontier.lock().is_known(key);
        if known {
            continue;
        }

        let is_internal = classify_scope(&child, base_domain).is_internal();
        if !is_internal && !config.crawl_external {
            continue;
        }

        let verdict = shared.filter.read().check(&child);
        if let Err(rejection) = verdict {
            trace!("Filtered {}: {:?}", child, rejection);
            continue;
        }

        if !shared.robots.is_allowed(&child, is_internal).await {
            shared.frontier.lock().reject(key);
            continue;
        }

        let next = FrontierEntry::new(key, entry.depth + 1, Some(&entry.url));
        let pushed = shared.frontier.lock().push(next, config.max_urls);
        match pushed {
            Enqueue::Added => added += 1,
            Enqueue::Known => {}
            Enqueue::LimitReached => {
                debug!("URL limit of {} reached", config.max_urls);
                break;
            }
        }
    }

    if added > 0 {
        trace!("Enqueued {} URLs from {}", added, entry.url);
        shared.work.notify_waiters();
    }
    Ok(())
}

/// Returns false when the frontier must not grow
async fn relieve_memory_pressure(shared: &Shared) -> Result<bool> {
    let mut sample = shared.memory.sample_if_stale();
    if sample.state == MemoryState::Soft {
        debug!("Memory at soft threshold ({} bytes), flushing", sample.bytes);
        shared.flush(true)?;

        let deadline = Instant::now() + shared.memory.backpressure_wait();
        let poll = shared.memory.sample_interval().max(BACKPRESSURE_POLL);
        while sample.state == MemoryState::Soft && Instant::now() < deadline {
            tokio::time::sleep(poll).await;
            sample = shared.memory.sample();
        }
    }

    if sample.state == MemoryState::Hard {
        shared.auto_pause(format!(
            "Memory limit reached ({} bytes in use)",
            sample.bytes
        ));
        return Ok(false);
    }
    Ok(true)
}

/// Marks an entry done and runs the checkpoint cadence
fn complete(shared: &Shared, entry: &FrontierEntry, config: &CrawlConfig) -> Result<()> {
    shared.frontier.lock().complete(&entry.url);

    let done = shared.since_checkpoint.fetch_add(1, Ordering::SeqCst) + 1;
    if done >= config.checkpoint_interval.max(1) {
        shared.since_checkpoint.store(0, Ordering::SeqCst);
        shared.checkpoint()
    } else {
        shared.flush(false).map(|_| ())
    }
}
