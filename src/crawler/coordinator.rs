//! Crawl orchestration
//!
//! [`CrawlOrchestrator`] owns one crawl job at a time: its lifecycle state
//! machine, the shared frontier and result set, and the worker pool that
//! drains the frontier. Lifecycle calls are serialized; workers observe
//! status changes between frontier pops.

use crate::analysis::ContentAnalyzer;
use crate::config::{config_fingerprint, validate_crawl_config, CrawlConfig, MemoryConfig};
use crate::crawler::frontier::{Enqueue, Frontier, FrontierEntry};
use crate::crawler::scheduler::Scheduler;
use crate::crawler::snapshot::{CrawlStats, Cursors, MemoryView, StatusQuery, StatusSnapshot};
use crate::crawler::worker::run_worker;
use crate::crawler::{CrawledPage, Fetcher};
use crate::links::Link;
use crate::memory::{MemoryMonitor, MemoryProbe, MemorySample, ProcessMemoryProbe};
use crate::robots::RobotsPolicyEngine;
use crate::state::{JobStatus, ResultSet};
use crate::storage::{JobRecord, NewJob, SharedStore};
use crate::url::{extract_domain, normalize_url, UrlFilter};
use crate::{Result, UrlError, WalkerError};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Identity and bookkeeping of the current job
#[derive(Debug, Clone, Default)]
pub(crate) struct JobInfo {
    pub(crate) job_id: Option<i64>,
    pub(crate) owner: String,
    pub(crate) base_url: String,
    pub(crate) base_domain: String,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) last_error: Option<String>,
    /// Next status read ignores the caller's cursors
    pub(crate) force_refresh: bool,
}

/// State shared between the orchestrator and its workers
///
/// Lock order: `frontier` before `results`; `finishing` before `flush`
/// before `results` before `store`. No parking_lot guard is held across an await.
pub(crate) struct Shared {
    pub(crate) session: String,
    pub(crate) config: RwLock<CrawlConfig>,
    pub(crate) filter: RwLock<UrlFilter>,
    pub(crate) job: Mutex<JobInfo>,
    pub(crate) status: watch::Sender<JobStatus>,
    pub(crate) frontier: Mutex<Frontier>,
    pub(crate) results: RwLock<ResultSet>,
    pub(crate) robots: RobotsPolicyEngine,
    pub(crate) scheduler: Scheduler,
    pub(crate) memory: MemoryMonitor,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) analyzer: ContentAnalyzer,
    pub(crate) store: SharedStore,
    /// Wakes workers parked on an empty frontier
    pub(crate) work: Notify,
    /// Bumped whenever a new worker pool is spawned; older workers exit
    pub(crate) generation: AtomicU64,
    pub(crate) since_checkpoint: AtomicUsize,
    flush: Mutex<()>,
    /// Serializes worker-initiated terminal transitions
    finishing: Mutex<()>,
}

impl Shared {
    pub(crate) fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    pub(crate) fn job_id(&self) -> Option<i64> {
        self.job.lock().job_id
    }

    pub(crate) fn base_domain(&self) -> String {
        self.job.lock().base_domain.clone()
    }

    /// Moves the job to `to` if the state machine allows it
    ///
    /// Returns the previous status.
    pub(crate) fn transition(&self, to: JobStatus) -> Result<JobStatus> {
        let mut from = JobStatus::Idle;
        let mut allowed = false;
        self.status.send_if_modified(|current| {
            from = *current;
            allowed = current.can_transition_to(to);
            if allowed {
                *current = to;
            }
            allowed
        });

        if !allowed {
            return Err(WalkerError::InvalidTransition { from, to });
        }
        info!("Crawl job {:?} (session {}): {} -> {}", self.job_id(), self.session, from, to);
        Ok(from)
    }

    /// Records the current status on the job row
    pub(crate) fn persist_status(&self, status: JobStatus) {
        let Some(job_id) = self.job_id() else {
            return;
        };
        let result = self.store.lock().set_status(job_id, status);
        if let Err(e) = result {
            warn!("Failed to persist status {} for job {}: {}", status, job_id, e);
            self.job.lock().last_error = Some(e.to_string());
        }
    }

    /// Hands everything recorded since the last flush to the store
    ///
    /// The store keeps custody of the records even when the write fails, so
    /// the flush watermark always advances.
    pub(crate) fn flush(&self, force: bool) -> Result<usize> {
        let _serialized = self.flush.lock();
        let Some(job_id) = self.job_id() else {
            return Ok(0);
        };

        let batch = self.results.write().take_pending();
        if batch.is_empty() && !force {
            return Ok(0);
        }

        let written = self
            .store
            .lock()
            .save_batch(job_id, &batch.pages, &batch.links, &batch.issues, force);
        self.results.write().mark_flushed(&batch);

        let written = written?;
        if written > 0 {
            debug!("Flushed {} records for job {}", written, job_id);
        }
        Ok(written)
    }

    /// Persists the frontier, pending results and progress counters
    ///
    /// The frontier is captured before results are flushed; a page recorded
    /// in between is both persisted and still pending, and restore skips it.
    pub(crate) fn checkpoint(&self) -> Result<()> {
        let Some(job_id) = self.job_id() else {
            return Ok(());
        };

        let snapshot = self.frontier.lock().snapshot();
        self.flush(true)?;

        let discovered = snapshot.seen.len();
        let crawled = self.results.read().counts().pages;
        let mut store = self.store.lock();
        store.save_frontier_checkpoint(job_id, &snapshot)?;
        store.update_progress(job_id, discovered, crawled)?;
        debug!(
            "Checkpoint for job {}: {} pending, {} discovered, {} crawled",
            job_id,
            snapshot.pending.len(),
            discovered,
            crawled
        );
        Ok(())
    }

    /// Ends a running job from inside a worker
    ///
    /// Never joins workers, since the caller is one of them.
    ///
    /// The checkpoint and the stored status are written before the new
    /// status is published, so anyone woken by the status change reads a
    /// store that is already up to date.
    pub(crate) fn finish(&self, to: JobStatus, reason: Option<String>) {
        let _finishing = self.finishing.lock();
        if !self.status().can_transition_to(to) {
            return;
        }
        if let Some(reason) = reason {
            self.job.lock().last_error = Some(reason);
        }
        if let Err(e) = self.checkpoint() {
            warn!("Checkpoint before {} failed: {}", to, e);
            self.job.lock().last_error = Some(e.to_string());
        }
        self.persist_status(to);

        // A lifecycle call may have moved the job meanwhile; it persists
        // its own status once the workers are drained.
        if self.transition(to).is_ok() {
            self.work.notify_waiters();
        }
    }

    /// Pauses the job after a condition that blocks further progress
    pub(crate) fn auto_pause(&self, reason: String) {
        warn!("Pausing crawl: {}", reason);
        self.finish(JobStatus::Paused, Some(reason));
    }

    /// Whether a worker of `generation` in `slot` should keep popping
    pub(crate) fn worker_should_run(&self, slot: usize, generation: u64) -> bool {
        self.status() == JobStatus::Running
            && self.generation.load(Ordering::SeqCst) == generation
            && slot < self.config.read().concurrency
    }

    fn snapshot(&self, query: &StatusQuery) -> StatusSnapshot {
        let status = self.status();
        let (job, full_refresh) = {
            let mut job = self.job.lock();
            let full_refresh = query.full_refresh || job.force_refresh;
            job.force_refresh = false;
            (job.clone(), full_refresh)
        };
        let (url_since, link_since, issue_since) = if full_refresh {
            (0, 0, 0)
        } else {
            (query.url_since, query.link_since, query.issue_since)
        };

        let frontier = self.frontier.lock();
        let results = self.results.read();
        let counts = results.counts();

        let stats = CrawlStats {
            discovered: frontier.discovered(),
            crawled: counts.pages,
            queued: frontier.queued(),
            in_flight: frontier.in_flight(),
            links: counts.links,
            issues: counts.issues,
            blocked: self.robots.blocked_counts(),
            elapsed_secs: job
                .started_at
                .map_or(0, |t| (Utc::now() - t).num_seconds().max(0) as u64),
        };

        StatusSnapshot {
            status,
            job_id: job.job_id,
            base_url: job.base_url,
            base_domain: job.base_domain,
            started_at: job.started_at,
            stats,
            urls: results.pages_since(url_since),
            links: results.links_since(link_since),
            issues: results.issues_since(issue_since),
            cursors: Cursors {
                urls: counts.pages,
                links: counts.links,
                issues: counts.issues,
            },
            full_refresh,
            memory: MemoryView {
                stats: self.memory.stats(),
                collections: self.memory.collection_estimate(counts),
            },
            error: job.last_error,
        }
    }
}

/// Drives one crawl job at a time for a session
pub struct CrawlOrchestrator {
    shared: Arc<Shared>,
    /// (slot, generation, task)
    workers: Mutex<Vec<(usize, u64, JoinHandle<()>)>>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl CrawlOrchestrator {
    pub fn new(
        session: &str,
        config: CrawlConfig,
        memory: &MemoryConfig,
        fetcher: Arc<dyn Fetcher>,
        store: SharedStore,
    ) -> Self {
        Self::with_probe(
            session,
            config,
            memory,
            fetcher,
            store,
            Box::new(ProcessMemoryProbe::new()),
        )
    }

    /// Like [`CrawlOrchestrator::new`] with a custom memory probe
    pub fn with_probe(
        session: &str,
        config: CrawlConfig,
        memory: &MemoryConfig,
        fetcher: Arc<dyn Fetcher>,
        store: SharedStore,
        probe: Box<dyn MemoryProbe>,
    ) -> Self {
        let (status, _) = watch::channel(JobStatus::Idle);
        let shared = Shared {
            session: session.to_string(),
            filter: RwLock::new(UrlFilter::from_config(&config)),
            job: Mutex::new(JobInfo::default()),
            status,
            frontier: Mutex::new(Frontier::new()),
            results: RwLock::new(ResultSet::default()),
            robots: RobotsPolicyEngine::new(Arc::clone(&fetcher), &config),
            scheduler: Scheduler::new(),
            memory: MemoryMonitor::with_probe(probe, memory, config.memory_limit),
            fetcher,
            analyzer: ContentAnalyzer::new(),
            store,
            work: Notify::new(),
            generation: AtomicU64::new(0),
            since_checkpoint: AtomicUsize::new(0),
            flush: Mutex::new(()),
            finishing: Mutex::new(()),
            config: RwLock::new(config),
        };

        Self {
            shared: Arc::new(shared),
            workers: Mutex::new(Vec::new()),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn session(&self) -> &str {
        &self.shared.session
    }

    pub fn status(&self) -> JobStatus {
        self.shared.status()
    }

    pub fn job_id(&self) -> Option<i64> {
        self.shared.job_id()
    }

    pub fn config(&self) -> CrawlConfig {
        self.shared.config.read().clone()
    }

    /// Takes a fresh memory reading for this orchestrator's monitor
    pub fn sample_memory(&self) -> MemorySample {
        self.shared.memory.sample()
    }

    /// The job's robots engine, for custom overrides and blocked-URL reports
    pub fn robots(&self) -> &RobotsPolicyEngine {
        &self.shared.robots
    }

    /// Starts a new job from `seeds`
    ///
    /// A paused job is stopped first. Returns a human-readable summary.
    pub async fn start_crawl(
        &self,
        seeds: &[String],
        config: CrawlConfig,
        owner: &str,
    ) -> Result<String> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.status() == JobStatus::Running {
            return Err(WalkerError::AlreadyRunning);
        }
        validate_crawl_config(&config)?;

        let mut seen = HashSet::new();
        let seeds: Vec<Url> = seeds
            .iter()
            .filter_map(|seed| match normalize_url(seed) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!("Ignoring seed {}: {}", seed, e);
                    None
                }
            })
            .filter(|url| seen.insert(url.as_str().to_string()))
            .collect();
        let base = seeds.first().ok_or(WalkerError::NoSeeds)?;
        let base_domain = extract_domain(base).ok_or(UrlError::MissingDomain)?;
        let base_url = base.to_string();

        self.stop_active().await?;

        self.reset(
            &config,
            JobInfo {
                owner: owner.to_string(),
                base_url: base_url.clone(),
                base_domain: base_domain.clone(),
                started_at: Some(Utc::now()),
                force_refresh: true,
                ..JobInfo::default()
            },
        );

        let job_id = self.shared.store.lock().create_job(&NewJob {
            owner: owner.to_string(),
            session: self.shared.session.clone(),
            base_url: base_url.clone(),
            base_domain,
            config_hash: config_fingerprint(&config),
            config: config.clone(),
        })?;
        self.shared.job.lock().job_id = Some(job_id);

        {
            let mut frontier = self.shared.frontier.lock();
            for seed in &seeds {
                frontier.push(FrontierEntry::new(seed.as_str(), 0, None), config.max_urls);
            }
        }

        self.shared.transition(JobStatus::Running)?;
        self.spawn_workers();

        info!("Started crawl job {} for {}", job_id, base_url);
        Ok(format!(
            "Crawl started for {} with {} seed URL(s)",
            base_url,
            seeds.len()
        ))
    }

    /// Parks the workers after their in-flight fetches and checkpoints
    pub async fn pause_crawl(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.shared.transition(JobStatus::Paused)?;
        self.drain_workers().await;
        let result = self.shared.checkpoint();
        self.shared.persist_status(JobStatus::Paused);
        result
    }

    /// Restarts workers against the intact frontier and results
    pub async fn resume_crawl(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.resume_locked()
    }

    fn resume_locked(&self) -> Result<()> {
        let from = self.status();
        if from != JobStatus::Paused {
            return Err(WalkerError::InvalidTransition {
                from,
                to: JobStatus::Running,
            });
        }
        self.shared.transition(JobStatus::Running)?;
        self.shared.job.lock().last_error = None;
        self.shared.persist_status(JobStatus::Running);
        self.spawn_workers();
        Ok(())
    }

    /// Ends the job; a no-op when nothing is running or paused
    pub async fn stop_crawl(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        self.stop_active().await
    }

    async fn stop_active(&self) -> Result<()> {
        if self.status().is_active() {
            self.shared.transition(JobStatus::Stopped)?;
            self.drain_workers().await;
            let result = self.shared.checkpoint();
            self.shared.persist_status(JobStatus::Stopped);
            result?;
        } else {
            // Workers of a completed or crashed job may still be winding down
            self.drain_workers().await;
        }
        Ok(())
    }

    /// Consistent view of the job, incremental from the query's cursors
    pub fn get_status(&self, query: &StatusQuery) -> StatusSnapshot {
        self.shared.snapshot(query)
    }

    /// Continues a persisted job owned by `requester`
    pub async fn resume_from_database(&self, job_id: i64, requester: &str) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        let record = self.authorize(job_id, requester)?;
        if record.status == JobStatus::Running {
            return Err(WalkerError::AlreadyRunning);
        }

        self.stop_active().await?;
        self.restore_job(&record)?;
        self.shared.status.send_replace(JobStatus::Paused);
        self.resume_locked()?;

        info!(
            "Resumed job {} from checkpoint ({} queued)",
            job_id,
            self.shared.frontier.lock().queued()
        );
        Ok(())
    }

    /// Loads a persisted job for viewing without starting workers
    ///
    /// The job keeps its persisted status; a job persisted as running is
    /// shown as paused. A loaded paused job can be continued with
    /// [`CrawlOrchestrator::resume_crawl`].
    pub async fn load_from_database(&self, job_id: i64, requester: &str) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        let record = self.authorize(job_id, requester)?;

        self.stop_active().await?;
        self.restore_job(&record)?;
        let view = match record.status {
            JobStatus::Running => JobStatus::Paused,
            other => other,
        };
        self.shared.status.send_replace(view);

        info!("Loaded job {} ({})", job_id, view);
        Ok(())
    }

    /// Applies a new configuration to work scheduled from now on
    ///
    /// Queued entries are not re-filtered. A larger `concurrency` spawns the
    /// missing workers immediately; a smaller one retires workers after
    /// their current page.
    pub async fn update_config(&self, config: CrawlConfig) -> Result<()> {
        validate_crawl_config(&config)?;
        let _lifecycle = self.lifecycle.lock().await;

        *self.shared.filter.write() = UrlFilter::from_config(&config);
        self.shared.robots.update_config(&config);
        self.shared.memory.set_limit(config.memory_limit);
        *self.shared.config.write() = config;

        if self.status() == JobStatus::Running {
            self.spawn_missing_slots();
        }
        debug!("Configuration updated for session {}", self.shared.session);
        Ok(())
    }

    /// Pauses a running job so a later process can resume it
    pub async fn shutdown(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        match self.status() {
            JobStatus::Running => {
                self.shared.transition(JobStatus::Paused)?;
                self.drain_workers().await;
                let result = self.shared.checkpoint();
                self.shared.persist_status(JobStatus::Paused);
                result
            }
            JobStatus::Paused => {
                self.drain_workers().await;
                self.shared.checkpoint()
            }
            _ => Ok(()),
        }
    }

    /// Waits until the job is no longer running and returns its status
    pub async fn wait_until_settled(&self) -> JobStatus {
        let mut rx = self.shared.status.subscribe();
        let settled = rx.wait_for(|status| *status != JobStatus::Running).await;
        match settled {
            Ok(status) => *status,
            Err(_) => self.status(),
        }
    }

    fn authorize(&self, job_id: i64, requester: &str) -> Result<JobRecord> {
        if self.status() == JobStatus::Running {
            return Err(WalkerError::AlreadyRunning);
        }
        let record = self
            .shared
            .store
            .lock()
            .load_job(job_id)?
            .ok_or(WalkerError::NotFound { job_id })?;
        if record.owner != requester {
            return Err(WalkerError::Unauthorized { job_id });
        }
        Ok(record)
    }

    fn reset(&self, config: &CrawlConfig, job: JobInfo) {
        let shared = &self.shared;
        *shared.config.write() = config.clone();
        *shared.filter.write() = UrlFilter::from_config(config);
        shared.robots.update_config(config);
        shared.robots.clear_cache();
        shared.robots.clear_blocked();
        shared.memory.set_limit(config.memory_limit);
        shared.scheduler.clear();
        shared.frontier.lock().clear();
        shared.results.write().clear(&job.base_domain);
        shared.since_checkpoint.store(0, Ordering::SeqCst);
        *shared.job.lock() = job;
    }

    /// Rebuilds frontier and results from the store
    fn restore_job(&self, record: &JobRecord) -> Result<()> {
        let (pages, links, issues, frontier) = {
            let store = self.shared.store.lock();
            (
                store.load_pages(record.id)?,
                store.load_links(record.id)?,
                store.load_issues(record.id)?,
                store.load_frontier(record.id)?,
            )
        };

        self.reset(
            &record.config,
            JobInfo {
                job_id: Some(record.id),
                owner: record.owner.clone(),
                base_url: record.base_url.clone(),
                base_domain: record.base_domain.clone(),
                started_at: Some(Utc::now()),
                last_error: None,
                force_refresh: true,
            },
        );

        let completed: HashSet<String> = pages.iter().map(|p| p.url.clone()).collect();
        {
            let filter = self.shared.filter.read();
            let mut restored = self.shared.frontier.lock();
            restored.restore(frontier.unwrap_or_default(), &completed);
            let requeued = requeue_link_targets(&mut restored, &pages, &links, &record.config, &filter);
            if requeued > 0 {
                info!("Re-queued {} URLs found on pages saved after the last checkpoint", requeued);
            }
            if restored.discovered() == 0 {
                restored.push(
                    FrontierEntry::new(&record.base_url, 0, None),
                    record.config.max_urls,
                );
            }
        }

        debug!(
            "Restored job {}: {} pages, {} links, {} issues",
            record.id,
            pages.len(),
            links.len(),
            issues.len()
        );
        self.shared.results.write().replace_all(pages, links, issues);
        Ok(())
    }

    fn spawn_workers(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.spawn_missing_slots();
    }

    /// Spawns a worker for every slot below `concurrency` without a live one
    fn spawn_missing_slots(&self) {
        let generation = self.shared.generation.load(Ordering::SeqCst);
        let concurrency = self.shared.config.read().concurrency;
        let mut workers = self.workers.lock();
        workers.retain(|(_, _, handle)| !handle.is_finished());

        for slot in 0..concurrency {
            if workers.iter().any(|(s, g, _)| *s == slot && *g == generation) {
                continue;
            }
            let handle = tokio::spawn(run_worker(Arc::clone(&self.shared), slot, generation));
            workers.push((slot, generation, handle));
        }
        debug!("{} workers active", workers.len());
    }

    /// Waits for every worker task to exit
    async fn drain_workers(&self) {
        self.shared.work.notify_waiters();
        let handles = std::mem::take(&mut *self.workers.lock());
        for (slot, _, handle) in handles {
            if let Err(e) = handle.await {
                warn!("Worker {} ended abnormally: {}", slot, e);
            }
        }
    }
}

/// Queues link targets of restored pages that the frontier does not know
///
/// Pages can be saved after the frontier checkpoint was taken; the URLs
/// they discovered only exist in their stored links. Depth, scope, filter
/// and URL budget apply as they do during the crawl.
fn requeue_link_targets(
    frontier: &mut Frontier,
    pages: &[CrawledPage],
    links: &[Link],
    config: &CrawlConfig,
    filter: &UrlFilter,
) -> usize {
    let depths: HashMap<&str, u32> = pages.iter().map(|p| (p.url.as_str(), p.depth)).collect();
    let mut added = 0;

    for link in links {
        let Some(&depth) = depths.get(link.source_url.as_str()) else {
            continue;
        };
        if depth >= config.max_depth || frontier.is_known(&link.target_url) {
            continue;
        }
        if !link.is_internal && !config.crawl_external {
            continue;
        }
        let Ok(target) = Url::parse(&link.target_url) else {
            continue;
        };
        if filter.check(&target).is_err() {
            continue;
        }

        let entry = FrontierEntry::new(&link.target_url, depth + 1, Some(&link.source_url));
        match frontier.push(entry, config.max_urls) {
            Enqueue::Added => added += 1,
            Enqueue::Known => {}
            Enqueue::LimitReached => break,
        }
    }
    added
}

impl Drop for CrawlOrchestrator {
    fn drop(&mut self) {
        for (_, _, handle) in self.workers.lock().drain(..) {
            handle.abort();
        }
    }
}
