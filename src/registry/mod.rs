//! Session registry
//!
//! Maps opaque session keys to one [`CrawlOrchestrator`] and its settings.
//! Entries idle past the configured TTL are stopped and dropped by a
//! background sweep.

use crate::config::{validate_crawl_config, CrawlConfig, EngineConfig, MemoryConfig};
use crate::crawler::{CrawlOrchestrator, Fetcher, StatusQuery, StatusSnapshot};
use crate::issues::filter_issues_by_exclusion_patterns;
use crate::memory::MemoryState;
use crate::storage::SharedStore;
use crate::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct Entry {
    orchestrator: Arc<CrawlOrchestrator>,
    settings: CrawlConfig,
    last_access: Instant,
}

/// Owns the orchestrators of all live sessions
pub struct InstanceRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    defaults: CrawlConfig,
    memory: MemoryConfig,
    idle_ttl: Duration,
    eviction_interval: Duration,
    sample_interval: Duration,
    fetcher: Arc<dyn Fetcher>,
    store: SharedStore,
}

impl InstanceRegistry {
    pub fn new(config: &EngineConfig, fetcher: Arc<dyn Fetcher>, store: SharedStore) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            defaults: config.crawler.clone(),
            memory: config.memory.clone(),
            idle_ttl: Duration::from_secs(config.registry.idle_ttl_secs),
            eviction_interval: Duration::from_secs(config.registry.eviction_interval_secs.max(1)),
            sample_interval: Duration::from_millis(config.memory.sample_interval_ms.max(100)),
            fetcher,
            store,
        }
    }

    /// The session's orchestrator, created on first use
    pub fn get_or_create(&self, session: &str) -> Arc<CrawlOrchestrator> {
        let mut entries = self.entries.lock();
        let entry = entries.entry(session.to_string()).or_insert_with(|| {
            debug!("Creating orchestrator for session {}", session);
            Entry {
                orchestrator: Arc::new(CrawlOrchestrator::new(
                    session,
                    self.defaults.clone(),
                    &self.memory,
                    Arc::clone(&self.fetcher),
                    Arc::clone(&self.store),
                )),
                settings: self.defaults.clone(),
                last_access: Instant::now(),
            }
        });
        entry.last_access = Instant::now();
        Arc::clone(&entry.orchestrator)
    }

    /// The session's crawl settings, or the engine defaults for a new session
    pub fn settings(&self, session: &str) -> CrawlConfig {
        self.entries
            .lock()
            .get(session)
            .map_or_else(|| self.defaults.clone(), |e| e.settings.clone())
    }

    /// Replaces the session's settings and applies them to its orchestrator
    pub async fn update_settings(&self, session: &str, settings: CrawlConfig) -> Result<()> {
        validate_crawl_config(&settings)?;
        let orchestrator = self.get_or_create(session);
        if let Some(entry) = self.entries.lock().get_mut(session) {
            entry.settings = settings.clone();
        }
        orchestrator.update_config(settings).await
    }

    /// Status of the session's job with excluded issues filtered out
    ///
    /// Exclusion is applied on every read, so changing the patterns affects
    /// past issues too. Cursors still count every stored issue.
    pub fn status(&self, session: &str, query: &StatusQuery) -> Option<StatusSnapshot> {
        let (orchestrator, patterns) = {
            let mut entries = self.entries.lock();
            let entry = entries.get_mut(session)?;
            entry.last_access = Instant::now();
            (
                Arc::clone(&entry.orchestrator),
                entry.settings.issue_exclusion_patterns.clone(),
            )
        };

        let mut snapshot = orchestrator.get_status(query);
        snapshot.issues = filter_issues_by_exclusion_patterns(snapshot.issues, &patterns);
        Some(snapshot)
    }

    /// Drops a session after stopping its job
    pub async fn remove(&self, session: &str) -> Result<bool> {
        let removed = self.entries.lock().remove(session);
        match removed {
            Some(entry) => {
                entry.orchestrator.stop_crawl().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Stops and drops every session idle longer than the TTL
    ///
    /// Returns the number of evicted sessions.
    pub async fn evict_idle(&self) -> usize {
        let expired: Vec<(String, Arc<CrawlOrchestrator>)> = {
            let mut entries = self.entries.lock();
            let keys: Vec<String> = entries
                .iter()
                .filter(|(_, e)| e.last_access.elapsed() >= self.idle_ttl)
                .map(|(k, _)| k.clone())
                .collect();
            keys.into_iter()
                .filter_map(|k| entries.remove(&k).map(|e| (k, e.orchestrator)))
                .collect()
        };

        for (session, orchestrator) in &expired {
            if let Err(e) = orchestrator.stop_crawl().await {
                warn!("Failed to stop evicted session {}: {}", session, e);
            }
            debug!("Evicted idle session {}", session);
        }

        if !expired.is_empty() {
            info!("Evicted {} idle session(s)", expired.len());
        }
        expired.len()
    }

    /// Runs [`InstanceRegistry::evict_idle`] on the configured interval
    pub fn spawn_eviction_loop(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.eviction_interval);
            interval.tick().await;
            loop {
                interval.tick().await;
                self.evict_idle().await;
            }
        })
    }

    fn orchestrators(&self) -> Vec<Arc<CrawlOrchestrator>> {
        self.entries
            .lock()
            .values()
            .map(|e| Arc::clone(&e.orchestrator))
            .collect()
    }

    /// Refreshes the memory reading of every session
    ///
    /// Returns the number of sessions at or above the soft threshold.
    pub fn sample_memory(&self) -> usize {
        let mut pressured = 0;
        for orchestrator in self.orchestrators() {
            let sample = orchestrator.sample_memory();
            if sample.state != MemoryState::Normal {
                debug!(
                    "Session {} memory at {:?} ({} bytes)",
                    orchestrator.session(),
                    sample.state,
                    sample.bytes
                );
                pressured += 1;
            }
        }
        pressured
    }

    /// Runs [`InstanceRegistry::sample_memory`] on the configured interval,
    /// so readings stay current while workers are idle
    pub fn spawn_sampling_loop(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.sample_interval);
            loop {
                interval.tick().await;
                self.sample_memory();
            }
        })
    }

    /// Checkpoints every session so running jobs can be resumed later
    pub async fn shutdown_all(&self) {
        let orchestrators = self.orchestrators();
        info!("Shutting down {} session(s)", orchestrators.len());
        for orchestrator in orchestrators {
            if let Err(e) = orchestrator.shutdown().await {
                warn!(
                    "Shutdown of session {} failed: {}",
                    orchestrator.session(),
                    e
                );
            }
        }
    }
}
