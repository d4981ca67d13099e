//! Process memory sampling for crawl backpressure
//!
//! [`MemoryMonitor`] samples resident memory through a [`MemoryProbe`] and
//! classifies it against soft and hard thresholds derived from the job's
//! `memory-limit`.

use crate::config::MemoryConfig;
use crate::state::ResultCounts;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{trace, warn};

// Rough per-record footprints used for the collection estimate
const PAGE_BYTES: u64 = 2048;
const LINK_BYTES: u64 = 320;
const ISSUE_BYTES: u64 = 256;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryState {
    #[default]
    Normal,
    Soft,
    Hard,
}

/// One reading of process memory
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemorySample {
    pub timestamp: DateTime<Utc>,
    pub bytes: u64,
    pub state: MemoryState,
}

/// Estimated footprint of the in-memory crawl collections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionEstimate {
    pub pages: usize,
    pub links: usize,
    pub issues: usize,
    pub approx_bytes: u64,
}

/// Current monitor state for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub current: Option<MemorySample>,
    pub peak_bytes: u64,
    pub limit_bytes: u64,
    pub soft_bytes: u64,
    pub hard_bytes: u64,
}

/// Source of memory readings
pub trait MemoryProbe: Send + Sync {
    /// Resident memory of the process in bytes
    fn resident_bytes(&self) -> Option<u64>;
}

/// Reads this process's memory through `sysinfo`
pub struct ProcessMemoryProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl ProcessMemoryProbe {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| warn!("Cannot determine current pid, memory sampling disabled: {}", e))
            .ok();
        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }
}

impl Default for ProcessMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    fn resident_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        system.process(pid).map(|p| p.memory())
    }
}

/// Probe returning a settable value
#[derive(Debug, Clone, Default)]
pub struct FixedProbe(Arc<AtomicU64>);

impl FixedProbe {
    pub fn new(bytes: u64) -> Self {
        Self(Arc::new(AtomicU64::new(bytes)))
    }

    pub fn set(&self, bytes: u64) {
        self.0.store(bytes, Ordering::SeqCst);
    }
}

impl MemoryProbe for FixedProbe {
    fn resident_bytes(&self) -> Option<u64> {
        Some(self.0.load(Ordering::SeqCst))
    }
}

struct Thresholds {
    limit: u64,
    soft: u64,
    hard: u64,
}

struct Readings {
    last: Option<(Instant, MemorySample)>,
    peak: u64,
}

pub struct MemoryMonitor {
    probe: Box<dyn MemoryProbe>,
    config: MemoryConfig,
    thresholds: Mutex<Thresholds>,
    readings: Mutex<Readings>,
}

impl std::fmt::Debug for MemoryMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMonitor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MemoryMonitor {
    pub fn new(config: &MemoryConfig, memory_limit: u64) -> Self {
        Self::with_probe(Box::new(ProcessMemoryProbe::new()), config, memory_limit)
    }

    pub fn with_probe(probe: Box<dyn MemoryProbe>, config: &MemoryConfig, memory_limit: u64) -> Self {
        Self {
            probe,
            config: config.clone(),
            thresholds: Mutex::new(Self::thresholds_for(config, memory_limit)),
            readings: Mutex::new(Readings { last: None, peak: 0 }),
        }
    }

    fn thresholds_for(config: &MemoryConfig, limit: u64) -> Thresholds {
        Thresholds {
            limit,
            soft: (limit as f64 * config.soft_ratio) as u64,
            hard: (limit as f64 * config.hard_ratio) as u64,
        }
    }

    /// Applies a new `memory-limit`; the next sample uses it
    pub fn set_limit(&self, memory_limit: u64) {
        *self.thresholds.lock() = Self::thresholds_for(&self.config, memory_limit);
        self.readings.lock().last = None;
    }

    pub fn backpressure_wait(&self) -> Duration {
        Duration::from_millis(self.config.backpressure_wait_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.config.sample_interval_ms)
    }

    pub fn classify(&self, bytes: u64) -> MemoryState {
        let t = self.thresholds.lock();
        if bytes >= t.hard {
            MemoryState::Hard
        } else if bytes >= t.soft {
            MemoryState::Soft
        } else {
            MemoryState::Normal
        }
    }

    /// Takes a fresh reading
    ///
    /// A probe that cannot read memory reports zero bytes, which is always normal.
    pub fn sample(&self) -> MemorySample {
        let bytes = self.probe.resident_bytes().unwrap_or(0);
        let sample = MemorySample {
            timestamp: Utc::now(),
            bytes,
            state: self.classify(bytes),
        };
        trace!("Memory sample: {} bytes ({:?})", bytes, sample.state);

        let mut readings = self.readings.lock();
        readings.peak = readings.peak.max(bytes);
        readings.last = Some((Instant::now(), sample));
        sample
    }

    /// Returns the last reading unless it is older than the sample interval
    pub fn sample_if_stale(&self) -> MemorySample {
        {
            let readings = self.readings.lock();
            if let Some((taken, sample)) = readings.last {
                if taken.elapsed() < self.sample_interval() {
                    return sample;
                }
            }
        }
        self.sample()
    }

    pub fn current(&self) -> Option<MemorySample> {
        self.readings.lock().last.map(|(_, s)| s)
    }

    pub fn stats(&self) -> MemoryStats {
        let readings = self.readings.lock();
        let t = self.thresholds.lock();
        MemoryStats {
            current: readings.last.map(|(_, s)| s),
            peak_bytes: readings.peak,
            limit_bytes: t.limit,
            soft_bytes: t.soft,
            hard_bytes: t.hard,
        }
    }

    /// Approximate size of the crawl's in-memory collections
    pub fn collection_estimate(&self, counts: ResultCounts) -> CollectionEstimate {
        CollectionEstimate {
            pages: counts.pages,
            links: counts.links,
            issues: counts.issues,
            approx_bytes: counts.pages as u64 * PAGE_BYTES
                + counts.links as u64 * LINK_BYTES
                + counts.issues as u64 * ISSUE_BYTES,
        }
    }
}
