//! Startup sweep for jobs orphaned by a dead process

use crate::state::JobStatus;
use crate::storage::SharedStore;
use crate::{Result, WalkerError};
use tracing::{info, warn};

/// Marks every job still persisted as `running` as `failed`
///
/// Must run before any orchestrator starts in this process: at that point a
/// `running` row can only belong to a process that died mid-crawl. Swept
/// jobs are never resumed automatically. Returns the swept job ids.
pub fn recover_crashed_jobs(store: &SharedStore) -> Result<Vec<i64>> {
    let mut store = store.lock();
    let orphaned = store.list_crashed_jobs()?;

    let mut swept = Vec::with_capacity(orphaned.len());
    for job in orphaned {
        warn!(
            "{}; marking it failed",
            WalkerError::CrashDetected { job_id: job.id }
        );
        store.set_status(job.id, JobStatus::Failed)?;
        swept.push(job.id);
    }

    if !swept.is_empty() {
        info!("Crash recovery swept {} job(s)", swept.len());
    }
    Ok(swept)
}
