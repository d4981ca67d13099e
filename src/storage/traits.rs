//! Storage traits and error types
//!
//! This module defines the checkpoint interface the orchestrator persists
//! through, and its error type.

use crate::crawler::{CrawledPage, FrontierSnapshot};
use crate::issues::Issue;
use crate::links::Link;
use crate::state::JobStatus;
use crate::storage::{JobRecord, NewJob};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence of crawl jobs and their results
///
/// Implementations are shared behind a mutex by the orchestrator. Every write
/// either lands completely or not at all; a failed write leaves earlier
/// checkpoints intact.
pub trait CheckpointStore: Send {
    // ===== Job Management =====

    /// Creates a job record with status `running` and returns its id
    fn create_job(&mut self, job: &NewJob) -> StorageResult<i64>;

    /// Moves a job to `status`
    fn set_status(&mut self, job_id: i64, status: JobStatus) -> StorageResult<()>;

    /// Records discovered/crawled counters
    fn update_progress(&mut self, job_id: i64, discovered: usize, crawled: usize)
        -> StorageResult<()>;

    fn load_job(&self, job_id: i64) -> StorageResult<Option<JobRecord>>;

    /// Jobs of one owner, or all jobs, newest first
    fn list_jobs(&self, owner: Option<&str>) -> StorageResult<Vec<JobRecord>>;

    /// Jobs still marked `running`; at process start these were orphaned by a crash
    fn list_crashed_jobs(&self) -> StorageResult<Vec<JobRecord>>;

    // ===== Results =====

    /// Buffers records and writes them once the batch size is reached
    ///
    /// With `force` the buffer is written regardless of size. Returns the
    /// number of records written by this call (zero while buffering).
    /// Records passed in stay buffered when the write fails and are retried
    /// by the next call.
    fn save_batch(
        &mut self,
        job_id: i64,
        pages: &[CrawledPage],
        links: &[Link],
        issues: &[Issue],
        force: bool,
    ) -> StorageResult<usize>;

    /// Records buffered but not yet written
    fn buffered(&self) -> usize;

    fn load_pages(&self, job_id: i64) -> StorageResult<Vec<CrawledPage>>;

    fn load_links(&self, job_id: i64) -> StorageResult<Vec<Link>>;

    fn load_issues(&self, job_id: i64) -> StorageResult<Vec<Issue>>;

    // ===== Frontier =====

    /// Replaces the job's frontier checkpoint
    fn save_frontier_checkpoint(
        &mut self,
        job_id: i64,
        frontier: &FrontierSnapshot,
    ) -> StorageResult<()>;

    fn load_frontier(&self, job_id: i64) -> StorageResult<Option<FrontierSnapshot>>;
}
