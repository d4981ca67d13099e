//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Job records and lifecycle status
//! - Buffered batch writes of pages, links and issues
//! - Frontier checkpoints for resumption

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{CheckpointStore, StorageError, StorageResult};

use crate::config::CrawlConfig;
use crate::state::JobStatus;
use crate::WalkerError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// A checkpoint store shared between the orchestrator and its workers
pub type SharedStore = Arc<Mutex<dyn CheckpointStore>>;

/// Opens (creating if needed) an SQLite store at `path`
pub fn open_storage(path: &Path, batch_size: usize) -> Result<SqliteStorage, WalkerError> {
    SqliteStorage::new(path, batch_size)
}

/// Wraps a store for sharing
pub fn shared<S: CheckpointStore + 'static>(store: S) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Fields needed to create a job record
#[derive(Debug, Clone)]
pub struct NewJob {
    pub owner: String,
    pub session: String,
    pub base_url: String,
    pub base_domain: String,
    pub config: CrawlConfig,
    pub config_hash: String,
}

/// A persisted crawl job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: i64,
    pub owner: String,
    pub session: String,
    pub base_url: String,
    pub base_domain: String,
    pub status: JobStatus,
    pub config: CrawlConfig,
    pub config_hash: String,
    pub discovered: usize,
    pub crawled: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
