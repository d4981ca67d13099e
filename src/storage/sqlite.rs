//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the CheckpointStore trait.

use crate::crawler::{CrawledPage, FrontierSnapshot};
use crate::issues::Issue;
use crate::links::Link;
use crate::state::JobStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{CheckpointStore, StorageError, StorageResult};
use crate::storage::{JobRecord, NewJob};
use crate::WalkerError;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

const JOB_COLUMNS: &str = "id, owner, session, base_url, base_domain, status, config, \
     config_hash, discovered, crawled, created_at, updated_at";

/// Records of one job waiting for the next batch write
#[derive(Debug, Default)]
struct WriteBuffer {
    pages: Vec<CrawledPage>,
    links: Vec<Link>,
    issues: Vec<Issue>,
}

impl WriteBuffer {
    fn len(&self) -> usize {
        self.pages.len() + self.links.len() + self.issues.len()
    }
}

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
    batch_size: usize,
    buffers: HashMap<i64, WriteBuffer>,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path, batch_size: usize) -> Result<Self, WalkerError> {
        let conn = Connection::open(path).map_err(StorageError::from)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )
        .map_err(StorageError::from)?;

        initialize_schema(&conn).map_err(StorageError::from)?;

        Ok(Self {
            conn,
            batch_size: batch_size.max(1),
            buffers: HashMap::new(),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory(batch_size: usize) -> Result<Self, WalkerError> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(StorageError::from)?;
        initialize_schema(&conn).map_err(StorageError::from)?;
        Ok(Self {
            conn,
            batch_size: batch_size.max(1),
            buffers: HashMap::new(),
        })
    }

    /// Writes a job's whole buffer in one transaction
    fn flush_buffer(&mut self, job_id: i64) -> StorageResult<usize> {
        let Some(buffer) = self.buffers.get(&job_id) else {
            return Ok(0);
        };
        let written = buffer.len();
        if written == 0 {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        write_pages(&tx, job_id, &buffer.pages)?;
        write_links(&tx, job_id, &buffer.links)?;
        write_issues(&tx, job_id, &buffer.issues)?;
        tx.execute(
            "UPDATE jobs SET updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), job_id],
        )?;
        tx.commit()?;

        debug!("Flushed {} records for job {}", written, job_id);
        self.buffers.remove(&job_id);
        Ok(written)
    }

    fn load_json<T: DeserializeOwned>(&self, sql: &str, job_id: i64) -> StorageResult<Vec<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![job_id], |row| row.get::<_, String>(0))?;

        let mut out = Vec::new();
        for data in rows {
            out.push(serde_json::from_str(&data?)?);
        }
        Ok(out)
    }
}

fn write_pages(tx: &Transaction<'_>, job_id: i64, pages: &[CrawledPage]) -> StorageResult<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO pages (job_id, url, status_code, depth, data) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for page in pages {
        stmt.execute(params![
            job_id,
            page.url,
            page.status_code,
            page.depth,
            serde_json::to_string(page)?
        ])?;
    }
    Ok(())
}

fn write_links(tx: &Transaction<'_>, job_id: i64, links: &[Link]) -> StorageResult<()> {
    // Upsert keeps the row id, so load order stays insertion order
    let mut stmt = tx.prepare_cached(
        "INSERT INTO links (job_id, source_url, target_url, is_internal, data)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(job_id, source_url, target_url)
         DO UPDATE SET is_internal = excluded.is_internal, data = excluded.data",
    )?;
    for link in links {
        stmt.execute(params![
            job_id,
            link.source_url,
            link.target_url,
            link.is_internal,
            serde_json::to_string(link)?
        ])?;
    }
    Ok(())
}

fn write_issues(tx: &Transaction<'_>, job_id: i64, issues: &[Issue]) -> StorageResult<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO issues (job_id, url, issue_type, data) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for issue in issues {
        stmt.execute(params![
            job_id,
            issue.url,
            issue.issue_type.to_string(),
            serde_json::to_string(issue)?
        ])?;
    }
    Ok(())
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
    let status: String = row.get(5)?;
    let config: String = row.get(6)?;
    Ok(JobRecord {
        id: row.get(0)?,
        owner: row.get(1)?,
        session: row.get(2)?,
        base_url: row.get(3)?,
        base_domain: row.get(4)?,
        // Unknown statuses can only come from a newer schema; treat them as dead
        status: JobStatus::from_db_string(&status).unwrap_or(JobStatus::Failed),
        config: serde_json::from_str(&config).map_err(|e| conversion_error(6, e))?,
        config_hash: row.get(7)?,
        discovered: row.get::<_, i64>(8)? as usize,
        crawled: row.get::<_, i64>(9)? as usize,
        created_at: parse_timestamp(row, 10)?,
        updated_at: parse_timestamp(row, 11)?,
    })
}

impl CheckpointStore for SqliteStorage {
    // ===== Job Management =====

    fn create_job(&mut self, job: &NewJob) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO jobs (owner, session, base_url, base_domain, status, config,
                               config_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                job.owner,
                job.session,
                job.base_url,
                job.base_domain,
                JobStatus::Running.to_db_string(),
                serde_json::to_string(&job.config)?,
                job.config_hash,
                now
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn set_status(&mut self, job_id: i64, status: JobStatus) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE jobs SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), Utc::now().to_rfc3339(), job_id],
        )?;
        if changed == 0 {
            return Err(StorageError::JobNotFound(job_id));
        }
        Ok(())
    }

    fn update_progress(
        &mut self,
        job_id: i64,
        discovered: usize,
        crawled: usize,
    ) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE jobs SET discovered = ?1, crawled = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                discovered as i64,
                crawled as i64,
                Utc::now().to_rfc3339(),
                job_id
            ],
        )?;
        Ok(())
    }

    fn load_job(&self, job_id: i64) -> StorageResult<Option<JobRecord>> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS);
        let job = self
            .conn
            .query_row(&sql, params![job_id], row_to_job)
            .optional()?;
        Ok(job)
    }

    fn list_jobs(&self, owner: Option<&str>) -> StorageResult<Vec<JobRecord>> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE (?1 IS NULL OR owner = ?1) ORDER BY id DESC",
            JOB_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params![owner], row_to_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    fn list_crashed_jobs(&self) -> StorageResult<Vec<JobRecord>> {
        let sql = format!("SELECT {} FROM jobs WHERE status = ?1 ORDER BY id", JOB_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params![JobStatus::Running.to_db_string()], row_to_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    // ===== Results =====

    fn save_batch(
        &mut self,
        job_id: i64,
        pages: &[CrawledPage],
        links: &[Link],
        issues: &[Issue],
        force: bool,
    ) -> StorageResult<usize> {
        let buffer = self.buffers.entry(job_id).or_default();
        buffer.pages.extend_from_slice(pages);
        buffer.links.extend_from_slice(links);
        buffer.issues.extend_from_slice(issues);

        if force || buffer.len() >= self.batch_size {
            return self.flush_buffer(job_id);
        }
        Ok(0)
    }

    fn buffered(&self) -> usize {
        self.buffers.values().map(WriteBuffer::len).sum()
    }

    fn load_pages(&self, job_id: i64) -> StorageResult<Vec<CrawledPage>> {
        self.load_json("SELECT data FROM pages WHERE job_id = ?1 ORDER BY id", job_id)
    }

    fn load_links(&self, job_id: i64) -> StorageResult<Vec<Link>> {
        self.load_json("SELECT data FROM links WHERE job_id = ?1 ORDER BY id", job_id)
    }

    fn load_issues(&self, job_id: i64) -> StorageResult<Vec<Issue>> {
        self.load_json("SELECT data FROM issues WHERE job_id = ?1 ORDER BY id", job_id)
    }

    // ===== Frontier =====

    fn save_frontier_checkpoint(
        &mut self,
        job_id: i64,
        frontier: &FrontierSnapshot,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO frontier_checkpoints (job_id, data, saved_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(job_id) DO UPDATE SET data = excluded.data, saved_at = excluded.saved_at",
            params![job_id, serde_json::to_string(frontier)?, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn load_frontier(&self, job_id: i64) -> StorageResult<Option<FrontierSnapshot>> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM frontier_checkpoints WHERE job_id = ?1",
                params![job_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
    }
}
