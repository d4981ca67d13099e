//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `JobStatus`: lifecycle state machine of a crawl job
//! - `DomainState`: per-host request pacing
//! - `AppendLog`: append-only sequence read through cursors
//! - `ResultSet`: pages, links and issues of the active job

mod append_log;
mod domain_state;
mod job_state;
mod results;

// Re-export main types
pub use append_log::AppendLog;
pub use domain_state::DomainState;
pub use job_state::JobStatus;
pub use results::{PendingBatch, ResultCounts, ResultSet};
