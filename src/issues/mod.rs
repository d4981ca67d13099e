//! SEO issue detection and read-time filtering
//!
//! [`IssueDetector`] runs a registry of [`IssueCheck`]s over every crawled
//! page and keeps the results in an append-only store. Exclusion patterns are
//! applied only when issues are read, see [`filter_issues_by_exclusion_patterns`].

mod detector;
mod filter;

pub use detector::{default_checks, IssueCheck, IssueDetector, PageHistory};
pub use filter::{filter_issues_by_exclusion_patterns, glob_matches, is_excluded};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Title,
    MetaDescription,
    Headings,
    Content,
    Images,
    Links,
    Status,
    Redirects,
    Indexability,
    Technical,
}

/// One detected problem on one URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub url: String,
    #[serde(rename = "type")]
    pub issue_type: Severity,
    pub category: IssueCategory,
    pub message: String,
    pub details: String,
    pub detected_at: DateTime<Utc>,
}

impl Issue {
    pub fn new(
        url: &str,
        issue_type: Severity,
        category: IssueCategory,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            url: url.to_string(),
            issue_type,
            category,
            message: message.into(),
            details: details.into(),
            detected_at: Utc::now(),
        }
    }

    pub fn error(url: &str, category: IssueCategory, message: impl Into<String>, details: impl Into<String>) -> Self {
        Self::new(url, Severity::Error, category, message, details)
    }

    pub fn warning(url: &str, category: IssueCategory, message: impl Into<String>, details: impl Into<String>) -> Self {
        Self::new(url, Severity::Warning, category, message, details)
    }

    pub fn info(url: &str, category: IssueCategory, message: impl Into<String>, details: impl Into<String>) -> Self {
        Self::new(url, Severity::Info, category, message, details)
    }
}
