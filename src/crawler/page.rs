use crate::analysis::ContentMetrics;
use crate::crawler::RedirectHop;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One crawled URL and everything extracted from it
///
/// Failed fetches are recorded too, with `status_code` 0 and `error` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawledPage {
    pub url: String,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub size_bytes: u64,
    pub response_time_ms: u64,
    pub depth: u32,
    pub parent_url: Option<String>,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_robots: Option<String>,
    pub canonical_url: Option<String>,
    pub h1: Vec<String>,
    pub h2: Vec<String>,
    pub lang: Option<String>,
    pub has_structured_data: bool,
    pub internal_links: usize,
    pub external_links: usize,
    pub images_missing_alt: usize,
    pub redirect_chain: Vec<RedirectHop>,
    pub error: Option<String>,
    pub analysis: Option<ContentMetrics>,
    pub crawled_at: DateTime<Utc>,
}

impl CrawledPage {
    /// A bare record for `url`; extraction fills in the rest
    pub fn new(url: &str, depth: u32, parent_url: Option<&str>) -> Self {
        Self {
            url: url.to_string(),
            status_code: 0,
            content_type: None,
            size_bytes: 0,
            response_time_ms: 0,
            depth,
            parent_url: parent_url.map(str::to_string),
            title: None,
            meta_description: None,
            meta_robots: None,
            canonical_url: None,
            h1: Vec::new(),
            h2: Vec::new(),
            lang: None,
            has_structured_data: false,
            internal_links: 0,
            external_links: 0,
            images_missing_alt: 0,
            redirect_chain: Vec::new(),
            error: None,
            analysis: None,
            crawled_at: Utc::now(),
        }
    }

    /// A record for a fetch that failed after all retries
    pub fn failed(url: &str, depth: u32, parent_url: Option<&str>, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::new(url, depth, parent_url)
        }
    }

    /// 2xx response whose body was parsed as HTML
    pub fn is_html_success(&self) -> bool {
        self.error.is_none()
            && (200..300).contains(&self.status_code)
            && self
                .content_type
                .as_deref()
                .map_or(true, |ct| ct.to_ascii_lowercase().contains("html"))
    }

    pub fn is_error_status(&self) -> bool {
        self.status_code >= 400
    }

    pub fn is_noindex(&self) -> bool {
        self.meta_robots
            .as_deref()
            .map_or(false, |r| r.to_ascii_lowercase().contains("noindex"))
    }
}
