//! URL handling module for Newt-Walker
//!
//! This module provides URL normalization, host extraction, crawl filters
//! and the internal/external link scope classification.

mod domain;
mod filter;
mod normalize;

use serde::{Deserialize, Serialize};

// Re-export main functions
pub use domain::{extract_domain, host_key, is_same_site};
pub use filter::{path_extension, FilterRejection, UrlFilter};
pub use normalize::{normalize_url, resolve_and_normalize};

/// Scope of a URL relative to the crawl's base domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkScope {
    /// Same site as the seed (ignoring a `www.` prefix)
    Internal,
    /// Any other host
    External,
}

impl LinkScope {
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal)
    }
}

/// Classifies a URL against the crawl's base domain
///
/// # Examples
///
/// ```
/// use url::Url;
/// use newt_walker::url::{classify_scope, LinkScope};
///
/// let url = Url::parse("https://www.example.com/about").unwrap();
/// assert_eq!(classify_scope(&url, "example.com"), LinkScope::Internal);
/// ```
pub fn classify_scope(url: &::url::Url, base_domain: &str) -> LinkScope {
    match extract_domain(url) {
        Some(domain) if is_same_site(&domain, base_domain) => LinkScope::Internal,
        _ => LinkScope::External,
    }
}
