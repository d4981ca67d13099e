use crate::config::CrawlConfig;
use regex::Regex;
use url::Url;

/// Why a URL was rejected by the crawl filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterRejection {
    ExcludedExtension,
    NotIncludedExtension,
    ExcludedPattern,
    NotIncludedPattern,
}

/// Extension and pattern filters compiled from a [`CrawlConfig`]
///
/// Patterns are regular expressions searched anywhere in the full URL. A
/// pattern that is not a valid regex is matched as a literal substring.
#[derive(Debug, Clone)]
pub struct UrlFilter {
    include_extensions: Vec<String>,
    exclude_extensions: Vec<String>,
    include_patterns: Vec<Regex>,
    exclude_patterns: Vec<Regex>,
}

impl UrlFilter {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            include_extensions: normalize_extensions(&config.include_extensions),
            exclude_extensions: normalize_extensions(&config.exclude_extensions),
            include_patterns: compile_patterns(&config.include_patterns),
            exclude_patterns: compile_patterns(&config.exclude_patterns),
        }
    }

    /// Checks a URL against every filter
    ///
    /// URLs whose last path segment has no extension pass the extension
    /// filters, since most pages are served from extension-less paths.
    pub fn check(&self, url: &Url) -> Result<(), FilterRejection> {
        if let Some(ext) = path_extension(url) {
            if self.exclude_extensions.contains(&ext) {
                return Err(FilterRejection::ExcludedExtension);
            }
            if !self.include_extensions.is_empty() && !self.include_extensions.contains(&ext) {
                return Err(FilterRejection::NotIncludedExtension);
            }
        }

        let text = url.as_str();
        if self.exclude_patterns.iter().any(|re| re.is_match(text)) {
            return Err(FilterRejection::ExcludedPattern);
        }
        if !self.include_patterns.is_empty()
            && !self.include_patterns.iter().any(|re| re.is_match(text))
        {
            return Err(FilterRejection::NotIncludedPattern);
        }

        Ok(())
    }

    pub fn allows(&self, url: &Url) -> bool {
        self.check(url).is_ok()
    }
}

/// Lowercase extension of the last path segment, if it has one
pub fn path_extension(url: &Url) -> Option<String> {
    let last = url.path_segments()?.last()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

fn normalize_extensions(exts: &[String]) -> Vec<String> {
    exts.iter()
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

fn compile_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .filter_map(|p| {
            Regex::new(p).or_else(|_| Regex::new(&regex::escape(p))).ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_default_extensions() {
        let filter = UrlFilter::from_config(&CrawlConfig::default());
        assert!(filter.allows(&url("https://example.com/")));
        assert!(filter.allows(&url("https://example.com/about")));
        assert!(filter.allows(&url("https://example.com/index.PHP")));
        assert_eq!(
            filter.check(&url("https://example.com/report.pdf")),
            Err(FilterRejection::ExcludedExtension)
        );
        assert_eq!(
            filter.check(&url("https://example.com/photo.jpg")),
            Err(FilterRejection::NotIncludedExtension)
        );
    }

    #[test]
    fn test_patterns() {
        let config = CrawlConfig {
            include_patterns: vec!["/blog/".to_string()],
            exclude_patterns: vec![r"/blog/drafts?/".to_string()],
            ..CrawlConfig::default()
        };
        let filter = UrlFilter::from_config(&config);

        assert!(filter.allows(&url("https://example.com/blog/post")));
        assert_eq!(
            filter.check(&url("https://example.com/blog/drafts/x")),
            Err(FilterRejection::ExcludedPattern)
        );
        assert_eq!(
            filter.check(&url("https://example.com/shop")),
            Err(FilterRejection::NotIncludedPattern)
        );
    }

    #[test]
    fn test_invalid_regex_is_literal() {
        let config = CrawlConfig {
            exclude_patterns: vec!["[unclosed".to_string()],
            ..CrawlConfig::default()
        };
        let filter = UrlFilter::from_config(&config);
        assert!(!filter.allows(&url("https://example.com/a[unclosed")));
        assert!(filter.allows(&url("https://example.com/a")));
    }

    #[test]
    fn test_path_extension() {
        assert_eq!(path_extension(&url("https://e.com/a/b.HTML")), Some("html".into()));
        assert_eq!(path_extension(&url("https://e.com/a/")), None);
        assert_eq!(path_extension(&url("https://e.com/.hidden")), None);
    }
}
