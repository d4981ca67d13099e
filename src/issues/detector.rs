use super::{Issue, IssueCategory};
use crate::crawler::CrawledPage;
use crate::state::AppendLog;
use std::collections::HashMap;
use tracing::debug;

const TITLE_MIN_LEN: usize = 30;
const TITLE_MAX_LEN: usize = 60;
const META_DESCRIPTION_MIN_LEN: usize = 50;
const META_DESCRIPTION_MAX_LEN: usize = 160;
const MIN_READABILITY: f64 = 30.0;
const MAX_REDIRECT_HOPS: usize = 3;

/// Titles and meta descriptions already seen in this crawl
///
/// Values are the first URL that used each (normalized) text.
#[derive(Debug, Clone, Default)]
pub struct PageHistory {
    titles: HashMap<String, String>,
    descriptions: HashMap<String, String>,
}

impl PageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(text: &str) -> String {
        text.trim().to_lowercase()
    }

    /// First other URL that used `title`
    pub fn title_owner(&self, title: &str, url: &str) -> Option<&str> {
        self.titles
            .get(&Self::key(title))
            .map(String::as_str)
            .filter(|owner| *owner != url)
    }

    pub fn description_owner(&self, description: &str, url: &str) -> Option<&str> {
        self.descriptions
            .get(&Self::key(description))
            .map(String::as_str)
            .filter(|owner| *owner != url)
    }

    pub fn record(&mut self, page: &CrawledPage) {
        if let Some(title) = page.title.as_deref().filter(|t| !t.trim().is_empty()) {
            self.titles
                .entry(Self::key(title))
                .or_insert_with(|| page.url.clone());
        }
        if let Some(desc) = page
            .meta_description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
        {
            self.descriptions
                .entry(Self::key(desc))
                .or_insert_with(|| page.url.clone());
        }
    }

    pub fn clear(&mut self) {
        self.titles.clear();
        self.descriptions.clear();
    }
}

/// An independent rule run against each crawled page
pub trait IssueCheck: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pushes any issues found on `page` into `out`
    fn check(&self, page: &CrawledPage, history: &PageHistory, out: &mut Vec<Issue>);
}

struct TitleCheck;

impl IssueCheck for TitleCheck {
    fn name(&self) -> &'static str {
        "title"
    }

    fn check(&self, page: &CrawledPage, history: &PageHistory, out: &mut Vec<Issue>) {
        if !page.is_html_success() {
            return;
        }
        let title = page.title.as_deref().map(str::trim).unwrap_or("");
        if title.is_empty() {
            out.push(Issue::error(
                &page.url,
                IssueCategory::Title,
                "Missing title tag",
                "Page has no <title> or it is empty",
            ));
            return;
        }

        let len = title.chars().count();
        if len < TITLE_MIN_LEN {
            out.push(Issue::warning(
                &page.url,
                IssueCategory::Title,
                "Title too short",
                format!("Title is {} characters (recommended {}-{})", len, TITLE_MIN_LEN, TITLE_MAX_LEN),
            ));
        } else if len > TITLE_MAX_LEN {
            out.push(Issue::warning(
                &page.url,
                IssueCategory::Title,
                "Title too long",
                format!("Title is {} characters (recommended {}-{})", len, TITLE_MIN_LEN, TITLE_MAX_LEN),
            ));
        }

        if let Some(owner) = history.title_owner(title, &page.url) {
            out.push(Issue::warning(
                &page.url,
                IssueCategory::Title,
                "Duplicate title",
                format!("Same title as {}", owner),
            ));
        }
    }
}

struct MetaDescriptionCheck;

impl IssueCheck for MetaDescriptionCheck {
    fn name(&self) -> &'static str {
        "meta_description"
    }

    fn check(&self, page: &CrawledPage, history: &PageHistory, out: &mut Vec<Issue>) {
        if !page.is_html_success() {
            return;
        }
        let desc = page.meta_description.as_deref().map(str::trim).unwrap_or("");
        if desc.is_empty() {
            out.push(Issue::warning(
                &page.url,
                IssueCategory::MetaDescription,
                "Missing meta description",
                "Page has no meta description",
            ));
            return;
        }

        let len = desc.chars().count();
        if len > META_DESCRIPTION_MAX_LEN {
            out.push(Issue::warning(
                &page.url,
                IssueCategory::MetaDescription,
                "Meta description too long",
                format!("Meta description is {} characters (max {})", len, META_DESCRIPTION_MAX_LEN),
            ));
        } else if len < META_DESCRIPTION_MIN_LEN {
            out.push(Issue::info(
                &page.url,
                IssueCategory::MetaDescription,
                "Meta description too short",
                format!("Meta description is {} characters (min {})", len, META_DESCRIPTION_MIN_LEN),
            ));
        }

        if let Some(owner) = history.description_owner(desc, &page.url) {
            out.push(Issue::warning(
                &page.url,
                IssueCategory::MetaDescription,
                "Duplicate meta description",
                format!("Same meta description as {}", owner),
            ));
        }
    }
}

struct HeadingCheck;

impl IssueCheck for HeadingCheck {
    fn name(&self) -> &'static str {
        "headings"
    }

    fn check(&self, page: &CrawledPage, _history: &PageHistory, out: &mut Vec<Issue>) {
        if !page.is_html_success() {
            return;
        }
        match page.h1.len() {
            0 => out.push(Issue::warning(
                &page.url,
                IssueCategory::Headings,
                "Missing H1 tag",
                "Page has no <h1> heading",
            )),
            1 => {}
            n => out.push(Issue::warning(
                &page.url,
                IssueCategory::Headings,
                "Multiple H1 tags",
                format!("Page has {} <h1> headings", n),
            )),
        }
    }
}

struct ContentCheck;

impl IssueCheck for ContentCheck {
    fn name(&self) -> &'static str {
        "content"
    }

    fn check(&self, page: &CrawledPage, _history: &PageHistory, out: &mut Vec<Issue>) {
        if !page.is_html_success() {
            return;
        }
        let Some(metrics) = &page.analysis else {
            return;
        };
        if metrics.is_thin_content {
            out.push(Issue::warning(
                &page.url,
                IssueCategory::Content,
                "Thin content",
                format!("Page has only {} words", metrics.word_count),
            ));
        }
        if metrics.word_count > 0 && metrics.readability_score < MIN_READABILITY {
            out.push(Issue::info(
                &page.url,
                IssueCategory::Content,
                "Low readability",
                format!("Flesch reading ease is {:.1}", metrics.readability_score),
            ));
        }
    }
}

struct ImageAltCheck;

impl IssueCheck for ImageAltCheck {
    fn name(&self) -> &'static str {
        "image_alt"
    }

    fn check(&self, page: &CrawledPage, _history: &PageHistory, out: &mut Vec<Issue>) {
        if page.is_html_success() && page.images_missing_alt > 0 {
            out.push(Issue::warning(
                &page.url,
                IssueCategory::Images,
                "Images missing alt text",
                format!("{} image(s) without an alt attribute", page.images_missing_alt),
            ));
        }
    }
}

struct StatusCheck;

impl IssueCheck for StatusCheck {
    fn name(&self) -> &'static str {
        "status"
    }

    fn check(&self, page: &CrawledPage, _history: &PageHistory, out: &mut Vec<Issue>) {
        if let Some(error) = &page.error {
            out.push(Issue::error(
                &page.url,
                IssueCategory::Status,
                "Failed to fetch page",
                error.clone(),
            ));
            return;
        }
        if !page.is_error_status() {
            return;
        }

        out.push(Issue::error(
            &page.url,
            IssueCategory::Status,
            format!("HTTP {} error", page.status_code),
            format!("Server responded with status {}", page.status_code),
        ));

        if let Some(parent) = &page.parent_url {
            out.push(Issue::error(
                parent,
                IssueCategory::Links,
                "Broken link",
                format!("Links to {} which returned {}", page.url, page.status_code),
            ));
        }
    }
}

struct RedirectCheck;

impl IssueCheck for RedirectCheck {
    fn name(&self) -> &'static str {
        "redirects"
    }

    fn check(&self, page: &CrawledPage, _history: &PageHistory, out: &mut Vec<Issue>) {
        let hops = page.redirect_chain.len();
        if hops > MAX_REDIRECT_HOPS {
            out.push(Issue::warning(
                &page.url,
                IssueCategory::Redirects,
                "Redirect chain too long",
                format!("{} redirects before reaching the final URL", hops),
            ));
        }
    }
}

struct IndexabilityCheck;

impl IssueCheck for IndexabilityCheck {
    fn name(&self) -> &'static str {
        "indexability"
    }

    fn check(&self, page: &CrawledPage, _history: &PageHistory, out: &mut Vec<Issue>) {
        if !page.is_html_success() {
            return;
        }
        if page.canonical_url.as_deref().map_or(true, |c| c.trim().is_empty()) {
            out.push(Issue::info(
                &page.url,
                IssueCategory::Indexability,
                "Missing canonical URL",
                "Page has no <link rel=\"canonical\">",
            ));
        }
        if page.is_noindex() {
            out.push(Issue::info(
                &page.url,
                IssueCategory::Indexability,
                "Page is set to noindex",
                page.meta_robots.clone().unwrap_or_default(),
            ));
        }
    }
}

struct LanguageCheck;

impl IssueCheck for LanguageCheck {
    fn name(&self) -> &'static str {
        "language"
    }

    fn check(&self, page: &CrawledPage, _history: &PageHistory, out: &mut Vec<Issue>) {
        if !page.is_html_success() {
            return;
        }
        if page.lang.as_deref().map_or(true, |l| l.trim().is_empty()) {
            out.push(Issue::warning(
                &page.url,
                IssueCategory::Technical,
                "Missing lang attribute",
                "The <html> element declares no language",
            ));
        }
    }
}

struct StructuredDataCheck;

impl IssueCheck for StructuredDataCheck {
    fn name(&self) -> &'static str {
        "structured_data"
    }

    fn check(&self, page: &CrawledPage, _history: &PageHistory, out: &mut Vec<Issue>) {
        if page.is_html_success() && !page.has_structured_data {
            out.push(Issue::info(
                &page.url,
                IssueCategory::Technical,
                "No structured data",
                "Page has no JSON-LD or microdata markup",
            ));
        }
    }
}

/// The built-in check registry, in evaluation order
pub fn default_checks() -> Vec<Box<dyn IssueCheck>> {
    vec![
        Box::new(StatusCheck),
        Box::new(RedirectCheck),
        Box::new(TitleCheck),
        Box::new(MetaDescriptionCheck),
        Box::new(HeadingCheck),
        Box::new(ContentCheck),
        Box::new(ImageAltCheck),
        Box::new(IndexabilityCheck),
        Box::new(LanguageCheck),
        Box::new(StructuredDataCheck),
    ]
}

/// Check registry plus the append-only issue store of one crawl
pub struct IssueDetector {
    checks: Vec<Box<dyn IssueCheck>>,
    history: PageHistory,
    issues: AppendLog<Issue>,
}

impl Default for IssueDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IssueDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssueDetector")
            .field("checks", &self.checks.iter().map(|c| c.name()).collect::<Vec<_>>())
            .field("issues", &self.issues.len())
            .finish()
    }
}

impl IssueDetector {
    pub fn new() -> Self {
        Self::with_checks(default_checks())
    }

    pub fn with_checks(checks: Vec<Box<dyn IssueCheck>>) -> Self {
        Self {
            checks,
            history: PageHistory::new(),
            issues: AppendLog::new(),
        }
    }

    pub fn register(&mut self, check: Box<dyn IssueCheck>) {
        self.checks.push(check);
    }

    /// Runs every check on `page`, stores and returns what they found
    ///
    /// Issues are never deduplicated against earlier detections.
    pub fn detect(&mut self, page: &CrawledPage) -> Vec<Issue> {
        let mut found = Vec::new();
        for check in &self.checks {
            check.check(page, &self.history, &mut found);
        }
        self.history.record(page);

        if !found.is_empty() {
            debug!("{} issue(s) on {}", found.len(), page.url);
        }
        self.issues.extend(found.iter().cloned());
        found
    }

    /// Appends an issue raised outside the check registry
    pub fn record(&mut self, issue: Issue) -> usize {
        self.issues.push(issue)
    }

    /// Bulk replace for history loads; duplicate detection is re-seeded from `pages`
    pub fn replace_all(&mut self, issues: Vec<Issue>, pages: &[CrawledPage]) {
        self.issues.replace_all(issues);
        self.history.clear();
        for page in pages {
            self.history.record(page);
        }
    }

    pub fn since(&self, cursor: usize) -> Vec<Issue> {
        self.issues.since(cursor)
    }

    pub fn all(&self) -> Vec<Issue> {
        self.issues.since(0)
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn clear(&mut self) {
        self.issues.clear();
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ContentAnalyzer;
    use crate::crawler::RedirectHop;
    use crate::issues::Severity;

    fn html_page(url: &str) -> CrawledPage {
        let mut page = CrawledPage::new(url, 0, None);
        page.status_code = 200;
        page.content_type = Some("text/html".to_string());
        page.title = Some("A perfectly reasonable page title here".to_string());
        page.meta_description = Some(
            "A meta description that is comfortably longer than fifty characters.".to_string(),
        );
        page.canonical_url = Some(url.to_string());
        page.h1 = vec!["Heading".to_string()];
        page.lang = Some("en".to_string());
        page.has_structured_data = true;
        page
    }

    fn messages(issues: &[Issue]) -> Vec<&str> {
        issues.iter().map(|i| i.message.as_str()).collect()
    }

    #[test]
    fn test_clean_page_has_no_issues() {
        let mut detector = IssueDetector::new();
        assert!(detector.detect(&html_page("https://e.com/")).is_empty());
    }

    #[test]
    fn test_missing_title_and_h1() {
        let mut detector = IssueDetector::new();
        let mut page = html_page("https://e.com/");
        page.title = None;
        page.h1.clear();

        let issues = detector.detect(&page);
        let msgs = messages(&issues);
        assert!(msgs.contains(&"Missing title tag"));
        assert!(msgs.contains(&"Missing H1 tag"));
        assert_eq!(issues[0].issue_type, Severity::Error);
    }

    #[test]
    fn test_title_length_bounds() {
        let mut detector = IssueDetector::new();
        let mut short = html_page("https://e.com/a");
        short.title = Some("Short".to_string());
        assert!(messages(&detector.detect(&short)).contains(&"Title too short"));

        let mut long = html_page("https://e.com/b");
        long.title = Some("x".repeat(61));
        assert!(messages(&detector.detect(&long)).contains(&"Title too long"));
    }

    #[test]
    fn test_duplicate_title_across_pages() {
        let mut detector = IssueDetector::new();
        detector.detect(&html_page("https://e.com/a"));
        let issues = detector.detect(&html_page("https://e.com/b"));

        let dup = issues.iter().find(|i| i.message == "Duplicate title").unwrap();
        assert_eq!(dup.url, "https://e.com/b");
        assert!(dup.details.contains("https://e.com/a"));
        assert!(messages(&issues).contains(&"Duplicate meta description"));
    }

    #[test]
    fn test_recrawl_is_not_deduplicated() {
        let mut detector = IssueDetector::new();
        let mut page = html_page("https://e.com/a");
        page.h1.clear();

        detector.detect(&page);
        detector.detect(&page);
        assert_eq!(detector.len(), 2);
        assert!(!messages(&detector.all()).contains(&"Duplicate title"));
    }

    #[test]
    fn test_error_status_flags_parent() {
        let mut detector = IssueDetector::new();
        let mut page = CrawledPage::new("https://e.com/gone", 1, Some("https://e.com/"));
        page.status_code = 404;

        let issues = detector.detect(&page);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].message, "HTTP 404 error");
        assert_eq!(issues[1].url, "https://e.com/");
        assert_eq!(issues[1].category, IssueCategory::Links);
    }

    #[test]
    fn test_fetch_failure() {
        let mut detector = IssueDetector::new();
        let page = CrawledPage::failed("https://e.com/x", 1, None, "Request timed out".into());
        let issues = detector.detect(&page);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].details, "Request timed out");
    }

    #[test]
    fn test_redirect_chain() {
        let mut detector = IssueDetector::new();
        let mut page = html_page("https://e.com/final");
        page.redirect_chain = (0..4)
            .map(|i| RedirectHop {
                url: format!("https://e.com/r{}", i),
                status_code: 301,
            })
            .collect();
        assert!(messages(&detector.detect(&page)).contains(&"Redirect chain too long"));
    }

    #[test]
    fn test_thin_content_and_noindex() {
        let mut detector = IssueDetector::new();
        let mut page = html_page("https://e.com/");
        page.analysis = Some(ContentAnalyzer::new().analyze("Just a few words here."));
        page.meta_robots = Some("noindex".to_string());

        let msgs = detector.detect(&page);
        let msgs = messages(&msgs);
        assert!(msgs.contains(&"Thin content"));
        assert!(msgs.contains(&"Page is set to noindex"));
    }

    #[test]
    fn test_missing_lang() {
        let mut detector = IssueDetector::new();
        let mut page = html_page("https://e.com/");
        page.lang = Some("  ".to_string());

        let issues = detector.detect(&page);
        assert_eq!(messages(&issues), vec!["Missing lang attribute"]);
        assert_eq!(issues[0].category, IssueCategory::Technical);
        assert_eq!(issues[0].issue_type, Severity::Warning);
    }

    #[test]
    fn test_missing_structured_data() {
        let mut detector = IssueDetector::new();
        let mut page = html_page("https://e.com/");
        page.has_structured_data = false;

        let issues = detector.detect(&page);
        assert_eq!(messages(&issues), vec!["No structured data"]);
        assert_eq!(issues[0].issue_type, Severity::Info);
    }

    #[test]
    fn test_non_html_skips_page_checks() {
        let mut detector = IssueDetector::new();
        let mut page = CrawledPage::new("https://e.com/data.json", 0, None);
        page.status_code = 200;
        page.content_type = Some("application/json".to_string());
        assert!(detector.detect(&page).is_empty());
    }

    #[test]
    fn test_replace_all_reseeds_history() {
        let mut detector = IssueDetector::new();
        let page = html_page("https://e.com/a");
        detector.replace_all(Vec::new(), std::slice::from_ref(&page));
        assert!(detector.is_empty());

        let issues = detector.detect(&html_page("https://e.com/b"));
        assert!(messages(&issues).contains(&"Duplicate title"));
    }
}
