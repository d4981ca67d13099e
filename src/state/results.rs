use super::AppendLog;
use crate::crawler::CrawledPage;
use crate::issues::{Issue, IssueDetector};
use crate::links::{Link, LinkGraphManager};
use std::collections::HashMap;

/// Sizes of the in-memory collections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultCounts {
    pub pages: usize,
    pub links: usize,
    pub issues: usize,
}

/// Records not yet written to the checkpoint store
#[derive(Debug, Clone, Default)]
pub struct PendingBatch {
    pub pages: Vec<CrawledPage>,
    pub links: Vec<Link>,
    pub issues: Vec<Issue>,
    page_end: usize,
    issue_end: usize,
}

impl PendingBatch {
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty() && self.links.is_empty() && self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pages.len() + self.links.len() + self.issues.len()
    }
}

/// Everything one job has produced so far
///
/// Pages and issues are append-only; links go through the deduplicating
/// [`LinkGraphManager`]. A flush watermark tracks what has been persisted.
#[derive(Debug, Default)]
pub struct ResultSet {
    pages: AppendLog<CrawledPage>,
    page_status: HashMap<String, u16>,
    links: LinkGraphManager,
    issues: IssueDetector,
    flushed_pages: usize,
    flushed_issues: usize,
}

impl ResultSet {
    pub fn new(base_domain: &str) -> Self {
        Self {
            links: LinkGraphManager::new(base_domain),
            ..Self::default()
        }
    }

    /// Stores a crawled page with its outgoing links and returns the issues it raised
    pub fn record_page(&mut self, page: CrawledPage, outgoing: Vec<Link>) -> Vec<Issue> {
        let found = self.issues.detect(&page);

        if page.status_code > 0 {
            self.page_status.insert(page.url.clone(), page.status_code);
            self.links.set_target_status(&page.url, page.status_code);
        }

        for mut link in outgoing {
            if link.target_status.is_none() {
                link.target_status = self.page_status.get(&link.target_url).copied();
            }
            self.links.upsert(link);
        }

        self.pages.push(page);
        found
    }

    pub fn record_issue(&mut self, issue: Issue) {
        self.issues.record(issue);
    }

    /// Bulk replace from persisted state; everything loaded counts as flushed
    pub fn replace_all(&mut self, pages: Vec<CrawledPage>, links: Vec<Link>, issues: Vec<Issue>) {
        self.page_status = pages
            .iter()
            .filter(|p| p.status_code > 0)
            .map(|p| (p.url.clone(), p.status_code))
            .collect();
        self.issues.replace_all(issues, &pages);
        self.links.replace_all(links);
        self.pages.replace_all(pages);
        self.flushed_pages = self.pages.len();
        self.flushed_issues = self.issues.len();
    }

    pub fn clear(&mut self, base_domain: &str) {
        *self = Self::new(base_domain);
    }

    pub fn base_domain(&self) -> &str {
        self.links.base_domain()
    }

    pub fn pages_since(&self, cursor: usize) -> Vec<CrawledPage> {
        self.pages.since(cursor)
    }

    pub fn links_since(&self, cursor: usize) -> Vec<Link> {
        self.links.since(cursor)
    }

    pub fn issues_since(&self, cursor: usize) -> Vec<Issue> {
        self.issues.since(cursor)
    }

    pub fn links(&self) -> &LinkGraphManager {
        &self.links
    }

    pub fn counts(&self) -> ResultCounts {
        ResultCounts {
            pages: self.pages.len(),
            links: self.links.len(),
            issues: self.issues.len(),
        }
    }

    /// Number of records a flush would write
    pub fn pending_len(&self) -> usize {
        (self.pages.len() - self.flushed_pages)
            + (self.issues.len() - self.flushed_issues)
            + self.links.dirty_len()
    }

    /// Collects everything written since the last flush
    ///
    /// Dirty links are drained, so the batch must be handed to the store.
    pub fn take_pending(&mut self) -> PendingBatch {
        PendingBatch {
            pages: self.pages.since(self.flushed_pages),
            links: self.links.take_dirty(),
            issues: self.issues.since(self.flushed_issues),
            page_end: self.pages.len(),
            issue_end: self.issues.len(),
        }
    }

    /// Advances the flush watermark past a batch that was persisted
    pub fn mark_flushed(&mut self, batch: &PendingBatch) {
        self.flushed_pages = self.flushed_pages.max(batch.page_end);
        self.flushed_issues = self.flushed_issues.max(batch.issue_end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::LinkPlacement;
    use url::Url;

    fn page(url: &str, status: u16) -> CrawledPage {
        let mut page = CrawledPage::new(url, 0, None);
        page.status_code = status;
        page.content_type = Some("text/html".to_string());
        page
    }

    fn link(from: &str, to: &str) -> Link {
        Link::new(
            &Url::parse(from).unwrap(),
            &Url::parse(to).unwrap(),
            "",
            LinkPlacement::Body,
            false,
            "e.com",
        )
    }

    #[test]
    fn test_record_page_sets_known_target_status() {
        let mut results = ResultSet::new("e.com");
        results.record_page(page("https://e.com/b", 404), vec![]);
        results.record_page(
            page("https://e.com/a", 200),
            vec![link("https://e.com/a", "https://e.com/b")],
        );
        assert_eq!(
            results.links().get("https://e.com/a", "https://e.com/b").unwrap().target_status,
            Some(404)
        );
    }

    #[test]
    fn test_record_page_backfills_incoming_links() {
        let mut results = ResultSet::new("e.com");
        results.record_page(
            page("https://e.com/a", 200),
            vec![link("https://e.com/a", "https://e.com/b")],
        );
        results.record_page(page("https://e.com/b", 200), vec![]);
        assert_eq!(results.links().target_status("https://e.com/b"), Some(200));
    }

    #[test]
    fn test_pending_batch_watermark() {
        let mut results = ResultSet::new("e.com");
        results.record_page(
            page("https://e.com/a", 200),
            vec![link("https://e.com/a", "https://e.com/b")],
        );
        assert!(results.pending_len() > 0);

        let batch = results.take_pending();
        assert_eq!(batch.pages.len(), 1);
        assert_eq!(batch.links.len(), 1);
        results.mark_flushed(&batch);
        assert_eq!(results.pending_len(), 0);
        assert!(results.take_pending().is_empty());

        results.record_page(page("https://e.com/b", 200), vec![]);
        let batch = results.take_pending();
        assert_eq!(batch.pages.len(), 1);
        assert_eq!(batch.pages[0].url, "https://e.com/b");
        assert_eq!(batch.links.len(), 1);
    }

    #[test]
    fn test_replace_all_counts_as_flushed() {
        let mut results = ResultSet::new("e.com");
        results.replace_all(
            vec![page("https://e.com/a", 200)],
            vec![link("https://e.com/a", "https://e.com/b")],
            vec![],
        );
        assert_eq!(results.counts().pages, 1);
        assert_eq!(results.counts().links, 1);
        assert_eq!(results.pending_len(), 0);
        assert_eq!(results.pages_since(0).len(), 1);
    }
}
