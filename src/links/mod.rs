//! Link graph storage
//!
//! [`LinkGraphManager`] is a deduplicated store of `(source, target)` edges.
//! Re-adding an edge updates its metadata in place; new edges are appended
//! so the sequence can be read incrementally with a cursor.

use crate::state::AppendLog;
use crate::url::{classify_scope, extract_domain};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use url::Url;

/// Where on the page a link appeared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPlacement {
    Navigation,
    Header,
    Footer,
    Sidebar,
    #[default]
    Body,
}

/// A discovered edge between two pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub source_url: String,
    pub target_url: String,
    pub anchor_text: String,
    pub is_internal: bool,
    pub target_domain: String,
    /// HTTP status of the target once it has been crawled
    pub target_status: Option<u16>,
    pub placement: LinkPlacement,
    pub nofollow: bool,
}

impl Link {
    /// Builds a link, classifying `target` against `base_domain`
    pub fn new(
        source: &Url,
        target: &Url,
        anchor_text: &str,
        placement: LinkPlacement,
        nofollow: bool,
        base_domain: &str,
    ) -> Self {
        Self {
            source_url: source.to_string(),
            target_url: target.to_string(),
            anchor_text: anchor_text.trim().to_string(),
            is_internal: classify_scope(target, base_domain).is_internal(),
            target_domain: extract_domain(target).unwrap_or_default(),
            target_status: None,
            placement,
            nofollow,
        }
    }
}

/// Outcome of adding a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAdd {
    /// A new edge, appended at this sequence number
    Inserted(usize),
    /// An existing edge whose metadata was replaced
    Updated(usize),
}

impl LinkAdd {
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// Deduplicated link store for one crawl
#[derive(Debug, Clone, Default)]
pub struct LinkGraphManager {
    base_domain: String,
    links: AppendLog<Link>,
    by_key: HashMap<(String, String), usize>,
    by_target: HashMap<String, Vec<usize>>,
    /// Positions inserted or updated since the last [`take_dirty`](Self::take_dirty)
    dirty: BTreeSet<usize>,
}

impl LinkGraphManager {
    pub fn new(base_domain: &str) -> Self {
        Self {
            base_domain: base_domain.to_lowercase(),
            ..Self::default()
        }
    }

    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    /// Builds and stores a link, classifying it against the base domain
    pub fn add_link(
        &mut self,
        source: &Url,
        target: &Url,
        anchor_text: &str,
        placement: LinkPlacement,
        nofollow: bool,
    ) -> LinkAdd {
        let link = Link::new(source, target, anchor_text, placement, nofollow, &self.base_domain);
        self.upsert(link)
    }

    /// Stores a link; last write wins for an existing `(source, target)`
    ///
    /// A known target status is kept when the incoming link has none.
    pub fn upsert(&mut self, mut link: Link) -> LinkAdd {
        let key = (link.source_url.clone(), link.target_url.clone());

        if let Some(&idx) = self.by_key.get(&key) {
            if let Some(existing) = self.links.get_mut(idx) {
                if link.target_status.is_none() {
                    link.target_status = existing.target_status;
                }
                *existing = link;
            }
            self.dirty.insert(idx);
            return LinkAdd::Updated(idx);
        }

        let target = link.target_url.clone();
        let idx = self.links.push(link);
        self.by_key.insert(key, idx);
        self.by_target.entry(target).or_default().push(idx);
        self.dirty.insert(idx);
        LinkAdd::Inserted(idx)
    }

    /// Records the crawled status of every link pointing at `target_url`
    pub fn set_target_status(&mut self, target_url: &str, status: u16) {
        let Some(positions) = self.by_target.get(target_url) else {
            return;
        };
        for &idx in positions {
            if let Some(link) = self.links.get_mut(idx) {
                link.target_status = Some(status);
                self.dirty.insert(idx);
            }
        }
    }

    /// Known status of a target, if any link to it has one
    pub fn target_status(&self, target_url: &str) -> Option<u16> {
        self.by_target
            .get(target_url)?
            .iter()
            .find_map(|&idx| self.links.get(idx).and_then(|l| l.target_status))
    }

    /// Replaces the whole graph, rebuilding every index
    ///
    /// Duplicate keys in `links` collapse to the last occurrence.
    pub fn replace_all(&mut self, links: Vec<Link>) {
        self.links.clear();
        self.by_key.clear();
        self.by_target.clear();
        self.dirty.clear();
        for link in links {
            self.upsert(link);
        }
        self.dirty.clear();
    }

    pub fn get(&self, source_url: &str, target_url: &str) -> Option<&Link> {
        let idx = self
            .by_key
            .get(&(source_url.to_string(), target_url.to_string()))?;
        self.links.get(*idx)
    }

    /// Links pointing at `target_url`
    pub fn incoming(&self, target_url: &str) -> Vec<&Link> {
        self.by_target
            .get(target_url)
            .map(|positions| positions.iter().filter_map(|&i| self.links.get(i)).collect())
            .unwrap_or_default()
    }

    /// Links appended after the first `cursor`
    pub fn since(&self, cursor: usize) -> Vec<Link> {
        self.links.since(cursor)
    }

    pub fn all(&self) -> Vec<Link> {
        self.links.since(0)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Drains the set of links changed since the previous call
    pub fn take_dirty(&mut self) -> Vec<Link> {
        let dirty = std::mem::take(&mut self.dirty);
        dirty
            .into_iter()
            .filter_map(|idx| self.links.get(idx).cloned())
            .collect()
    }

    /// Number of links changed since the previous [`take_dirty`](Self::take_dirty)
    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    pub fn clear(&mut self) {
        self.links.clear();
        self.by_key.clear();
        self.by_target.clear();
        self.dirty.clear();
    }
}
