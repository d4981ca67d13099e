use serde::Serialize;

/// A URL denied by robots.txt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedRecord {
    pub url: String,
    pub reason: String,
    pub is_internal: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlockedCounts {
    pub internal: usize,
    pub external: usize,
    pub total: usize,
}

/// Diagnostic log of denied URLs, split by scope
///
/// Reporting only; nothing here feeds back into crawl decisions.
#[derive(Debug, Clone, Default)]
pub struct BlockedTracker {
    internal: Vec<BlockedRecord>,
    external: Vec<BlockedRecord>,
}

impl BlockedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_blocked(&mut self, url: &str, reason: &str, is_internal: bool) {
        let record = BlockedRecord {
            url: url.to_string(),
            reason: reason.to_string(),
            is_internal,
        };
        if is_internal {
            self.internal.push(record);
        } else {
            self.external.push(record);
        }
    }

    pub fn internal(&self) -> &[BlockedRecord] {
        &self.internal
    }

    pub fn external(&self) -> &[BlockedRecord] {
        &self.external
    }

    pub fn counts(&self) -> BlockedCounts {
        BlockedCounts {
            internal: self.internal.len(),
            external: self.external.len(),
            total: self.internal.len() + self.external.len(),
        }
    }

    pub fn clear(&mut self) {
        self.internal.clear();
        self.external.clear();
    }
}
