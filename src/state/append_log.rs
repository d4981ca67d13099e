/// Append-only sequence with cursor reads
///
/// Entries are never removed or reordered while a job is alive, so the
/// index of an entry is a stable cursor: `since(k)` returns exactly the
/// entries appended after the first `k`.
#[derive(Debug, Clone)]
pub struct AppendLog<T> {
    entries: Vec<T>,
}

impl<T> Default for AppendLog<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Clone> AppendLog<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry and returns its sequence number
    pub fn push(&mut self, entry: T) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = T>) {
        self.entries.extend(entries);
    }

    /// Entries at positions `cursor..`; empty when the cursor is at or past the end
    pub fn since(&self, cursor: usize) -> Vec<T> {
        self.entries
            .get(cursor..)
            .map(|slice| slice.to_vec())
            .unwrap_or_default()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index)
    }

    /// In-place update of an existing entry; readers past `index` won't see it again
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.entries.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    /// Replaces the whole sequence
    ///
    /// Only valid between jobs (fresh start or history load); cursors held by
    /// readers must be reset by a full refresh afterwards.
    pub fn replace_all(&mut self, entries: Vec<T>) {
        self.entries = entries;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
