//! In-process mirror of previously materialized rows.
//!
//! The cache is best-effort state owned by one table handle: it may be
//! empty, partial, or briefly stale relative to the backing store, and
//! losing its contents only causes misses that fall through to the store.
//! It never consults the store itself.

use crate::Row;
use serde_json::Value;
use tracing::warn;

/// Ordered collection of materialized rows.
///
/// Order is insertion order, except for in-place replacement. Entries are
/// not uniquely keyed: lookup is a linear scan on an arbitrary column/value
/// pair, and the first match wins.
#[derive(Debug, Default)]
pub struct RowCache {
    entries: Vec<Row>,
}

impl RowCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// First entry whose `column` field equals `value`, with its position.
    ///
    /// O(n) scan; the cache mirrors a single table's working set, not an
    /// index structure.
    pub fn find_by_column(&self, column: &str, value: &Value) -> Option<(usize, &Row)> {
        self.entries
            .iter()
            .enumerate()
            .find(|(_, row)| row.get(column) == Some(value))
    }

    /// Append a row.
    pub fn insert(&mut self, row: Row) {
        self.entries.push(row);
    }

    /// Overwrite the entry at `position` in place, preserving its position.
    pub fn replace_at(&mut self, position: usize, row: Row) {
        match self.entries.get_mut(position) {
            Some(entry) => *entry = row,
            None => warn!(position, len = self.entries.len(), "replace_at out of range"),
        }
    }

    /// Remove and return the first entry whose `column` field equals `value`.
    pub fn take_first_match(&mut self, column: &str, value: &Value) -> Option<Row> {
        let position = self.find_by_column(column, value)?.0;
        Some(self.entries.remove(position))
    }

    /// Remove every entry for which `predicate` holds; returns how many.
    pub fn remove_matching<F>(&mut self, predicate: F) -> usize
    where
        F: Fn(&Row) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|row| !predicate(row));
        before - self.entries.len()
    }

    /// Empty the cache.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached rows.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no rows.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
