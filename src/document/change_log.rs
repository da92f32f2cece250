//! Bounded change history with single-level undo

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::json_eq;
use super::path::FieldPath;

/// Number of changes kept before the oldest is evicted
pub const DEFAULT_CAPACITY: usize = 100;

/// One effective mutation of the document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub timestamp: DateTime<Utc>,
    pub path: FieldPath,
    /// `None` when the path did not exist before the change
    pub previous_value: Option<Value>,
    pub new_value: Option<Value>,
    /// Set once the change has been exported
    pub synced: bool,
}

/// FIFO ring of [`ChangeRecord`]s
#[derive(Clone, Debug)]
pub struct ChangeLog {
    entries: VecDeque<ChangeRecord>,
    capacity: usize,
}

#[derive(Serialize)]
struct AuditLog<'a> {
    exported_at: DateTime<Utc>,
    total_changes: usize,
    changes: &'a VecDeque<ChangeRecord>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a log holding at most `capacity` entries (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a change unless `from` and `to` are structurally equal.
    /// Returns whether an entry was added.
    pub fn record(&mut self, path: FieldPath, from: Option<Value>, to: Option<Value>) -> bool {
        if json_eq(from.as_ref(), to.as_ref()) {
            return false;
        }

        self.entries.push_back(ChangeRecord {
            timestamp: Utc::now(),
            path,
            previous_value: from,
            new_value: to,
            synced: false,
        });
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                log::debug!("Change log full, evicting change to {}", evicted.path);
            }
        }
        true
    }

    /// Remove and return the most recent change
    pub fn pop(&mut self) -> Option<ChangeRecord> {
        self.entries.pop_back()
    }

    /// Put a change back on top, used when applying a popped change fails
    pub(crate) fn restore(&mut self, record: ChangeRecord) {
        self.entries.push_back(record);
    }

    /// Flag every current entry as synced. Returns how many were flipped.
    pub fn mark_synced(&mut self) -> usize {
        let mut flipped = 0;
        for entry in self.entries.iter_mut().filter(|e| !e.synced) {
            entry.synced = true;
            flipped += 1;
        }
        flipped
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&ChangeRecord> {
        self.entries.back()
    }

    pub fn oldest(&self) -> Option<&ChangeRecord> {
        self.entries.front()
    }

    /// Copy out the history, optionally only the synced part
    pub fn changes(&self, synced_only: bool) -> Vec<ChangeRecord> {
        self.entries
            .iter()
            .filter(|c| !synced_only || c.synced)
            .cloned()
            .collect()
    }

    /// Pretty JSON audit trail of the current history
    pub fn to_audit_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&AuditLog {
            exported_at: Utc::now(),
            total_changes: self.entries.len(),
            changes: &self.entries,
        })
    }
}

impl Default for ChangeLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    #[test]
    fn test_record_skips_structurally_equal() {
        let mut log = ChangeLog::new();
        assert!(!log.record(path("a"), Some(json!({"x": [1, 2]})), Some(json!({"x": [1, 2]}))));
        assert!(!log.record(path("a"), Some(json!(1)), Some(json!(1.0))));
        assert!(!log.record(path("a"), None, None));
        assert!(log.is_empty());

        assert!(log.record(path("a"), None, Some(json!(null))));
        assert!(log.record(path("a"), Some(json!("")), Some(json!("x"))));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_fifo_eviction() {
        let mut log = ChangeLog::with_capacity(3);
        for i in 0..4 {
            log.record(path(&format!("f{}", i)), None, Some(json!(i)));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.oldest().unwrap().path, path("f1"));
        assert_eq!(log.latest().unwrap().path, path("f3"));
    }

    #[test]
    fn test_eviction_ignores_synced_flag() {
        let mut log = ChangeLog::with_capacity(2);
        log.record(path("a"), None, Some(json!(1)));
        log.mark_synced();
        log.record(path("b"), None, Some(json!(2)));
        log.record(path("c"), None, Some(json!(3)));
        let paths: Vec<String> = log.iter().map(|c| c.path.to_string()).collect();
        assert_eq!(paths, vec!["b", "c"]);
    }

    #[test]
    fn test_pop_is_lifo() {
        let mut log = ChangeLog::new();
        log.record(path("a"), None, Some(json!(1)));
        log.record(path("b"), Some(json!(1)), Some(json!(2)));
        let last = log.pop().unwrap();
        assert_eq!(last.path, path("b"));
        assert_eq!(last.previous_value, Some(json!(1)));
        assert_eq!(log.len(), 1);
        log.pop();
        assert!(log.pop().is_none());
    }

    #[test]
    fn test_mark_synced_keeps_entries() {
        let mut log = ChangeLog::new();
        log.record(path("a"), None, Some(json!(1)));
        log.record(path("b"), None, Some(json!(2)));
        assert!(log.changes(true).is_empty());

        assert_eq!(log.mark_synced(), 2);
        assert_eq!(log.len(), 2);
        assert_eq!(log.changes(true).len(), 2);

        log.record(path("c"), None, Some(json!(3)));
        assert_eq!(log.changes(true).len(), 2);
        assert_eq!(log.changes(false).len(), 3);
        assert_eq!(log.mark_synced(), 1);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut log = ChangeLog::with_capacity(0);
        assert_eq!(log.capacity(), 1);
        log.record(path("a"), None, Some(json!(1)));
        log.record(path("b"), None, Some(json!(2)));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_audit_json() {
        let mut log = ChangeLog::new();
        log.record(path("descriptor.year"), None, Some(json!(2024)));
        let audit: Value = serde_json::from_str(&log.to_audit_json().unwrap()).unwrap();
        assert_eq!(audit["total_changes"], json!(1));
        assert_eq!(audit["changes"][0]["path"], json!("descriptor.year"));
        assert_eq!(audit["changes"][0]["previous_value"], Value::Null);
        assert_eq!(audit["changes"][0]["new_value"], json!(2024));
        assert_eq!(audit["changes"][0]["synced"], json!(false));
    }
}
