//! Owner of the canonical document and its change history

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use super::change_log::{ChangeLog, ChangeRecord};
use super::path::{FieldPath, PathError};
use super::{json_eq, type_name, Document};

/// A refused mutation. The document is left as it was.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperationError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("Field '{path}' is not a list (found {found})")]
    NotAList { path: String, found: &'static str },

    #[error("Index {index} out of range for '{path}' (length {len})")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },
}

/// Single-writer store for the report being edited
#[derive(Clone, Debug)]
pub struct DocumentStore {
    document: Document,
    changes: ChangeLog,
    track_changes: bool,
    dirty: bool,
    synced_at: Option<DateTime<Utc>>,
}

impl DocumentStore {
    /// A store holding the empty template
    pub fn new(track_changes: bool, capacity: usize) -> Self {
        Self {
            document: Document::template(),
            changes: ChangeLog::with_capacity(capacity),
            track_changes,
            dirty: false,
            synced_at: None,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn changes(&self) -> &ChangeLog {
        &self.changes
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.synced_at
    }

    pub fn tracks_changes(&self) -> bool {
        self.track_changes
    }

    /// Read a field. Malformed paths read as absent.
    pub fn get_field(&self, path: &str) -> Option<&Value> {
        let path = FieldPath::parse(path).ok()?;
        self.document.get(&path)
    }

    /// Set a field. Returns `false` when the value is already there.
    pub fn update_field(&mut self, path: &str, value: Value) -> Result<bool, OperationError> {
        let path = FieldPath::parse(path)?;
        self.update_path(&path, value)
    }

    pub fn update_path(&mut self, path: &FieldPath, value: Value) -> Result<bool, OperationError> {
        let previous = self.document.get(path).cloned();
        if json_eq(previous.as_ref(), Some(&value)) {
            return Ok(false);
        }

        self.document.set(path, value.clone())?;
        if self.track_changes {
            self.changes.record(path.clone(), previous, Some(value));
        }
        self.dirty = true;
        Ok(true)
    }

    /// Append to the list at `list_path`, creating it when absent.
    /// Returns the index of the new item.
    pub fn add_item(&mut self, list_path: &str, item: Value) -> Result<usize, OperationError> {
        let path = FieldPath::parse(list_path)?;
        let mut list = match self.document.get(&path) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(other) => {
                return Err(OperationError::NotAList {
                    path: list_path.to_string(),
                    found: type_name(other),
                })
            }
        };
        list.push(item);
        let index = list.len() - 1;
        self.update_path(&path, Value::Array(list))?;
        Ok(index)
    }

    /// Remove the item at `index`, keeping the order of the rest.
    /// Returns the removed item.
    pub fn remove_item(&mut self, list_path: &str, index: usize) -> Result<Value, OperationError> {
        let path = FieldPath::parse(list_path)?;
        let mut list = match self.document.get(&path) {
            Some(Value::Array(items)) => items.clone(),
            other => {
                return Err(OperationError::NotAList {
                    path: list_path.to_string(),
                    found: other.map_or("nothing", type_name),
                })
            }
        };
        if index >= list.len() {
            return Err(OperationError::IndexOutOfRange {
                path: list_path.to_string(),
                index,
                len: list.len(),
            });
        }
        let removed = list.remove(index);
        self.update_path(&path, Value::Array(list))?;
        Ok(removed)
    }

    /// Revert the most recent change. `Ok(None)` when there is nothing to undo.
    pub fn undo(&mut self) -> Result<Option<ChangeRecord>, OperationError> {
        let Some(change) = self.changes.pop() else {
            return Ok(None);
        };

        let applied = match &change.previous_value {
            Some(previous) => self.document.set(&change.path, previous.clone()),
            None => self.document.remove(&change.path).map(|_| ()),
        };
        if let Err(e) = applied {
            self.changes.restore(change);
            return Err(e.into());
        }

        self.dirty = true;
        Ok(Some(change))
    }

    /// Swap in a whole new document. The history of the old one is dropped.
    pub fn replace(&mut self, document: Document) {
        self.document = document;
        self.changes.clear();
        self.dirty = true;
        self.synced_at = None;
    }

    /// Record a successful export
    pub fn mark_exported(&mut self, at: DateTime<Utc>) {
        self.dirty = false;
        self.synced_at = Some(at);
        self.changes.mark_synced();
    }

    pub fn mark_synced(&mut self) -> usize {
        self.changes.mark_synced()
    }

    pub fn clear_changes(&mut self) {
        self.changes.clear();
    }

    /// Back to the empty template with no history
    pub fn reset(&mut self) {
        self.document = Document::template();
        self.changes.clear();
        self.dirty = false;
        self.synced_at = None;
    }

    /// Change tracking and capacity. Shrinking the capacity drops history.
    pub fn configure(&mut self, track_changes: bool, capacity: usize) {
        self.track_changes = track_changes;
        if capacity.max(1) != self.changes.capacity() {
            self.changes = ChangeLog::with_capacity(capacity);
        }
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new(true, super::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_field_records_change() {
        let mut store = DocumentStore::default();
        assert!(store
            .update_field("descriptor.municipality", json!("São Paulo"))
            .unwrap());
        assert!(store.is_dirty());
        assert_eq!(store.changes().len(), 1);
        let change = store.changes().latest().unwrap();
        assert_eq!(change.previous_value, Some(json!("")));
        assert_eq!(change.new_value, Some(json!("São Paulo")));
    }

    #[test]
    fn test_update_with_same_value_is_noop() {
        let mut store = DocumentStore::default();
        assert!(!store.update_field("descriptor.municipality", json!("")).unwrap());
        assert!(!store.is_dirty());
        assert!(store.changes().is_empty());
    }

    #[test]
    fn test_untracked_store_still_mutates() {
        let mut store = DocumentStore::new(false, 10);
        assert!(store.update_field("descriptor.year", json!(2024)).unwrap());
        assert!(store.changes().is_empty());
        assert!(store.undo().unwrap().is_none());
        assert_eq!(store.get_field("descriptor.year"), Some(&json!(2024)));
    }

    #[test]
    fn test_undo_restores_previous_and_absent() {
        let mut store = DocumentStore::default();
        store.update_field("descriptor.year", json!(2024)).unwrap();
        store.update_field("contracts[0].number", json!("C-1")).unwrap();
        store.update_field("adjustment_code.code", json!("AJ-9")).unwrap();

        assert!(store.undo().unwrap().is_some());
        assert_eq!(store.get_field("adjustment_code.code"), None);

        store.undo().unwrap();
        assert_eq!(store.get_field("contracts[0].number"), None);

        store.undo().unwrap();
        assert_eq!(store.get_field("descriptor.year"), Some(&Value::Null));
        assert!(store.undo().unwrap().is_none());
        assert!(store.is_dirty());
    }

    #[test]
    fn test_add_and_remove_items() {
        let mut store = DocumentStore::default();
        assert_eq!(store.add_item("contracts", json!({"number": "A"})).unwrap(), 0);
        assert_eq!(store.add_item("contracts", json!({"number": "B"})).unwrap(), 1);
        assert_eq!(store.add_item("contracts", json!({"number": "C"})).unwrap(), 2);
        assert_eq!(store.changes().len(), 3);

        let removed = store.remove_item("contracts", 1).unwrap();
        assert_eq!(removed, json!({"number": "B"}));
        assert_eq!(
            store.get_field("contracts"),
            Some(&json!([{"number": "A"}, {"number": "C"}]))
        );
        assert_eq!(store.changes().len(), 4);
    }

    #[test]
    fn test_add_item_creates_missing_list() {
        let mut store = DocumentStore::default();
        store
            .add_item("opinion_publications", json!({"kind": 1}))
            .unwrap();
        assert_eq!(
            store.get_field("opinion_publications"),
            Some(&json!([{"kind": 1}]))
        );
    }

    #[test]
    fn test_add_item_on_non_list_fails_untouched() {
        let mut store = DocumentStore::default();
        store.update_field("contracts", json!("legacy text")).unwrap();
        let before = store.changes().len();

        let err = store.add_item("contracts", json!({})).unwrap_err();
        assert_eq!(
            err,
            OperationError::NotAList {
                path: "contracts".into(),
                found: "string"
            }
        );
        assert_eq!(store.get_field("contracts"), Some(&json!("legacy text")));
        assert_eq!(store.changes().len(), before);

        assert!(matches!(
            store.remove_item("contracts", 0),
            Err(OperationError::NotAList { .. })
        ));
        assert!(matches!(
            store.remove_item("adjustment_code", 0),
            Err(OperationError::NotAList { found: "nothing", .. })
        ));
    }

    #[test]
    fn test_remove_item_out_of_range() {
        let mut store = DocumentStore::default();
        store.add_item("payments", json!({})).unwrap();
        let err = store.remove_item("payments", 5).unwrap_err();
        assert_eq!(
            err,
            OperationError::IndexOutOfRange {
                path: "payments".into(),
                index: 5,
                len: 1
            }
        );
    }

    #[test]
    fn test_invalid_path_refused() {
        let mut store = DocumentStore::default();
        assert!(matches!(
            store.update_field("descriptor..year", json!(1)),
            Err(OperationError::Path(PathError::Malformed { .. }))
        ));
        assert!(matches!(
            store.update_field("mystery_field", json!(1)),
            Err(OperationError::Path(PathError::UnknownSection(_)))
        ));
        assert!(store.get_field("descriptor[").is_none());
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_reset_and_replace() {
        let mut store = DocumentStore::default();
        store.update_field("descriptor.year", json!(2024)).unwrap();
        store.mark_exported(Utc::now());
        assert!(!store.is_dirty());
        assert!(store.synced_at().is_some());
        assert_eq!(store.changes().changes(true).len(), 1);

        store.replace(Document::empty());
        assert!(store.is_dirty());
        assert!(store.changes().is_empty());
        assert!(store.synced_at().is_none());

        store.reset();
        assert_eq!(store.document(), &Document::template());
        assert!(!store.is_dirty());
    }
}
