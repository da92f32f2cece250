//! The sync service and its configuration, state and event types
//!
//! [`SyncService`] composes the document store, the normalizer and the
//! validator behind a publish/subscribe interface. Every mutating call
//! re-validates (when configured) and then notifies listeners with a
//! [`SyncState`] snapshot, synchronously, in subscription order.

mod error;
pub mod persistence;
mod service;
pub mod transmit;

pub use error::SyncError;
pub use persistence::{LocalFileStore, PersistenceError, SnapshotStore};
pub use service::SyncService;
pub use transmit::{TransmissionClient, TransmissionOutcome};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::{ChangeRecord, Document, DEFAULT_CAPACITY};
use crate::validation::ValidationReport;

/// Token returned by [`SyncService::subscribe`]
pub type SubscriptionId = Uuid;

/// Service configuration. Missing JSON keys take their defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Re-run validation after every mutation
    pub auto_validate: bool,
    /// Record changes in the history. Without it `undo` always fails.
    pub track_changes: bool,
    /// Reserved; has no effect yet
    pub auto_export: bool,
    /// Number of changes kept before the oldest is evicted
    pub change_capacity: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            auto_validate: true,
            track_changes: true,
            auto_export: false,
            change_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl SyncOptions {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn with_auto_validate(mut self, enabled: bool) -> Self {
        self.auto_validate = enabled;
        self
    }

    pub fn with_track_changes(mut self, enabled: bool) -> Self {
        self.track_changes = enabled;
        self
    }

    pub fn with_auto_export(mut self, enabled: bool) -> Self {
        self.auto_export = enabled;
        self
    }

    pub fn with_change_capacity(mut self, capacity: usize) -> Self {
        self.change_capacity = capacity;
        self
    }
}

/// Where the document is in its edit/export lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentPhase {
    /// Fresh template, untouched
    Empty,
    /// Changed since the last export
    Dirty,
    /// Explicitly validated after the last change
    Validated,
    /// Exported with no change since
    Synced,
}

/// Immutable snapshot handed to listeners
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SyncState {
    pub document: Document,
    pub dirty: bool,
    pub phase: DocumentPhase,
    pub last_validation: Option<ValidationReport>,
    pub synced_at: Option<DateTime<Utc>>,
    pub changes: Vec<ChangeRecord>,
}

/// Published on the broadcast channel once per notifying call
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    Reset,
    FieldUpdated { path: String },
    ItemAdded { path: String, index: usize },
    ItemRemoved { path: String, index: usize },
    Undone { path: String },
    Imported { warnings: usize },
    Exported { at: DateTime<Utc> },
    Validated { valid: bool, errors: usize, warnings: usize },
    ChangesSynced { count: usize },
    ChangesCleared,
}

impl SyncEvent {
    /// Whether the document content may have changed
    pub fn changes_document(&self) -> bool {
        matches!(
            self,
            SyncEvent::Reset
                | SyncEvent::FieldUpdated { .. }
                | SyncEvent::ItemAdded { .. }
                | SyncEvent::ItemRemoved { .. }
                | SyncEvent::Undone { .. }
                | SyncEvent::Imported { .. }
        )
    }

    fn next_phase(&self, current: DocumentPhase) -> DocumentPhase {
        match self {
            SyncEvent::Reset => DocumentPhase::Empty,
            SyncEvent::FieldUpdated { .. }
            | SyncEvent::ItemAdded { .. }
            | SyncEvent::ItemRemoved { .. }
            | SyncEvent::Undone { .. }
            | SyncEvent::Imported { .. } => DocumentPhase::Dirty,
            SyncEvent::Exported { .. } => DocumentPhase::Synced,
            SyncEvent::Validated { .. } if current == DocumentPhase::Dirty => {
                DocumentPhase::Validated
            }
            SyncEvent::Validated { .. }
            | SyncEvent::ChangesSynced { .. }
            | SyncEvent::ChangesCleared => current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_partial_json() {
        let options = SyncOptions::from_json(r#"{"track_changes": false}"#).unwrap();
        assert!(!options.track_changes);
        assert!(options.auto_validate);
        assert_eq!(options.change_capacity, DEFAULT_CAPACITY);
        assert_eq!(SyncOptions::from_json("{}").unwrap(), SyncOptions::default());
    }

    #[test]
    fn test_phase_transitions() {
        use DocumentPhase::*;
        let edit = SyncEvent::FieldUpdated {
            path: "descriptor.year".into(),
        };
        let validated = SyncEvent::Validated {
            valid: false,
            errors: 1,
            warnings: 0,
        };

        assert_eq!(edit.next_phase(Empty), Dirty);
        assert_eq!(validated.next_phase(Dirty), Validated);
        assert_eq!(validated.next_phase(Empty), Empty);
        assert_eq!(edit.next_phase(Validated), Dirty);
        assert_eq!(SyncEvent::Exported { at: Utc::now() }.next_phase(Dirty), Synced);
        assert_eq!(edit.next_phase(Synced), Dirty);
        assert_eq!(SyncEvent::Reset.next_phase(Synced), Empty);
    }

    #[test]
    fn test_event_serialization() {
        let event = SyncEvent::ItemAdded {
            path: "contracts".into(),
            index: 0,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "item_added");
        assert_eq!(value["index"], 0);
    }
}
