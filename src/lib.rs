//! Document synchronization and validation engine for AUDESP accountability
//! reports.
//!
//! One canonical in-memory report is kept consistent across interactive field
//! edits, an exchanged JSON document and a validation report that gates
//! transmission. [`SyncService`] is the entry point.

pub mod document;
pub mod normalize;
pub mod sync;
pub mod validation;

pub use document::{
    ChangeLog, ChangeRecord, Document, DocumentStore, FieldPath, OperationError, PathError, Section,
};
pub use normalize::{export, import, ExportOptions, ImportIssue, ImportReport};
pub use sync::{
    DocumentPhase, LocalFileStore, SnapshotStore, SubscriptionId, SyncError, SyncEvent, SyncOptions,
    SyncService, SyncState, TransmissionClient, TransmissionOutcome,
};
pub use validation::{Category, Diagnostic, Severity, ValidationReport, Validator};
