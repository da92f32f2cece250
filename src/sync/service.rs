use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::persistence::SnapshotStore;
use super::transmit::{TransmissionClient, TransmissionOutcome};
use super::{DocumentPhase, SubscriptionId, SyncError, SyncEvent, SyncOptions, SyncState};
use crate::document::{ChangeRecord, DocumentStore};
use crate::normalize::{self, ExportOptions, ImportReport};
use crate::validation::{ValidationReport, Validator};

type Listener = Arc<dyn Fn(&SyncState) + Send + Sync>;

/// State guarded by the core lock
struct Core {
    store: DocumentStore,
    options: SyncOptions,
    phase: DocumentPhase,
    last_validation: Option<ValidationReport>,
}

impl Core {
    fn new(options: SyncOptions) -> Self {
        Self {
            store: DocumentStore::new(options.track_changes, options.change_capacity),
            options,
            phase: DocumentPhase::Empty,
            last_validation: None,
        }
    }

    fn snapshot(&self) -> SyncState {
        SyncState {
            document: self.store.document().clone(),
            dirty: self.store.is_dirty(),
            phase: self.phase,
            last_validation: self.last_validation.clone(),
            synced_at: self.store.synced_at(),
            changes: self.store.changes().iter().cloned().collect(),
        }
    }

    fn revalidate(&mut self, validator: &Validator) -> ValidationReport {
        let report = validator.validate(self.store.document());
        self.last_validation = Some(report.clone());
        report
    }
}

/// Clears the notifying marker even if a listener panics
struct NotifyingGuard<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for NotifyingGuard<'_> {
    fn drop(&mut self) {
        *lock(self.0) = None;
    }
}

/// The single-writer document service.
///
/// Mutating calls are serialized by a writer lock. Listeners run on the
/// calling thread after the document lock is released, so they may read the
/// service freely; a mutating call from inside a listener is rejected with
/// [`SyncError::Reentrant`].
pub struct SyncService {
    id: Uuid,
    core: Mutex<Core>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    writer: Mutex<()>,
    notifying: Mutex<Option<ThreadId>>,
    update_tx: broadcast::Sender<SyncEvent>,
    validator: Validator,
    snapshots: Option<Arc<dyn SnapshotStore + Send + Sync>>,
}

impl SyncService {
    /// A service holding the empty template with default options
    pub fn new() -> Self {
        Self::with_options(SyncOptions::default())
    }

    pub fn with_options(options: SyncOptions) -> Self {
        let (update_tx, _) = broadcast::channel(32);
        Self {
            id: Uuid::new_v4(),
            core: Mutex::new(Core::new(options)),
            listeners: Mutex::new(Vec::new()),
            writer: Mutex::new(()),
            notifying: Mutex::new(None),
            update_tx,
            validator: Validator::new(),
            snapshots: None,
        }
    }

    /// Use a fixed identity, e.g. to reopen a stored snapshot
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Push a snapshot to `store` after every document change
    pub fn with_snapshot_store(mut self, store: impl SnapshotStore + Send + Sync + 'static) -> Self {
        self.snapshots = Some(Arc::new(store));
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn options(&self) -> SyncOptions {
        lock(&self.core).options.clone()
    }

    /// Reset to the template and apply `options`
    pub fn initialize(&self, options: SyncOptions) -> Result<(), SyncError> {
        self.mutate("initialize", |core| {
            core.store
                .configure(options.track_changes, options.change_capacity);
            core.store.reset();
            core.options = options;
            core.last_validation = None;
            Ok(((), Some(SyncEvent::Reset)))
        })
    }

    /// Set a field. Returns `false` without notifying when the value is
    /// already there.
    pub fn update_field(&self, path: &str, value: Value) -> Result<bool, SyncError> {
        self.mutate("update_field", |core| {
            let changed = core.store.update_field(path, value)?;
            let event = changed.then(|| SyncEvent::FieldUpdated {
                path: path.to_string(),
            });
            Ok((changed, event))
        })
    }

    /// Append to a list. Returns the new item's index.
    pub fn add_item(&self, list_path: &str, item: Value) -> Result<usize, SyncError> {
        self.mutate("add_item", |core| {
            let index = core.store.add_item(list_path, item)?;
            let event = SyncEvent::ItemAdded {
                path: list_path.to_string(),
                index,
            };
            Ok((index, Some(event)))
        })
    }

    /// Remove a list item. Returns the removed value.
    pub fn remove_item(&self, list_path: &str, index: usize) -> Result<Value, SyncError> {
        self.mutate("remove_item", |core| {
            let removed = core.store.remove_item(list_path, index)?;
            let event = SyncEvent::ItemRemoved {
                path: list_path.to_string(),
                index,
            };
            Ok((removed, Some(event)))
        })
    }

    pub fn get_field(&self, path: &str) -> Option<Value> {
        lock(&self.core).store.get_field(path).cloned()
    }

    /// Revert the most recent change. Returns `false` when there is nothing
    /// to undo or change tracking is off.
    pub fn undo(&self) -> Result<bool, SyncError> {
        self.mutate("undo", |core| {
            if !core.options.track_changes {
                return Ok((false, None));
            }
            match core.store.undo()? {
                Some(change) => {
                    let event = SyncEvent::Undone {
                        path: change.path.to_string(),
                    };
                    Ok((true, Some(event)))
                }
                None => Ok((false, None)),
            }
        })
    }

    /// Import external JSON text. A failed import leaves the document as
    /// it was and notifies nobody.
    pub fn import_json(&self, raw: &str) -> Result<ImportReport, SyncError> {
        self.mutate("import", |core| {
            let report = normalize::import(raw);
            let Some(document) = report.data.clone() else {
                log::info!("Import failed: {} error(s)", report.errors.len());
                return Ok((report, None));
            };
            core.store.replace(document);
            let event = SyncEvent::Imported {
                warnings: report.warnings.len(),
            };
            Ok((report, Some(event)))
        })
    }

    pub fn import_bytes(&self, raw: &[u8]) -> Result<ImportReport, SyncError> {
        let text = std::str::from_utf8(raw)?;
        self.import_json(text)
    }

    /// Export with default options
    pub fn export_json(&self) -> Result<String, SyncError> {
        self.export_with(&ExportOptions::default())
    }

    /// Render the document. Clears `dirty` and marks all changes synced.
    pub fn export_with(&self, options: &ExportOptions) -> Result<String, SyncError> {
        self.mutate("export", |core| {
            let now = Utc::now();
            let text = normalize::export_at(core.store.document(), options, now)?;
            core.store.mark_exported(now);
            Ok((text, Some(SyncEvent::Exported { at: now })))
        })
    }

    /// Validate now, store the report and notify
    pub fn validate(&self) -> Result<ValidationReport, SyncError> {
        self.mutate("validate", |core| Ok(Self::validated(core, &self.validator)))
    }

    /// The most recent validation report, if any
    pub fn validation(&self) -> Option<ValidationReport> {
        lock(&self.core).last_validation.clone()
    }

    /// Flag every change as synced. Returns how many were flipped.
    pub fn mark_synced(&self) -> Result<usize, SyncError> {
        self.mutate("mark_synced", |core| {
            let count = core.store.mark_synced();
            Ok((count, Some(SyncEvent::ChangesSynced { count })))
        })
    }

    pub fn changes(&self, synced_only: bool) -> Vec<ChangeRecord> {
        lock(&self.core).store.changes().changes(synced_only)
    }

    pub fn clear_changes(&self) -> Result<(), SyncError> {
        self.mutate("clear_changes", |core| {
            core.store.clear_changes();
            Ok(((), Some(SyncEvent::ChangesCleared)))
        })
    }

    /// Pretty JSON audit trail of the change history
    pub fn export_audit_log(&self) -> Result<String, SyncError> {
        Ok(lock(&self.core).store.changes().to_audit_json()?)
    }

    /// Back to the empty template, keeping the current options
    pub fn reset(&self) -> Result<(), SyncError> {
        self.mutate("reset", |core| {
            core.store.reset();
            core.last_validation = None;
            Ok(((), Some(SyncEvent::Reset)))
        })
    }

    pub fn state(&self) -> SyncState {
        lock(&self.core).snapshot()
    }

    pub fn subscribe(&self, listener: impl Fn(&SyncState) + Send + Sync + 'static) -> SubscriptionId {
        let id = Uuid::new_v4();
        lock(&self.listeners).push((id, Arc::new(listener)));
        id
    }

    /// Returns whether the subscription existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// A receiver for the events of every subsequent notifying call
    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.update_tx.subscribe()
    }

    /// Whether the current document would pass validation
    pub fn can_transmit(&self) -> bool {
        let core = lock(&self.core);
        self.validator.validate(core.store.document()).valid
    }

    /// Validate and, when valid, hand the compact export to `client`.
    /// The document is marked exported only if the client reports success.
    pub fn transmit(&self, client: &dyn TransmissionClient) -> Result<TransmissionOutcome, SyncError> {
        self.check_reentrancy("transmit")?;
        let _writer = lock(&self.writer);

        let report = self.apply(|core| Ok(Self::validated(core, &self.validator)))?;
        if !report.valid {
            log::warn!(
                "Refusing to transmit: {} validation error(s)",
                report.errors.len()
            );
            return Err(SyncError::NotReady {
                errors: report.errors.len(),
            });
        }

        let options = ExportOptions {
            pretty: false,
            ..ExportOptions::default()
        };
        let now = Utc::now();
        let payload = normalize::export_at(lock(&self.core).store.document(), &options, now)?;
        let outcome = client.submit(&payload, report.valid);
        if outcome.success {
            log::info!("Transmission accepted: {:?}", outcome.protocol_id);
            self.apply(|core| {
                core.store.mark_exported(now);
                Ok(((), Some(SyncEvent::Exported { at: now })))
            })?;
        } else {
            log::warn!("Transmission rejected: {}", outcome.message);
        }
        Ok(outcome)
    }

    /// Reload the last stored snapshot. Returns `false` when there is no
    /// store or nothing stored under this service's id.
    pub fn restore(&self) -> Result<bool, SyncError> {
        let Some(store) = &self.snapshots else {
            return Ok(false);
        };
        if !store.exists(self.id) {
            return Ok(false);
        }
        let bytes = store.load(self.id)?;
        let report = self.import_bytes(&bytes)?;
        Ok(report.success)
    }

    fn validated(core: &mut Core, validator: &Validator) -> (ValidationReport, Option<SyncEvent>) {
        let report = core.revalidate(validator);
        let event = SyncEvent::Validated {
            valid: report.valid,
            errors: report.errors.len(),
            warnings: report.warnings.len(),
        };
        (report, Some(event))
    }

    fn check_reentrancy(&self, operation: &'static str) -> Result<(), SyncError> {
        if *lock(&self.notifying) == Some(thread::current().id()) {
            log::warn!("Rejected reentrant '{}' from a subscriber", operation);
            return Err(SyncError::Reentrant { operation });
        }
        Ok(())
    }

    fn mutate<R, F>(&self, operation: &'static str, f: F) -> Result<R, SyncError>
    where
        F: FnOnce(&mut Core) -> Result<(R, Option<SyncEvent>), SyncError>,
    {
        self.check_reentrancy(operation)?;
        let _writer = lock(&self.writer);
        self.apply(f)
    }

    /// Run `f` on the core, then re-validate, persist, publish and notify.
    /// The caller holds the writer lock.
    fn apply<R, F>(&self, f: F) -> Result<R, SyncError>
    where
        F: FnOnce(&mut Core) -> Result<(R, Option<SyncEvent>), SyncError>,
    {
        let (result, event, state) = {
            let mut core = lock(&self.core);
            let (result, event) = f(&mut core)?;
            let Some(event) = event else {
                return Ok(result);
            };

            core.phase = event.next_phase(core.phase);
            if event.changes_document() {
                if core.options.auto_validate {
                    core.revalidate(&self.validator);
                }
                self.persist(&core);
            }
            (result, event, core.snapshot())
        };

        log::debug!("Publishing {:?}", event);
        let _ = self.update_tx.send(event);
        self.notify(&state);
        Ok(result)
    }

    fn persist(&self, core: &Core) {
        let Some(store) = &self.snapshots else {
            return;
        };
        let pushed = serde_json::to_vec(core.store.document())
            .map_err(SyncError::from)
            .and_then(|data| store.store(self.id, &data).map_err(SyncError::from));
        if let Err(e) = pushed {
            log::warn!("Failed to persist snapshot for {}: {}", self.id, e);
        }
    }

    fn notify(&self, state: &SyncState) {
        let listeners: Vec<Listener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        if listeners.is_empty() {
            return;
        }

        *lock(&self.notifying) = Some(thread::current().id());
        let _guard = NotifyingGuard(&self.notifying);
        for listener in listeners {
            listener(state);
        }
    }
}

impl Default for SyncService {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
