use super::autosave::{AutoSaveShared, AutoSaveWorker, LAST_SLOT_KEY, next_slot};
use super::{AutoSaveMetrics, CheckpointIdentity, CheckpointLayout};
use crate::config::AutosaveSettings;
use crate::error::CheckpointError;
use crate::persist::DurableKv;
use crate::stores::StoreSet;
use crate::tasks::{self, PeriodicTask};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Owner of checkpoint identity, the attachment state machine, ordered
/// save/restore across the collaborator stores, and the autosave task.
///
/// Command operations (`load_*`, `save_*`, start/shutdown) are not safe for
/// concurrent invocation from multiple caller threads; the caller serializes
/// its own commands. Metric reads are safe from anywhere.
pub struct CheckpointManager {
    layout: CheckpointLayout,
    stores: StoreSet,
    active: Mutex<Option<CheckpointIdentity>>,
    shared: Arc<AutoSaveShared>,
    task: Mutex<Option<PeriodicTask>>,
    kv: Arc<dyn DurableKv>,
}

impl CheckpointManager {
    pub fn new(
        layout: CheckpointLayout,
        stores: StoreSet,
        kv: Arc<dyn DurableKv>,
        settings: AutosaveSettings,
    ) -> Self {
        Self {
            layout,
            stores,
            active: Mutex::new(None),
            shared: Arc::new(AutoSaveShared::new(settings.period, settings.max_slots)),
            task: Mutex::new(None),
            kv,
        }
    }

    pub fn layout(&self) -> &CheckpointLayout {
        &self.layout
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn active_checkpoint(&self) -> Option<CheckpointIdentity> {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_attached_to_primary(&self) -> bool {
        matches!(self.active_checkpoint(), Some(CheckpointIdentity::Primary))
    }

    pub fn is_auto_save_running(&self) -> bool {
        self.shared.snapshot().is_running
    }

    pub fn auto_save_metrics(&self) -> AutoSaveMetrics {
        self.shared.snapshot()
    }

    // ── Load operations ─────────────────────────────────────────────────

    pub fn load_primary(&self) -> Result<(), CheckpointError> {
        self.load(CheckpointIdentity::Primary)
    }

    pub fn load_auto_save(&self, slot: u32) -> Result<(), CheckpointError> {
        let max_slots = self.shared.max_slots();
        if slot < 1 || slot > max_slots {
            return Err(CheckpointError::SlotOutOfRange { slot, max_slots });
        }
        self.load(CheckpointIdentity::AutoSave(slot))
    }

    pub fn load_snapshot(&self, name: &str) -> Result<(), CheckpointError> {
        validate_snapshot_name(name)?;
        self.load(CheckpointIdentity::Snapshot(name.to_string()))
    }

    /// Load replaces the entire in-memory state, so it is refused while the
    /// autosave task could write mid-restore. On success the attachment
    /// fully replaces the previous one; on failure it is left untouched.
    fn load(&self, identity: CheckpointIdentity) -> Result<(), CheckpointError> {
        if self.is_auto_save_running() {
            return Err(CheckpointError::AutoSaveRunning);
        }

        let dir = self.layout.path_for(&identity);
        if !dir.is_dir() {
            return Err(CheckpointError::Missing(identity.to_string()));
        }

        restore_all(&self.stores, &dir)?;

        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        *active = Some(identity.clone());
        tracing::info!("Loaded checkpoint {identity}");
        Ok(())
    }

    // ── Save operations ─────────────────────────────────────────────────

    /// Write the in-memory state over the primary checkpoint. Refused unless
    /// the state came from the primary checkpoint: overwriting primary with
    /// non-primary in-memory data would silently discard it.
    pub fn save_primary(&self) -> Result<(), CheckpointError> {
        self.require_attached_primary()?;
        self.save_into(&CheckpointIdentity::Primary)
    }

    /// Write the in-memory state into a named snapshot, creating its
    /// directory on demand. Permitted from any attachment state; the
    /// attachment does not change.
    pub fn save_snapshot(&self, name: &str) -> Result<(), CheckpointError> {
        validate_snapshot_name(name)?;
        self.save_into(&CheckpointIdentity::Snapshot(name.to_string()))
    }

    fn save_into(&self, identity: &CheckpointIdentity) -> Result<(), CheckpointError> {
        let dir = self.layout.path_for(identity);
        fs::create_dir_all(&dir)?;
        save_all(&self.stores, &dir)?;
        tracing::info!("Saved checkpoint {identity}");
        Ok(())
    }

    // ── Autosave lifecycle ──────────────────────────────────────────────

    /// Begin the periodic rotation. The rotation position is loaded from the
    /// durable record here, once, at task construction; an abrupt kill later
    /// resumes from whatever was last cleanly persisted.
    pub fn start_auto_save(&self) -> Result<(), CheckpointError> {
        self.require_attached_primary()?;

        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            return Err(CheckpointError::AutoSaveAlreadyRunning);
        }

        let max_slots = self.shared.max_slots();
        let stored = self.kv.get_i64(LAST_SLOT_KEY, 0)?;
        let last_slot = match u32::try_from(stored) {
            Ok(slot) if slot <= max_slots => slot,
            _ => {
                tracing::warn!(
                    "Persisted autosave slot {stored} outside 0..={max_slots}, restarting rotation"
                );
                0
            }
        };
        self.shared.begin_session(last_slot);

        let worker = AutoSaveWorker::new(
            Arc::clone(&self.shared),
            self.stores.clone(),
            self.layout.clone(),
        );
        let metrics = self.shared.snapshot();
        *task = Some(tasks::spawn_periodic("autosave", metrics.period, move || {
            worker.run_once()
        }));

        tracing::info!(
            "Autosave started: {} slots, next slot {}",
            max_slots,
            next_slot(last_slot, max_slots)
        );
        Ok(())
    }

    /// Stop future runs and wait for any in-flight save, then persist the
    /// rotation position. A no-op when autosave is not running.
    pub async fn shutdown_auto_save(&self) -> Result<(), CheckpointError> {
        let task = {
            let mut slot = self.task.lock().unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        let Some(task) = task else {
            return Ok(());
        };

        task.shutdown().await;
        let last_slot = self.shared.end_session();
        self.kv.put_i64(LAST_SLOT_KEY, i64::from(last_slot))?;
        tracing::info!("Autosave stopped at slot {last_slot}");
        Ok(())
    }

    fn require_attached_primary(&self) -> Result<(), CheckpointError> {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match active.as_ref() {
            Some(CheckpointIdentity::Primary) => Ok(()),
            other => Err(CheckpointError::NotAttachedToPrimary {
                active: describe_attachment(other),
            }),
        }
    }
}

fn describe_attachment(active: Option<&CheckpointIdentity>) -> String {
    active.map_or_else(|| "detached".to_string(), ToString::to_string)
}

/// The contractual save sequence: network/session state, then feedback, then
/// account data last. Strictly sequential; the first failing store aborts
/// the rest and the directory may be left partially written (mitigated by
/// the retained older slots, never repaired here).
pub(crate) fn save_all(stores: &StoreSet, dir: &Path) -> Result<(), CheckpointError> {
    for store in stores.save_order() {
        store
            .save_checkpoint(dir)
            .map_err(|source| CheckpointError::Store {
                store: store.name(),
                source,
            })?;
    }
    Ok(())
}

/// The contractual restore sequence: account data first, then feedback, then
/// network/session state. Exact reverse of the save sequence.
pub(crate) fn restore_all(stores: &StoreSet, dir: &Path) -> Result<(), CheckpointError> {
    for store in stores.restore_order() {
        store
            .restore_from_checkpoint(dir)
            .map_err(|source| CheckpointError::Store {
                store: store.name(),
                source,
            })?;
    }
    Ok(())
}

fn validate_snapshot_name(name: &str) -> Result<(), CheckpointError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(CheckpointError::InvalidSnapshotName(name.to_string()))
    }
}
