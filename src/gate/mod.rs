use crate::checkpoint::{AutoSaveMetrics, CheckpointIdentity, CheckpointManager};
use crate::error::{CofferError, GateError, Result};
use crate::housekeeping::HousekeepingManager;
use crate::stores::ListenerStatus;
use std::sync::Arc;

/// Composition root for operator commands.
///
/// A checkpoint load replaces the entire in-memory state out from under any
/// subsystem still serving requests or running maintenance, so every load is
/// checked against the listener and housekeeping state first. This is the
/// only entry point external callers (console, API) should use; saves,
/// autosave control, and queries pass straight through.
pub struct OperationsGate {
    checkpoints: Arc<CheckpointManager>,
    housekeeping: Arc<HousekeepingManager>,
    listener: Arc<dyn ListenerStatus>,
}

impl OperationsGate {
    pub fn new(
        checkpoints: Arc<CheckpointManager>,
        housekeeping: Arc<HousekeepingManager>,
        listener: Arc<dyn ListenerStatus>,
    ) -> Self {
        Self {
            checkpoints,
            housekeeping,
            listener,
        }
    }

    fn check_load_allowed(&self) -> std::result::Result<(), GateError> {
        if self.listener.is_accepting_connections() {
            return Err(GateError::ServerAcceptingConnections);
        }
        if self.housekeeping.is_active() {
            return Err(GateError::HousekeepingActive);
        }
        Ok(())
    }

    // ── Gated load operations ───────────────────────────────────────────

    pub fn load_primary(&self) -> Result<()> {
        self.check_load_allowed()?;
        self.checkpoints.load_primary().map_err(CofferError::from)
    }

    pub fn load_auto_save(&self, slot: u32) -> Result<()> {
        self.check_load_allowed()?;
        self.checkpoints
            .load_auto_save(slot)
            .map_err(CofferError::from)
    }

    pub fn load_snapshot(&self, name: &str) -> Result<()> {
        self.check_load_allowed()?;
        self.checkpoints
            .load_snapshot(name)
            .map_err(CofferError::from)
    }

    // ── Ungated pass-throughs ───────────────────────────────────────────

    pub fn save_primary(&self) -> Result<()> {
        self.checkpoints.save_primary().map_err(CofferError::from)
    }

    pub fn save_snapshot(&self, name: &str) -> Result<()> {
        self.checkpoints
            .save_snapshot(name)
            .map_err(CofferError::from)
    }

    pub fn start_auto_save(&self) -> Result<()> {
        self.checkpoints.start_auto_save().map_err(CofferError::from)
    }

    pub async fn shutdown_auto_save(&self) -> Result<()> {
        self.checkpoints
            .shutdown_auto_save()
            .await
            .map_err(CofferError::from)
    }

    pub fn start_housekeeping(&self) -> Result<()> {
        self.housekeeping.start().map_err(CofferError::from)
    }

    pub fn shutdown_housekeeping(&self) -> Result<()> {
        self.housekeeping.shutdown().map_err(CofferError::from)
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn active_checkpoint(&self) -> Option<CheckpointIdentity> {
        self.checkpoints.active_checkpoint()
    }

    pub fn is_attached_to_primary(&self) -> bool {
        self.checkpoints.is_attached_to_primary()
    }

    pub fn is_auto_save_running(&self) -> bool {
        self.checkpoints.is_auto_save_running()
    }

    pub fn auto_save_metrics(&self) -> AutoSaveMetrics {
        self.checkpoints.auto_save_metrics()
    }

    pub fn is_housekeeping_active(&self) -> bool {
        self.housekeeping.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointLayout;
    use crate::config::AutosaveSettings;
    use crate::error::StoreError;
    use crate::persist::MemoryKv;
    use crate::stores::{StateStore, StoreSet};
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct NullStore;

    impl StateStore for NullStore {
        fn name(&self) -> &'static str {
            "null"
        }
        fn save_checkpoint(&self, _dir: &Path) -> std::result::Result<(), StoreError> {
            Ok(())
        }
        fn restore_from_checkpoint(&self, _dir: &Path) -> std::result::Result<(), StoreError> {
            Ok(())
        }
        fn start_housekeeping(&self) -> std::result::Result<(), StoreError> {
            Ok(())
        }
        fn shutdown_housekeeping(&self) -> std::result::Result<(), StoreError> {
            Ok(())
        }
    }

    struct FakeListener {
        accepting: AtomicBool,
    }

    impl ListenerStatus for FakeListener {
        fn is_accepting_connections(&self) -> bool {
            self.accepting.load(Ordering::SeqCst)
        }
    }

    fn fixture() -> (TempDir, OperationsGate, Arc<FakeListener>) {
        let tmp = TempDir::new().unwrap();
        let layout = CheckpointLayout::new(tmp.path());
        std::fs::create_dir_all(layout.primary()).unwrap();

        let stores = StoreSet::new(
            Arc::new(NullStore),
            Arc::new(NullStore),
            Arc::new(NullStore),
        );
        let checkpoints = Arc::new(CheckpointManager::new(
            layout,
            stores.clone(),
            Arc::new(MemoryKv::new()),
            AutosaveSettings {
                max_slots: 3,
                period: Duration::from_secs(600),
            },
        ));
        let housekeeping = Arc::new(HousekeepingManager::new(stores));
        let listener = Arc::new(FakeListener {
            accepting: AtomicBool::new(false),
        });
        let gate = OperationsGate::new(
            checkpoints,
            housekeeping,
            Arc::clone(&listener) as Arc<dyn ListenerStatus>,
        );
        (tmp, gate, listener)
    }

    #[test]
    fn load_refused_while_accepting_connections() {
        let (_tmp, gate, listener) = fixture();
        listener.accepting.store(true, Ordering::SeqCst);

        let err = gate.load_primary().unwrap_err();
        assert!(matches!(
            err,
            CofferError::Gate(GateError::ServerAcceptingConnections)
        ));
        assert!(gate.active_checkpoint().is_none());
    }

    #[test]
    fn load_refused_while_housekeeping_is_active() {
        let (_tmp, gate, _listener) = fixture();
        gate.start_housekeeping().unwrap();

        let err = gate.load_primary().unwrap_err();
        assert!(matches!(
            err,
            CofferError::Gate(GateError::HousekeepingActive)
        ));

        gate.shutdown_housekeeping().unwrap();
        gate.load_primary().unwrap();
        assert!(gate.is_attached_to_primary());
    }

    #[test]
    fn listener_check_runs_before_housekeeping_check() {
        let (_tmp, gate, listener) = fixture();
        listener.accepting.store(true, Ordering::SeqCst);
        gate.start_housekeeping().unwrap();

        let err = gate.load_primary().unwrap_err();
        assert!(matches!(
            err,
            CofferError::Gate(GateError::ServerAcceptingConnections)
        ));
    }

    #[test]
    fn saves_are_not_gated() {
        let (_tmp, gate, listener) = fixture();
        gate.load_primary().unwrap();
        listener.accepting.store(true, Ordering::SeqCst);

        gate.save_primary().unwrap();
        gate.save_snapshot("while-serving").unwrap();
    }

    #[tokio::test]
    async fn autosave_control_passes_through() {
        let (_tmp, gate, _listener) = fixture();
        gate.load_primary().unwrap();

        gate.start_auto_save().unwrap();
        assert!(gate.is_auto_save_running());
        assert_eq!(gate.auto_save_metrics().max_slots, 3);

        gate.shutdown_auto_save().await.unwrap();
        assert!(!gate.is_auto_save_running());
    }
}
