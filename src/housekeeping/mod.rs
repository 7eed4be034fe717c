use crate::error::HousekeepingError;
use crate::stores::StoreSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// One on/off switch over the three stores' independent maintenance cycles.
///
/// Deterministic partial-failure rule: the active flag flips only after all
/// three starts succeed. If one start fails, stores started earlier keep
/// running and the flag stays unset; store starts are idempotent, so a retry
/// re-invokes all three safely. Not safe for concurrent start/shutdown from
/// multiple threads; the caller serializes its commands.
pub struct HousekeepingManager {
    stores: StoreSet,
    active: AtomicBool,
}

impl HousekeepingManager {
    pub fn new(stores: StoreSet) -> Self {
        Self {
            stores,
            active: AtomicBool::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn start(&self) -> Result<(), HousekeepingError> {
        if self.is_active() {
            return Err(HousekeepingError::AlreadyActive);
        }

        for store in self.stores.all() {
            store
                .start_housekeeping()
                .map_err(|source| HousekeepingError::StartFailed {
                    store: store.name(),
                    source,
                })?;
        }

        self.active.store(true, Ordering::SeqCst);
        tracing::info!("Housekeeping started for all stores");
        Ok(())
    }

    /// Stop all three cycles. Order-independent; every store is signalled
    /// even if an earlier one fails, and the first failure is reported after
    /// the sweep. A no-op when not active.
    pub fn shutdown(&self) -> Result<(), HousekeepingError> {
        if !self.is_active() {
            return Ok(());
        }

        let mut first_failure = None;
        for store in self.stores.all() {
            if let Err(source) = store.shutdown_housekeeping() {
                tracing::warn!("Store {} failed to stop housekeeping: {source}", store.name());
                first_failure.get_or_insert(HousekeepingError::ShutdownFailed {
                    store: store.name(),
                    source,
                });
            }
        }

        self.active.store(false, Ordering::SeqCst);
        tracing::info!("Housekeeping stopped");
        match first_failure {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::stores::StateStore;
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU64;

    struct FakeStore {
        name: &'static str,
        starts: AtomicU64,
        stops: AtomicU64,
        fail_start: AtomicBool,
    }

    impl FakeStore {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                starts: AtomicU64::new(0),
                stops: AtomicU64::new(0),
                fail_start: AtomicBool::new(false),
            })
        }
    }

    impl StateStore for FakeStore {
        fn name(&self) -> &'static str {
            self.name
        }

        fn save_checkpoint(&self, _dir: &Path) -> Result<(), StoreError> {
            Ok(())
        }

        fn restore_from_checkpoint(&self, _dir: &Path) -> Result<(), StoreError> {
            Ok(())
        }

        fn start_housekeeping(&self) -> Result<(), StoreError> {
            if self.fail_start.load(Ordering::SeqCst) {
                return Err(StoreError::Housekeeping("simulated start failure".into()));
            }
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn shutdown_housekeeping(&self) -> Result<(), StoreError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        manager: HousekeepingManager,
        accounts: Arc<FakeStore>,
        feedback: Arc<FakeStore>,
        sessions: Arc<FakeStore>,
    }

    fn fixture() -> Fixture {
        let accounts = FakeStore::new("accounts");
        let feedback = FakeStore::new("feedback");
        let sessions = FakeStore::new("sessions");
        let stores = StoreSet::new(
            Arc::clone(&accounts) as Arc<dyn StateStore>,
            Arc::clone(&feedback) as Arc<dyn StateStore>,
            Arc::clone(&sessions) as Arc<dyn StateStore>,
        );
        Fixture {
            manager: HousekeepingManager::new(stores),
            accounts,
            feedback,
            sessions,
        }
    }

    #[test]
    fn start_runs_all_three_and_flips_the_flag() {
        let fx = fixture();
        fx.manager.start().unwrap();

        assert!(fx.manager.is_active());
        assert_eq!(fx.accounts.starts.load(Ordering::SeqCst), 1);
        assert_eq!(fx.feedback.starts.load(Ordering::SeqCst), 1);
        assert_eq!(fx.sessions.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn start_while_active_is_a_precondition_error() {
        let fx = fixture();
        fx.manager.start().unwrap();
        assert!(matches!(
            fx.manager.start().unwrap_err(),
            HousekeepingError::AlreadyActive
        ));
    }

    #[test]
    fn shutdown_when_inactive_is_a_no_op() {
        let fx = fixture();
        fx.manager.shutdown().unwrap();
        assert_eq!(fx.accounts.stops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn shutdown_stops_all_three_and_clears_the_flag() {
        let fx = fixture();
        fx.manager.start().unwrap();
        fx.manager.shutdown().unwrap();

        assert!(!fx.manager.is_active());
        assert_eq!(fx.accounts.stops.load(Ordering::SeqCst), 1);
        assert_eq!(fx.feedback.stops.load(Ordering::SeqCst), 1);
        assert_eq!(fx.sessions.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_start_leaves_the_flag_unset_and_is_retryable() {
        let fx = fixture();
        fx.feedback.fail_start.store(true, Ordering::SeqCst);

        let err = fx.manager.start().unwrap_err();
        assert!(matches!(
            err,
            HousekeepingError::StartFailed { store: "feedback", .. }
        ));
        assert!(!fx.manager.is_active());
        // Account housekeeping was already started and keeps running.
        assert_eq!(fx.accounts.starts.load(Ordering::SeqCst), 1);

        fx.feedback.fail_start.store(false, Ordering::SeqCst);
        fx.manager.start().unwrap();
        assert!(fx.manager.is_active());
    }
}
