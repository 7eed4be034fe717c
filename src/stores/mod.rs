mod accounts;
mod feedback;
mod sessions;

pub use accounts::{Account, AccountStore};
pub use feedback::{FeedbackEntry, FeedbackStore};
pub use sessions::{NetSession, SessionStore};

use crate::error::StoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Contract every checkpointed subsystem implements. The checkpoint manager
/// treats implementors as opaque, ordered steps: it decides when and in what
/// order these run, never what they write.
pub trait StateStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Serialize all in-memory state into `dir`.
    fn save_checkpoint(&self, dir: &Path) -> Result<(), StoreError>;

    /// Replace all in-memory state with what `dir` holds. A store document
    /// absent from the directory restores as the empty dataset.
    fn restore_from_checkpoint(&self, dir: &Path) -> Result<(), StoreError>;

    /// Start this store's own periodic maintenance cycle. Idempotent: a
    /// second start while running is a no-op.
    fn start_housekeeping(&self) -> Result<(), StoreError>;

    /// Signal the maintenance cycle to stop. An in-flight cycle finishes in
    /// the background.
    fn shutdown_housekeeping(&self) -> Result<(), StoreError>;
}

/// Listener state query used by the operations gate.
pub trait ListenerStatus: Send + Sync {
    fn is_accepting_connections(&self) -> bool;
}

/// The three collaborator stores in their contractual order.
///
/// Save runs network/session state first and account data last; restore runs
/// the exact reverse. Account identifiers must be resolvable before anything
/// that references them is restored, and must be the last thing committed on
/// save. The two order arrays below are the single source of truth for both
/// the manual and the autosave path.
#[derive(Clone)]
pub struct StoreSet {
    accounts: Arc<dyn StateStore>,
    feedback: Arc<dyn StateStore>,
    sessions: Arc<dyn StateStore>,
}

impl StoreSet {
    pub fn new(
        accounts: Arc<dyn StateStore>,
        feedback: Arc<dyn StateStore>,
        sessions: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            accounts,
            feedback,
            sessions,
        }
    }

    pub(crate) fn save_order(&self) -> [&dyn StateStore; 3] {
        [
            self.sessions.as_ref(),
            self.feedback.as_ref(),
            self.accounts.as_ref(),
        ]
    }

    pub(crate) fn restore_order(&self) -> [&dyn StateStore; 3] {
        [
            self.accounts.as_ref(),
            self.feedback.as_ref(),
            self.sessions.as_ref(),
        ]
    }

    pub fn all(&self) -> [&dyn StateStore; 3] {
        self.restore_order()
    }
}

// ── Shared document I/O ───────────────────────────────────────────

pub(crate) fn write_document<T: Serialize>(
    dir: &Path,
    file: &str,
    value: &T,
) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(dir.join(file), json)?;
    Ok(())
}

pub(crate) fn read_document<T: DeserializeOwned + Default>(
    dir: &Path,
    file: &str,
) -> Result<T, StoreError> {
    let path = dir.join(file);
    if !path.exists() {
        return Ok(T::default());
    }
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

pub(crate) fn lock_err<T>(e: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Lock(e.to_string())
}
