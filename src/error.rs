use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `Coffer`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
///
/// Two classes run through the hierarchy: precondition violations (wrong
/// attachment state, operation already active, gate refusals) are synchronous
/// and non-retryable; I/O and collaborator failures may be retried by the
/// caller.
#[derive(Debug, Error)]
pub enum CofferError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Checkpoint manager / autosave ───────────────────────────────────
    #[error("checkpoint: {0}")]
    Checkpoint(#[from] CheckpointError),

    // ── Operations gate ─────────────────────────────────────────────────
    #[error("gate: {0}")]
    Gate(#[from] GateError),

    // ── Housekeeping lifecycle ──────────────────────────────────────────
    #[error("housekeeping: {0}")]
    Housekeeping(#[from] HousekeepingError),

    // ── Collaborator stores ─────────────────────────────────────────────
    #[error("store: {0}")]
    Store(#[from] StoreError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Checkpoint errors ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CheckpointError {
    /// `save_primary` or `start_auto_save` attempted while the in-memory
    /// state came from somewhere other than the primary checkpoint.
    #[error("not attached to primary checkpoint (active: {active})")]
    NotAttachedToPrimary { active: String },

    #[error("autosave is running; shut it down before loading a checkpoint")]
    AutoSaveRunning,

    #[error("autosave is already running")]
    AutoSaveAlreadyRunning,

    #[error("autosave slot {slot} out of range (valid: 1..={max_slots})")]
    SlotOutOfRange { slot: u32, max_slots: u32 },

    #[error("invalid snapshot name {0:?}")]
    InvalidSnapshotName(String),

    #[error("checkpoint {0} does not exist")]
    Missing(String),

    #[error("store {store}: {source}")]
    Store {
        store: &'static str,
        source: StoreError,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("durable autosave record: {0}")]
    Kv(#[from] KvError),
}

// ─── Operations gate errors ─────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GateError {
    #[error("server is accepting connections; refusing to load a checkpoint")]
    ServerAcceptingConnections,

    #[error("housekeeping is active; refusing to load a checkpoint")]
    HousekeepingActive,
}

// ─── Housekeeping errors ────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum HousekeepingError {
    #[error("housekeeping is already active")]
    AlreadyActive,

    #[error("store {store} failed to start housekeeping: {source}")]
    StartFailed {
        store: &'static str,
        source: StoreError,
    },

    #[error("store {store} failed to stop housekeeping: {source}")]
    ShutdownFailed {
        store: &'static str,
        source: StoreError,
    },
}

// ─── Collaborator store errors ──────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("housekeeping worker: {0}")]
    Housekeeping(String),

    #[error("lock poisoned: {0}")]
    Lock(String),
}

// ─── Durable key-value errors ───────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum KvError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("key {key} holds a non-integer value")]
    WrongType { key: String },
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, CofferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_precondition_displays_active_identity() {
        let err = CofferError::Checkpoint(CheckpointError::NotAttachedToPrimary {
            active: "snapshot \"nightly\"".into(),
        });
        assert!(err.to_string().contains("not attached to primary"));
        assert!(err.to_string().contains("nightly"));
    }

    #[test]
    fn slot_out_of_range_displays_bounds() {
        let err = CheckpointError::SlotOutOfRange {
            slot: 12,
            max_slots: 10,
        };
        assert!(err.to_string().contains("12"));
        assert!(err.to_string().contains("1..=10"));
    }

    #[test]
    fn gate_errors_name_the_blocking_subsystem() {
        assert!(
            GateError::ServerAcceptingConnections
                .to_string()
                .contains("accepting connections")
        );
        assert!(
            GateError::HousekeepingActive
                .to_string()
                .contains("housekeeping")
        );
    }

    #[test]
    fn anyhow_interop() {
        let anyhow_err = anyhow::anyhow!("something went wrong");
        let coffer_err: CofferError = anyhow_err.into();
        assert!(coffer_err.to_string().contains("something went wrong"));
    }

    #[test]
    fn store_error_wraps_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = CofferError::Store(StoreError::Io(io));
        assert!(err.to_string().contains("no such file"));
    }
}
