mod autosave;
mod manager;

pub use autosave::AutoSaveMetrics;
pub use manager::CheckpointManager;

use std::fmt;
use std::path::{Path, PathBuf};

const PRIMARY_DIR: &str = "PrimaryCheckpoint";
const AUTOSAVE_DIR: &str = "AutoSaveCheckpoints";
const SNAPSHOT_DIR: &str = "SnapshotCheckpoints";

/// Identity of one on-disk checkpoint. Resolves deterministically to a
/// directory under the data root; at most one identity is attached in a
/// running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointIdentity {
    Primary,
    AutoSave(u32),
    Snapshot(String),
}

impl fmt::Display for CheckpointIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::AutoSave(slot) => write!(f, "autosave slot {slot}"),
            Self::Snapshot(name) => write!(f, "snapshot {name:?}"),
        }
    }
}

/// Directory layout of the checkpoint tree. Contents of each checkpoint
/// directory are owned by the collaborator stores and opaque here.
#[derive(Debug, Clone)]
pub struct CheckpointLayout {
    base: PathBuf,
}

impl CheckpointLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn primary(&self) -> PathBuf {
        self.base.join(PRIMARY_DIR)
    }

    pub fn auto_save_slot(&self, slot: u32) -> PathBuf {
        self.base.join(AUTOSAVE_DIR).join(slot.to_string())
    }

    pub fn snapshot(&self, name: &str) -> PathBuf {
        self.base.join(SNAPSHOT_DIR).join(name)
    }

    pub fn path_for(&self, identity: &CheckpointIdentity) -> PathBuf {
        match identity {
            CheckpointIdentity::Primary => self.primary(),
            CheckpointIdentity::AutoSave(slot) => self.auto_save_slot(*slot),
            CheckpointIdentity::Snapshot(name) => self.snapshot(name),
        }
    }
}
