use super::CheckpointLayout;
use super::manager::save_all;
use crate::stores::StoreSet;
use chrono::{DateTime, Utc};
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Durable record key for the rotation position.
pub(crate) const LAST_SLOT_KEY: &str = "autosave.last_slot";

/// Immutable view of the autosave state, handed to status callers. Never
/// changes after being returned, no matter what the worker does next.
#[derive(Debug, Clone)]
pub struct AutoSaveMetrics {
    pub is_running: bool,
    pub period: Duration,
    pub max_slots: u32,
    pub saves_this_session: u64,
    /// 0 means no autosave has ever run.
    pub last_slot_used: u32,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct MutableState {
    is_running: bool,
    saves_this_session: u64,
    last_slot_used: u32,
    last_started_at: Option<DateTime<Utc>>,
    last_finished_at: Option<DateTime<Utc>>,
}

/// State shared between the checkpoint manager and the autosave worker.
///
/// Written only by the worker (and by session begin/end on the command
/// path), read from arbitrary threads. Everything goes through the one mutex
/// and out as a cloned snapshot; raw field access never leaves this type.
pub(crate) struct AutoSaveShared {
    period: Duration,
    max_slots: u32,
    state: Mutex<MutableState>,
}

impl AutoSaveShared {
    pub(crate) fn new(period: Duration, max_slots: u32) -> Self {
        Self {
            period,
            max_slots,
            state: Mutex::new(MutableState::default()),
        }
    }

    pub(crate) fn max_slots(&self) -> u32 {
        self.max_slots
    }

    pub(crate) fn snapshot(&self) -> AutoSaveMetrics {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        AutoSaveMetrics {
            is_running: state.is_running,
            period: self.period,
            max_slots: self.max_slots,
            saves_this_session: state.saves_this_session,
            last_slot_used: state.last_slot_used,
            last_started_at: state.last_started_at,
            last_finished_at: state.last_finished_at,
        }
    }

    /// Mark the task running and seed the rotation position loaded from the
    /// durable record. Counters are deliberately left alone: they reset at
    /// process start, not at every start/stop cycle.
    pub(crate) fn begin_session(&self, last_slot_used: u32) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.is_running = true;
        state.last_slot_used = last_slot_used;
    }

    /// Mark the task stopped; returns the rotation position to persist.
    pub(crate) fn end_session(&self) -> u32 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.is_running = false;
        state.last_slot_used
    }

    fn mark_save_started(&self, at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.last_started_at = Some(at);
    }

    /// Publish one completed save as a single atomic metrics update.
    fn publish_completed(&self, slot: u32, at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.saves_this_session += 1;
        state.last_slot_used = slot;
        state.last_finished_at = Some(at);
    }
}

/// Next slot in the rotation: a ring over `[1, max_slots]`. Slot 0 is the
/// "never ran" sentinel and is never produced.
pub(crate) fn next_slot(last_slot_used: u32, max_slots: u32) -> u32 {
    if last_slot_used < max_slots {
        last_slot_used + 1
    } else {
        1
    }
}

/// One autosave execution, run by the periodic task. Errors propagate to the
/// task runner's guard, which logs them and leaves future executions alone.
pub(crate) struct AutoSaveWorker {
    shared: Arc<AutoSaveShared>,
    stores: StoreSet,
    layout: CheckpointLayout,
}

impl AutoSaveWorker {
    pub(crate) fn new(shared: Arc<AutoSaveShared>, stores: StoreSet, layout: CheckpointLayout) -> Self {
        Self {
            shared,
            stores,
            layout,
        }
    }

    pub(crate) fn run_once(&self) -> anyhow::Result<()> {
        let slot = next_slot(self.shared.snapshot().last_slot_used, self.shared.max_slots());
        self.shared.mark_save_started(Utc::now());

        let dir = self.layout.auto_save_slot(slot);
        fs::create_dir_all(&dir)?;
        save_all(&self.stores, &dir)?;

        self.shared.publish_completed(slot, Utc::now());
        tracing::info!("Autosave wrote slot {slot}");
        Ok(())
    }
}
