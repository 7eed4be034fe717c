use super::{StateStore, lock_err, read_document, write_document};
use crate::clock::ClockHandle;
use crate::error::StoreError;
use crate::tasks::{self, PeriodicTask};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

const DOCUMENT: &str = "feedback.json";

/// One feedback submission. `account_id` references the account store; the
/// checkpoint save order guarantees the referenced account was not yet
/// committed when this entry was, and the restore order guarantees it is
/// back before this entry is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub id: String,
    pub account_id: String,
    pub body: String,
    pub submitted_at_millis: i64,
    pub resolved_at_millis: Option<i64>,
}

impl FeedbackEntry {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at_millis.is_some()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FeedbackData {
    entries: BTreeMap<String, FeedbackEntry>,
}

/// Feedback submissions. Housekeeping prunes resolved entries past the
/// retention window; open entries are kept indefinitely.
pub struct FeedbackStore {
    inner: Arc<Mutex<FeedbackData>>,
    clock: ClockHandle,
    retention: Duration,
    interval: Duration,
    housekeeping: Mutex<Option<PeriodicTask>>,
}

impl FeedbackStore {
    pub fn new(clock: ClockHandle, retention: Duration, interval: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FeedbackData::default())),
            clock,
            retention,
            interval,
            housekeeping: Mutex::new(None),
        }
    }

    pub fn submit(&self, account_id: &str, body: &str) -> Result<FeedbackEntry, StoreError> {
        let mut data = self.inner.lock().map_err(lock_err)?;
        let entry = FeedbackEntry {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            body: body.to_string(),
            submitted_at_millis: self.clock.now_millis(),
            resolved_at_millis: None,
        };
        data.entries.insert(entry.id.clone(), entry.clone());
        Ok(entry)
    }

    /// Mark an entry resolved. Returns false for unknown IDs.
    pub fn resolve(&self, id: &str) -> Result<bool, StoreError> {
        let mut data = self.inner.lock().map_err(lock_err)?;
        let now = self.clock.now_millis();
        match data.entries.get_mut(id) {
            Some(entry) => {
                entry.resolved_at_millis.get_or_insert(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn get(&self, id: &str) -> Result<Option<FeedbackEntry>, StoreError> {
        let data = self.inner.lock().map_err(lock_err)?;
        Ok(data.entries.get(id).cloned())
    }

    pub fn entry_count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.lock().map_err(lock_err)?.entries.len())
    }

    pub fn open_count(&self) -> Result<usize, StoreError> {
        let data = self.inner.lock().map_err(lock_err)?;
        Ok(data.entries.values().filter(|e| !e.is_resolved()).count())
    }

    fn prune_resolved(data: &mut FeedbackData, now_millis: i64, retention: Duration) -> usize {
        let cutoff = now_millis - i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);
        let before = data.entries.len();
        data.entries
            .retain(|_, entry| entry.resolved_at_millis.is_none_or(|at| at > cutoff));
        before - data.entries.len()
    }
}

impl StateStore for FeedbackStore {
    fn name(&self) -> &'static str {
        "feedback"
    }

    fn save_checkpoint(&self, dir: &Path) -> Result<(), StoreError> {
        let data = self.inner.lock().map_err(lock_err)?;
        write_document(dir, DOCUMENT, &*data)
    }

    fn restore_from_checkpoint(&self, dir: &Path) -> Result<(), StoreError> {
        let loaded: FeedbackData = read_document(dir, DOCUMENT)?;
        let mut data = self.inner.lock().map_err(lock_err)?;
        *data = loaded;
        Ok(())
    }

    fn start_housekeeping(&self) -> Result<(), StoreError> {
        let mut slot = self.housekeeping.lock().map_err(lock_err)?;
        if slot.is_some() {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        let clock = self.clock.clone();
        let retention = self.retention;
        let task = tasks::spawn_periodic("housekeeping-feedback", self.interval, move || {
            let mut data = inner.lock().map_err(lock_err)?;
            let dropped =
                FeedbackStore::prune_resolved(&mut data, clock.now_millis(), retention);
            if dropped > 0 {
                tracing::info!("Pruned {dropped} resolved feedback entries past retention");
            }
            Ok(())
        });
        *slot = Some(task);
        Ok(())
    }

    fn shutdown_housekeeping(&self) -> Result<(), StoreError> {
        let mut slot = self.housekeeping.lock().map_err(lock_err)?;
        if let Some(task) = slot.take() {
            task.request_stop();
        }
        Ok(())
    }
}
