#![allow(dead_code)]

use coffer::error::StoreError;
use coffer::stores::{StateStore, StoreSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Test double that records every save/restore call with the directory it
/// was pointed at, and can be armed to fail or stall a save.
pub struct RecordingStore {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    pub fail_next_save: AtomicBool,
    pub save_delay: Mutex<Option<Duration>>,
    pub saves_completed: AtomicU64,
}

impl RecordingStore {
    pub fn new(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            log,
            fail_next_save: AtomicBool::new(false),
            save_delay: Mutex::new(None),
            saves_completed: AtomicU64::new(0),
        })
    }
}

fn dir_label(dir: &Path) -> String {
    dir.file_name()
        .map_or_else(|| dir.display().to_string(), |n| n.to_string_lossy().into_owned())
}

impl StateStore for RecordingStore {
    fn name(&self) -> &'static str {
        self.name
    }

    fn save_checkpoint(&self, dir: &Path) -> Result<(), StoreError> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Housekeeping("armed save failure".into()));
        }
        if let Some(delay) = *self.save_delay.lock().unwrap() {
            std::thread::sleep(delay);
        }
        self.log
            .lock()
            .unwrap()
            .push(format!("save:{}:{}", self.name, dir_label(dir)));
        self.saves_completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn restore_from_checkpoint(&self, dir: &Path) -> Result<(), StoreError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("restore:{}:{}", self.name, dir_label(dir)));
        Ok(())
    }

    fn start_housekeeping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn shutdown_housekeeping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// The three collaborator doubles wired in contract order, sharing one call
/// log.
pub struct Doubles {
    pub set: StoreSet,
    pub log: Arc<Mutex<Vec<String>>>,
    pub account: Arc<RecordingStore>,
    pub feedback: Arc<RecordingStore>,
    pub network: Arc<RecordingStore>,
}

pub fn doubles() -> Doubles {
    let log = Arc::new(Mutex::new(Vec::new()));
    let account = RecordingStore::new("account", Arc::clone(&log));
    let feedback = RecordingStore::new("feedback", Arc::clone(&log));
    let network = RecordingStore::new("network", Arc::clone(&log));
    let set = StoreSet::new(
        Arc::clone(&account) as Arc<dyn StateStore>,
        Arc::clone(&feedback) as Arc<dyn StateStore>,
        Arc::clone(&network) as Arc<dyn StateStore>,
    );
    Doubles {
        set,
        log,
        account,
        feedback,
        network,
    }
}

impl Doubles {
    pub fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.lock().unwrap())
    }
}
