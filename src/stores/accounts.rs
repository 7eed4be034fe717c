use super::{StateStore, lock_err, read_document, write_document};
use crate::clock::ClockHandle;
use crate::error::StoreError;
use crate::tasks::{self, PeriodicTask};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

const DOCUMENT: &str = "accounts.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_millis: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingRegistration {
    username: String,
    requested_at_millis: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AccountData {
    accounts: BTreeMap<String, Account>,
    pending: BTreeMap<String, PendingRegistration>,
}

/// Registered user accounts plus registrations awaiting confirmation.
///
/// Checkpoint contract: account data is the last thing saved and the first
/// thing restored; the checkpoint manager owns that ordering. Housekeeping
/// expires pending registrations that were never confirmed.
pub struct AccountStore {
    inner: Arc<Mutex<AccountData>>,
    clock: ClockHandle,
    pending_ttl: Duration,
    interval: Duration,
    housekeeping: Mutex<Option<PeriodicTask>>,
}

impl AccountStore {
    pub fn new(clock: ClockHandle, pending_ttl: Duration, interval: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(AccountData::default())),
            clock,
            pending_ttl,
            interval,
            housekeeping: Mutex::new(None),
        }
    }

    /// Queue a registration; returns the confirmation token.
    pub fn enqueue_pending(&self, username: &str) -> Result<String, StoreError> {
        let mut data = self.inner.lock().map_err(lock_err)?;
        let token = Uuid::new_v4().to_string();
        data.pending.insert(
            token.clone(),
            PendingRegistration {
                username: username.to_string(),
                requested_at_millis: self.clock.now_millis(),
            },
        );
        Ok(token)
    }

    /// Confirm a pending registration, creating the account.
    pub fn confirm_pending(&self, token: &str) -> Result<Option<Account>, StoreError> {
        let mut data = self.inner.lock().map_err(lock_err)?;
        let Some(pending) = data.pending.remove(token) else {
            return Ok(None);
        };
        let account = Account {
            id: Uuid::new_v4().to_string(),
            username: pending.username,
            created_at: Utc::now(),
            last_seen_millis: self.clock.now_millis(),
        };
        data.accounts.insert(account.id.clone(), account.clone());
        Ok(Some(account))
    }

    pub fn get(&self, id: &str) -> Result<Option<Account>, StoreError> {
        let data = self.inner.lock().map_err(lock_err)?;
        Ok(data.accounts.get(id).cloned())
    }

    /// Record activity for an account. Returns false for unknown IDs.
    pub fn touch(&self, id: &str) -> Result<bool, StoreError> {
        let mut data = self.inner.lock().map_err(lock_err)?;
        let now = self.clock.now_millis();
        match data.accounts.get_mut(id) {
            Some(account) => {
                account.last_seen_millis = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn account_count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.lock().map_err(lock_err)?.accounts.len())
    }

    pub fn pending_count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.lock().map_err(lock_err)?.pending.len())
    }

    fn prune_pending(data: &mut AccountData, now_millis: i64, ttl: Duration) -> usize {
        let cutoff = now_millis - i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let before = data.pending.len();
        data.pending
            .retain(|_, pending| pending.requested_at_millis > cutoff);
        before - data.pending.len()
    }
}

impl StateStore for AccountStore {
    fn name(&self) -> &'static str {
        "accounts"
    }

    fn save_checkpoint(&self, dir: &Path) -> Result<(), StoreError> {
        let data = self.inner.lock().map_err(lock_err)?;
        write_document(dir, DOCUMENT, &*data)
    }

    fn restore_from_checkpoint(&self, dir: &Path) -> Result<(), StoreError> {
        let loaded: AccountData = read_document(dir, DOCUMENT)?;
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
        let ttl = self.pending_ttl;
        let task = tasks::spawn_periodic("housekeeping-accounts", self.interval, move || {
            let mut data = inner.lock().map_err(lock_err)?;
            let dropped = AccountStore::prune_pending(&mut data, clock.now_millis(), ttl);
            if dropped > 0 {
                tracing::info!("Expired {dropped} stale pending registrations");
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
