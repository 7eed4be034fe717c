use super::{ListenerStatus, StateStore, lock_err, read_document, write_document};
use crate::clock::ClockHandle;
use crate::error::StoreError;
use crate::tasks::{self, PeriodicTask};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

const DOCUMENT: &str = "sessions.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetSession {
    pub id: String,
    /// Set once the connection authenticates; references the account store.
    pub account_id: Option<String>,
    pub remote_addr: String,
    pub connected_at_millis: i64,
    pub last_active_millis: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionData {
    sessions: BTreeMap<String, NetSession>,
}

/// Live network/session state.
///
/// The accepting flag is runtime-only and never checkpointed: whether the
/// listener is up is a property of the process, not of the saved state. The
/// operations gate reads it through [`ListenerStatus`] before permitting any
/// checkpoint load. Housekeeping expires sessions idle past the configured
/// window, judged against the coarse clock.
pub struct SessionStore {
    inner: Arc<Mutex<SessionData>>,
    accepting: AtomicBool,
    clock: ClockHandle,
    idle_timeout: Duration,
    interval: Duration,
    housekeeping: Mutex<Option<PeriodicTask>>,
}

impl SessionStore {
    pub fn new(clock: ClockHandle, idle_timeout: Duration, interval: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionData::default())),
            accepting: AtomicBool::new(false),
            clock,
            idle_timeout,
            interval,
            housekeeping: Mutex::new(None),
        }
    }

    pub fn open_session(&self, remote_addr: &str) -> Result<NetSession, StoreError> {
        let mut data = self.inner.lock().map_err(lock_err)?;
        let now = self.clock.now_millis();
        let session = NetSession {
            id: Uuid::new_v4().to_string(),
            account_id: None,
            remote_addr: remote_addr.to_string(),
            connected_at_millis: now,
            last_active_millis: now,
        };
        data.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    /// Attach an authenticated account to a session. Returns false for
    /// unknown session IDs.
    pub fn bind_account(&self, session_id: &str, account_id: &str) -> Result<bool, StoreError> {
        let mut data = self.inner.lock().map_err(lock_err)?;
        match data.sessions.get_mut(session_id) {
            Some(session) => {
                session.account_id = Some(account_id.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn touch(&self, session_id: &str) -> Result<bool, StoreError> {
        let mut data = self.inner.lock().map_err(lock_err)?;
        let now = self.clock.now_millis();
        match data.sessions.get_mut(session_id) {
            Some(session) => {
                session.last_active_millis = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn close_session(&self, session_id: &str) -> Result<bool, StoreError> {
        let mut data = self.inner.lock().map_err(lock_err)?;
        Ok(data.sessions.remove(session_id).is_some())
    }

    pub fn get(&self, session_id: &str) -> Result<Option<NetSession>, StoreError> {
        let data = self.inner.lock().map_err(lock_err)?;
        Ok(data.sessions.get(session_id).cloned())
    }

    pub fn session_count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.lock().map_err(lock_err)?.sessions.len())
    }

    /// Flip the listener state. Called by the connection layer when it binds
    /// or drains; the gate refuses checkpoint loads while this is set.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    fn expire_idle(data: &mut SessionData, now_millis: i64, idle: Duration) -> usize {
        let cutoff = now_millis - i64::try_from(idle.as_millis()).unwrap_or(i64::MAX);
        let before = data.sessions.len();
        data.sessions
            .retain(|_, session| session.last_active_millis > cutoff);
        before - data.sessions.len()
    }
}

impl ListenerStatus for SessionStore {
    fn is_accepting_connections(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }
}

impl StateStore for SessionStore {
    fn name(&self) -> &'static str {
        "sessions"
    }

    fn save_checkpoint(&self, dir: &Path) -> Result<(), StoreError> {
        let data = self.inner.lock().map_err(lock_err)?;
        write_document(dir, DOCUMENT, &*data)
    }

    fn restore_from_checkpoint(&self, dir: &Path) -> Result<(), StoreError> {
        let loaded: SessionData = read_document(dir, DOCUMENT)?;
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
        let idle = self.idle_timeout;
        let task = tasks::spawn_periodic("housekeeping-sessions", self.interval, move || {
            let mut data = inner.lock().map_err(lock_err)?;
            let dropped = SessionStore::expire_idle(&mut data, clock.now_millis(), idle);
            if dropped > 0 {
                tracing::info!("Expired {dropped} idle sessions");
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> SessionStore {
        SessionStore::new(
            ClockHandle::fixed(1_000),
            Duration::from_secs(120),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn open_bind_touch_close() {
        let clock = ClockHandle::fixed(1_000);
        let sessions = SessionStore::new(
            clock.clone(),
            Duration::from_secs(120),
            Duration::from_secs(60),
        );

        let session = sessions.open_session("203.0.113.9:4242").unwrap();
        assert!(sessions.bind_account(&session.id, "acct-1").unwrap());

        clock.set_millis(9_000);
        assert!(sessions.touch(&session.id).unwrap());
        let current = sessions.get(&session.id).unwrap().unwrap();
        assert_eq!(current.account_id.as_deref(), Some("acct-1"));
        assert_eq!(current.last_active_millis, 9_000);

        assert!(sessions.close_session(&session.id).unwrap());
        assert!(!sessions.close_session(&session.id).unwrap());
    }

    #[test]
    fn accepting_flag_starts_down_and_flips() {
        let sessions = store();
        assert!(!sessions.is_accepting_connections());
        sessions.set_accepting(true);
        assert!(sessions.is_accepting_connections());
        sessions.set_accepting(false);
        assert!(!sessions.is_accepting_connections());
    }

    #[test]
    fn expire_idle_drops_only_stale_sessions() {
        let clock = ClockHandle::fixed(0);
        let sessions = SessionStore::new(
            clock.clone(),
            Duration::from_secs(10),
            Duration::from_secs(60),
        );
        let stale = sessions.open_session("203.0.113.1:1").unwrap();
        clock.set_millis(8_000);
        let fresh = sessions.open_session("203.0.113.2:2").unwrap();

        let mut data = sessions.inner.lock().unwrap();
        let dropped = SessionStore::expire_idle(&mut data, 12_000, Duration::from_secs(10));
        assert_eq!(dropped, 1);
        assert!(!data.sessions.contains_key(&stale.id));
        assert!(data.sessions.contains_key(&fresh.id));
    }

    #[test]
    fn save_and_restore_round_trip_without_the_accepting_flag() {
        let tmp = TempDir::new().unwrap();
        let sessions = store();
        let session = sessions.open_session("203.0.113.9:4242").unwrap();
        sessions.set_accepting(true);
        sessions.save_checkpoint(tmp.path()).unwrap();

        let restored = store();
        restored.restore_from_checkpoint(tmp.path()).unwrap();
        assert!(restored.get(&session.id).unwrap().is_some());
        // Runtime listener state never rides along with a checkpoint.
        assert!(!restored.is_accepting_connections());
    }

    #[test]
    fn restore_from_directory_without_document_is_empty() {
        let tmp = TempDir::new().unwrap();
        let sessions = store();
        sessions.open_session("203.0.113.9:4242").unwrap();
        sessions.restore_from_checkpoint(tmp.path()).unwrap();
        assert_eq!(sessions.session_count().unwrap(), 0);
    }
}
