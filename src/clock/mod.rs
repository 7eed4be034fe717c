use crate::tasks::{self, PeriodicTask};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Process-wide coarse timestamp service.
///
/// One background task refreshes an atomic epoch-millis cell on a fixed
/// period; readers hold a [`ClockHandle`] and pay one atomic load instead of
/// a system time call. Resolution is the refresh period, which is fine for
/// metrics and expiry checks and wrong for anything that needs ordering
/// within a period.
pub struct CoarseClock {
    handle: ClockHandle,
    task: PeriodicTask,
}

impl CoarseClock {
    /// Start the refresh task. The cell is seeded with the current time
    /// before the first refresh fires.
    pub fn start(refresh: Duration) -> Self {
        let handle = ClockHandle::new(Utc::now().timestamp_millis());
        let writer = handle.clone();
        let task = tasks::spawn_periodic("clock", refresh, move || {
            writer.set_millis(Utc::now().timestamp_millis());
            Ok(())
        });
        Self { handle, task }
    }

    /// Cheap cloneable reader for the current coarse time.
    pub fn handle(&self) -> ClockHandle {
        self.handle.clone()
    }

    /// Stop the refresh task. Existing handles keep working but the value
    /// no longer advances.
    pub async fn shutdown(self) {
        self.task.shutdown().await;
    }
}

/// Reader for the coarse clock. Clones share the same cell.
#[derive(Debug, Clone)]
pub struct ClockHandle {
    cell: Arc<AtomicI64>,
}

impl ClockHandle {
    fn new(millis: i64) -> Self {
        Self {
            cell: Arc::new(AtomicI64::new(millis)),
        }
    }

    /// A handle that never advances on its own. Tests drive it with
    /// [`ClockHandle::set_millis`].
    pub fn fixed(millis: i64) -> Self {
        Self::new(millis)
    }

    pub fn now_millis(&self) -> i64 {
        self.cell.load(Ordering::Relaxed)
    }

    pub fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_millis()).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn set_millis(&self, millis: i64) {
        self.cell.store(millis, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn coarse_clock_advances_between_refreshes() {
        let clock = CoarseClock::start(Duration::from_millis(10));
        let handle = clock.handle();
        let first = handle.now_millis();

        tokio::time::sleep(Duration::from_millis(60)).await;
        let second = handle.now_millis();
        clock.shutdown().await;

        assert!(second > first, "clock did not advance: {first} -> {second}");
    }

    #[test]
    fn shutdown_freezes_the_value() {
        tokio_test::block_on(async {
            let clock = CoarseClock::start(Duration::from_millis(10));
            let handle = clock.handle();
            clock.shutdown().await;

            let frozen = handle.now_millis();
            tokio::time::sleep(Duration::from_millis(40)).await;
            assert_eq!(handle.now_millis(), frozen);
        });
    }

    #[test]
    fn fixed_handle_is_driven_manually() {
        let handle = ClockHandle::fixed(1_000);
        assert_eq!(handle.now_millis(), 1_000);

        handle.set_millis(5_000);
        assert_eq!(handle.now_millis(), 5_000);
        assert_eq!(handle.now().timestamp_millis(), 5_000);
    }

    #[test]
    fn clones_share_the_same_cell() {
        let handle = ClockHandle::fixed(42);
        let other = handle.clone();
        handle.set_millis(99);
        assert_eq!(other.now_millis(), 99);
    }
}
