use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Handle to a periodically-executed background worker.
///
/// The worker runs its callback once per period inside a failure-isolation
/// guard: an `Err` or a panic in one execution is logged and recorded in the
/// health registry, and never cancels future executions. A periodic task that
/// silently stopped rescheduling after its first failure would defeat the
/// point of having one.
pub struct PeriodicTask {
    name: &'static str,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Spawn a worker that runs `tick` every `period`.
///
/// The first execution happens one full period after the call, not
/// immediately. Executions run to completion on the worker task; there is no
/// mid-execution cancellation.
pub fn spawn_periodic<F>(name: &'static str, period: Duration, mut tick: F) -> PeriodicTask
where
    F: FnMut() -> anyhow::Result<()> + Send + 'static,
{
    let (stop, mut stopped) = watch::channel(false);
    let handle = tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval resolves immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => run_guarded(name, &mut tick),
                _ = stopped.changed() => break,
            }
        }
        tracing::debug!("periodic task {name} stopped");
    });

    PeriodicTask { name, stop, handle }
}

fn run_guarded<F>(name: &str, tick: &mut F)
where
    F: FnMut() -> anyhow::Result<()>,
{
    match std::panic::catch_unwind(AssertUnwindSafe(|| tick())) {
        Ok(Ok(())) => crate::diagnostics::health::mark_component_ok(name),
        Ok(Err(e)) => {
            crate::diagnostics::health::mark_component_error(name, format!("{e:#}"));
            tracing::warn!("Periodic task {name} failed, skipping cycle: {e:#}");
        }
        Err(_) => {
            crate::diagnostics::health::mark_component_error(name, "panicked");
            tracing::error!("Periodic task {name} panicked, skipping cycle");
        }
    }
}

impl PeriodicTask {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the worker to stop after any in-flight execution, without
    /// waiting for it. Used by store housekeeping, where a maintenance cycle
    /// may finish in the background.
    pub fn request_stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Stop the worker and wait until it has fully exited. Resolves only
    /// after any in-flight execution has run to completion; nothing executes
    /// after this returns.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.handle.await;
    }
}
