use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use super::ConsolidationCycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Stopped,
}

/// Runs a consolidation cycle every `interval` on a dedicated task.
///
/// Starts on construction. `stop` lets an in-flight cycle finish the group it
/// is working on, then joins the task. Ticks that fire while a cycle is still
/// running are skipped.
pub struct ConsolidationScheduler {
    stopped: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ConsolidationScheduler {
    /// Must be called from within a tokio runtime.
    pub fn start(cycle: Arc<ConsolidationCycle>, interval: Duration) -> Self {
        let stopped = Arc::new(AtomicBool::new(false));
        let shutdown_notify = Arc::new(Notify::new());

        let worker_stopped = stopped.clone();
        let worker_shutdown = shutdown_notify.clone();
        let worker_handle = tokio::spawn(async move {
            Self::worker_loop(cycle, interval, worker_shutdown, worker_stopped).await;
        });

        info!(interval_secs = interval.as_secs(), "consolidation scheduler started");
        Self {
            stopped,
            shutdown_notify,
            worker_handle: Mutex::new(Some(worker_handle)),
        }
    }

    async fn worker_loop(
        cycle: Arc<ConsolidationCycle>,
        interval: Duration,
        shutdown_notify: Arc<Notify>,
        stopped: Arc<AtomicBool>,
    ) {
        // first cycle one full interval after start
        let mut timer = interval_at(Instant::now() + interval, interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_notify.notified() => break,
                _ = timer.tick() => {
                    if stopped.load(Ordering::SeqCst) {
                        break;
                    }
                    let report = cycle.run_until(&stopped).await;
                    debug!(?report, "scheduled cycle complete");
                }
            }
        }
        debug!("consolidation scheduler exited");
    }

    pub fn state(&self) -> SchedulerState {
        if self.stopped.load(Ordering::SeqCst) {
            SchedulerState::Stopped
        } else {
            SchedulerState::Running
        }
    }

    /// Idempotent; returns once the worker task has exited.
    pub async fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.shutdown_notify.notify_one();
            info!("consolidation scheduler stopping");
        }
        if let Some(handle) = self.worker_handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "consolidation scheduler task ended abnormally");
            }
        }
    }
}

impl Drop for ConsolidationScheduler {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_one();
    }
}
