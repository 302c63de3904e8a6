//! Periodic refresh and health-check scheduling.
//!
//! The scheduler owns two independent fixed-rate workers: one runs refresh
//! cycles over its targets, the other checks the cache entry count. Both are
//! tokio tasks tied to a cancellation token; `stop` waits for them within a
//! grace window and aborts stragglers. A stopped scheduler is terminal and
//! must be recreated, never restarted.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::ClientShared;
use crate::config::ConfigError;

/// How long `stop` waits for workers before aborting them.
pub(crate) const STOP_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle of a scheduler instance. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Drives periodic refresh and health-check cycles for a set of
/// application/profile pairs.
pub(crate) struct RefreshScheduler {
    shared: Arc<ClientShared>,
    targets: Arc<Vec<(String, String)>>,
    state: Mutex<SchedulerState>,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl RefreshScheduler {
    /// Creates an idle scheduler over the given targets.
    pub(crate) fn new(shared: Arc<ClientShared>, targets: Vec<(String, String)>) -> Self {
        Self {
            shared,
            targets: Arc::new(targets),
            state: Mutex::new(SchedulerState::Idle),
            cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Starts the workers after running one refresh cycle to completion, so
    /// the client has data before this returns.
    ///
    /// Starting twice is a no-op; starting after `stop` is an error because
    /// the state machine is terminal.
    pub(crate) async fn start(
        &self,
        refresh_interval: Duration,
        health_check_interval: Duration,
    ) -> Result<(), ConfigError> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match *state {
                SchedulerState::Stopped => return Err(ConfigError::SchedulerStopped),
                SchedulerState::Running => {
                    debug!("config-client scheduler already running");
                    return Ok(());
                }
                SchedulerState::Idle => *state = SchedulerState::Running,
            }
        }

        info!(
            refresh_interval_ms = refresh_interval.as_millis() as u64,
            health_check_interval_ms = health_check_interval.as_millis() as u64,
            "config-client scheduler starting"
        );
        run_refresh_cycle(&self.shared, &self.targets).await;

        let shared = Arc::clone(&self.shared);
        let targets = Arc::clone(&self.targets);
        let cancel = self.cancel.clone();
        let refresh_worker = tokio::spawn(async move {
            // First tick lands one interval after the immediate cycle above.
            let mut ticker = interval_at(Instant::now() + refresh_interval, refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("config-client refresh worker shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        run_refresh_cycle(&shared, &targets).await;
                    }
                }
            }
        });

        let shared = Arc::clone(&self.shared);
        let expected = self.targets.len();
        let cancel = self.cancel.clone();
        let health_worker = tokio::spawn(async move {
            let mut ticker = interval_at(
                Instant::now() + health_check_interval,
                health_check_interval,
            );
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("config-client health worker shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        run_health_check(&shared, expected);
                    }
                }
            }
        });

        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        workers.push(refresh_worker);
        workers.push(health_worker);
        Ok(())
    }

    /// Stops both workers, waiting out in-flight cycles up to the grace
    /// window and aborting on expiry. Idempotent; the scheduler is terminal
    /// afterwards.
    pub(crate) async fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == SchedulerState::Stopped {
                debug!("config-client scheduler already stopped");
                return;
            }
            *state = SchedulerState::Stopped;
        }

        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            workers.drain(..).collect()
        };
        for mut handle in handles {
            if timeout(STOP_GRACE, &mut handle).await.is_err() {
                warn!("config-client worker did not quiesce within grace period; aborting");
                handle.abort();
            }
        }
        debug!("config-client scheduler stopped");
    }

    /// Whether the scheduler currently has workers armed.
    pub(crate) fn is_running(&self) -> bool {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) == SchedulerState::Running
    }
}

impl Drop for RefreshScheduler {
    /// Last-resort cleanup: cancel and abort workers so a dropped scheduler
    /// never leaves tasks running, whatever the exit path was.
    fn drop(&mut self) {
        self.cancel.cancel();
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        for handle in workers.drain(..) {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for RefreshScheduler {
    /// Prints the target list and state without leaking worker handles.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("targets", &self.targets)
            .field(
                "state",
                &*self.state.lock().unwrap_or_else(PoisonError::into_inner),
            )
            .finish()
    }
}

/// Runs one refresh cycle over every target pair.
///
/// Each pair is refreshed independently; one pair exhausting its retries is
/// logged and never aborts the remaining pairs.
async fn run_refresh_cycle(shared: &ClientShared, targets: &[(String, String)]) {
    debug!("config-client starting refresh cycle");
    let mut succeeded = 0usize;
    let mut changed = 0usize;
    for (application, profile) in targets {
        match shared.refresh_target(application, profile).await {
            Ok(outcome) => {
                succeeded += 1;
                if outcome.change.has_changed() {
                    changed += 1;
                }
            }
            Err(err) => {
                error!(application, profile, %err, "config-client scheduled refresh failed");
            }
        }
    }
    info!(
        succeeded,
        total = targets.len(),
        changed,
        "config-client refresh cycle completed"
    );
}

/// Compares the cache entry count against the expected target count.
///
/// Logs a degraded signal when entries are missing; never errors, never
/// mutates the cache.
fn run_health_check(shared: &ClientShared, expected: usize) {
    let cached = shared.store.len();
    if cached < expected {
        warn!(
            cached,
            expected, "config-client health check found missing configurations"
        );
    } else {
        debug!(cached, "config-client health check passed");
    }
}
