//! Background synchronization between the local and durable stores.
//!
//! One worker thread per running synchronizer: it sleeps through a startup
//! grace period so the interactive session feels instant, then pushes
//! unsynced records on a fixed interval. Failed cycles are logged, never
//! raised, and widen the interval with bounded exponential backoff. A
//! single-flight guard keeps [`Synchronizer::force_sync`] and the
//! scheduled cycle from running concurrently.

use crate::models::{Fact, RecordId};
use crate::storage::{DurableStore, LocalStore};
use crate::{Error, Result};
use serde::Serialize;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Default startup grace period before the first sync.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(60);

/// Default interval between sync cycles.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// Default ceiling for the failure backoff interval.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(3_600);

/// Default bound on how long `stop` waits for the worker.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Synchronizer lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncState {
    /// No worker running.
    Stopped,
    /// Worker sleeping through the startup grace period.
    WaitingInitialDelay,
    /// Worker pushing unsynced records.
    Syncing,
    /// Worker sleeping until the next cycle.
    WaitingInterval,
}

impl SyncState {
    /// Returns the state as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::WaitingInitialDelay => "waiting-initial-delay",
            Self::Syncing => "syncing",
            Self::WaitingInterval => "waiting-interval",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one sync cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Records read from the unsynced backlog.
    pub pushed: usize,
    /// Rows the durable store accepted.
    pub accepted: usize,
    /// Local records flipped to synced.
    pub marked: usize,
}

/// Counters accumulated across sync cycles.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    /// Cycles that completed, including empty ones.
    pub cycles_completed: u64,
    /// Cycles that failed.
    pub cycles_failed: u64,
    /// Total rows accepted by the durable store.
    pub records_synced: u64,
    /// Failures since the last successful cycle.
    pub consecutive_failures: u32,
    /// Most recent cycle error, cleared on success.
    pub last_error: Option<String>,
}

/// Bounded exponential backoff over the sync interval.
///
/// Each consecutive failure doubles the wait, capped at the configured
/// ceiling; a successful cycle resets it to the base interval.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    /// Creates a backoff starting at `base` and capped at `max`.
    #[must_use]
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: 0,
        }
    }

    /// Resets to the base interval.
    pub const fn reset(&mut self) {
        self.failures = 0;
    }

    /// Records a failure, widening the next wait.
    pub const fn escalate(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    /// Returns the current wait.
    #[must_use]
    pub fn current(&self) -> Duration {
        let multiplier = 2_u32.saturating_pow(self.failures.min(16));
        self.base
            .checked_mul(multiplier)
            .map_or(self.max, |d| d.min(self.max))
    }

    /// Returns the consecutive failure count.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }
}

struct WorkerHandle {
    stop_tx: mpsc::Sender<()>,
    done_rx: Receiver<()>,
    handle: JoinHandle<()>,
}

struct SyncInner {
    local: Arc<LocalStore>,
    durable: Arc<dyn DurableStore>,
    cycle_guard: Mutex<()>,
    state: Mutex<SyncState>,
    stats: Mutex<SyncStats>,
}

/// Background worker reconciling the local store with the durable store.
pub struct Synchronizer {
    inner: Arc<SyncInner>,
    worker: Mutex<Option<WorkerHandle>>,
    initial_delay: Duration,
    interval: Duration,
    max_backoff: Duration,
    stop_timeout: Duration,
}

impl Synchronizer {
    /// Creates a synchronizer with default timing.
    #[must_use]
    pub fn new(local: Arc<LocalStore>, durable: Arc<dyn DurableStore>) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                local,
                durable,
                cycle_guard: Mutex::new(()),
                state: Mutex::new(SyncState::Stopped),
                stats: Mutex::new(SyncStats::default()),
            }),
            worker: Mutex::new(None),
            initial_delay: DEFAULT_INITIAL_DELAY,
            interval: DEFAULT_INTERVAL,
            max_backoff: DEFAULT_MAX_BACKOFF,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// Sets the startup grace period before the first cycle.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the interval between cycles.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the ceiling for the failure backoff.
    #[must_use]
    pub const fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Sets how long `stop` waits before detaching the worker.
    #[must_use]
    pub const fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    /// Starts the background worker.
    ///
    /// A second call while the worker is running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            tracing::debug!("synchronizer already running");
            return Ok(());
        }

        let (stop_tx, stop_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::sync_channel(1);
        let inner = Arc::clone(&self.inner);
        let initial_delay = self.initial_delay;
        let interval = self.interval;
        let max_backoff = self.max_backoff;

        let handle = std::thread::Builder::new()
            .name("synapt-sync".to_string())
            .spawn(move || {
                inner.run(initial_delay, interval, max_backoff, &stop_rx);
                let _ = done_tx.send(());
            })
            .map_err(|e| Error::OperationFailed {
                operation: "spawn_sync_worker".to_string(),
                cause: e.to_string(),
            })?;

        *worker = Some(WorkerHandle {
            stop_tx,
            done_rx,
            handle,
        });
        tracing::info!(
            initial_delay_secs = initial_delay.as_secs(),
            interval_secs = interval.as_secs(),
            "synchronizer started"
        );
        Ok(())
    }

    /// Stops the background worker, waiting up to the stop timeout.
    ///
    /// Returns false when the worker had to be detached instead of joined.
    /// Stopping an already-stopped synchronizer is a no-op.
    pub fn stop(&self) -> bool {
        let Some(worker) = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return true;
        };

        // Worker may have observed a disconnect already; a send failure
        // just means the interruption is moot.
        let _ = worker.stop_tx.send(());

        match worker.done_rx.recv_timeout(self.stop_timeout) {
            // Disconnected means the worker is already gone (it unwound
            // without signaling), so joining it cannot block.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    tracing::warn!("sync worker panicked before stopping");
                }
                tracing::info!("synchronizer stopped");
                true
            },
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout_ms = self.stop_timeout.as_millis() as u64,
                    "sync worker did not stop in time; detaching"
                );
                false
            },
        }
    }

    /// Returns true while a worker is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SyncState {
        *self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a snapshot of the accumulated counters.
    #[must_use]
    pub fn stats(&self) -> SyncStats {
        self.inner
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs one cycle synchronously, outside the timer loop.
    ///
    /// Shares the single-flight guard with the scheduled cycle, so the two
    /// can never overlap. Returns the number of rows the durable store
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the cycle fails; unlike the scheduled path, the
    /// failure is surfaced to the caller as well as recorded.
    pub fn force_sync(&self) -> Result<usize> {
        let result = self.inner.sync_cycle();
        self.inner.record_cycle(&result);
        result.map(|outcome| outcome.accepted)
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl SyncInner {
    fn run(
        &self,
        initial_delay: Duration,
        interval: Duration,
        max_backoff: Duration,
        stop_rx: &Receiver<()>,
    ) {
        self.set_state(SyncState::WaitingInitialDelay);
        if wait_interruptible(stop_rx, initial_delay) {
            self.set_state(SyncState::Stopped);
            return;
        }

        let mut backoff = Backoff::new(interval, max_backoff);
        loop {
            self.set_state(SyncState::Syncing);
            let result = self.sync_cycle();
            self.record_cycle(&result);
            match result {
                Ok(outcome) => {
                    backoff.reset();
                    if outcome.pushed > 0 {
                        tracing::debug!(
                            pushed = outcome.pushed,
                            accepted = outcome.accepted,
                            "sync cycle completed"
                        );
                    }
                },
                Err(e) => {
                    backoff.escalate();
                    tracing::warn!(
                        error = %e,
                        failures = backoff.failures(),
                        next_attempt_secs = backoff.current().as_secs(),
                        "sync cycle failed; will retry"
                    );
                },
            }

            self.set_state(SyncState::WaitingInterval);
            if wait_interruptible(stop_rx, backoff.current()) {
                break;
            }
        }
        self.set_state(SyncState::Stopped);
    }

    /// Pushes unsynced records and marks exactly the accepted rows.
    #[instrument(skip(self), fields(operation = "sync_cycle"))]
    fn sync_cycle(&self) -> Result<SyncOutcome> {
        let _flight = self
            .cycle_guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let start = Instant::now();

        let result = (|| {
            let records = self.local.get_unsynced()?;
            if records.is_empty() {
                return Ok(SyncOutcome::default());
            }

            let facts: Vec<Fact> = records.iter().map(Fact::from_record).collect();
            let accepted = self.durable.append_facts(&facts)?;

            let accepted_ids: Vec<RecordId> = accepted
                .iter()
                .filter_map(|&index| records.get(index))
                .map(|record| record.id.clone())
                .collect();
            let marked = self.local.mark_synced(&accepted_ids)?;

            Ok(SyncOutcome {
                pushed: records.len(),
                accepted: accepted_ids.len(),
                marked,
            })
        })();

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!("sync_cycles_total", "status" => status).increment(1);
        metrics::histogram!("sync_cycle_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        if let Ok(outcome) = &result {
            metrics::counter!("sync_records_synced_total").increment(outcome.accepted as u64);
        }

        result
    }

    fn record_cycle(&self, result: &Result<SyncOutcome>) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        match result {
            Ok(outcome) => {
                stats.cycles_completed += 1;
                stats.records_synced += outcome.accepted as u64;
                stats.consecutive_failures = 0;
                stats.last_error = None;
            },
            Err(e) => {
                stats.cycles_failed += 1;
                stats.consecutive_failures = stats.consecutive_failures.saturating_add(1);
                stats.last_error = Some(e.to_string());
            },
        }
    }

    fn set_state(&self, state: SyncState) {
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != state {
            tracing::trace!(from = current.as_str(), to = state.as_str(), "sync state change");
            *current = state;
        }
    }
}

/// Sleeps for `duration`, returning early with true when a stop is
/// signaled (or the synchronizer was dropped).
fn wait_interruptible(stop_rx: &Receiver<()>, duration: Duration) -> bool {
    match stop_rx.recv_timeout(duration) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        Err(RecvTimeoutError::Timeout) => false,
    }
}
