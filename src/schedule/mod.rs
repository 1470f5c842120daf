//! Pass scheduling.
//!
//! The scheduler runs one pass immediately and then one pass per interval.
//! The next pass is due one interval after the previous one *started*, or
//! right at its completion if it overran the interval. Passes never overlap
//! and missed ticks are not replayed, so for short passes the gap between a
//! completion and the next start is the interval.
//!
//! ```text
//! start ──► Running ──► Idle ──(until start + interval)──► Running ──► Idle ...
//! ```
//!
//! Completion times are published through a shared [`ScheduleState`] so the
//! status listener (see [`status`]) can report them from another thread.

pub mod status;

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};

use crate::dedup::{DedupEngine, PassSummary};
use crate::store::DocumentStore;

/// How often the inter-pass wait checks for a shutdown request.
const WAIT_SLICE: Duration = Duration::from_millis(250);

/// Shared timing state: last pass completion and the fixed interval.
///
/// Only the scheduler writes the completion timestamp; readers may observe a
/// value that is one pass stale.
#[derive(Debug)]
pub struct ScheduleState {
    /// Milliseconds since the Unix epoch, 0 until the first pass completes.
    last_completion_ms: AtomicI64,
    running: AtomicBool,
    interval: Duration,
}

impl ScheduleState {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            last_completion_ms: AtomicI64::new(0),
            running: AtomicBool::new(false),
            interval,
        }
    }

    /// The configured interval between passes.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Record that a pass completed at `at`.
    pub fn record_completion(&self, at: DateTime<Utc>) {
        // Keep 0 reserved for "never".
        let ms = at.timestamp_millis().max(1);
        self.last_completion_ms.store(ms, Ordering::Release);
    }

    fn set_phase(&self, phase: Phase) {
        self.running
            .store(phase == Phase::Running, Ordering::Release);
        log::trace!("Scheduler {:?}", phase);
    }

    /// Whether a pass is currently in progress.
    #[must_use]
    pub fn phase(&self) -> Phase {
        if self.running.load(Ordering::Acquire) {
            Phase::Running
        } else {
            Phase::Idle
        }
    }

    /// Completion time of the most recent pass, if any.
    #[must_use]
    pub fn last_completion(&self) -> Option<DateTime<Utc>> {
        match self.last_completion_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        }
    }
}

/// Lifecycle state of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the interval to elapse.
    Idle,
    /// A pass is in progress.
    Running,
}

/// Configuration for the scheduler.
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    /// Stop after this many passes. `None` runs until shutdown.
    pub max_passes: Option<usize>,
    /// Optional shutdown flag, checked before each pass and while waiting.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
}

impl SchedulerConfig {
    /// Limit the number of passes.
    #[must_use]
    pub fn with_max_passes(mut self, passes: usize) -> Self {
        self.max_passes = Some(passes);
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Why the scheduler loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The configured number of passes ran.
    PassLimit,
    /// Shutdown was requested.
    Shutdown,
}

/// Outcome of [`Scheduler::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleOutcome {
    /// Number of passes that completed.
    pub passes: usize,
    pub reason: StopReason,
}

/// Drives passes at a fixed interval measured between completions.
#[derive(Debug)]
pub struct Scheduler {
    state: Arc<ScheduleState>,
    config: SchedulerConfig,
}

impl Scheduler {
    #[must_use]
    pub fn new(state: Arc<ScheduleState>, config: SchedulerConfig) -> Self {
        Self { state, config }
    }

    /// Shared timing state, for handing to the status listener.
    #[must_use]
    pub fn state(&self) -> Arc<ScheduleState> {
        Arc::clone(&self.state)
    }

    /// Run deduplication passes with `engine` until stopped.
    pub fn run<S: DocumentStore>(&self, engine: &DedupEngine<S>) -> ScheduleOutcome {
        self.run_with(|pass| {
            log::info!("Pass {} started at {}", pass, Utc::now().to_rfc3339());
            let summary: PassSummary = engine.run_pass();
            if summary.interrupted {
                log::info!("Pass {} stopped early", pass);
            }
        })
    }

    /// Run `pass` on the schedule. The argument is the 1-based pass number.
    pub fn run_with<F: FnMut(usize)>(&self, mut pass: F) -> ScheduleOutcome {
        let mut completed = 0;

        loop {
            if self.config.is_shutdown_requested() {
                return self.stop(completed, StopReason::Shutdown);
            }

            let started = Instant::now();
            self.state.set_phase(Phase::Running);
            pass(completed + 1);
            completed += 1;
            self.state.record_completion(Utc::now());
            self.state.set_phase(Phase::Idle);

            if self.config.max_passes.is_some_and(|max| completed >= max) {
                return self.stop(completed, StopReason::PassLimit);
            }

            // `None` means the deadline is beyond what `Instant` can represent.
            let deadline = started.checked_add(self.state.interval());
            match deadline.map(|d| d.saturating_duration_since(Instant::now())) {
                Some(Duration::ZERO) => {
                    if self.config.is_shutdown_requested() {
                        return self.stop(completed, StopReason::Shutdown);
                    }
                    log::warn!("Pass {} overran the interval, starting the next one now", completed);
                    continue;
                }
                Some(remaining) => log::info!(
                    "Waiting for next rotation in {}",
                    status::format_seconds(i64::try_from(remaining.as_secs()).unwrap_or(i64::MAX))
                ),
                None => log::info!("Next rotation is too far away to schedule, waiting for shutdown"),
            }
            if !self.wait_until(deadline) {
                return self.stop(completed, StopReason::Shutdown);
            }
        }
    }

    /// Sleep until `deadline` (forever if `None`), returning `false` if
    /// shutdown was requested.
    fn wait_until(&self, deadline: Option<Instant>) -> bool {
        loop {
            if self.config.is_shutdown_requested() {
                return false;
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return true;
                    }
                    WAIT_SLICE.min(deadline - now)
                }
                None => WAIT_SLICE,
            };
            thread::sleep(slice);
        }
    }

    fn stop(&self, passes: usize, reason: StopReason) -> ScheduleOutcome {
        log::info!("Scheduler stopped after {} pass(es): {:?}", passes, reason);
        ScheduleOutcome { passes, reason }
    }
}
