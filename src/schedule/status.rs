//! Scan timing reports.
//!
//! On request the reporter reads the shared [`ScheduleState`] and logs how long
//! ago the last pass completed and how long until the next one is due. It
//! never writes the state and never touches the database, so it is safe to
//! call from any thread at any time.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};

use super::{Phase, ScheduleState};

/// External request understood by the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Report scan timing.
    Report,
    /// Accepted but currently does nothing.
    Reserved,
}

/// Snapshot of scan timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// When the last pass completed, `None` before the first one.
    pub last_completion: Option<DateTime<Utc>>,
    /// Time since the last completion.
    pub elapsed: Option<TimeDelta>,
    /// Interval minus elapsed; negative once the next pass is overdue.
    pub remaining: Option<TimeDelta>,
    /// Whether a pass was running when the report was taken.
    pub phase: Phase,
}

impl StatusReport {
    /// Compute the report for `state` as seen at `now`.
    #[must_use]
    pub fn at(state: &ScheduleState, now: DateTime<Utc>) -> Self {
        let last_completion = state.last_completion();
        let elapsed = last_completion.map(|last| now.signed_duration_since(last));
        let interval = TimeDelta::from_std(state.interval()).ok();
        let remaining = elapsed
            .zip(interval)
            .and_then(|(elapsed, interval)| interval.checked_sub(&elapsed));

        Self {
            last_completion,
            elapsed,
            remaining,
            phase: state.phase(),
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (Some(last), Some(elapsed)) = (self.last_completion, self.elapsed) else {
            return write!(f, "No pass completed yet | Phase: {:?}", self.phase);
        };

        write!(
            f,
            "Last rotation: {} | Time since last rotation: {} | Estimated time till next rotation: {}",
            last.to_rfc3339(),
            format_delta(elapsed),
            self.remaining.map_or_else(|| "unknown".to_string(), format_delta)
        )?;
        if self.phase == Phase::Running {
            write!(f, " | Pass in progress")?;
        }
        Ok(())
    }
}

/// Format a signed duration as `1h2m3s`, `4m0s`, `59s` or `-12s`.
#[must_use]
pub fn format_delta(delta: TimeDelta) -> String {
    format_seconds(delta.num_seconds())
}

/// Format a signed number of seconds as `1h2m3s`, `4m0s`, `59s` or `-12s`.
#[must_use]
pub fn format_seconds(seconds: i64) -> String {
    let sign = if seconds < 0 { "-" } else { "" };
    let total = seconds.unsigned_abs();
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{sign}{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{sign}{m}m{s}s")
    } else {
        format!("{sign}{s}s")
    }
}

/// Answers triggers with timing reports.
///
/// Clones share the most recent report.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    state: Arc<ScheduleState>,
    latest: Arc<Mutex<Option<StatusReport>>>,
}

impl StatusReporter {
    #[must_use]
    pub fn new(state: Arc<ScheduleState>) -> Self {
        Self {
            state,
            latest: Arc::new(Mutex::new(None)),
        }
    }

    /// Handle one trigger, logging and returning the report if one was produced.
    pub fn handle(&self, trigger: Trigger) -> Option<StatusReport> {
        match trigger {
            Trigger::Report => {
                let report = StatusReport::at(&self.state, Utc::now());
                log::info!("{}", report);
                *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
                Some(report)
            }
            Trigger::Reserved => {
                log::debug!("Reserved status trigger received, nothing to do");
                None
            }
        }
    }

    /// The most recent report produced by this reporter or a clone of it.
    #[must_use]
    pub fn latest(&self) -> Option<StatusReport> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
