//! Progress reporting and cooperative cancellation.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Long-running stage of a matching run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Binning,
    CandidateScan,
    LinkBuild,
}

impl Phase {
    fn slot(self) -> usize {
        match self {
            Phase::Binning => 0,
            Phase::CandidateScan => 1,
            Phase::LinkBuild => 2,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Binning => "binning",
            Phase::CandidateScan => "candidate_scan",
            Phase::LinkBuild => "link_build",
        })
    }
}

/// Receives progress updates; may be called from worker threads.
///
/// Reports are advisory. `done` never exceeds `total` but updates from
/// different workers can arrive out of order.
pub trait ProgressSink: Send + Sync {
    fn report(&self, phase: Phase, done: usize, total: usize);
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _phase: Phase, _done: usize, _total: usize) {}
}

/// Logs progress as `tracing` debug events, at most once per step.
#[derive(Debug)]
pub struct TracingProgress {
    step_percent: usize,
    last: [AtomicUsize; 3],
}

impl TracingProgress {
    pub fn new(step_percent: u8) -> Self {
        Self {
            step_percent: usize::from(step_percent.max(1)),
            last: Default::default(),
        }
    }
}

impl Default for TracingProgress {
    fn default() -> Self {
        Self::new(5)
    }
}

impl ProgressSink for TracingProgress {
    fn report(&self, phase: Phase, done: usize, total: usize) {
        let percent = if total == 0 { 100 } else { done.min(total) * 100 / total };
        let last = &self.last[phase.slot()];
        let prev = last.load(Ordering::Relaxed);
        // a new phase run restarts from zero
        let prev = if percent < prev { 0 } else { prev };
        if percent < prev + self.step_percent && percent != 100 {
            return;
        }
        if last
            .compare_exchange(prev, percent, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
            || percent == 100
        {
            debug!(phase = %phase, done, total, percent, "match_progress");
        }
    }
}

/// Shared flag used to stop a run from another thread.
///
/// Workers check it between chunks, so cancellation takes effect within one
/// chunk's worth of work.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Result of a run that may have been cancelled.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Completed(T),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn into_completed(self) -> Option<T> {
        match self {
            Outcome::Completed(v) => Some(v),
            Outcome::Cancelled => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Completed(v) => Outcome::Completed(f(v)),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }
}
