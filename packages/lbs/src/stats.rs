//! Scheduler activity counters.
//!
//! Every activity is first observed through the process-wide `nm` events in
//! [`metrics`][crate::metrics], then counted once more per scheduler so that
//! [`Scheduler::stats()`][crate::Scheduler::stats] can tell schedulers apart.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::metrics::{SPLITS, STEALS, TASKS_FINISHED, TASKS_RESCHEDULED, TASKS_SUBMITTED};

/// Point-in-time view of what a scheduler has done since it was created.
///
/// Counters are updated independently of each other, so a snapshot taken while work is in
/// flight may mix values from slightly different moments.
///
/// The same activity across all schedulers in the process is also published as `nm` events
/// named `lbs_*`, available through `nm::Report::collect()`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct SchedulerStats {
    /// Logical tasks submitted, including the scheduler's own internal tasks.
    pub tasks_submitted: u64,

    /// Logical tasks whose last piece has finished executing.
    pub tasks_finished: u64,

    /// Runs of logical tasks that asked to be rescheduled instead of finishing.
    pub tasks_rescheduled: u64,

    /// Times a worker split its current work item to share it.
    pub splits: u64,

    /// Times a worker took a work item from a peer's queue.
    pub steals: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    tasks_submitted: AtomicU64,
    tasks_finished: AtomicU64,
    tasks_rescheduled: AtomicU64,
    splits: AtomicU64,
    steals: AtomicU64,
}

// Relaxed ordering is sufficient for monotonic counters with no synchronization needs.
impl Counters {
    pub(crate) fn record_submitted(&self) {
        TASKS_SUBMITTED.with(|e| e.observe_once());
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_finished(&self) {
        TASKS_FINISHED.with(|e| e.observe_once());
        self.tasks_finished.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rescheduled(&self) {
        TASKS_RESCHEDULED.with(|e| e.observe_once());
        self.tasks_rescheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_split(&self) {
        SPLITS.with(|e| e.observe_once());
        self.splits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_steal(&self) {
        STEALS.with(|e| e.observe_once());
        self.steals.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            tasks_finished: self.tasks_finished.load(Ordering::Relaxed),
            tasks_rescheduled: self.tasks_rescheduled.load(Ordering::Relaxed),
            splits: self.splits.load(Ordering::Relaxed),
            steals: self.steals.load(Ordering::Relaxed),
        }
    }
}
