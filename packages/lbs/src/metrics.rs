//! Metrics for the scheduler.
//!
//! Events are process-wide and aggregated over every scheduler and thread by
//! `nm::Report::collect()`. The metrics use per-thread event instances to minimize contention.

use nm::{Event, Magnitude};

/// Histogram buckets for the execution time of one chunk in milliseconds.
///
/// A chunk is what a worker runs between two chances to split or steal, so most chunks are
/// expected to be short. Long chunks mean the chunk size is too coarse for the callback.
const CHUNK_EXECUTION_TIME_MS_BUCKETS: &[Magnitude] = &[0, 1, 2, 5, 10, 25, 50, 100, 250, 1000];

thread_local! {
    /// Logical tasks submitted, including internal tasks.
    pub(crate) static TASKS_SUBMITTED: Event = Event::builder()
        .name("lbs_tasks_submitted")
        .build();

    /// Logical tasks whose last piece finished without asking to be rescheduled.
    pub(crate) static TASKS_FINISHED: Event = Event::builder()
        .name("lbs_tasks_finished")
        .build();

    /// Runs of a logical task that ended in a reschedule instead of finishing.
    pub(crate) static TASKS_RESCHEDULED: Event = Event::builder()
        .name("lbs_tasks_rescheduled")
        .build();

    /// Work items split to share a range with idle workers.
    pub(crate) static SPLITS: Event = Event::builder()
        .name("lbs_splits")
        .build();

    /// Work items taken from a peer's queue.
    pub(crate) static STEALS: Event = Event::builder()
        .name("lbs_steals")
        .build();

    /// Event for observing the execution time of one chunk of a work item.
    ///
    /// The magnitude is the execution time in milliseconds.
    pub(crate) static CHUNK_EXECUTION_TIME_MS: Event = Event::builder()
        .name("lbs_chunk_execution_time_ms")
        .histogram(CHUNK_EXECUTION_TIME_MS_BUCKETS)
        .build();
}
