#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Work-stealing task scheduler with named dependencies.
//!
//! A [`Scheduler`] owns a fixed pool of worker threads that execute two kinds of work:
//!
//! - **Tasks**: a single callback invocation.
//! - **Parallel-for ranges**: a callback invoked once per index of a range. Idle workers split
//!   large ranges in half and steal the halves, so the range spreads over the pool on demand.
//!
//! Every piece of work carries a name. When it has finished (all indexes of all split pieces),
//! its name is announced as fulfilled. Work can require names to be fulfilled before it starts,
//! and a thread outside the pool can block until a set of names has been fulfilled.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use lbs::{Requirements, Scheduler};
//! use new_zealand::nz;
//!
//! let scheduler = Scheduler::new();
//! let squares: Arc<Vec<AtomicUsize>> = Arc::new((0..1000).map(|_| AtomicUsize::new(0)).collect());
//!
//! let squares_clone = Arc::clone(&squares);
//! scheduler.add_parallel_for(
//!     "squares",
//!     Requirements::new(),
//!     Requirements::new(),
//!     0..1000,
//!     nz!(32),
//!     move |i, _worker| squares_clone[i].store(i * i, Ordering::Relaxed),
//! );
//!
//! scheduler.add_task_with("check", "squares", Requirements::new(), |_, _| {
//!     println!("squares are ready");
//! });
//!
//! scheduler.sleep_till_keywords("check");
//! assert_eq!(squares[12].load(Ordering::Relaxed), 144);
//! ```
//!
//! # Fulfillment semantics
//!
//! A fulfilled name is a flag, not a counter. It is consumed by the first waiting requirement
//! set that observes it. Two tasks with the same name finishing before anyone looks raise the
//! flag once; two waiters on the same name need two separate fulfillments.
//!
//! A task's post-requirements do not add names. They delay the announcement of the task's own
//! name until they too have been observed fulfilled.
//!
//! # Rescheduling
//!
//! A callback can call [`reschedule_task()`] to run its task again instead of finishing it.
//! The whole original range is queued again once the current run is complete, and the task's
//! name is only announced by a run that did not ask to be rescheduled.
//!
//! # Metrics
//!
//! Scheduler activity is published as `nm` events named `lbs_*` (tasks submitted, finished and
//! rescheduled, splits, steals and a per-chunk execution time histogram). Collect them with
//! `nm::Report::collect()`. [`Scheduler::stats()`] gives the same counts for one scheduler.
//!
//! # Shutdown behavior
//!
//! When the [`Scheduler`] is dropped, it signals all worker threads to stop and waits for each
//! to finish the work item it is executing. Queued and parked work is abandoned.
//!
//! # Panics
//!
//! Task failure is not modeled. A panic escaping a task callback is logged and aborts the
//! process, since anything waiting on that task could otherwise never wake up.

mod builder;
mod dependency_registry;
mod handle;
mod keyword;
mod metrics;
mod pending_report;
mod requirements;
mod scheduler;
mod stats;
mod work_item;
mod worker;

pub use builder::*;
pub(crate) use dependency_registry::*;
pub use handle::*;
pub(crate) use keyword::*;
pub use pending_report::*;
pub use requirements::*;
pub(crate) use scheduler::SchedulerInner;
pub use scheduler::{Scheduler, reschedule_task};
pub use stats::SchedulerStats;
pub(crate) use stats::Counters;
pub(crate) use work_item::*;
pub use worker::WorkerStatus;
pub(crate) use worker::WorkerState;
