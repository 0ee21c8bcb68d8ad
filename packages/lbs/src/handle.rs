//! Cloneable handle for submitting work from anywhere, including from inside running tasks.

use std::num::NonZero;
use std::ops::Range;
use std::sync::Arc;

use crate::{Requirements, SINGLE_CHUNK, SchedulerInner, TaskDesc, WorkFn};

/// A handle for submitting work to a [`Scheduler`][crate::Scheduler].
///
/// Offers the same submission and waiting API as the scheduler itself. Unlike the scheduler,
/// a handle does not own the worker threads, so it can be moved into task callbacks and
/// producer threads.
///
/// # Cloning
///
/// Handles are cheaply cloneable and can be shared across threads. All clones reference the
/// same underlying scheduler.
///
/// # Lifetime
///
/// Work submitted through a handle after its scheduler was stopped is accepted but never runs.
///
/// # Example
///
/// ```rust
/// use lbs::{Requirements, Scheduler};
///
/// let scheduler = Scheduler::new();
/// let handle = scheduler.handle();
///
/// // A task that submits its own follow-up.
/// scheduler.add_task("outer", move |_, _| {
///     handle.add_task("inner", |_, _| {});
/// });
///
/// scheduler.sleep_till_keywords(["outer", "inner"]);
/// ```
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    inner: Arc<SchedulerInner>,
}

impl SchedulerHandle {
    pub(crate) fn new(inner: Arc<SchedulerInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &SchedulerInner {
        &self.inner
    }

    /// Submits a single-shot task with no requirements.
    ///
    /// See [`Scheduler::add_task()`][crate::Scheduler::add_task].
    pub fn add_task<F>(&self, name: &str, callback: F)
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.submit(
            name,
            &Requirements::new(),
            &Requirements::new(),
            0..1,
            SINGLE_CHUNK,
            Arc::new(callback),
        );
    }

    /// Submits a single-shot task gated by `pre` whose announcement is gated by `post`.
    ///
    /// See [`Scheduler::add_task_with()`][crate::Scheduler::add_task_with].
    pub fn add_task_with<F>(
        &self,
        name: &str,
        pre: impl Into<Requirements>,
        post: impl Into<Requirements>,
        callback: F,
    ) where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.submit(
            name,
            &pre.into(),
            &post.into(),
            0..1,
            SINGLE_CHUNK,
            Arc::new(callback),
        );
    }

    /// Submits a data-parallel task over `range`.
    ///
    /// See [`Scheduler::add_parallel_for()`][crate::Scheduler::add_parallel_for].
    pub fn add_parallel_for<F>(
        &self,
        name: &str,
        pre: impl Into<Requirements>,
        post: impl Into<Requirements>,
        range: Range<usize>,
        chunk_size: NonZero<usize>,
        callback: F,
    ) where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.submit(
            name,
            &pre.into(),
            &post.into(),
            range,
            chunk_size,
            Arc::new(callback),
        );
    }

    /// Submits a single-shot task described by `desc`.
    pub fn add_described_task<F>(&self, desc: &TaskDesc, callback: F)
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.submit(
            desc.name(),
            desc.pre_requirements(),
            desc.post_requirements(),
            0..1,
            SINGLE_CHUNK,
            Arc::new(callback),
        );
    }

    /// Submits a data-parallel task described by `desc`.
    pub fn add_described_parallel_for<F>(
        &self,
        desc: &TaskDesc,
        range: Range<usize>,
        chunk_size: NonZero<usize>,
        callback: F,
    ) where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.submit(
            desc.name(),
            desc.pre_requirements(),
            desc.post_requirements(),
            range,
            chunk_size,
            Arc::new(callback),
        );
    }

    /// Blocks the calling thread until every name in `names` has been observed fulfilled.
    ///
    /// See [`Scheduler::sleep_till_keywords()`][crate::Scheduler::sleep_till_keywords].
    ///
    /// # Panics
    ///
    /// Panics if called on one of the scheduler's worker threads or after the scheduler was
    /// stopped.
    pub fn sleep_till_keywords(&self, names: impl Into<Requirements>) {
        self.inner.sleep_till_keywords(&names.into());
    }

    fn submit(
        &self,
        name: &str,
        pre: &Requirements,
        post: &Requirements,
        range: Range<usize>,
        chunk_size: NonZero<usize>,
        callback: WorkFn,
    ) {
        self.inner
            .submit(Some(name), pre, post, range, chunk_size, callback);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use new_zealand::nz;
    use static_assertions::assert_impl_all;
    use testing::with_watchdog;

    use crate::Scheduler;

    use super::*;

    assert_impl_all!(SchedulerHandle: Clone, Send, Sync);

    #[cfg_attr(miri, ignore)]
    #[test]
    fn handle_submits_to_same_scheduler() {
        with_watchdog(|| {
            let scheduler = Scheduler::with_threads(nz!(2));
            let handle = scheduler.handle();
            let runs = Arc::new(AtomicUsize::new(0));

            let runs_clone = Arc::clone(&runs);
            handle.add_task("via-handle", move |_, _| {
                runs_clone.fetch_add(1, Ordering::Relaxed);
            });

            scheduler.sleep_till_keywords("via-handle");

            assert_eq!(runs.load(Ordering::Relaxed), 1);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn handle_can_wait_from_another_thread() {
        with_watchdog(|| {
            let scheduler = Scheduler::with_threads(nz!(2));
            let handle = scheduler.handle();

            let waiter = thread::spawn(move || {
                handle.add_task("from-thread", |_, _| {});
                handle.sleep_till_keywords("from-thread");
            });

            waiter.join().unwrap();
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn nested_submission_from_callback() {
        with_watchdog(|| {
            let scheduler = Scheduler::with_threads(nz!(2));
            let handle = scheduler.handle();
            let total = Arc::new(AtomicUsize::new(0));

            let total_clone = Arc::clone(&total);
            scheduler.add_task("outer", move |_, _| {
                let total = Arc::clone(&total_clone);
                handle.add_parallel_for(
                    "inner",
                    Requirements::new(),
                    Requirements::new(),
                    0..100,
                    nz!(8),
                    move |_, _| {
                        total.fetch_add(1, Ordering::Relaxed);
                    },
                );
            });

            scheduler.sleep_till_keywords(["outer", "inner"]);

            assert_eq!(total.load(Ordering::Relaxed), 100);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn described_tasks_follow_their_requirements() {
        with_watchdog(|| {
            let scheduler = Scheduler::with_threads(nz!(2));
            let handle = scheduler.handle();
            let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

            let order_clone = Arc::clone(&order);
            handle.add_described_task(&TaskDesc::new("second").pre("first"), move |_, _| {
                order_clone.lock().push("second");
            });

            let order_clone = Arc::clone(&order);
            handle.add_described_parallel_for(
                &TaskDesc::new("first"),
                0..4,
                nz!(1),
                move |_, _| {
                    order_clone.lock().push("first");
                },
            );

            scheduler.sleep_till_keywords("second");

            assert_eq!(*order.lock(), ["first", "first", "first", "first", "second"]);
        });
    }
}
