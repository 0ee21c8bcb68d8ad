//! Scheduler lifecycle, worker loop and dependency propagation.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::mem;
use std::num::NonZero;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use event_listener::{Event, Listener};
use parking_lot::Mutex;
use tracing::{debug, error, trace};

use crate::metrics::CHUNK_EXECUTION_TIME_MS;
use crate::{
    Counters, DependencyRegistry, KeywordTable, PendingReport, Requirements, SINGLE_CHUNK,
    SchedulerBuilder, SchedulerHandle, SchedulerStats, TaskDesc, TaskId, WorkFn, WorkItem,
    WorkerState, WorkerStatus,
};

static NEXT_SCHEDULER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Set on worker threads to the owning scheduler's ID and the worker index.
    static CURRENT_WORKER: Cell<Option<(u64, usize)>> = const { Cell::new(None) };

    /// Raised by `reschedule_task()` while a callback runs, consumed by the worker loop.
    static RESCHEDULE_REQUESTED: Cell<bool> = const { Cell::new(false) };
}

/// Shared state of one scheduler, referenced by its worker threads and all handles.
///
/// Lock order: the registry lock is always taken before a deque lock, and in practice the two
/// are never held together: items released by the registry are pushed after it is unlocked.
pub(crate) struct SchedulerInner {
    id: u64,
    workers: Box<[WorkerState]>,
    registry: Mutex<DependencyRegistry>,
    keywords: KeywordTable,
    next_task_id: AtomicU64,
    stop: AtomicBool,
    idle_threads: AtomicUsize,

    /// Wakes callers blocked in `sleep_till_keywords()`. Each caller checks its own flag.
    caller_wake: Arc<Event>,

    counters: Counters,
}

impl SchedulerInner {
    fn new(thread_count: NonZero<usize>) -> Self {
        Self {
            id: NEXT_SCHEDULER_ID.fetch_add(1, Ordering::Relaxed),
            workers: (0..thread_count.get()).map(WorkerState::new).collect(),
            registry: Mutex::new(DependencyRegistry::new()),
            keywords: KeywordTable::new(),
            next_task_id: AtomicU64::new(1),
            stop: AtomicBool::new(false),
            idle_threads: AtomicUsize::new(0),
            caller_wake: Arc::new(Event::new()),
            counters: Counters::default(),
        }
    }

    fn allocate_task_id(&self) -> TaskId {
        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        assert!(id != TaskId::MAX, "task ID space exhausted");
        id
    }

    /// Registers a task and either queues it or parks it until `pre` is satisfied.
    pub(crate) fn submit(
        &self,
        name: Option<&str>,
        pre: &Requirements,
        post: &Requirements,
        range: Range<usize>,
        chunk_size: NonZero<usize>,
        callback: WorkFn,
    ) {
        let id = self.allocate_task_id();
        let count = range.len();
        let item = WorkItem::new(id, range.start, count, chunk_size, callback);

        // Interning takes the keyword table lock, never while holding the registry lock.
        let name_keyword = name.map(|name| self.keywords.intern(name));
        let pre = pre.intern(&self.keywords);
        let post = post.intern(&self.keywords);

        let ready = self.registry.lock().submit(item, name_keyword, pre, post);
        self.counters.record_submitted();

        match ready {
            Some(item) => {
                trace!(
                    scheduler_id = self.id,
                    task_id = id,
                    task_name = name,
                    count,
                    "task ready"
                );
                self.push_ready(vec![item]);
            }
            None => {
                trace!(
                    scheduler_id = self.id,
                    task_id = id,
                    task_name = name,
                    count,
                    "task parked until its pre-requirements are fulfilled"
                );
            }
        }
    }

    /// Hands runnable items to worker 0 and wakes everyone so they can be stolen.
    fn push_ready(&self, items: Vec<WorkItem>) {
        if items.is_empty() {
            return;
        }

        if let Some(first) = self.workers.first() {
            first.push_front_all(items);
        }

        self.wake_all();
    }

    fn wake_all(&self) {
        for worker in &self.workers {
            worker.wake();
        }
    }

    /// Accounts for executed indexes and runs the completion protocol for the last piece.
    fn report_completed(&self, item: &WorkItem, executed: usize) {
        if !item.report_completed(executed) {
            return;
        }

        // A rescheduled task keeps its registry entry and announces nothing yet.
        if let Some(rerun) = item.take_rerun() {
            self.counters.record_rescheduled();
            trace!(scheduler_id = self.id, task_id = item.id(), "task rescheduled");
            self.push_ready(vec![rerun]);
            return;
        }

        self.counters.record_finished();
        trace!(scheduler_id = self.id, task_id = item.id(), "task finished");

        let released = {
            let mut registry = self.registry.lock();

            match registry.finish_task(item.id()) {
                Some(name) => {
                    trace!(
                        scheduler_id = self.id,
                        task_id = item.id(),
                        name = %self.keywords.display_name(name),
                        "announcing fulfilled"
                    );
                    registry.announce_fulfilled(name)
                }
                None => Vec::new(),
            }
        };

        if !released.is_empty() {
            trace!(
                scheduler_id = self.id,
                released = released.len(),
                "released parked tasks"
            );
        }

        self.push_ready(released);
    }

    fn run_worker(&self, index: usize) {
        let Some(me) = self.workers.get(index) else {
            return;
        };

        let Some(mut current) = self.steal_or_wait(me) else {
            return;
        };

        loop {
            // Prefer distributing work over hoarding it: while our own queue is empty, keep
            // offering half of what we hold to whoever is idle.
            if current.can_split() && !me.has_queued_work() {
                let piece = current.split();

                trace!(
                    scheduler_id = self.id,
                    worker_index = index,
                    task_id = piece.id(),
                    moved = piece.remaining(),
                    "split work item"
                );

                me.push_back(piece);
                self.counters.record_split();
                self.wake_all();
                continue;
            }

            me.set_status(WorkerStatus::Working);
            RESCHEDULE_REQUESTED.set(false);
            let progress = CHUNK_EXECUTION_TIME_MS
                .with(|event| event.observe_duration_millis(|| current.do_work(index)));
            me.set_status(WorkerStatus::RunningLogic);

            if RESCHEDULE_REQUESTED.replace(false) {
                current.request_rerun();
            }

            self.report_completed(&current, progress.executed);

            if progress.exhausted {
                match self.steal_or_wait(me) {
                    Some(next) => current = next,
                    None => return,
                }
            }
        }
    }

    /// Finds the next item for `me`: own deque first, then peers, else sleeps.
    ///
    /// Returns `None` once the stop flag is observed.
    fn steal_or_wait(&self, me: &WorkerState) -> Option<WorkItem> {
        loop {
            // Acquire pairs with the Release in stop().
            if self.stop.load(Ordering::Acquire) {
                return None;
            }

            if let Some(item) = me.pop_back() {
                return Some(item);
            }

            if let Some(item) = self.steal_for(me) {
                return Some(item);
            }

            let listener = me.listen();

            // Re-check after registering the listener to avoid lost wakeups.
            if self.stop.load(Ordering::Acquire)
                || self.workers.iter().any(WorkerState::has_queued_work)
            {
                continue;
            }

            me.set_status(WorkerStatus::WaitingForWork);
            self.idle_threads.fetch_add(1, Ordering::Relaxed);

            listener.wait();

            self.idle_threads.fetch_sub(1, Ordering::Relaxed);
            me.set_status(WorkerStatus::RunningLogic);
        }
    }

    fn steal_for(&self, me: &WorkerState) -> Option<WorkItem> {
        let item = self
            .workers
            .iter()
            .filter(|peer| peer.index() != me.index())
            .find_map(WorkerState::steal_front)?;

        trace!(
            scheduler_id = self.id,
            worker_index = me.index(),
            task_id = item.id(),
            "stole work item"
        );
        self.counters.record_steal();

        Some(item)
    }

    /// Blocks the calling thread until every name in `names` has been observed fulfilled.
    pub(crate) fn sleep_till_keywords(&self, names: &Requirements) {
        if let Some(worker_index) = current_worker_index(self.id) {
            panic!(
                "sleep_till_keywords() called on worker thread {worker_index} of the same \
                 scheduler: the worker would block itself out of the pool"
            );
        }

        assert!(
            !self.stop.load(Ordering::Acquire),
            "sleep_till_keywords() called after the scheduler was stopped: nothing would ever \
             wake the caller"
        );

        let woken = Arc::new(AtomicBool::new(false));

        let callback: WorkFn = {
            let woken = Arc::clone(&woken);
            let caller_wake = Arc::clone(&self.caller_wake);

            Arc::new(move |_, _| {
                // Release pairs with the Acquire loads below, publishing everything the
                // awaited tasks did before this one was released.
                woken.store(true, Ordering::Release);
                caller_wake.notify(usize::MAX);
            })
        };

        self.submit(
            None,
            names,
            &Requirements::new(),
            0..1,
            SINGLE_CHUNK,
            callback,
        );

        self.log_if_stalled();

        loop {
            if woken.load(Ordering::Acquire) {
                break;
            }

            let listener = self.caller_wake.listen();

            if woken.load(Ordering::Acquire) {
                break;
            }

            listener.wait();
        }
    }

    fn log_if_stalled(&self) {
        if self.idle_threads.load(Ordering::Relaxed) < self.workers.len() {
            return;
        }

        let report = {
            let registry = self.registry.lock();

            if !registry.has_parked_work() {
                return;
            }

            registry.pending_report(&self.keywords)
        };

        debug!(
            scheduler_id = self.id,
            %report,
            "caller going to sleep while every worker is idle and work is parked"
        );
    }

    #[cfg_attr(test, mutants::skip)] // Removing this causes timeouts (workers never stop)
    fn signal_stop(&self) {
        // Release ordering ensures all prior queue operations are visible to workers before
        // they observe the stop flag.
        self.stop.store(true, Ordering::Release);

        // Every worker gets something to find, so none sleeps through the shutdown.
        for worker in &self.workers {
            worker.push_back(WorkItem::noop(self.allocate_task_id()));
            worker.wake();
        }
    }

    /// Drops everything that never got to run. Called after all workers have exited.
    fn discard_abandoned(&self) {
        let queued: usize = self.workers.iter().map(WorkerState::clear).sum();
        let registry = mem::take(&mut *self.registry.lock());
        let parked = registry.parked_task_count();

        // Callbacks may own handles to this scheduler, drop them outside the lock.
        drop(registry);

        // The no-op items pushed by signal_stop() are always among the queued ones.
        let abandoned = queued.saturating_sub(self.workers.len());
        if abandoned != 0 || parked != 0 {
            debug!(
                scheduler_id = self.id,
                abandoned, parked, "discarded work that never ran"
            );
        }
    }

    pub(crate) fn thread_count(&self) -> usize {
        self.workers.len()
    }

    pub(crate) fn idle_threads(&self) -> usize {
        self.idle_threads.load(Ordering::Relaxed)
    }

    pub(crate) fn worker_statuses(&self) -> Vec<WorkerStatus> {
        self.workers.iter().map(WorkerState::status).collect()
    }

    pub(crate) fn stats(&self) -> SchedulerStats {
        self.counters.snapshot()
    }

    pub(crate) fn pending_report(&self) -> PendingReport {
        self.registry.lock().pending_report(&self.keywords)
    }
}

impl fmt::Debug for SchedulerInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerInner")
            .field("id", &self.id)
            .field("workers", &self.workers)
            .field("keywords", &self.keywords)
            .field("stop", &self.stop.load(Ordering::Relaxed))
            .field("idle_threads", &self.idle_threads.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

fn current_worker_index(scheduler_id: u64) -> Option<usize> {
    CURRENT_WORKER
        .get()
        .filter(|(owner, _)| *owner == scheduler_id)
        .map(|(_, index)| index)
}

/// Asks for the task whose callback is running on this thread to run again instead of
/// finishing.
///
/// The request takes effect once every index of the current run has executed. The task's
/// whole original range is then queued again with the same requirements, and its name is not
/// announced for the run that asked. A task that stops asking finishes normally. Calling this
/// from several indexes of the same run still schedules one more run.
///
/// # Panics
///
/// Panics if called outside of a task callback running on a scheduler worker thread.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use lbs::{Scheduler, reschedule_task};
///
/// let scheduler = Scheduler::new();
/// let polls = Arc::new(AtomicUsize::new(0));
///
/// let polls_clone = Arc::clone(&polls);
/// scheduler.add_task("poll", move |_, _| {
///     if polls_clone.fetch_add(1, Ordering::Relaxed) < 2 {
///         reschedule_task();
///     }
/// });
///
/// scheduler.sleep_till_keywords("poll");
/// assert_eq!(polls.load(Ordering::Relaxed), 3);
/// ```
pub fn reschedule_task() {
    assert!(
        CURRENT_WORKER.get().is_some(),
        "reschedule_task() called outside of a task callback"
    );

    RESCHEDULE_REQUESTED.set(true);
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

fn worker_main(inner: &SchedulerInner, index: usize) {
    CURRENT_WORKER.set(Some((inner.id, index)));

    debug!(scheduler_id = inner.id, worker_index = index, "worker thread started");

    // A panicking callback leaves its task forever unfinished and anyone waiting on it blocked,
    // so there is nothing sensible to continue with.
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| inner.run_worker(index))) {
        error!(
            scheduler_id = inner.id,
            worker_index = index,
            message = panic_message(&*payload),
            "task callback panicked on a worker thread, aborting the process"
        );
        process::abort();
    }

    debug!(scheduler_id = inner.id, worker_index = index, "worker thread exiting");
}

/// A work-stealing thread pool that runs named tasks and splittable parallel ranges, ordered
/// by named dependencies.
///
/// Each task has a name. Once a task has finished (every index of every split piece has run)
/// its name is announced as fulfilled, which releases tasks that listed the name among their
/// pre-requirements and wakes callers blocked in
/// [`sleep_till_keywords()`][Self::sleep_till_keywords].
///
/// # Lifetime
///
/// When the scheduler is dropped (or [`stop()`][Self::stop] is called):
/// 1. All worker threads are signaled to stop.
/// 2. The call blocks until every worker has finished the work item it is executing.
/// 3. Anything still queued or parked is abandoned.
///
/// To ensure tasks complete, wait for their names before dropping the scheduler.
///
/// # Memory
///
/// Every distinct name used as a task name or requirement is interned for the lifetime of the
/// scheduler, along with its fulfilled flag. Neither is ever reclaimed, so memory grows with the
/// number of distinct names. Reuse a fixed set of names (for example per pipeline stage) rather
/// than generating a unique name per frame or per request.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use lbs::{Requirements, Scheduler};
/// use new_zealand::nz;
///
/// let scheduler = Scheduler::new();
/// let sum = Arc::new(AtomicUsize::new(0));
///
/// let sum_clone = Arc::clone(&sum);
/// scheduler.add_parallel_for(
///     "sum",
///     Requirements::new(),
///     Requirements::new(),
///     0..1000,
///     nz!(64),
///     move |index, _worker| {
///         sum_clone.fetch_add(index, Ordering::Relaxed);
///     },
/// );
///
/// let sum_clone = Arc::clone(&sum);
/// scheduler.add_task_with("report", "sum", Requirements::new(), move |_, _| {
///     assert_eq!(sum_clone.load(Ordering::Relaxed), 499_500);
/// });
///
/// scheduler.sleep_till_keywords("report");
/// assert_eq!(sum.load(Ordering::Relaxed), 499_500);
/// ```
#[derive(Debug)]
pub struct Scheduler {
    handle: SchedulerHandle,
    threads: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Creates a scheduler with one worker thread per available processor.
    ///
    /// Use [`Scheduler::builder()`] for custom configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a scheduler with exactly `thread_count` worker threads.
    #[must_use]
    pub fn with_threads(thread_count: NonZero<usize>) -> Self {
        Self::builder().thread_count(thread_count).build()
    }

    /// Creates a builder for configuring the scheduler.
    #[must_use]
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub(crate) fn start(thread_count: NonZero<usize>, thread_name_prefix: &str) -> Self {
        let inner = Arc::new(SchedulerInner::new(thread_count));

        let threads = (0..thread_count.get())
            .map(|index| {
                let inner = Arc::clone(&inner);

                thread::Builder::new()
                    .name(format!("{thread_name_prefix}-w{index}"))
                    .spawn(move || worker_main(&inner, index))
                    .expect("failed to spawn worker thread: thread spawning failure is not supported")
            })
            .collect();

        debug!(
            scheduler_id = inner.id,
            thread_count = thread_count.get(),
            "scheduler started"
        );

        Self {
            handle: SchedulerHandle::new(inner),
            threads,
        }
    }

    /// Returns a handle that submits work to this scheduler.
    ///
    /// Handles are cheap to clone and can be moved into task callbacks to submit follow-up
    /// work from inside a running task, or shared with producer threads.
    #[must_use]
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Submits a single-shot task with no requirements.
    ///
    /// The callback receives the iteration index (always 0) and the index of the worker
    /// running it. The task's `name` is announced once the callback has returned.
    pub fn add_task<F>(&self, name: &str, callback: F)
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.handle.add_task(name, callback);
    }

    /// Submits a single-shot task that starts once every name in `pre` has been observed
    /// fulfilled.
    ///
    /// After the callback returns, the task's `name` is announced once every name in `post`
    /// has also been observed fulfilled.
    pub fn add_task_with<F>(
        &self,
        name: &str,
        pre: impl Into<Requirements>,
        post: impl Into<Requirements>,
        callback: F,
    ) where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.handle.add_task_with(name, pre, post, callback);
    }

    /// Submits a data-parallel task that invokes the callback once for every index in `range`.
    ///
    /// Indexes are executed `chunk_size` at a time. Idle workers split off and steal halves
    /// of the remaining range, so indexes run concurrently and in no particular order; each
    /// index runs exactly once. Gating by `pre` and `post` works as in
    /// [`add_task_with()`][Self::add_task_with]. An empty range still announces `name`.
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
        self.handle
            .add_parallel_for(name, pre, post, range, chunk_size, callback);
    }

    /// Submits a single-shot task described by `desc`.
    pub fn add_described_task<F>(&self, desc: &TaskDesc, callback: F)
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.handle.add_described_task(desc, callback);
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
        self.handle
            .add_described_parallel_for(desc, range, chunk_size, callback);
    }

    /// Blocks the calling thread until every name in `names` has been observed fulfilled.
    ///
    /// Internally this submits a task gated by `names` whose only job is to wake the caller,
    /// so it consumes one fulfillment of each name exactly like any other waiting task.
    ///
    /// There is no timeout: waiting for a name that is never announced blocks forever.
    ///
    /// # Panics
    ///
    /// Panics if called on one of this scheduler's worker threads.
    pub fn sleep_till_keywords(&self, names: impl Into<Requirements>) {
        self.handle.sleep_till_keywords(names);
    }

    /// Number of worker threads.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.handle.inner().thread_count()
    }

    /// Number of worker threads currently blocked waiting for work.
    #[must_use]
    pub fn idle_threads(&self) -> usize {
        self.handle.inner().idle_threads()
    }

    /// What each worker thread is doing right now, indexed by worker.
    #[must_use]
    pub fn worker_statuses(&self) -> Vec<WorkerStatus> {
        self.handle.inner().worker_statuses()
    }

    /// Activity counters since the scheduler was created.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        self.handle.inner().stats()
    }

    /// Snapshot of all work held back by unfulfilled names.
    #[must_use]
    pub fn pending_report(&self) -> PendingReport {
        self.handle.inner().pending_report()
    }

    /// Stops all worker threads and waits for them to exit.
    ///
    /// Each worker finishes the work item it is executing; queued and parked work is
    /// abandoned. Calling this more than once has no further effect. Dropping the scheduler
    /// calls this automatically.
    pub fn stop(&mut self) {
        if self.threads.is_empty() {
            return;
        }

        let inner = self.handle.inner();
        inner.signal_stop();

        for thread in self.threads.drain(..) {
            if let Err(payload) = thread.join() {
                // Workers abort the process on panic, so this only surfaces infrastructure
                // bugs. Propagate rather than ignore.
                panic::resume_unwind(payload);
            }
        }

        inner.discard_abandoned();

        debug!(scheduler_id = inner.id, "scheduler stopped");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use new_zealand::nz;
    use nm::Report;
    use static_assertions::assert_impl_all;
    use testing::with_watchdog;

    use super::*;

    fn event_count(name: &str) -> u64 {
        Report::collect()
            .events()
            .find(|event| event.name() == name)
            .map_or(0, |event| event.count())
    }

    assert_impl_all!(Scheduler: Send, Sync);

    #[cfg_attr(miri, ignore)]
    #[test]
    fn scheduler_new_creates_scheduler() {
        with_watchdog(|| {
            let scheduler = Scheduler::new();
            assert!(scheduler.thread_count() >= 1);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn with_threads_spawns_requested_count() {
        with_watchdog(|| {
            let scheduler = Scheduler::with_threads(nz!(3));

            assert_eq!(scheduler.thread_count(), 3);
            assert_eq!(scheduler.worker_statuses().len(), 3);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn workers_go_idle_without_work() {
        with_watchdog(|| {
            let scheduler = Scheduler::with_threads(nz!(2));

            while scheduler.idle_threads() != 2 {
                thread::sleep(Duration::from_millis(1));
            }

            assert!(
                scheduler
                    .worker_statuses()
                    .iter()
                    .all(|status| *status == WorkerStatus::WaitingForWork)
            );
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn stop_is_idempotent() {
        with_watchdog(|| {
            let mut scheduler = Scheduler::with_threads(nz!(2));

            scheduler.stop();
            scheduler.stop();
            drop(scheduler);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn stats_count_submitted_and_finished_tasks() {
        with_watchdog(|| {
            let scheduler = Scheduler::with_threads(nz!(2));

            scheduler.add_task("a", |_, _| {});
            scheduler.add_task_with("b", "a", Requirements::new(), |_, _| {});
            scheduler.sleep_till_keywords("b");

            let stats = scheduler.stats();

            // Two user tasks plus the internal waker task.
            assert_eq!(stats.tasks_submitted, 3);
            assert!(stats.tasks_finished >= 2);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn large_parallel_for_gets_split() {
        with_watchdog(|| {
            let scheduler = Scheduler::with_threads(nz!(4));

            scheduler.add_parallel_for(
                "big",
                Requirements::new(),
                Requirements::new(),
                0..100_000,
                nz!(16),
                |_, _| {},
            );
            scheduler.sleep_till_keywords("big");

            assert!(scheduler.stats().splits > 0);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    #[should_panic]
    fn sleep_after_stop_panics() {
        let mut scheduler = Scheduler::with_threads(nz!(1));
        scheduler.stop();

        scheduler.sleep_till_keywords("never");
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn sleep_from_worker_thread_is_detected() {
        with_watchdog(|| {
            let scheduler = Scheduler::with_threads(nz!(2));
            let handle = scheduler.handle();
            let detected = Arc::new(AtomicBool::new(false));

            let detected_clone = Arc::clone(&detected);
            scheduler.add_task("detect", move |_, _| {
                let inner = handle.inner();
                detected_clone.store(
                    current_worker_index(inner.id).is_some(),
                    Ordering::Relaxed,
                );
            });
            scheduler.sleep_till_keywords("detect");

            assert!(detected.load(Ordering::Relaxed));

            // The test thread itself is not a worker.
            assert!(current_worker_index(scheduler.handle().inner().id).is_none());
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn pending_report_shows_parked_task() {
        with_watchdog(|| {
            let scheduler = Scheduler::with_threads(nz!(1));

            scheduler.add_task_with("blocked", "missing", Requirements::new(), |_, _| {});

            let report = scheduler.pending_report();

            assert_eq!(report.parked_tasks().len(), 1);
            assert_eq!(report.parked_tasks()[0].task_name(), Some("blocked"));
            assert_eq!(report.parked_tasks()[0].waiting_for(), ["missing"]);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn drop_abandons_parked_work() {
        with_watchdog(|| {
            let runs = Arc::new(AtomicUsize::new(0));
            let scheduler = Scheduler::with_threads(nz!(2));

            let runs_clone = Arc::clone(&runs);
            scheduler.add_task_with("never", "missing", Requirements::new(), move |_, _| {
                runs_clone.fetch_add(1, Ordering::Relaxed);
            });

            drop(scheduler);

            assert_eq!(runs.load(Ordering::Relaxed), 0);
            // The parked callback was dropped along with the registry.
            assert_eq!(Arc::strong_count(&runs), 1);
        });
    }

    #[test]
    #[should_panic]
    fn reschedule_outside_of_callback_panics() {
        reschedule_task();
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn rescheduled_parallel_for_runs_whole_range_again() {
        with_watchdog(|| {
            let scheduler = Scheduler::with_threads(nz!(4));
            let total = Arc::new(AtomicUsize::new(0));
            let rescheduled = Arc::new(AtomicBool::new(false));

            let total_clone = Arc::clone(&total);
            let rescheduled_clone = Arc::clone(&rescheduled);
            scheduler.add_parallel_for(
                "twice",
                Requirements::new(),
                Requirements::new(),
                0..100,
                nz!(4),
                move |index, _| {
                    total_clone.fetch_add(index, Ordering::Relaxed);

                    if index == 50 && !rescheduled_clone.swap(true, Ordering::Relaxed) {
                        reschedule_task();
                    }
                },
            );
            scheduler.sleep_till_keywords("twice");

            assert_eq!(total.load(Ordering::Relaxed), 2 * 4950);
            assert_eq!(scheduler.stats().tasks_rescheduled, 1);
        });
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn chunk_execution_time_is_published() {
        with_watchdog(|| {
            let chunks_before = event_count("lbs_chunk_execution_time_ms");
            let scheduler = Scheduler::with_threads(nz!(2));

            scheduler.add_parallel_for(
                "chunks",
                Requirements::new(),
                Requirements::new(),
                0..64,
                nz!(8),
                |_, _| {},
            );
            scheduler.sleep_till_keywords("chunks");

            // 8 chunks at least, the split pieces never overlap.
            assert!(event_count("lbs_chunk_execution_time_ms") >= chunks_before + 8);
        });
    }

    #[test]
    fn panic_message_extracts_common_payloads() {
        let static_str: Box<dyn Any + Send> = Box::new("boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("bang"));
        let other: Box<dyn Any + Send> = Box::new(42_u32);

        assert_eq!(panic_message(&*static_str), "boom");
        assert_eq!(panic_message(&*owned), "bang");
        assert_eq!(panic_message(&*other), "<non-string panic payload>");
    }
}
