//! Per-worker queues and status.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use event_listener::{Event, EventListener};
use parking_lot::Mutex;

use crate::WorkItem;

/// What a worker thread is doing right now.
///
/// Sampled without synchronization, so it only gives direction.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum WorkerStatus {
    /// Between chunks: splitting, stealing, reporting completion.
    RunningLogic,

    /// Inside a task callback.
    Working,

    /// Blocked until new work arrives.
    WaitingForWork,
}

impl WorkerStatus {
    const fn to_raw(self) -> u8 {
        match self {
            Self::RunningLogic => 0,
            Self::Working => 1,
            Self::WaitingForWork => 2,
        }
    }

    const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Working,
            2 => Self::WaitingForWork,
            _ => Self::RunningLogic,
        }
    }
}

/// State of one worker thread that other threads may touch.
///
/// The deque is owned by the worker: it pushes and pops at the back, peers steal from the
/// front. `queue_depth` mirrors the deque length so peers can skip empty deques without
/// locking; the authoritative check is always made under the deque lock.
pub(crate) struct WorkerState {
    index: usize,
    deque: Mutex<VecDeque<WorkItem>>,
    queue_depth: AtomicUsize,
    status: AtomicU8,
    wake: Event,
}

impl WorkerState {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            deque: Mutex::new(VecDeque::new()),
            queue_depth: AtomicUsize::new(0),
            status: AtomicU8::new(WorkerStatus::RunningLogic.to_raw()),
            wake: Event::new(),
        }
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    /// Cheap, possibly stale view of whether the deque holds anything.
    pub(crate) fn has_queued_work(&self) -> bool {
        // Acquire pairs with the Release store made under the deque lock, so a worker that is
        // about to sleep sees items pushed before the wakeup it may have missed.
        self.queue_depth.load(Ordering::Acquire) != 0
    }

    #[cfg(test)]
    pub(crate) fn push_front(&self, item: WorkItem) {
        let mut deque = self.deque.lock();
        deque.push_front(item);
        self.queue_depth.store(deque.len(), Ordering::Release);
    }

    /// Adds freshly submitted or released work at the front, where peers steal from.
    pub(crate) fn push_front_all(&self, items: impl IntoIterator<Item = WorkItem>) {
        let mut deque = self.deque.lock();

        for item in items {
            deque.push_front(item);
        }

        self.queue_depth.store(deque.len(), Ordering::Release);
    }

    /// Adds a piece split off by the owning worker.
    pub(crate) fn push_back(&self, item: WorkItem) {
        let mut deque = self.deque.lock();
        deque.push_back(item);
        self.queue_depth.store(deque.len(), Ordering::Release);
    }

    /// Owner side: takes the most recently pushed item.
    pub(crate) fn pop_back(&self) -> Option<WorkItem> {
        if !self.has_queued_work() {
            return None;
        }

        let mut deque = self.deque.lock();
        let item = deque.pop_back();
        self.queue_depth.store(deque.len(), Ordering::Release);
        item
    }

    /// Thief side: takes the oldest item.
    pub(crate) fn steal_front(&self) -> Option<WorkItem> {
        if !self.has_queued_work() {
            return None;
        }

        let mut deque = self.deque.lock();
        let item = deque.pop_front();
        self.queue_depth.store(deque.len(), Ordering::Release);
        item
    }

    /// Drops everything still queued. Returns how many items were discarded.
    pub(crate) fn clear(&self) -> usize {
        let mut deque = self.deque.lock();
        let discarded = deque.len();
        deque.clear();
        self.queue_depth.store(0, Ordering::Release);
        discarded
    }

    pub(crate) fn status(&self) -> WorkerStatus {
        WorkerStatus::from_raw(self.status.load(Ordering::Relaxed))
    }

    pub(crate) fn set_status(&self, status: WorkerStatus) {
        self.status.store(status.to_raw(), Ordering::Relaxed);
    }

    /// Registers interest in the next wakeup. Must be called before the final emptiness
    /// check that precedes blocking, otherwise a wakeup can slip in between.
    pub(crate) fn listen(&self) -> EventListener {
        self.wake.listen()
    }

    pub(crate) fn wake(&self) {
        self.wake.notify(1);
    }
}

impl fmt::Debug for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerState")
            .field("index", &self.index)
            .field("queue_depth", &self.queue_depth.load(Ordering::Relaxed))
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::SINGLE_CHUNK;

    fn item(id: u64) -> WorkItem {
        WorkItem::new(id, 0, 1, SINGLE_CHUNK, Arc::new(|_, _| {}))
    }

    #[test]
    fn new_worker_is_empty() {
        let worker = WorkerState::new(3);

        assert_eq!(worker.index(), 3);
        assert!(!worker.has_queued_work());
        assert!(worker.pop_back().is_none());
        assert!(worker.steal_front().is_none());
        assert_eq!(worker.status(), WorkerStatus::RunningLogic);
    }

    #[test]
    fn owner_pops_newest_thief_takes_oldest() {
        let worker = WorkerState::new(0);

        worker.push_back(item(1));
        worker.push_back(item(2));
        worker.push_back(item(3));

        assert_eq!(worker.pop_back().map(|i| i.id()), Some(3));
        assert_eq!(worker.steal_front().map(|i| i.id()), Some(1));
        assert_eq!(worker.pop_back().map(|i| i.id()), Some(2));
        assert!(!worker.has_queued_work());
    }

    #[test]
    fn submitted_work_lands_where_thieves_look_first() {
        let worker = WorkerState::new(0);

        worker.push_back(item(1));
        worker.push_front(item(2));

        assert_eq!(worker.steal_front().map(|i| i.id()), Some(2));
    }

    #[test]
    fn push_front_all_tracks_depth() {
        let worker = WorkerState::new(0);

        worker.push_front_all([item(1), item(2), item(3)]);

        assert!(worker.has_queued_work());
        assert_eq!(worker.clear(), 3);
        assert!(!worker.has_queued_work());
    }

    #[test]
    fn status_round_trips() {
        let worker = WorkerState::new(0);

        for status in [
            WorkerStatus::Working,
            WorkerStatus::WaitingForWork,
            WorkerStatus::RunningLogic,
        ] {
            worker.set_status(status);
            assert_eq!(worker.status(), status);
        }
    }
}
