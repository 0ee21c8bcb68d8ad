//! Splittable units of iteration work.

use std::fmt;
use std::num::NonZero;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use new_zealand::nz;

/// Identifies one logical task across all of its split pieces.
pub(crate) type TaskId = u64;

/// Callback invoked once per index, with the index of the worker running it.
pub(crate) type WorkFn = Arc<dyn Fn(usize, usize) + Send + Sync + 'static>;

/// Chunk size used by single-shot tasks.
pub(crate) const SINGLE_CHUNK: NonZero<usize> = nz!(1);

/// Outcome of one [`WorkItem::do_work`] call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct WorkProgress {
    /// How many indexes the callback was invoked for.
    pub(crate) executed: usize,

    /// Whether this piece has nothing left to run.
    pub(crate) exhausted: bool,
}

/// State shared by all pieces of one run of a logical task.
#[derive(Debug)]
struct RunState {
    /// Starts at the task's total iteration count. Every executed index is subtracted exactly
    /// once, so it reaches zero when the last index of the last piece has run.
    outstanding: AtomicUsize,

    /// Set when a callback asked for the whole task to run again instead of finishing.
    rerun_requested: AtomicBool,
}

/// A piece of a logical task: the range `[cursor, cursor + remaining)` plus the callback.
///
/// Pieces produced by [`split()`][Self::split] share the callback and the run state with the
/// piece they were split from. Every piece also remembers the full range of the task, which
/// is what a rerun starts over from.
pub(crate) struct WorkItem {
    id: TaskId,
    start: usize,
    count: usize,
    cursor: usize,
    remaining: usize,
    chunk_size: NonZero<usize>,
    callback: WorkFn,
    run: Arc<RunState>,
}

impl WorkItem {
    pub(crate) fn new(
        id: TaskId,
        start: usize,
        count: usize,
        chunk_size: NonZero<usize>,
        callback: WorkFn,
    ) -> Self {
        Self {
            id,
            start,
            count,
            cursor: start,
            remaining: count,
            chunk_size,
            callback,
            run: Arc::new(RunState {
                outstanding: AtomicUsize::new(count),
                rerun_requested: AtomicBool::new(false),
            }),
        }
    }

    /// A single-iteration item that does nothing. Used to nudge workers during shutdown.
    pub(crate) fn noop(id: TaskId) -> Self {
        Self::new(id, 0, 1, SINGLE_CHUNK, Arc::new(|_, _| {}))
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    pub(crate) fn remaining(&self) -> usize {
        self.remaining
    }

    pub(crate) fn can_split(&self) -> bool {
        self.remaining > self.chunk_size.get()
    }

    /// Moves the upper half of the remaining range into a new piece.
    ///
    /// When the remaining count is odd, the extra index goes to the new piece.
    #[expect(clippy::integer_division, reason = "odd remainder goes to the new piece")]
    #[expect(
        clippy::arithmetic_side_effects,
        reason = "kept <= remaining and the cursor never passes the submitted range end"
    )]
    pub(crate) fn split(&mut self) -> Self {
        debug_assert!(self.can_split(), "split() called on a piece that cannot split");

        let kept = self.remaining / 2;
        let moved = self.remaining - kept;

        self.remaining = kept;

        Self {
            id: self.id,
            start: self.start,
            count: self.count,
            cursor: self.cursor + kept,
            remaining: moved,
            chunk_size: self.chunk_size,
            callback: Arc::clone(&self.callback),
            run: Arc::clone(&self.run),
        }
    }

    /// Runs up to one chunk of indexes starting at the cursor.
    #[expect(
        clippy::arithmetic_side_effects,
        reason = "executed <= remaining and the cursor never passes the submitted range end"
    )]
    pub(crate) fn do_work(&mut self, worker_index: usize) -> WorkProgress {
        let executed = self.remaining.min(self.chunk_size.get());

        for index in self.cursor..self.cursor + executed {
            (self.callback)(index, worker_index);
        }

        self.cursor += executed;
        self.remaining -= executed;

        WorkProgress {
            executed,
            exhausted: self.remaining == 0,
        }
    }

    /// Subtracts `executed` from the shared counter.
    ///
    /// Returns true for exactly one call per logical task: the one that brings the counter to
    /// zero. A logical task with zero iterations reports zero once and is finished by it.
    ///
    /// # Panics
    ///
    /// Panics if more indexes are reported than the logical task had left, which would mean
    /// an index was executed twice.
    pub(crate) fn report_completed(&self, executed: usize) -> bool {
        // AcqRel: the last reporter must observe every other piece's callback side effects
        // before it announces the task, and publish its own.
        let previous = self.run.outstanding.fetch_sub(executed, Ordering::AcqRel);

        assert!(
            previous >= executed,
            "task {} reported {executed} executed indexes with only {previous} outstanding",
            self.id
        );

        previous == executed
    }

    /// Marks the current run of the logical task to be repeated once all its pieces finish.
    ///
    /// Must be called before this piece reports its executed indexes, so the last reporter
    /// observes the request.
    pub(crate) fn request_rerun(&self) {
        // Published by the AcqRel decrement in report_completed().
        self.run.rerun_requested.store(true, Ordering::Relaxed);
    }

    /// For the piece that finished the run: a fresh item over the task's full range if a rerun
    /// was requested. The fresh item starts a new run with its own counter and flag.
    pub(crate) fn take_rerun(&self) -> Option<Self> {
        if !self.run.rerun_requested.swap(false, Ordering::Relaxed) {
            return None;
        }

        Some(Self::new(
            self.id,
            self.start,
            self.count,
            self.chunk_size,
            Arc::clone(&self.callback),
        ))
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("cursor", &self.cursor)
            .field("remaining", &self.remaining)
            .field("chunk_size", &self.chunk_size)
            .field(
                "outstanding",
                &self.run.outstanding.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}
