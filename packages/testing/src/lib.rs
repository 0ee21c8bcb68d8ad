#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing and benchmarking the scheduler packages.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, mpsc};
use std::thread;
use std::time::Duration;

/// Timeout applied by [`with_watchdog`].
pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs a test with a timeout to prevent infinite hangs.
///
/// Scheduler bugs tend to show up as deadlocks or lost wakeups rather than wrong results,
/// so every test that blocks on scheduled work should run under a watchdog. If the test takes
/// longer than [`DEFAULT_WATCHDOG_TIMEOUT`] the calling test fails instead of hanging CI.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog is disabled
/// and the test function is executed directly. This allows mutation testing to properly
/// detect hanging mutations.
///
/// # Panics
///
/// Panics if the test exceeds the timeout (when not in mutation testing mode), and re-raises
/// any panic of the test itself.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// with_watchdog(|| {
///     assert_eq!(2 + 2, 4);
/// });
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    with_watchdog_timeout(DEFAULT_WATCHDOG_TIMEOUT, test_fn)
}

/// Like [`with_watchdog`] but with a custom timeout, for tests that push a lot of work
/// through the scheduler on purpose.
///
/// Miri is dramatically slower for thread synchronization, so the timeout is multiplied by
/// six under Miri to avoid false positives while still catching real hangs.
///
/// # Panics
///
/// Panics if the test exceeds the timeout, and re-raises any panic of the test itself.
pub fn with_watchdog_timeout<F, R>(timeout: Duration, test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::spawn(move || {
        let result = test_fn();
        // If this fails, the receiver has already timed out.
        drop(tx.send(result));
    });

    let timeout = if cfg!(miri) { timeout.saturating_mul(6) } else { timeout };

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_handle.join().expect("test thread should not panic");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test exceeded {timeout:?} timeout, probably deadlocked");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_handle.join() {
            Ok(()) => panic!("test thread disconnected unexpectedly"),
            Err(e) => std::panic::resume_unwind(e),
        },
    }
}

/// Thread-safe per-index visit counter for checking exactly-once execution of ranges.
///
/// # Example
///
/// ```rust
/// use testing::VisitRecorder;
///
/// let visits = VisitRecorder::new(3);
/// visits.visit(0);
/// visits.visit(2);
/// visits.visit(2);
///
/// let summary = visits.summary();
/// assert_eq!(summary.missing, vec![1]);
/// assert_eq!(summary.duplicated, vec![2]);
/// ```
pub struct VisitRecorder {
    counts: Box<[AtomicU32]>,
}

impl VisitRecorder {
    /// Creates a recorder for indexes `0..len`.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            counts: (0..len).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Records one visit of `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is outside the recorded range.
    pub fn visit(&self, index: usize) {
        self.counts
            .get(index)
            .unwrap_or_else(|| panic!("index {index} outside of recorded range"))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Number of recorded indexes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether the recorder covers no indexes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Lists the indexes that were not visited exactly once.
    #[must_use]
    pub fn summary(&self) -> VisitSummary {
        let mut summary = VisitSummary::default();

        for (index, count) in self.counts.iter().enumerate() {
            match count.load(Ordering::Relaxed) {
                0 => summary.missing.push(index),
                1 => {}
                _ => summary.duplicated.push(index),
            }
        }

        summary
    }

    /// Panics with a readable message unless every index was visited exactly once.
    ///
    /// # Panics
    ///
    /// Panics if any index was skipped or visited more than once.
    #[expect(
        clippy::arithmetic_side_effects,
        reason = "both lists are bounded by the recorder length"
    )]
    pub fn assert_exactly_once(&self) {
        let summary = self.summary();

        assert!(
            summary.is_exact(),
            "{} of {} indexes not visited exactly once: {summary}",
            summary.missing.len() + summary.duplicated.len(),
            self.len()
        );
    }
}

impl fmt::Debug for VisitRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisitRecorder")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Indexes that a [`VisitRecorder`] saw zero or multiple times.
#[derive(Debug, Default, Eq, PartialEq)]
pub struct VisitSummary {
    /// Indexes never visited.
    pub missing: Vec<usize>,

    /// Indexes visited more than once.
    pub duplicated: Vec<usize>,
}

impl VisitSummary {
    /// Whether every index was visited exactly once.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.missing.is_empty() && self.duplicated.is_empty()
    }
}

impl fmt::Display for VisitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Long lists are useless in a failure message, the first few tell the story.
        const SHOWN: usize = 8;

        write!(
            f,
            "missing {:?}, duplicated {:?}",
            self.missing.iter().take(SHOWN).collect::<Vec<_>>(),
            self.duplicated.iter().take(SHOWN).collect::<Vec<_>>()
        )
    }
}

/// Append-only log shared between tasks to observe the order they ran in.
#[derive(Debug, Default)]
pub struct OrderLog {
    entries: Mutex<Vec<String>>,
}

impl OrderLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    ///
    /// # Panics
    ///
    /// Panics if a previous writer panicked while holding the log.
    pub fn push(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .expect("order log poisoned")
            .push(entry.into());
    }

    /// Copy of all entries in the order they were appended.
    ///
    /// # Panics
    ///
    /// Panics if a previous writer panicked while holding the log.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().expect("order log poisoned").clone()
    }

    /// Position of the first occurrence of `entry`, if any.
    #[must_use]
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}
