//! Configuration of a scheduler before its worker threads start.

use std::num::NonZero;

use many_cpus::SystemHardware;
use new_zealand::nz;

use crate::Scheduler;

const DEFAULT_THREAD_NAME_PREFIX: &str = "lbs";

/// Builder for configuring a [`Scheduler`].
///
/// # Example
///
/// ```rust
/// use lbs::Scheduler;
/// use new_zealand::nz;
///
/// let scheduler = Scheduler::builder()
///     .thread_count(nz!(4))
///     .thread_name_prefix("render-jobs")
///     .build();
///
/// assert_eq!(scheduler.thread_count(), 4);
/// ```
#[derive(Debug)]
#[must_use]
pub struct SchedulerBuilder {
    thread_count: Option<NonZero<usize>>,
    thread_name_prefix: String,
}

impl SchedulerBuilder {
    pub(crate) fn new() -> Self {
        Self {
            thread_count: None,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_owned(),
        }
    }

    /// Sets the number of worker threads.
    ///
    /// Default is one thread per processor available to the process, honoring any processor
    /// affinity and resource quota the process is subject to.
    pub fn thread_count(mut self, count: NonZero<usize>) -> Self {
        self.thread_count = Some(count);
        self
    }

    /// Sets the prefix of worker thread names. Workers are named `{prefix}-w{index}`.
    ///
    /// Default is `lbs`.
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Builds the scheduler and starts its worker threads.
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to spawn a worker thread.
    #[must_use]
    pub fn build(self) -> Scheduler {
        let thread_count = self.thread_count.unwrap_or_else(default_thread_count);

        Scheduler::start(thread_count, &self.thread_name_prefix)
    }
}

fn default_thread_count() -> NonZero<usize> {
    // A processor set is never empty, the fallback only satisfies the type.
    NonZero::new(SystemHardware::current().processors().len()).unwrap_or(nz!(1))
}
