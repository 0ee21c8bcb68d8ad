//! Human-readable snapshot of work waiting on unfulfilled names.

use std::fmt;

/// Snapshot of everything the scheduler is holding back, taken by
/// [`Scheduler::pending_report()`][crate::Scheduler::pending_report].
///
/// A caller blocked in [`sleep_till_keywords()`][crate::Scheduler::sleep_till_keywords] that
/// never wakes up is almost always waiting for a name nothing will ever announce. This report
/// shows what is parked and which names it still needs.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PendingReport {
    pub(crate) parked_tasks: Vec<ParkedTask>,
    pub(crate) parked_announcements: Vec<ParkedAnnouncement>,
    pub(crate) fulfilled: Vec<String>,
}

impl PendingReport {
    /// Tasks that have not started because some of their pre-requirements are missing.
    #[must_use]
    pub fn parked_tasks(&self) -> &[ParkedTask] {
        &self.parked_tasks
    }

    /// Finished tasks whose name is not announced yet because of missing post-requirements.
    #[must_use]
    pub fn parked_announcements(&self) -> &[ParkedAnnouncement] {
        &self.parked_announcements
    }

    /// Names that are announced but not yet consumed by any waiter.
    #[must_use]
    pub fn fulfilled(&self) -> &[String] {
        &self.fulfilled
    }

    /// Whether nothing is parked.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.parked_tasks.is_empty() && self.parked_announcements.is_empty()
    }
}

impl fmt::Display for PendingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_idle() {
            return writeln!(f, "nothing is parked");
        }

        for task in &self.parked_tasks {
            writeln!(
                f,
                "task {} ({}) waits for: {}",
                task.task_id,
                task.task_name.as_deref().unwrap_or("<internal>"),
                task.waiting_for.join(", ")
            )?;
        }

        for announcement in &self.parked_announcements {
            writeln!(
                f,
                "announcement of {} waits for: {}",
                announcement.name,
                announcement.waiting_for.join(", ")
            )?;
        }

        writeln!(f, "unconsumed: {}", self.fulfilled.join(", "))
    }
}

/// A task held back by its pre-requirements.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParkedTask {
    pub(crate) task_id: u64,
    pub(crate) task_name: Option<String>,
    pub(crate) waiting_for: Vec<String>,
}

impl ParkedTask {
    /// Scheduler-assigned ID of the task.
    #[must_use]
    pub fn task_id(&self) -> u64 {
        self.task_id
    }

    /// Name the task will announce, `None` for the scheduler's own internal tasks.
    #[must_use]
    pub fn task_name(&self) -> Option<&str> {
        self.task_name.as_deref()
    }

    /// Names not observed yet.
    #[must_use]
    pub fn waiting_for(&self) -> &[String] {
        &self.waiting_for
    }
}

/// A finished task whose name is held back by its post-requirements.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParkedAnnouncement {
    pub(crate) name: String,
    pub(crate) waiting_for: Vec<String>,
}

impl ParkedAnnouncement {
    /// Name that will be announced.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names not observed yet.
    #[must_use]
    pub fn waiting_for(&self) -> &[String] {
        &self.waiting_for
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn empty_report_is_idle() {
        let report = PendingReport::default();

        assert!(report.is_idle());
        assert_eq!(report.to_string(), "nothing is parked\n");
    }

    #[test]
    fn display_lists_every_entry() {
        let report = PendingReport {
            parked_tasks: vec![ParkedTask {
                task_id: 4,
                task_name: Some("render".to_owned()),
                waiting_for: vec!["cull".to_owned(), "upload".to_owned()],
            }],
            parked_announcements: vec![ParkedAnnouncement {
                name: "cull".to_owned(),
                waiting_for: vec!["late".to_owned()],
            }],
            fulfilled: vec!["misc".to_owned()],
        };

        assert!(!report.is_idle());
        assert_eq!(
            report.to_string(),
            "task 4 (render) waits for: cull, upload\n\
             announcement of cull waits for: late\n\
             unconsumed: misc\n"
        );
    }
}
