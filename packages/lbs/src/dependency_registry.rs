//! Bookkeeping of fulfilled names and of work waiting for them.

use std::mem;

use foldhash::{HashMap, HashMapExt};

use crate::{
    Keyword, KeywordTable, ParkedAnnouncement, ParkedTask, PendingKeys, PendingReport, TaskId,
    WorkItem,
};

/// What happens once a submitted task has finished.
#[derive(Debug)]
pub(crate) struct TaskInfo {
    /// Announced when `post` is satisfied. Internal tasks have no name and announce nothing.
    name: Option<Keyword>,
    post: PendingKeys,
}

/// Fulfilled flags plus everything parked until more flags are raised.
///
/// The registry does not lock itself; the scheduler keeps it behind a single mutex and never
/// runs callbacks or takes a worker deque lock while holding it.
///
/// A raised flag is consumed by the first waiting set that checks it. The same name can gate
/// several waiters one after another, but every waiter needs its own fulfillment; raising a
/// flag that is already raised does not count twice.
#[derive(Debug, Default)]
pub(crate) struct DependencyRegistry {
    fulfilled: Vec<bool>,
    task_infos: HashMap<TaskId, TaskInfo>,
    waiting_for_post: Vec<(PendingKeys, Keyword)>,
    waiting_for_pre: Vec<(PendingKeys, WorkItem)>,
}

/// Consumes every raised flag in `keys` and reports whether nothing is left to wait for.
fn check_requirements(fulfilled: &mut [bool], keys: &mut PendingKeys) -> bool {
    keys.consume_where(|keyword| match fulfilled.get_mut(keyword.index()) {
        Some(flag) if *flag => {
            *flag = false;
            true
        }
        _ => false,
    });

    keys.is_satisfied()
}

impl DependencyRegistry {
    pub(crate) fn new() -> Self {
        Self {
            fulfilled: Vec::new(),
            task_infos: HashMap::new(),
            waiting_for_post: Vec::new(),
            waiting_for_pre: Vec::new(),
        }
    }

    /// Registers a new task and decides whether it may run right away.
    ///
    /// Returns the item back if `pre` is already satisfied, otherwise parks it.
    ///
    /// # Panics
    ///
    /// Panics if a task with the same ID is already registered.
    pub(crate) fn submit(
        &mut self,
        item: WorkItem,
        name: Option<Keyword>,
        mut pre: PendingKeys,
        post: PendingKeys,
    ) -> Option<WorkItem> {
        let previous = self.task_infos.insert(item.id(), TaskInfo { name, post });
        assert!(
            previous.is_none(),
            "task {} registered twice: task IDs must never be reused",
            item.id()
        );

        if check_requirements(&mut self.fulfilled, &mut pre) {
            Some(item)
        } else {
            self.waiting_for_pre.push((pre, item));
            None
        }
    }

    /// Retires the bookkeeping of a task whose last piece just finished.
    ///
    /// Returns the name to announce if the task's post set is already satisfied. Otherwise
    /// the name is parked until it is, and `None` is returned, as it is for unknown IDs and
    /// for internal tasks.
    pub(crate) fn finish_task(&mut self, id: TaskId) -> Option<Keyword> {
        let TaskInfo { name, mut post } = self.task_infos.remove(&id)?;
        let name = name?;

        if check_requirements(&mut self.fulfilled, &mut post) {
            Some(name)
        } else {
            self.waiting_for_post.push((post, name));
            None
        }
    }

    /// Raises the flag for `name` and propagates it.
    ///
    /// Parked announcements whose sets become satisfied raise their own names in turn, until
    /// nothing more changes. Returns the parked items that may now run; the caller hands them
    /// to the workers after releasing the registry lock.
    pub(crate) fn announce_fulfilled(&mut self, name: Keyword) -> Vec<WorkItem> {
        self.raise(name);

        loop {
            let fulfilled = &mut self.fulfilled;
            let Some(position) = self
                .waiting_for_post
                .iter_mut()
                .position(|(keys, _)| check_requirements(fulfilled, keys))
            else {
                break;
            };

            let (_, chained) = self.waiting_for_post.remove(position);
            self.raise(chained);
        }

        let mut released = Vec::new();

        for (mut keys, item) in mem::take(&mut self.waiting_for_pre) {
            if check_requirements(&mut self.fulfilled, &mut keys) {
                released.push(item);
            } else {
                self.waiting_for_pre.push((keys, item));
            }
        }

        released
    }

    #[expect(
        clippy::arithmetic_side_effects,
        reason = "keyword indexes come from a u32 so cannot reach usize::MAX"
    )]
    fn raise(&mut self, name: Keyword) {
        let index = name.index();

        if self.fulfilled.len() <= index {
            self.fulfilled.resize(index + 1, false);
        }

        if let Some(flag) = self.fulfilled.get_mut(index) {
            *flag = true;
        }
    }

    pub(crate) fn parked_task_count(&self) -> usize {
        self.waiting_for_pre.len()
    }

    /// Whether anything waits for a name: a task for its pre set or an announcement for its
    /// post set.
    pub(crate) fn has_parked_work(&self) -> bool {
        !self.waiting_for_pre.is_empty() || !self.waiting_for_post.is_empty()
    }

    /// Snapshot of everything still waiting, with names resolved for humans.
    pub(crate) fn pending_report(&self, keywords: &KeywordTable) -> PendingReport {
        let names = |keys: &PendingKeys| -> Vec<String> {
            keys.keys()
                .iter()
                .map(|keyword| keywords.display_name(*keyword))
                .collect()
        };

        let parked_tasks = self
            .waiting_for_pre
            .iter()
            .map(|(keys, item)| ParkedTask {
                task_id: item.id(),
                task_name: self
                    .task_infos
                    .get(&item.id())
                    .and_then(|info| info.name)
                    .map(|name| keywords.display_name(name)),
                waiting_for: names(keys),
            })
            .collect();

        let parked_announcements = self
            .waiting_for_post
            .iter()
            .map(|(keys, name)| ParkedAnnouncement {
                name: keywords.display_name(*name),
                waiting_for: names(keys),
            })
            .collect();

        let fulfilled = self
            .fulfilled
            .iter()
            .enumerate()
            .filter(|(_, raised)| **raised)
            .filter_map(|(index, _)| {
                let index = u32::try_from(index).ok()?;
                Some(keywords.display_name(Keyword::from_index(index)))
            })
            .collect();

        PendingReport {
            parked_tasks,
            parked_announcements,
            fulfilled,
        }
    }

    #[cfg(test)]
    fn is_fulfilled(&self, name: Keyword) -> bool {
        self.fulfilled.get(name.index()).copied().unwrap_or(false)
    }
}
