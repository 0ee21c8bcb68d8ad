//! Dependency name sets as seen by callers and by the registry.

use smallvec::SmallVec;

use crate::{Keyword, KeywordTable};

/// A set of dependency names that must all be observed fulfilled before something proceeds.
///
/// Used both as the "run only after" set of a task and as the "announce only after" set that
/// gates a finished task's own name. An empty set is always satisfied.
///
/// Names keep their insertion order and duplicates are collapsed.
///
/// # Example
///
/// ```rust
/// use lbs::Requirements;
///
/// let none = Requirements::new();
/// assert!(none.is_empty());
///
/// let both = Requirements::from(["geometry", "textures", "geometry"]);
/// assert_eq!(both.len(), 2);
/// assert_eq!(both.iter().collect::<Vec<_>>(), ["geometry", "textures"]);
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Requirements {
    names: Vec<String>,
}

impl Requirements {
    /// Creates an empty set, which is always satisfied.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a name to the set. Adding a name that is already present does nothing.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>) -> Self {
        self.insert(name.into());
        self
    }

    /// Whether the set contains no names.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Number of distinct names in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Iterates over the names in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    fn insert(&mut self, name: String) {
        if !self.names.contains(&name) {
            self.names.push(name);
        }
    }

    pub(crate) fn intern(&self, keywords: &KeywordTable) -> PendingKeys {
        PendingKeys {
            keys: self.iter().map(|name| keywords.intern(name)).collect(),
        }
    }
}

impl<S: Into<String>> FromIterator<S> for Requirements {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut result = Self::new();

        for name in iter {
            result.insert(name.into());
        }

        result
    }
}

impl<const N: usize> From<[&str; N]> for Requirements {
    fn from(names: [&str; N]) -> Self {
        names.into_iter().collect()
    }
}

impl From<&[&str]> for Requirements {
    fn from(names: &[&str]) -> Self {
        names.iter().copied().collect()
    }
}

impl From<Vec<String>> for Requirements {
    fn from(names: Vec<String>) -> Self {
        names.into_iter().collect()
    }
}

impl From<&str> for Requirements {
    fn from(name: &str) -> Self {
        Self::new().with(name)
    }
}

impl From<String> for Requirements {
    fn from(name: String) -> Self {
        Self::new().with(name)
    }
}

/// Describes a task by its name and its two requirement sets.
///
/// `pre` must be fulfilled before the task starts. Once the task has finished (all of its
/// split pieces), `post` must also be fulfilled before the task's own name is announced.
///
/// # Example
///
/// ```rust
/// use lbs::TaskDesc;
///
/// let desc = TaskDesc::new("shade").pre(["cull", "upload"]).post("present_ready");
///
/// assert_eq!(desc.name(), "shade");
/// assert_eq!(desc.pre_requirements().len(), 2);
/// assert_eq!(desc.post_requirements().len(), 1);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskDesc {
    name: String,
    pre: Requirements,
    post: Requirements,
}

impl TaskDesc {
    /// Creates a descriptor with no requirements.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pre: Requirements::new(),
            post: Requirements::new(),
        }
    }

    /// Sets the names that must be fulfilled before the task starts.
    #[must_use]
    pub fn pre(mut self, pre: impl Into<Requirements>) -> Self {
        self.pre = pre.into();
        self
    }

    /// Sets the names that must be fulfilled before the finished task announces its name.
    #[must_use]
    pub fn post(mut self, post: impl Into<Requirements>) -> Self {
        self.post = post.into();
        self
    }

    /// The name announced when the task has finished.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The names that gate the start of the task.
    #[must_use]
    pub fn pre_requirements(&self) -> &Requirements {
        &self.pre
    }

    /// The names that gate the announcement of the task's name.
    #[must_use]
    pub fn post_requirements(&self) -> &Requirements {
        &self.post
    }
}

impl From<&str> for TaskDesc {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Interned requirement set that shrinks as its keys are observed fulfilled.
///
/// Satisfied once empty.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct PendingKeys {
    keys: SmallVec<[Keyword; 4]>,
}

impl PendingKeys {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_satisfied(&self) -> bool {
        self.keys.is_empty()
    }

    pub(crate) fn keys(&self) -> &[Keyword] {
        &self.keys
    }

    /// Drops every key for which `consume` returns true.
    pub(crate) fn consume_where(&mut self, mut consume: impl FnMut(Keyword) -> bool) {
        self.keys.retain(|keyword| !consume(*keyword));
    }
}

impl FromIterator<Keyword> for PendingKeys {
    fn from_iter<I: IntoIterator<Item = Keyword>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Requirements: Send, Sync, Clone);
    assert_impl_all!(TaskDesc: Send, Sync, Clone);

    #[test]
    fn empty_by_default() {
        let requirements = Requirements::new();

        assert!(requirements.is_empty());
        assert_eq!(requirements.len(), 0);
    }

    #[test]
    fn duplicates_are_collapsed() {
        let requirements: Requirements = ["a", "b", "a", "c", "b"].into();

        assert_eq!(requirements.iter().collect::<Vec<_>>(), ["a", "b", "c"]);
    }

    #[test]
    fn conversions_agree() {
        let from_array = Requirements::from(["x", "y"]);
        let from_slice = Requirements::from(&["x", "y"][..]);
        let from_vec = Requirements::from(vec!["x".to_owned(), "y".to_owned()]);
        let from_with = Requirements::from("x").with("y");

        assert_eq!(from_array, from_slice);
        assert_eq!(from_array, from_vec);
        assert_eq!(from_array, from_with);
    }

    #[test]
    fn intern_maps_names_to_table_handles() {
        let table = KeywordTable::new();
        let known = table.intern("b");

        let pending = Requirements::from(["a", "b"]).intern(&table);

        assert_eq!(pending.keys().len(), 2);
        assert_eq!(pending.keys()[1], known);
        assert!(!pending.is_satisfied());
    }

    #[test]
    fn consume_where_shrinks_until_satisfied() {
        let table = KeywordTable::new();
        let a = table.intern("a");
        let mut pending = Requirements::from(["a", "b"]).intern(&table);

        pending.consume_where(|keyword| keyword == a);
        assert_eq!(pending.keys().len(), 1);
        assert!(!pending.is_satisfied());

        pending.consume_where(|_| true);
        assert!(pending.is_satisfied());
    }

    #[test]
    fn task_desc_builder_sets_both_sets() {
        let desc = TaskDesc::new("t").pre("a").post(["b", "c"]);

        assert_eq!(desc.name(), "t");
        assert_eq!(desc.pre_requirements(), &Requirements::from("a"));
        assert_eq!(desc.post_requirements(), &Requirements::from(["b", "c"]));
    }

    #[test]
    fn task_desc_from_name_has_no_requirements() {
        let desc = TaskDesc::from("solo");

        assert!(desc.pre_requirements().is_empty());
        assert!(desc.post_requirements().is_empty());
    }
}
