//! Interning of dependency names into small integer handles.

use std::fmt;
use std::sync::Arc;

use foldhash::{HashMap, HashMapExt};
use parking_lot::RwLock;

/// Interned handle for one dependency name.
///
/// Handles are dense indexes starting at zero, assigned in order of first use, so the
/// dependency registry can keep its fulfilled flags in a plain vector.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct Keyword(u32);

impl Keyword {
    pub(crate) fn from_index(index: u32) -> Self {
        Self(index)
    }

    #[must_use]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Default)]
struct TableState {
    by_name: HashMap<Arc<str>, Keyword>,
    names: Vec<Arc<str>>,
}

/// Concurrent string to [`Keyword`] table.
///
/// Lookups of already known names only take the shared lock. A name is never removed once
/// interned, so a handle stays valid for the lifetime of the table.
pub(crate) struct KeywordTable {
    state: RwLock<TableState>,
}

impl KeywordTable {
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(TableState {
                by_name: HashMap::new(),
                names: Vec::new(),
            }),
        }
    }

    /// Returns the handle for `name`, allocating the next free one on first use.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` distinct names are interned.
    pub(crate) fn intern(&self, name: &str) -> Keyword {
        if let Some(keyword) = self.state.read().by_name.get(name) {
            return *keyword;
        }

        let mut state = self.state.write();

        // Someone else may have interned it between our read and write lock.
        if let Some(keyword) = state.by_name.get(name) {
            return *keyword;
        }

        let next = u32::try_from(state.names.len())
            .expect("interned more than u32::MAX dependency names: keyword space exhausted");
        let keyword = Keyword(next);
        let name: Arc<str> = Arc::from(name);

        state.names.push(Arc::clone(&name));
        state.by_name.insert(name, keyword);

        keyword
    }

    /// Resolves a handle back to its name.
    ///
    /// Returns `None` only for handles that did not come from this table.
    pub(crate) fn name(&self, keyword: Keyword) -> Option<Arc<str>> {
        self.state.read().names.get(keyword.index()).cloned()
    }

    /// Resolves a handle to its name, falling back to the numeric form for logging.
    pub(crate) fn display_name(&self, keyword: Keyword) -> String {
        self.name(keyword)
            .map_or_else(|| keyword.to_string(), |name| name.to_string())
    }

    pub(crate) fn len(&self) -> usize {
        self.state.read().names.len()
    }
}

impl fmt::Debug for KeywordTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeywordTable")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn intern_assigns_dense_handles_in_order() {
        let table = KeywordTable::new();

        let a = table.intern("a");
        let b = table.intern("b");
        let c = table.intern("c");

        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(c.index(), 2);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn intern_same_name_returns_same_handle() {
        let table = KeywordTable::new();

        let first = table.intern("frame");
        let second = table.intern("frame");

        assert_eq!(first, second);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn name_resolves_back() {
        let table = KeywordTable::new();

        let keyword = table.intern("upload");

        assert_eq!(table.name(keyword).as_deref(), Some("upload"));
        assert_eq!(table.display_name(keyword), "upload");
    }

    #[test]
    fn foreign_handle_has_no_name() {
        let table = KeywordTable::new();
        let other = KeywordTable::new();

        other.intern("x");
        let foreign = other.intern("y");

        assert!(table.name(foreign).is_none());
        assert_eq!(table.display_name(foreign), "#1");
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn concurrent_interning_agrees_on_handles() {
        let table = Arc::new(KeywordTable::new());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    (0..100)
                        .map(|i| table.intern(&format!("name-{i}")))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for result in &results[1..] {
            assert_eq!(result, &results[0]);
        }
        assert_eq!(table.len(), 100);
    }
}
