//! Utility types.

use std::fmt;

type BuildHasher = std::hash::BuildHasherDefault<rustc_hash::FxHasher>;

pub type Map<K, V> = indexmap::IndexMap<K, V, BuildHasher>;
pub type Set<T> = indexmap::IndexSet<T, BuildHasher>;

/// A set of interned symbol ids, used for FIRST/FOLLOW sets and lookaheads.
#[derive(Default, Clone, PartialEq, Eq)]
pub(crate) struct TerminalSet {
    inner: bit_set::BitSet,
}

impl TerminalSet {
    pub(crate) fn contains(&self, id: u32) -> bool {
        self.inner.contains(id as usize)
    }

    pub(crate) fn insert(&mut self, id: u32) -> bool {
        self.inner.insert(id as usize)
    }

    pub(crate) fn union_with(&mut self, other: &Self) {
        self.inner.union_with(&other.inner)
    }

    pub(crate) fn is_superset(&self, other: &Self) -> bool {
        self.inner.is_superset(&other.inner)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.inner.iter().map(|raw| raw as u32)
    }
}

impl FromIterator<u32> for TerminalSet {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = u32>,
    {
        Self {
            inner: iter.into_iter().map(|id| id as usize).collect(),
        }
    }
}

impl fmt::Debug for TerminalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
