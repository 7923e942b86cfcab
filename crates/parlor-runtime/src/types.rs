//! Utility types.

type BuildHasher = std::hash::BuildHasherDefault<rustc_hash::FxHasher>;

/// Insertion-ordered map used for every table keyed by small integers or names.
pub type Map<K, V> = indexmap::IndexMap<K, V, BuildHasher>;
