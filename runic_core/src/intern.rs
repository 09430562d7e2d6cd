//! String interning for symbol names.
//!
//! Parsers, the global registry and the tag store all hold many copies of
//! the same short identifiers. The interner stores one `Arc<str>` per unique
//! string so registries can clone handles instead of strings. Unlike symbol
//! resolution (which happens only at compile time), interning may be called
//! from registration paths on multiple threads, so the map is behind a lock.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Deduplicating store of `Arc<str>` names.
#[derive(Debug, Default)]
pub struct StringInterner {
    map: RwLock<FxHashMap<Arc<str>, ()>>,
}

impl StringInterner {
    /// Create an empty interner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning the shared handle.
    ///
    /// Repeated calls with equal content return clones of the same
    /// allocation.
    pub fn intern(&self, s: &str) -> Arc<str> {
        if let Some((existing, _)) = self.map.read().get_key_value(s) {
            return existing.clone();
        }
        let mut map = self.map.write();
        if let Some((existing, _)) = map.get_key_value(s) {
            return existing.clone();
        }
        let arc: Arc<str> = Arc::from(s);
        map.insert(arc.clone(), ());
        arc
    }

    /// Number of unique strings stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Check if the interner is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}
