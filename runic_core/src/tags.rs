//! Script-visible named integer slots on host objects.
//!
//! A [`Tag`] is a small non-zero integer handle identifying one named slot
//! of a given host type. Each tagged host object carries a [`ScriptValues`]
//! holding the slot values; scripts address them through tag constants
//! published by the global registry.

use crate::global::{ScriptGlobal, ScriptObject};
use std::fmt;
use std::marker::PhantomData;

/// A typed tag handle. Zero is the null tag.
pub struct Tag<T> {
    index: u8,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Tag<T> {
    /// Maximum number of tags a kind can hold.
    pub const LIMIT: usize = u8::MAX as usize;

    /// The null tag.
    #[must_use]
    pub const fn null() -> Self {
        Self::make(0)
    }

    /// Construct a tag from a raw index. Out-of-range indexes become null.
    #[must_use]
    pub const fn make(index: usize) -> Self {
        let index = if index <= Self::LIMIT {
            index as u8
        } else {
            0
        };
        Self {
            index,
            _marker: PhantomData,
        }
    }

    /// The raw slot index.
    #[inline]
    #[must_use]
    pub const fn get(self) -> usize {
        self.index as usize
    }

    /// A tag is valid iff non-zero.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.index != 0
    }
}

impl<T> Clone for Tag<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Tag<T> {}

impl<T> PartialEq for Tag<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Tag<T> {}

impl<T> fmt::Debug for Tag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.index)
    }
}

/// Dense per-object store of tag slot values.
///
/// Indexed directly by tag index; slot 0 is never used. `get` returns 0 for
/// indexes that were never set, `set` grows the vector as needed.
pub struct ScriptValues<T> {
    values: Vec<i64>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ScriptValues<T> {
    /// An empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            values: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Get a slot value; 0 when absent or the tag is null.
    #[must_use]
    pub fn get(&self, tag: Tag<T>) -> i64 {
        let at = tag.get();
        if at == 0 {
            return 0;
        }
        self.values.get(at).copied().unwrap_or(0)
    }

    /// Set a slot value, growing the store as needed. Null tags are ignored.
    pub fn set(&mut self, tag: Tag<T>, value: i64) {
        let at = tag.get();
        if at == 0 {
            return;
        }
        if at >= self.values.len() {
            self.values.resize(at + 1, 0);
        }
        self.values[at] = value;
    }
}

impl<T: ScriptObject> ScriptValues<T> {
    /// Load slot values from an abstract key→string mapping.
    ///
    /// Keys that do not name a registered tag of this kind, and payloads the
    /// value-type adapter rejects, are skipped with a warning.
    pub fn load<'a, I>(&mut self, global: &ScriptGlobal, entries: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let Some(base) = global.tag_base_for::<T>() else {
            tracing::warn!(kind = T::SCRIPT_NAME, "tag kind not registered, values ignored");
            return;
        };
        for (key, payload) in entries {
            let Some((index, value_type)) = global.tag_index(base, key) else {
                tracing::warn!(kind = T::SCRIPT_NAME, tag = key, "unknown tag name, ignored");
                continue;
            };
            let mut value = 0;
            if global.value_type(value_type).load(global, &mut value, payload) {
                self.set(Tag::make(index), value);
            } else {
                tracing::warn!(
                    kind = T::SCRIPT_NAME,
                    tag = key,
                    payload,
                    "tag payload rejected by value type, ignored"
                );
            }
        }
    }

    /// Save nonzero slot values in index order through the value-type
    /// adapters. Slots whose adapter declines to serialize are skipped.
    #[must_use]
    pub fn save(&self, global: &ScriptGlobal) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let Some(base) = global.tag_base_for::<T>() else {
            return out;
        };
        for (index, &value) in self.values.iter().enumerate().skip(1) {
            if value == 0 {
                continue;
            }
            let Some(info) = global.tag_value_info(base, index) else {
                continue;
            };
            if let Some(payload) = global.value_type(info.value_type).save(global, value) {
                out.push((info.name.to_string(), payload));
            }
        }
        out
    }
}

impl<T> Default for ScriptValues<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global::ScriptGlobal;

    struct Creature;

    impl ScriptObject for Creature {
        const SCRIPT_NAME: &'static str = "Creature";
    }

    #[test]
    fn test_null_tag() {
        let tag: Tag<Creature> = Tag::null();
        assert!(!tag.is_valid());
        assert_eq!(tag.get(), 0);
    }

    #[test]
    fn test_make_clamps_out_of_range() {
        let tag: Tag<Creature> = Tag::make(4096);
        assert!(!tag.is_valid());
    }

    #[test]
    fn test_get_absent_is_zero() {
        let values: ScriptValues<Creature> = ScriptValues::new();
        assert_eq!(values.get(Tag::make(7)), 0);
    }

    #[test]
    fn test_set_grows() {
        let mut values: ScriptValues<Creature> = ScriptValues::new();
        values.set(Tag::make(3), 42);
        assert_eq!(values.get(Tag::make(3)), 42);
        assert_eq!(values.get(Tag::make(2)), 0);
    }

    #[test]
    fn test_set_null_is_ignored() {
        let mut values: ScriptValues<Creature> = ScriptValues::new();
        values.set(Tag::null(), 9);
        assert_eq!(values.get(Tag::null()), 0);
    }

    fn registered_global() -> ScriptGlobal {
        let mut global = ScriptGlobal::new();
        global.add_tag_kind::<Creature>();
        global.add_tag::<Creature>("RAGE", "int").unwrap();
        global.add_tag::<Creature>("LUCK", "int").unwrap();
        global
    }

    // Round-trip: load(save(v)) preserves every value while the tag names
    // stay registered.
    #[test]
    fn test_load_save_round_trip() {
        let global = registered_global();

        let mut values: ScriptValues<Creature> = ScriptValues::new();
        values.set(Tag::make(1), -3);
        values.set(Tag::make(2), 77);

        let saved = values.save(&global);
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0], ("RAGE".to_string(), "-3".to_string()));
        assert_eq!(saved[1], ("LUCK".to_string(), "77".to_string()));

        let mut reloaded: ScriptValues<Creature> = ScriptValues::new();
        reloaded.load(&global, saved.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        assert_eq!(reloaded.get(Tag::make(1)), -3);
        assert_eq!(reloaded.get(Tag::make(2)), 77);
    }

    #[test]
    fn test_load_skips_unknown_and_bad_payloads() {
        let global = registered_global();

        let mut values: ScriptValues<Creature> = ScriptValues::new();
        values.load(
            &global,
            [("RAGE", "5"), ("NO_SUCH", "1"), ("LUCK", "not a number")],
        );
        assert_eq!(values.get(Tag::make(1)), 5);
        assert_eq!(values.get(Tag::make(2)), 0);
    }

    #[test]
    fn test_save_skips_zero_slots() {
        let global = registered_global();

        let mut values: ScriptValues<Creature> = ScriptValues::new();
        values.set(Tag::make(2), 1);
        let saved = values.save(&global);
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].0, "LUCK");
    }
}
