//! The host-wide shared registry.
//!
//! One [`ScriptGlobal`] is created by the host at startup, populated during
//! the init phase (types, tag kinds, tag value types, shared constants) and
//! frozen before any script is parsed or executed. It is passed explicitly
//! wherever it is needed; there are no process-wide singletons.

use crate::argkind::{ArgKind, BaseType};
use crate::error::ConfigError;
use crate::intern::StringInterner;
use crate::tags::Tag;
use crate::value::ScriptValue;
use rustc_hash::FxHashMap;
use std::any::TypeId;
use std::sync::Arc;

/// A host type that scripts can hold pointers to.
///
/// Implemented by the host for every object type it exposes; the name is
/// how the type appears in script source and diagnostics.
pub trait ScriptObject: 'static {
    /// Script-visible name of the type.
    const SCRIPT_NAME: &'static str;
}

/// Adapter parsing one tag payload into a slot value.
pub type TagLoadFn = fn(&ScriptGlobal, &mut i64, &str) -> bool;

/// Adapter serializing one slot value; `None` declines.
pub type TagSaveFn = fn(&ScriptGlobal, i64) -> Option<String>;

/// A named pair of tag load/save adapters.
pub struct TagValueType {
    name: Arc<str>,
    load: TagLoadFn,
    save: TagSaveFn,
}

impl TagValueType {
    /// The adapter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the load adapter.
    pub fn load(&self, global: &ScriptGlobal, value: &mut i64, payload: &str) -> bool {
        (self.load)(global, value, payload)
    }

    /// Run the save adapter.
    #[must_use]
    pub fn save(&self, global: &ScriptGlobal, value: i64) -> Option<String> {
        (self.save)(global, value)
    }
}

/// One registered tag of a kind.
pub struct TagValueInfo {
    /// Tag name as it appears in persisted data.
    pub name: Arc<str>,
    /// Index into the value-type table.
    pub value_type: usize,
}

struct TagKindInfo {
    display_name: Arc<str>,
    limit: usize,
    values: Vec<TagValueInfo>,
}

struct TypeEntry {
    name: Arc<str>,
    base: BaseType,
}

/// Global data shared by all parsers and workers.
pub struct ScriptGlobal {
    interner: StringInterner,
    types: Vec<TypeEntry>,
    types_by_id: FxHashMap<TypeId, BaseType>,
    types_by_name: FxHashMap<Arc<str>, BaseType>,
    next_base: BaseType,
    refs: FxHashMap<Arc<str>, ScriptValue>,
    tag_kinds: FxHashMap<BaseType, TagKindInfo>,
    value_types: Vec<TagValueType>,
    next_parser_id: u32,
}

impl ScriptGlobal {
    /// Create a registry with the built-in `int` tag value type.
    #[must_use]
    pub fn new() -> Self {
        let mut global = Self {
            interner: StringInterner::new(),
            types: Vec::new(),
            types_by_id: FxHashMap::default(),
            types_by_name: FxHashMap::default(),
            next_base: BaseType::FIRST_HOST,
            refs: FxHashMap::default(),
            tag_kinds: FxHashMap::default(),
            value_types: Vec::new(),
            next_parser_id: 0,
        };
        global
            .register_value_type("int", load_int, save_int)
            .expect("fresh registry");
        global
    }

    /// Intern a name in the registry's string store.
    pub fn intern(&self, s: &str) -> Arc<str> {
        self.interner.intern(s)
    }

    /// Allocate a parser id.
    pub fn next_parser_id(&mut self) -> u32 {
        let id = self.next_parser_id;
        self.next_parser_id += 1;
        id
    }

    // =========================================================================
    // Types
    // =========================================================================

    fn alloc_base(&mut self, name: Arc<str>) -> BaseType {
        let base = self.next_base;
        self.next_base = self.next_base.next();
        self.types.push(TypeEntry {
            name: name.clone(),
            base,
        });
        self.types_by_name.insert(name, base);
        base
    }

    /// Register a named host type, allocating its base id.
    pub fn register_type(&mut self, name: &str) -> Result<BaseType, ConfigError> {
        let name = self.intern(name);
        if self.types_by_name.contains_key(&name) {
            return Err(ConfigError::DuplicateName { name });
        }
        Ok(self.alloc_base(name))
    }

    /// Register a host object type, keyed by its Rust `TypeId`.
    ///
    /// Idempotent: repeated registration returns the same base id.
    pub fn register_object_type<T: ScriptObject>(&mut self) -> BaseType {
        let id = TypeId::of::<T>();
        if let Some(&base) = self.types_by_id.get(&id) {
            return base;
        }
        let name = self.intern(T::SCRIPT_NAME);
        let base = self.alloc_base(name);
        self.types_by_id.insert(id, base);
        base
    }

    /// The base id registered for an object type, if any.
    #[must_use]
    pub fn base_for<T: ScriptObject>(&self) -> Option<BaseType> {
        self.types_by_id.get(&TypeId::of::<T>()).copied()
    }

    /// Script-visible name of a base type.
    #[must_use]
    pub fn type_name(&self, base: BaseType) -> &str {
        match base {
            BaseType::NULL => "null",
            BaseType::INT => "int",
            BaseType::LABEL => "label",
            BaseType::TEXT => "text",
            _ => self
                .types
                .iter()
                .find(|t| t.base == base)
                .map_or("<unknown>", |t| &t.name),
        }
    }

    // =========================================================================
    // Shared constants
    // =========================================================================

    /// Add a shared constant visible to every parser.
    pub fn add_const(&mut self, name: &str, value: ScriptValue) -> Result<(), ConfigError> {
        let name = self.intern(name);
        if self.refs.contains_key(&name) {
            return Err(ConfigError::DuplicateName { name });
        }
        self.refs.insert(name, value);
        Ok(())
    }

    /// Look up a shared constant.
    #[must_use]
    pub fn get_ref(&self, name: &str) -> Option<ScriptValue> {
        self.refs.get(name).copied()
    }

    // =========================================================================
    // Tags
    // =========================================================================

    /// Register a tag kind for a host object type.
    ///
    /// Idempotent. Returns the base id of the kind's tag values.
    pub fn add_tag_kind<T: ScriptObject>(&mut self) -> BaseType {
        let id = TypeId::of::<Tag<T>>();
        if let Some(&base) = self.types_by_id.get(&id) {
            return base;
        }
        let display_name = self.intern(T::SCRIPT_NAME);
        let name = self.intern(&format!("Tag<{}>", T::SCRIPT_NAME));
        let base = self.alloc_base(name);
        self.types_by_id.insert(id, base);
        self.tag_kinds.insert(
            base,
            TagKindInfo {
                display_name,
                limit: Tag::<T>::LIMIT,
                values: Vec::new(),
            },
        );
        base
    }

    /// The base id of a registered tag kind.
    #[must_use]
    pub fn tag_base_for<T: ScriptObject>(&self) -> Option<BaseType> {
        self.types_by_id.get(&TypeId::of::<Tag<T>>()).copied()
    }

    /// Register a named tag value type (load/save adapter pair).
    pub fn register_value_type(
        &mut self,
        name: &str,
        load: TagLoadFn,
        save: TagSaveFn,
    ) -> Result<usize, ConfigError> {
        let name = self.intern(name);
        if self.value_types.iter().any(|vt| vt.name == name) {
            return Err(ConfigError::DuplicateName { name });
        }
        self.value_types.push(TagValueType { name, load, save });
        Ok(self.value_types.len() - 1)
    }

    /// Add a tag to a registered kind, publishing the `Tag.NAME` constant.
    pub fn add_tag<T: ScriptObject>(
        &mut self,
        name: &str,
        value_type: &str,
    ) -> Result<Tag<T>, ConfigError> {
        let base = self
            .tag_base_for::<T>()
            .unwrap_or_else(|| self.add_tag_kind::<T>());
        let value_type = self
            .value_types
            .iter()
            .position(|vt| &*vt.name == value_type)
            .ok_or_else(|| ConfigError::UnknownTagValueType {
                name: self.intern(value_type),
            })?;

        let name = self.intern(name);
        let ref_name = self.intern(&format!("Tag.{name}"));
        if self.refs.contains_key(&ref_name) {
            return Err(ConfigError::DuplicateTagName { name });
        }

        let kind = self.tag_kinds.get_mut(&base).expect("kind registered above");
        if kind.values.iter().any(|v| v.name == name) {
            return Err(ConfigError::DuplicateTagName { name });
        }
        if kind.values.len() >= kind.limit {
            return Err(ConfigError::TagLimitExceeded {
                kind: kind.display_name.clone(),
                limit: kind.limit,
            });
        }

        kind.values.push(TagValueInfo {
            name,
            value_type,
        });
        let index = kind.values.len();
        self.refs.insert(
            ref_name,
            ScriptValue::raw(index as u64, ArgKind::plain(base)),
        );
        Ok(Tag::make(index))
    }

    /// Resolve a tag name within a kind to `(index, value_type_id)`.
    #[must_use]
    pub fn tag_index(&self, kind: BaseType, name: &str) -> Option<(usize, usize)> {
        let info = self.tag_kinds.get(&kind)?;
        info.values
            .iter()
            .position(|v| &*v.name == name)
            .map(|at| (at + 1, info.values[at].value_type))
    }

    /// Metadata of a tag by index within a kind.
    #[must_use]
    pub fn tag_value_info(&self, kind: BaseType, index: usize) -> Option<&TagValueInfo> {
        self.tag_kinds
            .get(&kind)
            .and_then(|info| info.values.get(index.checked_sub(1)?))
    }

    /// A registered tag value type by id.
    ///
    /// # Panics
    ///
    /// Panics when the id was not returned by [`Self::register_value_type`].
    #[must_use]
    pub fn value_type(&self, id: usize) -> &TagValueType {
        &self.value_types[id]
    }

    /// Emit freeze-time metadata through `tracing`.
    pub fn log_metadata(&self) {
        tracing::debug!(
            types = self.types.len(),
            refs = self.refs.len(),
            tag_kinds = self.tag_kinds.len(),
            value_types = self.value_types.len(),
            "script registry frozen"
        );
    }
}

impl Default for ScriptGlobal {
    fn default() -> Self {
        Self::new()
    }
}

fn load_int(_global: &ScriptGlobal, value: &mut i64, payload: &str) -> bool {
    match payload.trim().parse::<i64>() {
        Ok(v) => {
            *value = v;
            true
        }
        Err(_) => false,
    }
}

fn save_int(_global: &ScriptGlobal, value: i64) -> Option<String> {
    Some(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Creature;

    impl ScriptObject for Creature {
        const SCRIPT_NAME: &'static str = "Creature";
    }

    struct Item;

    impl ScriptObject for Item {
        const SCRIPT_NAME: &'static str = "Item";
    }

    #[test]
    fn test_object_type_registration_is_idempotent() {
        let mut global = ScriptGlobal::new();
        let a = global.register_object_type::<Creature>();
        let b = global.register_object_type::<Creature>();
        assert_eq!(a, b);
        assert_eq!(global.type_name(a), "Creature");
    }

    #[test]
    fn test_distinct_types_get_distinct_bases() {
        let mut global = ScriptGlobal::new();
        let a = global.register_object_type::<Creature>();
        let b = global.register_object_type::<Item>();
        assert_ne!(a, b);
    }

    #[test]
    fn test_named_type_duplicate_rejected() {
        let mut global = ScriptGlobal::new();
        global.register_type("Rule").unwrap();
        assert!(matches!(
            global.register_type("Rule"),
            Err(ConfigError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_builtin_type_names() {
        let global = ScriptGlobal::new();
        assert_eq!(global.type_name(BaseType::INT), "int");
        assert_eq!(global.type_name(BaseType::NULL), "null");
        assert_eq!(global.type_name(BaseType(200)), "<unknown>");
    }

    #[test]
    fn test_shared_const() {
        let mut global = ScriptGlobal::new();
        global.add_const("MAX_SHADE", ScriptValue::int(15)).unwrap();
        assert_eq!(global.get_ref("MAX_SHADE").unwrap().as_int(), Some(15));
        assert!(global.add_const("MAX_SHADE", ScriptValue::int(0)).is_err());
        assert!(global.get_ref("MISSING").is_none());
    }

    #[test]
    fn test_tag_kind_distinct_from_object_type() {
        let mut global = ScriptGlobal::new();
        let obj = global.register_object_type::<Creature>();
        let tag = global.add_tag_kind::<Creature>();
        assert_ne!(obj, tag);
        assert_eq!(global.tag_base_for::<Creature>(), Some(tag));
    }

    #[test]
    fn test_add_tag_publishes_constant() {
        let mut global = ScriptGlobal::new();
        let base = global.add_tag_kind::<Creature>();
        let tag = global.add_tag::<Creature>("RAGE", "int").unwrap();
        assert!(tag.is_valid());
        assert_eq!(tag.get(), 1);

        let c = global.get_ref("Tag.RAGE").unwrap();
        assert_eq!(c.kind(), ArgKind::plain(base));
        assert_eq!(c.bits(), 1);
    }

    #[test]
    fn test_add_tag_duplicate_rejected() {
        let mut global = ScriptGlobal::new();
        global.add_tag_kind::<Creature>();
        global.add_tag::<Creature>("RAGE", "int").unwrap();
        assert!(matches!(
            global.add_tag::<Creature>("RAGE", "int"),
            Err(ConfigError::DuplicateTagName { .. })
        ));
    }

    #[test]
    fn test_add_tag_unknown_value_type() {
        let mut global = ScriptGlobal::new();
        global.add_tag_kind::<Creature>();
        assert!(matches!(
            global.add_tag::<Creature>("RAGE", "flavor"),
            Err(ConfigError::UnknownTagValueType { .. })
        ));
    }

    #[test]
    fn test_tag_index_lookup() {
        let mut global = ScriptGlobal::new();
        let base = global.add_tag_kind::<Creature>();
        global.add_tag::<Creature>("RAGE", "int").unwrap();
        global.add_tag::<Creature>("LUCK", "int").unwrap();

        assert_eq!(global.tag_index(base, "LUCK"), Some((2, 0)));
        assert_eq!(global.tag_index(base, "NOPE"), None);
        assert_eq!(global.tag_value_info(base, 2).unwrap().name.as_ref(), "LUCK");
        assert!(global.tag_value_info(base, 0).is_none());
    }

    #[test]
    fn test_parser_ids_increase() {
        let mut global = ScriptGlobal::new();
        assert_eq!(global.next_parser_id(), 0);
        assert_eq!(global.next_parser_id(), 1);
    }
}
