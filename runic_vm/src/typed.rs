//! Strongly-typed parser façades.
//!
//! The runtime core is fully type-erased; these traits are the thin layer
//! that binds a compile-time `(Output, Inputs)` tuple to the declared
//! register offsets. Input tuples declare their registers at parser
//! construction and marshal host values in at worker construction; output
//! tuples copy caller slots in before execution and writable slots back out
//! after.

use runic_compiler::bytecode::{Container, ContainerEvents};
use runic_compiler::events::{EventError, ScriptParserEvents};
use runic_compiler::parser::ScriptParserBase;
use runic_core::argkind::{ArgFlags, ArgKind, BaseType};
use runic_core::error::{CompileResult, ConfigError};
use runic_core::exec::{RegisterFile, WorkerState};
use runic_core::global::{ScriptGlobal, ScriptObject};
use runic_core::tags::Tag;
use runic_core::REG_SLOT;
use std::marker::PhantomData;

/// One script input argument: its register declaration plus the marshalling
/// of the runtime value.
pub trait InputArg {
    /// The host-side value bound at worker construction.
    type Value<'h>;

    /// Declare this argument's input register.
    fn declare(
        global: &mut ScriptGlobal,
        parser: &mut ScriptParserBase,
        name: &str,
    ) -> Result<(), ConfigError>;

    /// Write the value into the worker state at the given offset.
    ///
    /// # Safety
    ///
    /// Pointer-backed values must outlive every execution that can read the
    /// state; the worker façade enforces this with its host lifetime.
    unsafe fn bind(value: Self::Value<'_>, state: &mut WorkerState, offset: u16);
}

impl InputArg for i64 {
    type Value<'h> = i64;

    fn declare(
        _global: &mut ScriptGlobal,
        parser: &mut ScriptParserBase,
        name: &str,
    ) -> Result<(), ConfigError> {
        parser.add_input(name, ArgKind::new(BaseType::INT, ArgFlags::REG))
    }

    unsafe fn bind(value: i64, state: &mut WorkerState, offset: u16) {
        state.regs.set_i64(offset, value);
    }
}

/// Marker for a read-only pointer input to a host object.
pub struct Ptr<T: ScriptObject>(PhantomData<fn() -> T>);

impl<T: ScriptObject> InputArg for Ptr<T> {
    type Value<'h> = &'h T;

    fn declare(
        global: &mut ScriptGlobal,
        parser: &mut ScriptParserBase,
        name: &str,
    ) -> Result<(), ConfigError> {
        let base = global.register_object_type::<T>();
        register_type_once(parser, T::SCRIPT_NAME, base)?;
        parser.add_input(name, ArgKind::new(base, ArgFlags::REG | ArgFlags::PTR))
    }

    unsafe fn bind(value: &T, state: &mut WorkerState, offset: u16) {
        // SAFETY: forwarded obligation, see trait contract.
        let slot = unsafe { state.push_slot_ref(value as *const T, T::SCRIPT_NAME) };
        state.regs.set_u64(offset, slot);
    }
}

/// Marker for an editable pointer input to a host object.
pub struct PtrMut<T: ScriptObject>(PhantomData<fn() -> T>);

impl<T: ScriptObject> InputArg for PtrMut<T> {
    type Value<'h> = &'h mut T;

    fn declare(
        global: &mut ScriptGlobal,
        parser: &mut ScriptParserBase,
        name: &str,
    ) -> Result<(), ConfigError> {
        let base = global.register_object_type::<T>();
        register_type_once(parser, T::SCRIPT_NAME, base)?;
        parser.add_input(name, ArgKind::new(base, ArgFlags::REG | ArgFlags::PTR_E))
    }

    unsafe fn bind(value: &mut T, state: &mut WorkerState, offset: u16) {
        // SAFETY: forwarded obligation, see trait contract.
        let slot = unsafe { state.push_slot_mut(value as *mut T, T::SCRIPT_NAME) };
        state.regs.set_u64(offset, slot);
    }
}

impl<T: ScriptObject> InputArg for Tag<T> {
    type Value<'h> = Tag<T>;

    fn declare(
        global: &mut ScriptGlobal,
        parser: &mut ScriptParserBase,
        name: &str,
    ) -> Result<(), ConfigError> {
        let base = global.add_tag_kind::<T>();
        parser.add_input(name, ArgKind::new(base, ArgFlags::REG))
    }

    unsafe fn bind(value: Tag<T>, state: &mut WorkerState, offset: u16) {
        state.regs.set_i64(offset, value.get() as i64);
    }
}

fn register_type_once(
    parser: &mut ScriptParserBase,
    name: &str,
    base: BaseType,
) -> Result<(), ConfigError> {
    match parser.register_type(name, base) {
        Ok(()) | Err(ConfigError::DuplicateName { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

/// A declared input tuple (arity ≤ 4).
pub trait InputTuple {
    /// The host-side value tuple bound at worker construction.
    type Values<'h>;
    /// Number of declared inputs.
    const COUNT: usize;

    /// Declare every input register, in order.
    fn declare(
        global: &mut ScriptGlobal,
        parser: &mut ScriptParserBase,
        names: &[&str],
    ) -> Result<(), ConfigError>;

    /// Bind every value at its offset.
    ///
    /// # Safety
    ///
    /// As [`InputArg::bind`].
    unsafe fn bind(values: Self::Values<'_>, state: &mut WorkerState, base_offset: u16);
}

macro_rules! impl_input_tuple {
    ($count:expr; $( $T:ident => $idx:tt ),*) => {
        impl<$( $T: InputArg ),*> InputTuple for ($( $T, )*) {
            type Values<'h> = ($( $T::Value<'h>, )*);
            const COUNT: usize = $count;

            #[allow(unused_variables)]
            fn declare(
                global: &mut ScriptGlobal,
                parser: &mut ScriptParserBase,
                names: &[&str],
            ) -> Result<(), ConfigError> {
                assert_eq!(names.len(), <Self as InputTuple>::COUNT, "input name count mismatch");
                $( $T::declare(global, parser, names[$idx])?; )*
                Ok(())
            }

            #[allow(unused_variables)]
            unsafe fn bind(values: Self::Values<'_>, state: &mut WorkerState, base_offset: u16) {
                // SAFETY: forwarded obligation, see trait contract.
                $( unsafe { $T::bind(values.$idx, state, base_offset + $idx as u16 * REG_SLOT as u16) }; )*
            }
        }
    };
}

impl_input_tuple!(0;);
impl_input_tuple!(1; A => 0);
impl_input_tuple!(2; A => 0, B => 1);
impl_input_tuple!(3; A => 0, B => 1, C => 2);
impl_input_tuple!(4; A => 0, B => 1, C => 2, D => 3);

/// One script output slot.
pub trait OutputSlot {
    /// The caller-side value (always an `i64` payload).
    type Value;
    /// Whether the script may write this slot.
    const WRITABLE: bool;

    /// Declare the output register.
    fn declare(parser: &mut ScriptParserBase, name: &str) -> Result<(), ConfigError>;
}

impl OutputSlot for i64 {
    type Value = i64;
    const WRITABLE: bool = true;

    fn declare(parser: &mut ScriptParserBase, name: &str) -> Result<(), ConfigError> {
        parser.add_output(name, BaseType::INT, true)
    }
}

/// A read-only output slot: set by the caller, visible to the script,
/// restored between events, never copied back.
pub struct Ro;

impl OutputSlot for Ro {
    type Value = i64;
    const WRITABLE: bool = false;

    fn declare(parser: &mut ScriptParserBase, name: &str) -> Result<(), ConfigError> {
        parser.add_output(name, BaseType::INT, false)
    }
}

/// A declared output tuple (arity ≤ 4).
pub trait OutputTuple {
    /// The caller-side value tuple.
    type Values: Copy + Default;
    /// Number of declared outputs.
    const COUNT: usize;

    /// Declare every output register, in order.
    fn declare(parser: &mut ScriptParserBase, names: &[&str]) -> Result<(), ConfigError>;

    /// Copy all caller slots into the register file.
    fn set(regs: &mut RegisterFile, values: &Self::Values);

    /// Restore only the read-only slots (between chained events).
    fn reset_readonly(regs: &mut RegisterFile, values: &Self::Values);

    /// Copy writable slots back out to the caller.
    fn get(regs: &RegisterFile, values: &mut Self::Values);
}

macro_rules! impl_output_tuple {
    ($count:expr; $( $T:ident => $idx:tt ),*) => {
        impl<$( $T: OutputSlot<Value = i64> ),*> OutputTuple for ($( $T, )*) {
            type Values = ($( $T::Value, )*);
            const COUNT: usize = $count;

            #[allow(unused_variables)]
            fn declare(parser: &mut ScriptParserBase, names: &[&str]) -> Result<(), ConfigError> {
                assert_eq!(names.len(), <Self as OutputTuple>::COUNT, "output name count mismatch");
                $( $T::declare(parser, names[$idx])?; )*
                Ok(())
            }

            #[allow(unused_variables)]
            fn set(regs: &mut RegisterFile, values: &Self::Values) {
                $( regs.set_i64($idx as u16 * REG_SLOT as u16, values.$idx); )*
            }

            #[allow(unused_variables)]
            fn reset_readonly(regs: &mut RegisterFile, values: &Self::Values) {
                $( if !$T::WRITABLE {
                    regs.set_i64($idx as u16 * REG_SLOT as u16, values.$idx);
                } )*
            }

            #[allow(unused_variables)]
            fn get(regs: &RegisterFile, values: &mut Self::Values) {
                $( if $T::WRITABLE {
                    values.$idx = regs.get_i64($idx as u16 * REG_SLOT as u16);
                } )*
            }
        }
    };
}

impl_output_tuple!(0;);
impl_output_tuple!(1; A => 0);
impl_output_tuple!(2; A => 0, B => 1);
impl_output_tuple!(3; A => 0, B => 1, C => 2);
impl_output_tuple!(4; A => 0, B => 1, C => 2, D => 3);

/// Anything a worker can execute against: a typed parser façade.
pub trait TypedParser {
    /// Declared output tuple.
    type Output: OutputTuple;
    /// Declared input tuple.
    type Inputs: InputTuple;

    /// The type-erased parser declaration.
    fn base(&self) -> &ScriptParserBase;
}

/// Strongly-typed parser for one script kind.
pub struct Parser<O: OutputTuple, I: InputTuple> {
    base: ScriptParserBase,
    _marker: PhantomData<fn() -> (O, I)>,
}

impl<O: OutputTuple, I: InputTuple> Parser<O, I> {
    /// Declare a script kind: output registers first, then inputs.
    pub fn new(
        global: &mut ScriptGlobal,
        name: &str,
        out_names: &[&str],
        in_names: &[&str],
    ) -> Result<Self, ConfigError> {
        let mut base = ScriptParserBase::new(global, name);
        O::declare(&mut base, out_names)?;
        I::declare(global, &mut base, in_names)?;
        base.log_metadata();
        Ok(Self {
            base,
            _marker: PhantomData,
        })
    }

    /// The type-erased declaration, for registration calls.
    #[must_use]
    pub fn base(&self) -> &ScriptParserBase {
        &self.base
    }

    /// Mutable declaration access (init phase only).
    pub fn base_mut(&mut self) -> &mut ScriptParserBase {
        &mut self.base
    }

    /// Compile a script of this kind.
    pub fn parse(&self, global: &ScriptGlobal, parent: &str, code: &str) -> CompileResult<Container> {
        self.base.parse(global, parent, code)
    }

    /// Compile with default-script fallback.
    #[must_use]
    pub fn parse_with_default(&self, global: &ScriptGlobal, parent: &str, code: &str) -> Container {
        self.base.parse_with_default(global, parent, code)
    }
}

impl<O: OutputTuple, I: InputTuple> TypedParser for Parser<O, I> {
    type Output = O;
    type Inputs = I;

    fn base(&self) -> &ScriptParserBase {
        &self.base
    }
}

/// Strongly-typed events parser.
pub struct EventsParser<O: OutputTuple, I: InputTuple> {
    base: ScriptParserEvents,
    _marker: PhantomData<fn() -> (O, I)>,
}

impl<O: OutputTuple, I: InputTuple> EventsParser<O, I> {
    /// Declare an events-typed script kind.
    pub fn new(
        global: &mut ScriptGlobal,
        name: &str,
        out_names: &[&str],
        in_names: &[&str],
    ) -> Result<Self, ConfigError> {
        let mut base = ScriptParserEvents::new(global, name);
        O::declare(base.base_mut(), out_names)?;
        I::declare(global, base.base_mut(), in_names)?;
        Ok(Self {
            base,
            _marker: PhantomData,
        })
    }

    /// The events parser.
    #[must_use]
    pub fn events(&self) -> &ScriptParserEvents {
        &self.base
    }

    /// Mutable events parser access (init phase only).
    pub fn events_mut(&mut self) -> &mut ScriptParserEvents {
        &mut self.base
    }

    /// Register one event script with a priority.
    pub fn add_event(
        &mut self,
        global: &ScriptGlobal,
        name: &str,
        code: &str,
        priority: i32,
    ) -> Result<(), EventError> {
        self.base.add_event(global, name, code, priority)
    }

    /// Freeze the event chains.
    pub fn freeze(&mut self) {
        self.base.freeze();
    }

    /// Compile a main script with its event chains attached.
    pub fn parse_events(
        &self,
        global: &ScriptGlobal,
        parent: &str,
        code: &str,
    ) -> CompileResult<ContainerEvents> {
        self.base.parse_events(global, parent, code)
    }

    /// Compile with default-script fallback, chains attached.
    #[must_use]
    pub fn parse_events_with_default(
        &self,
        global: &ScriptGlobal,
        parent: &str,
        code: &str,
    ) -> ContainerEvents {
        self.base.parse_events_with_default(global, parent, code)
    }
}

impl<O: OutputTuple, I: InputTuple> TypedParser for EventsParser<O, I> {
    type Output = O;
    type Inputs = I;

    fn base(&self) -> &ScriptParserBase {
        self.base.base()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Creature;

    impl ScriptObject for Creature {
        const SCRIPT_NAME: &'static str = "Creature";
    }

    #[test]
    fn test_parser_declares_registers_in_order() {
        let mut global = ScriptGlobal::new();
        let parser: Parser<(i64,), (i64, Ptr<Creature>)> =
            Parser::new(&mut global, "demo", &["out"], &["shade", "unit"]).unwrap();

        let base = parser.base();
        assert_eq!(base.lookup_reg("out").unwrap().offset, 0);
        assert_eq!(base.lookup_reg("shade").unwrap().offset, 8);
        let unit = base.lookup_reg("unit").unwrap();
        assert_eq!(unit.offset, 16);
        assert!(unit.kind.is_ptr());
        assert!(!unit.kind.is_ptr_editable());
        assert_eq!(base.lookup_type("Creature"), Some(unit.kind.base));
    }

    #[test]
    fn test_ptr_mut_is_editable() {
        let mut global = ScriptGlobal::new();
        let parser: Parser<(i64,), (PtrMut<Creature>,)> =
            Parser::new(&mut global, "demo", &["out"], &["unit"]).unwrap();
        assert!(parser.base().lookup_reg("unit").unwrap().kind.is_ptr_editable());
    }

    #[test]
    fn test_readonly_output_slot() {
        let mut global = ScriptGlobal::new();
        let parser: Parser<(i64, Ro), ()> =
            Parser::new(&mut global, "blit", &["pixel", "shade"], &[]).unwrap();
        assert!(parser.base().lookup_reg("pixel").unwrap().kind.is_var());
        assert!(!parser.base().lookup_reg("shade").unwrap().kind.is_var());
    }

    #[test]
    fn test_output_tuple_marshalling() {
        let mut regs = RegisterFile::new();
        let mut values: <(i64, Ro) as OutputTuple>::Values = (5, 9);
        <(i64, Ro)>::set(&mut regs, &values);
        assert_eq!(regs.get_i64(0), 5);
        assert_eq!(regs.get_i64(8), 9);

        regs.set_i64(0, 42);
        regs.set_i64(8, 77);
        <(i64, Ro)>::get(&regs, &mut values);
        assert_eq!(values, (42, 9));

        <(i64, Ro)>::reset_readonly(&mut regs, &values);
        assert_eq!(regs.get_i64(0), 42);
        assert_eq!(regs.get_i64(8), 9);
    }
}
