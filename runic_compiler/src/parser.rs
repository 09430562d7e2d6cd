//! The type-erased parser: one script kind's frozen declaration.
//!
//! A `ScriptParserBase` holds everything needed to compile scripts of one
//! kind: the declared output and input registers, the registered type
//! names, named constants, and the operation catalog. The strongly-typed
//! façade in `runic_vm` builds one of these per `(Output, Inputs)` tuple
//! and marshals host values at the declared offsets; the runtime core here
//! is fully type-erased.

use crate::bytecode::Container;
use crate::catalog::{Catalog, EmitExtraFn, FoldFn, ParseHook, ScoreFn};
use crate::ops;
use crate::symbol::RegDecl;
use crate::writer::ParserWriter;
use runic_core::argkind::{ArgFlags, ArgKind, BaseType};
use runic_core::error::{CompileResult, ConfigError};
use runic_core::exec::OpHandler;
use runic_core::global::ScriptGlobal;
use runic_core::intern::StringInterner;
use runic_core::value::ScriptValue;
use runic_core::{MAX_OUTPUTS, MAX_REG_BYTES, REG_SLOT};
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::bytecode::OpHandle;

/// Frozen declaration of one script kind.
pub struct ScriptParserBase {
    id: u32,
    name: Arc<str>,
    interner: StringInterner,
    catalog: Catalog,
    types: FxHashMap<Arc<str>, BaseType>,
    regs: Vec<RegDecl>,
    out_count: usize,
    reg_top: u16,
    consts: FxHashMap<Arc<str>, ScriptValue>,
    default_script: Option<String>,
}

impl ScriptParserBase {
    /// Create a parser with the standard operation set and the built-in
    /// `int` type.
    #[must_use]
    pub fn new(global: &mut ScriptGlobal, name: &str) -> Self {
        let interner = StringInterner::new();
        let mut catalog = Catalog::new();
        ops::register_standard(&mut catalog, &interner);
        let mut types = FxHashMap::default();
        types.insert(interner.intern("int"), BaseType::INT);
        Self {
            id: global.next_parser_id(),
            name: interner.intern(name),
            interner,
            catalog,
            types,
            regs: Vec::new(),
            out_count: 0,
            reg_top: 0,
            consts: FxHashMap::default(),
            default_script: None,
        }
    }

    /// This parser's id in the global registry.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Name of the script kind.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Intern a name for the parser's lifetime.
    pub fn intern(&self, s: &str) -> Arc<str> {
        self.interner.intern(s)
    }

    /// First free register byte after the declared outputs and inputs.
    #[inline]
    #[must_use]
    pub fn reg_top(&self) -> u16 {
        self.reg_top
    }

    // =========================================================================
    // Declaration
    // =========================================================================

    fn check_reg_name(&self, name: &Arc<str>) -> Result<(), ConfigError> {
        if self.regs.iter().any(|r| r.name == *name) || self.consts.contains_key(name) {
            return Err(ConfigError::DuplicateName { name: name.clone() });
        }
        Ok(())
    }

    fn alloc_reg(&mut self, name: Arc<str>, kind: ArgKind, output: bool) -> Result<(), ConfigError> {
        self.check_reg_name(&name)?;
        assert!(
            self.reg_top as usize + REG_SLOT <= MAX_REG_BYTES,
            "declared registers exceed the register file"
        );
        self.regs.push(RegDecl {
            name,
            kind,
            offset: self.reg_top,
            output,
        });
        self.reg_top += REG_SLOT as u16;
        Ok(())
    }

    /// Declare the next script output register. Outputs must be declared
    /// before any input.
    pub fn add_output(
        &mut self,
        name: &str,
        base: BaseType,
        writable: bool,
    ) -> Result<(), ConfigError> {
        assert_eq!(
            self.regs.len(),
            self.out_count,
            "outputs must be declared before inputs"
        );
        if self.out_count >= MAX_OUTPUTS {
            return Err(ConfigError::TooManyOutputs {
                count: self.out_count + 1,
                limit: MAX_OUTPUTS,
            });
        }
        let flags = if writable { ArgFlags::VAR } else { ArgFlags::REG };
        self.alloc_reg(self.intern(name), ArgKind::new(base, flags), true)?;
        self.out_count += 1;
        Ok(())
    }

    /// Declare the next script input register with an explicit kind.
    pub fn add_input(&mut self, name: &str, kind: ArgKind) -> Result<(), ConfigError> {
        self.alloc_reg(self.intern(name), kind, false)
    }

    /// Register a script-visible type name.
    pub fn register_type(&mut self, name: &str, base: BaseType) -> Result<(), ConfigError> {
        let name = self.intern(name);
        if self.types.contains_key(&name) {
            return Err(ConfigError::DuplicateName { name });
        }
        self.types.insert(name, base);
        Ok(())
    }

    /// Add a named constant visible to scripts of this kind.
    pub fn add_const(&mut self, name: &str, value: ScriptValue) -> Result<(), ConfigError> {
        let name = self.intern(name);
        if self.consts.contains_key(&name) || self.regs.iter().any(|r| r.name == name) {
            return Err(ConfigError::DuplicateName { name });
        }
        self.consts.insert(name, value);
        Ok(())
    }

    /// Register one operation overload.
    pub fn register_op(
        &mut self,
        name: &str,
        args: &[ArgKind],
        handler: OpHandler,
    ) -> Result<OpHandle, ConfigError> {
        self.catalog
            .register_overload(self.interner.intern(name), args, handler)
    }

    /// Register a hook-only operation.
    pub fn register_op_hook(&mut self, name: &str, hook: ParseHook) -> Result<(), ConfigError> {
        self.catalog.register_hook_op(self.interner.intern(name), hook)
    }

    /// Opt an operation into constant folding.
    pub fn set_op_fold(&mut self, name: &str, fold: FoldFn) {
        self.catalog.set_fold(name, fold);
    }

    /// Replace an operation's overload scorer.
    pub fn set_op_scorer(&mut self, name: &str, scorer: ScoreFn) {
        self.catalog.set_scorer(name, scorer);
    }

    /// Attach an extra-immediate emitter to an operation.
    pub fn set_op_emit_extra(&mut self, name: &str, emit: EmitExtraFn) {
        self.catalog.set_emit_extra(name, emit);
    }

    /// Set the script substituted when a script string fails to compile.
    pub fn set_default_script(&mut self, text: impl Into<String>) {
        self.default_script = Some(text.into());
    }

    // =========================================================================
    // Lookup (used by the writer)
    // =========================================================================

    /// The operation catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Mutable catalog access for host-side registration.
    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    /// Declared output registers, in declaration order.
    #[must_use]
    pub fn outputs(&self) -> &[RegDecl] {
        &self.regs[..self.out_count]
    }

    /// All declared registers (outputs then inputs).
    #[must_use]
    pub fn regs(&self) -> &[RegDecl] {
        &self.regs
    }

    /// Look up a declared register by name.
    #[must_use]
    pub fn lookup_reg(&self, name: &str) -> Option<&RegDecl> {
        self.regs.iter().find(|r| &*r.name == name)
    }

    /// Look up a parser constant by name.
    #[must_use]
    pub fn lookup_const(&self, name: &str) -> Option<ScriptValue> {
        self.consts.get(name).copied()
    }

    /// Look up a registered type name.
    #[must_use]
    pub fn lookup_type(&self, name: &str) -> Option<BaseType> {
        self.types.get(name).copied()
    }

    // =========================================================================
    // Parsing
    // =========================================================================

    /// Compile a script of this kind.
    pub fn parse(
        &self,
        global: &ScriptGlobal,
        parent: &str,
        code: &str,
    ) -> CompileResult<Container> {
        ParserWriter::compile(self, global, parent, code)
    }

    /// Compile a script, substituting the default script on failure.
    ///
    /// A failing default yields an empty (inactive) container; either
    /// fallback is reported through a warning.
    #[must_use]
    pub fn parse_with_default(&self, global: &ScriptGlobal, parent: &str, code: &str) -> Container {
        match self.parse(global, parent, code) {
            Ok(container) => container,
            Err(error) => {
                tracing::warn!(
                    script = parent,
                    kind = &*self.name,
                    %error,
                    "script failed to compile, substituting default"
                );
                let Some(default) = &self.default_script else {
                    return Container::empty(self.id);
                };
                match self.parse(global, parent, default) {
                    Ok(container) => container,
                    Err(error) => {
                        tracing::warn!(
                            script = parent,
                            kind = &*self.name,
                            %error,
                            "default script failed to compile"
                        );
                        Container::empty(self.id)
                    }
                }
            }
        }
    }

    /// Emit freeze-time metadata through `tracing`.
    pub fn log_metadata(&self) {
        tracing::debug!(
            kind = &*self.name,
            outputs = self.out_count,
            inputs = self.regs.len() - self.out_count,
            consts = self.consts.len(),
            "script parser frozen"
        );
    }
}
