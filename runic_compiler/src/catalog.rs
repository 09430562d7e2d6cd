//! The operation catalog.
//!
//! Maps operation names to overload sets. Every operation — engine-supplied
//! or host-registered — goes through the same registration path and
//! participates in overload resolution uniformly. The catalog also owns the
//! handler table that bytecode handles index into.

use crate::bytecode::{BytecodeBuilder, OpHandle};
use crate::symbol::RefData;
use crate::writer::ParserWriter;
use runic_core::argkind::{compat, ArgKind};
use runic_core::error::{CompileErrorKind, CompileResult, ConfigError};
use runic_core::exec::OpHandler;
use runic_core::value::ScriptValue;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;

/// A parser hook replacing the default parse-and-emit for an operation.
///
/// The hook may emit bytecode directly through the writer, which is how
/// operations with variable-length immediates and inline script expansion
/// are built.
pub type ParseHook = fn(&ProcDesc, &mut ParserWriter<'_>, &[RefData]) -> CompileResult<()>;

/// Constant folder: evaluates the operation over constant arguments.
pub type FoldFn = fn(&[ScriptValue]) -> Option<ScriptValue>;

/// Overload scorer: returns the summed score of one overload against the
/// supplied arguments, 0 to reject.
pub type ScoreFn = fn(&[ArgKind], &[RefData], usize) -> u32;

/// Extra immediate emitter, appended after the positional immediates.
pub type EmitExtraFn = fn(&mut BytecodeBuilder, &[RefData]) -> CompileResult<()>;

/// One alternative signature of an operation.
#[derive(Debug, Clone)]
pub struct Overload {
    /// Declared argument kinds.
    pub args: SmallVec<[ArgKind; 4]>,
    /// Runtime handler selected when this overload wins.
    pub handle: OpHandle,
}

/// Runtime descriptor of one operation name.
pub struct ProcDesc {
    /// Operation name.
    pub name: Arc<str>,
    /// Alternative signatures in declaration order.
    pub overloads: SmallVec<[Overload; 2]>,
    /// Optional parse hook replacing the default parse-and-emit.
    pub hook: Option<ParseHook>,
    /// Optional constant folder (opts the operation into folding).
    pub fold: Option<FoldFn>,
    /// Optional overload scorer; the default is summed compatibility.
    pub scorer: Option<ScoreFn>,
    /// Optional extra immediate emitter.
    pub emit_extra: Option<EmitExtraFn>,
}

impl ProcDesc {
    fn new(name: Arc<str>) -> Self {
        Self {
            name,
            overloads: SmallVec::new(),
            hook: None,
            fold: None,
            scorer: None,
            emit_extra: None,
        }
    }
}

/// Default overload scorer: every argument must be compatible; the score is
/// one more than the summed per-argument compatibility so that zero-argument
/// overloads still register as accepted.
#[must_use]
pub fn default_score(decl: &[ArgKind], supplied: &[RefData], ordinal: usize) -> u32 {
    if decl.len() != supplied.len() {
        return 0;
    }
    let mut total = 1u32;
    for (d, s) in decl.iter().zip(supplied) {
        let c = compat(*d, s.kind, ordinal);
        if c == 0 {
            return 0;
        }
        total += u32::from(c);
    }
    total
}

/// Name → overload set, plus the handler table bytecode handles index.
pub struct Catalog {
    procs: FxHashMap<Arc<str>, ProcDesc>,
    handlers: Vec<OpHandler>,
}

impl Catalog {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            procs: FxHashMap::default(),
            handlers: Vec::new(),
        }
    }

    /// Register a handler function, returning its bytecode handle.
    pub fn add_handler(&mut self, handler: OpHandler) -> OpHandle {
        self.handlers.push(handler);
        OpHandle((self.handlers.len() - 1) as u16)
    }

    /// The handler behind a bytecode handle.
    ///
    /// # Panics
    ///
    /// Panics on a handle that was not produced by this catalog; the
    /// compiler only ever emits handles it allocated.
    #[inline]
    #[must_use]
    pub fn handler(&self, handle: OpHandle) -> OpHandler {
        self.handlers[handle.0 as usize]
    }

    /// Add one overload to an operation, creating the operation on first
    /// use. Overload ordinals follow registration order.
    pub fn register_overload(
        &mut self,
        name: Arc<str>,
        args: &[ArgKind],
        handler: OpHandler,
    ) -> Result<OpHandle, ConfigError> {
        if let Some(desc) = self.procs.get(&name) {
            if desc.overloads.iter().any(|o| o.args.as_slice() == args) {
                return Err(ConfigError::DuplicateName { name });
            }
        }
        let handle = self.add_handler(handler);
        let desc = self
            .procs
            .entry(name.clone())
            .or_insert_with(|| ProcDesc::new(name.clone()));
        desc.overloads.push(Overload {
            args: SmallVec::from_slice(args),
            handle,
        });
        Ok(handle)
    }

    /// Register a hook-only operation (no overloads, parsing fully custom).
    pub fn register_hook_op(&mut self, name: Arc<str>, hook: ParseHook) -> Result<(), ConfigError> {
        if self.procs.contains_key(&name) {
            return Err(ConfigError::DuplicateName { name });
        }
        let mut desc = ProcDesc::new(name.clone());
        desc.hook = Some(hook);
        self.procs.insert(name, desc);
        Ok(())
    }

    /// Set the parse hook of a registered operation.
    pub fn set_hook(&mut self, name: &str, hook: ParseHook) {
        if let Some(desc) = self.procs.get_mut(name) {
            desc.hook = Some(hook);
        }
    }

    /// Set the constant folder of a registered operation.
    pub fn set_fold(&mut self, name: &str, fold: FoldFn) {
        if let Some(desc) = self.procs.get_mut(name) {
            desc.fold = Some(fold);
        }
    }

    /// Set the overload scorer of a registered operation.
    pub fn set_scorer(&mut self, name: &str, scorer: ScoreFn) {
        if let Some(desc) = self.procs.get_mut(name) {
            desc.scorer = Some(scorer);
        }
    }

    /// Set the extra immediate emitter of a registered operation.
    pub fn set_emit_extra(&mut self, name: &str, emit: EmitExtraFn) {
        if let Some(desc) = self.procs.get_mut(name) {
            desc.emit_extra = Some(emit);
        }
    }

    /// Look up an operation by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ProcDesc> {
        self.procs.get(name)
    }

    /// Resolve the winning overload for the supplied arguments.
    ///
    /// Returns the overload index. The declaration ordinal is folded into
    /// each score, so a shared maximum is genuinely ambiguous.
    pub fn resolve(&self, desc: &ProcDesc, supplied: &[RefData]) -> Result<usize, CompileErrorKind> {
        let scorer = desc.scorer.unwrap_or(default_score);
        let mut best: Option<(usize, u32)> = None;
        let mut ambiguous = false;
        for (ordinal, overload) in desc.overloads.iter().enumerate() {
            let score = scorer(&overload.args, supplied, ordinal);
            if score == 0 {
                continue;
            }
            match best {
                Some((_, top)) if score == top => ambiguous = true,
                Some((_, top)) if score < top => {}
                _ => {
                    best = Some((ordinal, score));
                    ambiguous = false;
                }
            }
        }
        match best {
            None => Err(CompileErrorKind::NoMatchingOverload),
            Some(_) if ambiguous => Err(CompileErrorKind::AmbiguousOverload),
            Some((ordinal, _)) => Ok(ordinal),
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runic_core::argkind::{ArgFlags, BaseType};
    use runic_core::exec::{OpResult, ProgPos, WorkerState};

    fn nop(_: &mut WorkerState, _: &[u8], _: &mut ProgPos) -> OpResult {
        OpResult::Continue
    }

    const INT_REG: ArgKind = ArgKind::new(BaseType::INT, ArgFlags::REG);
    const INT_VAR: ArgKind = ArgKind::new(BaseType::INT, ArgFlags::VAR);
    const INT_CONST: ArgKind = ArgKind::plain(BaseType::INT);

    fn reg_arg(kind: ArgKind) -> RefData {
        RefData::reg("r", kind, 0)
    }

    #[test]
    fn test_register_and_lookup() {
        let mut cat = Catalog::new();
        cat.register_overload("probe".into(), &[INT_REG], nop).unwrap();
        assert!(cat.get("probe").is_some());
        assert!(cat.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_signature_rejected() {
        let mut cat = Catalog::new();
        cat.register_overload("probe".into(), &[INT_REG], nop).unwrap();
        let err = cat
            .register_overload("probe".into(), &[INT_REG], nop)
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateName { .. }));
    }

    #[test]
    fn test_overloads_share_a_name() {
        let mut cat = Catalog::new();
        cat.register_overload("probe".into(), &[INT_REG], nop).unwrap();
        cat.register_overload("probe".into(), &[INT_CONST], nop).unwrap();
        assert_eq!(cat.get("probe").unwrap().overloads.len(), 2);
    }

    #[test]
    fn test_resolve_picks_exact_over_downgrade() {
        let mut cat = Catalog::new();
        // Ordinal 0 accepts a writable register only via downgrade; ordinal
        // 1 is an exact match. Exactness must win despite the later ordinal.
        cat.register_overload("probe".into(), &[INT_REG], nop).unwrap();
        cat.register_overload("probe".into(), &[INT_VAR], nop).unwrap();
        let desc = cat.get("probe").unwrap();
        let version = cat.resolve(desc, &[reg_arg(INT_VAR)]).unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_resolve_no_match() {
        let mut cat = Catalog::new();
        cat.register_overload("probe".into(), &[INT_REG], nop).unwrap();
        let desc = cat.get("probe").unwrap();
        let err = cat
            .resolve(desc, &[RefData::value("", ScriptValue::int(1))])
            .unwrap_err();
        assert_eq!(err, CompileErrorKind::NoMatchingOverload);
    }

    #[test]
    fn test_resolve_arity_mismatch() {
        let mut cat = Catalog::new();
        cat.register_overload("probe".into(), &[INT_REG, INT_REG], nop)
            .unwrap();
        let desc = cat.get("probe").unwrap();
        assert_eq!(
            cat.resolve(desc, &[reg_arg(INT_REG)]).unwrap_err(),
            CompileErrorKind::NoMatchingOverload
        );
    }

    #[test]
    fn test_zero_arg_overload_is_accepted() {
        let mut cat = Catalog::new();
        cat.register_overload("halt".into(), &[], nop).unwrap();
        let desc = cat.get("halt").unwrap();
        assert_eq!(cat.resolve(desc, &[]).unwrap(), 0);
    }

    #[test]
    fn test_custom_scorer_wins() {
        fn always_seven(_: &[ArgKind], _: &[RefData], ordinal: usize) -> u32 {
            if ordinal == 1 {
                7
            } else {
                1
            }
        }
        let mut cat = Catalog::new();
        cat.register_overload("probe".into(), &[INT_REG], nop).unwrap();
        cat.register_overload("probe".into(), &[INT_CONST], nop).unwrap();
        cat.set_scorer("probe", always_seven);
        let desc = cat.get("probe").unwrap();
        assert_eq!(cat.resolve(desc, &[reg_arg(INT_REG)]).unwrap(), 1);
    }

    #[test]
    fn test_handler_table_round_trip() {
        let mut cat = Catalog::new();
        let handle = cat.add_handler(nop);
        let got = cat.handler(handle);
        assert_eq!(got as usize, nop as OpHandler as usize);
    }
}
