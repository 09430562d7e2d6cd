//! Named references resolved during compilation.
//!
//! A [`RefData`] is the compiler's view of one resolved name or literal:
//! its kind plus where the value lives (inline constant, register offset,
//! label, or raw text for hook-consumed string literals). [`RegDecl`]
//! describes one register declared by the parser (output, input or local).

use crate::bytecode::Label;
use runic_core::argkind::ArgKind;
use runic_core::value::ScriptValue;
use std::sync::Arc;

/// Where a resolved reference's value lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefPayload {
    /// No payload (reserved / invalid references).
    None,
    /// A compile-time constant baked into bytecode as an immediate.
    Value(ScriptValue),
    /// A register, by byte offset into the register file.
    Reg(u16),
    /// A jump target, emitted through the label fixup machinery.
    Label(Label),
    /// Raw text, consumable only by operation parser hooks.
    Name(Arc<str>),
}

/// One resolved reference handed to overload resolution and emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefData {
    /// Source name (empty for literals and synthesized references).
    pub name: Arc<str>,
    /// Kind used for overload scoring.
    pub kind: ArgKind,
    /// Value location.
    pub payload: RefPayload,
}

impl RefData {
    /// A constant reference.
    #[must_use]
    pub fn value(name: impl Into<Arc<str>>, value: ScriptValue) -> Self {
        Self {
            name: name.into(),
            kind: value.kind(),
            payload: RefPayload::Value(value),
        }
    }

    /// A register reference.
    #[must_use]
    pub fn reg(name: impl Into<Arc<str>>, kind: ArgKind, offset: u16) -> Self {
        Self {
            name: name.into(),
            kind,
            payload: RefPayload::Reg(offset),
        }
    }

    /// A label reference (used by block statements).
    #[must_use]
    pub fn label(label: Label) -> Self {
        Self {
            name: "".into(),
            kind: ArgKind::plain(runic_core::argkind::BaseType::LABEL),
            payload: RefPayload::Label(label),
        }
    }

    /// A raw text reference from a string literal.
    #[must_use]
    pub fn text(content: impl Into<Arc<str>>) -> Self {
        let content = content.into();
        Self {
            name: content.clone(),
            kind: ArgKind::plain(runic_core::argkind::BaseType::TEXT),
            payload: RefPayload::Name(content),
        }
    }
}

/// One register declared by a parser: script output, input or local.
#[derive(Debug, Clone)]
pub struct RegDecl {
    /// Script-visible name.
    pub name: Arc<str>,
    /// Kind, including `VAR` for writable registers.
    pub kind: ArgKind,
    /// Byte offset in the register file.
    pub offset: u16,
    /// Whether this is a declared script output.
    pub output: bool,
}

impl RegDecl {
    /// The reference this register resolves to.
    #[must_use]
    pub fn as_ref_data(&self) -> RefData {
        RefData::reg(self.name.clone(), self.kind, self.offset)
    }
}
