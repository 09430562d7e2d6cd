//! Typed constant values.
//!
//! A [`ScriptValue`] is one register-sized word plus its [`ArgKind`]. It is
//! how named constants, folded expressions and global refs travel through
//! the compiler before being baked into bytecode immediates. Accessors
//! return `None` on a kind mismatch instead of panicking; the VM handler
//! that hits a mismatch converts it into a runtime error.

use crate::argkind::{ArgFlags, ArgKind, BaseType};
use crate::exec::ProgPos;

/// One register-sized typed constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptValue {
    bits: u64,
    kind: ArgKind,
}

impl ScriptValue {
    /// The null value.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            bits: 0,
            kind: ArgKind::plain(BaseType::NULL),
        }
    }

    /// An integer constant.
    #[must_use]
    pub const fn int(v: i64) -> Self {
        Self {
            bits: v as u64,
            kind: ArgKind::plain(BaseType::INT),
        }
    }

    /// A label constant (resolved program position).
    #[must_use]
    pub const fn label(pos: ProgPos) -> Self {
        Self {
            bits: pos.0 as u64,
            kind: ArgKind::plain(BaseType::LABEL),
        }
    }

    /// A raw word with an explicit kind. Used by tag factories and host
    /// constant registration.
    #[must_use]
    pub const fn raw(bits: u64, kind: ArgKind) -> Self {
        Self { bits, kind }
    }

    /// The value's kind.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> ArgKind {
        self.kind
    }

    /// The raw word.
    #[inline]
    #[must_use]
    pub const fn bits(&self) -> u64 {
        self.bits
    }

    /// Get the integer payload, if this is a plain int.
    #[inline]
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        if self.kind == ArgKind::plain(BaseType::INT) {
            Some(self.bits as i64)
        } else {
            None
        }
    }

    /// Get the label payload, if this is a label.
    #[inline]
    #[must_use]
    pub fn as_label(&self) -> Option<ProgPos> {
        if self.kind.base == BaseType::LABEL && self.kind.flags == ArgFlags::NONE {
            Some(ProgPos(self.bits as u32))
        } else {
            None
        }
    }

    /// Get the raw word if the value has exactly the given kind.
    #[inline]
    #[must_use]
    pub fn bits_as(&self, kind: ArgKind) -> Option<u64> {
        if self.kind == kind {
            Some(self.bits)
        } else {
            None
        }
    }
}
