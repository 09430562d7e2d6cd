//! Compiled bytecode artifacts and the emission builder.
//!
//! Bytecode is a flat byte vector: each instruction is a `u16` handler
//! handle (an index into the owning catalog's handler table, never a raw
//! function pointer) followed by operation-specific immediates. The builder
//! provides labels with forward-reference fixups patched at bind time.

use runic_core::error::{CompileError, CompileErrorKind, CompileResult};
use runic_core::exec::ProgPos;
use std::sync::Arc;

/// Handle of a registered runtime handler: an index into the catalog's
/// handler table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpHandle(pub u16);

/// An immutable compiled script.
///
/// Truthy iff non-empty; move-only (deliberately not `Clone`): every
/// bytecode buffer is owned by exactly one container.
#[derive(Debug)]
pub struct Container {
    code: Box<[u8]>,
    parser_id: u32,
}

impl Container {
    /// Wrap finished bytecode.
    #[must_use]
    pub(crate) fn new(code: Vec<u8>, parser_id: u32) -> Self {
        Self {
            code: code.into_boxed_slice(),
            parser_id,
        }
    }

    /// An empty container: executing it is a no-op and
    /// [`Self::is_active`] is `false`.
    #[must_use]
    pub fn empty(parser_id: u32) -> Self {
        Self::new(Vec::new(), parser_id)
    }

    /// Whether there is any script to run.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.code.is_empty()
    }

    /// The bytecode.
    #[inline]
    #[must_use]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Id of the parser this container was compiled against.
    #[inline]
    #[must_use]
    pub fn parser_id(&self) -> u32 {
        self.parser_id
    }
}

/// A compiled script plus the event chains flanking it.
///
/// The chains are shared: every container parsed from the same frozen
/// events parser references the same before/after runs.
#[derive(Debug)]
pub struct ContainerEvents {
    current: Container,
    before: Arc<[Container]>,
    after: Arc<[Container]>,
}

impl ContainerEvents {
    /// Assemble a main script with its event chains.
    #[must_use]
    pub fn new(current: Container, before: Arc<[Container]>, after: Arc<[Container]>) -> Self {
        Self {
            current,
            before,
            after,
        }
    }

    /// The main script.
    #[inline]
    #[must_use]
    pub fn current(&self) -> &Container {
        &self.current
    }

    /// Events running before the main script, in priority order.
    #[inline]
    #[must_use]
    pub fn before(&self) -> &[Container] {
        &self.before
    }

    /// Events running after the main script, in priority order.
    #[inline]
    #[must_use]
    pub fn after(&self) -> &[Container] {
        &self.after
    }
}

/// A jump target under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

/// A forward reference awaiting its label's position.
#[derive(Debug)]
struct ForwardRef {
    /// Byte offset of the placeholder in the code vector.
    at: usize,
    /// The label being referenced.
    label: Label,
}

/// Bytecode emission buffer with label fixups.
#[derive(Debug, Default)]
pub struct BytecodeBuilder {
    code: Vec<u8>,
    labels: Vec<Option<ProgPos>>,
    forward_refs: Vec<ForwardRef>,
}

impl BytecodeBuilder {
    /// An empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current emission position.
    #[inline]
    #[must_use]
    pub fn pos(&self) -> ProgPos {
        ProgPos(self.code.len() as u32)
    }

    /// Whether anything was emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Allocate a fresh unbound label.
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    /// Bind a label to the current position. Binding twice is a compiler
    /// bug, not a script error.
    pub fn bind_label(&mut self, label: Label) {
        let pos = self.pos();
        let slot = &mut self.labels[label.0 as usize];
        debug_assert!(slot.is_none(), "label bound twice");
        *slot = Some(pos);
    }

    /// Emit an operation handle.
    pub fn emit_handle(&mut self, handle: OpHandle) {
        self.code.extend_from_slice(&handle.0.to_le_bytes());
    }

    /// Emit a `u16` immediate (register offsets).
    pub fn emit_u16(&mut self, value: u16) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit an `i64` immediate (inline constants).
    pub fn emit_i64(&mut self, value: i64) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a label reference. Bound labels emit their position directly;
    /// unbound labels emit a placeholder recorded for fixup.
    pub fn emit_label_ref(&mut self, label: Label) {
        match self.labels[label.0 as usize] {
            Some(pos) => self.code.extend_from_slice(&pos.0.to_le_bytes()),
            None => {
                self.forward_refs.push(ForwardRef {
                    at: self.code.len(),
                    label,
                });
                self.code.extend_from_slice(&u32::MAX.to_le_bytes());
            }
        }
    }

    /// Patch forward references and seal the bytecode.
    pub fn finish(mut self, parser_id: u32) -> CompileResult<Container> {
        for fixup in &self.forward_refs {
            let Some(pos) = self.labels[fixup.label.0 as usize] else {
                return Err(CompileError::new(
                    CompileErrorKind::UnresolvedLabel,
                    "jump target never bound",
                ));
            };
            self.code[fixup.at..fixup.at + 4].copy_from_slice(&pos.0.to_le_bytes());
        }
        Ok(Container::new(self.code, parser_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_container_is_inactive() {
        let c = Container::empty(0);
        assert!(!c.is_active());
        assert!(c.code().is_empty());
    }

    #[test]
    fn test_backward_label_emits_position() {
        let mut b = BytecodeBuilder::new();
        let top = b.new_label();
        b.bind_label(top);
        b.emit_handle(OpHandle(1));
        b.emit_label_ref(top);
        let c = b.finish(3).unwrap();
        assert_eq!(c.parser_id(), 3);
        assert_eq!(&c.code()[2..6], &0u32.to_le_bytes());
    }

    #[test]
    fn test_forward_label_is_patched() {
        let mut b = BytecodeBuilder::new();
        let end = b.new_label();
        b.emit_handle(OpHandle(1));
        b.emit_label_ref(end);
        b.emit_handle(OpHandle(2));
        b.bind_label(end);
        let target = b.pos();
        let c = b.finish(0).unwrap();
        assert_eq!(&c.code()[2..6], &target.0.to_le_bytes());
    }

    #[test]
    fn test_unbound_label_is_error() {
        let mut b = BytecodeBuilder::new();
        let dangling = b.new_label();
        b.emit_label_ref(dangling);
        let err = b.finish(0).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnresolvedLabel);
    }

    #[test]
    fn test_immediates_are_little_endian() {
        let mut b = BytecodeBuilder::new();
        b.emit_u16(0x0102);
        b.emit_i64(-1);
        let c = b.finish(0).unwrap();
        assert_eq!(c.code()[0], 0x02);
        assert_eq!(c.code()[1], 0x01);
        assert_eq!(&c.code()[2..10], &(-1i64).to_le_bytes());
    }
}
