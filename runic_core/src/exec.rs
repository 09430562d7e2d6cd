//! The execution substrate shared by compiler and VM.
//!
//! Defines the register file, the worker state operation handlers run
//! against, and the handler contract itself. The dispatch loop lives in
//! `runic_vm`; this module only provides the memory model.
//!
//! Raw host pointers never leave this module: handlers access host objects
//! through [`WorkerState::host_ref`] / [`WorkerState::host_mut`], which
//! check the stored `TypeId` and editability before dereferencing.

use crate::error::RuntimeError;
use crate::{MAX_REG_BYTES, REG_SLOT};
use smallvec::SmallVec;
use std::any::TypeId;

/// Program counter: a byte offset into a bytecode vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProgPos(pub u32);

impl ProgPos {
    /// Start of a program.
    pub const START: ProgPos = ProgPos(0);

    /// Byte offset as `usize`.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Advance by `n` bytes.
    #[inline]
    pub fn advance(&mut self, n: u32) {
        self.0 += n;
    }
}

/// Result of one operation handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpResult {
    /// Continue with the next instruction.
    Continue,
    /// Halt normally.
    End,
    /// Halt with a runtime error.
    Error(RuntimeError),
}

/// Operation handler signature.
///
/// The handler reads its own immediates from `code` at `*pc` and advances
/// `pc` past them (and, for branches, assigns the branch target).
pub type OpHandler = fn(&mut WorkerState, &[u8], &mut ProgPos) -> OpResult;

/// Default per-execute instruction budget.
pub const DEFAULT_BUDGET: u64 = 131_072;

/// The fixed byte buffer serving as a worker's address space.
///
/// Every register occupies one 8-byte slot; offsets are byte offsets
/// validated by the compiler (`RegisterFileOverflow`), so accessors assume
/// in-bounds offsets and only debug-assert them.
#[repr(align(8))]
pub struct RegisterFile {
    bytes: [u8; MAX_REG_BYTES],
}

impl RegisterFile {
    /// A zeroed register file.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bytes: [0; MAX_REG_BYTES],
        }
    }

    /// Zero the whole file.
    pub fn clear(&mut self) {
        self.bytes = [0; MAX_REG_BYTES];
    }

    /// Read a signed word at a byte offset.
    #[inline]
    #[must_use]
    pub fn get_i64(&self, offset: u16) -> i64 {
        self.get_u64(offset) as i64
    }

    /// Write a signed word at a byte offset.
    #[inline]
    pub fn set_i64(&mut self, offset: u16, value: i64) {
        self.set_u64(offset, value as u64);
    }

    /// Read an unsigned word at a byte offset.
    #[inline]
    #[must_use]
    pub fn get_u64(&self, offset: u16) -> u64 {
        let at = offset as usize;
        debug_assert!(at + REG_SLOT <= MAX_REG_BYTES, "register offset {at} out of range");
        let mut word = [0u8; REG_SLOT];
        word.copy_from_slice(&self.bytes[at..at + REG_SLOT]);
        u64::from_le_bytes(word)
    }

    /// Write an unsigned word at a byte offset.
    #[inline]
    pub fn set_u64(&mut self, offset: u16, value: u64) {
        let at = offset as usize;
        debug_assert!(at + REG_SLOT <= MAX_REG_BYTES, "register offset {at} out of range");
        self.bytes[at..at + REG_SLOT].copy_from_slice(&value.to_le_bytes());
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

/// One host object lent to a worker for the duration of an execution.
struct HostSlot {
    addr: *mut (),
    type_id: TypeId,
    type_name: &'static str,
    editable: bool,
}

/// The per-execution VM state handlers operate on.
///
/// Owns the register file by value, the table of host objects lent to this
/// execution, and the instruction budget. Not reentrant and not `Sync`; a
/// worker façade in `runic_vm` ties the host-pointer lifetimes to itself.
pub struct WorkerState {
    /// The register file.
    pub regs: RegisterFile,
    slots: SmallVec<[HostSlot; 8]>,
    executed: u64,
    budget: u64,
}

impl WorkerState {
    /// Create a zeroed state with the default instruction budget.
    #[must_use]
    pub fn new() -> Self {
        Self::with_budget(DEFAULT_BUDGET)
    }

    /// Create a zeroed state with an explicit instruction budget.
    #[must_use]
    pub fn with_budget(budget: u64) -> Self {
        Self {
            regs: RegisterFile::new(),
            slots: SmallVec::new(),
            executed: 0,
            budget,
        }
    }

    /// Zero the register file and drop all host slots.
    pub fn reset(&mut self) {
        self.regs.clear();
        self.slots.clear();
        self.executed = 0;
    }

    /// Account for one executed instruction; `false` when the budget is
    /// exhausted.
    #[inline]
    #[must_use]
    pub fn step(&mut self) -> bool {
        self.executed += 1;
        self.executed <= self.budget
    }

    /// Restart the instruction counter for a fresh execute call.
    #[inline]
    pub fn restart_budget(&mut self) {
        self.executed = 0;
    }

    /// The instruction budget in force.
    #[inline]
    #[must_use]
    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Lend a read-only host object, returning its slot index.
    ///
    /// # Safety
    ///
    /// The pointed-to object must outlive every execution that can read the
    /// slot. The typed worker façade enforces this with a lifetime
    /// parameter; callers bypassing it carry the obligation themselves.
    pub unsafe fn push_slot_ref<T: 'static>(&mut self, obj: *const T, type_name: &'static str) -> u64 {
        self.slots.push(HostSlot {
            addr: obj as *mut (),
            type_id: TypeId::of::<T>(),
            type_name,
            editable: false,
        });
        (self.slots.len() - 1) as u64
    }

    /// Lend an editable host object, returning its slot index.
    ///
    /// # Safety
    ///
    /// As [`Self::push_slot_ref`], and additionally the object must not be
    /// aliased elsewhere while any execution can write the slot.
    pub unsafe fn push_slot_mut<T: 'static>(&mut self, obj: *mut T, type_name: &'static str) -> u64 {
        self.slots.push(HostSlot {
            addr: obj as *mut (),
            type_id: TypeId::of::<T>(),
            type_name,
            editable: true,
        });
        (self.slots.len() - 1) as u64
    }

    fn slot(&self, index: u64, expected: &'static str) -> Result<&HostSlot, RuntimeError> {
        self.slots
            .get(index as usize)
            .ok_or_else(|| RuntimeError::InvalidCast {
                expected,
                found: "empty slot".into(),
            })
    }

    /// Borrow a host object lent to this execution.
    ///
    /// Returns `InvalidCast` when the slot holds a different type.
    pub fn host_ref<T: 'static>(&self, index: u64) -> Result<&T, RuntimeError> {
        let name = std::any::type_name::<T>();
        let slot = self.slot(index, name)?;
        if slot.type_id != TypeId::of::<T>() {
            return Err(RuntimeError::InvalidCast {
                expected: name,
                found: slot.type_name.into(),
            });
        }
        // Type checked above; liveness guaranteed by the lender (see
        // `push_slot_ref`).
        Ok(unsafe { &*(slot.addr as *const T) })
    }

    /// Borrow a host object mutably.
    ///
    /// Returns `InvalidCast` when the slot holds a different type or was
    /// lent read-only.
    pub fn host_mut<T: 'static>(&mut self, index: u64) -> Result<&mut T, RuntimeError> {
        let name = std::any::type_name::<T>();
        let slot = self.slot(index, name)?;
        if slot.type_id != TypeId::of::<T>() {
            return Err(RuntimeError::InvalidCast {
                expected: name,
                found: slot.type_name.into(),
            });
        }
        if !slot.editable {
            return Err(RuntimeError::InvalidCast {
                expected: name,
                found: format!("read-only {}", slot.type_name).into(),
            });
        }
        let addr = slot.addr as *mut T;
        // Type and editability checked above; exclusivity guaranteed by the
        // lender (see `push_slot_mut`) plus `&mut self` here.
        Ok(unsafe { &mut *addr })
    }
}

impl Default for WorkerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a `u16` immediate, advancing the program counter.
#[inline]
#[must_use]
pub fn read_u16(code: &[u8], pc: &mut ProgPos) -> u16 {
    let at = pc.index();
    let v = u16::from_le_bytes([code[at], code[at + 1]]);
    pc.advance(2);
    v
}

/// Read a `u32` immediate, advancing the program counter.
#[inline]
#[must_use]
pub fn read_u32(code: &[u8], pc: &mut ProgPos) -> u32 {
    let at = pc.index();
    let mut word = [0u8; 4];
    word.copy_from_slice(&code[at..at + 4]);
    pc.advance(4);
    u32::from_le_bytes(word)
}

/// Read an `i64` immediate, advancing the program counter.
#[inline]
#[must_use]
pub fn read_i64(code: &[u8], pc: &mut ProgPos) -> i64 {
    let at = pc.index();
    let mut word = [0u8; 8];
    word.copy_from_slice(&code[at..at + 8]);
    pc.advance(8);
    i64::from_le_bytes(word)
}
