//! `runic_core`: shared substrate of the runic scripting engine.
//!
//! This crate holds everything both the compiler and the VM need to agree on:
//! - Source spans for diagnostics ([`span`])
//! - The error hierarchy ([`error`])
//! - String interning for symbol names ([`intern`])
//! - The argument-kind algebra and overload compatibility scoring ([`argkind`])
//! - Typed constant values ([`value`])
//! - The register file, worker state and op-handler contract ([`exec`])
//! - The host-wide shared registry ([`global`]) and tag stores ([`tags`])

pub mod argkind;
pub mod error;
pub mod exec;
pub mod global;
pub mod intern;
pub mod span;
pub mod tags;
pub mod value;

pub use argkind::{ArgFlags, ArgKind, BaseType};
pub use error::{CompileError, CompileErrorKind, ConfigError, RuntimeError};
pub use exec::{OpHandler, OpResult, ProgPos, RegisterFile, WorkerState};
pub use global::{ScriptGlobal, ScriptObject};
pub use span::Span;
pub use tags::{ScriptValues, Tag};
pub use value::ScriptValue;

/// Maximum number of declared script outputs.
pub const MAX_OUTPUTS: usize = 4;

/// Size of one register slot in bytes. Every register occupies a full slot.
pub const REG_SLOT: usize = 8;

/// Total size of the register file in bytes (64 machine words).
pub const MAX_REG_BYTES: usize = 64 * REG_SLOT;
