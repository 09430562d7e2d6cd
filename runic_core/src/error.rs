//! Error types and result definitions for the runic engine.
//!
//! Three families cover the engine's failure modes:
//! - [`CompileError`] — structured record produced by the script compiler
//! - [`RuntimeError`] — failures during bytecode execution
//! - [`ConfigError`] — host misconfiguration during the init/freeze phase
//!
//! The engine never writes to stdout or stderr; every failure is reported
//! through one of these types.

use crate::span::Span;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The result type used by the compiler.
pub type CompileResult<T> = Result<T, CompileError>;

/// Classification of a compile failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileErrorKind {
    /// Malformed token stream or statement structure.
    Syntax,
    /// A name that resolves to nothing in any scope.
    UnknownIdentifier,
    /// A value of the wrong base type in a typed position.
    TypeMismatch,
    /// No operation overload accepted the supplied arguments.
    NoMatchingOverload,
    /// Two or more overloads tied at the top score.
    AmbiguousOverload,
    /// A local register name declared twice.
    DuplicateLocal,
    /// A non-writable value in a position that requires a writable register.
    InvalidLValue,
    /// Local registers exceeded the register file capacity.
    RegisterFileOverflow,
    /// A forward label reference was never bound.
    UnresolvedLabel,
    /// A symbol registered twice in the parser.
    DuplicateDeclaration,
}

impl CompileErrorKind {
    /// Stable display name for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Syntax => "Syntax",
            Self::UnknownIdentifier => "UnknownIdentifier",
            Self::TypeMismatch => "TypeMismatch",
            Self::NoMatchingOverload => "NoMatchingOverload",
            Self::AmbiguousOverload => "AmbiguousOverload",
            Self::DuplicateLocal => "DuplicateLocal",
            Self::InvalidLValue => "InvalidLValue",
            Self::RegisterFileOverflow => "RegisterFileOverflow",
            Self::UnresolvedLabel => "UnresolvedLabel",
            Self::DuplicateDeclaration => "DuplicateDeclaration",
        }
    }
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured compile error record.
///
/// Carries the failure kind, the source location and offending token when
/// known, and the parent script name for host-side reporting.
#[derive(Debug, Clone)]
pub struct CompileError {
    /// Failure classification.
    pub kind: CompileErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Source location, if the failure maps to one.
    pub span: Option<Span>,
    /// The offending token text, if any.
    pub token: Option<Arc<str>>,
    /// Name of the script being compiled (for diagnostics).
    pub parent: Arc<str>,
    /// Line/column resolved against the source at error time.
    pub line_col: Option<(usize, usize)>,
}

impl CompileError {
    /// Create a new compile error.
    #[must_use]
    pub fn new(kind: CompileErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            token: None,
            parent: "".into(),
            line_col: None,
        }
    }

    /// Attach a source span and resolve its line/column.
    #[must_use]
    pub fn with_span(mut self, span: Span, source: &str) -> Self {
        self.line_col = Some(span.line_col(source));
        self.span = Some(span);
        self
    }

    /// Attach the offending token text.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<Arc<str>>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Attach the parent script name.
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<Arc<str>>) -> Self {
        self.parent = parent.into();
        self
    }

}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some((line, col)) = self.line_col {
            write!(f, " at {line}:{col}")?;
        }
        if let Some(token) = &self.token {
            write!(f, " near '{token}'")?;
        }
        if !self.parent.is_empty() {
            write!(f, " in '{}'", self.parent)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

/// Runtime error during bytecode execution.
///
/// Execution halts on the first error; the register file is left in an
/// unspecified but memory-safe state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// A value was accessed at the wrong base type (host pointer or tag).
    #[error("InvalidCast: expected {expected}, found {found}")]
    InvalidCast {
        /// Type the accessor asked for.
        expected: &'static str,
        /// Type actually stored.
        found: Arc<str>,
    },

    /// The per-execute instruction budget was exhausted.
    #[error("InstructionBudgetExceeded: budget of {budget} instructions exhausted")]
    InstructionBudgetExceeded {
        /// The budget that was in force.
        budget: u64,
    },

    /// An operation handler reported failure.
    #[error("HandlerFailure: {message}")]
    HandlerFailure {
        /// Handler-provided description.
        message: Arc<str>,
    },
}

impl RuntimeError {
    /// Create a handler failure with a message.
    #[must_use]
    pub fn handler(message: impl Into<Arc<str>>) -> Self {
        Self::HandlerFailure {
            message: message.into(),
        }
    }
}

/// Host configuration error during the init/freeze phase.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A tag referenced a value type name that was never registered.
    #[error("UnknownTagValueType: no tag value type named '{name}'")]
    UnknownTagValueType {
        /// The unregistered value type name.
        name: Arc<str>,
    },

    /// A tag name registered twice for the same kind.
    #[error("DuplicateTagName: tag '{name}' already registered")]
    DuplicateTagName {
        /// The duplicated tag name.
        name: Arc<str>,
    },

    /// A symbol (type, constant, register or operation) registered twice.
    #[error("DuplicateName: '{name}' already registered")]
    DuplicateName {
        /// The duplicated symbol name.
        name: Arc<str>,
    },

    /// More output registers declared than the engine supports.
    #[error("TooManyOutputs: {count} output registers declared, limit is {limit}")]
    TooManyOutputs {
        /// Number of outputs the host declared.
        count: usize,
        /// The engine limit.
        limit: usize,
    },

    /// A tag kind ran out of indexes.
    #[error("TagLimitExceeded: tag kind '{kind}' is full ({limit} tags)")]
    TagLimitExceeded {
        /// Display name of the tag kind.
        kind: Arc<str>,
        /// The index limit of the kind.
        limit: usize,
    },

    /// An events parser received a priority outside the supported range.
    #[error("PriorityOutOfRange: event priority {priority} outside [-{limit}, {limit}]")]
    PriorityOutOfRange {
        /// The rejected priority.
        priority: i32,
        /// The inclusive bound.
        limit: i32,
    },
}
