//! Lowering errors.
//!
//! Two failure channels exist:
//!
//! - [`LowerError`]: fatal. Raised with `?` and never retried.
//! - [`Decline`]: a handler could not produce IR for a node. Handlers return
//!   it inside [`Outcome`] so that a caller can try another interpretation;
//!   the entry point turns a decline that survives every attempt into a
//!   fatal [`LowerErrorKind::NoIr`].

use thiserror::Error;

use crate::diagnostics::{Diagnostic, ErrorCode};
use crate::ir::IrNode;
use crate::span::Span;

/// Result type alias for lowering operations.
///
/// `LowerError` is boxed to keep the `Err` path one pointer wide.
pub type LowerResult<T> = Result<T, Box<LowerError>>;

/// The four failure categories of the lowering stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Incompatible operand types, bad literals.
    Type,
    /// Malformed node shapes, missing locations, bad indices.
    Structure,
    /// A broken compiler invariant or an unsupported construct.
    CompilerInvariant,
    /// The construct needs a newer VM than the one targeted.
    TargetVersion,
}

/// A fatal lowering error.
#[derive(Debug, Clone)]
pub struct LowerError {
    pub kind: LowerErrorKind,
    pub span: Span,
    pub help: Option<String>,
}

/// The kind of a fatal lowering error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LowerErrorKind {
    #[error("type mismatch: {message}")]
    TypeMismatch { message: String },

    #[error("invalid literal: {message}")]
    InvalidLiteral { message: String },

    #[error("{message}")]
    Structure { message: String },

    #[error("array index {index} is out of bounds for a list of {count} element(s)")]
    ArrayIndex { index: String, count: usize },

    #[error("`{name}` is not declared")]
    Undeclared { name: String },

    #[error("{feature} is unavailable prior to the {required} ruleset")]
    EvmVersion { feature: String, required: String },

    #[error("compiler panic: {message}")]
    CompilerPanic { message: String },

    #[error("{node} node did not produce IR: {reason}")]
    NoIr { node: &'static str, reason: Decline },
}

impl LowerErrorKind {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LowerErrorKind::TypeMismatch { .. } | LowerErrorKind::InvalidLiteral { .. } => {
                ErrorCategory::Type
            }
            LowerErrorKind::Structure { .. }
            | LowerErrorKind::ArrayIndex { .. }
            | LowerErrorKind::Undeclared { .. } => ErrorCategory::Structure,
            LowerErrorKind::EvmVersion { .. } => ErrorCategory::TargetVersion,
            LowerErrorKind::CompilerPanic { .. } | LowerErrorKind::NoIr { .. } => {
                ErrorCategory::CompilerInvariant
            }
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            LowerErrorKind::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            LowerErrorKind::InvalidLiteral { .. } => ErrorCode::InvalidLiteral,
            LowerErrorKind::Structure { .. } => ErrorCode::Structure,
            LowerErrorKind::ArrayIndex { .. } => ErrorCode::ArrayIndex,
            LowerErrorKind::Undeclared { .. } => ErrorCode::Undeclared,
            LowerErrorKind::EvmVersion { .. } => ErrorCode::EvmVersion,
            LowerErrorKind::CompilerPanic { .. } => ErrorCode::CompilerPanic,
            LowerErrorKind::NoIr { .. } => ErrorCode::NoIr,
        }
    }
}

impl LowerError {
    pub fn new(kind: LowerErrorKind, span: Span) -> Self {
        Self { kind, span, help: None }
    }

    /// Wrap this error in a `Box` and return as `Err`.
    pub fn into_err<T>(self) -> LowerResult<T> {
        Err(Box::new(self))
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn type_mismatch(message: impl Into<String>, span: Span) -> Self {
        Self::new(LowerErrorKind::TypeMismatch { message: message.into() }, span)
    }

    pub fn invalid_literal(message: impl Into<String>, span: Span) -> Self {
        Self::new(LowerErrorKind::InvalidLiteral { message: message.into() }, span)
    }

    pub fn structure(message: impl Into<String>, span: Span) -> Self {
        Self::new(LowerErrorKind::Structure { message: message.into() }, span)
    }

    pub fn panic(message: impl Into<String>, span: Span) -> Self {
        Self::new(LowerErrorKind::CompilerPanic { message: message.into() }, span)
    }

    pub fn evm_version(feature: impl Into<String>, required: impl Into<String>, span: Span) -> Self {
        Self::new(
            LowerErrorKind::EvmVersion { feature: feature.into(), required: required.into() },
            span,
        )
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Convert to a diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::error(self.kind.to_string(), self.span)
            .with_error_code(self.kind.code());
        if let LowerErrorKind::NoIr { node, .. } = &self.kind {
            diag = diag.with_note(self.span, format!("while lowering this {node} expression"));
        }
        if let Some(help) = &self.help {
            diag = diag.with_suggestion(help.clone());
        }
        diag
    }
}

impl std::fmt::Display for LowerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.kind, self.span)
    }
}

impl std::error::Error for LowerError {}

/// Why a handler produced no IR for a node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Decline {
    #[error("`{op}` is not defined between `{left}` and `{right}`")]
    IncompatibleOperands { op: &'static str, left: String, right: String },

    #[error("`{op}` expects boolean operands, found `{found}`")]
    NonBoolean { op: &'static str, found: String },

    #[error("`{op}` is not defined for `{found}`")]
    UnsupportedOperand { op: &'static str, found: String },

    #[error("division by a literal zero")]
    ZeroDivisor,

    #[error("exponentiation needs a literal base or a literal exponent")]
    UnboundedPower,

    #[error("tuple index {index} is out of range for a tuple of {len} element(s)")]
    TupleIndex { index: String, len: usize },

    #[error("value of type `{found}` cannot be subscripted")]
    NotSubscriptable { found: String },

    #[error("attribute `{attr}` is not available here")]
    UnknownAttribute { attr: String },

    #[error("`{name}` cannot be called with these arguments")]
    BadCallShape { name: String },

    #[error("empty {what} literal")]
    Empty { what: &'static str },

    #[error("{message}")]
    Other { message: String },
}

/// The result of a lowering handler.
#[derive(Debug, Clone)]
pub enum Outcome {
    Lowered(IrNode),
    Declined(Decline),
}

impl From<IrNode> for Outcome {
    fn from(node: IrNode) -> Self {
        Outcome::Lowered(node)
    }
}

impl From<Decline> for Outcome {
    fn from(decline: Decline) -> Self {
        Outcome::Declined(decline)
    }
}
