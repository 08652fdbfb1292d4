//! # stackc
//!
//! Expression lowering for a word-oriented stack VM.
//!
//! `stackc` takes one type-checked expression and produces the IR the code
//! generator consumes: a tree of `(operation args...)` nodes in which every
//! arithmetic operation already carries the runtime guard its declared type
//! requires (range clamps, wraparound asserts, non-zero divisors, bounded
//! exponents).
//!
//! ## Pipeline position
//!
//! ```text
//! Source -> Parser -> Type Check -> [Expression Lowering] -> Codegen -> Bytecode
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use stackc::ast::{BinOpKind, Expr};
//! use stackc::context::{Context, VariableRecord};
//! use stackc::types::Type;
//! use stackc::ExprLowerer;
//!
//! let mut ctx = Context::default()
//!     .with_variable("a", VariableRecord::memory(320, Type::uint256()))
//!     .with_variable("b", VariableRecord::memory(352, Type::uint256()));
//!
//! let expr = Expr::binop(Expr::name("a"), BinOpKind::Add, Expr::name("b"));
//! let ir = ExprLowerer::new(&mut ctx).lower(&expr).expect("uint256 + uint256");
//!
//! assert_eq!(
//!     ir.to_string(),
//!     "(with l (mload 320) (with r (mload 352) (seq (seq (assert (ge (add l r) l)) (add l r)))))"
//! );
//! ```
//!
//! ### Error Handling
//!
//! Lowering errors carry a span and convert to diagnostics with stable codes:
//!
//! ```rust
//! use stackc::ast::Expr;
//! use stackc::context::Context;
//! use stackc::ExprLowerer;
//!
//! let mut ctx = Context::default();
//! let err = ExprLowerer::new(&mut ctx).lower(&Expr::name("missing")).unwrap_err();
//! let diagnostic = err.to_diagnostic();
//! assert_eq!(diagnostic.code.as_deref(), Some("E0603"));
//! ```
//!
//! ## Module Overview
//!
//! - [`ast`] - The typed expression tree the lowerer consumes
//! - [`builtins`] - Builtin function registry (`len`, `keccak256`)
//! - [`config`] - Lowering configuration (TOML file and environment)
//! - [`context`] - The environment interface and its stock implementation
//! - [`diagnostics`] - Error reporting infrastructure
//! - [`error`] - Lowering errors and decline reasons
//! - [`ir`] - The lowered IR tree
//! - [`lower`] - The expression lowerer
//! - [`span`] - Source location tracking
//! - [`types`] - Type descriptors and numeric bounds

pub mod ast;
pub mod builtins;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod ir;
pub mod lower;
pub mod span;
pub mod types;

// Re-export commonly used types
pub use config::LowerConfig;
pub use context::{Context, Environment, EvmVersion};
pub use diagnostics::{Diagnostic, DiagnosticEmitter, DiagnosticKind, ErrorCode};
pub use error::{Decline, LowerError, LowerErrorKind, LowerResult, Outcome};
pub use ir::{IrNode, Location};
pub use lower::{CallLowering, ExprLowerer, UnsupportedCalls};
pub use span::Span;
pub use types::{BaseKind, Type};
