//! Expression lowering.
//!
//! [`ExprLowerer`] turns one typed expression into one [`IrNode`]. It
//! dispatches on the node kind to exactly one handler; handlers recurse
//! through [`ExprLowerer::lower_expr`] for their children.
//!
//! # Failure channels
//!
//! Handlers return `LowerResult<Outcome>`:
//!
//! - `Err(_)`: a fatal error (version gate, malformed node, bad literal).
//! - `Ok(Outcome::Declined(_))`: the handler has no IR for this node. Call
//!   lowering uses this to try the next interpretation of a callee name;
//!   everywhere else the decline reaches [`ExprLowerer::lower_expr`] and
//!   becomes a fatal `NoIr` error.
//!
//! # Literal types
//!
//! Recursive lowering keeps literal bits on types so that a parent can
//! still widen an integer literal toward its sibling's type. The public
//! entry point [`ExprLowerer::lower`] commits every type before returning.

mod arith;
mod boolop;
pub mod bounds;
mod call;
mod composite;
mod compare;
pub mod layout;
mod literal;
mod reference;

#[cfg(test)]
mod tests;

use tracing::debug;

use crate::ast::{Expr, ExprKind};
use crate::builtins::BuiltinRegistry;
use crate::context::Environment;
use crate::error::{Decline, LowerError, LowerErrorKind, LowerResult, Outcome};
use crate::ir::IrNode;
use crate::span::Span;
use crate::types::Type;

pub use literal::{checksum_encode, decimal_fraction, DecimalLiteralError};

/// Lowering of calls the expression stage does not own: calls to other
/// functions of this contract and calls to external contracts.
pub trait CallLowering {
    /// `self.<method>(args...)`
    fn lower_self_call(
        &self,
        method: &str,
        args: &[Expr],
        span: Span,
        lowerer: &mut ExprLowerer<'_>,
    ) -> LowerResult<IrNode>;

    /// `<target>.<method>(args...)` and any other callee shape.
    fn lower_external_call(
        &self,
        func: &Expr,
        args: &[Expr],
        span: Span,
        lowerer: &mut ExprLowerer<'_>,
    ) -> LowerResult<IrNode>;
}

/// The default [`CallLowering`]: every internal or external call is a
/// structure error.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedCalls;

impl CallLowering for UnsupportedCalls {
    fn lower_self_call(
        &self,
        method: &str,
        _args: &[Expr],
        span: Span,
        _lowerer: &mut ExprLowerer<'_>,
    ) -> LowerResult<IrNode> {
        LowerError::structure(
            format!("cannot lower internal call `self.{method}`: no call lowering is configured"),
            span,
        )
        .into_err()
    }

    fn lower_external_call(
        &self,
        _func: &Expr,
        _args: &[Expr],
        span: Span,
        _lowerer: &mut ExprLowerer<'_>,
    ) -> LowerResult<IrNode> {
        LowerError::structure("cannot lower external call: no call lowering is configured", span)
            .into_err()
    }
}

static UNSUPPORTED_CALLS: UnsupportedCalls = UnsupportedCalls;

/// The expression lowerer.
///
/// Holds the environment of the function being compiled for the duration
/// of one pass. Scratch allocations made through it are never reclaimed.
pub struct ExprLowerer<'a> {
    env: &'a mut dyn Environment,
    builtins: &'a BuiltinRegistry,
    calls: &'a dyn CallLowering,
}

impl<'a> ExprLowerer<'a> {
    /// A lowerer with the standard builtins and no internal/external calls.
    pub fn new(env: &'a mut dyn Environment) -> Self {
        Self {
            env,
            builtins: BuiltinRegistry::standard(),
            calls: &UNSUPPORTED_CALLS,
        }
    }

    pub fn with_builtins(mut self, builtins: &'a BuiltinRegistry) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn with_calls(mut self, calls: &'a dyn CallLowering) -> Self {
        self.calls = calls;
        self
    }

    pub fn env(&self) -> &dyn Environment {
        &*self.env
    }

    pub fn env_mut(&mut self) -> &mut dyn Environment {
        &mut *self.env
    }

    /// Lower an expression for the backend. Every type in the result is
    /// committed.
    pub fn lower(&mut self, expr: &Expr) -> LowerResult<IrNode> {
        Ok(self.lower_expr(expr)?.into_committed())
    }

    /// Lower an expression, keeping literal types.
    pub fn lower_expr(&mut self, expr: &Expr) -> LowerResult<IrNode> {
        debug!(node = expr.kind.name(), span = %expr.span, "lowering expression");
        match self.dispatch(expr)? {
            Outcome::Lowered(node) => {
                if node.span.is_some() {
                    Ok(node)
                } else {
                    Ok(node.at(expr.span))
                }
            }
            Outcome::Declined(reason) => {
                debug!(node = expr.kind.name(), %reason, "no IR produced");
                LowerError::new(LowerErrorKind::NoIr { node: expr.kind.name(), reason }, expr.span)
                    .into_err()
            }
        }
    }

    /// Lower an expression that denotes a value: word-sized results with a
    /// location are loaded.
    pub fn lower_value(&mut self, expr: &Expr) -> LowerResult<IrNode> {
        Ok(layout::unwrap_location(self.lower_expr(expr)?))
    }

    /// Lower an expression that must denote an address in memory, calldata
    /// or storage.
    pub fn lower_location(&mut self, expr: &Expr) -> LowerResult<IrNode> {
        let node = self.lower_expr(expr)?;
        if node.location.is_none() {
            return LowerError::structure(
                "Looking for a variable location, instead got a value",
                expr.span,
            )
            .into_err();
        }
        Ok(node)
    }

    fn dispatch(&mut self, expr: &Expr) -> LowerResult<Outcome> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Int { value } => self.lower_int(value, span),
            ExprKind::Decimal { value } => self.lower_decimal(value, span),
            ExprKind::Str { value } => self.lower_str(value, span),
            ExprKind::Bytes { value } => self.lower_bytes(value, span),
            ExprKind::Bool { value } => Ok(self.lower_bool(*value, span)),
            ExprKind::NoneLit => Ok(Decline::Other {
                message: "`None` has no value representation".to_string(),
            }
            .into()),
            ExprKind::Hex { value } => self.lower_hex(value, span),
            ExprKind::Name { id } => self.lower_name(id, span),
            ExprKind::Attribute { value, attr } => self.lower_attribute(value, attr, span),
            ExprKind::Subscript { value, index } => self.lower_subscript(value, index, span),
            ExprKind::BinOp { left, op, right } => self.lower_binop(left, *op, right, span),
            ExprKind::Compare { left, op, right } => self.lower_compare(left, *op, right, span),
            ExprKind::BoolOp { op, values } => self.lower_boolop(*op, values, span),
            ExprKind::UnaryOp { op, operand } => self.lower_unaryop(*op, operand, span),
            ExprKind::Call { func, args } => self.lower_call(func, args, span),
            ExprKind::List { elts } => self.lower_list(elts, span),
            ExprKind::Tuple { elts } => self.lower_tuple(elts, span),
            ExprKind::Dict { .. } => Ok(Decline::Other {
                message: "dictionary literals are only valid as struct constructor arguments"
                    .to_string(),
            }
            .into()),
        }
    }

    /// Reserve scratch memory for a value of `typ`.
    pub(crate) fn placeholder(&mut self, typ: &Type, span: Span) -> LowerResult<u64> {
        match self.env.new_scratch_placeholder(typ) {
            Some(pos) => Ok(pos),
            None => LowerError::structure(format!("`{typ}` cannot be placed in memory"), span)
                .into_err(),
        }
    }
}
