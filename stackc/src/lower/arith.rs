//! Arithmetic and unary operators.
//!
//! Every arithmetic result is guarded for its declared type:
//!
//! | kind    | `+` / `-`               | `*`                         | `/` `%`                 |
//! |---------|-------------------------|-----------------------------|-------------------------|
//! | uint256 | `assert` on wraparound  | `assert` on `ans / l == r`  | non-zero divisor clamp  |
//! | int128  | range clamp             | range clamp                 | clamp + non-zero clamp  |
//! | decimal | range clamp             | inverse check, descale, clamp | prescale, clamps      |
//!
//! Operands are bound once with `with l .. (with r ..)` so that each side
//! is evaluated exactly once.

use num_bigint::BigInt;
use num_traits::{One, Zero};

use super::bounds::{self, BoundsError};
use super::ExprLowerer;
use crate::ast::{BinOpKind, Expr, UnaryOpKind};
use crate::error::{Decline, LowerError, LowerResult, Outcome};
use crate::ir;
use crate::ir::IrNode;
use crate::span::Span;
use crate::types::{BaseKind, MemoryPositions, SizeLimits, Type};

/// Re-read an integer literal of one of `int128`/`uint256` as the other
/// kind when the value fits.
pub(super) fn widen_literal(node: IrNode, to: BaseKind) -> Result<IrNode, IrNode> {
    let fits = node.is_literal()
        && node.as_int().is_some_and(|v| SizeLimits::in_bounds(to, v));
    if fits {
        Ok(node.typed(Type::literal(to)))
    } else {
        Err(node)
    }
}

fn kind_of(node: &IrNode) -> Option<BaseKind> {
    node.ty().and_then(Type::as_base)
}

fn type_name(node: &IrNode) -> String {
    node.ty().map(ToString::to_string).unwrap_or_else(|| "?".to_string())
}

/// `clamp (mload MIN) x (mload MAX)` for the signed kinds.
fn range_clamp(kind: BaseKind, arith: IrNode) -> IrNode {
    match kind {
        BaseKind::Int128 => ir!([
            "clamp",
            ["mload", { MemoryPositions::MINNUM }],
            arith,
            ["mload", { MemoryPositions::MAXNUM }]
        ]),
        BaseKind::Decimal => ir!([
            "clamp",
            ["mload", { MemoryPositions::MINDECIMAL }],
            arith,
            ["mload", { MemoryPositions::MAXDECIMAL }]
        ]),
        _ => arith,
    }
}

fn bounds_error(err: BoundsError, span: Span) -> Box<LowerError> {
    let error = match err {
        BoundsError::BitWidth(_) | BoundsError::Degenerate(_) | BoundsError::NoConvergence => {
            LowerError::panic(err.to_string(), span)
        }
        _ => LowerError::invalid_literal(format!("exponentiation bound: {err}"), span),
    };
    Box::new(error)
}

impl<'a> ExprLowerer<'a> {
    pub(crate) fn lower_binop(
        &mut self,
        left_expr: &Expr,
        op: BinOpKind,
        right_expr: &Expr,
        span: Span,
    ) -> LowerResult<Outcome> {
        let mut left = self.lower_value(left_expr)?;
        let mut right = self.lower_value(right_expr)?;

        let (Some(lkind), Some(rkind)) = (kind_of(&left), kind_of(&right)) else {
            return Ok(incompatible(op, &left, &right));
        };
        if !lkind.is_numeric() || !rkind.is_numeric() {
            return Ok(incompatible(op, &left, &right));
        }

        if lkind != rkind && lkind != BaseKind::Decimal && rkind != BaseKind::Decimal {
            left = match widen_literal(left, rkind) {
                Ok(widened) => widened,
                Err(left) => {
                    right = widen_literal(right, lkind).unwrap_or_else(|r| r);
                    left
                }
            };
        }

        let (Some(lkind), Some(rkind)) = (kind_of(&left), kind_of(&right)) else {
            return Ok(incompatible(op, &left, &right));
        };
        if lkind == BaseKind::Decimal && op == BinOpKind::Pow {
            return Ok(Decline::UnsupportedOperand { op: op.as_str(), found: type_name(&left) }.into());
        }
        if lkind != rkind {
            return Ok(incompatible(op, &left, &right));
        }
        let kind = lkind;
        let result_type = Type::base(kind);

        if op == BinOpKind::Pow {
            return self.lower_pow(left_expr, right_expr, left, right, kind, span);
        }

        let divisor_is_nonzero_const = right.as_int().is_some_and(|v| !v.is_zero());
        let divisor = || {
            if divisor_is_nonzero_const {
                IrNode::sym("r")
            } else {
                ir!(["clamp_nonzero", "r"])
            }
        };
        let decimal_divisor = SizeLimits::decimal_divisor();

        let arith = match (op, kind) {
            (BinOpKind::Add, BaseKind::Uint256) => {
                ir!(["seq", ["assert", ["ge", ["add", "l", "r"], "l"]], ["add", "l", "r"]])
            }
            (BinOpKind::Sub, BaseKind::Uint256) => {
                ir!(["seq", ["assert", ["ge", "l", "r"]], ["sub", "l", "r"]])
            }
            (BinOpKind::Add, _) => ir!(["add", "l", "r"]),
            (BinOpKind::Sub, _) => ir!(["sub", "l", "r"]),
            (BinOpKind::Mult, BaseKind::Uint256) => ir!([
                "with",
                "ans",
                ["mul", "l", "r"],
                ["seq", ["assert", ["or", ["eq", ["div", "ans", "l"], "r"], ["iszero", "l"]]], "ans"]
            ]),
            (BinOpKind::Mult, BaseKind::Decimal) => ir!([
                "with",
                "ans",
                ["mul", "l", "r"],
                [
                    "seq",
                    ["assert", ["or", ["eq", ["sdiv", "ans", "l"], "r"], ["iszero", "l"]]],
                    ["sdiv", "ans", { &decimal_divisor }]
                ]
            ]),
            (BinOpKind::Mult, _) => ir!(["mul", "l", "r"]),
            (BinOpKind::Div | BinOpKind::Mod, _) if right.as_int().is_some_and(Zero::is_zero) => {
                return Ok(Decline::ZeroDivisor.into());
            }
            (BinOpKind::Div, BaseKind::Uint256) => ir!(["div", "l", { divisor() }]),
            (BinOpKind::Div, BaseKind::Int128) => ir!(["sdiv", "l", { divisor() }]),
            (BinOpKind::Div, _) => ir!(["sdiv", ["mul", "l", { &decimal_divisor }], { divisor() }]),
            (BinOpKind::Mod, BaseKind::Uint256) => ir!(["mod", "l", { divisor() }]),
            (BinOpKind::Mod, _) => ir!(["smod", "l", { divisor() }]),
            (BinOpKind::Pow, _) => unreachable!("exponentiation is lowered above"),
        };

        let guarded = range_clamp(kind, arith);
        let node = ir!(["with", "l", left, ["with", "r", right, ["seq", guarded]]]);
        Ok(node.typed(result_type).at(span).into())
    }

    /// `a ** b` with at least one literal side.
    fn lower_pow(
        &mut self,
        left_expr: &Expr,
        right_expr: &Expr,
        left: IrNode,
        right: IrNode,
        kind: BaseKind,
        span: Span,
    ) -> LowerResult<Outcome> {
        let result_type = Type::base(kind);
        if let Some(base) = left_expr.as_int_literal() {
            if base.is_one() {
                return Ok(IrNode::int(1).typed(result_type).at(span).into());
            }
            if base.is_zero() {
                return Ok(ir!(["iszero", right]).typed(result_type).at(span).into());
            }
        }
        if let Some(exponent) = right_expr.as_int_literal() {
            if exponent.is_zero() {
                return Ok(IrNode::int(1).typed(result_type).at(span).into());
            }
            if exponent.is_one() {
                return Ok(left.typed(result_type).at(span).into());
            }
        }

        let (num_bits, is_signed) = match kind {
            BaseKind::Int128 => (128, true),
            _ => (256, false),
        };

        let clamp = if let Some(base) = left_expr.as_int_literal() {
            let largest = bounds::calculate_largest_power(base, num_bits, is_signed)
                .map_err(|e| bounds_error(e, span))?;
            // The unsigned compare also rejects negative exponents.
            ir!(["lt", "r", { u64::from(largest) + 1 }])
        } else if let Some(exponent) = right_expr.as_int_literal() {
            let upper_bound = bounds::calculate_largest_base(exponent, num_bits, is_signed)
                .map_err(|e| bounds_error(e, span))?
                + 1;
            if is_signed {
                ir!(["and", ["slt", "l", { &upper_bound }], ["sgt", "l", { -&upper_bound }]])
            } else {
                ir!(["lt", "l", { &upper_bound }])
            }
        } else {
            return Ok(Decline::UnboundedPower.into());
        };

        let node = ir!(["with", "l", left, ["with", "r", right, ["seq", ["assert", clamp], ["exp", "l", "r"]]]]);
        Ok(node.typed(result_type).at(span).into())
    }

    pub(crate) fn lower_unaryop(&mut self, op: UnaryOpKind, operand_expr: &Expr, span: Span) -> LowerResult<Outcome> {
        let operand = self.lower_value(operand_expr)?;
        match op {
            UnaryOpKind::Not => {
                if !operand.ty().is_some_and(|t| t.is_base(BaseKind::Bool)) {
                    return Ok(Decline::NonBoolean { op: op.as_str(), found: type_name(&operand) }.into());
                }
                Ok(ir!(["iszero", operand]).typed(Type::bool()).at(span).into())
            }
            UnaryOpKind::USub => {
                let Some(kind) = kind_of(&operand).filter(|k| k.is_numeric()) else {
                    return Ok(Decline::UnsupportedOperand { op: op.as_str(), found: type_name(&operand) }.into());
                };
                let Some(min) = kind.min_value() else {
                    return LowerError::type_mismatch(format!("Not a signed type: {kind}"), span).into_err();
                };
                let typ = operand.typ.clone();
                let mut node = ir!(["sub", 0, ["clampgt", operand, min]]);
                node.typ = typ;
                Ok(node.at(span).into())
            }
        }
    }
}

fn incompatible(op: BinOpKind, left: &IrNode, right: &IrNode) -> Outcome {
    Decline::IncompatibleOperands { op: op.as_str(), left: type_name(left), right: type_name(right) }.into()
}
