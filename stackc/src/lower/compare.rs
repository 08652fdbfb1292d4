//! Comparison and membership operators.

use tracing::debug;

use super::arith::widen_literal;
use super::layout;
use super::ExprLowerer;
use crate::ast::{CmpOp, Expr};
use crate::error::{Decline, LowerResult, Outcome};
use crate::ir;
use crate::ir::{IrNode, Location};
use crate::span::Span;
use crate::types::{BaseKind, MemoryPositions, Type};

/// Signed opcode for a comparison operator.
fn signed_opcode(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Gt => "sgt",
        CmpOp::GtE => "sge",
        CmpOp::LtE => "sle",
        CmpOp::Lt => "slt",
        CmpOp::Eq => "eq",
        CmpOp::NotEq | CmpOp::In => "ne",
    }
}

/// Unsigned counterpart of a signed opcode; `eq`/`ne` are unchanged.
fn unsigned_opcode(op: &'static str) -> &'static str {
    match op {
        "sgt" => "gt",
        "sge" => "ge",
        "sle" => "le",
        "slt" => "lt",
        other => other,
    }
}

fn is_equality(op: CmpOp) -> bool {
    matches!(op, CmpOp::Eq | CmpOp::NotEq)
}

fn type_name(node: &IrNode) -> String {
    node.ty().map(ToString::to_string).unwrap_or_else(|| "?".to_string())
}

fn incompatible(op: CmpOp, left: &IrNode, right: &IrNode) -> Outcome {
    Decline::IncompatibleOperands { op: op.as_str(), left: type_name(left), right: type_name(right) }.into()
}

impl<'a> ExprLowerer<'a> {
    pub(crate) fn lower_compare(
        &mut self,
        left_expr: &Expr,
        op: CmpOp,
        right_expr: &Expr,
        span: Span,
    ) -> LowerResult<Outcome> {
        if op == CmpOp::In {
            return self.lower_membership(left_expr, right_expr, span);
        }
        let left = self.lower_value(left_expr)?;
        let right = self.lower_value(right_expr)?;
        let (Some(ltype), Some(rtype)) = (left.typ.clone(), right.typ.clone()) else {
            return Ok(incompatible(op, &left, &right));
        };

        if ltype.is_byte_array_like() && rtype.is_byte_array_like() {
            return self.compare_byte_arrays(left, op, right, span);
        }

        let opcode = signed_opcode(op);
        let (left, right, opcode) = match (ltype.as_base(), rtype.as_base()) {
            (Some(lkind), Some(rkind)) if lkind.is_numeric() && rkind.is_numeric() => {
                if lkind == rkind {
                    let opcode = if lkind == BaseKind::Uint256 { unsigned_opcode(opcode) } else { opcode };
                    (left, right, opcode)
                } else {
                    match widen_mixed(left, lkind, right, rkind) {
                        Ok((left, right)) => (left, right, unsigned_opcode(opcode)),
                        Err((left, right)) => return Ok(incompatible(op, &left, &right)),
                    }
                }
            }
            _ => {
                if !is_equality(op) || ltype != rtype {
                    return Ok(incompatible(op, &left, &right));
                }
                (left, right, opcode)
            }
        };

        Ok(IrNode::op(opcode, vec![left, right]).typed(Type::bool()).at(span).into())
    }

    /// `==`/`!=` between byte arrays. Arrays of one word or less with the
    /// same declared length compare their first word; anything else compares
    /// hashes.
    fn compare_byte_arrays(&mut self, left: IrNode, op: CmpOp, right: IrNode, span: Span) -> LowerResult<Outcome> {
        if !is_equality(op) {
            return Ok(incompatible(op, &left, &right));
        }
        let lmax = left.ty().and_then(Type::byte_array_maxlen).unwrap_or_default();
        let rmax = right.ty().and_then(Type::byte_array_maxlen).unwrap_or_default();
        let opcode = signed_opcode(op);

        let (l, r) = if lmax != rmax || lmax > 32 || rmax > 32 {
            debug!(lmax, rmax, "comparing byte arrays by hash");
            let l = layout::keccak_bytes(left, self.env_mut(), span)?;
            let r = layout::keccak_bytes(right, self.env_mut(), span)?;
            (l, r)
        } else {
            (layout::load_first_word(left, span)?, layout::load_first_word(right, span)?)
        };
        Ok(IrNode::op(opcode, vec![l, r]).typed(Type::bool()).at(span).into())
    }

    /// `x in list`: a bounded loop over the list that stops at the first
    /// element equal to `x`.
    pub(crate) fn lower_membership(&mut self, left_expr: &Expr, right_expr: &Expr, span: Span) -> LowerResult<Outcome> {
        let left = self.lower_value(left_expr)?;
        let right = self.lower_expr(right_expr)?;

        let Some((subtype, count)) = right.ty().and_then(Type::list_parts).map(|(s, c)| (s.clone(), c)) else {
            return Ok(Decline::UnsupportedOperand { op: CmpOp::In.as_str(), found: type_name(&right) }.into());
        };
        let Some(subkind) = subtype.as_base() else {
            return Ok(Decline::UnsupportedOperand { op: CmpOp::In.as_str(), found: type_name(&right) }.into());
        };
        let left = match left.ty().and_then(Type::as_base) {
            Some(kind) if kind == subkind => left,
            Some(_) => match widen_literal(left, subkind) {
                Ok(widened) => widened,
                Err(left) => return Ok(incompatible(CmpOp::In, &left, &right)),
            },
            None => return Ok(incompatible(CmpOp::In, &left, &right)),
        };

        let result_placeholder = self.placeholder(&Type::bool(), span)?;
        let loop_index = ir!(["mload", { MemoryPositions::FREE_LOOP_INDEX }]);

        let mut setup = Vec::new();
        let load_i = if right.is_op("multi") {
            let Some(list_type) = right.typ.clone() else {
                return Ok(incompatible(CmpOp::In, &left, &right));
            };
            let tmp_list = self.placeholder(&list_type, span)?;
            setup.push(layout::make_memory_setter(tmp_list, right, span)?);
            ir!(["mload", ["add", { tmp_list }, ["mul", 32, loop_index]]])
        } else {
            match right.location {
                Some(Location::Storage) => ir!(["sload", ["add", ["sha3_32", right], loop_index]]),
                Some(location) => {
                    IrNode::op(location.load_op(), vec![ir!(["add", right, ["mul", 32, loop_index]])])
                }
                None => return Ok(incompatible(CmpOp::In, &left, &right)),
            }
        };

        let found = ir!(["if", ["eq", left, load_i], ["seq", ["mstore", "_result", 1], "break"]]);
        let mut body = setup;
        body.push(ir!(["mstore", { result_placeholder }, 0]));
        body.push(ir!([
            "with",
            "_result",
            { result_placeholder },
            ["repeat", { MemoryPositions::FREE_LOOP_INDEX }, 0, { count }, found]
        ]));
        body.push(ir!(["mload", { result_placeholder }]));

        let node = ir!(["eq", 1, { IrNode::op("seq", body) }]);
        Ok(node.typed(Type::bool()).annotated("in comparator").at(span).into())
    }
}

/// Mixed `int128`/`uint256` operands are compared unsigned when exactly one
/// side is a literal that fits the other side's kind.
fn widen_mixed(
    left: IrNode,
    lkind: BaseKind,
    right: IrNode,
    rkind: BaseKind,
) -> Result<(IrNode, IrNode), (IrNode, IrNode)> {
    let mixed_ints = matches!(
        (lkind, rkind),
        (BaseKind::Int128, BaseKind::Uint256) | (BaseKind::Uint256, BaseKind::Int128)
    );
    if !mixed_ints || left.is_literal() == right.is_literal() {
        return Err((left, right));
    }
    if left.is_literal() {
        match widen_literal(left, rkind) {
            Ok(left) => Ok((left, right)),
            Err(left) => Err((left, right)),
        }
    } else {
        match widen_literal(right, lkind) {
            Ok(right) => Ok((left, right)),
            Err(right) => Err((left, right)),
        }
    }
}
