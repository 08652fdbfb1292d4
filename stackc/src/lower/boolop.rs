//! Short-circuiting `and` / `or`.
//!
//! Chains are folded right to left into nested `if` nodes. Once the result
//! of a chain of three or more operands is known, the branch jumps to a
//! label placed after the whole chain, so later operands are never
//! evaluated. The label is named after the chain's source span, or numbered
//! by the environment when the chain has none:
//!
//! ```text
//! a and b and c  =>  (seq_unchecked
//!                      (if a (if b c 0) (seq_unchecked 0 (goto L)))
//!                      (label L))
//! a or b or c    =>  (seq_unchecked
//!                      (if a (seq_unchecked 1 (goto L))
//!                            (if b (seq_unchecked 1 (goto L)) c))
//!                      (label L))
//! ```

use super::ExprLowerer;
use crate::ast::{BoolOpKind, Expr};
use crate::error::{Decline, LowerError, LowerResult, Outcome};
use crate::ir;
use crate::span::Span;
use crate::types::{BaseKind, Type};

impl<'a> ExprLowerer<'a> {
    pub(crate) fn lower_boolop(&mut self, op: BoolOpKind, values: &[Expr], span: Span) -> LowerResult<Outcome> {
        if values.len() < 2 {
            return LowerError::structure(
                format!("`{}` needs at least two operands, found {}", op.as_str(), values.len()),
                span,
            )
            .into_err();
        }

        let mut lowered = Vec::with_capacity(values.len());
        for value in values {
            let node = self.lower_value(value)?;
            if !node.ty().is_some_and(|t| t.is_base(BaseKind::Bool)) {
                let found = node.ty().map(ToString::to_string).unwrap_or_default();
                return Ok(Decline::NonBoolean { op: op.as_str(), found }.into());
            }
            lowered.push(node);
        }

        // Synthesized chains have no source position to tell them apart.
        let label = if span.is_empty() {
            format!("_boolop_{}", self.env.next_label_id())
        } else {
            format!("_boolop_{}:{}", span.start, span.len())
        };
        let jump = |value: i32| ir!(["seq_unchecked", { value }, ["goto", { label.as_str() }]]);

        let Some(last) = lowered.pop() else {
            return LowerError::panic("empty boolean chain", span).into_err();
        };
        let Some(second_last) = lowered.pop() else {
            return LowerError::panic("boolean chain with one operand", span).into_err();
        };

        let node = match op {
            BoolOpKind::And if lowered.is_empty() => {
                return Ok(ir!(["if", second_last, last, 0]).typed(Type::bool()).at(span).into());
            }
            BoolOpKind::And => {
                let innermost = ir!(["if", second_last, last, 0]);
                lowered
                    .into_iter()
                    .rev()
                    .fold(innermost, |inner, value| ir!(["if", value, inner, { jump(0) }]))
            }
            BoolOpKind::Or => {
                let innermost = ir!(["if", second_last, { jump(1) }, last]);
                lowered
                    .into_iter()
                    .rev()
                    .fold(innermost, |inner, value| ir!(["if", value, { jump(1) }, inner]))
            }
        };

        let chained = ir!(["seq_unchecked", node, ["label", { label.as_str() }]]);
        Ok(chained.typed(Type::bool()).at(span).into())
    }
}
