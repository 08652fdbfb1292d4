//! List, struct and tuple literals.
//!
//! All three lower to a `multi` node whose arguments are the element values
//! in order. Tuples additionally hoist call elements into scratch memory so
//! that no call runs while the tuple itself is being assembled.

use indexmap::IndexMap;
use tracing::debug;

use super::layout;
use super::ExprLowerer;
use crate::ast::Expr;
use crate::error::{Decline, LowerError, LowerResult, Outcome};
use crate::ir::{IrNode, Location};
use crate::span::Span;
use crate::types::Type;

impl<'a> ExprLowerer<'a> {
    pub(crate) fn lower_list(&mut self, elts: &[Expr], span: Span) -> LowerResult<Outcome> {
        let mut elements = Vec::with_capacity(elts.len());
        for elt in elts {
            elements.push(self.lower_value(elt)?);
        }
        let Some(first_type) = elements.first().and_then(|e| e.typ.clone()) else {
            return Ok(Decline::Empty { what: "list" }.into());
        };
        for (elt, element) in elts.iter().zip(&elements) {
            if element.ty() != Some(&first_type) {
                return LowerError::type_mismatch("Lists may only contain one type", elt.span).into_err();
            }
        }
        let typ = Type::list(first_type, elements.len());
        Ok(IrNode::op("multi", elements).typed(typ).at(span).into())
    }

    /// The `{member: value}` argument of a struct constructor, in the order
    /// written.
    pub(crate) fn lower_struct_literal(
        &mut self,
        name: &str,
        keys: &[Expr],
        values: &[Expr],
        span: Span,
    ) -> LowerResult<Outcome> {
        let Some(declared) = self.env().lookup_struct(name).cloned() else {
            return Ok(Decline::Other { message: format!("`{name}` is not a struct") }.into());
        };

        let mut members = IndexMap::with_capacity(keys.len());
        let mut elements = Vec::with_capacity(keys.len());
        for (key, value) in keys.iter().zip(values) {
            let Some(member) = key.as_name() else {
                return Ok(Decline::Other { message: "struct member names must be identifiers".to_string() }.into());
            };
            if !declared.contains_key(member) {
                return LowerError::structure("Invalid member variable for struct", key.span)
                    .with_help(format!("`{name}` has no member `{member}`"))
                    .into_err();
            }
            if members.contains_key(member) {
                return Ok(Decline::Other { message: format!("member `{member}` is given twice") }.into());
            }
            let node = self.lower_value(value)?;
            let Some(typ) = node.typ.clone() else {
                return LowerError::panic("untyped struct member", value.span).into_err();
            };
            members.insert(member.to_string(), typ);
            elements.push(node);
        }

        let typ = Type::Struct { name: name.to_string(), members, is_literal: true };
        Ok(IrNode::op("multi", elements).typed(typ).at(span).into())
    }

    pub(crate) fn lower_tuple(&mut self, elts: &[Expr], span: Span) -> LowerResult<Outcome> {
        if elts.is_empty() {
            return Ok(Decline::Empty { what: "tuple" }.into());
        }

        let mut hoisted = Vec::new();
        let mut elements = Vec::with_capacity(elts.len());
        let mut members = Vec::with_capacity(elts.len());
        for elt in elts {
            let node = self.lower_value(elt)?;
            let Some(typ) = node.typ.clone() else {
                return LowerError::panic("untyped tuple element", elt.span).into_err();
            };
            let element = if elt.is_call() {
                let slot = self.placeholder(&typ, elt.span)?;
                debug!(slot, %typ, "hoisting call out of tuple literal");
                hoisted.push(layout::make_memory_setter(slot, node, elt.span)?);
                IrNode::int(slot).typed(typ.clone()).located(Some(Location::Memory)).at(elt.span)
            } else {
                node
            };
            members.push(typ);
            elements.push(element);
        }

        let typ = Type::Tuple { members, is_literal: true };
        let multi = IrNode::op("multi", elements).typed(typ.clone());
        if hoisted.is_empty() {
            return Ok(multi.at(span).into());
        }
        hoisted.push(multi);
        Ok(IrNode::op("seq_unchecked", hoisted).typed(typ).at(span).into())
    }
}
