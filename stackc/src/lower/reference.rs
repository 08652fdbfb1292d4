//! Names, attributes and subscripts.

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use super::layout::{self, OffsetKey};
use super::ExprLowerer;
use crate::ast::Expr;
use crate::context::EvmVersion;
use crate::error::{Decline, LowerError, LowerErrorKind, LowerResult, Outcome};
use crate::ir;
use crate::ir::{IrNode, Location};
use crate::span::Span;
use crate::types::{BaseKind, SizeLimits, Type};

/// Reserved names whose attributes read the execution environment.
const ENVIRONMENT_VARIABLES: [&str; 4] = ["block", "msg", "tx", "chain"];

/// Attributes available on any address value.
const ADDRESS_ATTRIBUTES: [&str; 4] = ["balance", "codesize", "is_contract", "codehash"];

fn builtin_constant(name: &str) -> Option<(BigInt, BaseKind)> {
    let constant = match name {
        "EMPTY_BYTES32" => (BigInt::zero(), BaseKind::Bytes32),
        "ZERO_ADDRESS" => (BigInt::zero(), BaseKind::Address),
        "MAX_INT128" => (SizeLimits::max_int128(), BaseKind::Int128),
        "MIN_INT128" => (SizeLimits::min_int128(), BaseKind::Int128),
        "MAX_DECIMAL" => (SizeLimits::max_decimal(), BaseKind::Decimal),
        "MIN_DECIMAL" => (SizeLimits::min_decimal(), BaseKind::Decimal),
        "MAX_UINT256" => (SizeLimits::max_uint256(), BaseKind::Uint256),
        _ => return None,
    };
    Some(constant)
}

impl<'a> ExprLowerer<'a> {
    pub(crate) fn lower_name(&mut self, id: &str, span: Span) -> LowerResult<Outcome> {
        if id == "self" {
            return Ok(IrNode::sym("address").typed(Type::address()).at(span).into());
        }
        if let Some(var) = self.env().lookup_variable(id) {
            let node = IrNode::int(var.pos)
                .typed(var.typ.clone())
                .located(Some(var.location))
                .with_mutable(var.mutable)
                .annotated(id)
                .at(span);
            return Ok(node.into());
        }
        if let Some((value, kind)) = builtin_constant(id) {
            return Ok(IrNode::int(value).typed(Type::literal(kind)).at(span).into());
        }
        LowerError::new(LowerErrorKind::Undeclared { name: id.to_string() }, span).into_err()
    }

    pub(crate) fn lower_attribute(&mut self, value: &Expr, attr: &str, span: Span) -> LowerResult<Outcome> {
        if let Some(namespace) = value.as_name().filter(|n| ENVIRONMENT_VARIABLES.contains(n)) {
            if self.env().lookup_variable(namespace).is_none() {
                return self.lower_environment_variable(namespace, attr, span);
            }
        }

        if value.is_self() && !ADDRESS_ATTRIBUTES.contains(&attr) {
            let Some(field) = self.env().lookup_self_field(attr) else {
                return LowerError::new(LowerErrorKind::Undeclared { name: format!("self.{attr}") }, span)
                    .into_err();
            };
            let node = IrNode::int(field.slot)
                .typed(field.typ.clone())
                .located(Some(Location::Storage))
                .with_mutable(!field.constant)
                .annotated(format!("self.{attr}"))
                .at(span);
            return Ok(node.into());
        }

        if attr == "codehash" && !self.env().vm_version_at_least(EvmVersion::Constantinople) {
            return LowerError::evm_version("address.codehash", EvmVersion::Constantinople.as_str(), span)
                .into_err();
        }

        let sub = self.lower_expr(value)?;
        if sub.ty().is_some_and(|t| t.is_base(BaseKind::Address)) && ADDRESS_ATTRIBUTES.contains(&attr) {
            let is_self = value.is_self();
            return Ok(self.address_attribute(layout::unwrap_location(sub), attr, is_self, span));
        }

        if sub.location.is_none() {
            return LowerError::structure("Looking for a variable location, instead got a value", value.span)
                .into_err();
        }
        if matches!(sub.ty(), Some(Type::Interface { .. })) {
            return Ok(sub.into());
        }
        let member = sub
            .ty()
            .and_then(Type::struct_members)
            .and_then(|members| members.get_index_of(attr));
        match member {
            Some(index) => {
                let annotation = sub.annotation.as_ref().map(|a| format!("{a}.{attr}"));
                let mut node = layout::add_variable_offset(sub, OffsetKey::Member(index), span)?;
                node.annotation = annotation;
                Ok(node.into())
            }
            None => Ok(Decline::UnknownAttribute { attr: attr.to_string() }.into()),
        }
    }

    fn address_attribute(&self, addr: IrNode, attr: &str, is_self: bool, span: Span) -> Outcome {
        let istanbul = self.env().vm_version_at_least(EvmVersion::Istanbul);
        let (node, typ) = match attr {
            "balance" if is_self && istanbul => (IrNode::sym("selfbalance"), Type::uint256()),
            "balance" => (ir!(["balance", addr]), Type::uint256()),
            "codesize" if is_self => (IrNode::sym("codesize"), Type::uint256()),
            "codesize" => (ir!(["extcodesize", addr]), Type::uint256()),
            "is_contract" => (ir!(["gt", ["extcodesize", addr], 0]), Type::bool()),
            "codehash" => (ir!(["extcodehash", addr]), Type::bytes32()),
            _ => return Decline::UnknownAttribute { attr: attr.to_string() }.into(),
        };
        node.typed(typ).at(span).into()
    }

    fn lower_environment_variable(&mut self, namespace: &str, attr: &str, span: Span) -> LowerResult<Outcome> {
        let (node, typ) = match (namespace, attr) {
            ("msg", "sender") => {
                if self.env().is_internal_call_context() {
                    return LowerError::structure("msg.sender is not available in internal functions", span)
                        .into_err();
                }
                (IrNode::sym("caller"), Type::address())
            }
            ("msg", "value") => {
                if !self.env().is_payable_context() {
                    return LowerError::structure(
                        "msg.value is only available in payable functions",
                        span,
                    )
                    .with_help("mark the function as payable to read msg.value")
                    .into_err();
                }
                (IrNode::sym("callvalue"), Type::uint256())
            }
            ("msg", "gas") => (IrNode::sym("gas"), Type::uint256()),
            ("block", "difficulty") => (IrNode::sym("difficulty"), Type::uint256()),
            ("block", "timestamp") => (IrNode::sym("timestamp"), Type::uint256()),
            ("block", "coinbase") => (IrNode::sym("coinbase"), Type::address()),
            ("block", "number") => (IrNode::sym("number"), Type::uint256()),
            ("block", "prevhash") => (ir!(["blockhash", ["sub", "number", 1]]), Type::bytes32()),
            ("tx", "origin") => (IrNode::sym("origin"), Type::address()),
            ("chain", "id") => {
                if !self.env().vm_version_at_least(EvmVersion::Istanbul) {
                    return LowerError::evm_version("chain.id", EvmVersion::Istanbul.as_str(), span)
                        .into_err();
                }
                (IrNode::sym("chainid"), Type::uint256())
            }
            _ => {
                return Ok(Decline::UnknownAttribute { attr: format!("{namespace}.{attr}") }.into());
            }
        };
        Ok(node.typed(typ).at(span).into())
    }

    pub(crate) fn lower_subscript(&mut self, value: &Expr, index: &Expr, span: Span) -> LowerResult<Outcome> {
        let sub = self.lower_location(value)?;
        let Some(typ) = sub.typ.clone() else {
            return LowerError::panic("subscript of an untyped node", span).into_err();
        };
        let key = match &typ {
            Type::Mapping { key, .. } => {
                let index_node = self.lower_value(index)?;
                OffsetKey::Index(self.mapping_key(index_node, key, index.span)?)
            }
            Type::List { .. } => OffsetKey::Index(self.lower_value(index)?),
            Type::Tuple { members, .. } => {
                let Some(position) = index.as_int_literal() else {
                    return LowerError::structure("tuple index must be a literal integer", index.span)
                        .into_err();
                };
                match position.to_usize().filter(|i| *i < members.len()) {
                    Some(i) => OffsetKey::Member(i),
                    None => {
                        return Ok(Decline::TupleIndex { index: position.to_string(), len: members.len() }.into())
                    }
                }
            }
            other => return Ok(Decline::NotSubscriptable { found: other.to_string() }.into()),
        };
        Ok(layout::add_variable_offset(sub, key, span)?.into())
    }

    /// Convert a lowered key to the word hashed into a mapping slot.
    fn mapping_key(&mut self, key: IrNode, key_type: &Type, span: Span) -> LowerResult<IrNode> {
        let Some(found) = key.typ.clone() else {
            return LowerError::panic("untyped mapping key", span).into_err();
        };
        if let (Some(declared), Some(given)) = (key_type.byte_array_maxlen(), found.byte_array_maxlen()) {
            if given > declared {
                return LowerError::type_mismatch(
                    format!("key of type `{found}` does not fit the mapping key `{key_type}`"),
                    span,
                )
                .into_err();
            }
            return layout::keccak_bytes(key, self.env_mut(), span);
        }
        if found == *key_type {
            return Ok(key);
        }
        let widens = key_type.is_base(BaseKind::Uint256)
            && found.is_base(BaseKind::Int128)
            && found.is_literal()
            && key.as_int().is_some_and(|v| SizeLimits::in_bounds(BaseKind::Uint256, v));
        if widens {
            return Ok(key.typed(Type::literal(BaseKind::Uint256)));
        }
        LowerError::type_mismatch(
            format!("mapping key must be `{key_type}`, found `{found}`"),
            span,
        )
        .into_err()
    }
}
