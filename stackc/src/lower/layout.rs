//! Addressing and copying helpers.
//!
//! Memory and calldata values are laid out linearly, one 32-byte word per
//! scalar. Storage values are addressed by slot: composite values hash
//! their parent slot (`sha3_32`) and add the member position, mappings hash
//! the parent slot together with the key (`sha3_64`). Byte arrays are a
//! length word followed by the data, in every location.

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive};

use crate::context::Environment;
use crate::error::{LowerError, LowerErrorKind, LowerResult};
use crate::ir;
use crate::ir::{IrNode, Location};
use crate::span::Span;
use crate::types::{BaseKind, Type};

/// Address of the identity precompile used for memory-to-memory copies.
const IDENTITY_PRECOMPILE: u64 = 4;

/// Load a word-sized value from its location.
///
/// Nodes without a location, and composite values (which are always
/// handled through their address), are returned unchanged.
pub fn unwrap_location(node: IrNode) -> IrNode {
    let Some(location) = node.location else {
        return node;
    };
    if !is_word_sized(node.ty()) {
        return node;
    }
    let typ = node.typ.clone();
    let span = node.span;
    let mut loaded = IrNode::op(location.load_op(), vec![node]);
    loaded.typ = typ;
    loaded.span = span;
    loaded
}

fn is_word_sized(typ: Option<&Type>) -> bool {
    matches!(typ, Some(Type::Base { .. }) | Some(Type::Interface { .. }))
}

/// What to offset into a composite value.
#[derive(Debug, Clone)]
pub enum OffsetKey {
    /// Position of a struct or tuple member.
    Member(usize),
    /// A list index or mapping key, already lowered to a value.
    Index(IrNode),
}

/// Compute the address of a member, element or mapping entry of `parent`.
///
/// The result keeps the parent's location and mutability.
pub fn add_variable_offset(parent: IrNode, key: OffsetKey, span: Span) -> LowerResult<IrNode> {
    let Some(typ) = parent.typ.clone() else {
        return LowerError::panic("offset into an untyped node", span).into_err();
    };
    let Some(location) = parent.location else {
        return LowerError::structure("cannot compute an offset into a value without a location", span)
            .into_err();
    };
    let mutable = parent.mutable;

    let (node, subtype) = match (&typ, key) {
        (Type::Struct { .. } | Type::Tuple { .. }, OffsetKey::Member(index)) => {
            let members = member_types(&typ);
            let Some(subtype) = members.get(index).cloned() else {
                return LowerError::panic(format!("member {index} of `{typ}` does not exist"), span)
                    .into_err();
            };
            let node = if location == Location::Storage {
                ir!(["add", ["sha3_32", parent], { index }])
            } else {
                let mut offset = 0u64;
                for member in &members[..index] {
                    offset += words_of(member, span)?;
                }
                ir!(["add", parent, { 32 * offset }])
            };
            (node, subtype)
        }
        (Type::List { subtype, count }, OffsetKey::Index(index)) => {
            let stride = 32 * words_of(subtype, span)?;
            let sub = list_index(index, *count, span)?;
            let node = match (location, sub.as_int().and_then(ToPrimitive::to_u64)) {
                (Location::Storage, _) => ir!(["add", ["sha3_32", parent], sub]),
                (_, Some(i)) => ir!(["add", parent, { stride * i }]),
                (_, None) => ir!(["add", parent, ["mul", { stride }, sub]]),
            };
            (node, (**subtype).clone())
        }
        (Type::Mapping { value, .. }, OffsetKey::Index(key)) => {
            if location != Location::Storage {
                return LowerError::structure(
                    "Can only have fixed-size arrays in memory, not mappings",
                    span,
                )
                .into_err();
            }
            (ir!(["sha3_64", parent, key]), (**value).clone())
        }
        _ => {
            return LowerError::structure(format!("cannot compute an offset into `{typ}`"), span)
                .into_err();
        }
    };

    Ok(node.typed(subtype).located(Some(location)).with_mutable(mutable).at(span))
}

fn member_types(typ: &Type) -> Vec<Type> {
    match typ {
        Type::Tuple { members, .. } => members.clone(),
        Type::Struct { members, .. } => members.values().cloned().collect(),
        _ => Vec::new(),
    }
}

fn words_of(typ: &Type, span: Span) -> LowerResult<u64> {
    match typ.size_in_words() {
        Some(words) => Ok(words),
        None => LowerError::structure(format!("`{typ}` has no memory layout"), span).into_err(),
    }
}

/// Check a list index: literals against the count now, runtime values with
/// an unsigned clamp.
fn list_index(index: IrNode, count: usize, span: Span) -> LowerResult<IrNode> {
    if !matches!(index.ty().and_then(Type::as_base), Some(BaseKind::Int128 | BaseKind::Uint256)) {
        return LowerError::type_mismatch(
            format!(
                "list index must be an integer, found `{}`",
                index.ty().map(ToString::to_string).unwrap_or_default()
            ),
            span,
        )
        .into_err();
    }
    if let Some(value) = index.as_int().cloned() {
        if value.is_negative() || value >= BigInt::from(count) {
            return LowerError::new(
                LowerErrorKind::ArrayIndex { index: value.to_string(), count },
                span,
            )
            .into_err();
        }
        return Ok(index);
    }
    let typ = index.typ.clone();
    let mut clamped = ir!(["uclamplt", index, { count }]);
    clamped.typ = typ;
    Ok(clamped)
}

/// Build IR that stores `value` into memory at `target`.
pub fn make_memory_setter(target: u64, value: IrNode, span: Span) -> LowerResult<IrNode> {
    let Some(typ) = value.typ.clone() else {
        return LowerError::panic("cannot store an untyped value", span).into_err();
    };
    match &typ {
        Type::Base { .. } | Type::Interface { .. } => {
            Ok(ir!(["mstore", { target }, { unwrap_location(value) }]))
        }
        Type::Mapping { .. } => {
            LowerError::structure(format!("`{typ}` cannot be copied to memory"), span).into_err()
        }
        _ if value.is_op("multi") => {
            let mut stores = Vec::with_capacity(value.args.len());
            let mut offset = 0u64;
            for element in value.args {
                let words = match element.ty() {
                    Some(t) => words_of(t, span)?,
                    None => return LowerError::panic("untyped element", span).into_err(),
                };
                stores.push(make_memory_setter(target + 32 * offset, element, span)?);
                offset += words;
            }
            Ok(IrNode::op("seq", stores))
        }
        _ if value.is_op("seq_unchecked") && value.args.last().is_some_and(|n| n.is_op("multi")) => {
            let mut args = value.args;
            let Some(last) = args.pop() else {
                return LowerError::panic("empty sequence", span).into_err();
            };
            args.push(make_memory_setter(target, last, span)?);
            Ok(IrNode::op("seq", args))
        }
        _ => copy_composite(target, value, &typ, span),
    }
}

/// Copy a byte array or composite value that lives at an address.
fn copy_composite(target: u64, value: IrNode, typ: &Type, span: Span) -> LowerResult<IrNode> {
    let Some(location) = value.location else {
        return LowerError::panic(format!("cannot copy a `{typ}` value without an address"), span)
            .into_err();
    };
    let size = 32 * words_of(typ, span)?;
    match location {
        Location::Memory => Ok(ir!([
            "with",
            "_src",
            value,
            ["assert", ["staticcall", "gas", { IDENTITY_PRECOMPILE }, "_src", { size }, { target }, { size }]]
        ])),
        Location::Calldata => Ok(ir!(["calldatacopy", { target }, value, { size }])),
        Location::Storage if typ.is_byte_array_like() => {
            let words = size / 32;
            let stores: Vec<IrNode> = (0..words)
                .map(|i| ir!(["mstore", { target + 32 * i }, ["sload", ["add", "_src", { i }]]]))
                .collect();
            Ok(ir!(["with", "_src", ["sha3_32", value], { IrNode::op("seq", stores) }]))
        }
        Location::Storage => {
            let members: Vec<Type> = match typ {
                Type::List { subtype, count } => vec![(**subtype).clone(); *count],
                other => member_types(other),
            };
            let src = IrNode::sym("_src")
                .typed(typ.clone())
                .located(Some(Location::Storage));
            let mut stores = Vec::with_capacity(members.len());
            let mut offset = 0u64;
            for (i, member) in members.iter().enumerate() {
                let key = match typ {
                    Type::List { .. } => OffsetKey::Index(IrNode::int(i).typed(Type::literal(BaseKind::Int128))),
                    _ => OffsetKey::Member(i),
                };
                let element = add_variable_offset(src.clone(), key, span)?;
                stores.push(make_memory_setter(target + 32 * offset, element, span)?);
                offset += words_of(member, span)?;
            }
            Ok(ir!(["with", "_src", value, { IrNode::op("seq", stores) }]))
        }
    }
}

/// Hash the contents of a byte array, giving a `bytes32`.
///
/// Memory arrays are hashed in place; storage and calldata arrays are
/// copied to a scratch buffer first.
pub fn keccak_bytes(node: IrNode, env: &mut dyn Environment, span: Span) -> LowerResult<IrNode> {
    let Some(typ) = node.typ.clone().filter(Type::is_byte_array_like) else {
        return LowerError::panic("keccak of a non byte-array value", span).into_err();
    };
    let hashed = match node.location {
        Some(Location::Memory) => ir!(["with", "_sub", node, ["sha3", ["add", "_sub", 32], ["mload", "_sub"]]]),
        Some(_) => {
            let Some(buffer) = env.new_scratch_placeholder(&typ) else {
                return LowerError::panic("byte array without a memory size", span).into_err();
            };
            let setter = make_memory_setter(buffer, node, span)?;
            ir!(["seq", setter, ["sha3", { buffer + 32 }, ["mload", { buffer }]]])
        }
        None => return LowerError::panic("byte array without a location", span).into_err(),
    };
    Ok(hashed.typed(Type::bytes32()).at(span))
}

/// Load the first data word of a byte array.
pub fn load_first_word(node: IrNode, span: Span) -> LowerResult<IrNode> {
    match node.location {
        Some(Location::Memory) => Ok(ir!(["mload", ["add", 32, node]])),
        Some(Location::Calldata) => Ok(ir!(["calldataload", ["add", 32, node]])),
        Some(Location::Storage) => Ok(ir!(["sload", ["add", 1, ["sha3_32", node]]])),
        None => LowerError::panic("byte array without a location", span).into_err(),
    }
}
