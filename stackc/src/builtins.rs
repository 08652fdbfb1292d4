//! Builtin functions.
//!
//! A builtin is looked up by name before any other interpretation of a call
//! is tried (see `lower::call`). Each one receives the unlowered arguments
//! and lowers them itself through the [`ExprLowerer`] it is given.

use std::fmt;
use std::sync::OnceLock;

use indexmap::IndexMap;

use crate::ast::Expr;
use crate::error::{Decline, LowerResult, Outcome};
use crate::ir;
use crate::ir::{IrNode, Location};
use crate::lower::{layout, ExprLowerer};
use crate::span::Span;
use crate::types::{BaseKind, MemoryPositions, Type};

/// A function whose IR is produced at compile time.
pub trait BuiltinFunction: Send + Sync {
    /// The name it is called by.
    fn name(&self) -> &'static str;

    /// Lower a call. Returns a decline when the arguments have the wrong
    /// shape or type.
    fn build_ir(&self, args: &[Expr], span: Span, lowerer: &mut ExprLowerer<'_>) -> LowerResult<Outcome>;
}

// ============================================================
// Registry
// ============================================================

/// Name -> builtin lookup table.
#[derive(Default)]
pub struct BuiltinRegistry {
    functions: IndexMap<&'static str, Box<dyn BuiltinFunction>>,
}

impl BuiltinRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every builtin this crate defines.
    pub fn with_standard() -> Self {
        let mut registry = Self::new();
        registry.register(Len);
        registry.register(Keccak256);
        registry
    }

    /// The shared standard registry.
    pub fn standard() -> &'static BuiltinRegistry {
        static STANDARD: OnceLock<BuiltinRegistry> = OnceLock::new();
        STANDARD.get_or_init(Self::with_standard)
    }

    /// Add a builtin, returning the one it replaces.
    pub fn register(&mut self, builtin: impl BuiltinFunction + 'static) -> Option<Box<dyn BuiltinFunction>> {
        self.functions.insert(builtin.name(), Box::new(builtin))
    }

    pub fn get(&self, name: &str) -> Option<&dyn BuiltinFunction> {
        self.functions.get(name).map(|b| &**b)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.functions.keys().copied()
    }
}

impl fmt::Debug for BuiltinRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

// ============================================================
// Standard builtins
// ============================================================

/// `len(x)`: the length word of a byte array.
#[derive(Debug, Clone, Copy)]
pub struct Len;

impl BuiltinFunction for Len {
    fn name(&self) -> &'static str {
        "len"
    }

    fn build_ir(&self, args: &[Expr], span: Span, lowerer: &mut ExprLowerer<'_>) -> LowerResult<Outcome> {
        let [arg] = args else {
            return Ok(bad_shape(self));
        };
        let node = lowerer.lower_expr(arg)?;
        if !node.ty().is_some_and(Type::is_byte_array_like) {
            return Ok(bad_shape(self));
        }
        let length = match node.location {
            Some(Location::Storage) => ir!(["sload", ["sha3_32", node]]),
            Some(location) => IrNode::op(location.load_op(), vec![node]),
            None => return Ok(bad_shape(self)),
        };
        Ok(length.typed(Type::int128()).at(span).into())
    }
}

/// `keccak256(x)` over a byte array or a `bytes32`.
#[derive(Debug, Clone, Copy)]
pub struct Keccak256;

impl BuiltinFunction for Keccak256 {
    fn name(&self) -> &'static str {
        "keccak256"
    }

    fn build_ir(&self, args: &[Expr], span: Span, lowerer: &mut ExprLowerer<'_>) -> LowerResult<Outcome> {
        let [arg] = args else {
            return Ok(bad_shape(self));
        };
        let node = lowerer.lower_expr(arg)?;
        let is_bytes = node.ty().is_some_and(Type::is_byte_array_like);
        let is_word = node.ty().is_some_and(|t| t.is_base(BaseKind::Bytes32));
        match (is_bytes, is_word) {
            (true, _) => Ok(layout::keccak_bytes(node, lowerer.env_mut(), span)?.into()),
            (_, true) => {
                let word = layout::unwrap_location(node);
                let scratch = MemoryPositions::FREE_VAR_SPACE;
                let hashed = ir!([
                    "with",
                    "_kv",
                    word,
                    ["seq", ["mstore", { scratch }, "_kv"], ["sha3", { scratch }, 32]]
                ]);
                Ok(hashed.typed(Type::bytes32()).at(span).into())
            }
            _ => Ok(bad_shape(self)),
        }
    }
}

fn bad_shape(builtin: &dyn BuiltinFunction) -> Outcome {
    Decline::BadCallShape { name: builtin.name().to_string() }.into()
}
