//! # Lowered IR
//!
//! The output of expression lowering: a tree of `(operation args...)` nodes
//! annotated with a type, an optional location, a mutability flag and the
//! source span of the expression that produced it.
//!
//! ## Values and locations
//!
//! A node with a [`Location`] evaluates to the *address* of a value (a
//! memory pointer, calldata offset or storage slot). A node without one
//! evaluates to the value itself. `layout::unwrap_location` turns the first
//! kind into the second by wrapping it in the matching load.
//!
//! ## Example
//!
//! ```text
//! // a + b, both uint256 memory variables
//! (with l (mload 320)
//!   (with r (mload 352)
//!     (seq (seq (assert (ge (add l r) l)) (add l r)))))
//! ```
//!
//! Nodes are never mutated once handed to a parent; the builder methods
//! below consume and return `self`.

use std::fmt;

use num_bigint::BigInt;
use serde::{Serialize, Serializer};

use crate::span::Span;
use crate::types::Type;

/// Where an address-valued node points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Memory,
    Storage,
    Calldata,
}

impl Location {
    /// The opcode that reads one word from this location.
    pub fn load_op(self) -> &'static str {
        match self {
            Location::Memory => "mload",
            Location::Storage => "sload",
            Location::Calldata => "calldataload",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Memory => write!(f, "memory"),
            Location::Storage => write!(f, "storage"),
            Location::Calldata => write!(f, "calldata"),
        }
    }
}

/// The head of an IR node: an integer constant or an operation symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrValue {
    Int(BigInt),
    Sym(String),
}

impl Serialize for IrValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            IrValue::Int(v) => serializer.serialize_str(&v.to_string()),
            IrValue::Sym(s) => serializer.serialize_str(s),
        }
    }
}

impl fmt::Display for IrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrValue::Int(v) => write!(f, "{v}"),
            IrValue::Sym(s) => write!(f, "{s}"),
        }
    }
}

/// A node of the lowered IR tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrNode {
    pub value: IrValue,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<IrNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<Type>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub mutable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
}

impl IrNode {
    fn leaf(value: IrValue) -> Self {
        Self {
            value,
            args: Vec::new(),
            typ: None,
            location: None,
            mutable: true,
            span: None,
            annotation: None,
        }
    }

    /// An integer constant.
    pub fn int(value: impl Into<BigInt>) -> Self {
        Self::leaf(IrValue::Int(value.into()))
    }

    /// A bare symbol (a variable bound by `with`, a label, a nullary opcode).
    pub fn sym(name: impl Into<String>) -> Self {
        Self::leaf(IrValue::Sym(name.into()))
    }

    /// An operation applied to arguments.
    pub fn op(name: impl Into<String>, args: Vec<IrNode>) -> Self {
        Self {
            args,
            ..Self::leaf(IrValue::Sym(name.into()))
        }
    }

    pub fn typed(mut self, typ: Type) -> Self {
        self.typ = Some(typ);
        self
    }

    pub fn located(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn annotated(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }

    pub fn with_mutable(mut self, mutable: bool) -> Self {
        self.mutable = mutable;
        self
    }

    /// The integer constant held by a leaf node.
    pub fn as_int(&self) -> Option<&BigInt> {
        match &self.value {
            IrValue::Int(v) if self.args.is_empty() => Some(v),
            _ => None,
        }
    }

    /// The operation symbol at the head of the node.
    pub fn op_name(&self) -> Option<&str> {
        match &self.value {
            IrValue::Sym(s) => Some(s),
            IrValue::Int(_) => None,
        }
    }

    pub fn is_op(&self, name: &str) -> bool {
        self.op_name() == Some(name)
    }

    /// The node's type. Every node produced by a lowering handler has one.
    pub fn ty(&self) -> Option<&Type> {
        self.typ.as_ref()
    }

    /// Whether the node's type still carries the literal bit.
    pub fn is_literal(&self) -> bool {
        self.typ.as_ref().is_some_and(Type::is_literal)
    }

    /// A structural copy with every type committed.
    pub fn into_committed(self) -> IrNode {
        IrNode {
            typ: self.typ.map(|t| t.committed()),
            args: self.args.into_iter().map(IrNode::into_committed).collect(),
            ..self
        }
    }

    /// Pre-order walk over the tree.
    pub fn walk(&self, f: &mut impl FnMut(&IrNode)) {
        f(self);
        for arg in &self.args {
            arg.walk(f);
        }
    }

    /// Whether `pred` holds for this node or any descendant.
    pub fn any(&self, pred: &impl Fn(&IrNode) -> bool) -> bool {
        pred(self) || self.args.iter().any(|a| a.any(pred))
    }
}

impl From<i32> for IrNode {
    fn from(v: i32) -> Self {
        IrNode::int(v)
    }
}

impl From<i64> for IrNode {
    fn from(v: i64) -> Self {
        IrNode::int(v)
    }
}

impl From<u64> for IrNode {
    fn from(v: u64) -> Self {
        IrNode::int(v)
    }
}

impl From<usize> for IrNode {
    fn from(v: usize) -> Self {
        IrNode::int(v)
    }
}

impl From<BigInt> for IrNode {
    fn from(v: BigInt) -> Self {
        IrNode::int(v)
    }
}

impl From<&BigInt> for IrNode {
    fn from(v: &BigInt) -> Self {
        IrNode::int(v.clone())
    }
}

impl From<&str> for IrNode {
    fn from(s: &str) -> Self {
        IrNode::sym(s)
    }
}

impl From<String> for IrNode {
    fn from(s: String) -> Self {
        IrNode::sym(s)
    }
}

impl fmt::Display for IrNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            return write!(f, "{}", self.value);
        }
        write!(f, "({}", self.value)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        write!(f, ")")
    }
}

/// Build an [`IrNode`] from an s-expression-like list.
///
/// ```
/// use stackc::ir;
/// let node = ir!(["seq", ["assert", ["ge", "l", "r"]], ["sub", "l", "r"]]);
/// assert_eq!(node.to_string(), "(seq (assert (ge l r)) (sub l r))");
/// ```
///
/// String literals become symbols, integer literals become constants, bare
/// identifiers are moved in through `From<_> for IrNode`, and `{expr}`
/// embeds an arbitrary expression.
#[macro_export]
macro_rules! ir {
    ([$op:literal $(, $arg:tt)* $(,)?]) => {
        $crate::ir::IrNode::op($op, vec![$($crate::ir!($arg)),*])
    };
    ($lit:literal) => {
        $crate::ir::IrNode::from($lit)
    };
    ({$e:expr}) => {
        $crate::ir::IrNode::from($e)
    };
    ($e:ident) => {
        $crate::ir::IrNode::from($e)
    };
}

impl From<&IrNode> for IrNode {
    fn from(node: &IrNode) -> Self {
        node.clone()
    }
}
