//! Typed expression tree.
//!
//! The parser and the semantic checker live upstream; this module only
//! defines the node shapes the lowerer consumes. Every node is
//! serde-deserializable so that a checked tree can be handed over as JSON
//! (see the `stackc lower` command).
//!
//! ```json
//! { "node": "bin_op", "op": "add",
//!   "left": { "node": "name", "id": "a" },
//!   "right": { "node": "int", "value": "1" } }
//! ```

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

use crate::span::{LineIndex, Span};

/// An expression node with its source span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    #[serde(flatten)]
    pub kind: ExprKind,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum ExprKind {
    /// Integer literal: `42`, `-7`
    Int {
        #[serde(with = "bigint_string")]
        value: BigInt,
    },

    /// Decimal literal, kept as written: `3.1415`
    Decimal { value: String },

    /// String literal: `"hello"`
    Str { value: String },

    /// Bytes literal: `b"\x01\x02"`
    Bytes { value: Vec<u8> },

    /// `True` / `False`
    Bool { value: bool },

    /// `None`
    #[serde(rename = "none")]
    NoneLit,

    /// Hex literal, including the `0x` prefix.
    Hex { value: String },

    /// Bare name: `x`, `self`, `MAX_UINT256`
    Name { id: String },

    /// Attribute access: `self.total`, `msg.sender`, `p.x`
    Attribute { value: Box<Expr>, attr: String },

    /// Subscript: `balances[owner]`, `xs[3]`, `pair[0]`
    Subscript { value: Box<Expr>, index: Box<Expr> },

    BinOp { left: Box<Expr>, op: BinOpKind, right: Box<Expr> },

    Compare { left: Box<Expr>, op: CmpOp, right: Box<Expr> },

    /// `a and b and c`; at least two values.
    BoolOp { op: BoolOpKind, values: Vec<Expr> },

    UnaryOp { op: UnaryOpKind, operand: Box<Expr> },

    /// Call: `len(x)`, `Point({x: 1, y: 2})`, `self.foo(1)`, `token.transfer(to, 5)`
    Call { func: Box<Expr>, args: Vec<Expr> },

    List { elts: Vec<Expr> },

    Tuple { elts: Vec<Expr> },

    /// Dictionary literal; only legal as the argument of a struct constructor.
    Dict { keys: Vec<Expr>, values: Vec<Expr> },
}

impl ExprKind {
    /// Node-kind name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Int { .. } => "Int",
            ExprKind::Decimal { .. } => "Decimal",
            ExprKind::Str { .. } => "Str",
            ExprKind::Bytes { .. } => "Bytes",
            ExprKind::Bool { .. } | ExprKind::NoneLit => "NameConstant",
            ExprKind::Hex { .. } => "Hex",
            ExprKind::Name { .. } => "Name",
            ExprKind::Attribute { .. } => "Attribute",
            ExprKind::Subscript { .. } => "Subscript",
            ExprKind::BinOp { .. } => "BinOp",
            ExprKind::Compare { .. } => "Compare",
            ExprKind::BoolOp { .. } => "BoolOp",
            ExprKind::UnaryOp { .. } => "UnaryOp",
            ExprKind::Call { .. } => "Call",
            ExprKind::List { .. } => "List",
            ExprKind::Tuple { .. } => "Tuple",
            ExprKind::Dict { .. } => "Dict",
        }
    }
}

// ============================================================
// Operators
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOpKind {
    Add,
    Sub,
    Mult,
    Div,
    Mod,
    Pow,
}

impl BinOpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinOpKind::Add => "+",
            BinOpKind::Sub => "-",
            BinOpKind::Mult => "*",
            BinOpKind::Div => "/",
            BinOpKind::Mod => "%",
            BinOpKind::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Lt,
    LtE,
    Gt,
    GtE,
    Eq,
    NotEq,
    In,
}

impl CmpOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::In => "in",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolOpKind {
    And,
    Or,
}

impl BoolOpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoolOpKind::And => "and",
            BoolOpKind::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOpKind {
    Not,
    USub,
}

impl UnaryOpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOpKind::Not => "not",
            UnaryOpKind::USub => "-",
        }
    }
}

// ============================================================
// Construction helpers
// ============================================================

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Replace the span, keeping the node.
    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn int(value: impl Into<BigInt>) -> Self {
        Self::new(ExprKind::Int { value: value.into() }, Span::dummy())
    }

    pub fn decimal(value: impl Into<String>) -> Self {
        Self::new(ExprKind::Decimal { value: value.into() }, Span::dummy())
    }

    pub fn str(value: impl Into<String>) -> Self {
        Self::new(ExprKind::Str { value: value.into() }, Span::dummy())
    }

    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        Self::new(ExprKind::Bytes { value: value.into() }, Span::dummy())
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ExprKind::Bool { value }, Span::dummy())
    }

    pub fn none() -> Self {
        Self::new(ExprKind::NoneLit, Span::dummy())
    }

    pub fn hex(value: impl Into<String>) -> Self {
        Self::new(ExprKind::Hex { value: value.into() }, Span::dummy())
    }

    pub fn name(id: impl Into<String>) -> Self {
        Self::new(ExprKind::Name { id: id.into() }, Span::dummy())
    }

    pub fn attribute(value: Expr, attr: impl Into<String>) -> Self {
        Self::new(
            ExprKind::Attribute { value: Box::new(value), attr: attr.into() },
            Span::dummy(),
        )
    }

    pub fn subscript(value: Expr, index: Expr) -> Self {
        Self::new(
            ExprKind::Subscript { value: Box::new(value), index: Box::new(index) },
            Span::dummy(),
        )
    }

    pub fn binop(left: Expr, op: BinOpKind, right: Expr) -> Self {
        Self::new(
            ExprKind::BinOp { left: Box::new(left), op, right: Box::new(right) },
            Span::dummy(),
        )
    }

    pub fn compare(left: Expr, op: CmpOp, right: Expr) -> Self {
        Self::new(
            ExprKind::Compare { left: Box::new(left), op, right: Box::new(right) },
            Span::dummy(),
        )
    }

    pub fn boolop(op: BoolOpKind, values: Vec<Expr>) -> Self {
        Self::new(ExprKind::BoolOp { op, values }, Span::dummy())
    }

    pub fn unary(op: UnaryOpKind, operand: Expr) -> Self {
        Self::new(ExprKind::UnaryOp { op, operand: Box::new(operand) }, Span::dummy())
    }

    pub fn call(func: Expr, args: Vec<Expr>) -> Self {
        Self::new(ExprKind::Call { func: Box::new(func), args }, Span::dummy())
    }

    pub fn list(elts: Vec<Expr>) -> Self {
        Self::new(ExprKind::List { elts }, Span::dummy())
    }

    pub fn tuple(elts: Vec<Expr>) -> Self {
        Self::new(ExprKind::Tuple { elts }, Span::dummy())
    }

    pub fn dict(entries: Vec<(Expr, Expr)>) -> Self {
        let (keys, values) = entries.into_iter().unzip();
        Self::new(ExprKind::Dict { keys, values }, Span::dummy())
    }

    /// `self.<attr>`
    pub fn self_attr(attr: impl Into<String>) -> Self {
        Self::attribute(Self::name("self"), attr)
    }

    /// The identifier of a bare `Name` node.
    pub fn as_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Name { id } => Some(id),
            _ => None,
        }
    }

    /// Whether this is the bare name `self`.
    pub fn is_self(&self) -> bool {
        self.as_name() == Some("self")
    }

    /// The value of an integer literal node.
    pub fn as_int_literal(&self) -> Option<&BigInt> {
        match &self.kind {
            ExprKind::Int { value } => Some(value),
            _ => None,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, ExprKind::Call { .. })
    }

    /// Fill in line/column information for every span in the tree from the
    /// source text the byte offsets point into. Dummy spans are left alone.
    pub fn locate_spans(&mut self, index: &LineIndex) {
        if !self.span.is_empty() {
            self.span = Span::locate(self.span.start, self.span.end, index);
        }
        match &mut self.kind {
            ExprKind::Attribute { value, .. } | ExprKind::UnaryOp { operand: value, .. } => {
                value.locate_spans(index);
            }
            ExprKind::Subscript { value: left, index: right }
            | ExprKind::BinOp { left, right, .. }
            | ExprKind::Compare { left, right, .. } => {
                left.locate_spans(index);
                right.locate_spans(index);
            }
            ExprKind::BoolOp { values, .. } | ExprKind::List { elts: values } | ExprKind::Tuple { elts: values } => {
                values.iter_mut().for_each(|v| v.locate_spans(index));
            }
            ExprKind::Call { func, args } => {
                func.locate_spans(index);
                args.iter_mut().for_each(|a| a.locate_spans(index));
            }
            ExprKind::Dict { keys, values } => {
                keys.iter_mut().chain(values.iter_mut()).for_each(|e| e.locate_spans(index));
            }
            _ => {}
        }
    }
}

/// Integers travel as decimal strings so that 256-bit values survive JSON.
mod bigint_string {
    use num_bigint::BigInt;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Small(i64),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Text(text) => text
                .parse::<BigInt>()
                .map_err(|_| de::Error::custom(format!("invalid integer literal `{text}`"))),
            Repr::Small(v) => Ok(BigInt::from(v)),
        }
    }
}
