//! Type descriptors for the expression lowerer.
//!
//! Types here are the fully resolved types handed over by the (external)
//! type system. They are a closed sum type: every consumer matches on the
//! variant or goes through one of the accessor functions below instead of
//! probing for attributes.
//!
//! # Literal types
//!
//! Every scalar-like type carries an `is_literal` bit. A literal's width is
//! not committed yet: a small integer literal lowers as `int128` but may
//! still be re-read as `uint256` when it meets a committed `uint256`
//! operand. Type equality ignores the bit; [`Type::committed`] clears it.

use std::fmt;

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};

// ============================================================================
// Numeric bounds
// ============================================================================

/// Fixed-point scale of `decimal` values: ten decimal places.
pub const DECIMAL_PLACES: u32 = 10;

/// Bounds table for the VM's numeric types.
pub struct SizeLimits;

impl SizeLimits {
    /// `2^127 - 1`
    pub fn max_int128() -> BigInt {
        (BigInt::one() << 127u32) - 1
    }

    /// `-2^127`
    pub fn min_int128() -> BigInt {
        -(BigInt::one() << 127u32)
    }

    /// `2^256 - 1`
    pub fn max_uint256() -> BigInt {
        (BigInt::one() << 256u32) - 1
    }

    /// `2^160 - 1`
    pub fn max_address() -> BigInt {
        (BigInt::one() << 160u32) - 1
    }

    /// The fixed-point scale factor `10^10`.
    pub fn decimal_divisor() -> BigInt {
        BigInt::from(10u64.pow(DECIMAL_PLACES))
    }

    /// Largest `decimal` value, already scaled.
    pub fn max_decimal() -> BigInt {
        Self::max_int128() * Self::decimal_divisor()
    }

    /// Smallest `decimal` value, already scaled.
    pub fn min_decimal() -> BigInt {
        Self::min_int128() * Self::decimal_divisor()
    }

    /// Inclusive `(min, max)` range of the raw word value for a base kind.
    pub fn range(kind: BaseKind) -> (BigInt, BigInt) {
        match kind {
            BaseKind::Int128 => (Self::min_int128(), Self::max_int128()),
            BaseKind::Uint256 | BaseKind::Bytes32 => (BigInt::zero(), Self::max_uint256()),
            BaseKind::Decimal => (Self::min_decimal(), Self::max_decimal()),
            BaseKind::Bool => (BigInt::zero(), BigInt::one()),
            BaseKind::Address => (BigInt::zero(), Self::max_address()),
        }
    }

    /// Whether `value` is representable by `kind`.
    pub fn in_bounds(kind: BaseKind, value: &BigInt) -> bool {
        let (min, max) = Self::range(kind);
        &min <= value && value <= &max
    }
}

/// Reserved memory words the backend initialises before any function body
/// runs. Range clamps read their bounds from these slots.
pub struct MemoryPositions;

impl MemoryPositions {
    pub const ADDRSIZE: u64 = 32;
    pub const MAXNUM: u64 = 64;
    pub const MINNUM: u64 = 96;
    pub const MAXDECIMAL: u64 = 128;
    pub const MINDECIMAL: u64 = 160;
    pub const FREE_VAR_SPACE: u64 = 192;
    pub const FREE_VAR_SPACE2: u64 = 224;
    pub const BLANK_SPACE: u64 = 256;
    pub const FREE_LOOP_INDEX: u64 = 288;
    /// First byte available for scratch placeholders.
    pub const RESERVED_MEMORY: u64 = 320;
}

// ============================================================================
// Base kinds
// ============================================================================

/// Single-word scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseKind {
    Int128,
    Uint256,
    Decimal,
    Bool,
    Address,
    Bytes32,
}

impl BaseKind {
    /// Source-level name of the kind.
    pub fn name(self) -> &'static str {
        match self {
            BaseKind::Int128 => "int128",
            BaseKind::Uint256 => "uint256",
            BaseKind::Decimal => "decimal",
            BaseKind::Bool => "bool",
            BaseKind::Address => "address",
            BaseKind::Bytes32 => "bytes32",
        }
    }

    /// Kinds that take part in arithmetic.
    pub fn is_numeric(self) -> bool {
        matches!(self, BaseKind::Int128 | BaseKind::Uint256 | BaseKind::Decimal)
    }

    /// Kinds compared with signed opcodes.
    pub fn is_signed(self) -> bool {
        matches!(self, BaseKind::Int128 | BaseKind::Decimal)
    }

    /// The most negative representable value, for signed kinds only.
    pub fn min_value(self) -> Option<BigInt> {
        match self {
            BaseKind::Int128 => Some(SizeLimits::min_int128()),
            BaseKind::Decimal => Some(SizeLimits::min_decimal()),
            _ => None,
        }
    }
}

impl fmt::Display for BaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Types
// ============================================================================

/// A resolved type descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Type {
    /// A single-word scalar.
    Base {
        base: BaseKind,
        #[serde(default)]
        is_literal: bool,
    },
    /// `Bytes[maxlen]` or `String[maxlen]`: a length word followed by data.
    ByteArray {
        maxlen: usize,
        #[serde(default)]
        is_string: bool,
        #[serde(default)]
        is_literal: bool,
    },
    /// Fixed-size list.
    List { subtype: Box<Type>, count: usize },
    /// Anonymous tuple.
    Tuple {
        members: Vec<Type>,
        #[serde(default)]
        is_literal: bool,
    },
    /// Named struct; members keep declaration order.
    Struct {
        name: String,
        members: IndexMap<String, Type>,
        #[serde(default)]
        is_literal: bool,
    },
    /// Storage-only hash map.
    Mapping { key: Box<Type>, value: Box<Type> },
    /// A contract interface; represented at runtime by its address.
    Interface { name: String },
}

impl Type {
    pub fn base(base: BaseKind) -> Self {
        Type::Base { base, is_literal: false }
    }

    pub fn literal(base: BaseKind) -> Self {
        Type::Base { base, is_literal: true }
    }

    pub fn int128() -> Self {
        Self::base(BaseKind::Int128)
    }

    pub fn uint256() -> Self {
        Self::base(BaseKind::Uint256)
    }

    pub fn decimal() -> Self {
        Self::base(BaseKind::Decimal)
    }

    pub fn bool() -> Self {
        Self::base(BaseKind::Bool)
    }

    pub fn address() -> Self {
        Self::base(BaseKind::Address)
    }

    pub fn bytes32() -> Self {
        Self::base(BaseKind::Bytes32)
    }

    pub fn bytes(maxlen: usize) -> Self {
        Type::ByteArray { maxlen, is_string: false, is_literal: false }
    }

    pub fn string(maxlen: usize) -> Self {
        Type::ByteArray { maxlen, is_string: true, is_literal: false }
    }

    pub fn list(subtype: Type, count: usize) -> Self {
        Type::List { subtype: Box::new(subtype), count }
    }

    pub fn tuple(members: Vec<Type>) -> Self {
        Type::Tuple { members, is_literal: false }
    }

    pub fn structure(name: impl Into<String>, members: IndexMap<String, Type>) -> Self {
        Type::Struct { name: name.into(), members, is_literal: false }
    }

    pub fn mapping(key: Type, value: Type) -> Self {
        Type::Mapping { key: Box::new(key), value: Box::new(value) }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Type::Interface { name: name.into() }
    }

    /// The scalar kind, if this is a base type.
    pub fn as_base(&self) -> Option<BaseKind> {
        match self {
            Type::Base { base, .. } => Some(*base),
            _ => None,
        }
    }

    pub fn is_base(&self, kind: BaseKind) -> bool {
        self.as_base() == Some(kind)
    }

    pub fn is_numeric(&self) -> bool {
        self.as_base().is_some_and(BaseKind::is_numeric)
    }

    pub fn is_literal(&self) -> bool {
        match self {
            Type::Base { is_literal, .. }
            | Type::ByteArray { is_literal, .. }
            | Type::Tuple { is_literal, .. }
            | Type::Struct { is_literal, .. } => *is_literal,
            _ => false,
        }
    }

    /// Declared maximum length, for `Bytes`/`String` types.
    pub fn byte_array_maxlen(&self) -> Option<usize> {
        match self {
            Type::ByteArray { maxlen, .. } => Some(*maxlen),
            _ => None,
        }
    }

    pub fn is_byte_array_like(&self) -> bool {
        matches!(self, Type::ByteArray { .. })
    }

    /// `(subtype, count)` of a list type.
    pub fn list_parts(&self) -> Option<(&Type, usize)> {
        match self {
            Type::List { subtype, count } => Some((subtype, *count)),
            _ => None,
        }
    }

    pub fn struct_members(&self) -> Option<&IndexMap<String, Type>> {
        match self {
            Type::Struct { members, .. } => Some(members),
            _ => None,
        }
    }

    pub fn interface_name(&self) -> Option<&str> {
        match self {
            Type::Interface { name } => Some(name),
            _ => None,
        }
    }

    /// The innermost element type of (possibly nested) lists.
    pub fn innermost(&self) -> &Type {
        match self {
            Type::List { subtype, .. } => subtype.innermost(),
            other => other,
        }
    }

    /// The same type with its outermost literal bit set to `literal`.
    pub fn with_literal(&self, literal: bool) -> Type {
        let mut out = self.clone();
        match &mut out {
            Type::Base { is_literal, .. }
            | Type::ByteArray { is_literal, .. }
            | Type::Tuple { is_literal, .. }
            | Type::Struct { is_literal, .. } => *is_literal = literal,
            _ => {}
        }
        out
    }

    /// The same type with every literal bit cleared, recursively.
    pub fn committed(&self) -> Type {
        match self {
            Type::Base { base, .. } => Type::base(*base),
            Type::ByteArray { maxlen, is_string, .. } => Type::ByteArray {
                maxlen: *maxlen,
                is_string: *is_string,
                is_literal: false,
            },
            Type::List { subtype, count } => Type::list(subtype.committed(), *count),
            Type::Tuple { members, .. } => Type::tuple(members.iter().map(Type::committed).collect()),
            Type::Struct { name, members, .. } => Type::structure(
                name.clone(),
                members.iter().map(|(k, t)| (k.clone(), t.committed())).collect(),
            ),
            Type::Mapping { key, value } => Type::mapping(key.committed(), value.committed()),
            Type::Interface { name } => Type::interface(name.clone()),
        }
    }

    /// Whether any literal bit is set anywhere in the type.
    pub fn has_literal(&self) -> bool {
        match self {
            Type::List { subtype, .. } => subtype.has_literal(),
            Type::Tuple { members, is_literal } => *is_literal || members.iter().any(Type::has_literal),
            Type::Struct { members, is_literal, .. } => {
                *is_literal || members.values().any(Type::has_literal)
            }
            Type::Mapping { key, value } => key.has_literal() || value.has_literal(),
            other => other.is_literal(),
        }
    }

    /// Size of a value of this type in 32-byte memory words.
    ///
    /// Mappings only live in storage and have no memory size.
    pub fn size_in_words(&self) -> Option<u64> {
        match self {
            Type::Base { .. } | Type::Interface { .. } => Some(1),
            Type::ByteArray { maxlen, .. } => Some(1 + (*maxlen as u64).div_ceil(32)),
            Type::List { subtype, count } => Some(subtype.size_in_words()? * *count as u64),
            Type::Tuple { members, .. } => members.iter().map(Type::size_in_words).sum(),
            Type::Struct { members, .. } => members.values().map(Type::size_in_words).sum(),
            Type::Mapping { .. } => None,
        }
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Base { base: a, .. }, Type::Base { base: b, .. }) => a == b,
            (
                Type::ByteArray { maxlen: a, is_string: sa, .. },
                Type::ByteArray { maxlen: b, is_string: sb, .. },
            ) => a == b && sa == sb,
            (Type::List { subtype: a, count: ca }, Type::List { subtype: b, count: cb }) => {
                ca == cb && a == b
            }
            (Type::Tuple { members: a, .. }, Type::Tuple { members: b, .. }) => a == b,
            (
                Type::Struct { name: na, members: a, .. },
                Type::Struct { name: nb, members: b, .. },
            ) => na == nb && a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y),
            (Type::Mapping { key: ka, value: va }, Type::Mapping { key: kb, value: vb }) => {
                ka == kb && va == vb
            }
            (Type::Interface { name: a }, Type::Interface { name: b }) => a == b,
            _ => false,
        }
    }
}

impl Eq for Type {}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Base { base, .. } => write!(f, "{base}"),
            Type::ByteArray { maxlen, is_string: false, .. } => write!(f, "Bytes[{maxlen}]"),
            Type::ByteArray { maxlen, is_string: true, .. } => write!(f, "String[{maxlen}]"),
            Type::List { subtype, count } => write!(f, "{subtype}[{count}]"),
            Type::Tuple { members, .. } => {
                write!(f, "(")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{member}")?;
                }
                write!(f, ")")
            }
            Type::Struct { name, .. } => write!(f, "struct {name}"),
            Type::Mapping { key, value } => write!(f, "HashMap[{key}, {value}]"),
            Type::Interface { name } => write!(f, "interface {name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_ignores_literal_bit() {
        assert_eq!(Type::literal(BaseKind::Int128), Type::int128());
        assert_ne!(Type::int128(), Type::uint256());
        assert_eq!(
            Type::tuple(vec![Type::literal(BaseKind::Bool), Type::bytes(3)]),
            Type::tuple(vec![Type::bool(), Type::bytes(3)]),
        );
    }

    #[test]
    fn test_committed_clears_nested_literals() {
        let ty = Type::Tuple {
            members: vec![Type::literal(BaseKind::Uint256), Type::list(Type::literal(BaseKind::Int128), 2)],
            is_literal: true,
        };
        assert!(ty.has_literal());
        assert!(!ty.committed().has_literal());
        assert_eq!(ty.committed(), ty);
    }

    #[test]
    fn test_size_in_words() {
        assert_eq!(Type::int128().size_in_words(), Some(1));
        assert_eq!(Type::bytes(0).size_in_words(), Some(1));
        assert_eq!(Type::bytes(32).size_in_words(), Some(2));
        assert_eq!(Type::bytes(33).size_in_words(), Some(3));
        assert_eq!(Type::list(Type::list(Type::uint256(), 3), 2).size_in_words(), Some(6));
        assert_eq!(Type::tuple(vec![Type::bool(), Type::string(64)]).size_in_words(), Some(4));
        assert_eq!(Type::mapping(Type::address(), Type::uint256()).size_in_words(), None);
    }

    #[test]
    fn test_bounds_table() {
        assert!(SizeLimits::in_bounds(BaseKind::Int128, &SizeLimits::max_int128()));
        assert!(!SizeLimits::in_bounds(BaseKind::Int128, &(SizeLimits::max_int128() + 1)));
        assert!(SizeLimits::in_bounds(BaseKind::Uint256, &(SizeLimits::max_int128() + 1)));
        assert!(!SizeLimits::in_bounds(BaseKind::Uint256, &BigInt::from(-1)));
        assert_eq!(SizeLimits::decimal_divisor(), BigInt::from(10_000_000_000u64));
    }

    #[test]
    fn test_display() {
        assert_eq!(Type::list(Type::address(), 4).to_string(), "address[4]");
        assert_eq!(Type::string(10).to_string(), "String[10]");
        assert_eq!(Type::mapping(Type::bytes32(), Type::bool()).to_string(), "HashMap[bytes32, bool]");
        assert_eq!(Type::tuple(vec![Type::int128(), Type::decimal()]).to_string(), "(int128, decimal)");
    }
}
