//! Literal folding.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Num, Zero};
use sha3::{Digest, Keccak256};
use thiserror::Error;

use super::ExprLowerer;
use crate::error::{LowerError, LowerResult, Outcome};
use crate::ir;
use crate::ir::{IrNode, Location};
use crate::span::Span;
use crate::types::{BaseKind, SizeLimits, Type, DECIMAL_PLACES};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecimalLiteralError {
    #[error("`{0}` is not a decimal number")]
    Malformed(String),

    #[error("`{text}` has {places} decimal places; at most {max} are allowed", max = DECIMAL_PLACES)]
    TooPrecise { text: String, places: usize },
}

/// The exact value of a decimal literal as a reduced fraction.
pub fn decimal_fraction(text: &str) -> Result<BigRational, DecimalLiteralError> {
    let malformed = || DecimalLiteralError::Malformed(text.to_string());
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && frac.is_empty() {
        return Err(malformed());
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        return Err(malformed());
    }
    let frac = frac.trim_end_matches('0');
    if frac.len() > DECIMAL_PLACES as usize {
        return Err(DecimalLiteralError::TooPrecise { text: text.to_string(), places: frac.len() });
    }
    let all_digits = format!("{whole}{frac}");
    let numerator = if all_digits.is_empty() {
        BigInt::zero()
    } else {
        BigInt::from_str_radix(&all_digits, 10).map_err(|_| malformed())?
    };
    let denominator = BigInt::from(10u32).pow(frac.len() as u32);
    let value = BigRational::new(numerator, denominator);
    Ok(if negative { -value } else { value })
}

/// EIP-55 mixed-case checksum encoding of a `0x`-prefixed address.
pub fn checksum_encode(address: &str) -> String {
    let hex = address.trim_start_matches("0x").to_ascii_lowercase();
    let hash = Keccak256::digest(hex.as_bytes());
    let mut out = String::with_capacity(hex.len() + 2);
    out.push_str("0x");
    for (i, c) in hex.chars().enumerate() {
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        if nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn literal_node(value: impl Into<BigInt>, kind: BaseKind, span: Span) -> IrNode {
    IrNode::int(value).typed(Type::literal(kind)).at(span)
}

impl<'a> ExprLowerer<'a> {
    /// Integer literals take the narrowest type: `int128` when the value is
    /// negative or fits, `uint256` otherwise.
    pub(crate) fn lower_int(&mut self, value: &BigInt, span: Span) -> LowerResult<Outcome> {
        if SizeLimits::in_bounds(BaseKind::Int128, value) || value < &BigInt::zero() {
            return Ok(literal_node(value.clone(), BaseKind::Int128, span).into());
        }
        if SizeLimits::in_bounds(BaseKind::Uint256, value) {
            return Ok(literal_node(value.clone(), BaseKind::Uint256, span).into());
        }
        LowerError::invalid_literal(format!("integer literal {value} does not fit in uint256"), span)
            .into_err()
    }

    pub(crate) fn lower_decimal(&mut self, text: &str, span: Span) -> LowerResult<Outcome> {
        let fraction = decimal_fraction(text)
            .map_err(|e| Box::new(LowerError::invalid_literal(e.to_string(), span)))?;
        let (num, den) = (fraction.numer(), fraction.denom());
        if !(SizeLimits::min_int128() * den <= *num && *num <= SizeLimits::max_int128() * den) {
            return LowerError::invalid_literal(format!("{text} is outside the decimal range"), span)
                .into_err();
        }
        let divisor = SizeLimits::decimal_divisor();
        if !(&divisor % den).is_zero() {
            return LowerError::invalid_literal(
                format!("{text} cannot be represented with {DECIMAL_PLACES} decimal places"),
                span,
            )
            .into_err();
        }
        let scaled = num * divisor / den;
        Ok(literal_node(scaled, BaseKind::Decimal, span).into())
    }

    /// `0x` + 40 hex digits with a valid checksum is an address, `0x` + 64
    /// hex digits is a `bytes32`.
    pub(crate) fn lower_hex(&mut self, text: &str, span: Span) -> LowerResult<Outcome> {
        let digits = text.strip_prefix("0x").unwrap_or(text);
        let Some(value) = BigInt::parse_bytes(digits.as_bytes(), 16) else {
            return LowerError::invalid_literal(format!("`{text}` is not a hex literal"), span)
                .into_err();
        };
        match text.len() {
            42 => {
                let expected = checksum_encode(text);
                if expected != text {
                    return LowerError::invalid_literal("address checksum mismatch", span)
                        .with_help(format!("if this is an address, write it as {expected}"))
                        .into_err();
                }
                Ok(literal_node(value, BaseKind::Address, span).into())
            }
            66 => Ok(literal_node(value, BaseKind::Bytes32, span).into()),
            _ => LowerError::invalid_literal(
                format!("hex literal must be 20 or 32 bytes long, found `{text}`"),
                span,
            )
            .into_err(),
        }
    }

    pub(crate) fn lower_str(&mut self, value: &str, span: Span) -> LowerResult<Outcome> {
        let mut bytes = Vec::with_capacity(value.len());
        for c in value.chars() {
            match u8::try_from(u32::from(c)) {
                Ok(b) => bytes.push(b),
                Err(_) => {
                    return LowerError::invalid_literal(
                        format!("character {c:?} is outside the single-byte range"),
                        span,
                    )
                    .into_err()
                }
            }
        }
        let typ = Type::ByteArray { maxlen: bytes.len(), is_string: true, is_literal: true };
        self.make_bytelike(typ, &bytes, span).map(Outcome::from)
    }

    pub(crate) fn lower_bytes(&mut self, value: &[u8], span: Span) -> LowerResult<Outcome> {
        let typ = Type::ByteArray { maxlen: value.len(), is_string: false, is_literal: true };
        self.make_bytelike(typ, value, span).map(Outcome::from)
    }

    pub(crate) fn lower_bool(&mut self, value: bool, span: Span) -> Outcome {
        literal_node(u32::from(value), BaseKind::Bool, span).into()
    }

    /// Write a byte string into a fresh placeholder: the length word, then
    /// the data in right-padded 32-byte chunks.
    fn make_bytelike(&mut self, typ: Type, bytes: &[u8], span: Span) -> LowerResult<IrNode> {
        let placeholder = self.placeholder(&typ, span)?;
        let mut seq = vec![ir!(["mstore", { placeholder }, { bytes.len() }])];
        for (i, chunk) in bytes.chunks(32).enumerate() {
            let mut word = [0u8; 32];
            word[..chunk.len()].copy_from_slice(chunk);
            let value = BigInt::from_bytes_be(num_bigint::Sign::Plus, &word);
            seq.push(ir!(["mstore", ["add", { placeholder }, { 32 * i + 32 }], value]));
        }
        seq.push(IrNode::int(placeholder));
        let annotation = format!("Create {typ}: {}", bytes.escape_ascii());
        Ok(IrNode::op("seq", seq)
            .typed(typ)
            .located(Some(Location::Memory))
            .annotated(annotation)
            .at(span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_fraction() {
        let f = decimal_fraction("3.25").expect("valid");
        assert_eq!(f, BigRational::new(BigInt::from(13), BigInt::from(4)));
        let f = decimal_fraction("-0.5000").expect("valid");
        assert_eq!(f, BigRational::new(BigInt::from(-1), BigInt::from(2)));
        assert_eq!(decimal_fraction("7."), Ok(BigRational::from_integer(BigInt::from(7))));
        assert!(matches!(decimal_fraction("1.2.3"), Err(DecimalLiteralError::Malformed(_))));
        assert!(matches!(decimal_fraction("."), Err(DecimalLiteralError::Malformed(_))));
        assert!(matches!(
            decimal_fraction("0.00000000001"),
            Err(DecimalLiteralError::TooPrecise { places: 11, .. })
        ));
    }

    #[test]
    fn test_checksum_encode() {
        // Reference vectors from EIP-55.
        for address in [
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
            "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
            "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
        ] {
            assert_eq!(checksum_encode(&address.to_ascii_lowercase()), address);
        }
    }
}
