//! Static bounds for exponentiation.
//!
//! `a ** b` can only be guarded at compile time when one side is a literal.
//! With a literal base the guard caps the exponent; with a literal exponent
//! it caps the base. Both searches start from a floating-point estimate and
//! then correct it with exact integer arithmetic.

use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive};
use thiserror::Error;
use tracing::trace;

/// Upper bound on correction steps after the initial estimate.
pub const MAX_REFINEMENT_STEPS: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundsError {
    #[error("bit width {0} is not a multiple of 8")]
    BitWidth(u32),

    #[error("value is too large and will always throw")]
    TooLarge,

    #[error("value is too small and will always throw")]
    TooSmall,

    #[error("cannot calculate negative exponents")]
    NegativeExponent,

    #[error("exponentiation with base {0} does not need a bound")]
    Degenerate(BigInt),

    #[error("bound search did not converge within {MAX_REFINEMENT_STEPS} steps")]
    NoConvergence,
}

fn value_bits(num_bits: u32, is_signed: bool) -> Result<u32, BoundsError> {
    if num_bits % 8 != 0 || num_bits == 0 {
        return Err(BoundsError::BitWidth(num_bits));
    }
    Ok(num_bits - u32::from(is_signed))
}

/// The largest exponent `b` such that `a ** b` fits in `num_bits`.
///
/// For signed widths a negative base may reach one step further, since
/// `(-a) ** (b + 1)` can land exactly on the type minimum.
pub fn calculate_largest_power(a: &BigInt, num_bits: u32, is_signed: bool) -> Result<u32, BoundsError> {
    let value_bits = value_bits(num_bits, is_signed)?;
    let limit = BigInt::one() << value_bits;
    if *a >= limit {
        return Err(BoundsError::TooLarge);
    }
    if *a < -&limit {
        return Err(BoundsError::TooSmall);
    }

    let a_is_negative = a.is_negative();
    let a = a.abs();
    if a <= BigInt::one() {
        return Err(BoundsError::Degenerate(a));
    }

    let log2_a = a.to_f64().map(f64::log2).unwrap_or(f64::from(value_bits));
    let estimate = (f64::from(value_bits) / log2_a).floor();
    if estimate <= 1.0 {
        return Ok(1);
    }
    let mut b = estimate as u32;
    trace!(%a, value_bits, estimate = b, "refining largest power");

    let mut steps = 0;
    while a.pow(b + 1) < limit {
        b += 1;
        steps += 1;
        if steps >= MAX_REFINEMENT_STEPS {
            return Err(BoundsError::NoConvergence);
        }
    }
    while a.pow(b) >= limit {
        b -= 1;
        steps += 1;
        if steps >= MAX_REFINEMENT_STEPS {
            return Err(BoundsError::NoConvergence);
        }
    }

    if a_is_negative && (-&a).pow(b + 1) == -&limit {
        return Ok(b + 1);
    }
    Ok(b)
}

/// The largest base `a` such that `a ** b` fits in `num_bits`.
pub fn calculate_largest_base(b: &BigInt, num_bits: u32, is_signed: bool) -> Result<BigInt, BoundsError> {
    let value_bits = value_bits(num_bits, is_signed)?;
    if b.is_negative() {
        return Err(BoundsError::NegativeExponent);
    }
    if *b > BigInt::from(value_bits) {
        return Err(BoundsError::TooLarge);
    }
    let limit = BigInt::one() << value_bits;
    let b = b.to_u32().ok_or(BoundsError::TooLarge)?;
    if b < 2 {
        return Ok(limit - 1);
    }

    let mut a = limit.nth_root(b);
    trace!(b, value_bits, estimate = %a, "refining largest base");

    let mut steps = 0;
    while (&a + 1u32).pow(b) < limit {
        a += 1u32;
        steps += 1;
        if steps >= MAX_REFINEMENT_STEPS {
            return Err(BoundsError::NoConvergence);
        }
    }
    while a.pow(b) >= limit {
        a -= 1u32;
        steps += 1;
        if steps >= MAX_REFINEMENT_STEPS {
            return Err(BoundsError::NoConvergence);
        }
    }
    Ok(a)
}
