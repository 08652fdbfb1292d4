//! Expression lowering tests.
//!
//! Tests organized by category:
//! - Literals
//! - Names, attributes and subscripts
//! - Arithmetic and exponentiation
//! - Comparisons and membership
//! - Boolean and unary operators
//! - Calls and composite literals

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::One;
use proptest::prelude::*;

use super::{CallLowering, ExprLowerer};
use crate::ast::{BinOpKind, BoolOpKind, CmpOp, Expr, ExprKind, UnaryOpKind};
use crate::config::LowerConfig;
use crate::context::{Context, EvmVersion, VariableRecord};
use crate::error::{Decline, ErrorCategory, LowerError, LowerErrorKind, LowerResult};
use crate::ir::{IrNode, Location};
use crate::span::Span;
use crate::types::{BaseKind, Type};

const INT128_MIN: &str = "-170141183460469231731687303715884105728";

fn point() -> IndexMap<String, Type> {
    [("x".to_string(), Type::int128()), ("y".to_string(), Type::int128())]
        .into_iter()
        .collect()
}

/// A function context with one variable of each interesting type.
fn context_for(config: &LowerConfig) -> Context {
    Context::new(config)
        .with_variable("x", VariableRecord::memory(1024, Type::int128()))
        .with_variable("y", VariableRecord::memory(1056, Type::int128()))
        .with_variable("u", VariableRecord::memory(1088, Type::uint256()))
        .with_variable("v", VariableRecord::memory(1120, Type::uint256()))
        .with_variable("d", VariableRecord::memory(1152, Type::decimal()))
        .with_variable("e", VariableRecord::memory(1184, Type::decimal()))
        .with_variable("flag", VariableRecord::memory(1216, Type::bool()))
        .with_variable("g", VariableRecord::memory(1248, Type::bool()))
        .with_variable("who", VariableRecord::memory(1280, Type::address()))
        .with_variable("b20", VariableRecord::memory(1312, Type::bytes(20)))
        .with_variable("c20", VariableRecord::memory(1376, Type::bytes(20)))
        .with_variable("b64", VariableRecord::memory(1440, Type::bytes(64)))
        .with_variable("nums", VariableRecord::memory(1536, Type::list(Type::int128(), 3)))
        .with_variable("key8", VariableRecord::memory(1700, Type::bytes(8)))
        .with_variable(
            "pair",
            VariableRecord::memory(1800, Type::tuple(vec![Type::int128(), Type::bytes(40)])),
        )
        .with_variable(
            "lookup",
            VariableRecord::memory(1900, Type::mapping(Type::int128(), Type::int128())),
        )
        .with_storage("total", 0, Type::uint256())
        .with_storage("balances", 1, Type::mapping(Type::address(), Type::uint256()))
        .with_storage("names", 2, Type::mapping(Type::bytes(10), Type::int128()))
        .with_storage("arr", 3, Type::list(Type::uint256(), 4))
        .with_storage("point", 4, Type::structure("Point", point()))
        .with_storage("ledger", 6, Type::mapping(Type::uint256(), Type::bool()))
        .with_struct("Point", point())
        .with_interface("Token")
}

fn context() -> Context {
    context_for(&LowerConfig::default())
}

fn context_on(evm_version: EvmVersion) -> Context {
    context_for(&LowerConfig { evm_version, ..LowerConfig::default() })
}

fn lower_in(ctx: &mut Context, expr: &Expr) -> LowerResult<IrNode> {
    ExprLowerer::new(ctx).lower(expr)
}

/// Helper to assert lowering succeeds and return the IR.
fn lower_ok(expr: &Expr) -> IrNode {
    match lower_in(&mut context(), expr) {
        Ok(ir) => ir,
        Err(err) => panic!("Expected lowering to succeed, but got: {err}"),
    }
}

/// Helper to assert lowering fails and return the error.
fn lower_err(expr: &Expr) -> Box<LowerError> {
    match lower_in(&mut context(), expr) {
        Ok(ir) => panic!("Expected lowering to fail, but got: {ir}"),
        Err(err) => err,
    }
}

/// Helper to assert lowering produces no IR for the given reason.
fn assert_declined(expr: &Expr, expected: Decline) {
    let err = lower_err(expr);
    match err.kind {
        LowerErrorKind::NoIr { reason, .. } => assert_eq!(reason, expected),
        other => panic!("Expected a declined lowering, but got: {other}"),
    }
}

fn name(id: &str) -> Expr {
    Expr::name(id)
}

fn binop(left: Expr, op: BinOpKind, right: Expr) -> Expr {
    Expr::binop(left, op, right)
}

fn compare(left: Expr, op: CmpOp, right: Expr) -> Expr {
    Expr::compare(left, op, right)
}

fn attr(value: &str, attr: &str) -> Expr {
    Expr::attribute(name(value), attr)
}

// ============================================================
// Literals
// ============================================================

#[test]
fn test_int_literal_widths() {
    let mut ctx = context();
    let mut lowerer = ExprLowerer::new(&mut ctx);

    let small = lowerer.lower_expr(&Expr::int(5)).expect("small literal");
    assert_eq!(small.ty(), Some(&Type::int128()));
    assert!(small.is_literal());

    let negative = lowerer.lower_expr(&Expr::int(-1)).expect("negative literal");
    assert_eq!(negative.ty(), Some(&Type::int128()));

    let big = lowerer.lower_expr(&Expr::int(BigInt::one() << 127u32)).expect("2^127");
    assert_eq!(big.ty(), Some(&Type::uint256()));

    let committed = lowerer.lower(&Expr::int(5)).expect("small literal");
    assert!(!committed.is_literal());

    let err = lowerer.lower(&Expr::int(BigInt::one() << 256u32)).unwrap_err();
    assert!(matches!(err.kind, LowerErrorKind::InvalidLiteral { .. }));
}

proptest! {
    #[test]
    fn prop_signed_literals_are_int128(value in any::<i128>()) {
        let ir = lower_ok(&Expr::int(value));
        prop_assert_eq!(ir.ty(), Some(&Type::int128()));
        prop_assert_eq!(ir.to_string(), value.to_string());
    }

    #[test]
    fn prop_large_literals_are_uint256(value in (i128::MAX as u128 + 1)..=u128::MAX) {
        let ir = lower_ok(&Expr::int(value));
        prop_assert_eq!(ir.ty(), Some(&Type::uint256()));
    }
}

#[test]
fn test_decimal_literal() {
    let ir = lower_ok(&Expr::decimal("3.25"));
    assert_eq!(ir.to_string(), "32500000000");
    assert_eq!(ir.ty(), Some(&Type::decimal()));

    let ir = lower_ok(&Expr::decimal("-0.0000000001"));
    assert_eq!(ir.to_string(), "-1");

    let err = lower_err(&Expr::decimal("0.00000000001"));
    assert!(matches!(err.kind, LowerErrorKind::InvalidLiteral { .. }));

    let err = lower_err(&Expr::decimal("170141183460469231731687303715884105728.0"));
    assert!(matches!(err.kind, LowerErrorKind::InvalidLiteral { .. }));
}

/// `numerator / 10^places` written out with exactly `places` fractional digits.
fn decimal_text(numerator: i64, places: u32) -> String {
    let places = places as usize;
    let digits = format!("{:0>width$}", numerator.unsigned_abs(), width = places + 1);
    let (whole, frac) = digits.split_at(digits.len() - places);
    let sign = if numerator < 0 { "-" } else { "" };
    format!("{sign}{whole}.{frac}")
}

proptest! {
    #[test]
    fn prop_decimals_within_scale_are_exact(numerator in any::<i64>(), places in 0u32..=10) {
        let ir = lower_ok(&Expr::decimal(decimal_text(numerator, places)));
        let expected = BigInt::from(numerator) * BigInt::from(10u32).pow(10 - places);
        prop_assert_eq!(ir.as_int(), Some(&expected));
    }

    #[test]
    fn prop_decimals_beyond_scale_fail(numerator in any::<i64>(), places in 11u32..=18) {
        prop_assume!(numerator % 10 != 0);
        let err = lower_err(&Expr::decimal(decimal_text(numerator, places)));
        let is_invalid_literal = matches!(err.kind, LowerErrorKind::InvalidLiteral { .. });
        prop_assert!(is_invalid_literal);
    }
}

#[test]
fn test_hex_literals() {
    let ir = lower_ok(&Expr::hex("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
    assert_eq!(ir.ty(), Some(&Type::address()));

    let err = lower_err(&Expr::hex("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"));
    assert!(matches!(err.kind, LowerErrorKind::InvalidLiteral { .. }));
    assert_eq!(err.help.as_deref(), Some("if this is an address, write it as 0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));

    let word = format!("0x{}", "ab".repeat(32));
    assert_eq!(lower_ok(&Expr::hex(word)).ty(), Some(&Type::bytes32()));

    let err = lower_err(&Expr::hex("0x1234"));
    assert!(matches!(err.kind, LowerErrorKind::InvalidLiteral { .. }));
}

#[test]
fn test_string_literal_in_scratch_memory() {
    let mut ctx = context();
    let ir = lower_in(&mut ctx, &Expr::str("hi")).expect("ascii string");
    assert_eq!(
        ir.to_string(),
        "(seq (mstore 320 2) (mstore (add 320 32) 47226055194461434745431958897357469009552817079588419131632412154350433992704) 320)"
    );
    assert_eq!(ir.ty(), Some(&Type::string(2)));
    assert_eq!(ir.location, Some(Location::Memory));
    assert_eq!(ctx.memory().next_free(), 384);

    let err = lower_err(&Expr::str("\u{263a}"));
    assert!(matches!(err.kind, LowerErrorKind::InvalidLiteral { .. }));
}

#[test]
fn test_bool_and_none() {
    assert_eq!(lower_ok(&Expr::bool(true)).to_string(), "1");
    assert_eq!(lower_ok(&Expr::bool(false)).ty(), Some(&Type::bool()));

    let err = lower_err(&Expr::none());
    assert_eq!(err.category(), ErrorCategory::CompilerInvariant);
}

// ============================================================
// Names, attributes and subscripts
// ============================================================

#[test]
fn test_names() {
    let ir = lower_ok(&name("x"));
    assert_eq!(ir.to_string(), "1024");
    assert_eq!(ir.location, Some(Location::Memory));
    assert_eq!(ir.annotation.as_deref(), Some("x"));

    assert_eq!(lower_ok(&name("self")).to_string(), "address");

    let zero = lower_ok(&name("ZERO_ADDRESS"));
    assert_eq!(zero.to_string(), "0");
    assert_eq!(zero.ty(), Some(&Type::address()));

    let err = lower_err(&name("missing"));
    assert!(matches!(err.kind, LowerErrorKind::Undeclared { .. }));
}

#[test]
fn test_storage_fields() {
    let ir = lower_ok(&Expr::self_attr("total"));
    assert_eq!(ir.to_string(), "0");
    assert_eq!(ir.location, Some(Location::Storage));
    assert_eq!(ir.annotation.as_deref(), Some("self.total"));

    let member = lower_ok(&Expr::attribute(Expr::self_attr("point"), "y"));
    assert_eq!(member.to_string(), "(add (sha3_32 4) 1)");
    assert_eq!(member.location, Some(Location::Storage));
    assert_eq!(member.annotation.as_deref(), Some("self.point.y"));

    let err = lower_err(&Expr::self_attr("nothing"));
    assert!(matches!(err.kind, LowerErrorKind::Undeclared { .. }));
}

#[test]
fn test_environment_variables() {
    assert_eq!(lower_ok(&attr("msg", "sender")).to_string(), "caller");
    assert_eq!(lower_ok(&attr("block", "prevhash")).to_string(), "(blockhash (sub number 1))");
    assert_eq!(lower_ok(&attr("chain", "id")).to_string(), "chainid");
    assert_declined(&attr("msg", "foo"), Decline::UnknownAttribute { attr: "msg.foo".to_string() });

    let mut internal = context().internal(true);
    let err = lower_in(&mut internal, &attr("msg", "sender")).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Structure);

    let err = lower_err(&attr("msg", "value"));
    assert_eq!(err.category(), ErrorCategory::Structure);
    assert!(err.help.is_some());
    let mut payable = context().payable(true);
    let ir = lower_in(&mut payable, &attr("msg", "value")).expect("payable");
    assert_eq!(ir.to_string(), "callvalue");

    let mut old = context_on(EvmVersion::Byzantium);
    let err = lower_in(&mut old, &attr("chain", "id")).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::TargetVersion);
    assert_eq!(err.to_diagnostic().code.as_deref(), Some("E0701"));
}

#[test]
fn test_address_attributes() {
    assert_eq!(lower_ok(&attr("who", "balance")).to_string(), "(balance (mload 1280))");
    assert_eq!(lower_ok(&attr("self", "balance")).to_string(), "selfbalance");
    assert_eq!(lower_ok(&attr("who", "is_contract")).to_string(), "(gt (extcodesize (mload 1280)) 0)");
    assert_eq!(lower_ok(&attr("self", "codesize")).to_string(), "codesize");

    let mut old = context_on(EvmVersion::Byzantium);
    let ir = lower_in(&mut old, &attr("self", "balance")).expect("balance");
    assert_eq!(ir.to_string(), "(balance address)");
    let err = lower_in(&mut old, &attr("who", "codehash")).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::TargetVersion);

    let mut petersburg = context_on(EvmVersion::Petersburg);
    let ir = lower_in(&mut petersburg, &attr("who", "codehash")).expect("codehash");
    assert_eq!(ir.to_string(), "(extcodehash (mload 1280))");
    assert_eq!(ir.ty(), Some(&Type::bytes32()));
}

#[test]
fn test_mapping_subscripts() {
    let ir = lower_ok(&Expr::subscript(Expr::self_attr("balances"), name("who")));
    assert_eq!(ir.to_string(), "(sha3_64 1 (mload 1280))");
    assert_eq!(ir.ty(), Some(&Type::uint256()));
    assert_eq!(ir.location, Some(Location::Storage));

    let ir = lower_ok(&Expr::subscript(Expr::self_attr("ledger"), Expr::int(5)));
    assert_eq!(ir.to_string(), "(sha3_64 6 5)");

    let ir = lower_ok(&Expr::subscript(Expr::self_attr("names"), name("key8")));
    assert_eq!(ir.to_string(), "(sha3_64 2 (with _sub 1700 (sha3 (add _sub 32) (mload _sub))))");

    let err = lower_err(&Expr::subscript(Expr::self_attr("names"), name("b20")));
    assert!(matches!(err.kind, LowerErrorKind::TypeMismatch { .. }));

    let err = lower_err(&Expr::subscript(Expr::self_attr("balances"), Expr::int(5)));
    assert!(matches!(err.kind, LowerErrorKind::TypeMismatch { .. }));

    let err = lower_err(&Expr::subscript(name("lookup"), Expr::int(1)));
    assert_eq!(err.category(), ErrorCategory::Structure);
}

#[test]
fn test_list_subscripts() {
    let ir = lower_ok(&Expr::subscript(name("nums"), Expr::int(1)));
    assert_eq!(ir.to_string(), "(add 1536 32)");
    assert_eq!(ir.ty(), Some(&Type::int128()));

    let ir = lower_ok(&Expr::subscript(name("nums"), name("x")));
    assert_eq!(ir.to_string(), "(add 1536 (mul 32 (uclamplt (mload 1024) 3)))");

    let ir = lower_ok(&Expr::subscript(Expr::self_attr("arr"), name("u")));
    assert_eq!(ir.to_string(), "(add (sha3_32 3) (uclamplt (mload 1088) 4))");

    let err = lower_err(&Expr::subscript(name("nums"), Expr::int(3)));
    assert!(matches!(err.kind, LowerErrorKind::ArrayIndex { count: 3, .. }));

    let err = lower_err(&Expr::subscript(name("nums"), Expr::int(-1)));
    assert!(matches!(err.kind, LowerErrorKind::ArrayIndex { .. }));
}

#[test]
fn test_tuple_subscripts() {
    let ir = lower_ok(&Expr::subscript(name("pair"), Expr::int(1)));
    assert_eq!(ir.to_string(), "(add 1800 32)");
    assert_eq!(ir.ty(), Some(&Type::bytes(40)));

    let err = lower_err(&Expr::subscript(name("pair"), name("x")));
    assert_eq!(err.category(), ErrorCategory::Structure);

    assert_declined(
        &Expr::subscript(name("pair"), Expr::int(2)),
        Decline::TupleIndex { index: "2".to_string(), len: 2 },
    );
    assert_declined(
        &Expr::subscript(name("x"), Expr::int(0)),
        Decline::NotSubscriptable { found: "int128".to_string() },
    );
}

// ============================================================
// Arithmetic
// ============================================================

#[test]
fn test_uint256_add_asserts_no_wraparound() {
    let ir = lower_ok(&binop(name("u"), BinOpKind::Add, name("v")));
    assert_eq!(
        ir.to_string(),
        "(with l (mload 1088) (with r (mload 1120) (seq (seq (assert (ge (add l r) l)) (add l r)))))"
    );
    assert_eq!(ir.ty(), Some(&Type::uint256()));

    let ir = lower_ok(&binop(name("u"), BinOpKind::Sub, name("v")));
    assert_eq!(
        ir.to_string(),
        "(with l (mload 1088) (with r (mload 1120) (seq (seq (assert (ge l r)) (sub l r)))))"
    );
}

#[test]
fn test_int128_arithmetic_is_clamped() {
    let ir = lower_ok(&binop(name("x"), BinOpKind::Add, name("y")));
    assert_eq!(
        ir.to_string(),
        "(with l (mload 1024) (with r (mload 1056) (seq (clamp (mload 96) (add l r) (mload 64)))))"
    );

    let ir = lower_ok(&binop(name("x"), BinOpKind::Mult, name("y")));
    assert_eq!(
        ir.to_string(),
        "(with l (mload 1024) (with r (mload 1056) (seq (clamp (mload 96) (mul l r) (mload 64)))))"
    );
}

#[test]
fn test_multiplication_guards() {
    let ir = lower_ok(&binop(name("u"), BinOpKind::Mult, name("v")));
    assert_eq!(
        ir.to_string(),
        "(with l (mload 1088) (with r (mload 1120) (seq (with ans (mul l r) (seq (assert (or (eq (div ans l) r) (iszero l))) ans)))))"
    );

    let ir = lower_ok(&binop(name("d"), BinOpKind::Mult, name("e")));
    assert_eq!(
        ir.to_string(),
        "(with l (mload 1152) (with r (mload 1184) (seq (clamp (mload 160) (with ans (mul l r) (seq (assert (or (eq (sdiv ans l) r) (iszero l))) (sdiv ans 10000000000))) (mload 128)))))"
    );
}

#[test]
fn test_division_and_modulo() {
    let ir = lower_ok(&binop(name("u"), BinOpKind::Div, name("v")));
    assert_eq!(ir.to_string(), "(with l (mload 1088) (with r (mload 1120) (seq (div l (clamp_nonzero r)))))");

    let ir = lower_ok(&binop(name("x"), BinOpKind::Div, Expr::int(2)));
    assert_eq!(ir.to_string(), "(with l (mload 1024) (with r 2 (seq (clamp (mload 96) (sdiv l r) (mload 64)))))");

    let ir = lower_ok(&binop(name("x"), BinOpKind::Mod, name("y")));
    assert_eq!(
        ir.to_string(),
        "(with l (mload 1024) (with r (mload 1056) (seq (clamp (mload 96) (smod l (clamp_nonzero r)) (mload 64)))))"
    );

    let ir = lower_ok(&binop(name("d"), BinOpKind::Div, name("e")));
    assert_eq!(
        ir.to_string(),
        "(with l (mload 1152) (with r (mload 1184) (seq (clamp (mload 160) (sdiv (mul l 10000000000) (clamp_nonzero r)) (mload 128)))))"
    );

    assert_declined(&binop(name("x"), BinOpKind::Mod, Expr::int(0)), Decline::ZeroDivisor);
}

#[test]
fn test_computed_literal_divisor_keeps_zero_check() {
    let negated_zero = Expr::unary(UnaryOpKind::USub, Expr::int(0));
    let ir = lower_ok(&binop(name("x"), BinOpKind::Div, negated_zero));
    assert_eq!(
        ir.to_string(),
        format!("(with l (mload 1024) (with r (sub 0 (clampgt 0 {INT128_MIN})) (seq (clamp (mload 96) (sdiv l (clamp_nonzero r)) (mload 64)))))")
    );

    let ir = lower_ok(&binop(name("x"), BinOpKind::Mod, Expr::unary(UnaryOpKind::USub, Expr::int(3))));
    assert!(ir.any(&|n| n.is_op("clamp_nonzero")));
}

#[test]
fn test_literal_widens_toward_committed_operand() {
    let ir = lower_ok(&binop(name("u"), BinOpKind::Add, Expr::int(1)));
    assert_eq!(ir.ty(), Some(&Type::uint256()));
    assert!(ir.to_string().starts_with("(with l (mload 1088) (with r 1 "));

    let ir = lower_ok(&binop(Expr::int(1), BinOpKind::Add, name("u")));
    assert_eq!(ir.ty(), Some(&Type::uint256()));
    assert!(!ir.any(&|n| n.is_literal()));

    assert_declined(
        &binop(Expr::int(-1), BinOpKind::Add, name("u")),
        Decline::IncompatibleOperands { op: "+", left: "int128".to_string(), right: "uint256".to_string() },
    );
    assert_declined(
        &binop(name("x"), BinOpKind::Add, name("u")),
        Decline::IncompatibleOperands { op: "+", left: "int128".to_string(), right: "uint256".to_string() },
    );
    assert_declined(
        &binop(name("d"), BinOpKind::Add, name("x")),
        Decline::IncompatibleOperands { op: "+", left: "decimal".to_string(), right: "int128".to_string() },
    );
    assert_declined(
        &binop(name("flag"), BinOpKind::Add, name("g")),
        Decline::IncompatibleOperands { op: "+", left: "bool".to_string(), right: "bool".to_string() },
    );
}

#[test]
fn test_exponentiation() {
    let ir = lower_ok(&binop(Expr::int(2), BinOpKind::Pow, name("u")));
    assert_eq!(ir.to_string(), "(with l 2 (with r (mload 1088) (seq (assert (lt r 256)) (exp l r))))");
    assert_eq!(ir.ty(), Some(&Type::uint256()));

    let ir = lower_ok(&binop(name("u"), BinOpKind::Pow, Expr::int(2)));
    assert_eq!(
        ir.to_string(),
        "(with l (mload 1088) (with r 2 (seq (assert (lt l 340282366920938463463374607431768211456)) (exp l r))))"
    );

    let ir = lower_ok(&binop(name("x"), BinOpKind::Pow, Expr::int(2)));
    assert_eq!(
        ir.to_string(),
        "(with l (mload 1024) (with r 2 (seq (assert (and (slt l 13043817825332782213) (sgt l -13043817825332782213))) (exp l r))))"
    );
}

#[test]
fn test_exponentiation_degenerate_and_rejected() {
    assert_eq!(lower_ok(&binop(Expr::int(1), BinOpKind::Pow, name("u"))).to_string(), "1");
    assert_eq!(lower_ok(&binop(Expr::int(0), BinOpKind::Pow, name("x"))).to_string(), "(iszero (mload 1024))");
    assert_eq!(lower_ok(&binop(name("u"), BinOpKind::Pow, Expr::int(0))).to_string(), "1");

    let ir = lower_ok(&binop(name("u"), BinOpKind::Pow, Expr::int(1)));
    assert_eq!(ir.to_string(), "(mload 1088)");
    assert_eq!(ir.ty(), Some(&Type::uint256()));
    let ir = lower_ok(&binop(name("x"), BinOpKind::Pow, Expr::int(1)));
    assert_eq!(ir.ty(), Some(&Type::int128()));

    assert_declined(&binop(name("x"), BinOpKind::Pow, name("y")), Decline::UnboundedPower);
    assert_declined(
        &binop(name("d"), BinOpKind::Pow, name("e")),
        Decline::UnsupportedOperand { op: "**", found: "decimal".to_string() },
    );

    let err = lower_err(&binop(name("u"), BinOpKind::Pow, Expr::int(300)));
    assert!(matches!(err.kind, LowerErrorKind::InvalidLiteral { .. }));
}

// ============================================================
// Comparisons
// ============================================================

#[test]
fn test_numeric_comparisons() {
    assert_eq!(lower_ok(&compare(name("x"), CmpOp::Lt, name("y"))).to_string(), "(slt (mload 1024) (mload 1056))");
    assert_eq!(lower_ok(&compare(name("u"), CmpOp::GtE, name("v"))).to_string(), "(ge (mload 1088) (mload 1120))");
    assert_eq!(lower_ok(&compare(name("d"), CmpOp::NotEq, name("e"))).to_string(), "(ne (mload 1152) (mload 1184))");

    let ir = lower_ok(&compare(name("who"), CmpOp::Eq, name("who")));
    assert_eq!(ir.to_string(), "(eq (mload 1280) (mload 1280))");
    assert_eq!(ir.ty(), Some(&Type::bool()));
}

#[test]
fn test_mixed_sign_comparison_needs_literal() {
    let ir = lower_ok(&compare(Expr::int(5), CmpOp::Lt, name("u")));
    assert_eq!(ir.to_string(), "(lt 5 (mload 1088))");

    let ir = lower_ok(&compare(name("u"), CmpOp::Gt, Expr::int(5)));
    assert_eq!(ir.to_string(), "(gt (mload 1088) 5)");

    let err = lower_err(&compare(Expr::int(-5), CmpOp::Lt, name("u")));
    assert_eq!(err.category(), ErrorCategory::CompilerInvariant);

    assert_declined(
        &compare(name("x"), CmpOp::Lt, name("u")),
        Decline::IncompatibleOperands { op: "<", left: "int128".to_string(), right: "uint256".to_string() },
    );
    assert_declined(
        &compare(name("d"), CmpOp::Lt, name("x")),
        Decline::IncompatibleOperands { op: "<", left: "decimal".to_string(), right: "int128".to_string() },
    );
    assert_declined(
        &compare(name("who"), CmpOp::Lt, name("who")),
        Decline::IncompatibleOperands { op: "<", left: "address".to_string(), right: "address".to_string() },
    );
}

#[test]
fn test_byte_array_comparisons() {
    let ir = lower_ok(&compare(name("b20"), CmpOp::Eq, name("c20")));
    assert_eq!(ir.to_string(), "(eq (mload (add 32 1312)) (mload (add 32 1376)))");

    let ir = lower_ok(&compare(name("b20"), CmpOp::NotEq, name("b64")));
    assert_eq!(
        ir.to_string(),
        "(ne (with _sub 1312 (sha3 (add _sub 32) (mload _sub))) (with _sub 1440 (sha3 (add _sub 32) (mload _sub))))"
    );
    assert!(!ir.any(&|n| n.is_op("eq") && n.args.iter().all(|a| a.is_op("mload"))));

    assert_declined(
        &compare(name("b20"), CmpOp::Lt, name("c20")),
        Decline::IncompatibleOperands { op: "<", left: "Bytes[20]".to_string(), right: "Bytes[20]".to_string() },
    );
}

#[test]
fn test_membership_in_memory_list() {
    let ir = lower_ok(&compare(name("x"), CmpOp::In, name("nums")));
    assert_eq!(
        ir.to_string(),
        "(eq 1 (seq (mstore 320 0) (with _result 320 (repeat 288 0 3 (if (eq (mload 1024) (mload (add 1536 (mul 32 (mload 288))))) (seq (mstore _result 1) break)))) (mload 320)))"
    );
    assert_eq!(ir.ty(), Some(&Type::bool()));
    assert_eq!(ir.annotation.as_deref(), Some("in comparator"));
}

#[test]
fn test_membership_in_literal_list() {
    let list = Expr::list(vec![Expr::int(1), Expr::int(2)]);
    let ir = lower_ok(&compare(name("x"), CmpOp::In, list));
    assert_eq!(
        ir.to_string(),
        "(eq 1 (seq (seq (mstore 352 1) (mstore 384 2)) (mstore 320 0) (with _result 320 (repeat 288 0 2 (if (eq (mload 1024) (mload (add 352 (mul 32 (mload 288))))) (seq (mstore _result 1) break)))) (mload 320)))"
    );
}

#[test]
fn test_membership_in_storage_list() {
    let ir = lower_ok(&compare(name("u"), CmpOp::In, Expr::self_attr("arr")));
    assert_eq!(
        ir.to_string(),
        "(eq 1 (seq (mstore 320 0) (with _result 320 (repeat 288 0 4 (if (eq (mload 1088) (sload (add (sha3_32 3) (mload 288)))) (seq (mstore _result 1) break)))) (mload 320)))"
    );

    assert_declined(
        &compare(name("x"), CmpOp::In, name("u")),
        Decline::UnsupportedOperand { op: "in", found: "uint256".to_string() },
    );
}

// ============================================================
// Boolean and unary operators
// ============================================================

#[test]
fn test_and_of_two_has_no_label() {
    let expr = Expr::boolop(BoolOpKind::And, vec![name("flag"), name("g")]);
    assert_eq!(lower_ok(&expr).to_string(), "(if (mload 1216) (mload 1248) 0)");
}

#[test]
fn test_and_chain_jumps_past_remaining_operands() {
    let expr = Expr::boolop(BoolOpKind::And, vec![name("flag"), name("g"), name("flag")])
        .at(Span::new(10, 25, 1, 11));
    let ir = lower_ok(&expr);
    assert_eq!(
        ir.to_string(),
        "(seq_unchecked (if (mload 1216) (if (mload 1248) (mload 1216) 0) (seq_unchecked 0 (goto _boolop_10:15))) (label _boolop_10:15))"
    );
    assert_eq!(ir.ty(), Some(&Type::bool()));
}

#[test]
fn test_or_chains() {
    let expr = Expr::boolop(BoolOpKind::Or, vec![name("flag"), name("g")]).at(Span::new(0, 12, 1, 1));
    assert_eq!(
        lower_ok(&expr).to_string(),
        "(seq_unchecked (if (mload 1216) (seq_unchecked 1 (goto _boolop_0:12)) (mload 1248)) (label _boolop_0:12))"
    );

    let expr = Expr::boolop(BoolOpKind::Or, vec![name("flag"), name("g"), name("flag")]).at(Span::new(4, 9, 1, 5));
    assert_eq!(
        lower_ok(&expr).to_string(),
        "(seq_unchecked (if (mload 1216) (seq_unchecked 1 (goto _boolop_4:5)) (if (mload 1248) (seq_unchecked 1 (goto _boolop_4:5)) (mload 1216))) (label _boolop_4:5))"
    );
}

#[test]
fn test_nested_boolops_use_distinct_labels() {
    let inner = Expr::boolop(BoolOpKind::Or, vec![name("flag"), name("g")]).at(Span::new(6, 17, 1, 7));
    let outer = Expr::boolop(BoolOpKind::And, vec![name("g"), inner, name("flag")]).at(Span::new(0, 30, 1, 1));
    let ir = lower_ok(&outer);
    let mut labels = Vec::new();
    ir.walk(&mut |n| {
        if n.is_op("label") {
            labels.push(n.args[0].to_string());
        }
    });
    assert_eq!(labels, vec!["_boolop_6:11", "_boolop_0:30"]);
}

#[test]
fn test_boolops_without_spans_get_numbered_labels() {
    let left = Expr::boolop(BoolOpKind::Or, vec![name("flag"), name("g"), name("g")]);
    let right = Expr::boolop(BoolOpKind::Or, vec![name("g"), name("g"), name("g")]);
    let ir = lower_ok(&Expr::boolop(BoolOpKind::And, vec![left, right]));
    let mut labels = Vec::new();
    ir.walk(&mut |n| {
        if n.is_op("label") {
            labels.push(n.args[0].to_string());
        }
    });
    assert_eq!(labels, vec!["_boolop_0", "_boolop_1"]);
}

#[test]
fn test_boolop_rejects_non_boolean() {
    assert_declined(
        &Expr::boolop(BoolOpKind::And, vec![name("flag"), name("x")]),
        Decline::NonBoolean { op: "and", found: "int128".to_string() },
    );
    let err = lower_err(&Expr::boolop(BoolOpKind::Or, vec![name("flag")]));
    assert_eq!(err.category(), ErrorCategory::Structure);
}

#[test]
fn test_unary_operators() {
    assert_eq!(lower_ok(&Expr::unary(UnaryOpKind::Not, name("flag"))).to_string(), "(iszero (mload 1216))");
    assert_declined(
        &Expr::unary(UnaryOpKind::Not, name("x")),
        Decline::NonBoolean { op: "not", found: "int128".to_string() },
    );

    let ir = lower_ok(&Expr::unary(UnaryOpKind::USub, name("x")));
    assert_eq!(ir.to_string(), format!("(sub 0 (clampgt (mload 1024) {INT128_MIN}))"));
    assert_eq!(ir.ty(), Some(&Type::int128()));

    let err = lower_err(&Expr::unary(UnaryOpKind::USub, name("u")));
    assert!(matches!(err.kind, LowerErrorKind::TypeMismatch { .. }));
}

// ============================================================
// Calls and composite literals
// ============================================================

/// Internal calls become `(invoke method args...)`, external calls
/// `(extcall target method)`.
struct StubCalls;

impl CallLowering for StubCalls {
    fn lower_self_call(
        &self,
        method: &str,
        args: &[Expr],
        span: Span,
        lowerer: &mut ExprLowerer<'_>,
    ) -> LowerResult<IrNode> {
        let mut operands = vec![IrNode::sym(method)];
        for arg in args {
            operands.push(lowerer.lower_value(arg)?);
        }
        Ok(IrNode::op("invoke", operands).typed(Type::uint256()).at(span))
    }

    fn lower_external_call(
        &self,
        func: &Expr,
        _args: &[Expr],
        span: Span,
        lowerer: &mut ExprLowerer<'_>,
    ) -> LowerResult<IrNode> {
        let ExprKind::Attribute { value, attr } = &func.kind else {
            return LowerError::structure("unsupported callee", span).into_err();
        };
        let target = lowerer.lower_value(value)?;
        Ok(IrNode::op("extcall", vec![target, IrNode::sym(attr.as_str())]).typed(Type::bool()).at(span))
    }
}

fn self_call(method: &str, args: Vec<Expr>) -> Expr {
    Expr::call(Expr::self_attr(method), args)
}

#[test]
fn test_struct_constructor() {
    let expr = Expr::call(
        name("Point"),
        vec![Expr::dict(vec![(name("y"), name("x")), (name("x"), Expr::int(1))])],
    );
    let ir = lower_ok(&expr);
    assert_eq!(ir.to_string(), "(multi (mload 1024) 1)");
    let members = ir.ty().and_then(Type::struct_members).expect("struct type");
    assert_eq!(members.keys().collect::<Vec<_>>(), vec!["y", "x"]);
}

#[test]
fn test_struct_constructor_errors() {
    let bad_member = Expr::call(name("Point"), vec![Expr::dict(vec![(name("z"), Expr::int(1))])]);
    let err = lower_err(&bad_member);
    assert_eq!(err.kind.to_string(), "Invalid member variable for struct");

    let duplicate = Expr::call(
        name("Point"),
        vec![Expr::dict(vec![(name("x"), Expr::int(1)), (name("x"), Expr::int(2))])],
    );
    assert_eq!(lower_err(&duplicate).category(), ErrorCategory::CompilerInvariant);

    assert_declined(
        &Expr::call(name("Point"), vec![Expr::int(1)]),
        Decline::BadCallShape { name: "Point".to_string() },
    );
}

#[test]
fn test_interface_cast() {
    let ir = lower_ok(&Expr::call(name("Token"), vec![name("who")]));
    assert_eq!(ir.to_string(), "1280");
    assert_eq!(ir.ty(), Some(&Type::interface("Token")));
    assert_eq!(ir.location, Some(Location::Memory));

    assert_declined(
        &Expr::call(name("Token"), vec![name("x")]),
        Decline::BadCallShape { name: "Token".to_string() },
    );
    assert_declined(
        &Expr::call(name("frobnicate"), vec![]),
        Decline::Other { message: "unknown function `frobnicate`".to_string() },
    );
}

#[test]
fn test_internal_and_external_calls() {
    let err = lower_err(&self_call("foo", vec![]));
    assert_eq!(err.category(), ErrorCategory::Structure);

    let calls = StubCalls;
    let mut ctx = context();
    let mut lowerer = ExprLowerer::new(&mut ctx).with_calls(&calls);

    let ir = lowerer.lower(&self_call("foo", vec![name("x")])).expect("internal call");
    assert_eq!(ir.to_string(), "(invoke foo (mload 1024))");

    let token = Expr::call(name("Token"), vec![name("who")]);
    let ir = lowerer
        .lower(&Expr::call(Expr::attribute(token, "transfer"), vec![]))
        .expect("external call");
    assert_eq!(ir.to_string(), "(extcall (mload 1280) transfer)");
}

#[test]
fn test_list_literals() {
    let ir = lower_ok(&Expr::list(vec![Expr::int(1), Expr::int(2), Expr::int(3)]));
    assert_eq!(ir.to_string(), "(multi 1 2 3)");
    assert_eq!(ir.ty(), Some(&Type::list(Type::int128(), 3)));

    let err = lower_err(&Expr::list(vec![name("x"), name("u")]));
    assert_eq!(err.kind.to_string(), "type mismatch: Lists may only contain one type");

    assert_declined(&Expr::list(vec![]), Decline::Empty { what: "list" });
}

#[test]
fn test_tuple_hoists_calls() {
    let calls = StubCalls;
    let mut ctx = context();
    let expr = Expr::tuple(vec![
        name("x"),
        self_call("foo", vec![]),
        Expr::call(name("len"), vec![name("b20")]),
    ]);
    let ir = ExprLowerer::new(&mut ctx).with_calls(&calls).lower(&expr).expect("tuple");
    assert_eq!(
        ir.to_string(),
        "(seq_unchecked (mstore 320 (invoke foo)) (mstore 352 (mload 1312)) (multi (mload 1024) 320 352))"
    );
    assert_eq!(
        ir.ty(),
        Some(&Type::tuple(vec![Type::int128(), Type::uint256(), Type::int128()]))
    );
    assert_eq!(ctx.memory().next_free(), 384);
}

#[test]
fn test_tuple_without_calls_is_repeatable() {
    let mut ctx = context();
    let expr = Expr::tuple(vec![name("x"), Expr::bool(true)]);
    let first = lower_in(&mut ctx, &expr).expect("tuple");
    let second = lower_in(&mut ctx, &expr).expect("tuple");
    assert_eq!(first, second);
    assert_eq!(first.to_string(), "(multi (mload 1024) 1)");
    assert_eq!(ctx.memory().next_free(), 320);

    assert_declined(&Expr::tuple(vec![]), Decline::Empty { what: "tuple" });
}

#[test]
fn test_tuple_with_calls_relowers_into_fresh_slots() {
    let calls = StubCalls;
    let mut ctx = context();
    let expr = Expr::tuple(vec![self_call("foo", vec![]), name("x"), self_call("bar", vec![name("y")])]);

    let first = ExprLowerer::new(&mut ctx).with_calls(&calls).lower(&expr).expect("tuple");
    let second = ExprLowerer::new(&mut ctx).with_calls(&calls).lower(&expr).expect("tuple");
    assert_eq!(
        first.to_string(),
        "(seq_unchecked (mstore 320 (invoke foo)) (mstore 352 (invoke bar (mload 1056))) (multi 320 (mload 1024) 352))"
    );
    assert_eq!(
        second.to_string(),
        "(seq_unchecked (mstore 384 (invoke foo)) (mstore 416 (invoke bar (mload 1056))) (multi 384 (mload 1024) 416))"
    );
    assert_eq!(first.ty(), second.ty());
    assert_eq!(ctx.memory().next_free(), 448);
}

#[test]
fn test_output_types_are_committed() {
    let exprs = [
        binop(name("u"), BinOpKind::Add, Expr::int(1)),
        Expr::tuple(vec![Expr::int(1), Expr::decimal("1.5")]),
        Expr::list(vec![Expr::int(7)]),
        compare(Expr::int(5), CmpOp::Lt, name("u")),
    ];
    for expr in &exprs {
        let ir = lower_ok(expr);
        assert!(!ir.any(&|n| n.ty().is_some_and(Type::has_literal)), "literal type in {ir}");
    }
}

#[test]
fn test_errors_carry_node_span() {
    let span = Span::new(3, 9, 1, 4);
    let err = lower_err(&binop(name("x"), BinOpKind::Pow, name("y")).at(span));
    assert_eq!(err.span, span);
    assert!(matches!(err.kind, LowerErrorKind::NoIr { node: "BinOp", .. }));
    assert_eq!(err.to_diagnostic().code.as_deref(), Some("E0802"));
}

#[test]
fn test_literal_base_kind_is_preserved_for_bytes32() {
    let ir = lower_ok(&name("EMPTY_BYTES32"));
    assert_eq!(ir.ty().and_then(Type::as_base), Some(BaseKind::Bytes32));
}
