//! A reference evaluator for lowered IR.
//!
//! Words are 256 bits wide and wrap on overflow. Guard operations (`assert`
//! and the clamps) revert. Memory is byte-addressed and zero-initialised;
//! storage is a word-to-word map.

#![allow(dead_code)]

use std::collections::HashMap;

use num_bigint::{BigInt, Sign};
use num_integer::Integer;
use num_traits::{One, ToPrimitive, Zero};
use sha3::{Digest, Keccak256};

use stackc::ir::{IrNode, IrValue};
use stackc::types::{MemoryPositions, SizeLimits};

/// Why evaluation stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Halt {
    Revert(String),
    Break,
    Goto { label: String, carried: Option<BigInt> },
}

fn revert(reason: impl Into<String>) -> Halt {
    Halt::Revert(reason.into())
}

fn modulus() -> BigInt {
    BigInt::one() << 256u32
}

pub fn to_word(value: &BigInt) -> BigInt {
    value.mod_floor(&modulus())
}

/// Two's complement reading of a word.
pub fn to_signed(word: &BigInt) -> BigInt {
    if *word >= BigInt::one() << 255u32 {
        word - modulus()
    } else {
        word.clone()
    }
}

fn word_bytes(value: &BigInt) -> [u8; 32] {
    let (_, bytes) = to_word(value).to_bytes_be();
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    out
}

fn keccak(bytes: &[u8]) -> BigInt {
    BigInt::from_bytes_be(Sign::Plus, &Keccak256::digest(bytes))
}

fn flag(condition: bool) -> BigInt {
    if condition {
        BigInt::one()
    } else {
        BigInt::zero()
    }
}

fn offset(word: &BigInt) -> Result<usize, Halt> {
    word.to_usize().ok_or_else(|| revert(format!("memory offset {word} out of range")))
}

pub struct Machine {
    memory: Vec<u8>,
    storage: HashMap<BigInt, BigInt>,
    env: HashMap<String, BigInt>,
    scopes: Vec<(String, BigInt)>,
}

impl Machine {
    /// A machine with the numeric bound words initialised.
    pub fn new() -> Self {
        let mut machine = Self {
            memory: Vec::new(),
            storage: HashMap::new(),
            env: HashMap::new(),
            scopes: Vec::new(),
        };
        machine.store(MemoryPositions::MAXNUM, SizeLimits::max_int128());
        machine.store(MemoryPositions::MINNUM, SizeLimits::min_int128());
        machine.store(MemoryPositions::MAXDECIMAL, SizeLimits::max_decimal());
        machine.store(MemoryPositions::MINDECIMAL, SizeLimits::min_decimal());
        machine
    }

    /// Bind an environment symbol such as `caller` or `address`.
    pub fn with_env(mut self, name: &str, value: impl Into<BigInt>) -> Self {
        self.env.insert(name.to_string(), to_word(&value.into()));
        self
    }

    /// Write a word to memory.
    pub fn store(&mut self, at: u64, value: impl Into<BigInt>) {
        self.mstore(at as usize, &value.into());
    }

    /// Write a byte array (length word, then data) to memory.
    pub fn store_bytes(&mut self, at: u64, data: &[u8]) {
        self.store(at, data.len() as u64);
        let start = at as usize + 32;
        self.ensure(start + data.len().div_ceil(32) * 32);
        self.memory[start..start + data.len()].copy_from_slice(data);
    }

    pub fn sstore(&mut self, slot: impl Into<BigInt>, value: impl Into<BigInt>) {
        self.storage.insert(to_word(&slot.into()), to_word(&value.into()));
    }

    /// Storage slot of `mapping[key]` for a mapping at `slot`.
    pub fn mapping_slot(slot: impl Into<BigInt>, key: impl Into<BigInt>) -> BigInt {
        let mut data = word_bytes(&slot.into()).to_vec();
        data.extend_from_slice(&word_bytes(&key.into()));
        keccak(&data)
    }

    /// Evaluate a value-producing node, returning the unsigned word.
    pub fn run(&mut self, node: &IrNode) -> Result<BigInt, Halt> {
        self.value(node)
    }

    pub fn run_signed(&mut self, node: &IrNode) -> Result<BigInt, Halt> {
        self.run(node).map(|word| to_signed(&word))
    }

    fn ensure(&mut self, end: usize) {
        if self.memory.len() < end {
            self.memory.resize(end, 0);
        }
    }

    fn mload(&mut self, at: usize) -> BigInt {
        self.ensure(at + 32);
        BigInt::from_bytes_be(Sign::Plus, &self.memory[at..at + 32])
    }

    fn mstore(&mut self, at: usize, value: &BigInt) {
        self.ensure(at + 32);
        self.memory[at..at + 32].copy_from_slice(&word_bytes(value));
    }

    fn value(&mut self, node: &IrNode) -> Result<BigInt, Halt> {
        self.eval(node)?.ok_or_else(|| revert(format!("`{node}` produces no value")))
    }

    fn lookup(&self, name: &str) -> Result<BigInt, Halt> {
        self.scopes
            .iter()
            .rev()
            .find(|(bound, _)| bound == name)
            .map(|(_, value)| value.clone())
            .or_else(|| self.env.get(name).cloned())
            .ok_or_else(|| revert(format!("unbound symbol `{name}`")))
    }

    fn eval(&mut self, node: &IrNode) -> Result<Option<BigInt>, Halt> {
        let name = match &node.value {
            IrValue::Int(value) => return Ok(Some(to_word(value))),
            IrValue::Sym(name) => name.as_str(),
        };
        let args = &node.args;

        match (name, args.len()) {
            ("break", 0) => return Err(Halt::Break),
            (_, 0) => return self.lookup(name).map(Some),
            ("seq" | "seq_unchecked", _) => return self.eval_seq(args),
            ("with", 3) => {
                let IrValue::Sym(var) = &args[0].value else {
                    return Err(revert("`with` needs a symbol"));
                };
                let bound = self.value(&args[1])?;
                self.scopes.push((var.clone(), bound));
                let result = self.eval(&args[2]);
                self.scopes.pop();
                return result;
            }
            ("if", 2 | 3) => {
                if !self.value(&args[0])?.is_zero() {
                    return self.eval(&args[1]);
                }
                return match args.get(2) {
                    Some(otherwise) => self.eval(otherwise),
                    None => Ok(None),
                };
            }
            ("repeat", 4) => {
                let index_slot = offset(&self.value(&args[0])?)?;
                let start = self.value(&args[1])?;
                let count = self.value(&args[2])?;
                let mut i = BigInt::zero();
                while i < count {
                    self.mstore(index_slot, &(&start + &i));
                    match self.eval(&args[3]) {
                        Ok(_) => {}
                        Err(Halt::Break) => break,
                        Err(other) => return Err(other),
                    }
                    i += 1;
                }
                return Ok(None);
            }
            ("label", 1) => return Ok(None),
            ("goto", 1) => return Err(Halt::Goto { label: args[0].to_string(), carried: None }),
            ("assert", 1) => {
                if self.value(&args[0])?.is_zero() {
                    return Err(revert("assert failed"));
                }
                return Ok(None);
            }
            ("mstore", 2) => {
                let at = offset(&self.value(&args[0])?)?;
                let value = self.value(&args[1])?;
                self.mstore(at, &value);
                return Ok(None);
            }
            _ => {}
        }

        let values = args.iter().map(|arg| self.value(arg)).collect::<Result<Vec<_>, _>>()?;
        self.apply(name, &values).map(Some)
    }

    /// A sequence's value is that of its last value-producing element. A
    /// `goto` resumes after the matching `label` of the nearest enclosing
    /// sequence that has one, carrying the value computed before the jump.
    fn eval_seq(&mut self, args: &[IrNode]) -> Result<Option<BigInt>, Halt> {
        let mut last = None;
        let mut i = 0;
        while i < args.len() {
            match self.eval(&args[i]) {
                Ok(Some(value)) => last = Some(value),
                Ok(None) => {}
                Err(Halt::Goto { label, carried }) => {
                    let carried = carried.or(last.take());
                    let target = args[i + 1..].iter().position(|arg| {
                        arg.is_op("label") && arg.args.first().is_some_and(|l| l.to_string() == label)
                    });
                    match target {
                        Some(skip) => {
                            last = carried;
                            i += skip + 1;
                        }
                        None => return Err(Halt::Goto { label, carried }),
                    }
                }
                Err(other) => return Err(other),
            }
            i += 1;
        }
        Ok(last)
    }

    fn apply(&mut self, name: &str, v: &[BigInt]) -> Result<BigInt, Halt> {
        let signed = |i: usize| to_signed(&v[i]);
        let result = match (name, v.len()) {
            ("add", 2) => &v[0] + &v[1],
            ("sub", 2) => &v[0] - &v[1],
            ("mul", 2) => &v[0] * &v[1],
            ("div", 2) if v[1].is_zero() => BigInt::zero(),
            ("div", 2) => &v[0] / &v[1],
            ("sdiv", 2) if v[1].is_zero() => BigInt::zero(),
            ("sdiv", 2) => signed(0) / signed(1),
            ("mod", 2) if v[1].is_zero() => BigInt::zero(),
            ("mod", 2) => &v[0] % &v[1],
            ("smod", 2) if v[1].is_zero() => BigInt::zero(),
            ("smod", 2) => signed(0) % signed(1),
            ("exp", 2) => v[0].modpow(&v[1], &modulus()),
            ("lt", 2) => flag(v[0] < v[1]),
            ("gt", 2) => flag(v[0] > v[1]),
            ("le", 2) => flag(v[0] <= v[1]),
            ("ge", 2) => flag(v[0] >= v[1]),
            ("slt", 2) => flag(signed(0) < signed(1)),
            ("sgt", 2) => flag(signed(0) > signed(1)),
            ("sle", 2) => flag(signed(0) <= signed(1)),
            ("sge", 2) => flag(signed(0) >= signed(1)),
            ("eq", 2) => flag(v[0] == v[1]),
            ("ne", 2) => flag(v[0] != v[1]),
            ("iszero", 1) => flag(v[0].is_zero()),
            ("and", 2) => &v[0] & &v[1],
            ("or", 2) => &v[0] | &v[1],
            ("clamp", 3) => {
                if signed(1) < signed(0) || signed(1) > signed(2) {
                    return Err(revert(format!("{} outside [{}, {}]", signed(1), signed(0), signed(2))));
                }
                v[1].clone()
            }
            ("clampgt", 2) => {
                if signed(0) <= signed(1) {
                    return Err(revert(format!("{} is not above {}", signed(0), signed(1))));
                }
                v[0].clone()
            }
            ("clamp_nonzero", 1) => {
                if v[0].is_zero() {
                    return Err(revert("zero divisor"));
                }
                v[0].clone()
            }
            ("uclamplt", 2) => {
                if v[0] >= v[1] {
                    return Err(revert(format!("index {} not below {}", v[0], v[1])));
                }
                v[0].clone()
            }
            ("mload", 1) => self.mload(offset(&v[0])?),
            ("sload", 1) => self.storage.get(&v[0]).cloned().unwrap_or_default(),
            ("sha3_32", 1) => keccak(&word_bytes(&v[0])),
            ("sha3_64", 2) => Self::mapping_slot(v[0].clone(), v[1].clone()),
            ("sha3", 2) => {
                let (at, len) = (offset(&v[0])?, offset(&v[1])?);
                self.ensure(at + len);
                keccak(&self.memory[at..at + len])
            }
            _ => return Err(revert(format!("unsupported operation `{name}` with {} operand(s)", v.len()))),
        };
        Ok(to_word(&result))
    }
}
