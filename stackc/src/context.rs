//! The lowering environment.
//!
//! The lowerer never owns declarations. It reads them through the
//! [`Environment`] trait, which the statement compiler implements for the
//! function being compiled. [`Context`] is the stock implementation used by
//! the CLI and the tests.
//!
//! # Scratch memory
//!
//! Placeholders come from a single-writer bump allocator
//! ([`MemoryAllocator`]). Allocation only ever moves forward during a pass,
//! so one `Context` must not be shared by two lowering passes at once; the
//! `&mut` receiver on [`Environment::new_scratch_placeholder`] enforces
//! that statically.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::LowerConfig;
use crate::ir::Location;
use crate::types::Type;

// ============================================================
// VM versions
// ============================================================

/// Target VM ruleset.
///
/// Constantinople and Petersburg share a rank: Petersburg only removed an
/// opcode change, so every feature gated on one is available on the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvmVersion {
    Byzantium,
    Constantinople,
    Petersburg,
    #[default]
    Istanbul,
    Berlin,
}

impl EvmVersion {
    pub const ALL: [EvmVersion; 5] = [
        EvmVersion::Byzantium,
        EvmVersion::Constantinople,
        EvmVersion::Petersburg,
        EvmVersion::Istanbul,
        EvmVersion::Berlin,
    ];

    fn rank(self) -> u8 {
        match self {
            EvmVersion::Byzantium => 0,
            EvmVersion::Constantinople | EvmVersion::Petersburg => 1,
            EvmVersion::Istanbul => 2,
            EvmVersion::Berlin => 3,
        }
    }

    /// Whether every feature of `other` is available on `self`.
    pub fn at_least(self, other: EvmVersion) -> bool {
        self.rank() >= other.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EvmVersion::Byzantium => "byzantium",
            EvmVersion::Constantinople => "constantinople",
            EvmVersion::Petersburg => "petersburg",
            EvmVersion::Istanbul => "istanbul",
            EvmVersion::Berlin => "berlin",
        }
    }
}

impl fmt::Display for EvmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown VM version `{0}` (expected one of byzantium, constantinople, petersburg, istanbul, berlin)")]
pub struct UnknownEvmVersion(pub String);

impl FromStr for EvmVersion {
    type Err = UnknownEvmVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EvmVersion::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownEvmVersion(s.to_string()))
    }
}

// ============================================================
// Declarations
// ============================================================

/// A function-local variable: memory or calldata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRecord {
    /// Byte offset (memory/calldata) of the variable.
    pub pos: u64,
    #[serde(rename = "type")]
    pub typ: Type,
    #[serde(default = "default_memory")]
    pub location: Location,
    #[serde(default = "default_true")]
    pub mutable: bool,
}

impl VariableRecord {
    pub fn memory(pos: u64, typ: Type) -> Self {
        Self { pos, typ, location: Location::Memory, mutable: true }
    }

    /// A calldata argument; never writable.
    pub fn calldata(pos: u64, typ: Type) -> Self {
        Self { pos, typ, location: Location::Calldata, mutable: false }
    }
}

/// A contract storage variable, reached as `self.<name>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageField {
    pub slot: u64,
    #[serde(rename = "type")]
    pub typ: Type,
    /// Constants live in storage but are read-only.
    #[serde(default)]
    pub constant: bool,
}

fn default_memory() -> Location {
    Location::Memory
}

fn default_true() -> bool {
    true
}

// ============================================================
// Environment interface
// ============================================================

/// Everything the lowerer needs to know about the enclosing function.
pub trait Environment {
    /// A function-local variable (memory or calldata).
    fn lookup_variable(&self, name: &str) -> Option<&VariableRecord>;

    /// A storage variable reached as `self.<name>`.
    fn lookup_self_field(&self, name: &str) -> Option<&StorageField>;

    /// Member types of a declared struct, in declaration order.
    fn lookup_struct(&self, name: &str) -> Option<&IndexMap<String, Type>>;

    /// Whether `name` is a declared contract interface.
    fn is_interface(&self, name: &str) -> bool;

    /// Reserve scratch memory for a value of `typ` and return its address.
    ///
    /// Returns `None` for types without a memory size (mappings).
    fn new_scratch_placeholder(&mut self, typ: &Type) -> Option<u64>;

    /// A fresh number for a jump label, unique within the function.
    fn next_label_id(&mut self) -> u64;

    /// Whether the enclosing function is only callable from this contract.
    fn is_internal_call_context(&self) -> bool;

    fn is_payable_context(&self) -> bool;

    fn evm_version(&self) -> EvmVersion;

    fn vm_version_at_least(&self, version: EvmVersion) -> bool {
        self.evm_version().at_least(version)
    }
}

/// Monotonic scratch memory allocator.
#[derive(Debug, Clone)]
pub struct MemoryAllocator {
    next: u64,
}

impl MemoryAllocator {
    pub fn new(start: u64) -> Self {
        Self { next: start }
    }

    /// Reserve `words` 32-byte words and return the first byte's address.
    pub fn allocate(&mut self, words: u64) -> u64 {
        let pos = self.next;
        self.next += 32 * words;
        pos
    }

    /// The address the next allocation will return.
    pub fn next_free(&self) -> u64 {
        self.next
    }
}

// ============================================================
// Concrete context
// ============================================================

/// The stock [`Environment`].
#[derive(Debug, Clone)]
pub struct Context {
    vars: HashMap<String, VariableRecord>,
    globals: HashMap<String, StorageField>,
    structs: HashMap<String, IndexMap<String, Type>>,
    interfaces: HashSet<String>,
    is_internal: bool,
    is_payable: bool,
    evm_version: EvmVersion,
    memory: MemoryAllocator,
    labels: u64,
}

impl Context {
    pub fn new(config: &LowerConfig) -> Self {
        Self {
            vars: HashMap::new(),
            globals: HashMap::new(),
            structs: HashMap::new(),
            interfaces: HashSet::new(),
            is_internal: false,
            is_payable: false,
            evm_version: config.evm_version,
            memory: MemoryAllocator::new(config.scratch_memory_start),
            labels: 0,
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, record: VariableRecord) -> Self {
        self.vars.insert(name.into(), record);
        self
    }

    pub fn with_storage(mut self, name: impl Into<String>, slot: u64, typ: Type) -> Self {
        self.globals.insert(name.into(), StorageField { slot, typ, constant: false });
        self
    }

    pub fn with_struct(mut self, name: impl Into<String>, members: IndexMap<String, Type>) -> Self {
        self.structs.insert(name.into(), members);
        self
    }

    pub fn with_interface(mut self, name: impl Into<String>) -> Self {
        self.interfaces.insert(name.into());
        self
    }

    pub fn internal(mut self, is_internal: bool) -> Self {
        self.is_internal = is_internal;
        self
    }

    pub fn payable(mut self, is_payable: bool) -> Self {
        self.is_payable = is_payable;
        self
    }

    pub fn memory(&self) -> &MemoryAllocator {
        &self.memory
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(&LowerConfig::default())
    }
}

impl Environment for Context {
    fn lookup_variable(&self, name: &str) -> Option<&VariableRecord> {
        self.vars.get(name)
    }

    fn lookup_self_field(&self, name: &str) -> Option<&StorageField> {
        self.globals.get(name)
    }

    fn lookup_struct(&self, name: &str) -> Option<&IndexMap<String, Type>> {
        self.structs.get(name)
    }

    fn is_interface(&self, name: &str) -> bool {
        self.interfaces.contains(name)
    }

    fn new_scratch_placeholder(&mut self, typ: &Type) -> Option<u64> {
        let words = typ.size_in_words()?;
        let pos = self.memory.allocate(words);
        debug!(%typ, pos, words, "allocated scratch placeholder");
        Some(pos)
    }

    fn next_label_id(&mut self) -> u64 {
        let id = self.labels;
        self.labels += 1;
        id
    }

    fn is_internal_call_context(&self) -> bool {
        self.is_internal
    }

    fn is_payable_context(&self) -> bool {
        self.is_payable
    }

    fn evm_version(&self) -> EvmVersion {
        self.evm_version
    }
}

// ============================================================
// Serialized form
// ============================================================

/// The declarations visible to one expression, as read from a JSON
/// document by the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextDecl {
    pub variables: IndexMap<String, VariableRecord>,
    pub storage: IndexMap<String, StorageField>,
    pub structs: IndexMap<String, IndexMap<String, Type>>,
    pub interfaces: Vec<String>,
    pub internal: bool,
    pub payable: bool,
}

impl ContextDecl {
    pub fn into_context(self, config: &LowerConfig) -> Context {
        let mut ctx = Context::new(config).internal(self.internal).payable(self.payable);
        ctx.vars.extend(self.variables);
        ctx.globals.extend(self.storage);
        ctx.structs.extend(self.structs);
        ctx.interfaces.extend(self.interfaces);
        ctx
    }
}
