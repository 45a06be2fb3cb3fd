//! Function signatures, block types, limits, and import/export descriptors
//! (spec §3 "Function Type", "Block", and the per-namespace entity shapes).
//!
//! Grounded in `wasmi`'s `src/types.rs` (`Signature`/`GlobalDescriptor`/
//! `TableDescriptor`/`MemoryDescriptor`), generalized from that crate's
//! `memory_units`-based limits to plain page counts.

use alloc::string::String;
use alloc::vec::Vec;
use wazm_core::{ValueType, F32, F64};

/// A function signature: parameter and result type vectors, plus their
/// cached cell counts (spec §3 "Function Type").
///
/// Two `FuncType`s with the same params/results are considered the same
/// type; the module's type section may list structural duplicates, and
/// nothing in this CORE deduplicates them; each type-section entry gets its
/// own index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncType {
    params: Vec<ValueType>,
    results: Vec<ValueType>,
}

impl FuncType {
    pub fn new(params: Vec<ValueType>, results: Vec<ValueType>) -> Self {
        FuncType { params, results }
    }

    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    pub fn results(&self) -> &[ValueType] {
        &self.results
    }

    /// Total operand-stack cells occupied by the parameter vector.
    pub fn params_cell_count(&self) -> u32 {
        self.params.iter().map(|t| t.cell_count()).sum()
    }

    /// Total operand-stack cells occupied by the result vector.
    pub fn results_cell_count(&self) -> u32 {
        self.results.iter().map(|t| t.cell_count()).sum()
    }
}

/// The signature of a `block`/`loop`/`if`: either a single optional value
/// type or a reference into the module's type section (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// `0x40`: no params, no results.
    Empty,
    /// A single result type, no params.
    Value(ValueType),
    /// A signed LEB128 index into the type section; may have params.
    FuncType(u32),
}

/// Min/max pair shared by table and memory limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

impl Limits {
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Limits { min, max }
    }
}

/// A table type: element type plus size limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableType {
    pub element_type: ValueType,
    pub limits: Limits,
}

/// A linear memory type: size limits in 64 KiB pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryType {
    pub limits: Limits,
}

/// A global's declared type: value type plus mutability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalType {
    pub value_type: ValueType,
    pub mutable: bool,
}

/// What kind of entity an import or export names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalKind {
    Function,
    Table,
    Memory,
    Global,
}

/// A module import: the two-level `module`/`field` name plus the kind and
/// type of entity it binds into the importing namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module: String,
    pub field: String,
    pub kind: ImportKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportKind {
    Function(u32),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

impl ImportKind {
    pub fn external_kind(&self) -> ExternalKind {
        match self {
            ImportKind::Function(_) => ExternalKind::Function,
            ImportKind::Table(_) => ExternalKind::Table,
            ImportKind::Memory(_) => ExternalKind::Memory,
            ImportKind::Global(_) => ExternalKind::Global,
        }
    }
}

/// A module export: a name bound to an entity in one of the four
/// namespaces, referenced by index.
#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub name: String,
    pub kind: ExternalKind,
    pub index: u32,
}

/// A constant expression, as used for global initializers and element/data
/// segment offsets (spec §4.5).
///
/// The loader stores this uninterpreted; only the instantiator evaluates
/// it, and only `GlobalGet` requires a lookup (always to an earlier,
/// already-initialized global — forward references are rejected by the
/// loader, spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstExpr {
    I32(i32),
    I64(i64),
    F32(F32),
    F64(F64),
    RefNull,
    RefFunc(u32),
    GlobalGet(u32),
}

/// Where an element or data segment's contents land, and how.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentMode {
    /// Copied into a table/memory at instantiation, at `offset`.
    Active { index: u32, offset: ConstExpr },
    /// Left uncopied; available to `memory.init`/`table.init` (bulk memory).
    Passive,
    /// Never copied; only declares that its function indices are reachable
    /// (reference types — allows `ref.func` to name them without `table.init`).
    Declarative,
}

/// A branch-table entry (spec §3 "Branch Table Entry"): one per compiled
/// branching opcode, back-patched to a concrete target once the enclosing
/// block is popped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchTableEntry {
    /// Byte offset, within the owning function's code, of the branch opcode
    /// that produced this entry.
    pub source_ip: u32,
    /// Resolved jump target, populated when the enclosing block is popped.
    pub target_ip: u32,
    /// Index, within the owning function's branch table, at which the
    /// target block ends. Captured at push time for `loop` targets (the
    /// header is already known); at pop time otherwise.
    pub target_entry_index: u32,
    /// Cells to discard from the stack at jump time.
    pub pop: u32,
    /// Cells the target label expects pushed after the discard.
    pub push: u32,
}
