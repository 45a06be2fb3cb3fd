//! The Module Skeleton (spec §3 "Module") and its sub-entities, plus the
//! per-section loaders that populate it (spec §4.3).
//!
//! Grounded in `wasmi`'s `src/module.rs`: kept its "build a `Module` by
//! appending vectors as sections are read" shape and its index-space
//! convention (imports first, then defined entries, in the same vector),
//! but replaced `wasmi`'s `Rc`-linked `ModuleRef`/host-instance machinery
//! (out of this CORE's scope — spec §1 pushes host import resolution to an
//! external collaborator) with plain index-only lookups.

mod sections;

use alloc::string::String;
use alloc::vec::Vec;

use crate::config::Config;
use crate::error::{LoaderError, LoaderResult};
use crate::types::{
    BranchTableEntry, ConstExpr, Export, ExternalKind, FuncType, GlobalType, Import, MemoryType,
    SegmentMode, TableType,
};
use wazm_core::ValueType;

pub use sections::load_module;

/// A defined function's body: its locals, its (initially raw, eventually
/// rewritten) opcode stream, and the fields the validator fills in on
/// success (spec §3 "Function").
#[derive(Debug, Clone)]
pub struct Function {
    pub type_index: u32,
    /// Declared locals beyond the parameters, in declaration order.
    pub locals: Vec<ValueType>,
    /// Cell offset of every local (params first, then `locals`), indexed by
    /// local index. Used by the validator's fast-path rewrite to decide
    /// whether `local_offset < 128`.
    pub local_offsets: Vec<u32>,
    /// The function body's opcode stream, with the locals-declaration
    /// prefix already stripped. Mutated in place by the validator.
    pub code: Vec<u8>,

    /// Set by the validator on success.
    pub max_stack_cell_num: u32,
    /// Set by the validator on success.
    pub max_block_num: u32,
    /// Set by the validator on success.
    pub branch_table: Vec<BranchTableEntry>,
}

impl Function {
    pub(crate) fn new(type_index: u32, locals: Vec<ValueType>, local_offsets: Vec<u32>, code: Vec<u8>) -> Self {
        Function {
            type_index,
            locals,
            local_offsets,
            code,
            max_stack_cell_num: 0,
            max_block_num: 0,
            branch_table: Vec::new(),
        }
    }
}

/// An element segment (spec §4.5): a vector of (possibly null) function
/// references plus the mode describing where/whether they're copied.
#[derive(Debug, Clone)]
pub struct ElementSegment {
    pub mode: SegmentMode,
    pub element_type: ValueType,
    pub func_indices: Vec<Option<u32>>,
}

/// A data segment (spec §4.5): a raw byte payload plus the mode describing
/// where/whether it's copied.
#[derive(Debug, Clone)]
pub struct DataSegment {
    pub mode: SegmentMode,
    pub bytes: Vec<u8>,
}

/// A custom section: passed through unevaluated (spec §4.2).
#[derive(Debug, Clone)]
pub struct CustomSection {
    pub name: String,
    pub data: Vec<u8>,
}

/// How many of each namespace's index-space entries were contributed by
/// imports (spec §3: "for every entity namespace, an index `i` refers to an
/// imported entity iff `i < import_<kind>_count`").
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportCounts {
    pub functions: u32,
    pub tables: u32,
    pub memories: u32,
    pub globals: u32,
}

/// The fully loaded, not-yet-validated module.
///
/// Every namespace vector (`func_types`, `tables`, `memories`, `globals`)
/// covers the *whole* index space: imported entries first (descriptor only),
/// then defined entries. `code` and `global_inits` cover only the defined
/// tail of the function and global namespaces, in the same relative order.
#[derive(Debug, Clone)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    pub import_counts: ImportCounts,

    /// Type index for every function in index space.
    pub func_types: Vec<u32>,
    /// Bodies for the defined functions only.
    pub code: Vec<Function>,

    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,

    pub globals: Vec<GlobalType>,
    /// Initializers for the defined globals only.
    pub global_inits: Vec<ConstExpr>,

    pub exports: Vec<Export>,
    pub start: Option<u32>,

    pub elements: Vec<ElementSegment>,
    pub data: Vec<DataSegment>,
    /// Declared segment count from the data-count section, if present.
    /// Required for `memory.init`/`data.drop` to validate (spec §4.2).
    pub data_count: Option<u32>,

    pub custom_sections: Vec<CustomSection>,

    /// Set by the validator: `true` unless every function body was checked
    /// and none of them contains `memory.grow` (spec §4.5 "Memory
    /// Instantiation" page-size-collapse optimization).
    pub possibly_grows_memory: bool,

    pub config: Config,
}

impl Module {
    pub(crate) fn empty(config: Config) -> Self {
        Module {
            types: Vec::new(),
            imports: Vec::new(),
            import_counts: ImportCounts::default(),
            func_types: Vec::new(),
            code: Vec::new(),
            tables: Vec::new(),
            memories: Vec::new(),
            globals: Vec::new(),
            global_inits: Vec::new(),
            exports: Vec::new(),
            start: None,
            elements: Vec::new(),
            data: Vec::new(),
            data_count: None,
            custom_sections: Vec::new(),
            possibly_grows_memory: true,
            config,
        }
    }

    pub fn func_type(&self, func_index: u32) -> LoaderResult<&FuncType> {
        let type_index = *self
            .func_types
            .get(func_index as usize)
            .ok_or(LoaderError::unknown("function", func_index))?;
        self.types
            .get(type_index as usize)
            .ok_or(LoaderError::unknown("type", type_index))
    }

    pub fn is_function_imported(&self, func_index: u32) -> bool {
        func_index < self.import_counts.functions
    }

    pub fn is_table_imported(&self, table_index: u32) -> bool {
        table_index < self.import_counts.tables
    }

    pub fn is_memory_imported(&self, memory_index: u32) -> bool {
        memory_index < self.import_counts.memories
    }

    pub fn is_global_imported(&self, global_index: u32) -> bool {
        global_index < self.import_counts.globals
    }

    /// The defined function body for `func_index`, or `None` if it names an
    /// imported function.
    pub fn defined_function(&self, func_index: u32) -> Option<&Function> {
        let local = func_index.checked_sub(self.import_counts.functions)?;
        self.code.get(local as usize)
    }

    pub fn defined_function_mut(&mut self, func_index: u32) -> Option<&mut Function> {
        let local = func_index.checked_sub(self.import_counts.functions)?;
        self.code.get_mut(local as usize)
    }

    pub fn global_type(&self, global_index: u32) -> LoaderResult<&GlobalType> {
        self.globals
            .get(global_index as usize)
            .ok_or(LoaderError::unknown("global", global_index))
    }

    pub fn table_type(&self, table_index: u32) -> LoaderResult<&TableType> {
        self.tables
            .get(table_index as usize)
            .ok_or(LoaderError::unknown("table", table_index))
    }

    pub fn memory_type(&self, memory_index: u32) -> LoaderResult<&MemoryType> {
        self.memories
            .get(memory_index as usize)
            .ok_or(LoaderError::unknown("memory", memory_index))
    }

    pub fn total_functions(&self) -> u32 {
        self.func_types.len() as u32
    }

    pub fn total_tables(&self) -> u32 {
        self.tables.len() as u32
    }

    pub fn total_memories(&self) -> u32 {
        self.memories.len() as u32
    }

    pub fn total_globals(&self) -> u32 {
        self.globals.len() as u32
    }
}

pub(crate) fn import_kind_name(kind: ExternalKind) -> &'static str {
    match kind {
        ExternalKind::Function => "function",
        ExternalKind::Table => "table",
        ExternalKind::Memory => "memory",
        ExternalKind::Global => "global",
    }
}
