//! Top-level validator entry point (spec §4.4) and the module-wide context
//! every function validates against.
//!
//! Grounded in `wasmi`'s `src/validation/mod.rs` (`validate_module`'s
//! per-function loop, `ModuleContextBuilder`), adapted to validate in place
//! against this crate's owned `Module` rather than building a side
//! `ModuleContext` for a separately-owned parity-wasm tree.

pub(crate) mod branch_table;
mod func;

use alloc::collections::BTreeSet;

use crate::config::Config;
use crate::error::{LoaderError, LoaderResult};
use crate::module::{ImportCounts, Module};
use crate::types::{ExternalKind, FuncType, GlobalType, MemoryType, TableType};

/// The read-only module state every function validates against. Borrowed
/// from [`Module`]'s fields directly (not through `&Module`) so the
/// compiler can see it doesn't alias `module.code`, which the per-function
/// loop borrows mutably at the same time.
pub(crate) struct ModuleContext<'a> {
    pub types: &'a [FuncType],
    pub func_types: &'a [u32],
    pub globals: &'a [GlobalType],
    pub tables: &'a [TableType],
    pub memories: &'a [MemoryType],
    pub data_count: Option<u32>,
    pub import_counts: ImportCounts,
    pub config: Config,
    pub declared_funcs: &'a BTreeSet<u32>,
}

impl<'a> ModuleContext<'a> {
    pub fn func_type(&self, func_index: u32) -> LoaderResult<&'a FuncType> {
        let type_index = *self
            .func_types
            .get(func_index as usize)
            .ok_or(LoaderError::unknown("function", func_index))?;
        self.types
            .get(type_index as usize)
            .ok_or(LoaderError::unknown("type", type_index))
    }

    pub fn global_type(&self, global_index: u32) -> LoaderResult<&'a GlobalType> {
        self.globals
            .get(global_index as usize)
            .ok_or(LoaderError::unknown("global", global_index))
    }

    pub fn table_type(&self, table_index: u32) -> LoaderResult<&'a TableType> {
        self.tables
            .get(table_index as usize)
            .ok_or(LoaderError::unknown("table", table_index))
    }

    pub fn memory_type(&self, memory_index: u32) -> LoaderResult<&'a MemoryType> {
        self.memories
            .get(memory_index as usize)
            .ok_or(LoaderError::unknown("memory", memory_index))
    }

    pub fn total_functions(&self) -> u32 {
        self.func_types.len() as u32
    }
}

/// Functions a `ref.func` is allowed to name: those reachable from an
/// export, the start function, or any element segment (active, passive, or
/// declarative — spec §4.4 "undeclared function reference"). Computed once,
/// before any function body is validated, since the set only depends on
/// already-loaded module structure, never on other functions' bodies.
fn compute_declared_functions(module: &Module) -> BTreeSet<u32> {
    let mut declared = BTreeSet::new();
    for export in &module.exports {
        if export.kind == ExternalKind::Function {
            declared.insert(export.index);
        }
    }
    if let Some(start) = module.start {
        declared.insert(start);
    }
    for segment in &module.elements {
        for index in segment.func_indices.iter().flatten() {
            declared.insert(*index);
        }
    }
    declared
}

/// Validates every defined function body in `module`, rewriting fast-path
/// opcodes and filling in each [`crate::module::Function`]'s
/// `max_stack_cell_num`, `max_block_num` and `branch_table` on success
/// (spec §2 pipeline step "Validator").
pub fn validate_module(module: &mut Module) -> LoaderResult<()> {
    let declared_funcs = compute_declared_functions(module);

    let ctx = ModuleContext {
        types: &module.types,
        func_types: &module.func_types,
        globals: &module.globals,
        tables: &module.tables,
        memories: &module.memories,
        data_count: module.data_count,
        import_counts: module.import_counts,
        config: module.config,
        declared_funcs: &declared_funcs,
    };

    let import_function_count = module.import_counts.functions;
    let mut possibly_grows_memory = false;
    for (local_index, function) in module.code.iter_mut().enumerate() {
        let func_index = import_function_count + local_index as u32;
        if func::validate_function(&ctx, func_index, function)? {
            possibly_grows_memory = true;
        }
    }
    module.possibly_grows_memory = possibly_grows_memory;
    Ok(())
}
