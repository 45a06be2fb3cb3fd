//! The Instantiator (spec §4.5): turns a validated [`Module`] into storage
//! an execution engine can run against — a contiguous global data blob with
//! initializers evaluated, and memory/table descriptors with the
//! `memory.grow`-free page-size collapse applied. Element and data segments
//! are deliberately left uncopied; the execution engine applies them on
//! module start.
//!
//! Grounded in
//! `runtime/wasmvm/instantiate/src/wasm_globals_instantiate.c`'s cumulative
//! `data_offset` allocation and per-type byte write, generalized from its
//! `int32`/`int64` union write to this crate's `Value::write_le`.

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{LoaderError, LoaderResult};
use crate::module::Module;
use crate::types::{ConstExpr, Limits};
use wazm_core::{Value, ValueType};

/// One global's placement in the instance's global data blob.
#[derive(Debug, Clone, Copy)]
pub struct InstanceGlobal {
    pub value_type: ValueType,
    pub mutable: bool,
    /// Byte offset into [`Instance::global_data`].
    pub data_offset: u32,
}

/// One linear memory's layout, after the memory.grow-free page collapse
/// (spec §4.5).
#[derive(Debug, Clone, Copy)]
pub struct InstanceMemory {
    pub bytes_per_page: u32,
    pub min_pages: u32,
    pub max_pages: u32,
}

/// One table's layout. Element contents are populated later by the
/// execution engine from the module's element segments.
#[derive(Debug, Clone, Copy)]
pub struct InstanceTable {
    pub element_type: ValueType,
    pub min: u32,
    pub max: Option<u32>,
}

/// The storage an execution engine needs to start running a module:
/// everything [`crate::Module`] describes, laid out and with global
/// initializers evaluated.
#[derive(Debug, Clone)]
pub struct Instance {
    pub globals: Vec<InstanceGlobal>,
    /// One contiguous buffer holding every global's value, back to back in
    /// index order (imports first, then defined).
    pub global_data: Vec<u8>,
    pub memories: Vec<InstanceMemory>,
    pub tables: Vec<InstanceTable>,
}

const WASM_PAGE_SIZE: u32 = 64 * 1024;

/// Lays out globals/memories/tables for `module` (spec §4.5). `module` must
/// already have passed [`crate::load_and_validate`] — the const-expr
/// back-reference rule it depends on is a validation-time guarantee, not
/// re-checked here.
pub fn instantiate(module: &Module) -> LoaderResult<Instance> {
    let (globals, global_data) = instantiate_globals(module)?;
    let memories = module.memories.iter().map(|mt| instantiate_memory(mt.limits, module.possibly_grows_memory)).collect();
    let tables = module
        .tables
        .iter()
        .map(|tt| InstanceTable {
            element_type: tt.element_type,
            min: tt.limits.min,
            max: tt.limits.max,
        })
        .collect();

    Ok(Instance { globals, global_data, memories, tables })
}

fn instantiate_globals(module: &Module) -> LoaderResult<(Vec<InstanceGlobal>, Vec<u8>)> {
    let mut globals = Vec::with_capacity(module.globals.len());
    let mut offset = 0u32;
    for gt in &module.globals {
        globals.push(InstanceGlobal {
            value_type: gt.value_type,
            mutable: gt.mutable,
            data_offset: offset,
        });
        offset += gt.value_type.cell_count() * 4;
    }

    let mut global_data = vec![0u8; offset as usize];

    // Imported globals' values are supplied by the host at link time, which
    // is out of this CORE's scope (spec §1); their slots stay zeroed here.
    let import_count = module.import_counts.globals as usize;
    for (local_index, init) in module.global_inits.iter().enumerate() {
        let global_index = import_count + local_index;
        let slot = &globals[global_index];
        write_const_expr(&mut global_data, &globals, slot.value_type, slot.data_offset, *init)?;
    }

    Ok((globals, global_data))
}

fn write_const_expr(
    global_data: &mut [u8],
    globals: &[InstanceGlobal],
    value_type: ValueType,
    data_offset: u32,
    init: ConstExpr,
) -> LoaderResult<()> {
    let start = data_offset as usize;
    let len = (value_type.cell_count() * 4) as usize;

    match init {
        ConstExpr::GlobalGet(idx) => {
            let source = &globals[idx as usize];
            let source_start = source.data_offset as usize;
            global_data.copy_within(source_start..source_start + len, start);
            Ok(())
        }
        _ => {
            let value = literal_value(init, value_type)?;
            value.write_le(&mut global_data[start..start + len]);
            Ok(())
        }
    }
}

fn literal_value(init: ConstExpr, value_type: ValueType) -> LoaderResult<Value> {
    Ok(match (init, value_type) {
        (ConstExpr::I32(v), ValueType::I32) => Value::I32(v),
        (ConstExpr::I64(v), ValueType::I64) => Value::I64(v),
        (ConstExpr::F32(v), ValueType::F32) => Value::F32(v),
        (ConstExpr::F64(v), ValueType::F64) => Value::F64(v),
        (ConstExpr::RefNull, ValueType::FuncRef) => Value::FuncRef(None),
        (ConstExpr::RefNull, ValueType::ExternRef) => Value::ExternRef,
        (ConstExpr::RefFunc(idx), ValueType::FuncRef) => Value::FuncRef(Some(idx)),
        _ => return Err(LoaderError::type_mismatch("global initializer does not match declared type")),
    })
}

fn instantiate_memory(limits: Limits, possibly_grows_memory: bool) -> InstanceMemory {
    if possibly_grows_memory {
        return InstanceMemory {
            bytes_per_page: WASM_PAGE_SIZE,
            min_pages: limits.min,
            max_pages: limits.max.unwrap_or(limits.min),
        };
    }
    // No function body in the module contains `memory.grow`: collapse into
    // a single fixed-size virtual page, so the base pointer is a
    // compile-time constant for a downstream JIT (spec §4.5).
    if limits.min == 0 {
        return InstanceMemory { bytes_per_page: WASM_PAGE_SIZE, min_pages: 0, max_pages: 0 };
    }
    InstanceMemory {
        bytes_per_page: WASM_PAGE_SIZE * limits.min,
        min_pages: 1,
        max_pages: 1,
    }
}
