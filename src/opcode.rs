//! Raw Wasm opcode byte constants, the natural-alignment table for memory
//! ops, and the internal fast-path opcodes the validator rewrites opcode
//! bytes into (spec §4.4 "Opcode rewrites performed during validation").
//!
//! The validator dispatches directly on these raw bytes (a single `match`,
//! per the "giant switch" design note in spec §9) rather than decoding into
//! an intermediate instruction AST: the fast-path rewrite needs the exact
//! byte offsets of the instruction it replaces, which an AST node would
//! normally discard.

#![allow(dead_code)]

/// Standard Wasm 1.0 (plus the opt-in proposals named in spec §6) opcode
/// bytes actually consulted by the validator.
pub mod op {
    pub const UNREACHABLE: u8 = 0x00;
    pub const NOP: u8 = 0x01;
    pub const BLOCK: u8 = 0x02;
    pub const LOOP: u8 = 0x03;
    pub const IF: u8 = 0x04;
    pub const ELSE: u8 = 0x05;
    pub const END: u8 = 0x0B;
    pub const BR: u8 = 0x0C;
    pub const BR_IF: u8 = 0x0D;
    pub const BR_TABLE: u8 = 0x0E;
    pub const RETURN: u8 = 0x0F;
    pub const CALL: u8 = 0x10;
    pub const CALL_INDIRECT: u8 = 0x11;
    pub const RETURN_CALL: u8 = 0x12;
    pub const RETURN_CALL_INDIRECT: u8 = 0x13;

    pub const DROP: u8 = 0x1A;
    pub const SELECT: u8 = 0x1B;
    pub const SELECT_T: u8 = 0x1C;

    pub const LOCAL_GET: u8 = 0x20;
    pub const LOCAL_SET: u8 = 0x21;
    pub const LOCAL_TEE: u8 = 0x22;
    pub const GLOBAL_GET: u8 = 0x23;
    pub const GLOBAL_SET: u8 = 0x24;
    pub const TABLE_GET: u8 = 0x25;
    pub const TABLE_SET: u8 = 0x26;

    pub const I32_LOAD: u8 = 0x28;
    pub const I64_LOAD: u8 = 0x29;
    pub const F32_LOAD: u8 = 0x2A;
    pub const F64_LOAD: u8 = 0x2B;
    pub const I32_LOAD8_S: u8 = 0x2C;
    pub const I32_LOAD8_U: u8 = 0x2D;
    pub const I32_LOAD16_S: u8 = 0x2E;
    pub const I32_LOAD16_U: u8 = 0x2F;
    pub const I64_LOAD8_S: u8 = 0x30;
    pub const I64_LOAD8_U: u8 = 0x31;
    pub const I64_LOAD16_S: u8 = 0x32;
    pub const I64_LOAD16_U: u8 = 0x33;
    pub const I64_LOAD32_S: u8 = 0x34;
    pub const I64_LOAD32_U: u8 = 0x35;
    pub const I32_STORE: u8 = 0x36;
    pub const I64_STORE: u8 = 0x37;
    pub const F32_STORE: u8 = 0x38;
    pub const F64_STORE: u8 = 0x39;
    pub const I32_STORE8: u8 = 0x3A;
    pub const I32_STORE16: u8 = 0x3B;
    pub const I64_STORE8: u8 = 0x3C;
    pub const I64_STORE16: u8 = 0x3D;
    pub const I64_STORE32: u8 = 0x3E;
    pub const MEMORY_SIZE: u8 = 0x3F;
    pub const MEMORY_GROW: u8 = 0x40;

    pub const I32_CONST: u8 = 0x41;
    pub const I64_CONST: u8 = 0x42;
    pub const F32_CONST: u8 = 0x43;
    pub const F64_CONST: u8 = 0x44;

    // 0x45..=0xC4: numeric comparison/arithmetic/conversion ops. These never
    // change the validator's control-flow state in a way that needs a named
    // constant; `FunctionValidator` handles the whole contiguous range with
    // a lookup table (see `validate::func::numeric_signature`).
    pub const NUMERIC_OPS_START: u8 = 0x45;
    pub const NUMERIC_OPS_END: u8 = 0xC4;

    pub const REF_NULL: u8 = 0xD0;
    pub const REF_IS_NULL: u8 = 0xD1;
    pub const REF_FUNC: u8 = 0xD2;

    /// Prefix byte for the multi-byte "misc" opcode space: saturating
    /// truncation and bulk-memory operations. The actual operation is the
    /// following LEB128-encoded sub-opcode.
    pub const MISC_PREFIX: u8 = 0xFC;

    pub const MISC_I32_TRUNC_SAT_F32_S: u32 = 0x00;
    pub const MISC_I32_TRUNC_SAT_F32_U: u32 = 0x01;
    pub const MISC_I32_TRUNC_SAT_F64_S: u32 = 0x02;
    pub const MISC_I32_TRUNC_SAT_F64_U: u32 = 0x03;
    pub const MISC_I64_TRUNC_SAT_F32_S: u32 = 0x04;
    pub const MISC_I64_TRUNC_SAT_F32_U: u32 = 0x05;
    pub const MISC_I64_TRUNC_SAT_F64_S: u32 = 0x06;
    pub const MISC_I64_TRUNC_SAT_F64_U: u32 = 0x07;
    pub const MISC_MEMORY_INIT: u32 = 0x08;
    pub const MISC_DATA_DROP: u32 = 0x09;
    pub const MISC_MEMORY_COPY: u32 = 0x0A;
    pub const MISC_MEMORY_FILL: u32 = 0x0B;
    pub const MISC_TABLE_INIT: u32 = 0x0C;
    pub const MISC_ELEM_DROP: u32 = 0x0D;
    pub const MISC_TABLE_COPY: u32 = 0x0E;
    pub const MISC_TABLE_GROW: u32 = 0x0F;
    pub const MISC_TABLE_SIZE: u32 = 0x10;
    pub const MISC_TABLE_FILL: u32 = 0x11;
}

/// Internal fast-path opcode bytes the validator rewrites into, chosen from
/// the range the Wasm core spec (plus the proposals this CORE implements)
/// leaves unassigned (0xD3..=0xD9, just past `ref.func` and well short of
/// the numeric-op range).
///
/// These bytes never appear in an input binary; they only appear in a
/// [`crate::module::Function`]'s code after successful validation, and only
/// a downstream interpreter that agrees on this encoding can execute them.
pub mod fastpath {
    /// Rewrite target for `local.get` with `local_offset < 128`. Followed by
    /// one offset byte (bit 7 set iff the local is 64-bit wide).
    pub const LOCAL_GET: u8 = 0xD3;
    /// Rewrite target for `local.set` with `local_offset < 128`.
    pub const LOCAL_SET: u8 = 0xD4;
    /// Rewrite target for `local.tee` with `local_offset < 128`.
    pub const LOCAL_TEE: u8 = 0xD5;
    /// Rewrite target for `drop` when the popped value is 64-bit wide.
    pub const DROP_64: u8 = 0xD6;
    /// Rewrite target for `select` when the selected value is 64-bit wide.
    pub const SELECT_64: u8 = 0xD7;
    /// Rewrite target for `global.get` when the global is 64-bit wide.
    pub const GLOBAL_GET_64: u8 = 0xD8;
    /// Rewrite target for `global.set` when the global is 64-bit wide.
    pub const GLOBAL_SET_64: u8 = 0xD9;
}

/// Natural alignment exponent (log2 of the access size in bytes) for every
/// memory load/store opcode. `None` for opcodes that are not memory
/// accesses. Used by the validator's alignment-ceiling check (spec §4.4).
pub fn natural_alignment(opcode: u8) -> Option<u32> {
    use op::*;
    Some(match opcode {
        I32_LOAD | I32_STORE | F32_LOAD | F32_STORE => 2,
        I64_LOAD | I64_STORE | F64_LOAD | F64_STORE => 3,
        I32_LOAD8_S | I32_LOAD8_U | I32_STORE8 | I64_LOAD8_S | I64_LOAD8_U | I64_STORE8 => 0,
        I32_LOAD16_S | I32_LOAD16_U | I32_STORE16 | I64_LOAD16_S | I64_LOAD16_U | I64_STORE16 => 1,
        I64_LOAD32_S | I64_LOAD32_U | I64_STORE32 => 2,
        _ => return None,
    })
}
