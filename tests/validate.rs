//! End-to-end tests against the public API: every concrete scenario from
//! spec §8, plus its boundary properties.

use wazm::{load_and_validate, Config, LoaderError};

fn load(bytes: &[u8]) -> Result<wazm::Module, LoaderError> {
    load_and_validate(bytes, Config::default())
}

/// Scenario 1: the empty module.
#[test]
fn empty_module_accepted_with_zero_counts() {
    let bytes = [0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];
    let module = load(&bytes).unwrap();
    assert_eq!(module.total_functions(), 0);
    assert_eq!(module.total_tables(), 0);
    assert_eq!(module.total_memories(), 0);
    assert_eq!(module.total_globals(), 0);
    assert!(module.code.is_empty());
}

#[test]
fn rejects_bad_magic() {
    assert_eq!(load(b"not-a-wasm-file!").unwrap_err(), LoaderError::MagicHeaderNotDetected);
}

#[test]
fn rejects_unknown_version() {
    let bytes = [0x00, 0x61, 0x73, 0x6D, 0x02, 0x00, 0x00, 0x00];
    assert_eq!(load(&bytes).unwrap_err(), LoaderError::UnknownBinaryVersion(2));
}

/// Scenario 2: `(i32, i32) -> i32` body `local.get 0; local.get 1; i32.add;
/// end`, hand-assembled so the fast-path rewrite offsets can be checked
/// exactly.
#[test]
fn add_function_gets_fastpath_rewrite_and_correct_stack_height() {
    #[rustfmt::skip]
    let bytes: [u8; 8 + 9 + 4 + 11] = [
        // magic + version
        0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00,
        // type section: [(i32, i32) -> i32]
        0x01, 0x07, 0x01, 0x60, 0x02, 0x7F, 0x7F, 0x01, 0x7F,
        // function section: [type 0]
        0x03, 0x02, 0x01, 0x00,
        // code section: one body, no locals, local.get 0; local.get 1; i32.add; end
        0x0A, 0x09, 0x01, 0x07, 0x00, 0x20, 0x00, 0x20, 0x01, 0x6A, 0x0B,
    ];
    let module = load(&bytes).unwrap();
    assert_eq!(module.total_functions(), 1);
    let func = &module.code[0];
    assert!(func.branch_table.is_empty());
    assert_eq!(func.max_stack_cell_num, 2);

    // local.get 0 at [0,1] -> fast-path get_local (0xD3), offset 0, not 64-bit.
    const FASTPATH_LOCAL_GET: u8 = 0xD3;
    assert_eq!(func.code[0], FASTPATH_LOCAL_GET);
    assert_eq!(func.code[1], 0x00);
    // local.get 1 at [2,3] -> fast-path get_local, offset 1.
    assert_eq!(func.code[2], FASTPATH_LOCAL_GET);
    assert_eq!(func.code[3], 0x01);
    // i32.add and end are untouched.
    assert_eq!(func.code[4], 0x6A);
    assert_eq!(func.code[5], 0x0B);
}

/// Scenario 3: a forward `br` out of a `block (result i32)`, hand-assembled
/// to check the branch table precisely.
#[test]
fn forward_branch_is_patched_to_block_end() {
    #[rustfmt::skip]
    let bytes: [u8; 33] = [
        0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00,
        // type section: [() -> ()]
        0x01, 0x04, 0x01, 0x60, 0x00, 0x00,
        0x03, 0x02, 0x01, 0x00,
        // code: block (result i32); i32.const 7; br 0; i32.const 8; end; end
        0x0A, 0x0D, 0x01, 0x0B, 0x00,
        0x02, 0x7F, // block (result i32)
        0x41, 0x07, // i32.const 7
        0x0C, 0x00, // br 0
        0x41, 0x08, // i32.const 8
        0x0B,       // end (block)
        0x0B,       // end (function)
    ];
    let module = load(&bytes).unwrap();
    let func = &module.code[0];
    assert_eq!(func.branch_table.len(), 1);
    let entry = func.branch_table[0];
    // Position of the block's `end` byte within the function's code.
    let block_end_pos = func.code.iter().enumerate().rev().nth(1).unwrap().0 as u32;
    assert_eq!(entry.target_ip, block_end_pos);
    assert_eq!(entry.pop, 1);
    assert_eq!(entry.push, 1);
}

/// Scenario 4: `i32.const 1; i64.add; end` is rejected.
#[test]
fn operand_type_mismatch_is_rejected() {
    let bytes = wat::parse_str("(module (func (i32.const 1) (i64.add) (drop)))").unwrap();
    assert!(matches!(load(&bytes), Err(LoaderError::TypeMismatch(_))));
}

/// Scenario 5: `(result i32) if ... end` without an `else` is rejected.
#[test]
fn if_without_else_with_mismatched_types_is_rejected() {
    let bytes = wat::parse_str(
        "(module (func (result i32) (i32.const 1) (if (result i32) (then (i32.const 2)))))",
    )
    .unwrap();
    assert_eq!(load(&bytes).unwrap_err(), LoaderError::ElseBranchMissing);
}

/// An `if` whose param types equal its result types validates without an
/// `else` (the general rule scenario 5 is a specific instance of).
#[test]
fn if_without_else_with_matching_param_and_result_types_validates() {
    let bytes = wat::parse_str(
        "(module
           (type (func (param i32) (result i32)))
           (func (result i32)
             (i32.const 1) (i32.const 2)
             (if (type 0) (then))))",
    )
    .unwrap();
    load(&bytes).unwrap();
}

/// Scenario 6: a `br` inside a `loop` targets the loop header, and its
/// pop/push reflect the loop's *param* count, not its result count.
#[test]
fn loop_branch_targets_header_with_param_cells() {
    #[rustfmt::skip]
    let bytes: [u8; 33] = [
        0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00,
        // type section: [(i32) -> i32]  (shared by the function and the loop)
        0x01, 0x06, 0x01, 0x60, 0x01, 0x7F, 0x01, 0x7F,
        0x03, 0x02, 0x01, 0x00,
        // code: local.get 0; loop (type 0); br 0; end; end
        0x0A, 0x0B, 0x01, 0x09, 0x00,
        0x20, 0x00, // local.get 0 — supplies the loop's param
        0x03, 0x00, // loop (type 0)
        0x0C, 0x00, // br 0
        0x0B,       // end (loop)
        0x0B,       // end (function)
    ];
    let module = load(&bytes).unwrap();
    let func = &module.code[0];
    assert_eq!(func.branch_table.len(), 1);
    let entry = func.branch_table[0];
    // `loop`'s start_addr is the byte right after its blocktype immediate.
    let loop_start = 4u32;
    assert_eq!(entry.target_ip, loop_start);
    assert_eq!(entry.pop, 1);
    assert_eq!(entry.push, 1);
}

/// `n` pushes with nothing popped in between, so the high-water mark reaches
/// exactly `n` cells, followed by `n` drops so the function's own type can
/// stay `() -> ()`.
fn push_n_then_drop_all(n: usize) -> String {
    let mut body = String::with_capacity(n * 30);
    for _ in 0..n {
        body.push_str("(i32.const 0) ");
    }
    for _ in 0..n {
        body.push_str("(drop) ");
    }
    format!("(module (func {body}))")
}

/// Boundary: exactly 65,535 cells validates.
#[test]
fn stack_depth_boundary_passes_at_65535() {
    let bytes = wat::parse_str(&push_n_then_drop_all(65_535)).unwrap();
    let module = load(&bytes).unwrap();
    assert_eq!(module.code[0].max_stack_cell_num, 65_535);
}

/// Boundary: one cell past the limit is rejected.
#[test]
fn stack_depth_boundary_fails_at_65536() {
    let bytes = wat::parse_str(&push_n_then_drop_all(65_536)).unwrap();
    assert_eq!(load(&bytes).unwrap_err(), LoaderError::StackDepthLimitExceeded);
}
