//! Instantiation-layer tests (spec §4.5): global initializer evaluation and
//! the `memory.grow`-free page-size collapse.

use wazm::{instantiate, load_and_validate, Config};

fn load(bytes: &[u8]) -> wazm::Module {
    load_and_validate(bytes, Config::default()).unwrap()
}

#[test]
fn literal_global_initializer_is_written_into_global_data() {
    let bytes = wat::parse_str("(module (global i32 (i32.const 42)))").unwrap();
    let module = load(&bytes);
    let instance = instantiate(&module).unwrap();
    assert_eq!(instance.globals.len(), 1);
    let g = instance.globals[0];
    let bytes = &instance.global_data[g.data_offset as usize..g.data_offset as usize + 4];
    assert_eq!(i32::from_le_bytes(bytes.try_into().unwrap()), 42);
}

#[test]
fn global_get_initializer_copies_the_referenced_globals_bytes() {
    let bytes = wat::parse_str(
        "(module
           (global i32 (i32.const 7))
           (global i32 (global.get 0)))",
    )
    .unwrap();
    let module = load(&bytes);
    let instance = instantiate(&module).unwrap();
    let first = instance.globals[0];
    let second = instance.globals[1];
    let read = |g: wazm::InstanceGlobal| {
        let range = g.data_offset as usize..g.data_offset as usize + 4;
        i32::from_le_bytes(instance.global_data[range].try_into().unwrap())
    };
    assert_eq!(read(first), 7);
    assert_eq!(read(second), 7);
}

#[test]
fn forward_global_reference_is_rejected_at_load_time() {
    // Global 0's initializer refers to global 1, which hasn't been defined
    // yet at that point in the index space.
    #[rustfmt::skip]
    let bytes: [u8; 21] = [
        0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00,
        // global section: two i32 immutable globals, global 0 = global.get 1
        0x06, 0x0B, 0x02,
        0x7F, 0x00, 0x23, 0x01, 0x0B, // global 0: i32, global.get 1, end
        0x7F, 0x00, 0x41, 0x00, 0x0B, // global 1: i32, i32.const 0, end
    ];
    assert!(matches!(load_and_validate(&bytes, Config::default()), Err(wazm::LoaderError::UnknownIndex { .. })));
}

/// Boundary: with no `memory.grow` anywhere in the module, a 3-page memory
/// collapses into a single `3 * 64KiB` virtual page.
#[test]
fn memory_without_grow_collapses_to_one_page() {
    let bytes = wat::parse_str("(module (memory 3))").unwrap();
    let module = load(&bytes);
    assert!(!module.possibly_grows_memory);
    let instance = instantiate(&module).unwrap();
    let mem = instance.memories[0];
    assert_eq!(mem.bytes_per_page, 3 * 64 * 1024);
    assert_eq!(mem.min_pages, 1);
    assert_eq!(mem.max_pages, 1);
}

/// A zero-minimum memory stays zero-sized even under the collapse.
#[test]
fn zero_sized_memory_without_grow_stays_empty() {
    let bytes = wat::parse_str("(module (memory 0))").unwrap();
    let module = load(&bytes);
    let instance = instantiate(&module).unwrap();
    let mem = instance.memories[0];
    assert_eq!(mem.min_pages, 0);
    assert_eq!(mem.max_pages, 0);
}

/// Any `memory.grow` anywhere in the module disables the collapse for every
/// memory, even ones a particular function never touches.
#[test]
fn memory_grow_anywhere_disables_the_collapse() {
    let bytes = wat::parse_str(
        "(module (memory 1) (func (drop (memory.grow (i32.const 1)))))",
    )
    .unwrap();
    let module = load(&bytes);
    assert!(module.possibly_grows_memory);
    let instance = instantiate(&module).unwrap();
    let mem = instance.memories[0];
    assert_eq!(mem.bytes_per_page, 64 * 1024);
    assert_eq!(mem.min_pages, 1);
    assert_eq!(mem.max_pages, 1);
}
