//! Compile-time feature gates and the constants forwarded to a downstream
//! execution engine.
//!
//! Grounded in `wasmi`'s `[features]` table (proposal gates compiled in or
//! out) and, for the runtime-configurable half, the `Config` struct idiom of
//! `wasmi`'s later `crates/wasmi/src/engine/config.rs`. Spec §6 names these
//! as compile-time toggles (`ENABLE_BULK_MEMORY`, ...); `wazm` keeps the
//! opcode-acceptance gates as Cargo features (`bulk-memory`,
//! `reference-types`, `tail-call`) so a module that never needs a proposal
//! doesn't pay for validating it, and collects the remaining constants in a
//! `Config` that is recorded on the built [`crate::Module`] for the engine to
//! read back.

/// Default size, in bytes, of the Wasm-visible call stack a downstream
/// engine should reserve per instance. Forwarded, not consumed, by the CORE.
pub const DEFAULT_WASM_STACK_SIZE: u32 = 16 * 1024;

/// Capacity of the downstream engine's block-address dispatch cache.
/// Forwarded, not consumed, by the CORE.
pub const BLOCK_ADDR_CACHE_SIZE: u32 = 64;

/// Number of guard pages a downstream engine should reserve below the stack
/// for hardware stack-overflow detection. Forwarded, not consumed, by the
/// CORE.
pub const STACK_OVERFLOW_CHECK_GUARD_PAGE_COUNT: u32 = 1;

/// Runtime configuration threaded through loading, validation and
/// instantiation.
///
/// The opcode-acceptance feature gates (`bulk_memory`, `reference_types`,
/// `tail_call`) additionally require their matching Cargo feature to be
/// compiled in; `Config` can only narrow what a build supports, never widen
/// it.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    bulk_memory: bool,
    reference_types: bool,
    tail_call: bool,
    stack_hw_bound_check: bool,
    wasm_stack_size: u32,
}

impl Config {
    /// Returns `true` if bulk-memory opcodes (`memory.init`, `data.drop`,
    /// `memory.copy`, `memory.fill`) are accepted.
    pub fn bulk_memory(&self) -> bool {
        self.bulk_memory && cfg!(feature = "bulk-memory")
    }

    /// Returns `true` if reference-type opcodes (`funcref`/`externref`,
    /// `select t`, `table.get/set`, `ref.null/is_null/func`) are accepted.
    pub fn reference_types(&self) -> bool {
        self.reference_types && cfg!(feature = "reference-types")
    }

    /// Returns `true` if tail-call opcodes are accepted.
    pub fn tail_call(&self) -> bool {
        self.tail_call && cfg!(feature = "tail-call")
    }

    /// Returns `true` if the downstream engine should rely on a hardware
    /// guard page rather than a software counter to catch stack overflow.
    /// `DISABLE_STACK_HW_BOUND_CHECK` from spec §6 is this flag's negation.
    pub fn stack_hw_bound_check(&self) -> bool {
        self.stack_hw_bound_check
    }

    /// The Wasm-visible call stack size, in bytes, recommended to the
    /// downstream engine.
    pub fn wasm_stack_size(&self) -> u32 {
        self.wasm_stack_size
    }

    /// Enables or disables bulk-memory opcode acceptance.
    pub fn set_bulk_memory(&mut self, enable: bool) -> &mut Self {
        self.bulk_memory = enable;
        self
    }

    /// Enables or disables reference-type opcode acceptance.
    pub fn set_reference_types(&mut self, enable: bool) -> &mut Self {
        self.reference_types = enable;
        self
    }

    /// Enables or disables tail-call opcode acceptance.
    pub fn set_tail_call(&mut self, enable: bool) -> &mut Self {
        self.tail_call = enable;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bulk_memory: true,
            reference_types: true,
            tail_call: true,
            stack_hw_bound_check: true,
            wasm_stack_size: DEFAULT_WASM_STACK_SIZE,
        }
    }
}
