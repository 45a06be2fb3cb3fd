//! `wazm` — the loader, validator and instantiator core of a WebAssembly
//! execution runtime.
//!
//! This crate turns a binary Wasm module into a [`Module`] ready for an
//! execution engine to run: it parses the binary format, performs abstract
//! typed execution over every function body (rejecting anything ill-typed)
//! while emitting a branch table for structured control flow, and allocates
//! the linear memory, table and global storage an instance needs. It does
//! not execute Wasm, does not JIT, and does not resolve host imports; those
//! are an execution engine's job, built on top of what this crate returns.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std as alloc;

mod binary;
mod config;
mod error;
mod instantiate;
mod module;
mod opcode;
mod types;
mod validate;

pub use config::Config;
pub use error::{ErrorBuffer, LoaderError, LoaderResult};
pub use instantiate::{instantiate, Instance, InstanceGlobal, InstanceMemory, InstanceTable};
pub use module::{
    CustomSection, DataSegment, ElementSegment, Function, ImportCounts, Module,
};
pub use types::{
    BranchTableEntry, ConstExpr, Export, ExternalKind, FuncType, GlobalType, Import, ImportKind,
    Limits, MemoryType, SegmentMode, TableType,
};

pub use wazm_core::{CanResume, TrapCode, Value, ValueType, F32, F64};

/// Loads and validates a Wasm binary, producing a [`Module`] ready for
/// [`instantiate`]. This is the whole pipeline from spec §2 short of
/// instantiation itself: Binary Decoder, Section Dispatcher, per-section
/// loaders, and the per-function validator/branch-table emitter.
pub fn load_and_validate(bytes: &[u8], config: Config) -> LoaderResult<Module> {
    let mut module = module::load_module(bytes, config)?;
    validate::validate_module(&mut module)?;
    Ok(module)
}

impl Module {
    /// The boolean-plus-buffer front door spec §6 describes ("Validation
    /// returns a single boolean; on false, the caller inspects the
    /// buffer"): `Some` on success, `None` with `errors` holding the
    /// first-occurring failure message otherwise. Equivalent to
    /// [`load_and_validate`], reshaped for a host that wants that C-ABI
    /// calling convention instead of `Result`.
    pub fn from_bytes_checked(bytes: &[u8], config: Config, errors: &mut ErrorBuffer) -> Option<Module> {
        match load_and_validate(bytes, config) {
            Ok(module) => Some(module),
            Err(err) => {
                errors.record(&err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_magic() {
        let err = load_and_validate(b"not-wasm", Config::default()).unwrap_err();
        assert_eq!(err, LoaderError::MagicHeaderNotDetected);
    }

    #[test]
    fn accepts_empty_module() {
        let bytes = wat::parse_str("(module)").unwrap();
        let module = load_and_validate(&bytes, Config::default()).unwrap();
        assert_eq!(module.total_functions(), 0);
        assert_eq!(module.total_tables(), 0);
        assert_eq!(module.total_memories(), 0);
        assert_eq!(module.total_globals(), 0);
    }

    #[test]
    fn from_bytes_checked_reports_success_and_failure() {
        let mut errors = ErrorBuffer::new();
        let bytes = wat::parse_str("(module)").unwrap();
        assert!(Module::from_bytes_checked(&bytes, Config::default(), &mut errors).is_some());
        assert_eq!(errors.message(), None);

        let mut errors = ErrorBuffer::new();
        assert!(Module::from_bytes_checked(b"not-wasm", Config::default(), &mut errors).is_none());
        assert_eq!(errors.message(), Some("magic header not detected"));
    }
}
