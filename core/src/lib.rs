#![cfg_attr(not(feature = "std"), no_std)]

//! Shared value-model types used by the `wazm` loader, validator and
//! instantiator, and re-exported to downstream execution engines.
//!
//! This crate deliberately knows nothing about the binary format, module
//! structure, or validation rules; those live in the `wazm` crate. It only
//! carries the small vocabulary that both the CORE and a downstream engine
//! need to agree on: value types, NaN-preserving floats, and trap codes.

mod nan_preserving_float;
mod trap;
mod value;

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std as alloc;

pub use self::{
    nan_preserving_float::{F32, F64},
    trap::{CanResume, TrapCode},
    value::{Value, ValueType},
};
