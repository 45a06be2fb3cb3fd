use crate::nan_preserving_float::{F32, F64};
use core::fmt::{self, Display};

/// The four numeric Wasm value types plus the two reference types.
///
/// `ValueType` is the CORE's currency for everything the validator tracks:
/// locals, operand stack entries, block signatures, global contents.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValueType {
    /// 32-bit integer.
    I32,
    /// 64-bit integer.
    I64,
    /// 32-bit IEEE 754-2008 float.
    F32,
    /// 64-bit IEEE 754-2008 float.
    F64,
    /// A nullable reference to a function.
    FuncRef,
    /// A nullable reference to a host-defined object.
    ExternRef,
    /// 128-bit vector. Accepted as a local/param/result/block type; the CORE
    /// carries it through validation but never evaluates vector constants.
    V128,
}

impl ValueType {
    /// Number of 4-byte stack cells this type occupies.
    ///
    /// `i32`/`f32`/`funcref`/`externref` occupy a single cell; `i64`/`f64`
    /// occupy two; `v128` occupies four. This is the CORE's unit of operand
    /// stack accounting, not the in-memory representation used to store
    /// values.
    pub fn cell_count(self) -> u32 {
        match self {
            ValueType::I64 | ValueType::F64 => 2,
            ValueType::V128 => 4,
            _ => 1,
        }
    }

    /// `true` for `i32`/`i64`/`f32`/`f64`.
    pub fn is_num(self) -> bool {
        matches!(
            self,
            ValueType::I32 | ValueType::I64 | ValueType::F32 | ValueType::F64
        )
    }

    /// `true` for `funcref`/`externref`.
    pub fn is_ref(self) -> bool {
        matches!(self, ValueType::FuncRef | ValueType::ExternRef)
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::I32 => write!(f, "i32"),
            Self::I64 => write!(f, "i64"),
            Self::F32 => write!(f, "f32"),
            Self::F64 => write!(f, "f64"),
            Self::FuncRef => write!(f, "funcref"),
            Self::ExternRef => write!(f, "externref"),
            Self::V128 => write!(f, "v128"),
        }
    }
}

/// A constant value as it appears in a constant expression: a global
/// initializer, or a literal produced by a validator constant-folding pass.
///
/// Unlike a full interpreter's runtime value, the CORE never computes with
/// these; it only stores them into the global data blob (§4.5) and checks
/// their type against a declared [`ValueType`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value {
    /// Value of 32-bit signed or unsigned integer.
    I32(i32),
    /// Value of 64-bit signed or unsigned integer.
    I64(i64),
    /// Value of 32-bit IEEE 754-2008 floating point number.
    F32(F32),
    /// Value of 64-bit IEEE 754-2008 floating point number.
    F64(F64),
    /// A nullable function reference, carrying the referenced function index.
    FuncRef(Option<u32>),
    /// A null external reference. The CORE never synthesizes non-null ones.
    ExternRef,
}

impl Value {
    /// Returns the [`ValueType`] of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
            Value::FuncRef(_) => ValueType::FuncRef,
            Value::ExternRef => ValueType::ExternRef,
        }
    }

    /// Encodes this value's bits into `dst`, little-endian, writing exactly
    /// `self.value_type().cell_count() * 4` bytes.
    ///
    /// Used by the instantiator (§4.5) to populate the global data blob.
    pub fn write_le(&self, dst: &mut [u8]) {
        match *self {
            Value::I32(v) => dst[..4].copy_from_slice(&v.to_le_bytes()),
            Value::I64(v) => dst[..8].copy_from_slice(&v.to_le_bytes()),
            Value::F32(v) => dst[..4].copy_from_slice(&v.to_bits().to_le_bytes()),
            Value::F64(v) => dst[..8].copy_from_slice(&v.to_bits().to_le_bytes()),
            Value::FuncRef(idx) => {
                // One cell (spec Glossary: only 64-bit numeric types get two
                // cells), stored as a function index with `u32::MAX` as the
                // null sentinel — the CORE never points a `funcref` at a
                // function index that large (spec §3 index invariants).
                let bits = idx.unwrap_or(u32::MAX);
                dst[..4].copy_from_slice(&bits.to_le_bytes());
            }
            Value::ExternRef => dst[..4].copy_from_slice(&u32::MAX.to_le_bytes()),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::I32(value) => write!(f, "{value}"),
            Self::I64(value) => write!(f, "{value}"),
            Self::F32(value) => write!(f, "{}", f32::from(*value)),
            Self::F64(value) => write!(f, "{}", f64::from(*value)),
            Self::FuncRef(Some(idx)) => write!(f, "funcref({idx})"),
            Self::FuncRef(None) => write!(f, "funcref(null)"),
            Self::ExternRef => write!(f, "externref(null)"),
        }
    }
}
