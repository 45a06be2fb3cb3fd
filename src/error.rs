//! Error types for the loader, section dispatcher and validator.
//!
//! Mirrors `wasmi`'s `Error(String)` + `Display` pattern (see
//! `src/validation/mod.rs`, `src/common/stack.rs` in the teacher) rather than
//! reaching for a derive-macro error crate: this is a library boundary and
//! the teacher never pulls in one even in its later incarnations.

use alloc::string::{String, ToString};
use core::fmt::{self, Display};

/// Every error the loader or validator can produce.
///
/// Each variant corresponds to one of the kinds enumerated in the error
/// handling design: structural, index, type, encoding, resource, semantic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderError {
    /// The first four bytes were not `\0asm`.
    MagicHeaderNotDetected,
    /// The version field was not `1`.
    UnknownBinaryVersion(u32),
    /// A section's declared length did not match the bytes actually consumed.
    SectionSizeMismatch(String),
    /// The byte stream ended before a value could be fully read.
    UnexpectedEnd,
    /// A LEB128 integer used more bytes than its target width allows.
    IntegerRepresentationTooLong,
    /// A fixed reserved byte was not zero (e.g. the table index immediate of `call_indirect`).
    ZeroByteExpected,
    /// An index referred to an entity that does not exist in its namespace.
    UnknownIndex {
        /// The namespace the index was looked up in (`"function"`, `"global"`, ...).
        kind: &'static str,
        /// The offending index.
        index: u32,
    },
    /// An operand, result, or block-signature type did not match what was expected.
    TypeMismatch(String),
    /// A block's or function's final stack shape did not match its declared result types.
    StackSizeMismatch(String),
    /// An `if` without an `else` declared result types different from its parameter types.
    ElseBranchMissing,
    /// A `br_table`'s targets disagree on the result type they must supply.
    BrTableTypeMismatch,
    /// The abstract value stack grew past 65,535 cells.
    StackDepthLimitExceeded,
    /// A memory load/store declared an alignment exponent larger than natural.
    AlignmentTooLarge,
    /// `call_indirect` or a table-consuming opcode referenced a function not declared reachable.
    UndeclaredFunctionReference,
    /// An allocation for a module-owned buffer failed.
    AllocateMemoryFailed,
    /// An attempt to write to an immutable global.
    GlobalIsImmutable,
    /// `memory.init`/`data.drop` used without a preceding data-count section.
    DataCountSectionRequired,
    /// Sections appeared out of order, were duplicated, or an unknown non-custom id was used.
    MalformedSectionOrder(String),
    /// A proposal opcode was used without the corresponding feature enabled.
    FeatureDisabled(&'static str),
    /// Catch-all for structural complaints that don't need their own variant.
    Malformed(String),
}

impl LoaderError {
    pub(crate) fn type_mismatch(msg: impl Into<String>) -> Self {
        LoaderError::TypeMismatch(msg.into())
    }

    pub(crate) fn unknown(kind: &'static str, index: u32) -> Self {
        LoaderError::UnknownIndex { kind, index }
    }
}

impl Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LoaderError::MagicHeaderNotDetected => write!(f, "magic header not detected"),
            LoaderError::UnknownBinaryVersion(v) => write!(f, "unknown binary version: {v}"),
            LoaderError::SectionSizeMismatch(what) => {
                write!(f, "section size mismatch: {what}")
            }
            LoaderError::UnexpectedEnd => write!(f, "unexpected end"),
            LoaderError::IntegerRepresentationTooLong => {
                write!(f, "integer representation too long")
            }
            LoaderError::ZeroByteExpected => write!(f, "zero byte expected"),
            LoaderError::UnknownIndex { kind, index } => {
                write!(f, "unknown {kind} {index}")
            }
            LoaderError::TypeMismatch(detail) => write!(f, "type mismatch: {detail}"),
            LoaderError::StackSizeMismatch(detail) => {
                write!(f, "stack size does not match block type: {detail}")
            }
            LoaderError::ElseBranchMissing => {
                write!(f, "type mismatch: else branch missing")
            }
            LoaderError::BrTableTypeMismatch => {
                write!(f, "br_table targets must all use same result type")
            }
            LoaderError::StackDepthLimitExceeded => {
                write!(f, "operand stack depth limit exceeded")
            }
            LoaderError::AlignmentTooLarge => {
                write!(f, "alignment must not be larger than natural")
            }
            LoaderError::UndeclaredFunctionReference => {
                write!(f, "undeclared function reference")
            }
            LoaderError::AllocateMemoryFailed => write!(f, "allocate memory failed"),
            LoaderError::GlobalIsImmutable => write!(f, "global is immutable"),
            LoaderError::DataCountSectionRequired => {
                write!(f, "data count section required")
            }
            LoaderError::MalformedSectionOrder(detail) => {
                write!(f, "{detail}")
            }
            LoaderError::FeatureDisabled(feature) => {
                write!(f, "{feature} is not enabled for this module")
            }
            LoaderError::Malformed(detail) => write!(f, "{detail}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LoaderError {}

pub type LoaderResult<T> = Result<T, LoaderError>;

/// Appends the instruction position to a validation error, mirroring
/// `wasmi`'s `"At instruction {:?}(@{}): {}"` wrapping in
/// `FunctionReader::read_function_body`.
pub(crate) fn at_position(err: LoaderError, position: usize) -> LoaderError {
    LoaderError::Malformed(format!("at instruction @{position}: {err}"))
}

/// Fixed-capacity, write-once error buffer.
///
/// Re-expresses the source's per-thread last-error buffer
/// (`EXCEPTION_BUF_LEN = 128`, spec §6/§9) as an explicit context object
/// instead of thread-local state: the first error recorded wins, exactly as
/// the original single static buffer behaved, but ownership is now tied to
/// one loading/validation call instead of a thread.
pub struct ErrorBuffer {
    message: Option<String>,
}

/// Matches the C source's `EXCEPTION_BUF_LEN`. Messages longer than this are
/// truncated, matching the original buffer's behavior rather than failing
/// the (already-failed) load a second way.
pub const EXCEPTION_BUF_LEN: usize = 128;

impl ErrorBuffer {
    pub fn new() -> Self {
        ErrorBuffer { message: None }
    }

    /// Records `err` iff no error has been recorded yet. Subsequent calls
    /// are no-ops, matching "subsequent errors do not overwrite" (spec §6).
    pub fn record(&mut self, err: &LoaderError) {
        if self.message.is_some() {
            return;
        }
        let mut text = err.to_string();
        if text.len() > EXCEPTION_BUF_LEN {
            text.truncate(EXCEPTION_BUF_LEN);
        }
        self.message = Some(text);
    }

    /// The first recorded error message, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl Default for ErrorBuffer {
    fn default() -> Self {
        Self::new()
    }
}
