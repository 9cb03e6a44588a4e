//! IL construction and decoding errors.

use thiserror::Error;

use crate::variable::Variable;

/// Errors surfaced while building or validating [`crate::code::Code`].
///
/// Per the analyzer contract, most of these are programmer errors: the
/// builder is expected to reject them before a [`crate::analyzer::TypeAnalyzer`]
/// ever sees the resulting code. They are kept as a `Result` rather than a
/// panic so that callers in non-debug builds (mutators in particular) can
/// convert a caught violation into a `None` return instead of aborting the
/// fuzzer process.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ILError {
    #[error("variable {0:?} is used before it is defined")]
    UndefinedVariable(Variable),

    #[error("variable {0:?} is defined more than once")]
    DuplicateDefinition(Variable),

    #[error("block opened at instruction {open} is not matched by a corresponding end")]
    UnmatchedBlockStart { open: usize },

    #[error("block-end instruction {0} has no matching block-start")]
    UnmatchedBlockEnd(usize),

    #[error("instruction {index} requires context {required:?} but only {available:?} is open")]
    ContextViolation {
        index: usize,
        required: crate::operation::Context,
        available: crate::operation::Context,
    },

    #[error("instruction {index} expects {expected} inputs, got {actual}")]
    ArityMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("input {0:?} used at an instruction whose defining block has already closed")]
    OutOfScope(Variable),
}

/// Errors produced by the self-describing binary program format (§6).
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("bad magic bytes in program blob")]
    BadMagic,

    #[error("unsupported program format version: {0}")]
    UnsupportedVersion(u32),

    #[error("checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    #[error("bincode decode failure: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("decoded program failed IL validation: {0}")]
    Invalid(#[from] ILError),
}

pub type Result<T> = std::result::Result<T, ILError>;
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
