//! Builder errors.
//!
//! Per spec §4.2 "Failure semantics", most requests degrade gracefully
//! (`jsAnything` fallback, silently-skipped splice) rather than erroring.
//! `BuilderError` exists for the minority of callers that opt into strict
//! checking (tests, `append` in strict mode) where silent degradation would
//! hide a real generator bug.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("IL invariant violated while appending: {0}")]
    Invalid(#[from] ilfuzz_il::ILError),

    #[error("operation requires context {required:?} but builder is at {available:?}")]
    ContextViolation {
        required: ilfuzz_il::Context,
        available: ilfuzz_il::Context,
    },

    #[error("operation expects {expected} inputs, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("no open block to close")]
    NoOpenBlock,

    #[error("finalize called with {0} unclosed block(s)")]
    UnclosedBlocks(usize),

    #[error("no template registered at index {0}")]
    TemplateNotFound(usize),
}

pub type Result<T> = std::result::Result<T, BuilderError>;
