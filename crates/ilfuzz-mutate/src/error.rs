//! Mutator errors.
//!
//! Mutators are expected to degrade to `None` on any failure (spec §4.4);
//! this error type exists only so the handful of fallible internal steps
//! (re-finalizing a rewritten program) have something concrete to convert
//! from with `?`, before the outer `Mutator::mutate` call collapses it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MutateError {
    #[error(transparent)]
    Il(#[from] ilfuzz_il::ILError),

    #[error(transparent)]
    Builder(#[from] ilfuzz_builder::BuilderError),

    #[error("mutation found no eligible site")]
    NoEligibleSite,

    #[error("no corpus source program was available to combine/splice with")]
    NoSource,
}

pub type Result<T> = std::result::Result<T, MutateError>;
