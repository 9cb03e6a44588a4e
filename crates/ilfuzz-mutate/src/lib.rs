//! Mutators: transformations `Program -> Option<Program>` over an existing
//! program (spec §4.4).
//!
//! Every mutator preserves the IL invariants of spec §3 or returns `None`;
//! none of them panic on a malformed parent, since a parent is by
//! construction something `ProgramBuilder::finalize` already accepted.

pub mod context;
pub mod error;
pub mod mutators;
mod replay;
pub mod registry;
pub mod stats;

pub use context::{CorpusSource, MutationContext};
pub use error::{MutateError, Result};
pub use mutators::{
    CodeGenMutator, CombineMutator, ConcatMutator, ExplorationMutator, FixupMutator, InputMutator,
    Mutator, OperationMutator, ProbeMutator, SpliceMutator,
};
pub use registry::{MutatorRegistry, DEFAULT_MAX_RETRIES};
pub use stats::MutatorStats;
