//! Fuzz engines: the generation/mutation/execution loops of spec §4.5,
//! built on top of `ilfuzz-builder`'s templates/generators and
//! `ilfuzz-mutate`'s mutator pool.
//!
//! This crate defines the `Executor`/`EngineCorpus` seams rather than
//! depending on `ilfuzz-exec`/`ilfuzz-corpus` directly, the same pattern
//! `ilfuzz-mutate::CorpusSource` uses, so the crate graph stays acyclic:
//! `ilfuzz-core` is the only place that wires concrete types together.

pub mod corpus;
pub mod engines;
pub mod error;
pub mod executor;
pub mod stats;

pub use corpus::EngineCorpus;
pub use engines::{
    FuzzEngine, GenerativeEngine, HybridEngine, MultiEngine, MutationEngine,
    DEFAULT_CHAIN_LENGTH, DEFAULT_GENERATIVE_INSTRUCTIONS, DEFAULT_TIMEOUT,
};
pub use error::{EngineError, Result};
pub use executor::{ExecutionOutcome, ExecutionResult, Executor};
pub use stats::EngineStats;
