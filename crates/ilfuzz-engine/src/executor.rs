//! The seam between a fuzz engine and whatever actually runs a program.
//!
//! `ilfuzz-engine` knows nothing about REPRL, pipes, or shared-memory
//! bitmaps (that's `ilfuzz-exec`'s job, spec §4.6); it only needs a verdict
//! and enough feedback to drive `FixupMutator` and corpus weighting. This
//! mirrors the `CorpusSource` seam in `ilfuzz-mutate`: the consumer crate
//! defines the trait, the concrete subsystem crate implements it, so
//! `ilfuzz-engine` never depends on `ilfuzz-exec` (spec §9 "Cyclic module
//! references" applied to the crate graph).

use std::time::Duration;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use ilfuzz_il::Program;

/// What happened when a program was run to completion (or not).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    #[default]
    Success,
    Crash {
        signal: i32,
        description: String,
    },
    RuntimeError(String),
    Timeout,
}

/// Everything an engine needs back from one execution: the verdict, whether
/// it touched previously-unseen coverage edges, and which guarded
/// instructions actually fired (consumed by `FixupMutator`).
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub outcome: ExecutionOutcome,
    pub new_coverage: bool,
    pub guard_firings: FxHashSet<usize>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Success)
    }

    pub fn is_crash(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Crash { .. })
    }

    pub fn should_abort_chain(&self) -> bool {
        matches!(
            self.outcome,
            ExecutionOutcome::RuntimeError(_) | ExecutionOutcome::Timeout
        )
    }
}

/// Runs one program to completion (or timeout), implemented by
/// `ilfuzz-exec::ReprlExecutor` against a real child process, and by a
/// trivial stub in this crate's own tests.
pub trait Executor {
    fn execute(&mut self, program: &Program, timeout: Duration) -> ExecutionResult;
}
