//! Per-engine running counters, threaded through by value like
//! `ilfuzz_mutate::MutatorStats` rather than kept as global state (spec §9
//! "Global mutable state").

use crate::executor::{ExecutionOutcome, ExecutionResult};

#[derive(Debug, Default, Clone, Copy)]
pub struct EngineStats {
    pub executions: u64,
    pub crashes: u64,
    pub new_coverage: u64,
    pub timeouts: u64,
    pub runtime_errors: u64,
}

impl EngineStats {
    pub fn record(&mut self, result: &ExecutionResult) {
        self.executions += 1;
        if result.new_coverage {
            self.new_coverage += 1;
        }
        match &result.outcome {
            ExecutionOutcome::Crash { .. } => self.crashes += 1,
            ExecutionOutcome::Timeout => self.timeouts += 1,
            ExecutionOutcome::RuntimeError(_) => self.runtime_errors += 1,
            ExecutionOutcome::Success => {}
        }
    }

    pub fn merge(&mut self, other: EngineStats) {
        self.executions += other.executions;
        self.crashes += other.crashes;
        self.new_coverage += other.new_coverage;
        self.timeouts += other.timeouts;
        self.runtime_errors += other.runtime_errors;
    }
}
