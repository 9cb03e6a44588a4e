//! Executor pool (spec §4.6 "Pool"): `J` independent REPRL children, a
//! coverage bitmap per slot, and respawn-on-crash/timeout handling. Wires
//! into `ilfuzz_engine::Executor` so `FuzzEngine`s never see a raw child.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashSet;

use ilfuzz_engine::{ExecutionOutcome, ExecutionResult, Executor};
use ilfuzz_il::Program;

use crate::bitmap::CoverageBitmap;
use crate::child::{ExecStatus, ReprlChild};
use crate::error::Result;
use crate::evaluator::CoverageEvaluator;
use crate::lifter::Lifter;

/// Grace period after a soft reset (`SIGUSR1`) before the pool gives up and
/// kills the child outright (spec §4.6 "Timeout").
const RESET_GRACE: Duration = Duration::from_millis(250);

struct Slot {
    child: ReprlChild,
    bitmap: CoverageBitmap,
}

impl Slot {
    fn spawn(engine_path: &PathBuf, engine_args: &[String], host_pid: u32, index: usize) -> Result<Self> {
        let bitmap = CoverageBitmap::create(host_pid, index)?;
        let child = ReprlChild::spawn(engine_path, engine_args, bitmap.name())?;
        Ok(Self { child, bitmap })
    }
}

/// `J` child processes dispatched round-robin, each with its own coverage
/// shared-memory mapping. Parallelism across cores is achieved by running
/// `J` independent fuzzer processes, not by this pool itself (spec §5); a
/// single pool here still benefits from overlapping I/O wait time across
/// slots when driven from an event loop, but the `Executor` trait's
/// synchronous signature means each `execute` call blocks on one slot.
pub struct ReprlExecutorPool {
    engine_path: PathBuf,
    engine_args: Vec<String>,
    slots: Vec<Slot>,
    next_slot: usize,
    evaluator: CoverageEvaluator,
    lifter: Arc<dyn Lifter>,
    timeout_grace: Duration,
}

impl ReprlExecutorPool {
    /// Spawns `jobs` children, failing fast if the engine binary cannot be
    /// spawned at all (spec §6 exit code 2 "engine spawn failure").
    pub fn new(engine_path: PathBuf, engine_args: Vec<String>, jobs: usize, lifter: Arc<dyn Lifter>) -> Result<Self> {
        let host_pid = std::process::id();
        let mut slots = Vec::with_capacity(jobs.max(1));
        for i in 0..jobs.max(1) {
            slots.push(Slot::spawn(&engine_path, &engine_args, host_pid, i)?);
        }
        Ok(Self {
            engine_path,
            engine_args,
            slots,
            next_slot: 0,
            evaluator: CoverageEvaluator::new(),
            lifter,
            timeout_grace: RESET_GRACE,
        })
    }

    pub fn job_count(&self) -> usize {
        self.slots.len()
    }

    pub fn coverage_edges_found(&self) -> u64 {
        self.evaluator.total_edges_found()
    }

    /// Runs `program` and returns the raw set of covered edge indices,
    /// bypassing the evaluator's virgin-bits diffing. The minimizer's
    /// `CoverageOracle` seam (spec §4.9) asks "does this candidate still
    /// cover edge set E", not "is this new against the global map" — the
    /// latter would always read as empty for an already-seen program.
    pub fn covered_edges(&mut self, program: &Program, timeout: Duration) -> FxHashSet<u32> {
        let index = self.next_slot;
        self.next_slot = (self.next_slot + 1) % self.slots.len().max(1);

        let script = self.lifter.lift(program);
        if self.slots[index].child.send_exec(script.as_bytes()).is_err() {
            tracing::warn!(slot = index, "failed to write to REPRL child during minimization, respawning");
            self.respawn(index);
            return FxHashSet::default();
        }

        let ready = self.slots[index].child.wait_readable(timeout).unwrap_or(false);
        if !ready {
            self.slots[index].child.soft_reset();
            let recovered = self.slots[index].child.wait_readable(self.timeout_grace).unwrap_or(false);
            if !recovered {
                self.slots[index].child.kill();
                self.respawn(index);
            }
            return FxHashSet::default();
        }

        let _ = self.slots[index].child.recv_status();
        self.slots[index]
            .bitmap
            .edges()
            .iter()
            .enumerate()
            .filter(|(_, &byte)| byte != 0)
            .map(|(i, _)| i as u32)
            .collect()
    }

    fn respawn(&mut self, index: usize) {
        match Slot::spawn(&self.engine_path, &self.engine_args, std::process::id(), index) {
            Ok(slot) => {
                tracing::info!(slot = index, "respawned REPRL child");
                self.slots[index] = slot;
            }
            Err(err) => {
                tracing::error!(slot = index, error = %err, "failed to respawn REPRL child");
            }
        }
    }

    /// Called once `wait_readable` has already confirmed the status word is
    /// available, so `recv_status` here does not block.
    fn run_one(&mut self, index: usize) -> ExecutionResult {
        let status = {
            let slot = &mut self.slots[index];
            slot.child.recv_status().ok()
        };

        let Some(status) = status else {
            tracing::warn!(slot = index, "REPRL child died mid-execution, respawning");
            self.respawn(index);
            return ExecutionResult {
                outcome: ExecutionOutcome::Crash {
                    signal: 0,
                    description: "child closed its pipes unexpectedly".into(),
                },
                new_coverage: false,
                guard_firings: FxHashSet::default(),
            };
        };

        let outcome = match status {
            ExecStatus::Exited(0) => ExecutionOutcome::Success,
            ExecStatus::Exited(code) => ExecutionOutcome::RuntimeError(format!("exited with code {code}")),
            ExecStatus::Signaled(signal) => ExecutionOutcome::Crash {
                signal,
                description: format!("terminated by signal {signal}"),
            },
        };

        let diff = {
            let slot = &self.slots[index];
            self.evaluator.diff(slot.bitmap.edges())
        };

        ExecutionResult {
            outcome,
            new_coverage: diff.is_interesting,
            // The REPRL wire protocol (spec §4.6) carries only the status
            // word and the coverage bitmap; there is no per-guard feedback
            // channel, so `FixupMutator` only has something to act on when
            // a richer executor (e.g. one that also parses stderr for a
            // probe/exploration marker) supplies `guard_firings` itself.
            guard_firings: FxHashSet::default(),
        }
    }
}

impl Executor for ReprlExecutorPool {
    fn execute(&mut self, program: &Program, timeout: Duration) -> ExecutionResult {
        let index = self.next_slot;
        self.next_slot = (self.next_slot + 1) % self.slots.len().max(1);

        let script = self.lifter.lift(program);

        let wrote = self.slots[index].child.send_exec(script.as_bytes());
        if wrote.is_err() {
            tracing::warn!(slot = index, "failed to write to REPRL child, respawning");
            self.respawn(index);
            return ExecutionResult::default();
        }

        let ready = self.slots[index].child.wait_readable(timeout).unwrap_or(false);
        if !ready {
            tracing::warn!(slot = index, ?timeout, "REPRL execution timed out, resetting child");
            self.slots[index].child.soft_reset();
            let recovered = self.slots[index].child.wait_readable(self.timeout_grace).unwrap_or(false);
            if !recovered {
                self.slots[index].child.kill();
                self.respawn(index);
            } else {
                // The child honored the reset and eventually produced a
                // status anyway; drain it so the next `execute` call on
                // this slot starts from a clean control pipe.
                let _ = self.slots[index].child.recv_status();
            }
            return ExecutionResult {
                outcome: ExecutionOutcome::Timeout,
                new_coverage: false,
                guard_firings: FxHashSet::default(),
            };
        }

        self.run_one(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_advances_through_all_slots() {
        // Exercised indirectly via the public `execute` path in integration
        // tests against a real engine binary; this unit test only checks
        // the counter arithmetic used to pick a slot.
        let mut next = 0usize;
        let len = 3usize;
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(next);
            next = (next + 1) % len;
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2]);
    }
}
