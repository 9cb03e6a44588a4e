//! The `Program -> String` seam (spec §6 "Lifter trait").
//!
//! Defined here rather than in `ilfuzz-core` because `ReprlExecutor` is the
//! structural consumer: it must turn a `Program` into JavaScript source text
//! before it can write anything to the child's data pipe. `ilfuzz-core`
//! re-exports this trait as the crate spec §6 names, the same seam pattern
//! `ilfuzz-engine::EngineCorpus`/`ilfuzz-mutate::CorpusSource` use to keep
//! the dependency graph acyclic. Any concrete JavaScript emitter (out of
//! scope per spec §1) satisfies this signature.
use ilfuzz_il::Program;

pub trait Lifter: Send + Sync {
    fn lift(&self, program: &Program) -> String;
}

/// Minimal lifter used by this crate's own tests and by callers that have
/// not wired in a real emitter yet. Renders each instruction's mnemonic as
/// a comment line, which is enough to drive a REPRL round-trip against a
/// trivial echo engine in tests without depending on a real lifter crate.
pub struct DebugLifter;

impl Lifter for DebugLifter {
    fn lift(&self, program: &Program) -> String {
        let mut out = String::new();
        for instr in program.code().iter() {
            out.push_str("// ");
            out.push_str(instr.operation.mnemonic());
            out.push('\n');
        }
        out
    }
}
