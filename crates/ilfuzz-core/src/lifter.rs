//! Re-export of the `Lifter` seam (spec §6 "Lifter trait"). Defined in
//! `ilfuzz-exec` (the structural consumer, since it must turn a `Program`
//! into source text before writing to the child's data pipe); re-exported
//! here because `ilfuzz-core` is where spec §6 says the trait lives from
//! an external-interfaces point of view.

pub use ilfuzz_exec::{DebugLifter, Lifter};
