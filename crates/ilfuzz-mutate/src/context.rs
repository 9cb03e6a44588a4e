//! The environment a mutator runs inside: the type environment, the
//! generator registry (for `CodeGenMutator`), and a way to pull another
//! program out of the corpus (for `SpliceMutator`/`CombineMutator`/
//! `ConcatMutator`).
//!
//! `ilfuzz-mutate` depends only on `ilfuzz-il`/`ilfuzz-builder`, not on
//! `ilfuzz-corpus`; `CorpusSource` is the seam the corpus crate implements
//! against so no cyclic crate dependency is needed (spec §9 "Cyclic module
//! references" applied to the crate graph itself).

use rand::RngCore;
use rustc_hash::FxHashSet;

use ilfuzz_builder::GeneratorRegistry;
use ilfuzz_il::{Environment, Program};

/// Supplies a second program to mutators that need one to combine/splice
/// with. Implemented by `ilfuzz-corpus::Corpus`.
pub trait CorpusSource {
    fn random_program(&self, rng: &mut dyn RngCore) -> Option<&Program>;
}

/// A trivial `CorpusSource` over a fixed slice, useful for tests and for
/// `MutationEngine` callers that have already sampled their own sources.
impl CorpusSource for [Program] {
    fn random_program(&self, rng: &mut dyn RngCore) -> Option<&Program> {
        if self.is_empty() {
            return None;
        }
        use rand::Rng;
        let idx = rng.gen_range(0..self.len());
        self.get(idx)
    }
}

pub struct MutationContext<'a> {
    pub env: &'a Environment,
    pub generators: &'a GeneratorRegistry,
    pub corpus: &'a dyn CorpusSource,
    /// Instruction indices whose guard was observed to fire during the
    /// parent program's last execution, if the caller (the owning fuzz
    /// engine, which alone has runtime feedback) has that information.
    /// `FixupMutator` is a no-op without it.
    pub guard_firings: Option<&'a FxHashSet<usize>>,
}

impl<'a> MutationContext<'a> {
    pub fn new(env: &'a Environment, generators: &'a GeneratorRegistry, corpus: &'a dyn CorpusSource) -> Self {
        Self {
            env,
            generators,
            corpus,
            guard_firings: None,
        }
    }

    pub fn with_guard_firings(mut self, firings: &'a FxHashSet<usize>) -> Self {
        self.guard_firings = Some(firings);
        self
    }
}
