//! What a `FuzzEngine` needs from the corpus beyond `CorpusSource`'s
//! "give me a program to combine/splice with" (spec §4.8): a parent to
//! start a mutation chain from, and somewhere to report what happened so
//! weighting/eviction/crash-dedup can react. Implemented by
//! `ilfuzz-corpus::Corpus`; this crate only ever sees it through the trait,
//! the same seam `ilfuzz-mutate::CorpusSource` uses to keep the crate graph
//! acyclic.

use rand::RngCore;

use ilfuzz_il::Program;
use ilfuzz_mutate::CorpusSource;

use crate::executor::ExecutionResult;

pub trait EngineCorpus: CorpusSource {
    /// Picks a program to start a mutation chain from. `None` if the corpus
    /// has nothing yet (spec §4.8 "seeded from an initial corpus or starts
    /// empty"), in which case the caller should fall back to a generative
    /// engine instead.
    fn pick_parent(&self, rng: &mut dyn RngCore) -> Option<Program>;

    /// Reports the outcome of executing `program`, derived from some parent
    /// (by mutation or generation). The corpus decides whether to keep it,
    /// how to weight it, and whether it's a new crash.
    fn record_result(&mut self, program: Program, result: &ExecutionResult);

    /// Views `self` as a plain `CorpusSource` for `MutationContext`. Stable
    /// Rust can coerce a concrete `&T` to `&dyn CorpusSource`, but not a
    /// `&dyn EngineCorpus` to `&dyn CorpusSource` (trait object upcasting);
    /// implementors just return `self`.
    fn as_corpus_source(&self) -> &dyn CorpusSource;
}
