//! The weighted, aging corpus (spec §4.8).
//!
//! `random_for_mutating`/`pick_parent` pick by weight; `insert` rejects
//! structural duplicates and anything the caller didn't mark interesting;
//! an optional cap evicts the least-recently-selected entry to make room.

use rand::{Rng, RngCore};
use rustc_hash::FxHashSet;

use ilfuzz_engine::{EngineCorpus, ExecutionResult};
use ilfuzz_il::{Fingerprint, Program};
use ilfuzz_mutate::CorpusSource;

use crate::entry::CorpusEntry;
use crate::stats::CorpusStats;

/// Tunables for the weight function (spec §4.8 "function of size, number
/// of times selected, recency").
#[derive(Debug, Clone, Copy)]
pub struct WeightParams {
    /// Larger penalizes big programs more steeply.
    pub size_penalty: f64,
    /// Larger ages a frequently-selected entry down faster.
    pub aging_rate: f64,
    /// Extra multiplier applied to entries selected zero times, decaying
    /// linearly to 1.0 over `recency_window` ticks since insertion.
    pub recency_boost: f64,
    pub recency_window: u64,
}

impl Default for WeightParams {
    fn default() -> Self {
        Self {
            size_penalty: 0.05,
            aging_rate: 0.1,
            recency_boost: 3.0,
            recency_window: 200,
        }
    }
}

pub struct Corpus {
    entries: Vec<CorpusEntry>,
    fingerprints: FxHashSet<Fingerprint>,
    tick: u64,
    cap: Option<usize>,
    weights: WeightParams,
    stats: CorpusStats,
}

impl Corpus {
    pub fn new(cap: Option<usize>) -> Self {
        Self {
            entries: Vec::new(),
            fingerprints: FxHashSet::default(),
            tick: 0,
            cap,
            weights: WeightParams::default(),
            stats: CorpusStats::default(),
        }
    }

    pub fn with_weight_params(mut self, params: WeightParams) -> Self {
        self.weights = params;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CorpusStats {
        self.stats
    }

    pub fn contains(&self, fingerprint: Fingerprint) -> bool {
        self.fingerprints.contains(&fingerprint)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CorpusEntry> {
        self.entries.iter()
    }

    fn weight_of(&self, entry: &CorpusEntry) -> f64 {
        let size_factor = 1.0 / (1.0 + entry.program.size() as f64 * self.weights.size_penalty);
        let age_factor = 1.0 / (1.0 + entry.selected_count as f64 * self.weights.aging_rate);
        let age_since_insert = self.tick.saturating_sub(entry.inserted_at_tick);
        let recency = if entry.selected_count == 0 && age_since_insert < self.weights.recency_window {
            let t = age_since_insert as f64 / self.weights.recency_window as f64;
            self.weights.recency_boost * (1.0 - t) + t
        } else {
            1.0
        };
        (size_factor * age_factor * recency).max(f64::MIN_POSITIVE)
    }

    /// Weighted sample returning the entry's index; weights are recomputed
    /// on every call rather than cached (spec §5 "sampling weights are
    /// recomputed lazily").
    fn sample_index(&self, rng: &mut dyn RngCore) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        let total: f64 = self.entries.iter().map(|e| self.weight_of(e)).sum();
        if total <= 0.0 {
            return Some(rng.gen_range(0..self.entries.len()));
        }
        let mut pick = rng.gen_range(0.0..total);
        for (i, entry) in self.entries.iter().enumerate() {
            let w = self.weight_of(entry);
            if pick < w {
                return Some(i);
            }
            pick -= w;
        }
        Some(self.entries.len() - 1)
    }

    /// Weighted sample of a program to mutate/splice/combine with (spec
    /// §4.8 "`random_for_mutating()`"). Bumps the entry's selection
    /// bookkeeping.
    pub fn random_for_mutating(&mut self, rng: &mut dyn RngCore) -> Option<Program> {
        self.tick += 1;
        let index = self.sample_index(rng)?;
        self.stats.selections += 1;
        let tick = self.tick;
        let entry = &mut self.entries[index];
        entry.selected_count += 1;
        entry.last_selected_tick = tick;
        Some(entry.program.clone())
    }

    /// Only interesting, already-minimized programs should reach this call
    /// (spec §4.8 "Insertion"). Structural duplicates are rejected; when a
    /// cap is set and full, the least-recently-selected entry is evicted
    /// first.
    pub fn insert(&mut self, program: Program, deterministic: bool) -> bool {
        let fingerprint = program.fingerprint();
        if self.fingerprints.contains(&fingerprint) {
            self.stats.rejected_duplicate += 1;
            return false;
        }

        if let Some(cap) = self.cap {
            if self.entries.len() >= cap {
                self.evict_one();
            }
        }

        self.tick += 1;
        self.fingerprints.insert(fingerprint);
        self.entries.push(CorpusEntry::new(program, self.tick, deterministic));
        self.stats.inserted += 1;
        true
    }

    fn evict_one(&mut self) {
        let Some((index, _)) = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.last_selected_tick)
        else {
            return;
        };
        let removed = self.entries.remove(index);
        self.fingerprints.remove(&removed.fingerprint);
        self.stats.evicted += 1;
        tracing::debug!(fingerprint = ?removed.fingerprint, "evicted corpus entry (cap reached)");
    }

    /// Swaps the most recently inserted entry's program for `program`,
    /// called once minimization and the deterministic-samples check finish
    /// running against the executor (spec §4.9, SPEC_FULL §6) — work that
    /// needs an executor the plain `EngineCorpus::record_result` seam
    /// doesn't have access to, so `ilfuzz-core` does it as a follow-up step
    /// right after `insert` instead. No-op on an empty corpus.
    pub fn replace_last(&mut self, program: Program, deterministic: bool) -> Option<&CorpusEntry> {
        let last = self.entries.last_mut()?;
        self.fingerprints.remove(&last.fingerprint);
        let fingerprint = program.fingerprint();
        last.program = program;
        last.fingerprint = fingerprint;
        last.deterministic = deterministic;
        self.fingerprints.insert(fingerprint);
        self.entries.last()
    }

    /// Restores entries loaded from disk (spec §4.8 "Persistence... corpus
    /// reload on startup"), preserving their selection/insertion ticks and
    /// advancing the corpus's own clock past the highest one seen so the
    /// recency boost does not re-trigger for old entries.
    pub fn restore(&mut self, entries: Vec<CorpusEntry>) {
        for entry in entries {
            self.tick = self.tick.max(entry.inserted_at_tick).max(entry.last_selected_tick);
            self.fingerprints.insert(entry.fingerprint);
            self.entries.push(entry);
        }
    }
}

impl Default for Corpus {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CorpusSource for Corpus {
    fn random_program(&self, rng: &mut dyn RngCore) -> Option<&Program> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = rng.gen_range(0..self.entries.len());
        self.entries.get(idx).map(|e| &e.program)
    }
}

impl EngineCorpus for Corpus {
    fn pick_parent(&self, rng: &mut dyn RngCore) -> Option<Program> {
        // Same weighting as `random_for_mutating`, but `EngineCorpus` only
        // gives us `&self` here, so the selection-count/last-selected-tick
        // bookkeeping isn't bumped on this path; callers that want that
        // bookkeeping use `random_for_mutating` directly.
        self.sample_index(rng).map(|i| self.entries[i].program.clone())
    }

    fn record_result(&mut self, program: Program, result: &ExecutionResult) {
        if result.new_coverage {
            self.insert(program, true);
        }
    }

    fn as_corpus_source(&self) -> &dyn CorpusSource {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ilfuzz_builder::{BuildMethod, GeneratorRegistry, ProgramBuilder};
    use ilfuzz_il::{Environment, MinimalProfile};
    use rand::SeedableRng;

    fn env() -> Environment {
        let mut env = Environment::new();
        env.apply(&MinimalProfile);
        env
    }

    fn make_program(env: &Environment, seed: u64) -> Program {
        let generators = GeneratorRegistry::default_pool();
        let mut builder = ProgramBuilder::new(env);
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        builder.build_prefix(4, &mut rng);
        builder.build(8, BuildMethod::Generating, &generators, &mut rng);
        builder.finalize().unwrap()
    }

    #[test]
    fn duplicate_fingerprints_are_rejected() {
        let env = env();
        let program = make_program(&env, 1);
        let mut corpus = Corpus::new(None);
        assert!(corpus.insert(program.clone(), true));
        assert!(!corpus.insert(program, true));
        assert_eq!(corpus.stats().rejected_duplicate, 1);
        assert_eq!(corpus.len(), 1);
    }

    #[test]
    fn cap_evicts_least_recently_selected() {
        let env = env();
        let mut corpus = Corpus::new(Some(2));
        let a = make_program(&env, 1);
        let b = make_program(&env, 2);
        let c = make_program(&env, 3);
        corpus.insert(a, true);
        corpus.insert(b, true);
        assert_eq!(corpus.len(), 2);
        corpus.insert(c, true);
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.stats().evicted, 1);
    }

    #[test]
    fn random_for_mutating_returns_none_on_empty_corpus() {
        let mut corpus = Corpus::new(None);
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        assert!(corpus.random_for_mutating(&mut rng).is_none());
    }

    #[test]
    fn replace_last_updates_fingerprint_and_flag() {
        let env = env();
        let mut corpus = Corpus::new(None);
        corpus.insert(make_program(&env, 1), false);
        let minimized = make_program(&env, 1);
        let minimized_fingerprint = minimized.fingerprint();
        corpus.replace_last(minimized, true);
        let entry = corpus.entries().next().unwrap();
        assert!(entry.deterministic);
        assert_eq!(entry.fingerprint, minimized_fingerprint);
        assert!(corpus.contains(minimized_fingerprint));
    }

    #[test]
    fn random_for_mutating_bumps_selection_bookkeeping() {
        let env = env();
        let mut corpus = Corpus::new(None);
        corpus.insert(make_program(&env, 7), true);
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let picked = corpus.random_for_mutating(&mut rng);
        assert!(picked.is_some());
        assert_eq!(corpus.entries().next().unwrap().selected_count, 1);
    }
}
