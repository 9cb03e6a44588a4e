//! `MutatorRegistry`: the weighted pool `MutationEngine` draws from, plus
//! the retry-on-failure selection policy of spec §4.4 ("if a mutator
//! declines, try another, up to a bounded number of attempts").

use rand::{Rng, RngCore};

use ilfuzz_il::Program;

use crate::context::MutationContext;
use crate::mutators::{
    CodeGenMutator, CombineMutator, ConcatMutator, ExplorationMutator, FixupMutator, InputMutator,
    Mutator, OperationMutator, ProbeMutator, SpliceMutator,
};
use crate::stats::MutatorStats;

/// Default number of distinct mutators `mutate_with_retries` will try before
/// giving up on a parent program (spec §4.4).
pub const DEFAULT_MAX_RETRIES: usize = 10;

pub struct MutatorRegistry {
    mutators: Vec<Box<dyn Mutator>>,
    weights: Vec<u32>,
    stats: Vec<MutatorStats>,
}

impl MutatorRegistry {
    pub fn new() -> Self {
        Self {
            mutators: Vec::new(),
            weights: Vec::new(),
            stats: Vec::new(),
        }
    }

    pub fn register(&mut self, mutator: Box<dyn Mutator>, weight: u32) {
        self.mutators.push(mutator);
        self.weights.push(weight);
        self.stats.push(MutatorStats::default());
    }

    pub fn len(&self) -> usize {
        self.mutators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutators.is_empty()
    }

    pub fn name_at(&self, index: usize) -> &'static str {
        self.mutators[index].name()
    }

    pub fn stats(&self) -> &[MutatorStats] {
        &self.stats
    }

    pub fn stats_for(&self, name: &str) -> Option<&MutatorStats> {
        self.mutators
            .iter()
            .position(|m| m.name() == name)
            .map(|i| &self.stats[i])
    }

    /// Weighted pick among indices not already in `excluded`. `None` if
    /// every mutator has been excluded or the pool is empty.
    fn sample_index(&self, rng: &mut dyn RngCore, excluded: &[usize]) -> Option<usize> {
        let total: u32 = self
            .weights
            .iter()
            .enumerate()
            .filter(|(i, _)| !excluded.contains(i))
            .map(|(_, w)| *w)
            .sum();
        if total == 0 {
            return None;
        }
        let mut pick = rng.gen_range(0..total);
        for (i, &w) in self.weights.iter().enumerate() {
            if excluded.contains(&i) {
                continue;
            }
            if pick < w {
                return Some(i);
            }
            pick -= w;
        }
        None
    }

    /// Picks mutators at random (without replacement) and tries each against
    /// `program` until one succeeds or `max_retries` distinct mutators have
    /// been tried. Updates `stats` for every attempt along the way.
    pub fn mutate_with_retries(
        &mut self,
        program: &Program,
        ctx: &MutationContext<'_>,
        rng: &mut dyn RngCore,
        max_retries: usize,
    ) -> Option<Program> {
        let mut tried: Vec<usize> = Vec::new();
        while tried.len() < max_retries.min(self.mutators.len()) {
            let Some(idx) = self.sample_index(rng, &tried) else {
                break;
            };
            tried.push(idx);

            self.stats[idx].record_attempt();
            let before = program.size() as i64;
            if let Some(result) = self.mutators[idx].mutate(program, ctx, rng) {
                let delta = result.size() as i64 - before;
                self.stats[idx].record_success(delta);
                return Some(result);
            }
        }
        None
    }

    /// The nine mutators of spec §4.4 with weights reflecting how often a
    /// real fuzzing loop wants each kind of change: structural growth
    /// (splice/codegen) and small rewrites (operation/input) dominate;
    /// instrumentation/feedback-only mutators (exploration/probe/fixup) are
    /// rarer since they only pay off once execution results come back.
    pub fn default_pool() -> Self {
        let mut reg = Self::new();
        reg.register(Box::new(OperationMutator), 10);
        reg.register(Box::new(InputMutator), 10);
        reg.register(Box::new(SpliceMutator), 8);
        reg.register(Box::new(CombineMutator), 5);
        reg.register(Box::new(ConcatMutator), 5);
        reg.register(Box::new(CodeGenMutator), 8);
        reg.register(Box::new(ExplorationMutator), 4);
        reg.register(Box::new(ProbeMutator), 4);
        reg.register(Box::new(FixupMutator), 3);
        reg
    }
}

impl Default for MutatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CorpusSource;
    use ilfuzz_builder::{BuildMethod, GeneratorRegistry, ProgramBuilder};
    use ilfuzz_il::{Environment, MinimalProfile};
    use rand::SeedableRng;

    fn env() -> Environment {
        let mut env = Environment::new();
        env.apply(&MinimalProfile);
        env
    }

    struct EmptySource;
    impl CorpusSource for EmptySource {
        fn random_program(&self, _rng: &mut dyn RngCore) -> Option<&Program> {
            None
        }
    }

    #[test]
    fn default_pool_has_nine_mutators() {
        assert_eq!(MutatorRegistry::default_pool().len(), 9);
    }

    #[test]
    fn mutate_with_retries_eventually_succeeds_or_gives_up_cleanly() {
        let env = env();
        let generators = GeneratorRegistry::default_pool();
        let mut builder = ProgramBuilder::new(&env);
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        builder.build_prefix(4, &mut rng);
        builder.build(10, BuildMethod::Generating, &generators, &mut rng);
        let program = builder.finalize().unwrap();

        let corpus = EmptySource;
        let ctx = MutationContext::new(&env, &generators, &corpus);
        let mut registry = MutatorRegistry::default_pool();
        let result = registry.mutate_with_retries(&program, &ctx, &mut rng, DEFAULT_MAX_RETRIES);
        if let Some(mutated) = result {
            assert!(mutated.code().validate().is_ok());
        }
        assert!(registry.stats().iter().map(|s| s.attempts).sum::<u64>() > 0);
    }

    #[test]
    fn sample_index_excludes_given_indices() {
        let mut registry = MutatorRegistry::new();
        registry.register(Box::new(OperationMutator), 1);
        registry.register(Box::new(InputMutator), 1);
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let excluded = vec![0];
        for _ in 0..10 {
            assert_eq!(registry.sample_index(&mut rng, &excluded), Some(1));
        }
    }
}
