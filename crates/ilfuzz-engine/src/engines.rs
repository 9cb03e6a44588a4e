//! The four fuzz engines of spec §4.5, each driving generation/mutation
//! through the builder and mutator registries and reporting back to an
//! `EngineCorpus` via an `Executor`.

use std::time::Duration;

use rand::{Rng, RngCore};

use ilfuzz_builder::{BuildMethod, GeneratorRegistry, ProgramBuilder};
use ilfuzz_il::{Environment, Program};
use ilfuzz_mutate::{CombineMutator, FixupMutator, MutationContext, Mutator, MutatorRegistry};

use crate::corpus::EngineCorpus;
use crate::executor::{Executor, ExecutionResult};
use crate::stats::EngineStats;

/// Default chain length for `MutationEngine`/`HybridEngine`'s "K consecutive
/// mutations" (spec §4.5).
pub const DEFAULT_CHAIN_LENGTH: usize = 5;
/// Default instruction budget for `GenerativeEngine` (spec §4.5).
pub const DEFAULT_GENERATIVE_INSTRUCTIONS: usize = 10;
/// Default per-execution timeout (spec §4.6); `HybridEngine` doubles it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Drives one iteration's worth of work through `corpus`/`executor`, reusing
/// `generators`/`mutators` supplied by the caller rather than owning them,
/// so a `MultiEngine` can share a single pool across its sub-engines.
pub trait FuzzEngine {
    fn name(&self) -> &'static str;

    /// Runs one iteration, returning how many programs were executed (used
    /// by `MultiEngine`'s switch-interval bookkeeping and by `ilfuzz-core`'s
    /// throughput statistics). Zero means the engine declined to do
    /// anything this step (e.g. the corpus was empty).
    fn step(
        &mut self,
        env: &Environment,
        generators: &GeneratorRegistry,
        mutators: &mut MutatorRegistry,
        corpus: &mut dyn EngineCorpus,
        executor: &mut dyn Executor,
        rng: &mut dyn RngCore,
    ) -> usize;

    fn stats(&self) -> EngineStats;
}

/// Prepends a `buildPrefix` pool of typed variables ahead of `parent`'s own
/// code, so a mutation chain rooted at `parent` always has literals of every
/// interesting base type visible for `InputMutator` to pick from even if
/// `parent` itself never produced one. Implemented by replaying `parent`
/// through `CombineMutator` rather than duplicating the replay machinery
/// `ilfuzz-mutate` already has (see DESIGN.md).
fn prefix_parent(env: &Environment, generators: &GeneratorRegistry, parent: &Program, rng: &mut dyn RngCore) -> Program {
    let mut builder = ProgramBuilder::new(env);
    builder.build_prefix(4, rng);
    let Ok(prefix) = builder.finalize() else {
        return parent.clone();
    };

    let source = std::slice::from_ref(parent);
    let ctx = MutationContext::new(env, generators, source);
    CombineMutator.mutate(&prefix, &ctx, rng).unwrap_or(prefix)
}

/// Runs up to `chain_len` consecutive mutations starting from `seed`,
/// re-rooting at each successful mutant (spec §4.5). Every mutant is
/// executed and reported to `corpus`; a runtime error or timeout aborts the
/// chain early, a crash or plain success does not (the spec only calls out
/// runtime errors/timeouts as chain-aborting, since a child that crashed has
/// already been respawned by the time the engine sees the result).
fn mutation_chain(
    env: &Environment,
    generators: &GeneratorRegistry,
    mutators: &mut MutatorRegistry,
    corpus: &mut dyn EngineCorpus,
    executor: &mut dyn Executor,
    rng: &mut dyn RngCore,
    seed: Program,
    chain_len: usize,
    timeout: Duration,
    stats: &mut EngineStats,
) -> usize {
    let mut current = seed;
    let mut executed = 0usize;

    for _ in 0..chain_len {
        let mutant = {
            let ctx = MutationContext::new(env, generators, corpus.as_corpus_source());
            mutators.mutate_with_retries(&current, &ctx, rng, ilfuzz_mutate::DEFAULT_MAX_RETRIES)
        };
        let Some(mutant) = mutant else {
            tracing::debug!("mutation chain ran out of applicable mutators");
            break;
        };

        let result = executor.execute(&mutant, timeout);
        stats.record(&result);
        executed += 1;
        let abort = result.should_abort_chain();
        corpus.record_result(mutant.clone(), &result);

        if abort {
            break;
        }
        current = mutant;
    }

    executed
}

/// Pick parent, prepend a typed prefix, apply up to K consecutive mutations.
pub struct MutationEngine {
    chain_len: usize,
    timeout: Duration,
    stats: EngineStats,
}

impl MutationEngine {
    pub fn new() -> Self {
        Self {
            chain_len: DEFAULT_CHAIN_LENGTH,
            timeout: DEFAULT_TIMEOUT,
            stats: EngineStats::default(),
        }
    }

    pub fn with_chain_len(mut self, chain_len: usize) -> Self {
        self.chain_len = chain_len;
        self
    }
}

impl Default for MutationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FuzzEngine for MutationEngine {
    fn name(&self) -> &'static str {
        "MutationEngine"
    }

    fn step(
        &mut self,
        env: &Environment,
        generators: &GeneratorRegistry,
        mutators: &mut MutatorRegistry,
        corpus: &mut dyn EngineCorpus,
        executor: &mut dyn Executor,
        rng: &mut dyn RngCore,
    ) -> usize {
        let Some(parent) = corpus.pick_parent(rng) else {
            tracing::debug!("MutationEngine: corpus empty, nothing to mutate");
            return 0;
        };
        let seed = prefix_parent(env, generators, &parent, rng);
        mutation_chain(
            env, generators, mutators, corpus, executor, rng, seed, self.chain_len, self.timeout, &mut self.stats,
        )
    }

    fn stats(&self) -> EngineStats {
        self.stats
    }
}

/// Pick a template, generate a full program, execute with a doubled
/// timeout, fix up guards on success, then continue as `MutationEngine`.
pub struct HybridEngine {
    templates: ilfuzz_builder::TemplateRegistry,
    chain_len: usize,
    base_timeout: Duration,
    stats: EngineStats,
}

impl HybridEngine {
    pub fn new(templates: ilfuzz_builder::TemplateRegistry) -> Self {
        Self {
            templates,
            chain_len: DEFAULT_CHAIN_LENGTH,
            base_timeout: DEFAULT_TIMEOUT,
            stats: EngineStats::default(),
        }
    }

    pub fn templates(&self) -> &ilfuzz_builder::TemplateRegistry {
        &self.templates
    }
}

impl FuzzEngine for HybridEngine {
    fn name(&self) -> &'static str {
        "HybridEngine"
    }

    fn step(
        &mut self,
        env: &Environment,
        generators: &GeneratorRegistry,
        mutators: &mut MutatorRegistry,
        corpus: &mut dyn EngineCorpus,
        executor: &mut dyn Executor,
        rng: &mut dyn RngCore,
    ) -> usize {
        let Some(index) = self.templates.sample(rng) else {
            tracing::debug!("HybridEngine: no template registered");
            return 0;
        };
        let Ok(program) = self.templates.build_from(index, env, generators, rng) else {
            tracing::debug!("HybridEngine: template failed to build a valid program");
            return 0;
        };

        let doubled = self.base_timeout * 2;
        let result = executor.execute(&program, doubled);
        self.stats.record(&result);
        self.templates.record_execution(index);
        if result.new_coverage {
            self.templates.record_interesting(index);
        }
        if result.is_crash() {
            self.templates.record_crash(index);
        }
        corpus.record_result(program.clone(), &result);

        let mut executed = 1usize;
        if result.should_abort_chain() {
            return executed;
        }

        let seed = if result.guard_firings.is_empty() {
            program
        } else {
            let source: &[Program] = &[];
            let ctx = MutationContext::new(env, generators, source).with_guard_firings(&result.guard_firings);
            FixupMutator.mutate(&program, &ctx, rng).unwrap_or(program)
        };

        executed += mutation_chain(
            env,
            generators,
            mutators,
            corpus,
            executor,
            rng,
            seed,
            self.chain_len,
            self.base_timeout,
            &mut self.stats,
        );
        executed
    }

    fn stats(&self) -> EngineStats {
        self.stats
    }
}

/// Builds a prefix plus N generated instructions and executes once; no
/// corpus parent is needed, so this is what a fuzzer falls back to before
/// the corpus has anything worth mutating (spec §4.5 "cold-start corpora").
pub struct GenerativeEngine {
    instructions: usize,
    timeout: Duration,
    stats: EngineStats,
}

impl GenerativeEngine {
    pub fn new() -> Self {
        Self {
            instructions: DEFAULT_GENERATIVE_INSTRUCTIONS,
            timeout: DEFAULT_TIMEOUT,
            stats: EngineStats::default(),
        }
    }

    pub fn with_instruction_count(mut self, n: usize) -> Self {
        self.instructions = n;
        self
    }
}

impl Default for GenerativeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FuzzEngine for GenerativeEngine {
    fn name(&self) -> &'static str {
        "GenerativeEngine"
    }

    fn step(
        &mut self,
        env: &Environment,
        generators: &GeneratorRegistry,
        _mutators: &mut MutatorRegistry,
        corpus: &mut dyn EngineCorpus,
        executor: &mut dyn Executor,
        rng: &mut dyn RngCore,
    ) -> usize {
        let mut builder = ProgramBuilder::new(env);
        builder.build_prefix(4, rng);
        builder.build(self.instructions, BuildMethod::Generating, generators, rng);
        let Ok(program) = builder.finalize() else {
            tracing::debug!("GenerativeEngine: failed to finalize a generated program");
            return 0;
        };

        let result = executor.execute(&program, self.timeout);
        self.stats.record(&result);
        corpus.record_result(program, &result);
        1
    }

    fn stats(&self) -> EngineStats {
        self.stats
    }
}

/// Rotates among a weighted list of sub-engines, running each for
/// `switch_interval` executions before re-sampling (spec §4.5).
pub struct MultiEngine {
    engines: Vec<Box<dyn FuzzEngine>>,
    weights: Vec<u32>,
    switch_interval: usize,
    current: usize,
    executed_on_current: usize,
    /// Each sub-engine's own stats are cumulative since it was created, not
    /// per-step; this keeps the last snapshot per engine so `step` can fold
    /// in just the delta instead of re-adding the running total every time.
    last_stats: Vec<EngineStats>,
    stats: EngineStats,
}

impl MultiEngine {
    pub fn new(switch_interval: usize) -> Self {
        Self {
            engines: Vec::new(),
            weights: Vec::new(),
            switch_interval: switch_interval.max(1),
            current: 0,
            executed_on_current: 0,
            last_stats: Vec::new(),
            stats: EngineStats::default(),
        }
    }

    pub fn register(&mut self, engine: Box<dyn FuzzEngine>, weight: u32) {
        self.engines.push(engine);
        self.weights.push(weight);
        self.last_stats.push(EngineStats::default());
    }

    fn sample_engine(&self, rng: &mut dyn RngCore) -> Option<usize> {
        let total: u32 = self.weights.iter().sum();
        if total == 0 {
            return None;
        }
        let mut pick = rng.gen_range(0..total);
        for (i, &w) in self.weights.iter().enumerate() {
            if pick < w {
                return Some(i);
            }
            pick -= w;
        }
        None
    }
}

impl FuzzEngine for MultiEngine {
    fn name(&self) -> &'static str {
        "MultiEngine"
    }

    fn step(
        &mut self,
        env: &Environment,
        generators: &GeneratorRegistry,
        mutators: &mut MutatorRegistry,
        corpus: &mut dyn EngineCorpus,
        executor: &mut dyn Executor,
        rng: &mut dyn RngCore,
    ) -> usize {
        if self.engines.is_empty() {
            tracing::debug!("MultiEngine: no sub-engines registered");
            return 0;
        }

        if self.executed_on_current >= self.switch_interval {
            if let Some(next) = self.sample_engine(rng) {
                self.current = next;
            }
            self.executed_on_current = 0;
        }

        let executed = self.engines[self.current].step(env, generators, mutators, corpus, executor, rng);
        self.executed_on_current += executed.max(1);

        let latest = self.engines[self.current].stats();
        let prev = self.last_stats[self.current];
        self.stats.merge(EngineStats {
            executions: latest.executions - prev.executions,
            crashes: latest.crashes - prev.crashes,
            new_coverage: latest.new_coverage - prev.new_coverage,
            timeouts: latest.timeouts - prev.timeouts,
            runtime_errors: latest.runtime_errors - prev.runtime_errors,
        });
        self.last_stats[self.current] = latest;

        executed
    }

    fn stats(&self) -> EngineStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ilfuzz_builder::GeneratorRegistry;
    use ilfuzz_il::MinimalProfile;
    use rand::SeedableRng;
    use rustc_hash::FxHashSet;

    fn env() -> Environment {
        let mut env = Environment::new();
        env.apply(&MinimalProfile);
        env
    }

    struct AlwaysSuccess;
    impl Executor for AlwaysSuccess {
        fn execute(&mut self, _program: &Program, _timeout: Duration) -> ExecutionResult {
            ExecutionResult {
                outcome: crate::executor::ExecutionOutcome::Success,
                new_coverage: false,
                guard_firings: FxHashSet::default(),
            }
        }
    }

    struct AlwaysTimeout;
    impl Executor for AlwaysTimeout {
        fn execute(&mut self, _program: &Program, _timeout: Duration) -> ExecutionResult {
            ExecutionResult {
                outcome: crate::executor::ExecutionOutcome::Timeout,
                new_coverage: false,
                guard_firings: FxHashSet::default(),
            }
        }
    }

    #[derive(Default)]
    struct VecCorpus {
        programs: Vec<Program>,
        recorded: usize,
    }

    impl ilfuzz_mutate::CorpusSource for VecCorpus {
        fn random_program(&self, rng: &mut dyn RngCore) -> Option<&Program> {
            self.programs.random_program(rng)
        }
    }

    impl EngineCorpus for VecCorpus {
        fn pick_parent(&self, rng: &mut dyn RngCore) -> Option<Program> {
            self.programs.random_program(rng).cloned()
        }

        fn record_result(&mut self, program: Program, _result: &ExecutionResult) {
            self.programs.push(program);
            self.recorded += 1;
        }

        fn as_corpus_source(&self) -> &dyn ilfuzz_mutate::CorpusSource {
            self
        }
    }

    fn seed_program(env: &Environment, seed: u64) -> Program {
        let generators = GeneratorRegistry::default_pool();
        let mut builder = ProgramBuilder::new(env);
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        builder.build_prefix(4, &mut rng);
        builder.build(10, BuildMethod::Generating, &generators, &mut rng);
        builder.finalize().unwrap()
    }

    #[test]
    fn generative_engine_executes_once() {
        let env = env();
        let generators = GeneratorRegistry::default_pool();
        let mut mutators = MutatorRegistry::default_pool();
        let mut corpus = VecCorpus::default();
        let mut executor = AlwaysSuccess;
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);

        let mut engine = GenerativeEngine::new();
        let executed = engine.step(&env, &generators, &mut mutators, &mut corpus, &mut executor, &mut rng);
        assert_eq!(executed, 1);
        assert_eq!(corpus.recorded, 1);
        assert_eq!(engine.stats().executions, 1);
    }

    #[test]
    fn mutation_engine_returns_zero_on_empty_corpus() {
        let env = env();
        let generators = GeneratorRegistry::default_pool();
        let mut mutators = MutatorRegistry::default_pool();
        let mut corpus = VecCorpus::default();
        let mut executor = AlwaysSuccess;
        let mut rng = rand::rngs::StdRng::seed_from_u64(2);

        let mut engine = MutationEngine::new();
        let executed = engine.step(&env, &generators, &mut mutators, &mut corpus, &mut executor, &mut rng);
        assert_eq!(executed, 0);
    }

    #[test]
    fn mutation_engine_chains_up_to_k_mutations() {
        let env = env();
        let generators = GeneratorRegistry::default_pool();
        let mut mutators = MutatorRegistry::default_pool();
        let mut corpus = VecCorpus { programs: vec![seed_program(&env, 3)], recorded: 0 };
        let mut executor = AlwaysSuccess;
        let mut rng = rand::rngs::StdRng::seed_from_u64(4);

        let mut engine = MutationEngine::new().with_chain_len(5);
        let executed = engine.step(&env, &generators, &mut mutators, &mut corpus, &mut executor, &mut rng);
        assert!(executed <= 5);
        assert_eq!(corpus.recorded, executed);
    }

    #[test]
    fn mutation_engine_aborts_chain_on_timeout() {
        let env = env();
        let generators = GeneratorRegistry::default_pool();
        let mut mutators = MutatorRegistry::default_pool();
        let mut corpus = VecCorpus { programs: vec![seed_program(&env, 5)], recorded: 0 };
        let mut executor = AlwaysTimeout;
        let mut rng = rand::rngs::StdRng::seed_from_u64(6);

        let mut engine = MutationEngine::new().with_chain_len(5);
        let executed = engine.step(&env, &generators, &mut mutators, &mut corpus, &mut executor, &mut rng);
        assert!(executed <= 1);
        assert_eq!(engine.stats().timeouts, executed as u64);
    }

    #[test]
    fn hybrid_engine_executes_template_then_chain() {
        let env = env();
        let generators = GeneratorRegistry::default_pool();
        let mut mutators = MutatorRegistry::default_pool();
        let mut corpus = VecCorpus::default();
        let mut executor = AlwaysSuccess;
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);

        let mut engine = HybridEngine::new(ilfuzz_builder::templates::default_pool());
        let executed = engine.step(&env, &generators, &mut mutators, &mut corpus, &mut executor, &mut rng);
        assert!(executed >= 1);
        assert_eq!(corpus.recorded, executed);
        assert_eq!(engine.templates().stats(0).executions + engine.templates().stats(1).executions + engine.templates().stats(2).executions, 1);
    }

    #[test]
    fn multi_engine_switches_after_interval() {
        let env = env();
        let generators = GeneratorRegistry::default_pool();
        let mut mutators = MutatorRegistry::default_pool();
        let mut corpus = VecCorpus::default();
        let mut executor = AlwaysSuccess;
        let mut rng = rand::rngs::StdRng::seed_from_u64(8);

        let mut engine = MultiEngine::new(1);
        engine.register(Box::new(GenerativeEngine::new()), 1);
        engine.register(Box::new(GenerativeEngine::new()), 1);

        for _ in 0..4 {
            let executed = engine.step(&env, &generators, &mut mutators, &mut corpus, &mut executor, &mut rng);
            assert_eq!(executed, 1);
        }
        assert_eq!(engine.stats().executions, 4);
    }
}
