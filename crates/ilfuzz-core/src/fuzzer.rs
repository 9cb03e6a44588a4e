//! The orchestrator: owns every subsystem and drives the single-threaded
//! cooperative main loop (spec §5 "No OS threads inside one fuzzer
//! process; concurrency is achieved by running multiple processes").
//!
//! This is the only module in the workspace allowed to know about every
//! other `ilfuzz-*` crate at once; everywhere else uses the acyclic seam
//! traits (`CorpusSource`, `EngineCorpus`, `Executor`, `CoverageOracle`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;

use ilfuzz_builder::{templates, GeneratorRegistry};
use ilfuzz_corpus::{Corpus, CorpusStorage, CoverageOracle, CrashStorage, EdgeSet, Minimizer};
use ilfuzz_engine::{
    EngineCorpus, ExecutionOutcome, ExecutionResult, FuzzEngine, GenerativeEngine, HybridEngine,
    MultiEngine, MutationEngine,
};
use ilfuzz_exec::ReprlExecutorPool;
use ilfuzz_il::{format, Environment, Profile, Program};
use ilfuzz_mutate::MutatorRegistry;
use ilfuzz_sync::{SyncConfig, SyncEvent, SyncNode};

use crate::config::{FuzzerConfig, InstanceType};
use crate::error::{CoreError, Result};
use crate::lifter::Lifter;
use crate::stats::{EngineStatsSnapshot, MutatorStatsSnapshot, Statistics};

/// Wraps the real corpus so `Fuzzer` can observe crashes as they're
/// reported through the `EngineCorpus` seam, without the engines
/// themselves needing to know crash persistence exists. New-coverage
/// insertion is still delegated straight to `Corpus::record_result`;
/// `Fuzzer` post-processes the newest entry afterward (see
/// `Fuzzer::finalize_latest_entry`), once the executor borrow `step` held
/// has ended.
struct TrackingCorpus<'a> {
    corpus: &'a mut Corpus,
    pending_crashes: Vec<(Program, i32, String)>,
}

impl EngineCorpus for TrackingCorpus<'_> {
    fn pick_parent(&self, rng: &mut dyn rand::RngCore) -> Option<Program> {
        self.corpus.pick_parent(rng)
    }

    fn record_result(&mut self, program: Program, result: &ExecutionResult) {
        if let ExecutionOutcome::Crash { signal, description } = &result.outcome {
            self.pending_crashes.push((program.clone(), *signal, description.clone()));
        }
        self.corpus.record_result(program, result);
    }

    fn as_corpus_source(&self) -> &dyn ilfuzz_mutate::CorpusSource {
        self.corpus.as_corpus_source()
    }
}

/// Adapts `ReprlExecutorPool::covered_edges` to the minimizer's
/// `CoverageOracle` seam (spec §4.9).
struct PoolOracle<'a> {
    pool: &'a mut ReprlExecutorPool,
}

impl CoverageOracle for PoolOracle<'_> {
    fn covered_edges(&mut self, program: &Program, timeout: Duration) -> EdgeSet {
        self.pool.covered_edges(program, timeout)
    }
}

pub struct Fuzzer {
    config: FuzzerConfig,
    env: Environment,
    generators: GeneratorRegistry,
    mutators: MutatorRegistry,
    corpus: Corpus,
    corpus_storage: CorpusStorage,
    crash_storage: CrashStorage,
    executor: ReprlExecutorPool,
    minimizer: Minimizer,
    sync: SyncNode,
    engine: MultiEngine,
    rng: StdRng,
    stats: Statistics,
    start: Instant,
    last_export: Instant,
    iterations: u64,
}

impl Fuzzer {
    pub fn new(config: FuzzerConfig, profile: &dyn Profile, lifter: Arc<dyn Lifter>) -> Result<Self> {
        let mut env = Environment::new();
        env.apply(profile);

        let generators = GeneratorRegistry::default_pool();
        let mutators = MutatorRegistry::default_pool();

        let executor = ReprlExecutorPool::new(
            config.engine_path.clone(),
            config.engine_args.clone(),
            config.jobs.max(1),
            lifter,
        )?;

        let sync_config = SyncConfig {
            role: config.instance_type.to_sync_role(),
            bind_to: config.bind_to,
            connect_to: config.connect_to,
            outbox_capacity: 4096,
            backoff: Default::default(),
        };
        let sync = SyncNode::new(&sync_config)?;

        let engine = Self::build_engine(&config);

        Ok(Self {
            corpus: Corpus::new(config.corpus_cap),
            corpus_storage: CorpusStorage::new(&config.storage_path),
            crash_storage: CrashStorage::new(&config.storage_path),
            minimizer: Minimizer::new(),
            rng: StdRng::from_entropy(),
            stats: Statistics::default(),
            start: Instant::now(),
            last_export: Instant::now(),
            iterations: 0,
            env,
            generators,
            mutators,
            executor,
            sync,
            engine,
            config,
        })
    }

    /// Default engine topology (spec §4.5 "A typical configuration runs a
    /// `MultiEngine` rotating between the other three"): generative engine
    /// seeds a cold corpus, hybrid engine spends most of the budget, plain
    /// mutation engine runs the rest.
    fn build_engine(config: &FuzzerConfig) -> MultiEngine {
        let mut multi = MultiEngine::new(config.multi_engine_switch_interval);
        multi.register(Box::new(GenerativeEngine::new().with_instruction_count(config.generative_instruction_count)), 1);
        multi.register(
            Box::new(HybridEngine::new(templates::default_pool())),
            3,
        );
        multi.register(Box::new(MutationEngine::new().with_chain_len(config.mutation_chain_length)), 2);
        multi
    }

    /// Loads persisted settings, corpus, and crash archive (spec §6
    /// "--resume loading its on-disk corpus and crash directory at
    /// startup").
    pub fn resume(&mut self) -> Result<()> {
        self.corpus_storage.ensure_dir().map_err(|e| CoreError::Config(e.to_string()))?;
        let entries = self.corpus_storage.load().map_err(|e| CoreError::Config(e.to_string()))?;
        tracing::info!(count = entries.len(), "restoring corpus from disk");
        self.corpus.restore(entries);

        self.crash_storage
            .load_known_signatures()
            .map_err(|e| CoreError::Config(e.to_string()))?;
        tracing::info!(count = self.crash_storage.count(), "restored known crash signatures");

        if self.sync.parent_connected() || self.config.connect_to.is_some() {
            let encoded: Vec<Vec<u8>> = self.corpus.entries().map(|e| format::encode(&e.program)).collect();
            self.sync.replay_corpus_to_parent(encoded);
        }
        Ok(())
    }

    pub fn corpus_len(&self) -> usize {
        self.corpus.len()
    }

    pub fn crash_count(&self) -> usize {
        self.crash_storage.count()
    }

    /// Runs until `should_stop` returns true, exporting statistics on the
    /// configured interval (spec §6 "--exportStatistics").
    pub fn run(&mut self, mut should_stop: impl FnMut() -> bool) -> Result<()> {
        loop {
            if should_stop() {
                break;
            }
            self.step();

            if self.config.export_statistics {
                let interval = Duration::from_secs(self.config.export_statistics_interval_secs.max(1));
                if self.last_export.elapsed() >= interval {
                    self.export_statistics()?;
                    self.last_export = Instant::now();
                }
            }
        }
        self.export_statistics()?;
        self.config.save()
    }

    /// One iteration: run an engine step, let sync multiplex its I/O, and
    /// react to whatever each produced.
    fn step(&mut self) {
        self.iterations += 1;

        let before_len = self.corpus.len();
        let mut tracking = TrackingCorpus {
            corpus: &mut self.corpus,
            pending_crashes: Vec::new(),
        };
        let executed = self.engine.step(
            &self.env,
            &self.generators,
            &mut self.mutators,
            &mut tracking,
            &mut self.executor,
            &mut self.rng,
        );
        let pending_crashes = tracking.pending_crashes;
        self.stats.total_executions += executed as u64;

        for (program, signal, description) in pending_crashes {
            self.handle_new_crash(program, description.into_bytes(), signal, true);
        }

        if self.corpus.len() > before_len {
            self.finalize_latest_entry();
        }

        let events = self.sync.tick(Instant::now());
        for event in events {
            self.apply_sync_event(event);
        }
    }

    /// Minimizes the most recently inserted (not-yet-minimized) program,
    /// re-executes it once to check the deterministic-samples property
    /// (SPEC_FULL §6), persists it, and offers it to the sync parent.
    fn finalize_latest_entry(&mut self) {
        let Some(latest) = self.corpus.entries().last() else {
            return;
        };
        let program = latest.program.clone();
        let timeout = self.config.timeout();

        let target_edges = self.executor.covered_edges(&program, timeout);
        let minimized = {
            let mut oracle = PoolOracle { pool: &mut self.executor };
            self.minimizer.minimize(&program, target_edges, &mut oracle)
        };

        let run_a = self.executor.covered_edges(&minimized, timeout);
        let run_b = self.executor.covered_edges(&minimized, timeout);
        let deterministic = run_a == run_b;

        if let Some(entry) = self.corpus.replace_last(minimized, deterministic) {
            if let Err(err) = self.corpus_storage.save_entry(entry) {
                tracing::warn!(error = %err, "failed to persist corpus entry");
            }
            self.sync.offer_corpus_sample(format::encode(&entry.program));
        }
    }

    /// Persists a crash (root only, spec §4.10 "persisted to disk only by
    /// the root") and, when `forward` is set, offers it to the sync
    /// parent. `forward` must be `false` for crashes arriving via
    /// `apply_sync_event`: `SyncNode::poll_children` already re-forwards
    /// the raw message to this node's parent itself, so forwarding again
    /// here would double-send it up the tree.
    fn handle_new_crash(&mut self, program: Program, stderr: Vec<u8>, signal: i32, forward: bool) {
        if matches!(self.config.instance_type, InstanceType::Root) {
            let unix_secs = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            match self.crash_storage.record(&program, &stderr, signal, unix_secs) {
                Ok(true) => tracing::info!(signal, "recorded new crash"),
                Ok(false) => {}
                Err(err) => tracing::warn!(error = %err, "failed to persist crash"),
            }
        }
        if forward {
            self.sync.offer_crash(format::encode(&program), stderr, signal);
        }
    }

    fn apply_sync_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::NewCorpusSample(bytes) => match format::decode(&bytes) {
                Ok(program) => {
                    if self.corpus.insert(program, true) {
                        if let Some(entry) = self.corpus.entries().last() {
                            if let Err(err) = self.corpus_storage.save_entry(entry) {
                                tracing::warn!(error = %err, "failed to persist synced corpus entry");
                            }
                        }
                    }
                }
                Err(err) => tracing::warn!(error = %err, "dropping malformed synced corpus sample"),
            },
            SyncEvent::Crash { program, stderr, signal } => match format::decode(&program) {
                Ok(program) => self.handle_new_crash(program, stderr, signal, false),
                Err(err) => tracing::warn!(error = %err, "dropping malformed synced crash"),
            },
            SyncEvent::Statistics(_) => {
                // Aggregation of a subtree's statistics is left to whatever
                // dashboard consumes `stats.json`; this node's own snapshot
                // already covers its own counters (see `export_statistics`).
            }
            SyncEvent::ParentConnected => tracing::info!("sync: connected to parent"),
            SyncEvent::ParentDisconnected => tracing::warn!("sync: disconnected from parent"),
        }
    }

    fn snapshot_statistics(&self) -> Statistics {
        let mut stats = self.stats.clone();
        stats.engine = EngineStatsSnapshot::from(self.engine.stats());
        stats.mutators = (0..self.mutators.stats().len())
            .map(|i| MutatorStatsSnapshot::from_stats(self.mutators.name_at(i), &self.mutators.stats()[i]))
            .collect();
        stats.corpus = self.corpus.stats();
        stats.coverage_edges_found = self.executor.coverage_edges_found();
        stats.crashes_found = self.crash_storage.count() as u64;
        stats.corpus_size = self.corpus.len();
        stats.refresh_rate(self.start.elapsed().as_secs());
        stats
    }

    fn export_statistics(&mut self) -> Result<()> {
        let snapshot = self.snapshot_statistics();
        self.sync.offer_statistics(serde_json::to_vec(&snapshot).unwrap_or_default());

        let path = self.config.storage_path.join("stats.json");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::Io { path: parent.to_path_buf(), source: e })?;
        }
        let bytes = serde_json::to_vec_pretty(&snapshot).unwrap_or_default();
        std::fs::write(&path, bytes).map_err(|e| CoreError::Io { path, source: e })
    }
}
