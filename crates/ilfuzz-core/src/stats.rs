//! Aggregate statistics snapshot (spec §6 "stats.json", spec §9 "Global
//! mutable state" resolved by threading every counter through by value).
//! Serves two purposes: the periodic `--exportStatistics` disk snapshot
//! and the payload carried by `ilfuzz_sync::Message::Statistics`.

use serde::{Deserialize, Serialize};

use ilfuzz_corpus::CorpusStats;
use ilfuzz_engine::EngineStats;
use ilfuzz_mutate::MutatorStats;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MutatorStatsSnapshot {
    pub name: String,
    pub attempts: u64,
    pub successes: u64,
    pub added_instructions: i64,
}

impl MutatorStatsSnapshot {
    pub fn from_stats(name: &str, stats: &MutatorStats) -> Self {
        Self {
            name: name.to_string(),
            attempts: stats.attempts,
            successes: stats.successes,
            added_instructions: stats.added_instructions,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EngineStatsSnapshot {
    pub executions: u64,
    pub crashes: u64,
    pub new_coverage: u64,
    pub timeouts: u64,
    pub runtime_errors: u64,
}

impl From<EngineStats> for EngineStatsSnapshot {
    fn from(stats: EngineStats) -> Self {
        Self {
            executions: stats.executions,
            crashes: stats.crashes,
            new_coverage: stats.new_coverage,
            timeouts: stats.timeouts,
            runtime_errors: stats.runtime_errors,
        }
    }
}

/// Everything `ilfuzz-cli --exportStatistics` writes to `stats.json` and
/// everything a non-root node forwards upward over the sync protocol.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub uptime_secs: u64,
    pub total_executions: u64,
    pub executions_per_second: f64,
    pub engine: EngineStatsSnapshot,
    pub mutators: Vec<MutatorStatsSnapshot>,
    pub corpus: CorpusStats,
    pub coverage_edges_found: u64,
    pub crashes_found: u64,
    pub corpus_size: usize,
}

impl Statistics {
    pub fn refresh_rate(&mut self, uptime_secs: u64) {
        self.uptime_secs = uptime_secs;
        self.executions_per_second = if uptime_secs == 0 {
            0.0
        } else {
            self.total_executions as f64 / uptime_secs as f64
        };
    }
}
