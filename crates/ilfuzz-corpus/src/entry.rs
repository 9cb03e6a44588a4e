//! One retained program plus the bookkeeping the weighting/aging/eviction
//! policy needs (spec §4.8).

use serde::{Deserialize, Serialize};

use ilfuzz_il::{Fingerprint, Program};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub program: Program,
    pub fingerprint: Fingerprint,
    /// How many times `Corpus::random_for_mutating` has returned this entry.
    pub selected_count: u64,
    /// Corpus-local logical clock value at insertion, used for the
    /// recency boost.
    pub inserted_at_tick: u64,
    /// Corpus-local logical clock value of the most recent selection, used
    /// for LRU-by-selection eviction.
    pub last_selected_tick: u64,
    /// Whether a second immediate re-execution reproduced the same
    /// coverage bitmap before this entry was inserted (§1 Non-goals'
    /// "best-effort deterministic samples filter", supplemented per
    /// SPEC_FULL §6).
    pub deterministic: bool,
}

impl CorpusEntry {
    pub fn new(program: Program, tick: u64, deterministic: bool) -> Self {
        let fingerprint = program.fingerprint();
        Self {
            program,
            fingerprint,
            selected_count: 0,
            inserted_at_tick: tick,
            last_selected_tick: tick,
            deterministic,
        }
    }
}
