//! Corpus running counters, threaded through by value like every other
//! `*Stats` type in this workspace (spec §9 "Global mutable state").

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct CorpusStats {
    pub inserted: u64,
    pub rejected_duplicate: u64,
    pub rejected_nondeterministic: u64,
    pub evicted: u64,
    pub selections: u64,
}
