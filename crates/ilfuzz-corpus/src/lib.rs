//! Weighted/aging corpus, program minimizer, and on-disk corpus/crash
//! persistence (spec §4.8-§4.9).

pub mod corpus;
pub mod entry;
pub mod error;
pub mod minimizer;
pub mod stats;
pub mod storage;

pub use corpus::{Corpus, WeightParams};
pub use entry::CorpusEntry;
pub use error::{CorpusError, Result};
pub use minimizer::{CoverageOracle, EdgeSet, Minimizer, DEFAULT_MINIMIZE_TIMEOUT};
pub use stats::CorpusStats;
pub use storage::{CorpusStorage, CrashMetadata, CrashStorage};
