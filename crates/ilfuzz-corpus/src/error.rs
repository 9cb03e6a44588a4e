//! Corpus and crash-persistence errors. Per spec §7 ("Corpus/disk errors:
//! logged; an insert failure does not abort the fuzzer"), callers are
//! expected to log a `CorpusError` and move on rather than propagate it
//! across an iteration boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("I/O error accessing {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Decode(#[from] ilfuzz_il::DecodeError),

    #[error("corpus index at {0} is malformed: {1}")]
    BadIndex(std::path::PathBuf, serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CorpusError>;
