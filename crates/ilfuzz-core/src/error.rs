//! Orchestrator-level errors. Everything below `ilfuzz-core` stays on its
//! own `thiserror` type (`ilfuzz_builder::BuilderError`, `ilfuzz_exec::
//! ExecError`, ...); this crate's own enum covers only what it adds:
//! configuration loading and first-time engine spawn (spec §6 exit codes
//! `1` config error, `2` engine spawn failure). `ilfuzz-cli` wraps this in
//! `anyhow` at the binary boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to spawn engine process: {0}")]
    EngineSpawn(#[from] ilfuzz_exec::ExecError),

    #[error(transparent)]
    Sync(#[from] ilfuzz_sync::SyncError),

    #[error("I/O error accessing {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings file at {0} is malformed: {1}")]
    BadSettings(std::path::PathBuf, serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
