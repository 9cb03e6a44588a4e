//! Engine errors. A `FuzzEngine::step` surfaces only what the orchestrator
//! can act on; everything else (a mutator declining, a template not being
//! registered) degrades to "no work done this step" rather than an error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Builder(#[from] ilfuzz_builder::BuilderError),

    #[error("corpus is empty, nothing to pick a parent from")]
    EmptyCorpus,

    #[error("no template is registered")]
    NoTemplate,

    #[error("sub-engine list is empty")]
    NoSubEngines,
}

pub type Result<T> = std::result::Result<T, EngineError>;
