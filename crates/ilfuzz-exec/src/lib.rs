//! REPRL child-process executor pool and coverage evaluator (spec §4.6,
//! §4.7, §6).
//!
//! Knows nothing about fuzz engines, corpora, or mutators: it implements
//! `ilfuzz_engine::Executor` against real child processes and otherwise
//! only exposes the REPRL wire protocol, the coverage shared-memory
//! bitmap, and the virgin-bits evaluator.

pub mod bitmap;
pub mod child;
pub mod error;
pub mod evaluator;
pub mod lifter;
pub mod pool;
pub mod protocol;

pub use bitmap::CoverageBitmap;
pub use child::{ExecStatus, ReprlChild};
pub use error::{ExecError, Result};
pub use evaluator::{CoverageDiff, CoverageEvaluator};
pub use lifter::{DebugLifter, Lifter};
pub use pool::ReprlExecutorPool;
