//! Wires every subsystem crate together and drives the fuzzer's main
//! loop (spec §5, §6, §9). This is the only crate in the workspace
//! allowed a dependency on all the others.

pub mod config;
pub mod error;
pub mod fuzzer;
pub mod lifter;
pub mod stats;

pub use config::{FuzzerConfig, InstanceType, SETTINGS_FILE};
pub use error::{CoreError, Result};
pub use fuzzer::Fuzzer;
pub use lifter::{DebugLifter, Lifter};
pub use stats::{EngineStatsSnapshot, MutatorStatsSnapshot, Statistics};
