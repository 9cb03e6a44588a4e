//! `FuzzerConfig` (spec §6 CLI surface plus the tunables spec.md names as
//! "default N" in prose): a `serde`-derived struct with a `Default` impl
//! and JSON (de)serialization, matching the teacher's
//! `otter-runtime::config` pattern of a typed config struct persisted
//! alongside its process. Loaded from `storagePath/settings.json` on
//! `--resume`, written back out on shutdown.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ilfuzz_sync::Role as SyncRole;

use crate::error::{CoreError, Result};

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceType {
    Root,
    Intermediate,
    Leaf,
}

impl InstanceType {
    pub fn to_sync_role(self) -> SyncRole {
        match self {
            InstanceType::Root => SyncRole::Root,
            InstanceType::Intermediate => SyncRole::Intermediate,
            InstanceType::Leaf => SyncRole::Leaf,
        }
    }
}

impl std::str::FromStr for InstanceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "root" => Ok(InstanceType::Root),
            "intermediate" => Ok(InstanceType::Intermediate),
            "leaf" => Ok(InstanceType::Leaf),
            other => Err(CoreError::Config(format!("unknown --instanceType {other:?}"))),
        }
    }
}

/// Full fuzzer configuration (spec §6 CLI surface plus the "default N"
/// tunables named throughout spec §4). Every field has a spec-documented
/// default so a bare `FuzzerConfig::default()` is already a runnable
/// single-process configuration against a profile-only engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzerConfig {
    /// `--profile=<name>`: selects the environment/lifter pairing. Only the
    /// name is stored here; resolving it to a concrete `Profile` +
    /// `Lifter` is `ilfuzz-cli`'s job (profiles are external per spec §1).
    pub profile: String,
    pub storage_path: PathBuf,
    pub resume: bool,
    pub jobs: usize,
    pub timeout_ms: u64,
    pub log_level: String,
    pub instance_type: InstanceType,
    pub bind_to: Option<SocketAddr>,
    pub connect_to: Option<SocketAddr>,
    pub export_statistics: bool,
    pub export_statistics_interval_secs: u64,

    /// spec §4.2 "buildPrefix... configurable (default 3-6)".
    pub prefix_size: usize,
    /// spec §4.5 "K (default 5) consecutive mutations".
    pub mutation_chain_length: usize,
    /// spec §4.5 "N (default 10) generated instructions".
    pub generative_instruction_count: usize,
    /// spec §4.4 "up to N (default 10) retries".
    pub mutator_max_retries: usize,
    /// spec §4.8 "optional cap"; `None` disables eviction.
    pub corpus_cap: Option<usize>,
    /// spec §4.5 "MultiEngine... switch interval (iterations per engine)".
    pub multi_engine_switch_interval: usize,

    pub engine_path: PathBuf,
    pub engine_args: Vec<String>,
}

impl Default for FuzzerConfig {
    fn default() -> Self {
        Self {
            profile: "minimal".to_string(),
            storage_path: PathBuf::from("./storage"),
            resume: false,
            jobs: 1,
            timeout_ms: 1_000,
            log_level: "info".to_string(),
            instance_type: InstanceType::Root,
            bind_to: None,
            connect_to: None,
            export_statistics: false,
            export_statistics_interval_secs: 30,
            prefix_size: 4,
            mutation_chain_length: ilfuzz_engine::DEFAULT_CHAIN_LENGTH,
            generative_instruction_count: ilfuzz_engine::DEFAULT_GENERATIVE_INSTRUCTIONS,
            mutator_max_retries: ilfuzz_mutate::DEFAULT_MAX_RETRIES,
            corpus_cap: None,
            multi_engine_switch_interval: 100,
            engine_path: PathBuf::new(),
            engine_args: Vec::new(),
        }
    }
}

impl FuzzerConfig {
    pub fn settings_path(&self) -> PathBuf {
        self.storage_path.join(SETTINGS_FILE)
    }

    /// Loads `storagePath/settings.json`, used by `--resume` (spec §6
    /// "settings.json (the fuzzer configuration)").
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| CoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| CoreError::BadSettings(path.to_path_buf(), e))
    }

    pub fn save(&self) -> Result<()> {
        let path = self.settings_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let bytes = serde_json::to_vec_pretty(self).expect("FuzzerConfig serialization is infallible");
        std::fs::write(&path, bytes).map_err(|e| CoreError::Io { path, source: e })
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = FuzzerConfig::default();
        config.storage_path = dir.path().to_path_buf();
        config.jobs = 4;
        config.save().unwrap();

        let loaded = FuzzerConfig::load(&config.settings_path()).unwrap();
        assert_eq!(loaded.jobs, 4);
        assert_eq!(loaded.prefix_size, config.prefix_size);
    }

    #[test]
    fn instance_type_parses_case_insensitively() {
        assert_eq!("ROOT".parse::<InstanceType>().unwrap(), InstanceType::Root);
        assert_eq!("leaf".parse::<InstanceType>().unwrap(), InstanceType::Leaf);
        assert!("bogus".parse::<InstanceType>().is_err());
    }
}
