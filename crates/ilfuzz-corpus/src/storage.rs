//! On-disk corpus and crash persistence (spec §4.8 "Persistence", §6
//! "Persisted state"): one binary file per program under `storagePath/`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ilfuzz_il::format;
use ilfuzz_il::Program;

use crate::entry::CorpusEntry;
use crate::error::{CorpusError, Result};

fn io_err(path: &Path, source: std::io::Error) -> CorpusError {
    CorpusError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Sidecar metadata for every corpus entry, keyed by filename so the
/// program blob itself stays the stable binary format of spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    file: String,
    selected_count: u64,
    inserted_at_tick: u64,
    last_selected_tick: u64,
    deterministic: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Index {
    entries: Vec<IndexEntry>,
}

/// `storagePath/corpus/`: one `<fingerprint>.bin` file per program plus an
/// `index.json` sidecar carrying the weighting/aging metadata spec §4.8
/// requires but the wire format (spec §6) deliberately omits.
pub struct CorpusStorage {
    dir: PathBuf,
}

impl CorpusStorage {
    pub fn new(storage_path: &Path) -> Self {
        Self {
            dir: storage_path.join("corpus"),
        }
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join("index.json")
    }

    fn entry_path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))
    }

    /// Writes one entry's program blob and appends/refreshes its index row.
    /// Called once per successful `Corpus::insert`, so a crash between the
    /// blob write and the index rewrite only loses that one entry on
    /// restart rather than the whole corpus (`load` tolerates a missing
    /// blob for an index row by skipping it).
    pub fn save_entry(&self, entry: &CorpusEntry) -> Result<()> {
        self.ensure_dir()?;
        let file = format!("{:016x}.bin", entry.fingerprint.0);
        let path = self.entry_path(&file);
        fs::write(&path, format::encode(&entry.program)).map_err(|e| io_err(&path, e))?;

        let mut index = self.load_index()?;
        index.entries.retain(|e| e.file != file);
        index.entries.push(IndexEntry {
            file,
            selected_count: entry.selected_count,
            inserted_at_tick: entry.inserted_at_tick,
            last_selected_tick: entry.last_selected_tick,
            deterministic: entry.deterministic,
        });
        self.write_index(&index)
    }

    fn load_index(&self) -> Result<Index> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(Index::default());
        }
        let bytes = fs::read(&path).map_err(|e| io_err(&path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| CorpusError::BadIndex(path, e))
    }

    fn write_index(&self, index: &Index) -> Result<()> {
        let path = self.index_path();
        let bytes = serde_json::to_vec_pretty(index).expect("Index serialization is infallible");
        fs::write(&path, bytes).map_err(|e| io_err(&path, e))
    }

    /// Reloads every entry the index still has a blob for (spec §4.8
    /// "corpus reload on startup"). Entries whose blob is missing or fails
    /// to decode are logged and skipped rather than aborting the reload.
    pub fn load(&self) -> Result<Vec<CorpusEntry>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let index = self.load_index()?;
        let mut entries = Vec::with_capacity(index.entries.len());
        for row in index.entries {
            let path = self.entry_path(&row.file);
            let bytes = match fs::read(&path) {
                Ok(b) => b,
                Err(err) => {
                    tracing::warn!(file = %row.file, error = %err, "corpus blob missing, skipping");
                    continue;
                }
            };
            let program = match format::decode(&bytes) {
                Ok(p) => p,
                Err(err) => {
                    tracing::warn!(file = %row.file, error = %err, "corpus blob failed to decode, skipping");
                    continue;
                }
            };
            entries.push(CorpusEntry {
                fingerprint: program.fingerprint(),
                program,
                selected_count: row.selected_count,
                inserted_at_tick: row.inserted_at_tick,
                last_selected_tick: row.last_selected_tick,
                deterministic: row.deterministic,
            });
        }
        Ok(entries)
    }
}

/// `storagePath/crashes/`: one entry per distinct `(signal, fingerprint)`
/// pair (spec §6 "crashes/ (program + stderr + signal + first-seen
/// timestamp)"; SPEC_FULL §6 "crash deduplication by signature").
pub struct CrashStorage {
    dir: PathBuf,
    seen: std::collections::HashSet<(i32, u64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashMetadata {
    pub signal: i32,
    pub fingerprint: u64,
    pub first_seen_unix_secs: u64,
}

impl CrashStorage {
    pub fn new(storage_path: &Path) -> Self {
        Self {
            dir: storage_path.join("crashes"),
            seen: std::collections::HashSet::new(),
        }
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))
    }

    /// Loads existing crash signatures from disk so a resumed root does not
    /// re-save duplicates it already has (spec §6 "--resume loading its
    /// on-disk corpus and crash directory at startup").
    pub fn load_known_signatures(&mut self) -> Result<()> {
        if !self.dir.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.dir).map_err(|e| io_err(&self.dir, e))? {
            let entry = entry.map_err(|e| io_err(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path).map_err(|e| io_err(&path, e))?;
            if let Ok(meta) = serde_json::from_slice::<CrashMetadata>(&bytes) {
                self.seen.insert((meta.signal, meta.fingerprint));
            }
        }
        Ok(())
    }

    /// Returns `true` if this `(signal, program)` pair was newly recorded,
    /// `false` if it is an exact duplicate of one already on disk
    /// (crash-signature equality dedup; spec §1 Non-goals carve-out).
    pub fn record(&mut self, program: &Program, stderr: &[u8], signal: i32, unix_secs: u64) -> Result<bool> {
        let fingerprint = program.fingerprint().0;
        let key = (signal, fingerprint);
        if self.seen.contains(&key) {
            return Ok(false);
        }
        self.ensure_dir()?;

        let stem = format!("{signal}_{fingerprint:016x}");
        let program_path = self.dir.join(format!("{stem}.bin"));
        let stderr_path = self.dir.join(format!("{stem}.stderr.txt"));
        let meta_path = self.dir.join(format!("{stem}.json"));

        fs::write(&program_path, format::encode(program)).map_err(|e| io_err(&program_path, e))?;
        fs::write(&stderr_path, stderr).map_err(|e| io_err(&stderr_path, e))?;
        let meta = CrashMetadata {
            signal,
            fingerprint,
            first_seen_unix_secs: unix_secs,
        };
        let meta_bytes = serde_json::to_vec_pretty(&meta).expect("CrashMetadata serialization is infallible");
        fs::write(&meta_path, meta_bytes).map_err(|e| io_err(&meta_path, e))?;

        self.seen.insert(key);
        Ok(true)
    }

    pub fn count(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ilfuzz_builder::{BuildMethod, GeneratorRegistry, ProgramBuilder};
    use ilfuzz_il::{Environment, MinimalProfile};
    use rand::SeedableRng;

    fn sample_program() -> Program {
        let mut env = Environment::new();
        env.apply(&MinimalProfile);
        let generators = GeneratorRegistry::default_pool();
        let mut builder = ProgramBuilder::new(&env);
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        builder.build_prefix(4, &mut rng);
        builder.build(5, BuildMethod::Generating, &generators, &mut rng);
        builder.finalize().unwrap()
    }

    #[test]
    fn corpus_entries_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let storage = CorpusStorage::new(dir.path());
        let entry = CorpusEntry::new(sample_program(), 1, true);
        storage.save_entry(&entry).unwrap();

        let loaded = storage.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].program.code(), entry.program.code());
        assert_eq!(loaded[0].deterministic, true);
    }

    #[test]
    fn crash_dedup_rejects_exact_repeat() {
        let dir = tempfile::tempdir().unwrap();
        let mut crashes = CrashStorage::new(dir.path());
        let program = sample_program();
        assert!(crashes.record(&program, b"boom", 11, 1_700_000_000).unwrap());
        assert!(!crashes.record(&program, b"boom again", 11, 1_700_000_001).unwrap());
        assert_eq!(crashes.count(), 1);
    }
}
