use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::filter::EnvFilter;

use ilfuzz_core::{CoreError, DebugLifter, Fuzzer, FuzzerConfig, InstanceType};
use ilfuzz_il::{MinimalProfile, Profile};

/// Coverage-guided JavaScript engine fuzzer (spec §6 "External Interfaces").
#[derive(Parser, Debug)]
#[command(name = "ilfuzz", version, about)]
struct Cli {
    /// Engine binary to fuzz.
    engine: PathBuf,

    /// Arguments passed through to the engine binary on every invocation.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    engine_args: Vec<String>,

    /// Environment/builtin profile to fuzz against.
    #[arg(long, default_value = "minimal")]
    profile: String,

    /// Directory holding corpus/, crashes/, settings.json, stats.json.
    #[arg(long = "storagePath", default_value = "./storage")]
    storage_path: PathBuf,

    /// Reload settings, corpus, and crash archive from storagePath before starting.
    #[arg(long)]
    resume: bool,

    /// Number of REPRL executor slots (independent child processes).
    #[arg(long, default_value_t = 1)]
    jobs: usize,

    /// Per-execution timeout in milliseconds before the child is reset.
    #[arg(long, default_value_t = 1_000)]
    timeout: u64,

    /// `tracing` log level (error, warn, info, debug, trace).
    #[arg(long = "logLevel", default_value = "info")]
    log_level: String,

    /// This node's role in the sync tree: root, intermediate, or leaf.
    #[arg(long = "instanceType", default_value = "root")]
    instance_type: String,

    /// Address to accept sync children on (root/intermediate).
    #[arg(long = "bindTo")]
    bind_to: Option<SocketAddr>,

    /// Address of the sync parent to connect to (intermediate/leaf).
    #[arg(long = "connectTo")]
    connect_to: Option<SocketAddr>,

    /// Periodically write storagePath/stats.json and forward it upward.
    #[arg(long = "exportStatistics")]
    export_statistics: bool,

    /// Interval in seconds between statistics exports.
    #[arg(long, default_value_t = 30)]
    export_statistics_interval: u64,
}

fn resolve_profile(name: &str) -> Result<Box<dyn Profile>> {
    match name {
        "minimal" => Ok(Box::new(MinimalProfile)),
        other => bail!("unknown --profile {other:?} (available: minimal)"),
    }
}

fn build_config(cli: &Cli) -> Result<FuzzerConfig> {
    let instance_type: InstanceType = cli
        .instance_type
        .parse()
        .map_err(|e: CoreError| anyhow::anyhow!(e))?;

    if matches!(instance_type, InstanceType::Intermediate | InstanceType::Leaf) && cli.connect_to.is_none() {
        bail!("--instanceType={} requires --connectTo", cli.instance_type);
    }
    if matches!(instance_type, InstanceType::Root | InstanceType::Intermediate) && cli.bind_to.is_none() {
        tracing::warn!("no --bindTo given; this node will not accept sync children");
    }

    let mut config = FuzzerConfig::default();
    config.profile = cli.profile.clone();
    config.storage_path = cli.storage_path.clone();
    config.resume = cli.resume;
    config.jobs = cli.jobs;
    config.timeout_ms = cli.timeout;
    config.log_level = cli.log_level.clone();
    config.instance_type = instance_type;
    config.bind_to = cli.bind_to;
    config.connect_to = cli.connect_to;
    config.export_statistics = cli.export_statistics;
    config.export_statistics_interval_secs = cli.export_statistics_interval;
    config.engine_path = cli.engine.clone();
    config.engine_args = cli.engine_args.clone();
    Ok(config)
}

static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigint(_signum: libc::c_int) {
    STOP_REQUESTED.store(true, Ordering::SeqCst);
}

fn install_signal_handler() {
    // SAFETY: `handle_sigint` only touches a static atomic, which is
    // signal-safe; this registers it once at startup before any other
    // thread exists.
    unsafe {
        libc::signal(libc::SIGINT, handle_sigint as usize);
        libc::signal(libc::SIGTERM, handle_sigint as usize);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = if cli.resume {
        let settings_path = cli.storage_path.join(ilfuzz_core::SETTINGS_FILE);
        if settings_path.exists() {
            let mut loaded = FuzzerConfig::load(&settings_path).map_err(anyhow::Error::from)?;
            // CLI flags always win over what was persisted, so a resumed
            // run can still change --jobs/--timeout/--instanceType/etc.
            loaded.resume = true;
            loaded.jobs = cli.jobs;
            loaded.timeout_ms = cli.timeout;
            loaded.export_statistics = cli.export_statistics;
            loaded.engine_path = cli.engine.clone();
            loaded.engine_args = cli.engine_args.clone();
            loaded
        } else {
            build_config(&cli)?
        }
    } else {
        build_config(&cli)?
    };

    let profile = resolve_profile(&config.profile)?;
    let lifter: Arc<dyn ilfuzz_core::Lifter> = Arc::new(DebugLifter);

    let mut fuzzer = Fuzzer::new(config, profile.as_ref(), lifter).context("failed to initialize fuzzer")?;

    if cli.resume {
        fuzzer.resume().context("failed to resume from storagePath")?;
    }

    install_signal_handler();
    tracing::info!(corpus = fuzzer.corpus_len(), crashes = fuzzer.crash_count(), "fuzzer starting");

    fuzzer.run(|| STOP_REQUESTED.load(Ordering::SeqCst))?;

    tracing::info!("fuzzer shut down cleanly");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            let is_spawn_failure = err
                .chain()
                .any(|cause| matches!(cause.downcast_ref::<CoreError>(), Some(CoreError::EngineSpawn(_))));
            ExitCode::from(if is_spawn_failure { 2 } else { 1 })
        }
    }
}
