//! Options simulator CLI binary.
//!
//! # Commands
//!
//! - `run` - Run a simulation against an in-memory ledger
//! - `init-nonces` - Create (or reset) a shared nonce region file
//! - `show-nonces` - Print the entries of a nonce region file
//! - `fingerprint` - Print the SHA-256 fingerprint of a configuration

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use options_sim_core::{
    ledger::InMemoryLedger,
    nonce::{FileRegion, InMemoryRegion, NonceCoordinator, NonceError, NonceRegion},
    orchestrator::{config_fingerprint, new_run_id, EpochLog, Orchestrator},
    SimulationConfig,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "options-sim")]
#[command(version)]
#[command(about = "Agent-based options market simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation
    Run {
        /// TOML configuration (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Stop after this many epochs
        #[arg(short, long)]
        epochs: Option<u64>,

        /// Override the configured seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Append one tab-separated row per epoch to this file
        #[arg(short, long)]
        log: Option<PathBuf>,

        /// Log filter when RUST_LOG is unset
        #[arg(long, default_value = "info")]
        log_level: String,
    },

    /// Create a shared nonce region file, clearing any stale lock
    InitNonces {
        /// Region file path
        path: PathBuf,
    },

    /// Print the entries of a nonce region file
    ShowNonces {
        /// Region file path
        path: PathBuf,
    },

    /// Print the configuration fingerprint
    Fingerprint {
        /// TOML configuration (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            epochs,
            seed,
            log,
            log_level,
        } => cmd_run(config, epochs, seed, log, &log_level),

        Commands::InitNonces { path } => cmd_init_nonces(&path),

        Commands::ShowNonces { path } => cmd_show_nonces(&path),

        Commands::Fingerprint { config } => cmd_fingerprint(config),
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<SimulationConfig> {
    match path {
        Some(path) => SimulationConfig::from_file(&path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(SimulationConfig::default()),
    }
}

fn cmd_run(
    config: Option<PathBuf>,
    epochs: Option<u64>,
    seed: Option<u64>,
    log: Option<PathBuf>,
    log_level: &str,
) -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let mut config = load_config(config)?;
    if let Some(seed) = seed {
        config.seed = seed;
    }
    let max_epochs = epochs.or(config.max_epochs);

    info!(
        run_id = %new_run_id(),
        fingerprint = %config_fingerprint(&config)?,
        seed = config.seed,
        "starting run"
    );

    let ledger = Arc::new(InMemoryLedger::deploy(config.ledger_setup()?));
    let deployment = ledger.deployment().clone();

    let region: Arc<dyn NonceRegion> = match &config.nonce_region {
        Some(path) => match FileRegion::open(path) {
            Ok(region) => Arc::new(region),
            Err(NonceError::NotInitialised(path)) => anyhow::bail!(
                "nonce region {} missing; run `options-sim init-nonces {}` first",
                path.display(),
                path.display()
            ),
            Err(e) => return Err(e.into()),
        },
        None => Arc::new(InMemoryRegion::new()),
    };

    let pricing = config.pricing.build();
    let mut sim = Orchestrator::new(config, ledger, deployment, region, pricing)?;
    sim.bootstrap()?;

    let summary = match log {
        Some(path) => {
            let mut log = EpochLog::append(&path)
                .with_context(|| format!("opening log {}", path.display()))?;
            sim.run_with_log(max_epochs, &mut log)?
        }
        None => sim.run(max_epochs)?,
    };

    println!(
        "epochs: {} ({} failed)  attempted: {}  succeeded: {}  failed: {}",
        summary.epochs, summary.failed_epochs, summary.attempted, summary.succeeded, summary.failed
    );
    Ok(())
}

fn cmd_init_nonces(path: &Path) -> anyhow::Result<()> {
    FileRegion::initialize(path)
        .with_context(|| format!("initializing nonce region {}", path.display()))?;
    println!("initialized {}", path.display());
    Ok(())
}

fn cmd_show_nonces(path: &Path) -> anyhow::Result<()> {
    let nonces = NonceCoordinator::new(Arc::new(FileRegion::open(path)?));
    println!("#account\tnext_sequence\tlast_seen_block");
    for (account, entry) in nonces.entries()? {
        println!(
            "{}\t{}\t{}",
            account, entry.next_sequence, entry.last_seen_block
        );
    }
    Ok(())
}

fn cmd_fingerprint(config: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    println!("{}", config_fingerprint(&config)?);
    Ok(())
}
