//! PhotonDB allocator tool
//!
//! Inspect slab ladders, print the effective arena configuration and
//! replay synthetic workloads against an arena.
//!
//! # Examples
//!
//! ```bash
//! # Slab sizes between 96 bytes and 1KB
//! photon-malloc ladder --min 96 --max 1024
//!
//! # 100k allocations over three sizes, freeing the oldest every 4th
//! photon-malloc --config arena.toml simulate --allocs 100000 --sizes 96,400,1000 --free-every 4 --metrics
//!
//! # Effective configuration, environment overrides applied
//! PHOTON_MALLOC_ALLOCATOR=fbit photon-malloc config
//! ```

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use photondb_malloc::malloc::{compute_ladder, ArenaConfig};
use photondb_malloc::{error::Error, Arena, ArenaMetrics, Mallocer};
use std::collections::VecDeque;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// PhotonDB fixed-size chunk allocator
#[derive(Parser, Debug)]
#[command(name = "photon-malloc")]
#[command(version = photondb_malloc::VERSION)]
#[command(about = "PhotonDB fixed-size chunk allocator", long_about = None)]
#[command(author = "Anton Feldmann <afeldman@lynqtech.com>")]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Arena configuration file (TOML)
    #[arg(long, global = true, env = "PHOTON_MALLOC_CONFIG")]
    config: Option<PathBuf>,

    /// Log directory path
    #[arg(long, global = true, default_value = "logs", env = "PHOTON_MALLOC_LOG_DIR")]
    log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the slab size ladder
    Ladder(LadderArgs),

    /// Run a synthetic workload and print arena statistics
    Simulate(SimulateArgs),

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Debug)]
struct LadderArgs {
    /// Smallest slab size
    #[arg(long, default_value = "64")]
    min: usize,

    /// Largest slab size
    #[arg(long, default_value = "65536")]
    max: usize,

    /// Print as a JSON array
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Number of allocations
    #[arg(long, default_value = "10000")]
    allocs: usize,

    /// Request sizes, used round robin
    #[arg(long, value_delimiter = ',', default_value = "96,256,1024")]
    sizes: Vec<usize>,

    /// Free the oldest live chunk after every K allocations (0 never frees)
    #[arg(long, default_value = "0")]
    free_every: usize,

    /// Also print the Prometheus text exposition
    #[arg(long)]
    metrics: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli)?;

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Ladder(args) => ladder_command(args),
        Commands::Simulate(args) => simulate_command(config, args),
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    std::fs::create_dir_all(&cli.log_dir)?;

    let file_appender =
        RollingFileAppender::new(Rotation::DAILY, &cli.log_dir, "photon-malloc.log");

    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    // Console logs go to stderr so command output stays machine readable.
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!cli.no_color)
                .pretty(),
        )
        .with(fmt::layer().with_writer(file_appender).with_ansi(false))
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<ArenaConfig> {
    match &cli.config {
        Some(path) => {
            info!("Loading arena config from {:?}", path);
            ArenaConfig::load(path)
                .with_context(|| format!("loading arena config {}", path.display()))
        }
        None => Ok(ArenaConfig::from_env()),
    }
}

fn ladder_command(args: LadderArgs) -> anyhow::Result<()> {
    let slabs = compute_ladder(args.min, args.max)?;

    if args.json {
        println!("{}", serde_json::to_string(&slabs)?);
        return Ok(());
    }

    println!("{:>5}  {:>10}  {:>8}", "index", "size", "step");
    let mut prev = None;
    for (index, size) in slabs.iter().enumerate() {
        let step = prev.map_or(0, |p| size - p);
        println!("{:>5}  {:>10}  {:>8}", index, size, step);
        prev = Some(*size);
    }
    println!("{} slab sizes", slabs.len());

    Ok(())
}

fn simulate_command(config: ArenaConfig, args: SimulateArgs) -> anyhow::Result<()> {
    if args.sizes.is_empty() {
        anyhow::bail!("--sizes needs at least one size");
    }

    let mut arena = Arena::new(config)?;
    let mut live = VecDeque::new();
    let mut done = 0;

    for i in 0..args.allocs {
        let size = args.sizes[i % args.sizes.len()];
        match arena.alloc(size) {
            Ok(chunk) => live.push_back(chunk),
            Err(e @ Error::OutOfMemory { .. }) => {
                warn!("Stopping after {} allocations: {}", i, e);
                break;
            }
            Err(e) => return Err(e.into()),
        }
        done += 1;

        if args.free_every > 0 && done % args.free_every == 0 {
            if let Some(chunk) = live.pop_front() {
                arena.pool_mut(chunk.pool())?.free(chunk)?;
            }
        }
    }
    info!(allocations = done, live = live.len(), "Simulation finished");

    println!("{}", serde_json::to_string_pretty(&arena.stats())?);

    if args.metrics {
        let metrics = ArenaMetrics::new()?;
        metrics.observe(&arena);
        print!("{}", metrics.encode()?);
    }

    arena.release();
    Ok(())
}
