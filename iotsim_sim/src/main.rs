//! iotsim real-time runner CLI
//!
//! Streams the truths and readings of an assembly to the configured
//! destinations, one tick at a time.

use clap::Parser;
use iotsim_env::TokioContext;
use iotsim_sim::{assembler, RunReport, RunResult, Routes, RunnerConfig, Scheduler};
use std::path::PathBuf;
use tracing::{error, info, warn, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "iotsim-run")]
#[command(about = "Run an IoT signal simulation in real time", long_about = None)]
struct Args {
    /// Assembly definition (YAML)
    assembly_config: PathBuf,

    /// Runner configuration (YAML); defaults apply without one
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of ticks to run (0 = until interrupted)
    #[arg(short, long)]
    ticks: Option<u64>,

    /// Speed factor: >1 faster, <1 slower than real time
    #[arg(short, long)]
    pace: Option<f64>,

    /// Start time: `now` or `YYYY-MM-DD HH:MM:SS`
    #[arg(short = 'b', long)]
    start_time: Option<String>,

    /// Seconds added to the start time
    #[arg(short = 'd', long, allow_hyphen_values = true)]
    start_delta: Option<f64>,

    /// Seed for every random draw
    #[arg(short, long)]
    seed: Option<u64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

async fn run(args: Args) -> RunResult<RunReport> {
    let config = match &args.config {
        Some(path) => RunnerConfig::load_from(path)?,
        None => RunnerConfig::default(),
    }
    .with_ticks(args.ticks)
    .with_pace(args.pace)
    .with_start_time(args.start_time)
    .with_start_delta(args.start_delta)
    .with_seed(args.seed);

    let assembly = assembler::from_path(&args.assembly_config)?;
    let routes = Routes::from_config(&config)?;
    let scheduler = Scheduler::new(TokioContext::shared(), config, routes)?;

    let stop = scheduler.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current tick");
            stop.stop();
        }
    });

    scheduler.run(assembly).await
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // RUST_LOG takes precedence over --verbose
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        std::process::exit(1);
    }

    match run(args).await {
        Ok(report) => {
            info!(
                ticks = report.ticks,
                truths = report.truths_sent,
                readings = report.readings_sent,
                lost = report.readings_lost,
                absent = report.readings_absent,
                skipped = report.skipped,
                sink_failures = report.sink_failures,
                "done"
            );
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
