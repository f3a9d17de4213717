//! Searches key ranges from a JSON file for keys matching their targets.

use {
    clap::Parser,
    keysweep::{
        CoordinatorBuilder,
        DEFAULT_BLOCK_SIZE,
        IdentifierFormat,
        Secp256k1Deriver,
        SearchResult,
        StartMode,
        StopReason,
        StopSignal,
        load_ranges,
    },
    signal_hook::{
        consts::signal::{SIGINT, SIGTERM},
        iterator::Signals,
    },
    std::{path::PathBuf, process::ExitCode, thread, time::Duration},
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, prelude::*},
};

#[derive(Parser, Debug)]
#[command(name = "keysweep")]
#[command(about = "Search key ranges for private keys matching target identifiers")]
struct Args {
    /// JSON file with the key ranges and their targets.
    #[arg(long, default_value = "ranges.json")]
    ranges: PathBuf,

    /// Number of search workers, defaults to one per CPU.
    #[arg(long)]
    workers: Option<usize>,

    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: u64,

    /// Seconds between range rotations.
    #[arg(long, default_value = "60")]
    rotation_secs: u64,

    /// Seconds between progress reports, 0 disables them.
    #[arg(long, default_value = "10")]
    report_secs: u64,

    /// Discard the progress journal instead of resuming from it.
    #[arg(long)]
    fresh: bool,

    #[arg(long, default_value = "progress.dat")]
    journal: PathBuf,

    /// File that found keys are appended to.
    #[arg(long, default_value = "found_keys.txt")]
    output: PathBuf,

    /// Identifier format targets are given in: uncompressed, compressed or
    /// p2pkh.
    #[arg(long, default_value = "uncompressed")]
    format: IdentifierFormat,

    /// Seed for block placement and rotation order.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> SearchResult<()> {
    let ranges = load_ranges(&args.ranges)?;
    info!(path = %args.ranges.display(), ranges = ranges.len(), "loaded key ranges");

    let mut builder = CoordinatorBuilder::new(ranges, Secp256k1Deriver::new(args.format))
        .block_size(args.block_size)
        .rotation_period(Duration::from_secs(args.rotation_secs))
        .report_interval(Duration::from_secs(args.report_secs))
        .start_mode(if args.fresh {
            StartMode::Fresh
        } else {
            StartMode::Resume
        })
        .journal_path(args.journal)
        .result_path(&args.output);
    if let Some(workers) = args.workers {
        builder = builder.workers(workers);
    }
    if let Some(seed) = args.seed {
        builder = builder.seed(seed);
    }
    let coordinator = builder.build()?;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();
    let watcher = spawn_signal_watcher(signals, coordinator.stop_signal());

    let summary = coordinator.run();
    handle.close();
    if watcher.join().is_err() {
        warn!("signal watcher panicked");
    }
    let summary = summary?;

    match &summary.found {
        Some(found) => info!(
            private_key = %found.private_key_hex(),
            output = %args.output.display(),
            "match written"
        ),
        None => info!(reason = %summary.reason, "no match found"),
    }
    Ok(())
}

fn spawn_signal_watcher(mut signals: Signals, stop: StopSignal) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for signal in signals.forever() {
            info!(signal, "shutdown requested");
            stop.trigger(StopReason::Shutdown);
        }
    })
}
