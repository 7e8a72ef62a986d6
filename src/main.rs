use clap::{Parser, ValueEnum};
use log::{error, info, warn};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use shm_fifo::{
    mmap, DrainMode, PrivilegedConfig, PrivilegedSide, Region, SharedRegion, StopSignal,
    UnprivilegedConfig, UnprivilegedSide, DEFAULT_CAPACITY,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// One thread alternating a bounded readiness wait with production.
    Multiplexed,
    /// One thread draining on readiness, one producing on an interval.
    Threaded,
}

/// Runs both sides of the shared-memory FIFO in one process and reports
/// traffic and integrity totals.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    #[arg(value_enum)]
    mode: Mode,

    /// Log every read pass.
    #[arg(short = 'r', long)]
    verbose_read: bool,

    /// Log every write round.
    #[arg(short = 'w', long)]
    verbose_write: bool,

    /// Back the channel with a named POSIX shared-memory object
    /// (e.g. "/shm-fifo") instead of an anonymous mapping.
    #[arg(long)]
    shm_name: Option<String>,

    /// How long to run, in seconds.
    #[arg(long, default_value_t = 10)]
    duration: u64,

    /// Stop the unprivileged reader at the first sequence mismatch.
    #[arg(long)]
    halt_on_mismatch: bool,

    /// Drain the return ring against one write-index snapshot per doorbell.
    #[arg(long)]
    snapshot_drain: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> shm_fifo::Result<()> {
    let region: Region<DEFAULT_CAPACITY> = Arc::new(match &args.shm_name {
        Some(name) => SharedRegion::create(name)?,
        None => SharedRegion::anonymous()?,
    });
    info!(
        "{:?} mode, region of {} bytes at {:p}",
        args.mode,
        region.len(),
        region.as_ptr()
    );

    let privileged = PrivilegedSide::start(
        region.clone(),
        PrivilegedConfig {
            drain_mode: if args.snapshot_drain {
                DrainMode::Snapshot
            } else {
                DrainMode::Bytewise
            },
            verbose_read: args.verbose_read,
            verbose_write: args.verbose_write,
            ..Default::default()
        },
    )?;
    let endpoint = privileged.endpoint();
    let side = UnprivilegedSide::new(
        region,
        endpoint.clone(),
        endpoint,
        UnprivilegedConfig {
            halt_on_mismatch: args.halt_on_mismatch,
            verbose_read: args.verbose_read,
            verbose_write: args.verbose_write,
            ..Default::default()
        },
    );

    let stop = StopSignal::new();
    let run_for = Duration::from_secs(args.duration);

    let (stats, outcome) = std::thread::scope(|s| {
        s.spawn(|| {
            if !stop.sleep(run_for) {
                info!("{:?} elapsed, stopping", run_for);
                stop.request();
            }
        });

        let result = match args.mode {
            Mode::Multiplexed => {
                let mut side = side;
                let outcome = side.run_multiplexed(&stop);
                (side.stats(), outcome)
            }
            Mode::Threaded => side.run_threaded(&stop),
        };

        stop.request();
        result
    });

    let privileged_stats = privileged.shutdown();

    if let Some(name) = &args.shm_name {
        if let Err(err) = mmap::unlink(name) {
            warn!("unlink {}: {}", name, err);
        }
    }

    println!("\n\nUnprivileged side:\n{}", stats);
    println!("Privileged side:\n{}", privileged_stats);
    outcome
}
