//! Command line driver for the cohort primitives.
//!
//! Environment variables:
//! - RUST_LOG: log filter (default: info)

use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use cohort_sync::{Barrier, BarrierStrategy, ResourceRing};
use rand::Rng;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "cohort-demo", about = "Run a barrier cohort or the dining ring")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a cohort of threads through a reusable barrier several times
    Barrier {
        #[arg(long, value_enum, default_value_t = StrategyArg::Phase)]
        strategy: StrategyArg,
        #[arg(long, default_value_t = 5)]
        participants: usize,
        #[arg(long, default_value_t = 2)]
        rounds: usize,
        /// Upper bound of the random work before each arrival, in milliseconds
        #[arg(long, default_value_t = 500)]
        work_ms: u64,
    },
    /// Run the dining philosophers ring to completion
    Ring {
        #[arg(long, default_value_t = 5)]
        participants: usize,
        #[arg(long, default_value_t = 5)]
        iterations: usize,
        #[arg(long, default_value_t = 300)]
        think_ms: u64,
        #[arg(long, default_value_t = 500)]
        hold_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Phase,
    Turnstile,
}

impl From<StrategyArg> for BarrierStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Phase => BarrierStrategy::Phase,
            StrategyArg::Turnstile => BarrierStrategy::Turnstile,
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_names(true)
                .compact(),
        )
        .init();
}

fn run_barrier(strategy: BarrierStrategy, participants: usize, rounds: usize, work_ms: u64) -> ExitCode {
    let barrier: Arc<dyn Barrier> = match strategy.try_build(participants) {
        Ok(barrier) => Arc::from(barrier),
        Err(err) => {
            error!(%err, "invalid barrier configuration");
            return ExitCode::FAILURE;
        }
    };
    info!(?strategy, participants, rounds, "starting barrier cohort");

    let handles: Vec<_> = (0..participants)
        .map(|participant| {
            let barrier = Arc::clone(&barrier);
            thread::Builder::new()
                .name(format!("member-{participant}"))
                .spawn(move || {
                    let mut rng = rand::rng();
                    for round in 0..rounds {
                        thread::sleep(Duration::from_millis(rng.random_range(0..=work_ms)));
                        info!(participant, round, "arrived");
                        let result = barrier.wait();
                        info!(participant, round, leader = result.is_leader(), "released");
                    }
                })
        })
        .collect();

    let mut failed = false;
    for handle in handles {
        match handle.map(|handle| handle.join()) {
            Ok(Ok(())) => {}
            Ok(Err(_)) => failed = true,
            Err(err) => {
                error!(%err, "failed to spawn cohort member");
                failed = true;
            }
        }
    }
    if failed {
        return ExitCode::FAILURE;
    }

    info!(phase = barrier.phase(), "all rounds complete");
    ExitCode::SUCCESS
}

fn run_ring(participants: usize, iterations: usize, think_ms: u64, hold_ms: u64) -> ExitCode {
    let ring = match ResourceRing::builder()
        .participants(participants)
        .iterations(iterations)
        .think_time(Duration::ZERO, Duration::from_millis(think_ms))
        .hold_time(Duration::ZERO, Duration::from_millis(hold_ms))
        .build()
    {
        Ok(ring) => ring,
        Err(err) => {
            error!(%err, "invalid ring configuration");
            return ExitCode::FAILURE;
        }
    };

    info!(participants, iterations, "starting dining ring, deadlock prevented by resource hierarchy");
    if let Err(err) = ring.run_all() {
        error!(%err, "ring participant failed");
        return ExitCode::FAILURE;
    }
    info!(holds = ring.holds_completed(), "all participants have finished");
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Barrier {
            strategy,
            participants,
            rounds,
            work_ms,
        } => run_barrier(strategy.into(), participants, rounds, work_ms),
        Command::Ring {
            participants,
            iterations,
            think_ms,
            hold_ms,
        } => run_ring(participants, iterations, think_ms, hold_ms),
    }
}
