//! Mining benchmark command.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use powchain_consensus::{BlockMiner, CancelToken, MiningConfig, MAX_DIFFICULTY};
use std::time::Duration;

#[derive(Args)]
pub struct BenchArgs {
    /// Lowest difficulty to measure
    #[arg(long, default_value = "1")]
    min_difficulty: u32,

    /// Highest difficulty to measure
    #[arg(long, default_value = "4")]
    max_difficulty: u32,

    /// Thread counts to compare, comma separated
    #[arg(short, long, value_delimiter = ',', default_value = "1,2,4")]
    threads: Vec<usize>,

    /// Blocks mined per measurement
    #[arg(short, long, default_value = "3")]
    samples: u32,
}

pub fn run(args: BenchArgs) -> Result<()> {
    if args.min_difficulty > args.max_difficulty {
        bail!(
            "min difficulty {} is above max difficulty {}",
            args.min_difficulty,
            args.max_difficulty
        );
    }
    if args.max_difficulty > MAX_DIFFICULTY {
        bail!("max difficulty cannot exceed {}", MAX_DIFFICULTY);
    }
    if args.samples == 0 || args.threads.is_empty() {
        bail!("at least one sample and one thread count are required");
    }

    println!("{}", "Benchmarking proof of work...".bold().cyan());
    println!();
    println!(
        "  {:>10}  {:>7}  {:>12}  {:>8}",
        "Difficulty".bold(),
        "Threads".bold(),
        "Avg time".bold(),
        "Growth".bold()
    );

    let cancel = CancelToken::new();
    for &threads in &args.threads {
        let mut previous: Option<Duration> = None;
        for difficulty in args.min_difficulty..=args.max_difficulty {
            let average = measure(difficulty, threads, args.samples, &cancel)?;
            let growth = match previous {
                Some(prev) if !prev.is_zero() => {
                    format!("x{:.1}", average.as_secs_f64() / prev.as_secs_f64())
                }
                _ => "-".to_string(),
            };
            println!(
                "  {:>10}  {:>7}  {:>12}  {:>8}",
                difficulty,
                threads,
                format!("{:.3?}", average).bright_yellow(),
                growth.bright_black()
            );
            previous = Some(average);
        }
        println!();
    }

    Ok(())
}

/// Average wall-clock time to mine an empty block.
fn measure(
    difficulty: u32,
    threads: usize,
    samples: u32,
    cancel: &CancelToken,
) -> Result<Duration> {
    let miner = BlockMiner::new(MiningConfig::new(difficulty, threads), 0);
    let mut total = Duration::ZERO;
    for _ in 0..samples {
        let mined = miner
            .mine_genesis(cancel)
            .with_context(|| format!("Failed to mine at difficulty {}", difficulty))?;
        total += mined.report.elapsed;
    }
    Ok(total / samples)
}
