//! Mine a short chain over random transactions.

use super::{load_config, random_address};
use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use powchain_chain::{Blockchain, ChainConfig, ChainError, SelectionPolicy};
use powchain_consensus::{CancelToken, MiningError, MiningReport};
use powchain_core::Transaction;
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Args)]
pub struct RunArgs {
    /// Configuration file written by 'powchain init'
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of blocks to mine after genesis
    #[arg(short, long, default_value = "3")]
    blocks: usize,

    /// Random transactions submitted before each block
    #[arg(short, long, default_value = "8")]
    transactions: usize,

    /// Number of random accounts trading with each other
    #[arg(long, default_value = "4")]
    accounts: usize,

    /// Required leading zero hex digits
    #[arg(short, long)]
    difficulty: Option<u32>,

    /// Worker threads per block
    #[arg(long)]
    threads: Option<usize>,

    /// Give up on a block after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Selection policy: greedy, altruistic, random or address:<addr>
    #[arg(short, long)]
    policy: Option<SelectionPolicy>,

    /// Prefer transactions paying this address
    #[arg(long, conflicts_with = "policy")]
    prefer: Option<String>,

    /// Address credited with block rewards (random if omitted)
    #[arg(short, long)]
    miner: Option<String>,

    /// Print the whole chain as JSON at the end
    #[arg(long)]
    json: bool,
}

pub fn run(args: RunArgs) -> Result<()> {
    if args.accounts < 2 {
        bail!("At least 2 accounts are needed to generate transactions");
    }

    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);
    config
        .mining
        .validate()
        .context("Invalid mining configuration")?;

    let miner = args.miner.clone().unwrap_or_else(random_address);
    let mut accounts: Vec<String> = (0..args.accounts).map(|_| random_address()).collect();
    if let SelectionPolicy::AddressPreference { address } = &config.policy {
        accounts.push(address.clone());
    }

    println!("{}", "Starting powchain...".bold().cyan());
    println!("  Miner:  {}", miner.bright_yellow());
    println!("  Policy: {}", config.policy.to_string().bright_cyan());
    println!();

    let mut chain = Blockchain::new(config).context("Failed to mine genesis block")?;
    println!("{}", chain.tip());
    print_report(chain.last_mining_report());

    let cancel = CancelToken::new();
    let mut rng = rand::thread_rng();
    for _ in 0..args.blocks {
        for _ in 0..args.transactions {
            let tx = random_transaction(&mut rng, &accounts);
            chain
                .submit_transaction(tx)
                .context("Failed to submit transaction")?;
        }
        debug!(
            submitted = args.transactions,
            pending = chain.mempool().len(),
            "submitted random transactions"
        );

        match chain.mine_block(&miner, &cancel) {
            Ok(block) => println!("{}", block),
            Err(ChainError::Mining(MiningError::TimedOut { elapsed })) => {
                warn!(?elapsed, "gave up on block, transactions returned to the pool");
                continue;
            }
            Err(e) => return Err(e).context("Failed to mine block"),
        }
        print_report(chain.last_mining_report());
    }

    let report = chain.validate();
    match &report.failure {
        None => println!(
            "{}  Chain is valid ({} blocks)",
            "✓".green().bold(),
            report.blocks_checked
        ),
        Some(failure) => println!(
            "{}  Chain is invalid at block {}: {}",
            "✗".red().bold(),
            failure.index,
            failure.error
        ),
    }
    println!(
        "  Miner balance:   {}",
        chain.balance(&miner).to_string().bright_cyan()
    );
    println!(
        "  Pending in pool: {}",
        chain.mempool().len().to_string().bright_cyan()
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(chain.blocks())?);
    }

    Ok(())
}

fn apply_overrides(config: &mut ChainConfig, args: &RunArgs) {
    if let Some(difficulty) = args.difficulty {
        config.mining.difficulty = difficulty;
    }
    if let Some(threads) = args.threads {
        config.mining.threads = threads;
    }
    if let Some(ms) = args.timeout_ms {
        config.mining.timeout = Some(Duration::from_millis(ms));
    }
    if let Some(policy) = &args.policy {
        config.policy = policy.clone();
    }
    if let Some(address) = &args.prefer {
        config.policy = SelectionPolicy::AddressPreference {
            address: address.clone(),
        };
    }
}

/// A signed-looking transfer between two distinct accounts.
fn random_transaction(rng: &mut impl Rng, accounts: &[String]) -> Transaction {
    let pair: Vec<&String> = accounts.choose_multiple(rng, 2).collect();
    let amount = rng.gen_range(1..=100);
    let fee = rng.gen_range(0..=10);
    let signature = hex::encode(rng.gen::<[u8; 32]>());
    Transaction::new(pair[0].as_str(), pair[1].as_str(), amount, fee).signed(signature)
}

fn print_report(report: Option<&MiningReport>) {
    if let Some(report) = report {
        println!(
            "{} {:.3?} | {} {} | {} {}",
            "Mining Time:".bold(),
            report.elapsed,
            "Difficulty:".bold(),
            report.difficulty,
            "Threads:".bold(),
            report.threads
        );
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        run: RunArgs,
    }

    fn parse(args: &[&str]) -> RunArgs {
        TestCli::parse_from(std::iter::once("run").chain(args.iter().copied())).run
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let args = parse(&["-d", "2", "--threads", "3", "--timeout-ms", "50", "-p", "altruistic"]);
        let mut config = ChainConfig::default();
        apply_overrides(&mut config, &args);

        assert_eq!(config.mining.difficulty, 2);
        assert_eq!(config.mining.threads, 3);
        assert_eq!(config.mining.timeout, Some(Duration::from_millis(50)));
        assert_eq!(config.policy, SelectionPolicy::Altruistic);
    }

    #[test]
    fn test_prefer_sets_address_policy() {
        let args = parse(&["--prefer", "abc"]);
        let mut config = ChainConfig::default();
        apply_overrides(&mut config, &args);
        assert_eq!(
            config.policy,
            SelectionPolicy::AddressPreference {
                address: "abc".into()
            }
        );
    }

    #[test]
    fn test_no_overrides_keeps_config() {
        let args = parse(&[]);
        let mut config = ChainConfig::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config, ChainConfig::default());
    }

    #[test]
    fn test_random_transaction_uses_distinct_accounts() {
        let accounts = vec!["a".to_string(), "b".to_string()];
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let tx = random_transaction(&mut rng, &accounts);
            assert_ne!(tx.sender, tx.recipient);
            assert!((1..=100).contains(&tx.amount));
            assert!(tx.fee <= 10);
            assert_eq!(tx.signature.len(), 64);
        }
    }
}
