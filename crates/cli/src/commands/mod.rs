//! CLI commands module.

use anyhow::{Context, Result};
use clap::Subcommand;
use powchain_chain::ChainConfig;
use std::fs;
use std::path::Path;

mod bench;
mod init;
mod run;

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration file
    Init(init::InitArgs),
    /// Generate transactions and mine blocks
    Run(run::RunArgs),
    /// Measure mining time across difficulties and thread counts
    Bench(bench::BenchArgs),
}

pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Init(args) => init::run(args),
        Commands::Run(args) => run::run(args),
        Commands::Bench(args) => bench::run(args),
    }
}

/// Load a chain configuration, falling back to defaults when no file is given.
pub(crate) fn load_config(path: Option<&Path>) -> Result<ChainConfig> {
    let Some(path) = path else {
        return Ok(ChainConfig::default());
    };

    let contents = fs::read_to_string(path).with_context(|| {
        format!(
            "Failed to read config file: {}. Did you run 'powchain init'?",
            path.display()
        )
    })?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Invalid config file: {}", path.display()))
}

/// A random 20-byte address, hex encoded.
pub(crate) fn random_address() -> String {
    hex::encode(rand::random::<[u8; 20]>())
}
