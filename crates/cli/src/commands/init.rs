//! Initialize configuration command.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use powchain_chain::ChainConfig;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct InitArgs {
    /// Where to write the configuration
    #[arg(short, long, default_value = "powchain.json")]
    output: PathBuf,

    /// Overwrite an existing file
    #[arg(short, long)]
    force: bool,
}

pub fn run(args: InitArgs) -> Result<()> {
    println!("{}", "Initializing powchain...".bold().cyan());
    println!();

    let config = write_config(&args.output, args.force)?;

    println!(
        "{}  Saved config to: {}",
        "✓".green().bold(),
        args.output.display().to_string().bright_black()
    );
    println!("    Difficulty:   {}", config.mining.difficulty.to_string().bright_cyan());
    println!("    Threads:      {}", config.mining.threads.to_string().bright_cyan());
    println!("    Block reward: {}", config.block_reward.to_string().bright_cyan());
    println!("    Batch size:   {}", config.mempool.batch_size.to_string().bright_cyan());
    println!("    Policy:       {}", config.policy.to_string().bright_cyan());

    println!();
    println!("Next steps:");
    println!(
        "  • Use {} to mine a few blocks",
        format!("powchain run --config {}", args.output.display()).bright_cyan()
    );
    println!(
        "  • Use {} to compare difficulties",
        "powchain bench".bright_cyan()
    );

    Ok(())
}

/// Write the default configuration to `path` and return it.
pub(crate) fn write_config(path: &Path, force: bool) -> Result<ChainConfig> {
    if path.exists() && !force {
        bail!(
            "Config file already exists: {}. Use --force to overwrite it.",
            path.display()
        );
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let config = ChainConfig::default();
    fs::write(path, serde_json::to_string_pretty(&config)?)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(config)
}
