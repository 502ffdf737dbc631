use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use qronos_lib::TranspileOptions;

mod cmd;

/// qronos - strategy configuration transpiler
#[derive(Parser)]
#[command(name = "qronos")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Options file (JSON). Falls back to $QRONOS_CONFIG, then built-in defaults
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Show the dialect, extraction path and fields of a configuration file
  Inspect {
    /// Path to the configuration file
    file: PathBuf,

    /// Strategy name for Coin documents without backtest_name; shows them converted to Pos
    #[arg(long)]
    name: Option<String>,
  },

  /// Print the canonical Pos source for a configuration file
  Convert {
    /// Path to the configuration file
    file: PathBuf,

    /// Strategy name for Coin documents without backtest_name
    #[arg(long)]
    name: Option<String>,
  },

  /// Write an account file from a JSON record
  Account {
    /// Account name
    name: String,

    /// JSON object with the account fields
    #[arg(long)]
    json: PathBuf,

    /// Directory holding the account files
    #[arg(long)]
    accounts_dir: PathBuf,

    /// Merge with the existing account file instead of replacing it
    #[arg(long)]
    update: bool,
  },

  /// Write an account file running the strategy from a configuration file
  Bind {
    /// Account name
    name: String,

    /// JSON object with the account fields
    #[arg(long)]
    json: PathBuf,

    /// Strategy configuration file (Pos or Coin)
    #[arg(long)]
    strategy: PathBuf,

    /// Name of the strategy to run
    #[arg(long)]
    strategy_name: String,

    /// Directory holding the account files
    #[arg(long)]
    accounts_dir: PathBuf,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "error" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let options = TranspileOptions::resolve(cli.config.as_deref()).context("Failed to load options")?;

  match cli.command {
    Commands::Inspect { file, name } => cmd::cmd_inspect(&file, name.as_deref(), &options),
    Commands::Convert { file, name } => cmd::cmd_convert(&file, name.as_deref(), &options),
    Commands::Account {
      name,
      json,
      accounts_dir,
      update,
    } => cmd::cmd_account(&name, &json, &accounts_dir, update, &options),
    Commands::Bind {
      name,
      json,
      strategy,
      strategy_name,
      accounts_dir,
    } => cmd::cmd_bind(&name, &json, &strategy, &strategy_name, &accounts_dir, &options),
  }
}
