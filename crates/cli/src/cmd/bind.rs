//! Implementation of the `qronos bind` command.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use qronos_lib::account::bind_strategy;
use qronos_lib::{ConfigDocument, TranspileOptions};

use super::{print_written, read_record};

/// Execute the bind command.
///
/// Loads the strategy document, converts it to Pos if needed, and writes the
/// account file for `name` with its strategy fields. The account's previous
/// strategy fields are replaced.
pub fn cmd_bind(
  name: &str,
  record: &Path,
  strategy: &Path,
  strategy_name: &str,
  dir: &Path,
  options: &TranspileOptions,
) -> Result<()> {
  let incoming = read_record(record)?;
  let doc = ConfigDocument::load(strategy, options)
    .with_context(|| format!("Failed to load strategy: {}", strategy.display()))?;
  debug!(path = %strategy.display(), dialect = %doc.dialect(), "strategy loaded");
  let path = bind_strategy(name, &incoming, doc, strategy_name, dir, options)
    .with_context(|| format!("Failed to bind '{}' to account '{}'", strategy_name, name))?;
  info!(account = name, strategy = strategy_name, path = %path.display(), "strategy bound");
  print_written(&path);
  Ok(())
}
