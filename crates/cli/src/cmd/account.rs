//! Implementation of the `qronos account` command.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use qronos_lib::TranspileOptions;
use qronos_lib::account::{UpdateMode, update_account};

use super::{print_written, read_record};

/// Execute the account command.
///
/// # Arguments
///
/// * `name` - Account name; the file is `{name}.py`, or `_{name}.py` when the record sets `is_lock`
/// * `record` - JSON file with the incoming account fields
/// * `dir` - Accounts directory
/// * `update` - Merge with the current account file instead of only the defaults
pub fn cmd_account(name: &str, record: &Path, dir: &Path, update: bool, options: &TranspileOptions) -> Result<()> {
  let incoming = read_record(record)?;
  let mode = if update { UpdateMode::Preserve } else { UpdateMode::Replace };
  let path = update_account(name, &incoming, dir, mode, options)
    .with_context(|| format!("Failed to write account '{}'", name))?;
  info!(account = name, update, path = %path.display(), "account updated");
  print_written(&path);
  Ok(())
}
