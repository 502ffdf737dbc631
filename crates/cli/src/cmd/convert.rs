//! Implementation of the `qronos convert` command.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use qronos_lib::{ConfigDocument, TranspileOptions};

use super::warn_placeholders;

/// Execute the convert command.
///
/// Prints the canonical Pos source for `file`. Pos documents are printed as
/// they are; Coin documents are converted, with `name` standing in for a
/// missing `backtest_name`.
pub fn cmd_convert(file: &Path, name: Option<&str>, options: &TranspileOptions) -> Result<()> {
  let doc = ConfigDocument::load(file, options).with_context(|| format!("Failed to load: {}", file.display()))?;
  debug!(path = %file.display(), dialect = %doc.dialect(), "document loaded");
  let pos = doc
    .into_pos(name)
    .with_context(|| format!("Failed to convert: {}", file.display()))?;
  warn_placeholders(pos.placeholder_fields());
  print!("{}", pos.raw_text());
  Ok(())
}
