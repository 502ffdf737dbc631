//! Implementation of the `qronos inspect` command.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use qronos_lib::document::ExtractionPath;
use qronos_lib::{ConfigDocument, Family, TranspileOptions, Value};

use super::warn_placeholders;

/// Execute the inspect command.
///
/// Prints the document family and dialect, how its fields were extracted, and
/// the fields as pretty-printed JSON. With `name`, Coin documents are shown
/// after conversion to Pos, using `name` when `backtest_name` is missing.
pub fn cmd_inspect(file: &Path, name: Option<&str>, options: &TranspileOptions) -> Result<()> {
  let mut doc = ConfigDocument::load(file, options).with_context(|| format!("Failed to load: {}", file.display()))?;
  let dialect = doc.dialect();
  debug!(path = %file.display(), dialect = %dialect, "document loaded");
  if name.is_some() && dialect.family() == Family::Coin {
    info!(dialect = %dialect, "showing the document converted to pos");
    doc = doc
      .into_pos(name)
      .with_context(|| format!("Failed to convert: {}", file.display()))?;
  }

  println!("Family: {}", dialect.family());
  println!("Dialect: {}", dialect);
  match doc.extraction() {
    ExtractionPath::Executed => println!("Extraction: executed"),
    ExtractionPath::NodeWalk { reason } => println!("Extraction: node-walk ({})", reason),
  }
  warn_placeholders(doc.placeholder_fields());

  let json: serde_json::Map<String, serde_json::Value> = doc
    .fields()
    .iter()
    .map(|(field, value)| (field.clone(), Value::to_json(value)))
    .collect();
  let text = serde_json::to_string_pretty(&json).context("Failed to serialize fields")?;
  println!("{}", text);
  Ok(())
}
