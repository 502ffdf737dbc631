mod account;
mod bind;
mod convert;
mod inspect;

use std::path::Path;

use anyhow::{Context, Result, bail};
use owo_colors::{OwoColorize, Stream};
use tracing::debug;

use qronos_lib::Fields;
use qronos_lib::value::fields_from_json;

pub use account::cmd_account;
pub use bind::cmd_bind;
pub use convert::cmd_convert;
pub use inspect::cmd_inspect;

/// Read a JSON object from `path` as a record of fields.
fn read_record(path: &Path) -> Result<Fields> {
  let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read record: {}", path.display()))?;
  let json: serde_json::Value =
    serde_json::from_str(&text).with_context(|| format!("Failed to parse record: {}", path.display()))?;
  match fields_from_json(json) {
    Some(fields) => {
      debug!(path = %path.display(), fields = fields.len(), "record read");
      Ok(fields)
    }
    None => bail!("Record is not a JSON object: {}", path.display()),
  }
}

/// Print the path of a written account file.
fn print_written(path: &Path) {
  let shown = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
  println!(
    "{} Wrote {}",
    "::".if_supports_color(Stream::Stdout, |t| t.green()),
    shown.display()
  );
}

/// Warn on stderr about fields that could not be fully evaluated.
fn warn_placeholders<'a>(fields: impl Iterator<Item = &'a str>) {
  for field in fields {
    eprintln!(
      "{} field '{}' could not be fully evaluated",
      "!".if_supports_color(Stream::Stderr, |t| t.yellow()),
      field
    );
  }
}
