//! Account files in an accounts directory.
//!
//! Each account has one live file, `{name}.py`, or `_{name}.py` while the
//! account is locked. Writing one variant removes the other once the new file
//! is fully in place; if a crash leaves both behind, the variant matching the
//! requested lock state wins.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::TranspileOptions;
use crate::consts::{CONFIG_EXTENSION, LOCKED_PREFIX};
use crate::dialect::Dialect;
use crate::document::{ConfigDocument, POS_KEYS};
use crate::error::Error;
use crate::merge::merge;
use crate::render::{RenderOptions, account_defaults, generate_document};
use crate::value::{Fields, Value};

/// Whether existing account fields take part in an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
  /// Merge with the fields of the current live file.
  Preserve,
  /// Ignore the current file; merge only against defaults.
  Replace,
}

pub fn account_file_name(name: &str, is_locked: bool) -> String {
  if is_locked {
    format!("{}{}.{}", LOCKED_PREFIX, name, CONFIG_EXTENSION)
  } else {
    format!("{}.{}", name, CONFIG_EXTENSION)
  }
}

/// The live file for `name`: the `is_locked` variant if present, else the
/// other one.
pub fn live_account_file(name: &str, dir: &Path, is_locked: bool) -> Option<PathBuf> {
  [is_locked, !is_locked]
    .into_iter()
    .map(|locked| dir.join(account_file_name(name, locked)))
    .find(|path| path.is_file())
}

/// Fields assigned in the account file at `path`.
///
/// A missing file has no fields. Coin documents contribute only the account
/// tunables they share with Pos documents.
pub fn read_account_fields(path: &Path, options: &TranspileOptions) -> Result<Fields, Error> {
  if !path.exists() {
    return Ok(Fields::new());
  }
  let doc = ConfigDocument::load(path, options)?;
  let mut fields = doc.assigned_fields();
  if doc.dialect() != Dialect::Pos {
    fields.retain(|name, _| POS_KEYS.contains(&name.as_str()));
  }
  debug!(path = %path.display(), fields = fields.len(), "read account file");
  Ok(fields)
}

/// Generate and write the account file for `name`.
///
/// The text goes to a temporary file in `dir` that is renamed over the
/// target; only then is the other lock variant removed.
pub fn write_account(
  name: &str,
  fields: &Fields,
  is_locked: bool,
  dir: &Path,
  render: &RenderOptions,
) -> Result<PathBuf, Error> {
  std::fs::create_dir_all(dir).map_err(|source| Error::io(dir, source))?;
  let target = dir.join(account_file_name(name, is_locked));
  let sibling = dir.join(account_file_name(name, !is_locked));
  let text = generate_document(fields, name, render);

  let mut tmp = NamedTempFile::new_in(dir).map_err(|source| Error::io(dir, source))?;
  tmp
    .write_all(text.as_bytes())
    .map_err(|source| Error::io(tmp.path(), source))?;
  tmp.persist(&target).map_err(|err| Error::io(&target, err.error))?;
  info!(path = %target.display(), "wrote account file");

  if sibling.exists() {
    std::fs::remove_file(&sibling).map_err(|source| Error::io(&sibling, source))?;
    info!(path = %sibling.display(), "removed previous account file");
  }
  Ok(target)
}

/// Merge `incoming` into the account file for `name` and write it.
///
/// The lock state comes from the truthiness of `incoming["is_lock"]`. In
/// [`UpdateMode::Preserve`] the current live file, whichever variant it is,
/// is read before anything is written.
pub fn update_account(
  name: &str,
  incoming: &Fields,
  dir: &Path,
  mode: UpdateMode,
  options: &TranspileOptions,
) -> Result<PathBuf, Error> {
  let is_locked = incoming.get("is_lock").is_some_and(Value::is_truthy);
  let existing = match (mode, live_account_file(name, dir, is_locked)) {
    (UpdateMode::Preserve, Some(path)) => read_account_fields(&path, options)?,
    _ => Fields::new(),
  };
  let merged = merge(incoming, &existing, &account_defaults(name), &options.policy);
  write_account(name, &merged, is_locked, dir, &options.render)
}

/// Write the account file for `name` running the strategy from `strategy_doc`.
///
/// The strategy fields of the (converted) document replace those of
/// `incoming`, and `strategy_name` is set to `strategy_name`. Existing
/// account fields are not kept.
pub fn bind_strategy(
  name: &str,
  incoming: &Fields,
  strategy_doc: ConfigDocument,
  strategy_name: &str,
  dir: &Path,
  options: &TranspileOptions,
) -> Result<PathBuf, Error> {
  let strategy = strategy_doc.into_pos(Some(strategy_name))?.into_fields();
  let mut record = incoming.clone();
  record.insert("strategy_name".into(), Value::str(strategy_name));
  for field in ["strategy_config", "strategy_pool", "rebalance_mode"] {
    record.insert(field.into(), strategy.get(field).cloned().unwrap_or(Value::Null));
  }
  info!(account = name, strategy = strategy_name, "binding strategy to account");
  update_account(name, &record, dir, UpdateMode::Replace, options)
}
