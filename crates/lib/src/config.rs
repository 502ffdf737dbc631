//! Transpiler options.
//!
//! Every knob has a default, so an options file only needs the keys it
//! changes:
//!
//! ```json
//! {
//!   "sandbox": { "timeout": "500ms", "max_depth": 32 },
//!   "render": { "indent_width": 2 },
//!   "policy": { "strategy": ["strategy_name", "strategy_pool"] }
//! }
//! ```
//!
//! [`TranspileOptions::resolve`] looks for the file at an explicit path first,
//! then at the path named by [`CONFIG_ENV_VAR`], and falls back to defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::CONFIG_ENV_VAR;
use crate::merge::FieldPolicy;
use crate::render::RenderOptions;
use crate::sandbox::SandboxLimits;

/// Options shared by every pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranspileOptions {
  pub sandbox: SandboxLimits,
  pub render: RenderOptions,
  pub policy: FieldPolicy,
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read options file '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid options file '{path}': {source}")]
  Invalid {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

impl TranspileOptions {
  pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(text)
  }

  /// Load options from a JSON file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let options = Self::from_json_str(&text).map_err(|source| ConfigError::Invalid {
      path: path.to_path_buf(),
      source,
    })?;
    debug!(path = %path.display(), "loaded transpile options");
    Ok(options)
  }

  /// Resolve options from `explicit`, then the environment, then defaults.
  pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
    if let Some(path) = explicit {
      return Self::load(path);
    }
    match std::env::var_os(CONFIG_ENV_VAR) {
      Some(path) if !path.is_empty() => Self::load(Path::new(&path)),
      _ => Ok(Self::default()),
    }
  }
}

/// `serde` adapter for durations written as humantime strings (`"2s"`, `"750ms"`).
pub(crate) mod humantime_duration {
  use std::time::Duration;

  use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

  pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(&text).map_err(D::Error::custom)
  }
}
