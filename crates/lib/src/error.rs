use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::dialect::ConversionError;
use crate::sandbox::DocumentError;
use crate::source::ParseError;

/// Errors from the file-level operations of this crate.
#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Parse(#[from] ParseError),

  #[error(transparent)]
  Document(#[from] DocumentError),

  #[error(transparent)]
  Conversion(#[from] ConversionError),

  #[error(transparent)]
  Config(#[from] ConfigError),

  /// A document on disk is not valid source.
  #[error("invalid source in '{path}': {source}")]
  Source {
    path: PathBuf,
    #[source]
    source: ParseError,
  },

  #[error("I/O error on '{path}': {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl Error {
  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Error::Io {
      path: path.into(),
      source,
    }
  }
}
