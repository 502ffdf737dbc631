//! Configuration dialects and conversion between them.
//!
//! Pos documents describe one account with a `strategy_pool`. Coin documents
//! come in two shapes: Coin1 (live, several accounts under `account_config`)
//! and Coin2 (backtest, a top-level `strategy_list`).

mod convert;

use std::fmt;

use crate::source::{self, Module, ParseError};
use crate::value::{Fields, Value};

pub use convert::{ConversionError, convert_coin_to_pos};

/// Dialect family, decided from the source text alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
  Pos,
  Coin,
}

/// A fully classified dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
  Pos,
  Coin1,
  Coin2,
}

impl Dialect {
  pub fn family(self) -> Family {
    match self {
      Dialect::Pos => Family::Pos,
      Dialect::Coin1 | Dialect::Coin2 => Family::Coin,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Dialect::Pos => "pos",
      Dialect::Coin1 => "coin1",
      Dialect::Coin2 => "coin2",
    }
  }
}

impl fmt::Display for Dialect {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl fmt::Display for Family {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Family::Pos => "pos",
      Family::Coin => "coin",
    })
  }
}

/// Pos iff a top-level assignment binds `strategy_pool`.
pub fn detect(text: &str) -> Result<Family, ParseError> {
  Ok(detect_module(&source::parse_module(text)?))
}

pub fn detect_module(module: &Module) -> Family {
  if module.assigned_names().any(|name| name == "strategy_pool") {
    Family::Pos
  } else {
    Family::Coin
  }
}

/// Coin1 iff `account_config` is a non-empty dict.
pub fn classify_coin_subtype(fields: &Fields) -> Dialect {
  match fields.get("account_config") {
    Some(Value::Dict(accounts)) if !accounts.is_empty() => Dialect::Coin1,
    _ => Dialect::Coin2,
  }
}
