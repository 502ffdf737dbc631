//! Account file generation.

use super::{RenderOptions, render_with};
use crate::consts::{DEFAULT_GET_KLINE_NUM, DEFAULT_LEVERAGE, DEFAULT_MIN_KLINE_NUM};
use crate::value::{Dict, Fields, Value};

/// Fields written to an account file, in output order.
///
/// `rebalance_mode` is only written when it is not `None`.
pub const FIELD_ORDER: [&str; 10] = [
  "account_config",
  "strategy_name",
  "get_kline_num",
  "min_kline_num",
  "strategy_config",
  "strategy_pool",
  "leverage",
  "black_list",
  "white_list",
  "rebalance_mode",
];

const RULE: &str =
  "# ====================================================================================================";

const ACCOUNT_BANNER: &[&str] = &[
  "# ** Live account settings **",
  "# Every live account has its own file in the accounts directory.",
  "# The file name is the account name; a leading `_` marks a locked account.",
];

const STRATEGY_BANNER: &[&str] = &[
  "# ** Strategy settings **",
  "# Strategy fields are written by strategy uploads and kept on account updates.",
];

fn trailing_comment(field: &str) -> &'static str {
  match field {
    "account_config" => "live account settings",
    "strategy_name" => "strategy run by this account",
    "get_kline_num" => "number of candles to fetch",
    "min_kline_num" => "minimum number of candles",
    "strategy_config" => "strategy settings",
    "strategy_pool" => "strategy pool",
    "leverage" => "leverage",
    "black_list" => "excluded symbols",
    "white_list" => "allowed symbols",
    "rebalance_mode" => "rebalance mode",
    _ => "",
  }
}

/// Per-account defaults for every field in [`FIELD_ORDER`].
pub fn account_defaults(account_name: &str) -> Fields {
  let mut defaults = Fields::new();
  defaults.insert("account_config".into(), Value::Dict(Dict::new()));
  defaults.insert("strategy_name".into(), Value::str(account_name));
  defaults.insert("get_kline_num".into(), Value::Int(DEFAULT_GET_KLINE_NUM));
  defaults.insert("min_kline_num".into(), Value::Int(DEFAULT_MIN_KLINE_NUM));
  defaults.insert("strategy_config".into(), Value::Dict(Dict::new()));
  defaults.insert("strategy_pool".into(), Value::List(Vec::new()));
  defaults.insert("leverage".into(), Value::Int(DEFAULT_LEVERAGE));
  defaults.insert("black_list".into(), Value::List(Vec::new()));
  defaults.insert("white_list".into(), Value::List(Vec::new()));
  defaults.insert("rebalance_mode".into(), Value::Null);
  defaults
}

/// Generate the canonical account file for `fields`.
///
/// Fields missing from `fields` take their [`account_defaults`] for
/// `account_default_name`. Fields outside [`FIELD_ORDER`] are not written.
pub fn generate_document(fields: &Fields, account_default_name: &str, options: &RenderOptions) -> String {
  let defaults = account_defaults(account_default_name);
  let value_of = |name: &str| fields.get(name).or_else(|| defaults.get(name)).unwrap_or(&Value::Null);

  let mut out = String::new();
  push_banner(&mut out, ACCOUNT_BANNER);
  for field in FIELD_ORDER {
    let value = value_of(field);
    if field == "rebalance_mode" && value.is_null() {
      continue;
    }
    if field == "strategy_name" {
      out.push('\n');
      push_banner(&mut out, STRATEGY_BANNER);
    }
    out.push_str(&format!(
      "{} = {}  # {}\n",
      field,
      render_with(value, options),
      trailing_comment(field)
    ));
  }
  out
}

fn push_banner(out: &mut String, lines: &[&str]) {
  out.push_str(RULE);
  out.push('\n');
  for line in lines {
    out.push_str(line);
    out.push('\n');
  }
  out.push_str(RULE);
  out.push('\n');
}
