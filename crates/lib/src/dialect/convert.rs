//! Coin to Pos conversion.

use thiserror::Error;
use tracing::info;

use super::{Dialect, classify_coin_subtype};
use crate::consts::{FIXED_HOLD_PERIOD, FIXED_STRATEGY_NAME};
use crate::value::{Dict, Fields, Value};

/// Fields copied from a Coin document when present and not `None`.
const CARRIED_FIELDS: [&str; 6] = [
  "get_kline_num",
  "min_kline_num",
  "leverage",
  "black_list",
  "white_list",
  "rebalance_mode",
];

/// A Coin document lacks what a Pos document needs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
  /// No `backtest_name` in the document and no fallback name given.
  #[error("missing backtest_name")]
  MissingBacktestName,

  /// `strategy_list` is absent or empty.
  #[error("missing strategy_list")]
  MissingStrategyList,

  /// A required field is present but could not be used.
  #[error("invalid {field}: {reason}")]
  InvalidField { field: &'static str, reason: String },
}

/// Rewrite the fields of a Coin document as Pos fields.
///
/// This function:
/// 1. Resolves the strategy name from `backtest_name`, else `fallback_name`
/// 2. Reads `strategy_list` from the first account (Coin1) or the top level (Coin2)
/// 3. Builds a one-entry `strategy_pool` and the fixed-ratio `strategy_config`
/// 4. Carries over the account tunables that are set
///
/// The result also holds `strategy_name`, set to the resolved name.
pub fn convert_coin_to_pos(fields: &Fields, fallback_name: Option<&str>) -> Result<Fields, ConversionError> {
  let name = backtest_name(fields, fallback_name)?;
  let dialect = classify_coin_subtype(fields);
  let strategy_list = strategy_list(fields, dialect)?;

  let mut pool_entry = Dict::new();
  pool_entry.insert(Value::str("name"), Value::str(name.clone()));
  pool_entry.insert(Value::str("strategy_list"), strategy_list);

  let mut strategy_config = Dict::new();
  strategy_config.insert(Value::str("name"), Value::str(FIXED_STRATEGY_NAME));
  strategy_config.insert(Value::str("hold_period"), Value::str(FIXED_HOLD_PERIOD));
  strategy_config.insert(Value::str("cap_ratios"), Value::List(vec![Value::Int(1)]));

  let mut out = Fields::new();
  out.insert("strategy_name".into(), Value::str(name.clone()));
  out.insert("strategy_pool".into(), Value::List(vec![Value::Dict(pool_entry)]));
  out.insert("strategy_config".into(), Value::Dict(strategy_config));
  for field in CARRIED_FIELDS {
    if let Some(value) = fields.get(field).filter(|v| !v.is_null()) {
      out.insert(field.to_string(), value.clone());
    }
  }

  info!(strategy = %name, %dialect, fields = out.len(), "converted coin document");
  Ok(out)
}

fn backtest_name(fields: &Fields, fallback_name: Option<&str>) -> Result<String, ConversionError> {
  match fields.get("backtest_name") {
    Some(Value::Str(name)) if !name.is_empty() => Ok(name.clone()),
    Some(value) if value.is_placeholder() => Err(ConversionError::InvalidField {
      field: "backtest_name",
      reason: format!("could not be evaluated ({})", value),
    }),
    Some(value) if value.is_truthy() => Err(ConversionError::InvalidField {
      field: "backtest_name",
      reason: format!("expected a string, got {}", value.type_name()),
    }),
    _ => match fallback_name.filter(|name| !name.is_empty()) {
      Some(name) => {
        info!(strategy = name, "no backtest_name in document, using fallback name");
        Ok(name.to_string())
      }
      None => Err(ConversionError::MissingBacktestName),
    },
  }
}

fn strategy_list(fields: &Fields, dialect: Dialect) -> Result<Value, ConversionError> {
  let list = match dialect {
    Dialect::Coin1 => fields
      .get("account_config")
      .and_then(Value::as_dict)
      .and_then(Dict::first)
      .and_then(|(_, account)| account.as_dict())
      .and_then(|account| account.get_str("strategy_list")),
    _ => fields.get("strategy_list"),
  };
  match list {
    Some(value) if value.is_placeholder() => Err(ConversionError::InvalidField {
      field: "strategy_list",
      reason: format!("could not be evaluated ({})", value),
    }),
    Some(value) if value.is_truthy() => Ok(value.clone()),
    _ => Err(ConversionError::MissingStrategyList),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn strategies() -> Value {
    let strategy: Dict = [(Value::str("strategy"), Value::str("Strategy_Base"))].into_iter().collect();
    Value::List(vec![Value::Dict(strategy)])
  }

  fn coin2() -> Fields {
    let mut fields = Fields::new();
    fields.insert("backtest_name".into(), Value::str("bt"));
    fields.insert("strategy_list".into(), strategies());
    fields.insert("leverage".into(), Value::Int(2));
    fields.insert("black_list".into(), Value::Null);
    fields
  }

  mod coin2 {
    use super::*;

    #[test]
    fn builds_pool_and_fixed_config() {
      let out = convert_coin_to_pos(&coin2(), None).unwrap();
      let pool = out["strategy_pool"].as_seq().unwrap();
      assert_eq!(pool.len(), 1);
      let entry = pool[0].as_dict().unwrap();
      assert_eq!(entry.get_str("name"), Some(&Value::str("bt")));
      assert_eq!(entry.get_str("strategy_list"), Some(&strategies()));

      let config = out["strategy_config"].as_dict().unwrap();
      assert_eq!(config.get_str("name"), Some(&Value::str("FixedRatioStrategy")));
      assert_eq!(config.get_str("hold_period"), Some(&Value::str("1H")));
      assert_eq!(config.get_str("cap_ratios"), Some(&Value::List(vec![Value::Int(1)])));
      assert_eq!(out["strategy_name"], Value::str("bt"));
    }

    #[test]
    fn carries_only_set_fields() {
      let out = convert_coin_to_pos(&coin2(), None).unwrap();
      assert_eq!(out.get("leverage"), Some(&Value::Int(2)));
      assert!(!out.contains_key("black_list"));
      assert!(!out.contains_key("white_list"));
      assert!(!out.contains_key("backtest_name"));
    }
  }

  mod coin1 {
    use super::*;

    #[test]
    fn strategy_list_comes_from_first_account() {
      let first: Dict = [(Value::str("strategy_list"), strategies())].into_iter().collect();
      let second: Dict = [(Value::str("strategy_list"), Value::List(vec![]))].into_iter().collect();
      let accounts: Dict = [
        (Value::str("main"), Value::Dict(first)),
        (Value::str("spare"), Value::Dict(second)),
      ]
      .into_iter()
      .collect();
      let mut fields = Fields::new();
      fields.insert("account_config".into(), Value::Dict(accounts));
      fields.insert("strategy_list".into(), Value::List(vec![Value::Int(0)]));

      let out = convert_coin_to_pos(&fields, Some("fallback")).unwrap();
      let entry = out["strategy_pool"].as_seq().unwrap()[0].as_dict().unwrap().clone();
      assert_eq!(entry.get_str("name"), Some(&Value::str("fallback")));
      assert_eq!(entry.get_str("strategy_list"), Some(&strategies()));
    }
  }

  mod failures {
    use super::*;

    #[test]
    fn missing_name_without_fallback() {
      let mut fields = coin2();
      fields.remove("backtest_name");
      assert_eq!(convert_coin_to_pos(&fields, None), Err(ConversionError::MissingBacktestName));
      assert_eq!(convert_coin_to_pos(&fields, Some("")), Err(ConversionError::MissingBacktestName));
      assert!(convert_coin_to_pos(&fields, Some("x")).is_ok());
    }

    #[test]
    fn empty_strategy_list() {
      let mut fields = coin2();
      fields.insert("strategy_list".into(), Value::List(vec![]));
      let err = convert_coin_to_pos(&fields, None).unwrap_err();
      assert_eq!(err.to_string(), "missing strategy_list");
    }

    #[test]
    fn unresolved_strategy_list() {
      let mut fields = coin2();
      fields.insert("strategy_list".into(), Value::UnresolvedVariable("base".into()));
      assert!(matches!(
        convert_coin_to_pos(&fields, None),
        Err(ConversionError::InvalidField {
          field: "strategy_list",
          ..
        })
      ));
    }
  }
}
