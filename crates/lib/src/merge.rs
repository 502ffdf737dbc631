//! Field merge between an incoming record and an existing account file.
//!
//! Strategy fields are owned by strategy uploads, so an existing value wins
//! over an incoming one. Account and other fields take the incoming value
//! unless it is blank.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::value::{Fields, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldClass {
  Strategy,
  Account,
  Other,
}

/// Which field names belong to which [`FieldClass`].
///
/// Names in neither list are [`FieldClass::Other`]. A name in both lists is a
/// strategy field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldPolicy {
  pub strategy: Vec<String>,
  pub account: Vec<String>,
}

impl Default for FieldPolicy {
  fn default() -> Self {
    let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
    Self {
      strategy: names(&["strategy_name", "strategy_config", "strategy_pool", "rebalance_mode"]),
      account: names(&[
        "account_config",
        "get_kline_num",
        "leverage",
        "black_list",
        "white_list",
        "min_kline_num",
      ]),
    }
  }
}

impl FieldPolicy {
  pub fn class_of(&self, name: &str) -> FieldClass {
    if self.strategy.iter().any(|s| s == name) {
      FieldClass::Strategy
    } else if self.account.iter().any(|s| s == name) {
      FieldClass::Account
    } else {
      FieldClass::Other
    }
  }
}

/// Resolve every field named in any of the three maps.
///
/// # Arguments
/// * `incoming` - The newly supplied record
/// * `existing` - Fields read back from the current account file
/// * `defaults` - Per-account fallbacks
/// * `policy` - Field classification
pub fn merge(incoming: &Fields, existing: &Fields, defaults: &Fields, policy: &FieldPolicy) -> Fields {
  let names: BTreeSet<&String> = incoming.keys().chain(existing.keys()).chain(defaults.keys()).collect();
  names
    .into_iter()
    .map(|name| {
      let value = resolve(name, incoming, existing, defaults, policy.class_of(name));
      (name.clone(), value)
    })
    .collect()
}

fn resolve(name: &str, incoming: &Fields, existing: &Fields, defaults: &Fields, class: FieldClass) -> Value {
  let default = || defaults.get(name).cloned().unwrap_or(Value::Null);
  match class {
    FieldClass::Strategy => existing
      .get(name)
      .filter(|v| !v.is_null())
      .or_else(|| incoming.get(name).filter(|v| !v.is_null()))
      .cloned()
      .unwrap_or_else(default),
    FieldClass::Account | FieldClass::Other => incoming
      .get(name)
      .filter(|v| !v.is_blank())
      .or_else(|| existing.get(name))
      .cloned()
      .unwrap_or_else(default),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn fields(pairs: &[(&str, Value)]) -> Fields {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
  }

  mod strategy_fields {
    use super::*;

    #[test]
    fn existing_wins_over_incoming() {
      let incoming = fields(&[("strategy_name", Value::str("new"))]);
      let existing = fields(&[("strategy_name", Value::str("old"))]);
      let merged = merge(&incoming, &existing, &Fields::new(), &FieldPolicy::default());
      assert_eq!(merged["strategy_name"], Value::str("old"));
    }

    #[test]
    fn incoming_fills_a_null_existing() {
      let incoming = fields(&[("strategy_pool", Value::List(vec![Value::Int(1)]))]);
      let existing = fields(&[("strategy_pool", Value::Null)]);
      let merged = merge(&incoming, &existing, &Fields::new(), &FieldPolicy::default());
      assert_eq!(merged["strategy_pool"], Value::List(vec![Value::Int(1)]));
    }

    #[test]
    fn default_when_neither_is_set() {
      let defaults = fields(&[("strategy_name", Value::str("alice"))]);
      let incoming = fields(&[("strategy_name", Value::Null)]);
      let merged = merge(&incoming, &Fields::new(), &defaults, &FieldPolicy::default());
      assert_eq!(merged["strategy_name"], Value::str("alice"));
    }
  }

  mod account_fields {
    use super::*;

    #[test]
    fn incoming_wins_unless_blank() {
      let existing = fields(&[("leverage", Value::Int(3)), ("black_list", Value::List(vec![]))]);
      let incoming = fields(&[("leverage", Value::Int(5)), ("black_list", Value::str(""))]);
      let merged = merge(&incoming, &existing, &Fields::new(), &FieldPolicy::default());
      assert_eq!(merged["leverage"], Value::Int(5));
      assert_eq!(merged["black_list"], Value::List(vec![]));
    }

    #[test]
    fn falsy_but_not_blank_values_are_kept() {
      let existing = fields(&[("leverage", Value::Int(3))]);
      let incoming = fields(&[("leverage", Value::Int(0))]);
      let merged = merge(&incoming, &existing, &Fields::new(), &FieldPolicy::default());
      assert_eq!(merged["leverage"], Value::Int(0));
    }

    #[test]
    fn existing_null_is_kept_over_default() {
      let existing = fields(&[("white_list", Value::Null)]);
      let defaults = fields(&[("white_list", Value::List(vec![]))]);
      let merged = merge(&Fields::new(), &existing, &defaults, &FieldPolicy::default());
      assert_eq!(merged["white_list"], Value::Null);
    }
  }

  #[test]
  fn every_named_field_is_resolved() {
    let merged = merge(
      &fields(&[("a", Value::Int(1))]),
      &fields(&[("b", Value::Int(2))]),
      &fields(&[("c", Value::Int(3))]),
      &FieldPolicy::default(),
    );
    assert_eq!(merged.keys().collect::<Vec<_>>(), ["a", "b", "c"]);
  }

  #[test]
  fn alternate_policy() {
    let policy = FieldPolicy {
      strategy: vec!["leverage".into()],
      account: Vec::new(),
    };
    let merged = merge(
      &fields(&[("leverage", Value::Int(5))]),
      &fields(&[("leverage", Value::Int(3))]),
      &Fields::new(),
      &policy,
    );
    assert_eq!(merged["leverage"], Value::Int(3));
    assert_eq!(policy.class_of("strategy_name"), FieldClass::Other);
  }
}
