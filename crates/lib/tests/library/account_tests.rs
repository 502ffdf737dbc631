//! Account file updates and strategy binding against a scratch directory.

use qronos_lib::account::{UpdateMode, bind_strategy, read_account_fields, update_account, write_account};
use qronos_lib::render::RenderOptions;
use qronos_lib::{ConfigDocument, TranspileOptions, Value};
use serde_json::json;
use tempfile::TempDir;

use super::common::{fixture_path, load_fixture, record};

fn read(path: &std::path::Path) -> qronos_lib::Fields {
  read_account_fields(path, &TranspileOptions::default()).unwrap()
}

mod update {
  use super::*;

  #[test]
  fn lock_toggle_moves_the_file_and_keeps_strategy_fields() {
    let dir = TempDir::new().unwrap();
    let existing = record(json!({
      "strategy_name": "old_strategy",
      "leverage": 2,
      "black_list": ["BTC-USDT"],
    }));
    write_account("alice", &existing, false, dir.path(), &RenderOptions::default()).unwrap();

    let incoming = record(json!({
      "strategy_name": "new_strategy",
      "leverage": 5,
      "black_list": "",
      "is_lock": true,
    }));
    let options = TranspileOptions::default();
    let path = update_account("alice", &incoming, dir.path(), UpdateMode::Preserve, &options).unwrap();

    assert_eq!(path, dir.path().join("_alice.py"));
    assert!(!dir.path().join("alice.py").exists());
    let fields = read(&path);
    assert_eq!(fields["strategy_name"], Value::str("old_strategy"));
    assert_eq!(fields["leverage"], Value::Int(5));
    assert_eq!(fields["black_list"], Value::List(vec![Value::str("BTC-USDT")]));
  }

  #[test]
  fn unlocking_reads_the_locked_file() {
    let dir = TempDir::new().unwrap();
    let existing = record(json!({ "get_kline_num": 500 }));
    write_account("bob", &existing, true, dir.path(), &RenderOptions::default()).unwrap();

    let incoming = record(json!({ "is_lock": 0 }));
    let path = update_account("bob", &incoming, dir.path(), UpdateMode::Preserve, &TranspileOptions::default()).unwrap();

    assert_eq!(path, dir.path().join("bob.py"));
    assert!(!dir.path().join("_bob.py").exists());
    assert_eq!(read(&path)["get_kline_num"], Value::Int(500));
  }

  #[test]
  fn replace_ignores_the_existing_file() {
    let dir = TempDir::new().unwrap();
    let existing = record(json!({ "strategy_name": "old_strategy", "leverage": 3 }));
    write_account("carol", &existing, false, dir.path(), &RenderOptions::default()).unwrap();

    let incoming = record(json!({ "strategy_name": "new_strategy" }));
    let path = update_account("carol", &incoming, dir.path(), UpdateMode::Replace, &TranspileOptions::default()).unwrap();

    let fields = read(&path);
    assert_eq!(fields["strategy_name"], Value::str("new_strategy"));
    assert_eq!(fields["leverage"], Value::Int(1));
  }

  #[test]
  fn new_account_gets_defaults() {
    let dir = TempDir::new().unwrap();
    let path = update_account(
      "dave",
      &record(json!({})),
      dir.path(),
      UpdateMode::Preserve,
      &TranspileOptions::default(),
    )
    .unwrap();

    let fields = read(&path);
    assert_eq!(fields["strategy_name"], Value::str("dave"));
    assert_eq!(fields["get_kline_num"], Value::Int(999));
    assert_eq!(fields["min_kline_num"], Value::Int(168));
    assert!(!fields.contains_key("rebalance_mode"));
  }

  #[test]
  fn coin_account_file_contributes_shared_fields() {
    let dir = TempDir::new().unwrap();
    let text = std::fs::read_to_string(fixture_path("coin2_config.py")).unwrap();
    std::fs::write(dir.path().join("erin.py"), text).unwrap();

    let fields = read(&dir.path().join("erin.py"));
    assert_eq!(fields["leverage"], Value::Int(1));
    assert!(!fields.contains_key("backtest_name"));
    assert!(!fields.contains_key("strategy_list"));
  }
}

mod bind {
  use super::*;

  #[test]
  fn binds_a_coin_strategy() {
    let dir = TempDir::new().unwrap();
    let incoming = record(json!({ "leverage": 3, "strategy_name": "stale" }));
    let strategy = load_fixture("coin2_config.py");

    let path = bind_strategy(
      "frank",
      &incoming,
      strategy,
      "chosen",
      dir.path(),
      &TranspileOptions::default(),
    )
    .unwrap();

    assert_eq!(path, dir.path().join("frank.py"));
    let doc = ConfigDocument::load(&path, &TranspileOptions::default()).unwrap();
    let fields = doc.fields();
    assert_eq!(fields["strategy_name"], Value::str("chosen"));
    assert_eq!(fields["leverage"], Value::Int(3));
    let pool = fields["strategy_pool"].as_seq().unwrap();
    let entry = pool[0].as_dict().unwrap();
    assert_eq!(entry.get_str("name"), Some(&Value::str("coin2_demo")));
  }

  #[test]
  fn replaces_strategy_fields_of_an_existing_account() {
    let dir = TempDir::new().unwrap();
    let existing = record(json!({ "strategy_name": "old_strategy", "rebalance_mode": "daily" }));
    write_account("gina", &existing, false, dir.path(), &RenderOptions::default()).unwrap();

    let strategy = load_fixture("pos_config.py");
    let path = bind_strategy(
      "gina",
      &record(json!({})),
      strategy,
      "demo_pos",
      dir.path(),
      &TranspileOptions::default(),
    )
    .unwrap();

    let fields = read(&path);
    assert_eq!(fields["strategy_name"], Value::str("demo_pos"));
    assert!(!fields.contains_key("rebalance_mode"));
    let pool = fields["strategy_pool"].as_seq().unwrap();
    assert_eq!(pool[0].as_dict().unwrap().get_str("name"), Some(&Value::str("pool_a")));
  }

  #[test]
  fn coin_strategy_without_a_list_is_rejected() {
    let dir = TempDir::new().unwrap();
    let strategy = ConfigDocument::parse("backtest_name = 'x'\n", &TranspileOptions::default()).unwrap();
    let err = bind_strategy(
      "hank",
      &record(json!({})),
      strategy,
      "x",
      dir.path(),
      &TranspileOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "missing strategy_list");
    assert!(!dir.path().join("hank.py").exists());
  }
}
