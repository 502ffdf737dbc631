//! Account and bind command integration tests.

use predicates::prelude::*;

use super::common::{COIN2_CONFIG, TestEnv, read};

#[test]
fn account_creates_file_with_defaults() {
  let env = TestEnv::new();
  let record = env.write("record.json", r#"{"leverage": 2, "black_list": ["BTC-USDT"]}"#);

  env
    .qronos_cmd()
    .args(["account", "alice", "--json"])
    .arg(&record)
    .arg("--accounts-dir")
    .arg(&env.accounts_dir)
    .assert()
    .success()
    .stdout(predicate::str::contains("alice.py"));

  let text = read(&env.account_path("alice.py"));
  assert!(text.contains("strategy_name = 'alice'"));
  assert!(text.contains("leverage = 2"));
  assert!(text.contains("black_list = ['BTC-USDT']"));
  assert!(text.contains("get_kline_num = 999"));
}

#[test]
fn account_update_locks_and_keeps_strategy() {
  let env = TestEnv::new();
  let first = env.write("first.json", r#"{"strategy_name": "trend", "leverage": 2}"#);
  let second = env.write("second.json", r#"{"strategy_name": "other", "leverage": 4, "is_lock": true}"#);

  for record in [&first, &second] {
    env
      .qronos_cmd()
      .args(["account", "bob", "--update", "--json"])
      .arg(record)
      .arg("--accounts-dir")
      .arg(&env.accounts_dir)
      .assert()
      .success();
  }

  assert!(!env.account_path("bob.py").exists());
  let text = read(&env.account_path("_bob.py"));
  assert!(text.contains("strategy_name = 'trend'"));
  assert!(text.contains("leverage = 4"));
}

#[test]
fn account_rejects_non_object_record() {
  let env = TestEnv::new();
  let record = env.write("record.json", "[1, 2]");

  env
    .qronos_cmd()
    .args(["account", "carol", "--json"])
    .arg(&record)
    .arg("--accounts-dir")
    .arg(&env.accounts_dir)
    .assert()
    .failure()
    .stderr(predicate::str::contains("not a JSON object"));
}

#[test]
fn bind_coin_strategy() {
  let env = TestEnv::new();
  let record = env.write("record.json", r#"{"leverage": 5}"#);
  let strategy = env.write("strategy.py", COIN2_CONFIG);

  env
    .qronos_cmd()
    .args(["bind", "dave", "--json"])
    .arg(&record)
    .arg("--strategy")
    .arg(&strategy)
    .args(["--strategy-name", "coin_trend", "--accounts-dir"])
    .arg(&env.accounts_dir)
    .assert()
    .success()
    .stdout(predicate::str::contains("dave.py"));

  let text = read(&env.account_path("dave.py"));
  assert!(text.contains("strategy_name = 'coin_trend'"));
  assert!(text.contains("'name': 'coin_trend'"));
  assert!(text.contains("leverage = 5"));
}

#[test]
fn verbose_account_logs_the_written_file() {
  let env = TestEnv::new();
  let record = env.write("record.json", r#"{"leverage": 2}"#);

  env
    .qronos_cmd()
    .args(["--verbose", "account", "ivy", "--json"])
    .arg(&record)
    .arg("--accounts-dir")
    .arg(&env.accounts_dir)
    .assert()
    .success()
    .stderr(predicate::str::contains("record read"))
    .stderr(predicate::str::contains("account updated"));
}
