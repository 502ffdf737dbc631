//! Inspect command integration tests.

use predicates::prelude::*;

use super::common::{COIN2_CONFIG, POS_CONFIG, TestEnv};

#[test]
fn inspect_pos_document() {
  let env = TestEnv::new();
  let file = env.write("pos.py", POS_CONFIG);

  env
    .qronos_cmd()
    .arg("inspect")
    .arg(&file)
    .assert()
    .success()
    .stdout(predicate::str::contains("Dialect: pos"))
    .stdout(predicate::str::contains("Extraction: executed"))
    .stdout(predicate::str::contains("\"leverage\": 2"));
}

#[test]
fn inspect_coin_document_as_pos() {
  let env = TestEnv::new();
  let file = env.write("coin.py", COIN2_CONFIG);

  env
    .qronos_cmd()
    .args(["inspect", "--name", "fallback"])
    .arg(&file)
    .assert()
    .success()
    .stdout(predicate::str::contains("Dialect: coin2"))
    .stdout(predicate::str::contains("\"strategy_name\": \"fallback\""))
    .stdout(predicate::str::contains("FixedRatioStrategy"));
}

#[test]
fn inspect_reports_node_walk_and_placeholders() {
  let env = TestEnv::new();
  let file = env.write("partial.py", "strategy_pool = []\nleverage = base_leverage\n");

  env
    .qronos_cmd()
    .arg("inspect")
    .arg(&file)
    .assert()
    .success()
    .stdout(predicate::str::contains("Extraction: node-walk"))
    .stderr(predicate::str::contains("field 'leverage' could not be fully evaluated"));
}

#[test]
fn inspect_rejects_invalid_source() {
  let env = TestEnv::new();
  let file = env.write("broken.py", "strategy_pool = [\n");

  env
    .qronos_cmd()
    .arg("inspect")
    .arg(&file)
    .assert()
    .failure()
    .stderr(predicate::str::contains("broken.py"));
}

#[test]
fn inspect_missing_file() {
  let env = TestEnv::new();

  env
    .qronos_cmd()
    .args(["inspect", "does_not_exist.py"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to load"));
}

#[test]
fn invalid_options_file() {
  let env = TestEnv::new();
  let file = env.write("pos.py", POS_CONFIG);
  let options = env.write("options.json", "{\"sandbox\": {\"timeout\": \"soon\"}}");

  env
    .qronos_cmd()
    .arg("--config")
    .arg(&options)
    .arg("inspect")
    .arg(&file)
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to load options"));
}

#[test]
fn verbose_flag_logs_to_stderr() {
  let env = TestEnv::new();
  let file = env.write("pos.py", POS_CONFIG);

  env
    .qronos_cmd()
    .args(["-v", "inspect"])
    .arg(&file)
    .assert()
    .success()
    .stderr(predicate::str::contains("document loaded"))
    .stderr(predicate::str::contains("pos.py"));

  env
    .qronos_cmd()
    .arg("inspect")
    .arg(&file)
    .assert()
    .success()
    .stderr(predicate::str::contains("document loaded").not());
}
