//! Convert command integration tests.

use predicates::prelude::*;

use super::common::{COIN2_CONFIG, POS_CONFIG, TestEnv};

#[test]
fn convert_coin_document() {
  let env = TestEnv::new();
  let file = env.write("coin.py", COIN2_CONFIG);

  env
    .qronos_cmd()
    .args(["convert", "--name", "my_strategy"])
    .arg(&file)
    .assert()
    .success()
    .stdout(predicate::str::contains("strategy_name = 'my_strategy'"))
    .stdout(predicate::str::contains("'hold_period': '4H'"))
    .stdout(predicate::str::contains("leverage = 3"))
    .stdout(predicate::str::contains("min_kline_num = 168"));
}

#[test]
fn convert_coin_without_name_fails() {
  let env = TestEnv::new();
  let file = env.write("coin.py", COIN2_CONFIG);

  env
    .qronos_cmd()
    .arg("convert")
    .arg(&file)
    .assert()
    .failure()
    .stderr(predicate::str::contains("missing backtest_name"));
}

#[test]
fn convert_pos_document_is_unchanged() {
  let env = TestEnv::new();
  let file = env.write("pos.py", POS_CONFIG);

  env
    .qronos_cmd()
    .arg("convert")
    .arg(&file)
    .assert()
    .success()
    .stdout(POS_CONFIG);
}

#[test]
fn convert_honors_render_options() {
  let env = TestEnv::new();
  let file = env.write("coin.py", COIN2_CONFIG);
  let options = env.write("options.json", "{\"render\": {\"indent_width\": 2, \"line_width\": 20}}");

  env
    .qronos_cmd()
    .arg("--config")
    .arg(&options)
    .args(["convert", "--name", "s"])
    .arg(&file)
    .assert()
    .success()
    .stdout(predicate::str::contains("strategy_config = {\n  'name': 'FixedRatioStrategy',\n"));
}
