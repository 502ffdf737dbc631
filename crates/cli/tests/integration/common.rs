//! Shared helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::TempDir;

pub const POS_CONFIG: &str = "\
import os

strategy_name = 'demo_pos'
get_kline_num = 999
strategy_config = {'name': 'FixedRatioStrategy', 'hold_period': '1H', 'cap_ratios': [1]}
strategy_pool = [{'name': 'pool_a', 'strategy_list': [{'strategy': 'Strategy_Base', 'cap_weight': 1}]}]
leverage = os.cpu_count() // 4
black_list = []
white_list = []
";

pub const COIN2_CONFIG: &str = "\
hold_periods = ['1H', '4H']
strategy_list = [{'strategy': 'Strategy_Base', 'hold_period': p} for p in hold_periods]
leverage = 3
";

/// A scratch directory with an accounts subdirectory.
pub struct TestEnv {
  pub temp_dir: TempDir,
  pub accounts_dir: PathBuf,
}

impl TestEnv {
  pub fn new() -> Self {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let accounts_dir = temp_dir.path().join("accounts");
    Self { temp_dir, accounts_dir }
  }

  /// Write `contents` to `name` inside the scratch directory.
  pub fn write(&self, name: &str, contents: &str) -> PathBuf {
    let path = self.temp_dir.path().join(name);
    std::fs::write(&path, contents).expect("Failed to write test file");
    path
  }

  pub fn account_path(&self, file_name: &str) -> PathBuf {
    self.accounts_dir.join(file_name)
  }

  /// The `qronos` binary with logging env cleared and the options file unset.
  pub fn qronos_cmd(&self) -> Command {
    let mut cmd = Command::cargo_bin("qronos").expect("Failed to find qronos binary");
    cmd
      .current_dir(self.temp_dir.path())
      .env_remove("RUST_LOG")
      .env_remove("QRONOS_CONFIG");
    cmd
  }
}

pub fn read(path: &Path) -> String {
  std::fs::read_to_string(path).unwrap_or_else(|err| panic!("Failed to read {}: {}", path.display(), err))
}
