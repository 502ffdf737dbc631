pub const APP_NAME: &str = "qronos";

/// Environment variable naming a JSON options file.
pub const CONFIG_ENV_VAR: &str = "QRONOS_CONFIG";

/// Extension of account and strategy configuration files.
pub const CONFIG_EXTENSION: &str = "py";

/// Filename prefix marking the locked variant of an account file.
pub const LOCKED_PREFIX: char = '_';

/// Strategy used for every pool produced by coin-to-pos conversion.
pub const FIXED_STRATEGY_NAME: &str = "FixedRatioStrategy";
pub const FIXED_HOLD_PERIOD: &str = "1H";

pub const DEFAULT_GET_KLINE_NUM: i64 = 999;
pub const DEFAULT_MIN_KLINE_NUM: i64 = 168;
pub const DEFAULT_LEVERAGE: i64 = 1;

/// Values the sandbox returns for mocked environment facilities.
pub mod mock {
  pub const CPU_COUNT: i64 = 8;
  pub const ABSPATH: &str = "/mock/absolute/path";
  pub const DIRNAME: &str = "/mock/dir";
  pub const FOLDER_PATH: &str = "/mock/path";
  pub const PATH: &str = "/mock/path";
  pub const FILE: &str = "/mock/config.py";
  pub const GMTOFF: i64 = 28800;
}
