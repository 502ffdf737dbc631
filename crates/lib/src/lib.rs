//! Reading, converting and writing Python-syntax strategy configuration files.
//!
//! Documents come in two families. Pos documents describe a strategy pool
//! directly; Coin documents (in two layouts) name a backtest and a strategy
//! list, and are converted to Pos before use. Fields are extracted by running
//! the document in a mocked sandbox, falling back to evaluating assignments
//! one at a time when execution fails.

pub mod account;
pub mod config;
pub mod consts;
pub mod dialect;
pub mod document;
pub mod error;
pub mod eval;
pub mod merge;
pub mod render;
pub mod sandbox;
pub mod source;
pub mod value;

pub use config::TranspileOptions;
pub use dialect::{Dialect, Family};
pub use document::ConfigDocument;
pub use error::Error;
pub use value::{Dict, Fields, Value};
