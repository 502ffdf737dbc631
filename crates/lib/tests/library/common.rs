//! Shared test helpers for library integration tests.

use std::path::PathBuf;

use qronos_lib::{ConfigDocument, Fields, TranspileOptions, value::fields_from_json};

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Load a fixture document with default options.
pub fn load_fixture(name: &str) -> ConfigDocument {
  ConfigDocument::load(&fixture_path(name), &TranspileOptions::default())
    .unwrap_or_else(|err| panic!("failed to load fixture {}: {}", name, err))
}

/// Build a record from a JSON object literal.
pub fn record(json: serde_json::Value) -> Fields {
  fields_from_json(json).expect("record must be a JSON object")
}
