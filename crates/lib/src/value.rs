//! The value model shared by every stage of the transpiler.
//!
//! A [`Value`] is what any configuration expression reduces to. Besides plain
//! data it has two placeholder variants, [`Value::UnresolvedVariable`] and
//! [`Value::Unparsable`], so a failure stays attached to the one field that
//! produced it instead of aborting the whole document.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value as JsonValue;

/// Field name to value mapping extracted from, or rendered into, a document.
pub type Fields = BTreeMap<String, Value>;

/// An evaluated configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  Str(String),
  /// Order-significant sequence.
  List(Vec<Value>),
  /// Insertion-ordered mapping with unique keys.
  Dict(Dict),
  /// Fixed-arity sequence.
  Tuple(Vec<Value>),
  /// A referenced name that was not in scope.
  UnresolvedVariable(String),
  /// A node that could not be reduced, with the reason.
  Unparsable(String),
}

/// Insertion-ordered mapping keyed by [`Value`].
///
/// Keys compare with [`Value::py_eq`], so `1` and `1.0` address the same
/// entry. Re-inserting an existing key replaces the value in place and keeps
/// the original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dict {
  entries: Vec<(Value, Value)>,
}

impl Dict {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert or replace `key`, returning the previous value if any.
  pub fn insert(&mut self, key: Value, value: Value) -> Option<Value> {
    match self.entries.iter_mut().find(|(k, _)| k.py_eq(&key)) {
      Some((_, slot)) => Some(std::mem::replace(slot, value)),
      None => {
        self.entries.push((key, value));
        None
      }
    }
  }

  pub fn get(&self, key: &Value) -> Option<&Value> {
    self.entries.iter().find(|(k, _)| k.py_eq(key)).map(|(_, v)| v)
  }

  pub fn get_mut(&mut self, key: &Value) -> Option<&mut Value> {
    self.entries.iter_mut().find(|(k, _)| k.py_eq(key)).map(|(_, v)| v)
  }

  /// Look up a string key.
  pub fn get_str(&self, key: &str) -> Option<&Value> {
    self
      .entries
      .iter()
      .find(|(k, _)| matches!(k, Value::Str(s) if s == key))
      .map(|(_, v)| v)
  }

  pub fn contains_key(&self, key: &Value) -> bool {
    self.get(key).is_some()
  }

  /// The first entry in insertion order.
  pub fn first(&self) -> Option<(&Value, &Value)> {
    self.entries.first().map(|(k, v)| (k, v))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
    self.entries.iter().map(|(k, v)| (k, v))
  }

  pub fn keys(&self) -> impl Iterator<Item = &Value> {
    self.entries.iter().map(|(k, _)| k)
  }

  pub fn values(&self) -> impl Iterator<Item = &Value> {
    self.entries.iter().map(|(_, v)| v)
  }
}

impl FromIterator<(Value, Value)> for Dict {
  fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Self {
    let mut dict = Dict::new();
    for (k, v) in iter {
      dict.insert(k, v);
    }
    dict
  }
}

impl IntoIterator for Dict {
  type Item = (Value, Value);
  type IntoIter = std::vec::IntoIter<(Value, Value)>;

  fn into_iter(self) -> Self::IntoIter {
    self.entries.into_iter()
  }
}

impl Value {
  /// Shorthand for a string value.
  pub fn str(s: impl Into<String>) -> Self {
    Value::Str(s.into())
  }

  pub fn unparsable(reason: impl Into<String>) -> Self {
    Value::Unparsable(reason.into())
  }

  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  /// True for `Null` and the empty string.
  pub fn is_blank(&self) -> bool {
    match self {
      Value::Null => true,
      Value::Str(s) => s.is_empty(),
      _ => false,
    }
  }

  /// True if this value itself is a placeholder.
  pub fn is_placeholder(&self) -> bool {
    matches!(self, Value::UnresolvedVariable(_) | Value::Unparsable(_))
  }

  /// True if this value or anything nested inside it is a placeholder.
  pub fn contains_placeholder(&self) -> bool {
    match self {
      Value::UnresolvedVariable(_) | Value::Unparsable(_) => true,
      Value::List(items) | Value::Tuple(items) => items.iter().any(Value::contains_placeholder),
      Value::Dict(dict) => dict
        .iter()
        .any(|(k, v)| k.contains_placeholder() || v.contains_placeholder()),
      _ => false,
    }
  }

  /// Type name as the configuration language spells it.
  pub fn type_name(&self) -> &'static str {
    match self {
      Value::Null => "NoneType",
      Value::Bool(_) => "bool",
      Value::Int(_) => "int",
      Value::Float(_) => "float",
      Value::Str(_) => "str",
      Value::List(_) => "list",
      Value::Dict(_) => "dict",
      Value::Tuple(_) => "tuple",
      Value::UnresolvedVariable(_) => "unresolved variable",
      Value::Unparsable(_) => "unparsable value",
    }
  }

  /// Truthiness with the configuration language's rules.
  ///
  /// Placeholders are never truthy.
  pub fn is_truthy(&self) -> bool {
    match self {
      Value::Null => false,
      Value::Bool(b) => *b,
      Value::Int(i) => *i != 0,
      Value::Float(f) => *f != 0.0,
      Value::Str(s) => !s.is_empty(),
      Value::List(items) | Value::Tuple(items) => !items.is_empty(),
      Value::Dict(dict) => !dict.is_empty(),
      Value::UnresolvedVariable(_) | Value::Unparsable(_) => false,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::Str(s) => Some(s),
      _ => None,
    }
  }

  /// Integer view; `bool` counts as an integer.
  pub fn as_int(&self) -> Option<i64> {
    match self {
      Value::Int(i) => Some(*i),
      Value::Bool(b) => Some(i64::from(*b)),
      _ => None,
    }
  }

  pub fn as_dict(&self) -> Option<&Dict> {
    match self {
      Value::Dict(dict) => Some(dict),
      _ => None,
    }
  }

  /// Element view of a list or tuple.
  pub fn as_seq(&self) -> Option<&[Value]> {
    match self {
      Value::List(items) | Value::Tuple(items) => Some(items),
      _ => None,
    }
  }

  fn as_f64(&self) -> Option<f64> {
    match self {
      Value::Int(i) => Some(*i as f64),
      Value::Bool(b) => Some(f64::from(u8::from(*b))),
      Value::Float(f) => Some(*f),
      _ => None,
    }
  }

  /// Equality with numeric cross-type comparison (`1 == 1.0 == True`).
  pub fn py_eq(&self, other: &Value) -> bool {
    match (self, other) {
      (Value::Null, Value::Null) => true,
      (Value::Str(a), Value::Str(b)) => a == b,
      (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.py_eq(y))
      }
      (Value::Dict(a), Value::Dict(b)) => {
        a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v.py_eq(w)))
      }
      (Value::UnresolvedVariable(a), Value::UnresolvedVariable(b)) => a == b,
      (Value::Unparsable(a), Value::Unparsable(b)) => a == b,
      _ => match (self.as_int(), other.as_int()) {
        (Some(a), Some(b)) => a == b,
        _ => match (self.as_f64(), other.as_f64()) {
          (Some(a), Some(b)) => a == b,
          _ => false,
        },
      },
    }
  }

  /// Ordering where the configuration language defines one.
  pub fn py_cmp(&self, other: &Value) -> Option<Ordering> {
    match (self, other) {
      (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
      (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
        for (x, y) in a.iter().zip(b) {
          if !x.py_eq(y) {
            return x.py_cmp(y);
          }
        }
        Some(a.len().cmp(&b.len()))
      }
      _ => match (self.as_int(), other.as_int()) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
      },
    }
  }

  /// Convert a JSON value from an upstream record.
  ///
  /// Integers that do not fit `i64` become floats; object key order is kept.
  pub fn from_json(json: JsonValue) -> Self {
    match json {
      JsonValue::Null => Value::Null,
      JsonValue::Bool(b) => Value::Bool(b),
      JsonValue::Number(n) => match n.as_i64() {
        Some(i) => Value::Int(i),
        None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
      },
      JsonValue::String(s) => Value::Str(s),
      JsonValue::Array(items) => Value::List(items.into_iter().map(Value::from_json).collect()),
      JsonValue::Object(map) => Value::Dict(
        map
          .into_iter()
          .map(|(k, v)| (Value::Str(k), Value::from_json(v)))
          .collect(),
      ),
    }
  }

  /// JSON view for reporting. Placeholders become marker strings.
  pub fn to_json(&self) -> JsonValue {
    match self {
      Value::Null => JsonValue::Null,
      Value::Bool(b) => JsonValue::Bool(*b),
      Value::Int(i) => JsonValue::from(*i),
      Value::Float(f) => serde_json::Number::from_f64(*f)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(crate::render::format_float(*f))),
      Value::Str(s) => JsonValue::String(s.clone()),
      Value::List(items) | Value::Tuple(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
      Value::Dict(dict) => {
        let mut map = serde_json::Map::new();
        for (k, v) in dict.iter() {
          let key = match k {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
          };
          map.insert(key, v.to_json());
        }
        JsonValue::Object(map)
      }
      Value::UnresolvedVariable(name) => JsonValue::String(format!("<variable:{}>", name)),
      Value::Unparsable(reason) => JsonValue::String(format!("<unparsable: {}>", reason)),
    }
  }
}

/// Convert an upstream JSON object into a field mapping.
///
/// Returns `None` when `json` is not an object.
pub fn fields_from_json(json: JsonValue) -> Option<Fields> {
  match json {
    JsonValue::Object(map) => Some(map.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect()),
    _ => None,
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&crate::render::flat(self))
  }
}

impl From<JsonValue> for Value {
  fn from(json: JsonValue) -> Self {
    Value::from_json(json)
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Value::Bool(b)
  }
}

impl From<i64> for Value {
  fn from(i: i64) -> Self {
    Value::Int(i)
  }
}

impl From<i32> for Value {
  fn from(i: i32) -> Self {
    Value::Int(i64::from(i))
  }
}

impl From<f64> for Value {
  fn from(f: f64) -> Self {
    Value::Float(f)
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Value::Str(s.to_string())
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Value::Str(s)
  }
}

impl From<Vec<Value>> for Value {
  fn from(items: Vec<Value>) -> Self {
    Value::List(items)
  }
}

impl From<Dict> for Value {
  fn from(dict: Dict) -> Self {
    Value::Dict(dict)
  }
}
