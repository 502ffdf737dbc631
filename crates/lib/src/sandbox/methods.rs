//! Methods of the data types: `str`, `list`, `tuple` and `dict`.

use super::format::format_template;
use crate::eval::builtins::{CallError, Kwargs, arity, iterate, no_kwargs};
use crate::value::{Dict, Value};

const STR_METHODS: &[&str] = &[
  "format",
  "upper",
  "lower",
  "strip",
  "lstrip",
  "rstrip",
  "replace",
  "split",
  "join",
  "startswith",
  "endswith",
  "index",
  "count",
];
const LIST_METHODS: &[&str] = &["copy", "index", "count", "append", "extend", "insert"];
const TUPLE_METHODS: &[&str] = &["index", "count"];
const DICT_METHODS: &[&str] = &["get", "keys", "values", "items", "copy", "update"];

/// Methods that change their receiver in place and return `None`.
pub(crate) const MUTATORS: &[&str] = &["append", "extend", "insert", "update"];

pub(crate) fn has_method(value: &Value, name: &str) -> bool {
  let table = match value {
    Value::Str(_) => STR_METHODS,
    Value::List(_) => LIST_METHODS,
    Value::Tuple(_) => TUPLE_METHODS,
    Value::Dict(_) => DICT_METHODS,
    _ => return false,
  };
  table.contains(&name)
}

pub(crate) fn is_mutator(name: &str) -> bool {
  MUTATORS.contains(&name)
}

/// Call a method on a receiver that is not bound to a name.
///
/// Mutators act on a copy and return `None`.
pub(crate) fn call(receiver: &Value, name: &str, args: Vec<Value>, kwargs: Kwargs, max_len: usize) -> Result<Value, CallError> {
  if is_mutator(name) {
    let mut copy = receiver.clone();
    mutate(&mut copy, name, args, kwargs, max_len)?;
    return Ok(Value::Null);
  }
  match receiver {
    Value::Str(s) => str_method(s, name, args, kwargs, max_len),
    Value::List(items) | Value::Tuple(items) => seq_method(receiver, items, name, args, kwargs),
    Value::Dict(dict) => dict_method(dict, name, args, kwargs),
    other => Err(no_attribute(other, name)),
  }
}

/// Apply an in-place mutator to `target`.
pub(crate) fn mutate(target: &mut Value, name: &str, args: Vec<Value>, kwargs: Kwargs, max_len: usize) -> Result<(), CallError> {
  let qualified = format!("{}.{}", target.type_name(), name);
  match (target, name) {
    (Value::List(items), "append") => {
      no_kwargs(&qualified, &kwargs)?;
      arity(&qualified, &args, 1, 1)?;
      check_len(items.len() + 1, max_len)?;
      items.extend(args);
    }
    (Value::List(items), "extend") => {
      no_kwargs(&qualified, &kwargs)?;
      arity(&qualified, &args, 1, 1)?;
      let more = iterate(&args[0])?;
      check_len(items.len() + more.len(), max_len)?;
      items.extend(more);
    }
    (Value::List(items), "insert") => {
      no_kwargs(&qualified, &kwargs)?;
      arity(&qualified, &args, 2, 2)?;
      check_len(items.len() + 1, max_len)?;
      let mut args = args.into_iter();
      let index = args.next().and_then(|v| v.as_int()).ok_or_else(|| {
        CallError::invalid("list.insert() index must be an integer")
      })?;
      let len = items.len() as i64;
      let at = if index < 0 { (len + index).max(0) } else { index.min(len) };
      items.insert(at as usize, args.next().unwrap_or(Value::Null));
    }
    (Value::Dict(dict), "update") => {
      arity(&qualified, &args, 0, 1)?;
      if let Some(other) = args.into_iter().next() {
        for (k, v) in pairs_of(other)? {
          dict.insert(k, v);
        }
      }
      for (k, v) in kwargs {
        dict.insert(Value::Str(k), v);
      }
      check_len(dict.len(), max_len)?;
    }
    (other, _) => return Err(no_attribute(other, name)),
  }
  Ok(())
}

fn check_len(len: usize, max_len: usize) -> Result<(), CallError> {
  if len > max_len {
    return Err(CallError::Arith(crate::eval::arith::ArithError::TooLarge(max_len)));
  }
  Ok(())
}

fn no_attribute(value: &Value, name: &str) -> CallError {
  CallError::invalid(format!("'{}' object has no attribute '{}'", value.type_name(), name))
}

fn pairs_of(value: Value) -> Result<Vec<(Value, Value)>, CallError> {
  match value {
    Value::Dict(dict) => Ok(dict.into_iter().collect()),
    other => iterate(&other)?
      .into_iter()
      .map(|pair| match pair.as_seq() {
        Some([k, v]) => Ok((k.clone(), v.clone())),
        _ => Err(CallError::invalid("dictionary update sequence element has wrong length")),
      })
      .collect(),
  }
}

fn str_arg<'v>(method: &str, value: &'v Value) -> Result<&'v str, CallError> {
  value.as_str().ok_or_else(|| {
    CallError::invalid(format!(
      "str.{}() argument must be str, not '{}'",
      method,
      value.type_name()
    ))
  })
}

fn optional_chars<'v>(method: &str, args: &'v [Value]) -> Result<Option<&'v str>, CallError> {
  match args.first() {
    None | Some(Value::Null) => Ok(None),
    Some(value) => str_arg(method, value).map(Some),
  }
}

fn str_method(s: &str, name: &str, args: Vec<Value>, kwargs: Kwargs, max_len: usize) -> Result<Value, CallError> {
  let qualified = format!("str.{}", name);
  if name == "format" {
    return format_template(s, &args, &kwargs, max_len).map(Value::Str);
  }
  no_kwargs(&qualified, &kwargs)?;
  Ok(match name {
    "upper" => {
      arity(&qualified, &args, 0, 0)?;
      Value::str(s.to_uppercase())
    }
    "lower" => {
      arity(&qualified, &args, 0, 0)?;
      Value::str(s.to_lowercase())
    }
    "strip" | "lstrip" | "rstrip" => {
      arity(&qualified, &args, 0, 1)?;
      let chars = optional_chars(name, &args)?;
      let matches = |c: char| match chars {
        Some(set) => set.contains(c),
        None => c.is_whitespace(),
      };
      Value::str(match name {
        "strip" => s.trim_matches(matches),
        "lstrip" => s.trim_start_matches(matches),
        _ => s.trim_end_matches(matches),
      })
    }
    "replace" => {
      arity(&qualified, &args, 2, 3)?;
      let from = str_arg(name, &args[0])?;
      let to = str_arg(name, &args[1])?;
      match args.get(2).and_then(Value::as_int) {
        Some(count) if count >= 0 => Value::str(s.replacen(from, to, count as usize)),
        _ => Value::str(s.replace(from, to)),
      }
    }
    "split" => {
      arity(&qualified, &args, 0, 2)?;
      let limit = args.get(1).and_then(Value::as_int).filter(|n| *n >= 0);
      let parts: Vec<&str> = match (optional_chars(name, &args)?, limit) {
        (Some(""), _) => return Err(CallError::invalid("empty separator")),
        (Some(sep), Some(n)) => s.splitn(n as usize + 1, sep).collect(),
        (Some(sep), None) => s.split(sep).collect(),
        (None, limit) => split_whitespace(s, limit),
      };
      Value::List(parts.into_iter().map(Value::str).collect())
    }
    "join" => {
      arity(&qualified, &args, 1, 1)?;
      let parts = iterate(&args[0])?
        .iter()
        .map(|item| str_arg(name, item).map(str::to_string))
        .collect::<Result<Vec<_>, _>>()?;
      Value::str(parts.join(s))
    }
    "startswith" | "endswith" => {
      arity(&qualified, &args, 1, 1)?;
      let candidates: Vec<Value> = match &args[0] {
        Value::Tuple(items) => items.clone(),
        other => vec![other.clone()],
      };
      let mut hit = false;
      for candidate in &candidates {
        let affix = str_arg(name, candidate)?;
        hit |= if name == "startswith" { s.starts_with(affix) } else { s.ends_with(affix) };
      }
      Value::Bool(hit)
    }
    "index" => {
      arity(&qualified, &args, 1, 1)?;
      let needle = str_arg(name, &args[0])?;
      match s.find(needle) {
        Some(byte) => Value::Int(s[..byte].chars().count() as i64),
        None => return Err(CallError::invalid("substring not found")),
      }
    }
    "count" => {
      arity(&qualified, &args, 1, 1)?;
      let needle = str_arg(name, &args[0])?;
      let count = if needle.is_empty() { s.chars().count() + 1 } else { s.matches(needle).count() };
      Value::Int(count as i64)
    }
    _ => return Err(no_attribute(&Value::str(s), name)),
  })
}

fn split_whitespace(s: &str, limit: Option<i64>) -> Vec<&str> {
  let Some(limit) = limit else {
    return s.split_whitespace().collect();
  };
  let mut parts = Vec::new();
  let mut rest = s.trim_start();
  while !rest.is_empty() {
    if parts.len() as i64 == limit {
      parts.push(rest);
      break;
    }
    match rest.find(char::is_whitespace) {
      Some(end) => {
        parts.push(&rest[..end]);
        rest = rest[end..].trim_start();
      }
      None => {
        parts.push(rest);
        break;
      }
    }
  }
  parts
}

fn seq_method(receiver: &Value, items: &[Value], name: &str, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, CallError> {
  let qualified = format!("{}.{}", receiver.type_name(), name);
  no_kwargs(&qualified, &kwargs)?;
  match name {
    "copy" if matches!(receiver, Value::List(_)) => {
      arity(&qualified, &args, 0, 0)?;
      Ok(Value::List(items.to_vec()))
    }
    "index" => {
      arity(&qualified, &args, 1, 1)?;
      items
        .iter()
        .position(|item| item.py_eq(&args[0]))
        .map(|i| Value::Int(i as i64))
        .ok_or_else(|| CallError::invalid(format!("{}.index(x): x not in {}", receiver.type_name(), receiver.type_name())))
    }
    "count" => {
      arity(&qualified, &args, 1, 1)?;
      Ok(Value::Int(items.iter().filter(|item| item.py_eq(&args[0])).count() as i64))
    }
    _ => Err(no_attribute(receiver, name)),
  }
}

fn dict_method(dict: &Dict, name: &str, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, CallError> {
  let qualified = format!("dict.{}", name);
  no_kwargs(&qualified, &kwargs)?;
  Ok(match name {
    "get" => {
      arity(&qualified, &args, 1, 2)?;
      match dict.get(&args[0]) {
        Some(value) => value.clone(),
        None => args.get(1).cloned().unwrap_or(Value::Null),
      }
    }
    "keys" => {
      arity(&qualified, &args, 0, 0)?;
      Value::List(dict.keys().cloned().collect())
    }
    "values" => {
      arity(&qualified, &args, 0, 0)?;
      Value::List(dict.values().cloned().collect())
    }
    "items" => {
      arity(&qualified, &args, 0, 0)?;
      Value::List(
        dict
          .iter()
          .map(|(k, v)| Value::Tuple(vec![k.clone(), v.clone()]))
          .collect(),
      )
    }
    "copy" => {
      arity(&qualified, &args, 0, 0)?;
      Value::Dict(dict.clone())
    }
    _ => return Err(no_attribute(&Value::Dict(dict.clone()), name)),
  })
}
