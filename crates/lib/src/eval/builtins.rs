//! Builtin functions available to configuration documents.
//!
//! The tree-walking evaluator calls only the allow-listed subset
//! (`dict`, `list`, `range`, `max`, `min`); the sandbox exposes all of them.

use std::cmp::Ordering;

use thiserror::Error;

use super::arith::{self, ArithError};
use crate::render;
use crate::source::BinOp;
use crate::value::{Dict, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
  Dict,
  List,
  Tuple,
  Range,
  Max,
  Min,
  Len,
  Sum,
  Abs,
  Round,
  Int,
  Float,
  Str,
  Bool,
  Print,
  Exit,
}

impl Builtin {
  pub const ALL: [Builtin; 16] = [
    Builtin::Dict,
    Builtin::List,
    Builtin::Tuple,
    Builtin::Range,
    Builtin::Max,
    Builtin::Min,
    Builtin::Len,
    Builtin::Sum,
    Builtin::Abs,
    Builtin::Round,
    Builtin::Int,
    Builtin::Float,
    Builtin::Str,
    Builtin::Bool,
    Builtin::Print,
    Builtin::Exit,
  ];

  pub fn name(self) -> &'static str {
    match self {
      Builtin::Dict => "dict",
      Builtin::List => "list",
      Builtin::Tuple => "tuple",
      Builtin::Range => "range",
      Builtin::Max => "max",
      Builtin::Min => "min",
      Builtin::Len => "len",
      Builtin::Sum => "sum",
      Builtin::Abs => "abs",
      Builtin::Round => "round",
      Builtin::Int => "int",
      Builtin::Float => "float",
      Builtin::Str => "str",
      Builtin::Bool => "bool",
      Builtin::Print => "print",
      Builtin::Exit => "exit",
    }
  }

  /// The allow-listed builtins the tree-walking evaluator reduces directly.
  pub fn from_allow_list(name: &str) -> Option<Self> {
    match name {
      "dict" => Some(Builtin::Dict),
      "list" => Some(Builtin::List),
      "range" => Some(Builtin::Range),
      "max" => Some(Builtin::Max),
      "min" => Some(Builtin::Min),
      _ => None,
    }
  }
}

/// A builtin or method call was given arguments it cannot handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
  #[error("{0}")]
  Invalid(String),

  #[error(transparent)]
  Arith(#[from] ArithError),
}

impl CallError {
  pub(crate) fn invalid(message: impl Into<String>) -> Self {
    CallError::Invalid(message.into())
  }
}

pub type Kwargs = Vec<(String, Value)>;

/// Call `builtin` with already-evaluated arguments.
pub fn call(builtin: Builtin, args: Vec<Value>, kwargs: Kwargs, max_len: usize) -> Result<Value, CallError> {
  let name = builtin.name();
  match builtin {
    Builtin::Dict => build_dict(args, kwargs),
    Builtin::List | Builtin::Tuple => {
      no_kwargs(name, &kwargs)?;
      arity(name, &args, 0, 1)?;
      let items = match args.first() {
        Some(value) => iterate(value)?,
        None => Vec::new(),
      };
      Ok(if builtin == Builtin::List { Value::List(items) } else { Value::Tuple(items) })
    }
    Builtin::Range => {
      no_kwargs(name, &kwargs)?;
      range(&args, max_len)
    }
    Builtin::Max => extreme(name, args, kwargs, Ordering::Greater),
    Builtin::Min => extreme(name, args, kwargs, Ordering::Less),
    Builtin::Len => {
      no_kwargs(name, &kwargs)?;
      arity(name, &args, 1, 1)?;
      let len = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(items) | Value::Tuple(items) => items.len(),
        Value::Dict(dict) => dict.len(),
        other => return Err(CallError::invalid(format!("object of type '{}' has no len()", other.type_name()))),
      };
      Ok(Value::Int(len as i64))
    }
    Builtin::Sum => sum(args, kwargs, max_len),
    Builtin::Abs => {
      no_kwargs(name, &kwargs)?;
      arity(name, &args, 1, 1)?;
      match &args[0] {
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => match other.as_int() {
          Some(i) => i.checked_abs().map(Value::Int).ok_or(CallError::Arith(ArithError::Overflow("abs"))),
          None => Err(CallError::invalid(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
          ))),
        },
      }
    }
    Builtin::Round => round(args, kwargs),
    Builtin::Int => to_int(args, kwargs),
    Builtin::Float => {
      no_kwargs(name, &kwargs)?;
      arity(name, &args, 0, 1)?;
      match args.first() {
        None => Ok(Value::Float(0.0)),
        Some(Value::Float(f)) => Ok(Value::Float(*f)),
        Some(Value::Str(s)) => parse_float(s).map(Value::Float),
        Some(other) => match other.as_int() {
          Some(i) => Ok(Value::Float(i as f64)),
          None => Err(CallError::invalid(format!(
            "float() argument must be a string or a real number, not '{}'",
            other.type_name()
          ))),
        },
      }
    }
    Builtin::Str => {
      no_kwargs(name, &kwargs)?;
      arity(name, &args, 0, 1)?;
      Ok(Value::Str(args.first().map(render::display_str).unwrap_or_default()))
    }
    Builtin::Bool => {
      no_kwargs(name, &kwargs)?;
      arity(name, &args, 0, 1)?;
      Ok(Value::Bool(args.first().is_some_and(Value::is_truthy)))
    }
    Builtin::Print | Builtin::Exit => Ok(Value::Null),
  }
}

/// Elements of an iterable value: list and tuple items, string characters,
/// dict keys.
pub fn iterate(value: &Value) -> Result<Vec<Value>, CallError> {
  match value {
    Value::List(items) | Value::Tuple(items) => Ok(items.clone()),
    Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
    Value::Dict(dict) => Ok(dict.keys().cloned().collect()),
    other => Err(CallError::invalid(format!("'{}' object is not iterable", other.type_name()))),
  }
}

pub(crate) fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), CallError> {
  if args.len() < min {
    return Err(CallError::invalid(format!(
      "{}() expected at least {} argument(s), got {}",
      name,
      min,
      args.len()
    )));
  }
  if args.len() > max {
    return Err(CallError::invalid(format!(
      "{}() expected at most {} argument(s), got {}",
      name,
      max,
      args.len()
    )));
  }
  Ok(())
}

pub(crate) fn no_kwargs(name: &str, kwargs: &Kwargs) -> Result<(), CallError> {
  match kwargs.first() {
    Some((key, _)) => Err(CallError::invalid(format!(
      "{}() got an unexpected keyword argument '{}'",
      name, key
    ))),
    None => Ok(()),
  }
}

fn take_kwarg(kwargs: &mut Kwargs, key: &str) -> Option<Value> {
  let index = kwargs.iter().position(|(k, _)| k == key)?;
  Some(kwargs.remove(index).1)
}

fn build_dict(args: Vec<Value>, kwargs: Kwargs) -> Result<Value, CallError> {
  arity("dict", &args, 0, 1)?;
  let mut dict = match args.into_iter().next() {
    None => Dict::new(),
    Some(Value::Dict(dict)) => dict,
    Some(Value::List(items)) | Some(Value::Tuple(items)) => {
      let mut dict = Dict::new();
      for (i, item) in items.into_iter().enumerate() {
        match item {
          Value::List(pair) | Value::Tuple(pair) if pair.len() == 2 => {
            let mut pair = pair.into_iter();
            if let (Some(k), Some(v)) = (pair.next(), pair.next()) {
              dict.insert(k, v);
            }
          }
          _ => {
            return Err(CallError::invalid(format!(
              "dictionary update sequence element #{} is not a key/value pair",
              i
            )));
          }
        }
      }
      dict
    }
    Some(other) => {
      return Err(CallError::invalid(format!(
        "'{}' object is not iterable",
        other.type_name()
      )));
    }
  };
  for (key, value) in kwargs {
    dict.insert(Value::Str(key), value);
  }
  Ok(Value::Dict(dict))
}

fn int_arg(name: &str, value: &Value) -> Result<i64, CallError> {
  value.as_int().ok_or_else(|| {
    CallError::invalid(format!(
      "{}() argument '{}' object cannot be interpreted as an integer",
      name,
      value.type_name()
    ))
  })
}

fn range(args: &[Value], max_len: usize) -> Result<Value, CallError> {
  arity("range", args, 1, 3)?;
  let ints = args.iter().map(|a| int_arg("range", a)).collect::<Result<Vec<_>, _>>()?;
  let (start, stop, step) = match ints.as_slice() {
    [stop] => (0, *stop, 1),
    [start, stop] => (*start, *stop, 1),
    [start, stop, step] => (*start, *stop, *step),
    _ => return Err(CallError::invalid("range expected at most 3 arguments")),
  };
  if step == 0 {
    return Err(CallError::invalid("range() arg 3 must not be zero"));
  }

  let span = if step > 0 {
    (stop as i128 - start as i128).max(0)
  } else {
    (start as i128 - stop as i128).max(0)
  };
  let step_abs = (step as i128).abs();
  let len = (span + step_abs - 1) / step_abs;
  if len > max_len as i128 {
    return Err(CallError::Arith(ArithError::TooLarge(max_len)));
  }

  Ok(Value::List(
    (0..len as i64).map(|i| Value::Int(start + i * step)).collect(),
  ))
}

fn extreme(name: &str, args: Vec<Value>, mut kwargs: Kwargs, wanted: Ordering) -> Result<Value, CallError> {
  let default = take_kwarg(&mut kwargs, "default");
  if take_kwarg(&mut kwargs, "key").is_some() {
    return Err(CallError::invalid(format!("{}() key functions are not supported", name)));
  }
  no_kwargs(name, &kwargs)?;

  let items = match args.len() {
    0 => {
      return Err(CallError::invalid(format!(
        "{} expected at least 1 argument, got 0",
        name
      )));
    }
    1 => iterate(&args[0])?,
    _ => {
      if default.is_some() {
        return Err(CallError::invalid(format!(
          "Cannot specify a default for {}() with multiple positional arguments",
          name
        )));
      }
      args
    }
  };

  let mut iter = items.into_iter();
  let Some(mut best) = iter.next() else {
    return default.ok_or_else(|| CallError::invalid(format!("{}() arg is an empty sequence", name)));
  };
  for item in iter {
    match item.py_cmp(&best) {
      Some(ordering) if ordering == wanted => best = item,
      Some(_) => {}
      None => {
        return Err(CallError::invalid(format!(
          "'{}' not supported between instances of '{}' and '{}'",
          if wanted == Ordering::Greater { ">" } else { "<" },
          item.type_name(),
          best.type_name()
        )));
      }
    }
  }
  Ok(best)
}

fn sum(args: Vec<Value>, mut kwargs: Kwargs, max_len: usize) -> Result<Value, CallError> {
  let start_kw = take_kwarg(&mut kwargs, "start");
  no_kwargs("sum", &kwargs)?;
  arity("sum", &args, 1, 2)?;
  let mut args = args.into_iter();
  let items = iterate(&args.next().unwrap_or(Value::Null))?;
  let mut total = args.next().or(start_kw).unwrap_or(Value::Int(0));
  if matches!(total, Value::Str(_)) {
    return Err(CallError::invalid("sum() can't sum strings [use ''.join(seq) instead]"));
  }
  for item in items {
    total = arith::binary(BinOp::Add, &total, &item, max_len)?;
  }
  Ok(total)
}

fn round(args: Vec<Value>, mut kwargs: Kwargs) -> Result<Value, CallError> {
  let ndigits_kw = take_kwarg(&mut kwargs, "ndigits");
  no_kwargs("round", &kwargs)?;
  arity("round", &args, 1, 2)?;
  let mut args = args.into_iter();
  let number = args.next().unwrap_or(Value::Null);
  let ndigits = match args.next().or(ndigits_kw) {
    None | Some(Value::Null) => None,
    Some(value) => Some(int_arg("round", &value)?),
  };

  match (&number, ndigits) {
    (Value::Float(f), None) => {
      if !f.is_finite() {
        return Err(CallError::invalid(format!("cannot convert float {} to integer", render::format_float(*f))));
      }
      float_to_int(f.round_ties_even()).map(Value::Int)
    }
    (Value::Float(f), Some(n)) => {
      let factor = 10f64.powi(n.clamp(-308, 308) as i32);
      Ok(Value::Float((f * factor).round_ties_even() / factor))
    }
    (other, ndigits) => match other.as_int() {
      Some(i) => match ndigits {
        Some(n) if n < 0 => {
          let factor = 10i64.checked_pow(n.unsigned_abs().min(19) as u32).unwrap_or(i64::MAX);
          let rounded = (i as f64 / factor as f64).round_ties_even() as i64;
          rounded.checked_mul(factor).map(Value::Int).ok_or(CallError::Arith(ArithError::Overflow("round")))
        }
        _ => Ok(Value::Int(i)),
      },
      None => Err(CallError::invalid(format!(
        "type {} doesn't define __round__ method",
        other.type_name()
      ))),
    },
  }
}

fn float_to_int(f: f64) -> Result<i64, CallError> {
  if f.is_nan() {
    return Err(CallError::invalid("cannot convert float NaN to integer"));
  }
  if f.is_infinite() || f < i64::MIN as f64 || f >= i64::MAX as f64 {
    return Err(CallError::Arith(ArithError::Overflow("int")));
  }
  Ok(f as i64)
}

fn to_int(args: Vec<Value>, mut kwargs: Kwargs) -> Result<Value, CallError> {
  let base_kw = take_kwarg(&mut kwargs, "base");
  no_kwargs("int", &kwargs)?;
  arity("int", &args, 0, 2)?;
  let mut args = args.into_iter();
  let Some(value) = args.next() else {
    return Ok(Value::Int(0));
  };
  let base = match args.next().or(base_kw) {
    Some(base) => Some(int_arg("int", &base)?),
    None => None,
  };

  match (value, base) {
    (Value::Str(s), base) => parse_int(&s, base.unwrap_or(10)).map(Value::Int),
    (_, Some(_)) => Err(CallError::invalid("int() can't convert non-string with explicit base")),
    (Value::Float(f), None) => float_to_int(f.trunc()).map(Value::Int),
    (other, None) => other.as_int().map(Value::Int).ok_or_else(|| {
      CallError::invalid(format!(
        "int() argument must be a string or a real number, not '{}'",
        other.type_name()
      ))
    }),
  }
}

fn parse_int(text: &str, base: i64) -> Result<i64, CallError> {
  let invalid = || CallError::invalid(format!("invalid literal for int() with base {}: {}", base, render::repr_str(text)));
  if !(2..=36).contains(&base) {
    return Err(CallError::invalid("int() base must be >= 2 and <= 36"));
  }
  let trimmed = text.trim();
  let (negative, digits) = match trimmed.strip_prefix('-') {
    Some(rest) => (true, rest),
    None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
  };
  if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
    return Err(invalid());
  }
  let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
  let magnitude = i64::from_str_radix(&cleaned, base as u32).map_err(|_| invalid())?;
  Ok(if negative { -magnitude } else { magnitude })
}

fn parse_float(text: &str) -> Result<f64, CallError> {
  let trimmed = text.trim();
  let lower = trimmed.to_ascii_lowercase();
  let unsigned = lower.trim_start_matches(['+', '-']);
  let negative = lower.starts_with('-');
  let special = match unsigned {
    "inf" | "infinity" => Some(f64::INFINITY),
    "nan" => Some(f64::NAN),
    _ => None,
  };
  if let Some(f) = special {
    return Ok(if negative { -f } else { f });
  }
  trimmed
    .parse::<f64>()
    .map_err(|_| CallError::invalid(format!("could not convert string to float: {}", render::repr_str(text))))
}
