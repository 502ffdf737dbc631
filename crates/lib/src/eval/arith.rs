//! Binary arithmetic with the configuration language's numeric rules.
//!
//! Shared by the tree-walking evaluator and the sandbox so both agree on
//! promotion: an `Int` meets a `Float` as a `Float`, `/` always yields a
//! `Float`, `//` and `%` round toward negative infinity, and `bool` acts as an
//! integer.

use thiserror::Error;

use crate::source::BinOp;
use crate::value::{Dict, Value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArithError {
  #[error("division by zero")]
  DivisionByZero,

  #[error("integer overflow in '{0}'")]
  Overflow(&'static str),

  #[error("unsupported operand type(s) for {op}: '{left}' and '{right}'")]
  UnsupportedOperands {
    op: &'static str,
    left: &'static str,
    right: &'static str,
  },

  #[error("result would exceed {0} elements")]
  TooLarge(usize),
}

enum Num {
  Int(i64),
  Float(f64),
}

fn num(value: &Value) -> Option<Num> {
  match value {
    Value::Int(i) => Some(Num::Int(*i)),
    Value::Bool(b) => Some(Num::Int(i64::from(*b))),
    Value::Float(f) => Some(Num::Float(*f)),
    _ => None,
  }
}

fn as_float(n: &Num) -> f64 {
  match n {
    Num::Int(i) => *i as f64,
    Num::Float(f) => *f,
  }
}

/// Apply `op` to two values.
///
/// `max_len` caps sequences built by concatenation or repetition.
pub fn binary(op: BinOp, left: &Value, right: &Value, max_len: usize) -> Result<Value, ArithError> {
  let unsupported = || ArithError::UnsupportedOperands {
    op: op.symbol(),
    left: left.type_name(),
    right: right.type_name(),
  };

  if let (Some(a), Some(b)) = (num(left), num(right)) {
    return numeric(op, a, b).and_then(|v| v.ok_or_else(unsupported));
  }

  match (op, left, right) {
    (BinOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
    (BinOp::Add, Value::List(a), Value::List(b)) => concat(a, b, max_len).map(Value::List),
    (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => concat(a, b, max_len).map(Value::Tuple),
    (BinOp::Mul, Value::Str(s), count) | (BinOp::Mul, count, Value::Str(s)) if count.as_int().is_some() => {
      let n = repeat_count(count.as_int().unwrap_or(0), s.chars().count(), max_len)?;
      Ok(Value::Str(s.repeat(n)))
    }
    (BinOp::Mul, Value::List(items), count) | (BinOp::Mul, count, Value::List(items)) if count.as_int().is_some() => {
      repeat(items, count.as_int().unwrap_or(0), max_len).map(Value::List)
    }
    (BinOp::Mul, Value::Tuple(items), count) | (BinOp::Mul, count, Value::Tuple(items)) if count.as_int().is_some() => {
      repeat(items, count.as_int().unwrap_or(0), max_len).map(Value::Tuple)
    }
    (BinOp::BitOr, Value::Dict(a), Value::Dict(b)) => {
      let mut merged: Dict = a.clone();
      for (k, v) in b.iter() {
        merged.insert(k.clone(), v.clone());
      }
      Ok(Value::Dict(merged))
    }
    _ => Err(unsupported()),
  }
}

fn numeric(op: BinOp, a: Num, b: Num) -> Result<Option<Value>, ArithError> {
  let symbol = op.symbol();
  let result = match (a, b) {
    (Num::Int(a), Num::Int(b)) => match op {
      BinOp::Add => Value::Int(a.checked_add(b).ok_or(ArithError::Overflow(symbol))?),
      BinOp::Sub => Value::Int(a.checked_sub(b).ok_or(ArithError::Overflow(symbol))?),
      BinOp::Mul => Value::Int(a.checked_mul(b).ok_or(ArithError::Overflow(symbol))?),
      BinOp::Div => {
        if b == 0 {
          return Err(ArithError::DivisionByZero);
        }
        Value::Float(a as f64 / b as f64)
      }
      BinOp::FloorDiv => Value::Int(floor_div(a, b)?),
      BinOp::Mod => Value::Int(floor_mod(a, b)?),
      BinOp::Pow => int_pow(a, b)?,
      BinOp::LShift | BinOp::RShift => Value::Int(shift(op, a, b)?),
      BinOp::BitOr => Value::Int(a | b),
      BinOp::BitXor => Value::Int(a ^ b),
      BinOp::BitAnd => Value::Int(a & b),
      BinOp::MatMul => return Ok(None),
    },
    (a, b) => {
      let (a, b) = (as_float(&a), as_float(&b));
      match op {
        BinOp::Add => Value::Float(a + b),
        BinOp::Sub => Value::Float(a - b),
        BinOp::Mul => Value::Float(a * b),
        BinOp::Div => {
          if b == 0.0 {
            return Err(ArithError::DivisionByZero);
          }
          Value::Float(a / b)
        }
        BinOp::FloorDiv => {
          if b == 0.0 {
            return Err(ArithError::DivisionByZero);
          }
          Value::Float((a / b).floor())
        }
        BinOp::Mod => {
          if b == 0.0 {
            return Err(ArithError::DivisionByZero);
          }
          let r = a % b;
          Value::Float(if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r })
        }
        BinOp::Pow => {
          if a == 0.0 && b < 0.0 {
            return Err(ArithError::DivisionByZero);
          }
          Value::Float(a.powf(b))
        }
        _ => return Ok(None),
      }
    }
  };
  Ok(Some(result))
}

fn floor_div(a: i64, b: i64) -> Result<i64, ArithError> {
  if b == 0 {
    return Err(ArithError::DivisionByZero);
  }
  let q = a.checked_div(b).ok_or(ArithError::Overflow("//"))?;
  if (a % b != 0) && ((a < 0) != (b < 0)) {
    Ok(q - 1)
  } else {
    Ok(q)
  }
}

fn floor_mod(a: i64, b: i64) -> Result<i64, ArithError> {
  if b == 0 {
    return Err(ArithError::DivisionByZero);
  }
  let r = a.checked_rem(b).unwrap_or(0);
  if r != 0 && ((r < 0) != (b < 0)) { Ok(r + b) } else { Ok(r) }
}

fn int_pow(base: i64, exp: i64) -> Result<Value, ArithError> {
  if exp < 0 {
    if base == 0 {
      return Err(ArithError::DivisionByZero);
    }
    return Ok(Value::Float((base as f64).powf(exp as f64)));
  }
  let exp = u32::try_from(exp).map_err(|_| ArithError::Overflow("**"))?;
  base.checked_pow(exp).map(Value::Int).ok_or(ArithError::Overflow("**"))
}

fn shift(op: BinOp, a: i64, b: i64) -> Result<i64, ArithError> {
  let amount = u32::try_from(b).map_err(|_| ArithError::Overflow(op.symbol()))?;
  match op {
    BinOp::LShift => {
      let shifted = a.checked_shl(amount).ok_or(ArithError::Overflow("<<"))?;
      if shifted >> amount != a {
        return Err(ArithError::Overflow("<<"));
      }
      Ok(shifted)
    }
    _ => Ok(if amount >= 64 { if a < 0 { -1 } else { 0 } } else { a >> amount }),
  }
}

fn concat(a: &[Value], b: &[Value], max_len: usize) -> Result<Vec<Value>, ArithError> {
  if a.len() + b.len() > max_len {
    return Err(ArithError::TooLarge(max_len));
  }
  Ok(a.iter().chain(b).cloned().collect())
}

fn repeat_count(count: i64, unit: usize, max_len: usize) -> Result<usize, ArithError> {
  let count = usize::try_from(count).unwrap_or(0);
  if unit.saturating_mul(count) > max_len {
    return Err(ArithError::TooLarge(max_len));
  }
  Ok(count)
}

fn repeat(items: &[Value], count: i64, max_len: usize) -> Result<Vec<Value>, ArithError> {
  let count = repeat_count(count, items.len(), max_len)?;
  let mut out = Vec::with_capacity(items.len() * count);
  for _ in 0..count {
    out.extend_from_slice(items);
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  const MAX: usize = 1000;

  fn apply(op: BinOp, a: impl Into<Value>, b: impl Into<Value>) -> Result<Value, ArithError> {
    binary(op, &a.into(), &b.into(), MAX)
  }

  mod promotion {
    use super::*;

    #[test]
    fn int_stays_int() {
      assert_eq!(apply(BinOp::Add, 1, 1), Ok(Value::Int(2)));
      assert_eq!(apply(BinOp::Pow, 2, 3), Ok(Value::Int(8)));
      assert_eq!(apply(BinOp::FloorDiv, 1, 2), Ok(Value::Int(0)));
    }

    #[test]
    fn true_division_is_float() {
      assert_eq!(apply(BinOp::Div, 1, 2), Ok(Value::Float(0.5)));
      assert_eq!(apply(BinOp::Div, 4, 2), Ok(Value::Float(2.0)));
    }

    #[test]
    fn float_operand_promotes() {
      assert_eq!(apply(BinOp::Add, 1, 0.5), Ok(Value::Float(1.5)));
      assert_eq!(apply(BinOp::FloorDiv, 7.0, 2), Ok(Value::Float(3.0)));
      assert_eq!(apply(BinOp::Pow, 2.0, 2), Ok(Value::Float(4.0)));
    }

    #[test]
    fn negative_exponent_is_float() {
      assert_eq!(apply(BinOp::Pow, 2, -1), Ok(Value::Float(0.5)));
    }

    #[test]
    fn bool_counts_as_int() {
      assert_eq!(apply(BinOp::Add, true, 1), Ok(Value::Int(2)));
    }
  }

  mod flooring {
    use super::*;

    #[test]
    fn floor_division_rounds_down() {
      assert_eq!(apply(BinOp::FloorDiv, -7, 2), Ok(Value::Int(-4)));
      assert_eq!(apply(BinOp::FloorDiv, 7, -2), Ok(Value::Int(-4)));
    }

    #[test]
    fn modulo_takes_divisor_sign() {
      assert_eq!(apply(BinOp::Mod, -7, 3), Ok(Value::Int(2)));
      assert_eq!(apply(BinOp::Mod, 7, -3), Ok(Value::Int(-2)));
      assert_eq!(apply(BinOp::Mod, -7.5, 2), Ok(Value::Float(0.5)));
    }
  }

  mod sequences {
    use super::*;

    #[test]
    fn concatenation() {
      assert_eq!(apply(BinOp::Add, "a", "b"), Ok(Value::str("ab")));
      assert_eq!(
        apply(BinOp::Add, vec![Value::Int(1)], vec![Value::Int(2)]),
        Ok(Value::List(vec![Value::Int(1), Value::Int(2)]))
      );
    }

    #[test]
    fn repetition() {
      assert_eq!(apply(BinOp::Mul, "ab", 2), Ok(Value::str("abab")));
      assert_eq!(apply(BinOp::Mul, 2, vec![Value::Int(0)]), Ok(Value::List(vec![Value::Int(0), Value::Int(0)])));
      assert_eq!(apply(BinOp::Mul, vec![Value::Int(0)], -1), Ok(Value::List(vec![])));
    }

    #[test]
    fn repetition_is_capped() {
      assert_eq!(apply(BinOp::Mul, vec![Value::Int(0)], 1001), Err(ArithError::TooLarge(MAX)));
    }

    #[test]
    fn dict_union() {
      let a: Dict = [(Value::str("x"), Value::Int(1))].into_iter().collect();
      let b: Dict = [(Value::str("x"), Value::Int(2)), (Value::str("y"), Value::Int(3))]
        .into_iter()
        .collect();
      let Ok(Value::Dict(merged)) = apply(BinOp::BitOr, a, b) else {
        panic!("expected dict");
      };
      assert_eq!(merged.get_str("x"), Some(&Value::Int(2)));
      assert_eq!(merged.len(), 2);
    }
  }

  mod errors {
    use super::*;

    #[test]
    fn division_by_zero() {
      assert_eq!(apply(BinOp::Div, 1, 0), Err(ArithError::DivisionByZero));
      assert_eq!(apply(BinOp::Mod, 1.0, 0.0), Err(ArithError::DivisionByZero));
    }

    #[test]
    fn overflow() {
      assert_eq!(apply(BinOp::Mul, i64::MAX, 2), Err(ArithError::Overflow("*")));
      assert_eq!(apply(BinOp::Pow, 10, 40), Err(ArithError::Overflow("**")));
    }

    #[test]
    fn mismatched_types() {
      let err = apply(BinOp::Sub, "a", 1).unwrap_err();
      assert_eq!(err.to_string(), "unsupported operand type(s) for -: 'str' and 'int'");
    }
  }
}
