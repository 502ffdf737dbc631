//! Tree-walking evaluation of configuration expressions.
//!
//! The [`Evaluator`] reduces literals, containers, arithmetic, the allow-listed
//! calls and list comprehensions itself. Every other node is handed to the
//! [`Sandbox`] as the exact source text of that sub-expression. A node neither
//! can reduce becomes [`Value::Unparsable`], and a name missing from the
//! context becomes [`Value::UnresolvedVariable`]; evaluation itself never
//! fails.

pub mod arith;
pub mod builtins;
mod comprehension;

use tracing::debug;

use crate::sandbox::Sandbox;
use crate::source::{self, Constant, DictItem, Expr, ExprKind, Keyword, MAX_NESTING, ParseError, UnaryOp};
use crate::value::{Dict, Fields, Value};

use builtins::Builtin;

/// Evaluates expressions parsed from one source text.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
  source: &'a str,
  sandbox: &'a Sandbox,
  depth: usize,
}

impl<'a> Evaluator<'a> {
  /// # Arguments
  /// * `source` - The text the expressions were parsed from; spans index into it
  /// * `sandbox` - Fallback for nodes the evaluator does not reduce itself
  pub fn new(source: &'a str, sandbox: &'a Sandbox) -> Self {
    Self {
      source,
      sandbox,
      depth: 0,
    }
  }

  /// Reduce `expr` to a value, resolving names against `ctx`.
  pub fn evaluate(&self, expr: &Expr, ctx: &Fields) -> Value {
    if self.depth >= MAX_NESTING {
      return Value::unparsable("expression too deeply nested");
    }
    let inner = Evaluator {
      depth: self.depth + 1,
      ..*self
    };
    inner.reduce(expr, ctx)
  }

  fn reduce(&self, expr: &Expr, ctx: &Fields) -> Value {
    match &expr.kind {
      ExprKind::Constant(constant) => match constant {
        Constant::None => Value::Null,
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Int(i) => Value::Int(*i),
        Constant::Float(f) => Value::Float(*f),
        Constant::Str(s) => Value::Str(s.clone()),
        Constant::Bytes(_) | Constant::Ellipsis => self.fallback(expr, ctx),
      },
      ExprKind::Name(name) => ctx
        .get(name)
        .cloned()
        .unwrap_or_else(|| Value::UnresolvedVariable(name.clone())),
      ExprKind::List(elts) | ExprKind::Tuple(elts) => {
        if elts.iter().any(|e| matches!(e.kind, ExprKind::Starred(_))) {
          return self.fallback(expr, ctx);
        }
        let items = elts.iter().map(|e| self.evaluate(e, ctx)).collect();
        match expr.kind {
          ExprKind::Tuple(_) => Value::Tuple(items),
          _ => Value::List(items),
        }
      }
      ExprKind::Dict(entries) => self.dict(expr, entries, ctx),
      ExprKind::Unary { op, operand } => match op {
        UnaryOp::Plus | UnaryOp::Minus => self.unary(*op, operand, ctx),
        UnaryOp::Not | UnaryOp::Invert => self.fallback(expr, ctx),
      },
      ExprKind::Binary { left, op, right } if op.is_arithmetic() => {
        let left = self.evaluate(left, ctx);
        let right = self.evaluate(right, ctx);
        if let Some(placeholder) = [&left, &right].into_iter().find(|v| v.contains_placeholder()) {
          return Value::unparsable(format!("operand of '{}' is unresolved: {}", op.symbol(), placeholder));
        }
        arith::binary(*op, &left, &right, self.max_len()).unwrap_or_else(|err| Value::unparsable(err.to_string()))
      }
      ExprKind::Call { func, args, keywords } => match func.as_name().and_then(Builtin::from_allow_list) {
        Some(builtin) if !ctx.contains_key(builtin.name()) => self.call(expr, builtin, args, keywords, ctx),
        _ => self.fallback(expr, ctx),
      },
      ExprKind::ListComp { elt, generators } => comprehension::expand(self, elt, generators, ctx),
      ExprKind::SetComp { .. } | ExprKind::DictComp { .. } | ExprKind::GeneratorExp { .. } => {
        Value::unparsable("unsupported comprehension kind")
      }
      _ => self.fallback(expr, ctx),
    }
  }

  fn max_len(&self) -> usize {
    self.sandbox.limits().max_collection_len
  }

  fn dict(&self, expr: &Expr, entries: &[DictItem], ctx: &Fields) -> Value {
    let mut dict = Dict::new();
    for entry in entries {
      let DictItem::Pair(key, value) = entry else {
        return self.fallback(expr, ctx);
      };
      let key = self.evaluate(key, ctx);
      if matches!(key, Value::List(_) | Value::Dict(_)) {
        return Value::unparsable(format!("unhashable dict key of type '{}'", key.type_name()));
      }
      dict.insert(key, self.evaluate(value, ctx));
    }
    Value::Dict(dict)
  }

  fn unary(&self, op: UnaryOp, operand: &Expr, ctx: &Fields) -> Value {
    match (op, self.evaluate(operand, ctx)) {
      (UnaryOp::Plus, Value::Float(f)) => Value::Float(f),
      (UnaryOp::Minus, Value::Float(f)) => Value::Float(-f),
      (op, value) => match value.as_int() {
        Some(i) if op == UnaryOp::Plus => Value::Int(i),
        Some(i) => i
          .checked_neg()
          .map(Value::Int)
          .unwrap_or_else(|| Value::unparsable(arith::ArithError::Overflow("-").to_string())),
        None if value.is_placeholder() => Value::unparsable(format!("operand of unary operator is unresolved: {}", value)),
        None => Value::unparsable(format!("bad operand type for unary operator: '{}'", value.type_name())),
      },
    }
  }

  fn call(&self, expr: &Expr, builtin: Builtin, args: &[Expr], keywords: &[Keyword], ctx: &Fields) -> Value {
    let keywords_allowed = builtin == Builtin::Dict && keywords.iter().all(|k| k.name.is_some());
    let starred = args.iter().any(|a| matches!(a.kind, ExprKind::Starred(_)));
    if starred || (!keywords.is_empty() && !keywords_allowed) {
      return self.fallback(expr, ctx);
    }

    let values: Vec<Value> = args.iter().map(|a| self.evaluate(a, ctx)).collect();
    let kwargs: Vec<(String, Value)> = keywords
      .iter()
      .filter_map(|k| k.name.clone().map(|name| (name, self.evaluate(&k.value, ctx))))
      .collect();
    // Placeholders inside dict() keyword values stay attached to their key.
    let blocking = match builtin {
      Builtin::Dict => values.iter().find(|v| v.contains_placeholder()),
      _ => values.iter().chain(kwargs.iter().map(|(_, v)| v)).find(|v| v.contains_placeholder()),
    };
    if let Some(placeholder) = blocking {
      return Value::unparsable(format!("argument to {}() is unresolved: {}", builtin.name(), placeholder));
    }
    builtins::call(builtin, values, kwargs, self.max_len()).unwrap_or_else(|err| Value::unparsable(err.to_string()))
  }

  fn fallback(&self, expr: &Expr, ctx: &Fields) -> Value {
    let Some(text) = expr.span.slice(self.source) else {
      return Value::unparsable("expression span is outside the source text");
    };
    match self.sandbox.eval_snippet(text, ctx) {
      Ok(value) => value,
      Err(err) => {
        debug!(expression = text, error = %err, "sandbox could not evaluate expression");
        Value::unparsable(err.to_string())
      }
    }
  }
}

/// Parse `text` as one expression and evaluate it.
///
/// # Example
///
/// ```
/// use qronos_lib::eval::evaluate_str;
/// use qronos_lib::sandbox::Sandbox;
/// use qronos_lib::value::{Fields, Value};
///
/// let value = evaluate_str("1 / 2", &Fields::new(), &Sandbox::default()).unwrap();
/// assert_eq!(value, Value::Float(0.5));
/// ```
pub fn evaluate_str(text: &str, ctx: &Fields, sandbox: &Sandbox) -> Result<Value, ParseError> {
  let expr = source::parse_expression(text)?;
  Ok(Evaluator::new(text, sandbox).evaluate(&expr, ctx))
}
