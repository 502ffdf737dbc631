//! List comprehension expansion.

use std::ops::ControlFlow;

use super::Evaluator;
use crate::source::{Comprehension, Expr};
use crate::value::{Fields, Value};

/// Expand `[elt for ... in ... if ...]` into its elements.
///
/// Generators run left to right with the leftmost varying slowest. A clause
/// that cannot be iterated, or whose target is not a bare name, contributes a
/// single placeholder instead of its elements.
pub(super) fn expand(evaluator: &Evaluator<'_>, elt: &Expr, generators: &[Comprehension], ctx: &Fields) -> Value {
  let mut out = Vec::new();
  match expand_into(evaluator, elt, generators, ctx, &mut out) {
    ControlFlow::Continue(()) => Value::List(out),
    ControlFlow::Break(reason) => Value::unparsable(reason),
  }
}

fn expand_into(
  evaluator: &Evaluator<'_>,
  elt: &Expr,
  generators: &[Comprehension],
  ctx: &Fields,
  out: &mut Vec<Value>,
) -> ControlFlow<String> {
  let max_len = evaluator.max_len();
  let Some((generator, rest)) = generators.split_first() else {
    return push(out, evaluator.evaluate(elt, ctx), max_len);
  };

  let Some(target) = generator.target.as_name() else {
    return push(out, Value::unparsable("comprehension target is not a single name"), max_len);
  };
  let iterable = evaluator.evaluate(&generator.iter, ctx);
  let Some(items) = iterable.as_seq() else {
    let reason = match &iterable {
      Value::UnresolvedVariable(name) => format!("comprehension over unresolved variable '{}'", name),
      other => format!("cannot expand a comprehension over '{}'", other.type_name()),
    };
    return push(out, Value::unparsable(reason), max_len);
  };

  for item in items {
    let mut inner = ctx.clone();
    inner.insert(target.to_string(), item.clone());
    match conditions_hold(evaluator, generator, &inner) {
      Some(true) => expand_into(evaluator, elt, rest, &inner, out)?,
      Some(false) => {}
      None => push(out, Value::unparsable("comprehension condition is unresolved"), max_len)?,
    }
  }
  ControlFlow::Continue(())
}

/// `None` when a condition reduces to a placeholder.
fn conditions_hold(evaluator: &Evaluator<'_>, generator: &Comprehension, ctx: &Fields) -> Option<bool> {
  for condition in &generator.conditions {
    let value = evaluator.evaluate(condition, ctx);
    if value.is_placeholder() {
      return None;
    }
    if !value.is_truthy() {
      return Some(false);
    }
  }
  Some(true)
}

fn push(out: &mut Vec<Value>, value: Value, max_len: usize) -> ControlFlow<String> {
  if out.len() >= max_len {
    return ControlFlow::Break(format!("comprehension would exceed {} elements", max_len));
  }
  out.push(value);
  ControlFlow::Continue(())
}
