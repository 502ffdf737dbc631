//! Canonical source text for values.
//!
//! Output follows the configuration language's own literal syntax so a
//! rendered value parses back to the same value. A container stays on one
//! line while its flat form is shorter than the line width; otherwise each
//! element goes on its own line, indented once. Nested elements are not
//! re-indented, which keeps the output byte-compatible with files written by
//! earlier tooling.

pub mod document;

use serde::{Deserialize, Serialize};

use crate::value::Value;

pub use document::{FIELD_ORDER, account_defaults, generate_document};

/// Layout knobs for rendered source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderOptions {
  /// Spaces before each element of a multi-line container.
  pub indent_width: usize,
  /// Containers whose flat form has at least this many characters go multi-line.
  pub line_width: usize,
}

impl Default for RenderOptions {
  fn default() -> Self {
    Self {
      indent_width: 4,
      line_width: 80,
    }
  }
}

/// Render `value` with the default line width.
pub fn render(value: &Value, indent_width: usize) -> String {
  render_with(
    value,
    &RenderOptions {
      indent_width,
      ..RenderOptions::default()
    },
  )
}

pub fn render_with(value: &Value, options: &RenderOptions) -> String {
  match value {
    Value::List(items) | Value::Tuple(items) => {
      if items.is_empty() {
        return "[]".to_string();
      }
      let rendered: Vec<String> = items.iter().map(|item| render_with(item, options)).collect();
      layout('[', ']', rendered, options)
    }
    Value::Dict(dict) => {
      if dict.is_empty() {
        return "{}".to_string();
      }
      let rendered: Vec<String> = dict
        .iter()
        .map(|(k, v)| format!("{}: {}", render_with(k, options), render_with(v, options)))
        .collect();
      layout('{', '}', rendered, options)
    }
    scalar => flat(scalar),
  }
}

fn layout(open: char, close: char, items: Vec<String>, options: &RenderOptions) -> String {
  let single = format!("{}{}{}", open, items.join(", "), close);
  if !single.contains('\n') && single.chars().count() < options.line_width {
    return single;
  }
  let pad = " ".repeat(options.indent_width);
  format!("{}\n{}{}\n{}", open, pad, items.join(&format!(",\n{}", pad)), close)
}

/// Single-line literal form of `value`.
///
/// Tuples keep their parentheses here; [`render_with`] writes them as lists.
pub fn flat(value: &Value) -> String {
  let mut out = String::new();
  write_flat(value, &mut out);
  out
}

fn write_flat(value: &Value, out: &mut String) {
  match value {
    Value::Null => out.push_str("None"),
    Value::Bool(true) => out.push_str("True"),
    Value::Bool(false) => out.push_str("False"),
    Value::Int(i) => out.push_str(&i.to_string()),
    // No literal spells these; the call form evaluates back to the same float.
    Value::Float(f) if !f.is_finite() => {
      out.push_str("float(");
      out.push_str(&repr_str(&format_float(*f)));
      out.push(')');
    }
    Value::Float(f) => out.push_str(&format_float(*f)),
    Value::Str(s) => out.push_str(&repr_str(s)),
    Value::List(items) => write_seq('[', ']', items, out),
    Value::Tuple(items) => {
      write_seq('(', ')', items, out);
      if items.len() == 1 {
        out.insert(out.len() - 1, ',');
      }
    }
    Value::Dict(dict) => {
      out.push('{');
      for (i, (k, v)) in dict.iter().enumerate() {
        if i > 0 {
          out.push_str(", ");
        }
        write_flat(k, out);
        out.push_str(": ");
        write_flat(v, out);
      }
      out.push('}');
    }
    Value::UnresolvedVariable(name) => out.push_str(name),
    Value::Unparsable(reason) => out.push_str(&repr_str(&format!("<unparsable: {}>", reason))),
  }
}

fn write_seq(open: char, close: char, items: &[Value], out: &mut String) {
  out.push(open);
  for (i, item) in items.iter().enumerate() {
    if i > 0 {
      out.push_str(", ");
    }
    write_flat(item, out);
  }
  out.push(close);
}

/// The `str()` form: strings and floats bare, everything else as [`flat`].
pub fn display_str(value: &Value) -> String {
  match value {
    Value::Str(s) => s.clone(),
    Value::Float(f) => format_float(*f),
    other => flat(other),
  }
}

/// Quoted string literal.
///
/// Single quotes unless the text contains a single quote and no double quote.
pub fn repr_str(s: &str) -> String {
  let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
  let mut out = String::with_capacity(s.len() + 2);
  out.push(quote);
  for c in s.chars() {
    match c {
      '\\' => out.push_str("\\\\"),
      '\n' => out.push_str("\\n"),
      '\r' => out.push_str("\\r"),
      '\t' => out.push_str("\\t"),
      c if c == quote => {
        out.push('\\');
        out.push(c);
      }
      c if (c as u32) < 0x20 || c as u32 == 0x7f => out.push_str(&format!("\\x{:02x}", c as u32)),
      c => out.push(c),
    }
  }
  out.push(quote);
  out
}

/// Shortest round-trip float text: positional for exponents in `-4..16`,
/// scientific with a signed two-digit exponent otherwise.
pub fn format_float(f: f64) -> String {
  if f.is_nan() {
    return "nan".to_string();
  }
  if f.is_infinite() {
    return if f > 0.0 { "inf" } else { "-inf" }.to_string();
  }

  let sign = if f.is_sign_negative() { "-" } else { "" };
  let sci = format!("{:e}", f.abs());
  let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
  let exponent: i32 = exponent.parse().unwrap_or(0);
  let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

  if (-4..16).contains(&exponent) {
    if exponent < 0 {
      let zeros = "0".repeat((-exponent - 1) as usize);
      return format!("{}0.{}{}", sign, zeros, digits);
    }
    let int_len = exponent as usize + 1;
    if digits.len() <= int_len {
      let zeros = "0".repeat(int_len - digits.len());
      return format!("{}{}{}.0", sign, digits, zeros);
    }
    return format!("{}{}.{}", sign, &digits[..int_len], &digits[int_len..]);
  }

  let exp_sign = if exponent < 0 { '-' } else { '+' };
  format!("{}{}e{}{:02}", sign, mantissa, exp_sign, exponent.abs())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::value::Dict;

  fn ints(n: i64) -> Value {
    Value::List((0..n).map(Value::Int).collect())
  }

  mod scalars {
    use super::*;

    #[test]
    fn literals() {
      assert_eq!(flat(&Value::Null), "None");
      assert_eq!(flat(&Value::Bool(true)), "True");
      assert_eq!(flat(&Value::Int(-3)), "-3");
    }

    #[test]
    fn floats() {
      assert_eq!(format_float(1.0), "1.0");
      assert_eq!(format_float(0.5), "0.5");
      assert_eq!(format_float(-2.25), "-2.25");
      assert_eq!(format_float(0.1 + 0.2), "0.30000000000000004");
      assert_eq!(format_float(1e-5), "1e-05");
      assert_eq!(format_float(0.0001), "0.0001");
      assert_eq!(format_float(1e16), "1e+16");
      assert_eq!(format_float(1.5e16), "1.5e+16");
      assert_eq!(format_float(123456789012345.0), "123456789012345.0");
      assert_eq!(format_float(-0.0), "-0.0");
      assert_eq!(format_float(f64::INFINITY), "inf");
    }

    #[test]
    fn non_finite_floats_use_the_call_form() {
      assert_eq!(flat(&Value::Float(f64::INFINITY)), "float('inf')");
      assert_eq!(flat(&Value::Float(f64::NEG_INFINITY)), "float('-inf')");
      assert_eq!(flat(&Value::Float(f64::NAN)), "float('nan')");
      assert_eq!(
        render(&Value::List(vec![Value::Float(f64::INFINITY), Value::Float(1.5)]), 4),
        "[float('inf'), 1.5]"
      );
      assert_eq!(display_str(&Value::Float(f64::NEG_INFINITY)), "-inf");
    }

    #[test]
    fn strings() {
      assert_eq!(repr_str("abc"), "'abc'");
      assert_eq!(repr_str("it's"), "\"it's\"");
      assert_eq!(repr_str("a'b\"c"), "'a\\'b\"c'");
      assert_eq!(repr_str("line\nnext\\"), "'line\\nnext\\\\'");
      assert_eq!(repr_str("\u{1}"), "'\\x01'");
      assert_eq!(repr_str("币安"), "'币安'");
    }

    #[test]
    fn placeholders() {
      assert_eq!(flat(&Value::UnresolvedVariable("base".into())), "base");
      assert_eq!(flat(&Value::unparsable("call")), "'<unparsable: call>'");
    }

    #[test]
    fn tuples_keep_parentheses_when_flat() {
      assert_eq!(flat(&Value::Tuple(vec![Value::Int(1)])), "(1,)");
      assert_eq!(render(&Value::Tuple(vec![Value::Int(1)]), 4), "[1]");
    }
  }

  mod layout {
    use super::*;

    #[test]
    fn empty_containers() {
      assert_eq!(render(&Value::List(vec![]), 4), "[]");
      assert_eq!(render(&Value::Dict(Dict::new()), 4), "{}");
    }

    #[test]
    fn threshold_is_exclusive_at_eighty() {
      let at = |len: usize| Value::List(vec![Value::str("x".repeat(len - 4))]);
      assert_eq!(flat(&at(79)).len(), 79);
      assert!(!render(&at(79), 4).contains('\n'));
      assert_eq!(flat(&at(80)).len(), 80);
      assert_eq!(render(&at(80), 4), format!("[\n    '{}'\n]", "x".repeat(76)));
    }

    #[test]
    fn multi_line_joins_with_indent() {
      let rendered = render(&ints(30), 2);
      assert!(rendered.starts_with("[\n  0,\n  1,\n"));
      assert!(rendered.ends_with("\n  29\n]"));
    }

    #[test]
    fn nested_items_are_not_reindented() {
      let inner = ints(30);
      let outer = Value::Dict([(Value::str("pool"), inner)].into_iter().collect());
      let rendered = render(&outer, 4);
      assert!(rendered.starts_with("{\n    'pool': [\n    0,\n"));
      assert!(rendered.ends_with("    29\n]\n}"));
    }

    #[test]
    fn width_counts_characters_not_bytes() {
      let wide = Value::List(vec![Value::str("币".repeat(70))]);
      assert!(!render(&wide, 4).contains('\n'));
    }
  }
}
