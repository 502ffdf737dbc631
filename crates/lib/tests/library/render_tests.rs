//! Rendered values read back to the same value and the same text.

use qronos_lib::eval::evaluate_str;
use qronos_lib::render::{RenderOptions, render_with};
use qronos_lib::sandbox::Sandbox;
use qronos_lib::value::{Dict, Fields, Value};

const NARROW: RenderOptions = RenderOptions {
  indent_width: 2,
  line_width: 24,
};

/// Render, evaluate the text, and check the result renders identically.
fn reread(value: &Value, options: &RenderOptions) -> Value {
  let text = render_with(value, options);
  let back =
    evaluate_str(&text, &Fields::new(), &Sandbox::default()).unwrap_or_else(|err| panic!("{}: {}", err, text));
  assert_eq!(render_with(&back, options), text);
  back
}

fn dict(entries: Vec<(&str, Value)>) -> Value {
  Value::Dict(entries.into_iter().map(|(k, v)| (Value::str(k), v)).collect::<Dict>())
}

#[test]
fn escaped_and_non_ascii_strings() {
  for text in [
    "it's",
    "say \"hi\"",
    "both ' and \"",
    "back\\slash",
    "line\nbreak\ttab\rreturn",
    "\u{1}control\u{7f}",
    "币安-USDT",
    "émoji 🚀",
    "",
  ] {
    let value = Value::str(text);
    assert_eq!(reread(&value, &RenderOptions::default()), value, "{:?}", text);
  }
}

#[test]
fn exponent_and_special_floats() {
  let floats = [
    1e-7,
    1e20,
    1.5e-10,
    -2.5e300,
    0.1 + 0.2,
    123456789012345.0,
    1e16,
    -0.0,
    f64::INFINITY,
    f64::NEG_INFINITY,
  ];
  for f in floats {
    let value = Value::Float(f);
    assert_eq!(reread(&value, &RenderOptions::default()), value, "{}", f);
  }
  let back = reread(&Value::Float(f64::NAN), &RenderOptions::default());
  assert!(matches!(back, Value::Float(f) if f.is_nan()));
}

#[test]
fn nested_multi_line_dicts() {
  let strategy = dict(vec![
    ("strategy", Value::str("Strategy_Base")),
    ("offset_list", Value::List((0..6).map(Value::Int).collect())),
    ("cap_weight", Value::Float(1e-7)),
    ("filter", dict(vec![("名称", Value::str("it's \"quoted\""))])),
  ]);
  let value = dict(vec![
    ("name", Value::str("pool_a")),
    ("strategy_list", Value::List(vec![strategy.clone(), strategy])),
    ("empty", Value::Dict(Dict::new())),
    ("limit", Value::Float(f64::INFINITY)),
  ]);

  let text = render_with(&value, &NARROW);
  assert!(text.lines().count() > 10, "{}", text);
  assert_eq!(reread(&value, &NARROW), value);
  assert_eq!(reread(&value, &RenderOptions::default()), value);
}

#[test]
fn tuples_settle_as_lists() {
  let value = Value::Tuple(vec![Value::Int(1), Value::List(vec![Value::str("a\nb")])]);
  let back = reread(&value, &NARROW);
  assert_eq!(back, Value::List(vec![Value::Int(1), Value::List(vec![Value::str("a\nb")])]));
}
