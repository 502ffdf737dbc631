//! Format specs for f-strings and `str.format`.
//!
//! Supports `[[fill]align][sign][#][0][width][,|_][.precision][type]` with the
//! `s d x X o b f F e E g G %` presentation types.

use crate::eval::arith::ArithError;
use crate::eval::builtins::CallError;
use crate::render;
use crate::value::Value;

#[derive(Debug, Default, PartialEq)]
struct Spec {
  fill: Option<char>,
  align: Option<char>,
  sign: Option<char>,
  alternate: bool,
  zero: bool,
  width: usize,
  grouping: Option<char>,
  precision: Option<usize>,
  kind: Option<char>,
}

/// Width and precision above `max_len` are rejected before anything is padded.
fn parse_spec(text: &str, max_len: usize) -> Result<Spec, CallError> {
  let invalid = || CallError::invalid(format!("invalid format specifier '{}'", text));
  let chars: Vec<char> = text.chars().collect();
  let mut spec = Spec::default();
  let mut i = 0;

  let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');
  if chars.len() >= 2 && is_align(chars[1]) {
    spec.fill = Some(chars[0]);
    spec.align = Some(chars[1]);
    i = 2;
  } else if chars.first().is_some_and(|c| is_align(*c)) {
    spec.align = Some(chars[0]);
    i = 1;
  }
  if let Some(c) = chars.get(i)
    && matches!(c, '+' | '-' | ' ')
  {
    spec.sign = Some(*c);
    i += 1;
  }
  if chars.get(i) == Some(&'#') {
    spec.alternate = true;
    i += 1;
  }
  if chars.get(i) == Some(&'0') {
    spec.zero = true;
    i += 1;
  }
  let start = i;
  while chars.get(i).is_some_and(char::is_ascii_digit) {
    i += 1;
  }
  if i > start {
    spec.width = chars[start..i].iter().collect::<String>().parse().map_err(|_| invalid())?;
  }
  if let Some(c) = chars.get(i)
    && matches!(c, ',' | '_')
  {
    spec.grouping = Some(*c);
    i += 1;
  }
  if chars.get(i) == Some(&'.') {
    i += 1;
    let start = i;
    while chars.get(i).is_some_and(char::is_ascii_digit) {
      i += 1;
    }
    if i == start {
      return Err(invalid());
    }
    spec.precision = Some(chars[start..i].iter().collect::<String>().parse().map_err(|_| invalid())?);
  }
  if let Some(c) = chars.get(i) {
    spec.kind = Some(*c);
    i += 1;
  }
  if i != chars.len() {
    return Err(invalid());
  }
  if spec.width > max_len || spec.precision.is_some_and(|p| p > max_len) {
    return Err(CallError::Arith(ArithError::TooLarge(max_len)));
  }
  Ok(spec)
}

/// Format `value` according to `spec`, as `format(value, spec)` would.
pub(crate) fn format_value(value: &Value, spec: &str, max_len: usize) -> Result<String, CallError> {
  if spec.is_empty() {
    return Ok(render::display_str(value));
  }
  let parsed = parse_spec(spec, max_len)?;
  match value {
    Value::Str(s) => format_str(s, &parsed, spec),
    Value::Bool(_) if parsed.kind.is_none() => format_str(&render::display_str(value), &parsed, spec),
    Value::Int(_) | Value::Bool(_) => format_int(value.as_int().unwrap_or(0), &parsed, spec),
    Value::Float(f) => format_float(*f, &parsed, spec),
    other => {
      if parsed.sign.is_some() || parsed.precision.is_some() || parsed.kind.is_some() || parsed.grouping.is_some() {
        return Err(CallError::invalid(format!(
          "unsupported format string passed to {}.__format__",
          other.type_name()
        )));
      }
      format_str(&render::display_str(other), &parsed, spec)
    }
  }
}

fn format_str(s: &str, spec: &Spec, raw: &str) -> Result<String, CallError> {
  if !matches!(spec.kind, None | Some('s')) || spec.sign.is_some() {
    return Err(CallError::invalid(format!("invalid format specifier '{}' for object of type 'str'", raw)));
  }
  let text: String = match spec.precision {
    Some(p) => s.chars().take(p).collect(),
    None => s.to_string(),
  };
  Ok(pad("", &text, spec, '<'))
}

fn format_int(i: i64, spec: &Spec, raw: &str) -> Result<String, CallError> {
  let magnitude = i.unsigned_abs();
  let body = match spec.kind {
    None | Some('d') | Some('n') => group(&magnitude.to_string(), spec.grouping),
    Some('x') => prefixed(format!("{:x}", magnitude), "0x", spec.alternate),
    Some('X') => prefixed(format!("{:X}", magnitude), "0X", spec.alternate),
    Some('o') => prefixed(format!("{:o}", magnitude), "0o", spec.alternate),
    Some('b') => prefixed(format!("{:b}", magnitude), "0b", spec.alternate),
    Some('f' | 'F' | 'e' | 'E' | 'g' | 'G' | '%') => return format_float(i as f64, spec, raw),
    Some(_) => {
      return Err(CallError::invalid(format!(
        "invalid format specifier '{}' for object of type 'int'",
        raw
      )));
    }
  };
  Ok(pad(sign_of(i < 0, spec), &body, spec, '>'))
}

fn format_float(f: f64, spec: &Spec, raw: &str) -> Result<String, CallError> {
  let magnitude = f.abs();
  let body = if !f.is_finite() {
    let text = render::format_float(magnitude);
    if matches!(spec.kind, Some('F' | 'E' | 'G')) { text.to_uppercase() } else { text }
  } else {
    match spec.kind {
      None => match spec.precision {
        Some(p) => general(magnitude, p.max(1), spec.alternate, true),
        None => render::format_float(magnitude),
      },
      Some('f' | 'F') => fixed(magnitude, spec.precision.unwrap_or(6), spec.grouping),
      Some('e') => scientific(magnitude, spec.precision.unwrap_or(6)),
      Some('E') => scientific(magnitude, spec.precision.unwrap_or(6)).to_uppercase(),
      Some('g') => general(magnitude, spec.precision.unwrap_or(6).max(1), spec.alternate, false),
      Some('G') => general(magnitude, spec.precision.unwrap_or(6).max(1), spec.alternate, false).to_uppercase(),
      Some('%') => format!("{}%", fixed(magnitude * 100.0, spec.precision.unwrap_or(6), spec.grouping)),
      Some(_) => {
        return Err(CallError::invalid(format!(
          "invalid format specifier '{}' for object of type 'float'",
          raw
        )));
      }
    }
  };
  Ok(pad(sign_of(f.is_sign_negative(), spec), &body, spec, '>'))
}

fn sign_of(negative: bool, spec: &Spec) -> &'static str {
  match (negative, spec.sign) {
    (true, _) => "-",
    (false, Some('+')) => "+",
    (false, Some(' ')) => " ",
    _ => "",
  }
}

fn prefixed(digits: String, prefix: &str, alternate: bool) -> String {
  if alternate { format!("{}{}", prefix, digits) } else { digits }
}

fn group(digits: &str, separator: Option<char>) -> String {
  let Some(separator) = separator else {
    return digits.to_string();
  };
  let mut out = String::with_capacity(digits.len() + digits.len() / 3);
  for (i, c) in digits.chars().enumerate() {
    if i > 0 && (digits.len() - i) % 3 == 0 {
      out.push(separator);
    }
    out.push(c);
  }
  out
}

fn fixed(f: f64, precision: usize, grouping: Option<char>) -> String {
  let text = format!("{:.*}", precision, f);
  match text.split_once('.') {
    Some((int, frac)) => format!("{}.{}", group(int, grouping), frac),
    None => group(&text, grouping),
  }
}

fn scientific(f: f64, precision: usize) -> String {
  let text = format!("{:.*e}", precision, f);
  let (mantissa, exponent) = text.split_once('e').unwrap_or((text.as_str(), "0"));
  let exponent: i32 = exponent.parse().unwrap_or(0);
  format!(
    "{}e{}{:02}",
    mantissa,
    if exponent < 0 { '-' } else { '+' },
    exponent.abs()
  )
}

/// The `g` presentation: scientific when the exponent is below -4 or at least
/// the precision, fixed otherwise, with trailing zeros removed.
fn general(f: f64, precision: usize, alternate: bool, keep_point: bool) -> String {
  let rounded = format!("{:.*e}", precision - 1, f);
  let exponent: i32 = rounded
    .split_once('e')
    .and_then(|(_, e)| e.parse().ok())
    .unwrap_or(0);

  let text = if exponent < -4 || exponent >= precision as i32 {
    scientific(f, precision - 1)
  } else {
    fixed(f, (precision as i32 - 1 - exponent).max(0) as usize, None)
  };
  if alternate {
    return text;
  }

  let (number, exp) = match text.find('e') {
    Some(at) => text.split_at(at),
    None => (text.as_str(), ""),
  };
  let mut number = if number.contains('.') {
    number.trim_end_matches('0').trim_end_matches('.').to_string()
  } else {
    number.to_string()
  };
  if keep_point && exp.is_empty() && !number.contains('.') {
    number.push_str(".0");
  }
  format!("{}{}", number, exp)
}

fn pad(sign: &str, body: &str, spec: &Spec, default_align: char) -> String {
  let (fill, align) = if spec.zero && spec.align.is_none() && default_align == '>' {
    (spec.fill.unwrap_or('0'), '=')
  } else {
    (spec.fill.unwrap_or(' '), spec.align.unwrap_or(default_align))
  };
  let len = sign.chars().count() + body.chars().count();
  let missing = spec.width.saturating_sub(len);
  let filler = |n: usize| fill.to_string().repeat(n);
  match align {
    '<' => format!("{}{}{}", sign, body, filler(missing)),
    '^' => format!("{}{}{}{}", filler(missing / 2), sign, body, filler(missing - missing / 2)),
    '=' => format!("{}{}{}", sign, filler(missing), body),
    _ => format!("{}{}{}", filler(missing), sign, body),
  }
}

/// Expand a `str.format` template.
pub(crate) fn format_template(
  template: &str,
  args: &[Value],
  kwargs: &[(String, Value)],
  max_len: usize,
) -> Result<String, CallError> {
  let mut out = String::new();
  let mut chars = template.chars().peekable();
  let mut auto_index = 0usize;

  while let Some(c) = chars.next() {
    match c {
      '{' if chars.peek() == Some(&'{') => {
        chars.next();
        out.push('{');
      }
      '}' if chars.peek() == Some(&'}') => {
        chars.next();
        out.push('}');
      }
      '}' => return Err(CallError::invalid("Single '}' encountered in format string")),
      '{' => {
        let mut field = String::new();
        loop {
          match chars.next() {
            Some('}') => break,
            Some('{') => return Err(CallError::invalid("nested replacement fields are not supported")),
            Some(c) => field.push(c),
            None => return Err(CallError::invalid("Single '{' encountered in format string")),
          }
        }
        let (head, spec) = field.split_once(':').unwrap_or((field.as_str(), ""));
        let (name, conversion) = match head.split_once('!') {
          Some((name, conv)) => (name, Some(conv)),
          None => (head, None),
        };

        let value = if name.is_empty() {
          let value = args
            .get(auto_index)
            .ok_or_else(|| CallError::invalid(format!("Replacement index {} out of range", auto_index)))?;
          auto_index += 1;
          value
        } else if let Ok(index) = name.parse::<usize>() {
          args
            .get(index)
            .ok_or_else(|| CallError::invalid(format!("Replacement index {} out of range", index)))?
        } else {
          kwargs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
            .ok_or_else(|| CallError::invalid(format!("KeyError: {}", render::repr_str(name))))?
        };

        let converted = match conversion {
          None => None,
          Some("s") => Some(Value::Str(render::display_str(value))),
          Some("r") | Some("a") => Some(Value::Str(render::flat(value))),
          Some(other) => {
            return Err(CallError::invalid(format!(
              "Unknown conversion specifier {}",
              other
            )));
          }
        };
        out.push_str(&format_value(converted.as_ref().unwrap_or(value), spec, max_len)?);
      }
      c => out.push(c),
    }
  }
  Ok(out)
}
