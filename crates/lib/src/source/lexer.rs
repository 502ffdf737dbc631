//! Tokenizer for configuration source text.
//!
//! Produces a flat token stream with `Newline`, `Indent` and `Dedent` markers.
//! Newlines inside brackets and after a trailing backslash are swallowed, the
//! way the configuration language joins physical lines into logical ones.

use super::{ParseError, Span};

/// Multi-character operators, longest first.
const OPERATORS: &[&str] = &[
  "**=", "//=", ">>=", "<<=", "...", "->", ":=", "**", "//", "==", "!=", "<=", ">=", "<<", ">>", "+=", "-=", "*=",
  "/=", "%=", "&=", "|=", "^=", "@=", "+", "-", "*", "/", "%", "@", "<", ">", "=", "(", ")", "[", "]", "{", "}",
  ",", ":", ".", ";", "&", "|", "^", "~",
];

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
  Name(String),
  Int(i64),
  Float(f64),
  Str { value: String, bytes: bool },
  FString(Vec<FPiece>),
  Op(&'static str),
  Newline,
  Indent,
  Dedent,
  Eof,
}

/// A piece of an f-string before its embedded expressions are parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum FPiece {
  Lit(String),
  Expr {
    /// Expression text exactly as written between the braces.
    source: String,
    /// Byte offset of `source` in the enclosing text.
    offset: usize,
    conversion: Option<char>,
    spec: Option<String>,
  },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
  pub kind: TokenKind,
  pub span: Span,
  pub line: usize,
  pub column: usize,
}

pub struct Lexer<'a> {
  src: &'a str,
  pos: usize,
  base: usize,
  skip: usize,
  line: usize,
  line_start: usize,
  depth: usize,
  indents: Vec<usize>,
  at_line_start: bool,
  tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
  /// Create a lexer whose spans are shifted by `base` bytes.
  pub fn new(src: &'a str, base: usize) -> Self {
    Self::for_fragment(src, base, 0)
  }

  /// Like [`Lexer::new`], for text whose first `skip` bytes are synthetic and
  /// must not count towards span offsets.
  pub(crate) fn for_fragment(src: &'a str, base: usize, skip: usize) -> Self {
    Self {
      src,
      pos: 0,
      base,
      skip,
      line: 1,
      line_start: 0,
      depth: 0,
      indents: vec![0],
      at_line_start: true,
      tokens: Vec::new(),
    }
  }

  pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
    loop {
      if self.at_line_start && self.depth == 0 {
        if !self.handle_indentation()? {
          break;
        }
        continue;
      }

      let Some(c) = self.peek() else { break };
      match c {
        ' ' | '\t' | '\x0c' => self.bump(),
        '#' => self.skip_comment(),
        '\\' => {
          self.bump();
          if !self.eat_newline() {
            return Err(self.error("unexpected character after line continuation character"));
          }
        }
        '\n' | '\r' => {
          let start = self.pos;
          let (line, column) = (self.line, self.column());
          self.eat_newline();
          if self.depth == 0 {
            self.push_at(TokenKind::Newline, start, line, column);
            self.at_line_start = true;
          }
        }
        '"' | '\'' => self.lex_string(self.pos, "")?,
        c if c.is_ascii_digit() => self.lex_number()?,
        '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.lex_number()?,
        c if c.is_alphabetic() || c == '_' => self.lex_name()?,
        _ => self.lex_operator()?,
      }
    }

    if self.depth > 0 {
      return Err(self.error("unexpected end of input inside brackets"));
    }
    let end = self.src.len();
    if !matches!(self.tokens.last().map(|t| &t.kind), None | Some(TokenKind::Newline)) {
      self.push_at(TokenKind::Newline, end, self.line, self.column());
    }
    while self.indents.len() > 1 {
      self.indents.pop();
      self.push_at(TokenKind::Dedent, end, self.line, self.column());
    }
    self.push_at(TokenKind::Eof, end, self.line, self.column());
    Ok(self.tokens)
  }

  /// Measure indentation at the start of a line and emit Indent/Dedent.
  ///
  /// Returns `false` at end of input.
  fn handle_indentation(&mut self) -> Result<bool, ParseError> {
    let mut width = 0;
    while let Some(c) = self.peek() {
      match c {
        ' ' => width += 1,
        '\t' => width = (width / 8 + 1) * 8,
        '\x0c' => width = 0,
        _ => break,
      }
      self.bump();
    }

    match self.peek() {
      None => return Ok(false),
      Some('#') => {
        self.skip_comment();
        self.eat_newline();
        return Ok(true);
      }
      Some('\n') | Some('\r') => {
        self.eat_newline();
        return Ok(true);
      }
      _ => {}
    }

    self.at_line_start = false;
    let current = *self.indents.last().unwrap_or(&0);
    if width > current {
      self.indents.push(width);
      self.push_at(TokenKind::Indent, self.pos, self.line, self.column());
    } else if width < current {
      while self.indents.last().is_some_and(|&w| w > width) {
        self.indents.pop();
        self.push_at(TokenKind::Dedent, self.pos, self.line, self.column());
      }
      if self.indents.last() != Some(&width) {
        return Err(self.error("unindent does not match any outer indentation level"));
      }
    }
    Ok(true)
  }

  fn lex_name(&mut self) -> Result<(), ParseError> {
    let start = self.pos;
    while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
      self.bump();
    }
    let src = self.src;
    let word = &src[start..self.pos];
    if matches!(self.peek(), Some('"') | Some('\'')) && is_string_prefix(word) {
      return self.lex_string(start, &word.to_ascii_lowercase());
    }
    let (line, column) = (self.line, start - self.line_start + 1);
    self.push_at(TokenKind::Name(word.to_string()), start, line, column);
    Ok(())
  }

  fn lex_number(&mut self) -> Result<(), ParseError> {
    let start = self.pos;
    let column = self.column();

    if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B')) {
      let radix = match self.peek_at(1) {
        Some('x' | 'X') => 16,
        Some('o' | 'O') => 8,
        _ => 2,
      };
      self.bump();
      self.bump();
      let digits_start = self.pos;
      while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
        self.bump();
      }
      let src = self.src;
      let digits: String = src[digits_start..self.pos].chars().filter(|&c| c != '_').collect();
      let value = i64::from_str_radix(&digits, radix).map_err(|_| self.error("invalid integer literal"))?;
      self.push_at(TokenKind::Int(value), start, self.line, column);
      return Ok(());
    }

    let mut is_float = false;
    self.eat_digits();
    if self.peek() == Some('.') && !self.peek_at(1).is_some_and(|c| c == '.') {
      is_float = true;
      self.bump();
      self.eat_digits();
    }
    if matches!(self.peek(), Some('e' | 'E')) {
      let sign = usize::from(matches!(self.peek_at(1), Some('+' | '-')));
      if self.peek_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
        is_float = true;
        for _ in 0..=sign {
          self.bump();
        }
        self.eat_digits();
      }
    }
    if matches!(self.peek(), Some('j' | 'J')) {
      return Err(self.error("complex literals are not supported"));
    }
    if self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
      return Err(self.error("invalid decimal literal"));
    }

    let src = self.src;
    let text: String = src[start..self.pos].chars().filter(|&c| c != '_').collect();
    let kind = if is_float {
      TokenKind::Float(text.parse().map_err(|_| self.error("invalid float literal"))?)
    } else {
      TokenKind::Int(text.parse().map_err(|_| self.error("integer literal too large"))?)
    };
    self.push_at(kind, start, self.line, column);
    Ok(())
  }

  fn eat_digits(&mut self) {
    while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
      self.bump();
    }
  }

  /// Lex a string literal whose prefix (if any) began at `start`.
  fn lex_string(&mut self, start: usize, prefix: &str) -> Result<(), ParseError> {
    let raw = prefix.contains('r');
    let bytes = prefix.contains('b');
    let formatted = prefix.contains('f');
    let (line, column) = (self.line, start - self.line_start + 1);

    let Some(quote) = self.peek() else {
      return Err(self.error("expected string literal"));
    };
    let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
    let quote_len = if triple { 3 } else { 1 };
    for _ in 0..quote_len {
      self.bump();
    }
    let body_start = self.pos;

    // Find the closing quote, honouring backslashes.
    loop {
      let Some(c) = self.peek() else {
        return Err(self.error_at(line, column, "unterminated string literal"));
      };
      if c == '\\' {
        self.bump();
        if self.peek().is_some() && !self.eat_newline() {
          self.bump();
        }
        continue;
      }
      if c == quote && (!triple || (self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote))) {
        break;
      }
      if (c == '\n' || c == '\r') && !triple {
        return Err(self.error_at(line, column, "unterminated string literal"));
      }
      if c == '\n' {
        self.bump();
        self.line += 1;
        self.line_start = self.pos;
        continue;
      }
      self.bump();
    }
    let body_end = self.pos;
    for _ in 0..quote_len {
      self.bump();
    }

    let src = self.src;
    let body = &src[body_start..body_end];
    let kind = if formatted {
      TokenKind::FString(split_fstring(body, self.offset(body_start), raw).map_err(|m| self.error_at(line, column, m))?)
    } else {
      let value = if raw { body.to_string() } else { unescape(body).map_err(|m| self.error_at(line, column, m))? };
      TokenKind::Str { value, bytes }
    };
    self.push_at(kind, start, line, column);
    Ok(())
  }

  fn lex_operator(&mut self) -> Result<(), ParseError> {
    let src = self.src;
    let rest = &src[self.pos..];
    let Some(op) = OPERATORS.iter().copied().find(|op| rest.starts_with(op)) else {
      let c = self.peek().unwrap_or('\0');
      return Err(self.error(&format!("invalid character '{}'", c)));
    };
    match op {
      "(" | "[" | "{" => self.depth += 1,
      ")" | "]" | "}" => {
        if self.depth == 0 {
          return Err(self.error(&format!("unmatched '{}'", op)));
        }
        self.depth -= 1;
      }
      _ => {}
    }
    let start = self.pos;
    let column = self.column();
    self.pos += op.len();
    self.push_at(TokenKind::Op(op), start, self.line, column);
    Ok(())
  }

  fn skip_comment(&mut self) {
    while self.peek().is_some_and(|c| c != '\n' && c != '\r') {
      self.bump();
    }
  }

  fn eat_newline(&mut self) -> bool {
    let consumed = match (self.peek(), self.peek_at(1)) {
      (Some('\r'), Some('\n')) => 2,
      (Some('\n'), _) | (Some('\r'), _) => 1,
      _ => 0,
    };
    if consumed == 0 {
      return false;
    }
    self.pos += consumed;
    self.line += 1;
    self.line_start = self.pos;
    true
  }

  fn peek(&self) -> Option<char> {
    self.src[self.pos..].chars().next()
  }

  fn peek_at(&self, n: usize) -> Option<char> {
    self.src[self.pos..].chars().nth(n)
  }

  fn bump(&mut self) {
    if let Some(c) = self.peek() {
      self.pos += c.len_utf8();
    }
  }

  fn offset(&self, pos: usize) -> usize {
    self.base + pos.saturating_sub(self.skip)
  }

  fn column(&self) -> usize {
    self.pos - self.line_start + 1
  }

  fn push_at(&mut self, kind: TokenKind, start: usize, line: usize, column: usize) {
    let span = Span::new(self.offset(start), self.offset(self.pos.max(start)));
    self.tokens.push(Token {
      kind,
      span,
      line,
      column,
    });
  }

  fn error(&self, message: &str) -> ParseError {
    ParseError::new(self.line, self.column(), message)
  }

  fn error_at(&self, line: usize, column: usize, message: &str) -> ParseError {
    ParseError::new(line, column, message)
  }
}

fn is_string_prefix(word: &str) -> bool {
  matches!(
    word.to_ascii_lowercase().as_str(),
    "r" | "u" | "b" | "f" | "br" | "rb" | "fr" | "rf"
  )
}

/// Process backslash escapes in a non-raw string body.
pub fn unescape(body: &str) -> Result<String, &'static str> {
  let mut out = String::with_capacity(body.len());
  let mut chars = body.chars().peekable();
  while let Some(c) = chars.next() {
    if c != '\\' {
      out.push(c);
      continue;
    }
    let Some(e) = chars.next() else {
      out.push('\\');
      break;
    };
    match e {
      '\n' => {}
      '\r' => {
        chars.next_if_eq(&'\n');
      }
      '\\' => out.push('\\'),
      '\'' => out.push('\''),
      '"' => out.push('"'),
      'n' => out.push('\n'),
      't' => out.push('\t'),
      'r' => out.push('\r'),
      'a' => out.push('\x07'),
      'b' => out.push('\x08'),
      'f' => out.push('\x0c'),
      'v' => out.push('\x0b'),
      '0'..='7' => {
        let mut code = e.to_digit(8).unwrap_or(0);
        for _ in 0..2 {
          match chars.peek().and_then(|d| d.to_digit(8)) {
            Some(d) => {
              code = code * 8 + d;
              chars.next();
            }
            None => break,
          }
        }
        out.push(char::from_u32(code).ok_or("invalid octal escape")?);
      }
      'x' | 'u' | 'U' => {
        let width = match e {
          'x' => 2,
          'u' => 4,
          _ => 8,
        };
        let hex: String = (0..width).filter_map(|_| chars.next()).collect();
        if hex.len() != width {
          return Err("truncated escape sequence");
        }
        let code = u32::from_str_radix(&hex, 16).map_err(|_| "invalid escape sequence")?;
        out.push(char::from_u32(code).ok_or("invalid unicode escape")?);
      }
      'N' => return Err("named unicode escapes are not supported"),
      other => {
        out.push('\\');
        out.push(other);
      }
    }
  }
  Ok(out)
}

/// Split an f-string body into literal and expression pieces.
fn split_fstring(body: &str, offset: usize, raw: bool) -> Result<Vec<FPiece>, &'static str> {
  let mut pieces = Vec::new();
  let mut literal = String::new();
  let bytes = body.as_bytes();
  let mut i = 0;

  let flush = |literal: &mut String, pieces: &mut Vec<FPiece>| -> Result<(), &'static str> {
    if !literal.is_empty() {
      let text = if raw { literal.clone() } else { unescape(literal)? };
      pieces.push(FPiece::Lit(text));
      literal.clear();
    }
    Ok(())
  };

  while i < bytes.len() {
    match bytes[i] {
      b'{' if bytes.get(i + 1) == Some(&b'{') => {
        literal.push('{');
        i += 2;
      }
      b'}' if bytes.get(i + 1) == Some(&b'}') => {
        literal.push('}');
        i += 2;
      }
      b'}' => return Err("single '}' is not allowed in f-string"),
      b'{' => {
        flush(&mut literal, &mut pieces)?;
        let expr_start = i + 1;
        let mut depth = 0usize;
        let mut quote: Option<u8> = None;
        let mut j = expr_start;
        let mut expr_end = None;
        let mut conversion = None;
        let mut spec_start = None;
        while j < bytes.len() {
          let b = bytes[j];
          if let Some(q) = quote {
            if b == q {
              quote = None;
            }
            j += 1;
            continue;
          }
          match b {
            b'\'' | b'"' => quote = Some(b),
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            b'}' if depth > 0 => depth -= 1,
            b'}' => {
              expr_end.get_or_insert(j);
              break;
            }
            b'!' if depth == 0 && bytes.get(j + 1) != Some(&b'=') && expr_end.is_none() => {
              expr_end = Some(j);
              conversion = bytes.get(j + 1).map(|&c| c as char);
              j += 1;
            }
            b':' if depth == 0 && spec_start.is_none() => {
              expr_end.get_or_insert(j);
              spec_start = Some(j + 1);
              // The spec runs to the closing brace.
              match body[j + 1..].find(['{', '}']) {
                Some(k) if bytes[j + 1 + k] == b'}' => {
                  j = j + 1 + k;
                  break;
                }
                Some(_) => return Err("nested format specifications are not supported"),
                None => return Err("f-string: expecting '}'"),
              }
            }
            _ => {}
          }
          j += 1;
        }
        if j >= bytes.len() {
          return Err("f-string: expecting '}'");
        }
        let end = expr_end.unwrap_or(j);
        let source = body[expr_start..end].trim_end_matches('=').to_string();
        if source.trim().is_empty() {
          return Err("f-string: empty expression not allowed");
        }
        if let Some(c) = conversion
          && !matches!(c, 'r' | 's' | 'a')
        {
          return Err("f-string: invalid conversion character");
        }
        let spec = spec_start.map(|s| body[s..j].to_string());
        pieces.push(FPiece::Expr {
          source,
          offset: offset + expr_start,
          conversion,
          spec,
        });
        i = j + 1;
      }
      _ => {
        let ch = body[i..].chars().next().unwrap_or('\0');
        literal.push(ch);
        i += ch.len_utf8().max(1);
      }
    }
  }
  flush(&mut literal, &mut pieces)?;
  Ok(pieces)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(src: &str) -> Vec<TokenKind> {
    Lexer::new(src, 0)
      .tokenize()
      .unwrap()
      .into_iter()
      .map(|t| t.kind)
      .collect()
  }

  #[test]
  fn simple_assignment() {
    assert_eq!(
      kinds("x = 1\n"),
      vec![
        TokenKind::Name("x".into()),
        TokenKind::Op("="),
        TokenKind::Int(1),
        TokenKind::Newline,
        TokenKind::Eof,
      ]
    );
  }

  #[test]
  fn newlines_inside_brackets_are_joined() {
    let tokens = kinds("x = [\n  1,\n  2,\n]\n");
    assert_eq!(tokens.iter().filter(|k| **k == TokenKind::Newline).count(), 1);
  }

  #[test]
  fn indentation_emits_markers() {
    let tokens = kinds("if x:\n    y = 1\nz = 2\n");
    assert!(tokens.contains(&TokenKind::Indent));
    assert!(tokens.contains(&TokenKind::Dedent));
  }

  #[test]
  fn numbers() {
    assert_eq!(kinds("1_000")[0], TokenKind::Int(1000));
    assert_eq!(kinds("0x1F")[0], TokenKind::Int(31));
    assert_eq!(kinds("1.5e3")[0], TokenKind::Float(1500.0));
    assert_eq!(kinds(".25")[0], TokenKind::Float(0.25));
    assert_eq!(kinds("1.")[0], TokenKind::Float(1.0));
  }

  #[test]
  fn strings_and_escapes() {
    assert_eq!(
      kinds(r#"'a\tb'"#)[0],
      TokenKind::Str {
        value: "a\tb".into(),
        bytes: false
      }
    );
    assert_eq!(
      kinds(r#"r'a\tb'"#)[0],
      TokenKind::Str {
        value: "a\\tb".into(),
        bytes: false
      }
    );
    assert_eq!(
      kinds("'''multi\nline'''")[0],
      TokenKind::Str {
        value: "multi\nline".into(),
        bytes: false
      }
    );
  }

  #[test]
  fn fstring_pieces() {
    let TokenKind::FString(pieces) = &kinds("f'{a}-{b!r:>4}{{x}}'")[0] else {
      panic!("expected f-string");
    };
    assert_eq!(pieces.len(), 4);
    assert!(matches!(&pieces[0], FPiece::Expr { source, offset: 3, .. } if source == "a"));
    assert_eq!(pieces[1], FPiece::Lit("-".into()));
    assert!(matches!(
      &pieces[2],
      FPiece::Expr { source, conversion: Some('r'), spec: Some(spec), .. } if source == "b" && spec == ">4"
    ));
    assert_eq!(pieces[3], FPiece::Lit("{x}".into()));
  }

  #[test]
  fn unterminated_string_is_an_error() {
    let err = Lexer::new("x = 'abc\n", 0).tokenize().unwrap_err();
    assert_eq!(err.line, 1);
    assert!(err.message.contains("unterminated"));
  }

  #[test]
  fn unmatched_bracket_is_an_error() {
    assert!(Lexer::new("x = 1)\n", 0).tokenize().is_err());
    assert!(Lexer::new("x = (1\n", 0).tokenize().is_err());
  }

  #[test]
  fn comments_and_blank_lines_are_skipped() {
    let tokens = kinds("# header\n\nx = 1  # trailing\n   \n");
    assert_eq!(tokens.len(), 5);
  }
}
