//! Front end for configuration source text.
//!
//! Account and strategy settings are stored as source text in a Python-syntax
//! subset. This module turns that text into a [`Module`] syntax tree. Nothing
//! here evaluates anything; see [`crate::eval`] and [`crate::sandbox`].
//!
//! # Example
//!
//! ```
//! use qronos_lib::source::{self, StmtKind};
//!
//! let module = source::parse_module("leverage = 2\nblack_list = []\n").unwrap();
//! assert_eq!(module.body.len(), 2);
//! assert!(matches!(module.body[0].kind, StmtKind::Assign { .. }));
//! ```

pub mod ast;
pub mod lexer;
mod parser;

use thiserror::Error;

pub use ast::*;
pub(crate) use parser::MAX_NESTING;

/// Byte range of a node in the text it was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
  pub start: usize,
  pub end: usize,
}

impl Span {
  pub fn new(start: usize, end: usize) -> Self {
    Self { start, end }
  }

  /// Smallest span covering both.
  pub fn to(self, other: Span) -> Span {
    Span::new(self.start.min(other.start), self.end.max(other.end))
  }

  /// The covered text, if the span lies within `text`.
  pub fn slice(self, text: &str) -> Option<&str> {
    text.get(self.start..self.end)
  }
}

/// Input text is not syntactically valid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at line {line}, column {column}: {message}")]
pub struct ParseError {
  pub line: usize,
  pub column: usize,
  pub message: String,
}

impl ParseError {
  pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
    Self {
      line,
      column,
      message: message.into(),
    }
  }
}

/// Parse a whole document.
pub fn parse_module(text: &str) -> Result<Module, ParseError> {
  let tokens = lexer::Lexer::new(text, 0).tokenize()?;
  parser::Parser::new(tokens).parse_module()
}

/// Parse a single expression, such as the text of one sub-expression span.
///
/// Line breaks that were inside the surrounding brackets of the original
/// document are accepted.
pub fn parse_expression(text: &str) -> Result<Expr, ParseError> {
  parse_fragment(text, 0)
}

/// Parse an expression located at byte `base` of some enclosing text, so that
/// spans in the result point into that enclosing text.
pub(crate) fn parse_fragment(text: &str, base: usize) -> Result<Expr, ParseError> {
  // Parenthesize so that newlines inside the fragment are joined.
  let wrapped = format!("({}\n)", text);
  let tokens = lexer::Lexer::for_fragment(&wrapped, base, 1).tokenize()?;
  parser::Parser::new(tokens).parse_standalone_expression()
}
