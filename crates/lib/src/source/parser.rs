//! Recursive-descent parser over the token stream.

use super::ast::*;
use super::lexer::{FPiece, Token, TokenKind};
use super::{ParseError, Span};

const KEYWORDS: &[&str] = &[
  "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del", "elif",
  "else", "except", "finally", "for", "from", "global", "if", "import", "in", "is", "lambda", "nonlocal", "not", "or",
  "pass", "raise", "return", "try", "while", "with", "yield",
];

/// Statements that open an indented block.
const COMPOUND: &[&str] = &["if", "for", "while", "def", "class", "with", "try", "async"];

/// Clauses that continue a compound statement at the same indentation.
const CONTINUATIONS: &[&str] = &["elif", "else", "except", "finally"];

/// Simple statements kept as unsupported spans.
/// Bound on nested brackets, unary operators and operator chains in one expression.
pub(crate) const MAX_NESTING: usize = 50;

const SIMPLE_UNSUPPORTED: &[&str] = &[
  "del", "global", "nonlocal", "assert", "raise", "return", "break", "continue", "yield", "await",
];

pub struct Parser {
  tokens: Vec<Token>,
  pos: usize,
  depth: usize,
}

impl Parser {
  pub fn new(tokens: Vec<Token>) -> Self {
    Self {
      tokens,
      pos: 0,
      depth: 0,
    }
  }

  pub fn parse_module(mut self) -> Result<Module, ParseError> {
    let mut body = Vec::new();
    loop {
      match self.kind() {
        TokenKind::Eof => break,
        TokenKind::Newline => self.advance(),
        TokenKind::Indent => return Err(self.error("unexpected indent")),
        TokenKind::Dedent => return Err(self.error("unexpected dedent")),
        _ => self.parse_statement_line(&mut body)?,
      }
    }
    Ok(Module { body })
  }

  /// Parse the `(expression\n)` wrapper built by `parse_fragment`; the result
  /// keeps the spans of the wrapped text only.
  pub fn parse_standalone_expression(mut self) -> Result<Expr, ParseError> {
    self.expect_op("(")?;
    let start = self.start();
    let mut expr = self.parse_star_expressions()?;
    if self.at_keyword("for") {
      let generators = self.parse_comprehensions()?;
      expr = self.finish(
        ExprKind::GeneratorExp {
          elt: Box::new(expr),
          generators,
        },
        start,
      );
    }
    self.expect_op(")")?;
    while matches!(self.kind(), TokenKind::Newline) {
      self.advance();
    }
    if !matches!(self.kind(), TokenKind::Eof) {
      return Err(self.invalid_syntax());
    }
    Ok(expr)
  }

  // ---------------------------------------------------------------------------
  // Statements
  // ---------------------------------------------------------------------------

  fn parse_statement_line(&mut self, body: &mut Vec<Stmt>) -> Result<(), ParseError> {
    let opens_block = match self.kind() {
      TokenKind::Name(kw) => COMPOUND.contains(&kw.as_str()) || CONTINUATIONS.contains(&kw.as_str()),
      TokenKind::Op("@") => true,
      _ => false,
    };
    if opens_block {
      body.push(self.parse_block_statement());
      return Ok(());
    }

    loop {
      body.push(self.parse_small_statement()?);
      if self.eat_op(";") && !matches!(self.kind(), TokenKind::Newline | TokenKind::Eof) {
        continue;
      }
      break;
    }
    match self.kind() {
      TokenKind::Newline => {
        self.advance();
        Ok(())
      }
      TokenKind::Eof => Ok(()),
      _ => Err(self.invalid_syntax()),
    }
  }

  /// Skip a compound statement, including its block and continuation clauses.
  fn parse_block_statement(&mut self) -> Stmt {
    let start = self.current().clone();
    let keyword = match &start.kind {
      TokenKind::Name(kw) => kw.clone(),
      _ => "decorator".to_string(),
    };

    self.skip_logical_line();
    self.skip_block();
    while matches!(self.kind(), TokenKind::Name(kw) if CONTINUATIONS.contains(&kw.as_str())) {
      self.skip_logical_line();
      self.skip_block();
    }

    Stmt {
      kind: StmtKind::Unsupported { keyword },
      span: Span::new(start.span.start, self.prev_end()),
      line: start.line,
    }
  }

  fn skip_logical_line(&mut self) {
    while !matches!(self.kind(), TokenKind::Newline | TokenKind::Eof) {
      self.advance();
    }
    if matches!(self.kind(), TokenKind::Newline) {
      self.advance();
    }
  }

  fn skip_block(&mut self) {
    if !matches!(self.kind(), TokenKind::Indent) {
      return;
    }
    let mut depth = 0usize;
    loop {
      match self.kind() {
        TokenKind::Indent => depth += 1,
        TokenKind::Dedent => {
          depth -= 1;
          if depth == 0 {
            self.advance();
            return;
          }
        }
        TokenKind::Eof => return,
        _ => {}
      }
      self.advance();
    }
  }

  fn parse_small_statement(&mut self) -> Result<Stmt, ParseError> {
    let start = self.current().clone();
    let kind = match &start.kind {
      TokenKind::Name(kw) if kw == "pass" => {
        self.advance();
        StmtKind::Pass
      }
      TokenKind::Name(kw) if kw == "import" => self.parse_import()?,
      TokenKind::Name(kw) if kw == "from" => self.parse_from_import()?,
      TokenKind::Name(kw) if SIMPLE_UNSUPPORTED.contains(&kw.as_str()) => {
        let keyword = kw.clone();
        while !matches!(self.kind(), TokenKind::Newline | TokenKind::Eof | TokenKind::Op(";")) {
          self.advance();
        }
        StmtKind::Unsupported { keyword }
      }
      _ => self.parse_expression_statement()?,
    };
    Ok(Stmt {
      kind,
      span: Span::new(start.span.start, self.prev_end()),
      line: start.line,
    })
  }

  fn parse_expression_statement(&mut self) -> Result<StmtKind, ParseError> {
    let first = self.parse_star_expressions()?;

    if self.at_op("=") {
      let mut exprs = vec![first];
      while self.eat_op("=") {
        exprs.push(self.parse_star_expressions()?);
      }
      let value = exprs.pop().ok_or_else(|| self.invalid_syntax())?;
      for target in &exprs {
        self.check_target(target)?;
      }
      return Ok(StmtKind::Assign { targets: exprs, value });
    }

    if self.eat_op(":") {
      if !matches!(
        first.kind,
        ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. }
      ) {
        return Err(self.error("illegal target for annotation"));
      }
      let annotation = self.parse_test()?;
      let value = if self.eat_op("=") {
        Some(self.parse_star_expressions()?)
      } else {
        None
      };
      return Ok(StmtKind::AnnAssign {
        target: first,
        annotation,
        value,
      });
    }

    if let TokenKind::Op(op) = self.kind()
      && let Some(bin) = BinOp::from_augmented(op)
    {
      if !matches!(
        first.kind,
        ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. }
      ) {
        return Err(self.error("illegal expression for augmented assignment"));
      }
      self.advance();
      let value = self.parse_star_expressions()?;
      return Ok(StmtKind::AugAssign {
        target: first,
        op: bin,
        value,
      });
    }

    Ok(StmtKind::Expr(first))
  }

  fn check_target(&self, target: &Expr) -> Result<(), ParseError> {
    match &target.kind {
      ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => Ok(()),
      ExprKind::Tuple(items) | ExprKind::List(items) => items.iter().try_for_each(|item| match &item.kind {
        ExprKind::Starred(inner) => self.check_target(inner),
        _ => self.check_target(item),
      }),
      _ => Err(self.error("cannot assign to expression")),
    }
  }

  fn parse_import(&mut self) -> Result<StmtKind, ParseError> {
    self.expect_keyword("import")?;
    let mut names = Vec::new();
    loop {
      let name = self.parse_dotted_name()?;
      let asname = if self.eat_keyword("as") {
        Some(self.expect_name()?)
      } else {
        None
      };
      names.push(Alias { name, asname });
      if !self.eat_op(",") {
        break;
      }
    }
    Ok(StmtKind::Import(names))
  }

  fn parse_from_import(&mut self) -> Result<StmtKind, ParseError> {
    self.expect_keyword("from")?;
    let mut module = String::new();
    loop {
      if self.eat_op(".") {
        module.push('.');
      } else if self.eat_op("...") {
        module.push_str("...");
      } else {
        break;
      }
    }
    if !self.at_keyword("import") {
      module.push_str(&self.parse_dotted_name()?);
    }
    self.expect_keyword("import")?;

    if self.eat_op("*") {
      return Ok(StmtKind::ImportFrom {
        module,
        names: vec![Alias {
          name: "*".to_string(),
          asname: None,
        }],
      });
    }

    let parenthesized = self.eat_op("(");
    let mut names = Vec::new();
    loop {
      if parenthesized && self.at_op(")") {
        break;
      }
      let name = self.expect_name()?;
      let asname = if self.eat_keyword("as") {
        Some(self.expect_name()?)
      } else {
        None
      };
      names.push(Alias { name, asname });
      if !self.eat_op(",") {
        break;
      }
    }
    if parenthesized {
      self.expect_op(")")?;
    }
    if names.is_empty() {
      return Err(self.invalid_syntax());
    }
    Ok(StmtKind::ImportFrom { module, names })
  }

  fn parse_dotted_name(&mut self) -> Result<String, ParseError> {
    let mut name = self.expect_name()?;
    while self.eat_op(".") {
      name.push('.');
      name.push_str(&self.expect_name()?);
    }
    Ok(name)
  }

  // ---------------------------------------------------------------------------
  // Expressions
  // ---------------------------------------------------------------------------

  /// Comma-separated expressions; more than one (or a trailing comma) makes a tuple.
  fn parse_star_expressions(&mut self) -> Result<Expr, ParseError> {
    let start = self.start();
    let first = self.parse_star_or_test()?;
    if !self.at_op(",") {
      return Ok(first);
    }
    let mut items = vec![first];
    while self.eat_op(",") {
      if self.at_expression_end() {
        break;
      }
      items.push(self.parse_star_or_test()?);
    }
    Ok(self.finish(ExprKind::Tuple(items), start))
  }

  fn at_expression_end(&self) -> bool {
    match self.kind() {
      TokenKind::Newline | TokenKind::Eof => true,
      TokenKind::Op(op) => {
        matches!(*op, "=" | ")" | "]" | "}" | ";" | ":") || BinOp::from_augmented(op).is_some()
      }
      _ => false,
    }
  }

  fn parse_star_or_test(&mut self) -> Result<Expr, ParseError> {
    if self.at_op("*") {
      let start = self.start();
      self.advance();
      let inner = self.parse_bitor()?;
      return Ok(self.finish(ExprKind::Starred(Box::new(inner)), start));
    }
    self.parse_test()
  }

  fn parse_test(&mut self) -> Result<Expr, ParseError> {
    if self.at_keyword("lambda") {
      return self.parse_lambda();
    }
    let start = self.start();
    let body = self.parse_or_test()?;
    if !self.eat_keyword("if") {
      return Ok(body);
    }
    let test = self.parse_or_test()?;
    self.expect_keyword("else")?;
    let orelse = self.nested(Self::parse_test)?;
    Ok(self.finish(
      ExprKind::IfExp {
        test: Box::new(test),
        body: Box::new(body),
        orelse: Box::new(orelse),
      },
      start,
    ))
  }

  fn parse_lambda(&mut self) -> Result<Expr, ParseError> {
    let start = self.start();
    self.expect_keyword("lambda")?;
    let mut params = Vec::new();
    while !self.at_op(":") {
      if self.eat_op("*") || self.eat_op("**") {
        continue;
      }
      params.push(self.expect_name()?);
      if self.eat_op("=") {
        self.parse_test()?;
      }
      if !self.eat_op(",") {
        break;
      }
    }
    self.expect_op(":")?;
    let body = self.nested(Self::parse_test)?;
    Ok(self.finish(
      ExprKind::Lambda {
        params,
        body: Box::new(body),
      },
      start,
    ))
  }

  fn parse_or_test(&mut self) -> Result<Expr, ParseError> {
    self.parse_bool_chain("or", BoolOp::Or, Self::parse_and_test)
  }

  fn parse_and_test(&mut self) -> Result<Expr, ParseError> {
    self.parse_bool_chain("and", BoolOp::And, Self::parse_not_test)
  }

  fn parse_bool_chain(
    &mut self,
    keyword: &str,
    op: BoolOp,
    next: fn(&mut Self) -> Result<Expr, ParseError>,
  ) -> Result<Expr, ParseError> {
    let start = self.start();
    let first = next(self)?;
    if !self.at_keyword(keyword) {
      return Ok(first);
    }
    let mut values = vec![first];
    while self.eat_keyword(keyword) {
      values.push(next(self)?);
    }
    Ok(self.finish(ExprKind::BoolOp { op, values }, start))
  }

  fn parse_not_test(&mut self) -> Result<Expr, ParseError> {
    if self.at_keyword("not") {
      let start = self.start();
      self.advance();
      let operand = self.nested(Self::parse_not_test)?;
      return Ok(self.finish(
        ExprKind::Unary {
          op: UnaryOp::Not,
          operand: Box::new(operand),
        },
        start,
      ));
    }
    self.parse_comparison()
  }

  fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
    let start = self.start();
    let left = self.parse_bitor()?;
    let mut ops = Vec::new();
    loop {
      let (op, width) = match self.kind() {
        TokenKind::Op("==") => (CmpOp::Eq, 1),
        TokenKind::Op("!=") => (CmpOp::NotEq, 1),
        TokenKind::Op("<") => (CmpOp::Lt, 1),
        TokenKind::Op("<=") => (CmpOp::LtE, 1),
        TokenKind::Op(">") => (CmpOp::Gt, 1),
        TokenKind::Op(">=") => (CmpOp::GtE, 1),
        TokenKind::Name(kw) if kw == "in" => (CmpOp::In, 1),
        TokenKind::Name(kw) if kw == "not" && self.peek_is_keyword(1, "in") => (CmpOp::NotIn, 2),
        TokenKind::Name(kw) if kw == "is" && self.peek_is_keyword(1, "not") => (CmpOp::IsNot, 2),
        TokenKind::Name(kw) if kw == "is" => (CmpOp::Is, 1),
        _ => break,
      };
      for _ in 0..width {
        self.advance();
      }
      ops.push((op, self.parse_bitor()?));
    }
    if ops.is_empty() {
      return Ok(left);
    }
    Ok(self.finish(
      ExprKind::Compare {
        left: Box::new(left),
        ops,
      },
      start,
    ))
  }

  fn parse_bitor(&mut self) -> Result<Expr, ParseError> {
    self.parse_binary_level(&[("|", BinOp::BitOr)], Self::parse_xor)
  }

  fn parse_xor(&mut self) -> Result<Expr, ParseError> {
    self.parse_binary_level(&[("^", BinOp::BitXor)], Self::parse_bitand)
  }

  fn parse_bitand(&mut self) -> Result<Expr, ParseError> {
    self.parse_binary_level(&[("&", BinOp::BitAnd)], Self::parse_shift)
  }

  fn parse_shift(&mut self) -> Result<Expr, ParseError> {
    self.parse_binary_level(&[("<<", BinOp::LShift), (">>", BinOp::RShift)], Self::parse_arith)
  }

  fn parse_arith(&mut self) -> Result<Expr, ParseError> {
    self.parse_binary_level(&[("+", BinOp::Add), ("-", BinOp::Sub)], Self::parse_term)
  }

  fn parse_term(&mut self) -> Result<Expr, ParseError> {
    self.parse_binary_level(
      &[
        ("*", BinOp::Mul),
        ("/", BinOp::Div),
        ("//", BinOp::FloorDiv),
        ("%", BinOp::Mod),
        ("@", BinOp::MatMul),
      ],
      Self::parse_factor,
    )
  }

  /// Left-associative binary operators at one precedence level.
  fn parse_binary_level(
    &mut self,
    ops: &[(&str, BinOp)],
    next: fn(&mut Self) -> Result<Expr, ParseError>,
  ) -> Result<Expr, ParseError> {
    let start = self.start();
    let mut left = next(self)?;
    let mut links = 0;
    loop {
      let Some(op) = ops.iter().find(|(sym, _)| self.at_op(sym)).map(|(_, op)| *op) else {
        return Ok(left);
      };
      links += 1;
      self.check_chain(links)?;
      self.advance();
      let right = next(self)?;
      left = self.finish(
        ExprKind::Binary {
          left: Box::new(left),
          op,
          right: Box::new(right),
        },
        start,
      );
    }
  }

  fn parse_factor(&mut self) -> Result<Expr, ParseError> {
    let op = match self.kind() {
      TokenKind::Op("+") => UnaryOp::Plus,
      TokenKind::Op("-") => UnaryOp::Minus,
      TokenKind::Op("~") => UnaryOp::Invert,
      _ => return self.parse_power(),
    };
    let start = self.start();
    self.advance();
    let operand = self.nested(Self::parse_factor)?;
    Ok(self.finish(
      ExprKind::Unary {
        op,
        operand: Box::new(operand),
      },
      start,
    ))
  }

  fn parse_power(&mut self) -> Result<Expr, ParseError> {
    let start = self.start();
    let base = self.parse_primary()?;
    if !self.eat_op("**") {
      return Ok(base);
    }
    let exponent = self.nested(Self::parse_factor)?;
    Ok(self.finish(
      ExprKind::Binary {
        left: Box::new(base),
        op: BinOp::Pow,
        right: Box::new(exponent),
      },
      start,
    ))
  }

  fn parse_primary(&mut self) -> Result<Expr, ParseError> {
    let start = self.start();
    let mut expr = self.parse_atom()?;
    let mut links = 0;
    loop {
      if self.at_op("(") || self.at_op("[") || self.at_op(".") {
        links += 1;
        self.check_chain(links)?;
      }
      if self.at_op("(") {
        expr = self.parse_call(expr, start)?;
      } else if self.eat_op("[") {
        let index = self.parse_subscript_list()?;
        self.expect_op("]")?;
        expr = self.finish(
          ExprKind::Subscript {
            value: Box::new(expr),
            index: Box::new(index),
          },
          start,
        );
      } else if self.eat_op(".") {
        let attr = self.expect_name()?;
        expr = self.finish(
          ExprKind::Attribute {
            value: Box::new(expr),
            attr,
          },
          start,
        );
      } else {
        return Ok(expr);
      }
    }
  }

  fn parse_call(&mut self, func: Expr, start: usize) -> Result<Expr, ParseError> {
    self.expect_op("(")?;
    let mut args = Vec::new();
    let mut keywords = Vec::new();
    loop {
      if self.at_op(")") {
        break;
      }
      if self.eat_op("**") {
        let value = self.parse_test()?;
        keywords.push(Keyword { name: None, value });
      } else if self.at_op("*") {
        args.push(self.parse_star_or_test()?);
      } else if matches!(self.kind(), TokenKind::Name(n) if !is_keyword(n)) && self.peek_is_op(1, "=") {
        let name = self.expect_name()?;
        self.expect_op("=")?;
        let value = self.parse_test()?;
        keywords.push(Keyword {
          name: Some(name),
          value,
        });
      } else {
        let arg_start = self.start();
        let arg = self.parse_test()?;
        if self.at_keyword("for") {
          let generators = self.parse_comprehensions()?;
          args.push(self.finish(
            ExprKind::GeneratorExp {
              elt: Box::new(arg),
              generators,
            },
            arg_start,
          ));
        } else {
          args.push(arg);
        }
      }
      if !self.eat_op(",") {
        break;
      }
    }
    self.expect_op(")")?;
    Ok(self.finish(
      ExprKind::Call {
        func: Box::new(func),
        args,
        keywords,
      },
      start,
    ))
  }

  fn parse_subscript_list(&mut self) -> Result<Expr, ParseError> {
    let start = self.start();
    let first = self.parse_subscript_item()?;
    if !self.at_op(",") {
      return Ok(first);
    }
    let mut items = vec![first];
    while self.eat_op(",") {
      if self.at_op("]") {
        break;
      }
      items.push(self.parse_subscript_item()?);
    }
    Ok(self.finish(ExprKind::Tuple(items), start))
  }

  fn parse_subscript_item(&mut self) -> Result<Expr, ParseError> {
    let start = self.start();
    let lower = if self.at_op(":") {
      None
    } else {
      let expr = self.parse_test()?;
      if !self.at_op(":") {
        return Ok(expr);
      }
      Some(Box::new(expr))
    };
    self.expect_op(":")?;
    let upper = if self.at_op(":") || self.at_op("]") || self.at_op(",") {
      None
    } else {
      Some(Box::new(self.parse_test()?))
    };
    let step = if self.eat_op(":") && !(self.at_op("]") || self.at_op(",")) {
      Some(Box::new(self.parse_test()?))
    } else {
      None
    };
    Ok(self.finish(ExprKind::Slice { lower, upper, step }, start))
  }

  fn parse_atom(&mut self) -> Result<Expr, ParseError> {
    let start = self.start();
    match self.kind().clone() {
      TokenKind::Op("(") => self.nested(|p| p.parse_paren(start)),
      TokenKind::Op("[") => self.nested(|p| p.parse_list_display(start)),
      TokenKind::Op("{") => self.nested(|p| p.parse_brace_display(start)),
      TokenKind::Op("...") => {
        self.advance();
        Ok(self.finish(ExprKind::Constant(Constant::Ellipsis), start))
      }
      TokenKind::Name(name) => {
        let kind = match name.as_str() {
          "None" => ExprKind::Constant(Constant::None),
          "True" => ExprKind::Constant(Constant::Bool(true)),
          "False" => ExprKind::Constant(Constant::Bool(false)),
          n if is_keyword(n) => return Err(self.invalid_syntax()),
          _ => ExprKind::Name(name),
        };
        self.advance();
        Ok(self.finish(kind, start))
      }
      TokenKind::Int(i) => {
        self.advance();
        Ok(self.finish(ExprKind::Constant(Constant::Int(i)), start))
      }
      TokenKind::Float(f) => {
        self.advance();
        Ok(self.finish(ExprKind::Constant(Constant::Float(f)), start))
      }
      TokenKind::Str { .. } | TokenKind::FString(_) => self.parse_strings(start),
      _ => Err(self.invalid_syntax()),
    }
  }

  fn parse_paren(&mut self, start: usize) -> Result<Expr, ParseError> {
    self.expect_op("(")?;
    if self.eat_op(")") {
      return Ok(self.finish(ExprKind::Tuple(Vec::new()), start));
    }
    let first = self.parse_star_or_test()?;
    if self.at_keyword("for") {
      let generators = self.parse_comprehensions()?;
      self.expect_op(")")?;
      return Ok(self.finish(
        ExprKind::GeneratorExp {
          elt: Box::new(first),
          generators,
        },
        start,
      ));
    }
    if !self.at_op(",") {
      self.expect_op(")")?;
      return Ok(first);
    }
    let mut items = vec![first];
    while self.eat_op(",") {
      if self.at_op(")") {
        break;
      }
      items.push(self.parse_star_or_test()?);
    }
    self.expect_op(")")?;
    Ok(self.finish(ExprKind::Tuple(items), start))
  }

  fn parse_list_display(&mut self, start: usize) -> Result<Expr, ParseError> {
    self.expect_op("[")?;
    if self.eat_op("]") {
      return Ok(self.finish(ExprKind::List(Vec::new()), start));
    }
    let first = self.parse_star_or_test()?;
    if self.at_keyword("for") {
      let generators = self.parse_comprehensions()?;
      self.expect_op("]")?;
      return Ok(self.finish(
        ExprKind::ListComp {
          elt: Box::new(first),
          generators,
        },
        start,
      ));
    }
    let mut items = vec![first];
    while self.eat_op(",") {
      if self.at_op("]") {
        break;
      }
      items.push(self.parse_star_or_test()?);
    }
    self.expect_op("]")?;
    Ok(self.finish(ExprKind::List(items), start))
  }

  fn parse_brace_display(&mut self, start: usize) -> Result<Expr, ParseError> {
    self.expect_op("{")?;
    if self.eat_op("}") {
      return Ok(self.finish(ExprKind::Dict(Vec::new()), start));
    }

    let first_item = if self.eat_op("**") {
      DictItem::Unpack(self.parse_bitor()?)
    } else {
      let first = self.parse_star_or_test()?;
      if !self.eat_op(":") {
        return self.parse_set_rest(first, start);
      }
      let value = self.parse_test()?;
      if self.at_keyword("for") {
        let generators = self.parse_comprehensions()?;
        self.expect_op("}")?;
        return Ok(self.finish(
          ExprKind::DictComp {
            key: Box::new(first),
            value: Box::new(value),
            generators,
          },
          start,
        ));
      }
      DictItem::Pair(first, value)
    };

    let mut items = vec![first_item];
    while self.eat_op(",") {
      if self.at_op("}") {
        break;
      }
      if self.eat_op("**") {
        items.push(DictItem::Unpack(self.parse_bitor()?));
      } else {
        let key = self.parse_test()?;
        self.expect_op(":")?;
        let value = self.parse_test()?;
        items.push(DictItem::Pair(key, value));
      }
    }
    self.expect_op("}")?;
    Ok(self.finish(ExprKind::Dict(items), start))
  }

  fn parse_set_rest(&mut self, first: Expr, start: usize) -> Result<Expr, ParseError> {
    if self.at_keyword("for") {
      let generators = self.parse_comprehensions()?;
      self.expect_op("}")?;
      return Ok(self.finish(
        ExprKind::SetComp {
          elt: Box::new(first),
          generators,
        },
        start,
      ));
    }
    let mut items = vec![first];
    while self.eat_op(",") {
      if self.at_op("}") {
        break;
      }
      items.push(self.parse_star_or_test()?);
    }
    self.expect_op("}")?;
    Ok(self.finish(ExprKind::Set(items), start))
  }

  fn parse_comprehensions(&mut self) -> Result<Vec<Comprehension>, ParseError> {
    let mut generators = Vec::new();
    while self.at_keyword("for") || (self.at_keyword("async") && self.peek_is_keyword(1, "for")) {
      if self.eat_keyword("async") {
        return Err(self.error("asynchronous comprehensions are not supported"));
      }
      self.expect_keyword("for")?;
      let target = self.parse_target_list()?;
      self.check_target(&target)?;
      self.expect_keyword("in")?;
      let iter = self.parse_or_test()?;
      let mut conditions = Vec::new();
      while self.eat_keyword("if") {
        conditions.push(self.parse_or_test()?);
      }
      generators.push(Comprehension {
        target,
        iter,
        conditions,
      });
    }
    Ok(generators)
  }

  fn parse_target_list(&mut self) -> Result<Expr, ParseError> {
    let start = self.start();
    let first = self.parse_target_item()?;
    if !self.at_op(",") {
      return Ok(first);
    }
    let mut items = vec![first];
    while self.eat_op(",") {
      if self.at_keyword("in") {
        break;
      }
      items.push(self.parse_target_item()?);
    }
    Ok(self.finish(ExprKind::Tuple(items), start))
  }

  fn parse_target_item(&mut self) -> Result<Expr, ParseError> {
    if self.at_op("*") {
      let start = self.start();
      self.advance();
      let inner = self.parse_bitor()?;
      return Ok(self.finish(ExprKind::Starred(Box::new(inner)), start));
    }
    self.parse_bitor()
  }

  /// Adjacent string literals concatenate; any f-string makes the result an f-string.
  fn parse_strings(&mut self, start: usize) -> Result<Expr, ParseError> {
    let mut parts: Vec<FStringPart> = Vec::new();
    let mut formatted = false;
    let mut bytes: Option<bool> = None;

    loop {
      match self.kind().clone() {
        TokenKind::Str { value, bytes: is_bytes } => {
          if bytes.is_some_and(|b| b != is_bytes) {
            return Err(self.error("cannot mix bytes and nonbytes literals"));
          }
          bytes = Some(is_bytes);
          match parts.last_mut() {
            Some(FStringPart::Literal(text)) => text.push_str(&value),
            _ => parts.push(FStringPart::Literal(value)),
          }
        }
        TokenKind::FString(pieces) => {
          if bytes == Some(true) {
            return Err(self.error("cannot mix bytes and nonbytes literals"));
          }
          bytes = Some(false);
          formatted = true;
          for piece in pieces {
            match piece {
              FPiece::Lit(value) => match parts.last_mut() {
                Some(FStringPart::Literal(text)) => text.push_str(&value),
                _ => parts.push(FStringPart::Literal(value)),
              },
              FPiece::Expr {
                source,
                offset,
                conversion,
                spec,
              } => {
                let value = super::parse_fragment(&source, offset)?;
                parts.push(FStringPart::Formatted {
                  value: Box::new(value),
                  conversion,
                  spec,
                });
              }
            }
          }
        }
        _ => break,
      }
      self.advance();
    }

    if formatted {
      return Ok(self.finish(ExprKind::FString(parts), start));
    }
    let text = match parts.pop() {
      Some(FStringPart::Literal(text)) => text,
      _ => String::new(),
    };
    let constant = if bytes == Some(true) {
      Constant::Bytes(text)
    } else {
      Constant::Str(text)
    };
    Ok(self.finish(ExprKind::Constant(constant), start))
  }

  // ---------------------------------------------------------------------------
  // Token helpers
  // ---------------------------------------------------------------------------

  fn current(&self) -> &Token {
    let last = self.tokens.len().saturating_sub(1);
    &self.tokens[self.pos.min(last)]
  }

  fn kind(&self) -> &TokenKind {
    &self.current().kind
  }

  fn peek_kind(&self, n: usize) -> Option<&TokenKind> {
    self.tokens.get(self.pos + n).map(|t| &t.kind)
  }

  fn peek_is_keyword(&self, n: usize, keyword: &str) -> bool {
    matches!(self.peek_kind(n), Some(TokenKind::Name(name)) if name == keyword)
  }

  fn peek_is_op(&self, n: usize, op: &str) -> bool {
    matches!(self.peek_kind(n), Some(TokenKind::Op(o)) if *o == op)
  }

  fn advance(&mut self) {
    if self.pos < self.tokens.len() {
      self.pos += 1;
    }
  }

  fn start(&self) -> usize {
    self.current().span.start
  }

  fn prev_end(&self) -> usize {
    match self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)) {
      Some(token) => token.span.end,
      None => self.current().span.start,
    }
  }

  fn finish(&self, kind: ExprKind, start: usize) -> Expr {
    Expr::new(kind, Span::new(start, self.prev_end()))
  }

  fn at_op(&self, op: &str) -> bool {
    matches!(self.kind(), TokenKind::Op(o) if *o == op)
  }

  fn eat_op(&mut self, op: &str) -> bool {
    if self.at_op(op) {
      self.advance();
      true
    } else {
      false
    }
  }

  fn expect_op(&mut self, op: &str) -> Result<(), ParseError> {
    if self.eat_op(op) {
      Ok(())
    } else {
      Err(self.error(&format!("expected '{}'", op)))
    }
  }

  fn at_keyword(&self, keyword: &str) -> bool {
    matches!(self.kind(), TokenKind::Name(name) if name == keyword)
  }

  fn eat_keyword(&mut self, keyword: &str) -> bool {
    if self.at_keyword(keyword) {
      self.advance();
      true
    } else {
      false
    }
  }

  fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
    if self.eat_keyword(keyword) {
      Ok(())
    } else {
      Err(self.error(&format!("expected '{}'", keyword)))
    }
  }

  fn expect_name(&mut self) -> Result<String, ParseError> {
    match self.kind() {
      TokenKind::Name(name) if !is_keyword(name) => {
        let name = name.clone();
        self.advance();
        Ok(name)
      }
      _ => Err(self.error("expected a name")),
    }
  }

  /// Run `parse` one nesting level deeper.
  fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, ParseError>) -> Result<T, ParseError> {
    if self.depth >= MAX_NESTING {
      return Err(self.error("expression too deeply nested"));
    }
    self.depth += 1;
    let result = parse(self);
    self.depth -= 1;
    result
  }

  /// Left-associative chains nest their operands as deeply as brackets do.
  fn check_chain(&self, links: usize) -> Result<(), ParseError> {
    if self.depth + links > MAX_NESTING {
      return Err(self.error("expression too deeply nested"));
    }
    Ok(())
  }

  fn error(&self, message: &str) -> ParseError {
    let token = self.current();
    ParseError::new(token.line, token.column, message)
  }

  fn invalid_syntax(&self) -> ParseError {
    self.error(&format!("invalid syntax near {}", describe(self.kind())))
  }
}

fn is_keyword(name: &str) -> bool {
  KEYWORDS.contains(&name)
}

fn describe(kind: &TokenKind) -> String {
  match kind {
    TokenKind::Name(name) => format!("'{}'", name),
    TokenKind::Int(i) => format!("'{}'", i),
    TokenKind::Float(f) => format!("'{}'", f),
    TokenKind::Str { .. } | TokenKind::FString(_) => "string literal".to_string(),
    TokenKind::Op(op) => format!("'{}'", op),
    TokenKind::Newline => "end of line".to_string(),
    TokenKind::Indent => "indent".to_string(),
    TokenKind::Dedent => "dedent".to_string(),
    TokenKind::Eof => "end of input".to_string(),
  }
}
