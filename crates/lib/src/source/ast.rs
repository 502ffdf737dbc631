//! Syntax tree for configuration documents.

use super::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
  pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
  pub kind: StmtKind,
  pub span: Span,
  pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
  /// `a = b = value`; more than one target for chained assignment.
  Assign { targets: Vec<Expr>, value: Expr },
  AnnAssign {
    target: Expr,
    annotation: Expr,
    value: Option<Expr>,
  },
  AugAssign { target: Expr, op: BinOp, value: Expr },
  Expr(Expr),
  Import(Vec<Alias>),
  /// `from module import names`; a single `*` alias for star imports.
  ImportFrom { module: String, names: Vec<Alias> },
  Pass,
  /// A statement kept only as a span: control flow, definitions and the rest.
  Unsupported { keyword: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
  pub name: String,
  pub asname: Option<String>,
}

impl Alias {
  /// The name this alias binds in the namespace.
  pub fn bound_name(&self) -> &str {
    match &self.asname {
      Some(asname) => asname,
      None => self.name.split('.').next().unwrap_or(&self.name),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
  pub kind: ExprKind,
  pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
  None,
  Bool(bool),
  Int(i64),
  Float(f64),
  Str(String),
  Bytes(String),
  Ellipsis,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
  Constant(Constant),
  FString(Vec<FStringPart>),
  Name(String),
  List(Vec<Expr>),
  Tuple(Vec<Expr>),
  Set(Vec<Expr>),
  Dict(Vec<DictItem>),
  Starred(Box<Expr>),
  Unary {
    op: UnaryOp,
    operand: Box<Expr>,
  },
  Binary {
    left: Box<Expr>,
    op: BinOp,
    right: Box<Expr>,
  },
  BoolOp {
    op: BoolOp,
    values: Vec<Expr>,
  },
  Compare {
    left: Box<Expr>,
    ops: Vec<(CmpOp, Expr)>,
  },
  IfExp {
    test: Box<Expr>,
    body: Box<Expr>,
    orelse: Box<Expr>,
  },
  Call {
    func: Box<Expr>,
    args: Vec<Expr>,
    keywords: Vec<Keyword>,
  },
  Attribute {
    value: Box<Expr>,
    attr: String,
  },
  Subscript {
    value: Box<Expr>,
    index: Box<Expr>,
  },
  Slice {
    lower: Option<Box<Expr>>,
    upper: Option<Box<Expr>>,
    step: Option<Box<Expr>>,
  },
  ListComp {
    elt: Box<Expr>,
    generators: Vec<Comprehension>,
  },
  SetComp {
    elt: Box<Expr>,
    generators: Vec<Comprehension>,
  },
  DictComp {
    key: Box<Expr>,
    value: Box<Expr>,
    generators: Vec<Comprehension>,
  },
  GeneratorExp {
    elt: Box<Expr>,
    generators: Vec<Comprehension>,
  },
  Lambda {
    params: Vec<String>,
    body: Box<Expr>,
  },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
  Literal(String),
  Formatted {
    value: Box<Expr>,
    conversion: Option<char>,
    spec: Option<String>,
  },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DictItem {
  Pair(Expr, Expr),
  /// `**mapping`
  Unpack(Expr),
}

/// A call keyword argument; `name` is `None` for `**mapping`.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
  pub name: Option<String>,
  pub value: Expr,
}

/// One `for target in iter if cond...` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
  pub target: Expr,
  pub iter: Expr,
  pub conditions: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
  Plus,
  Minus,
  Not,
  Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
  Add,
  Sub,
  Mul,
  Div,
  FloorDiv,
  Mod,
  Pow,
  MatMul,
  LShift,
  RShift,
  BitOr,
  BitXor,
  BitAnd,
}

impl BinOp {
  pub fn symbol(self) -> &'static str {
    match self {
      BinOp::Add => "+",
      BinOp::Sub => "-",
      BinOp::Mul => "*",
      BinOp::Div => "/",
      BinOp::FloorDiv => "//",
      BinOp::Mod => "%",
      BinOp::Pow => "**",
      BinOp::MatMul => "@",
      BinOp::LShift => "<<",
      BinOp::RShift => ">>",
      BinOp::BitOr => "|",
      BinOp::BitXor => "^",
      BinOp::BitAnd => "&",
    }
  }

  /// The seven arithmetic operators the tree-walking evaluator reduces itself.
  pub fn is_arithmetic(self) -> bool {
    matches!(
      self,
      BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::FloorDiv | BinOp::Mod | BinOp::Pow
    )
  }

  /// Operator for an augmented assignment token such as `+=`.
  pub fn from_augmented(op: &str) -> Option<Self> {
    Some(match op {
      "+=" => BinOp::Add,
      "-=" => BinOp::Sub,
      "*=" => BinOp::Mul,
      "/=" => BinOp::Div,
      "//=" => BinOp::FloorDiv,
      "%=" => BinOp::Mod,
      "**=" => BinOp::Pow,
      "@=" => BinOp::MatMul,
      "<<=" => BinOp::LShift,
      ">>=" => BinOp::RShift,
      "|=" => BinOp::BitOr,
      "^=" => BinOp::BitXor,
      "&=" => BinOp::BitAnd,
      _ => return None,
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
  And,
  Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
  Eq,
  NotEq,
  Lt,
  LtE,
  Gt,
  GtE,
  In,
  NotIn,
  Is,
  IsNot,
}

impl Expr {
  pub fn new(kind: ExprKind, span: Span) -> Self {
    Self { kind, span }
  }

  /// The identifier if this is a bare name.
  pub fn as_name(&self) -> Option<&str> {
    match &self.kind {
      ExprKind::Name(name) => Some(name),
      _ => None,
    }
  }
}

impl Module {
  /// Names bound by top-level assignments, in source order.
  pub fn assigned_names(&self) -> impl Iterator<Item = &str> {
    self.body.iter().flat_map(|stmt| {
      let targets: Vec<&Expr> = match &stmt.kind {
        StmtKind::Assign { targets, .. } => targets.iter().collect(),
        StmtKind::AnnAssign {
          target, value: Some(_), ..
        } => vec![target],
        StmtKind::AugAssign { target, .. } => vec![target],
        _ => Vec::new(),
      };
      targets.into_iter().filter_map(Expr::as_name)
    })
  }
}
