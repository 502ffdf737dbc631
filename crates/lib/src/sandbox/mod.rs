//! Bounded execution of whole documents.
//!
//! When the tree-walking evaluator cannot reduce a construct, the document (or
//! the one sub-expression) is run here instead. The sandbox is an interpreter
//! with a fixed capability surface: the data builtins, mocked `os`, `pathlib`,
//! `time` and path helper modules, and a universal mock for every other import.
//! Nothing touches the filesystem, the network or the process. A fresh
//! namespace is built for every call.

mod exec;
mod format;
mod methods;
mod object;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::eval::arith::ArithError;
use crate::eval::builtins::CallError;
use crate::source::{self, Module, ParseError};
use crate::value::{Fields, Value};

use exec::Interp;

/// Resource bounds for one sandbox run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxLimits {
  /// Wall-clock budget for a whole run.
  #[serde(with = "crate::config::humantime_duration")]
  pub timeout: Duration,
  /// Maximum expression nesting depth.
  pub max_depth: usize,
  /// Maximum number of elements any single collection may grow to.
  pub max_collection_len: usize,
}

impl Default for SandboxLimits {
  fn default() -> Self {
    Self {
      timeout: Duration::from_secs(2),
      max_depth: 64,
      max_collection_len: 100_000,
    }
  }
}

/// Whole-document execution failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
  #[error(transparent)]
  Parse(#[from] ParseError),

  #[error("name '{0}' is not defined")]
  UndefinedName(String),

  /// A statement outside the supported subset, such as `if` or `def`.
  #[error("'{keyword}' statements are not supported (line {line})")]
  Unsupported { keyword: String, line: usize },

  #[error("{0}")]
  Runtime(String),

  #[error("execution exceeded {}", humantime::format_duration(*.0))]
  Timeout(Duration),

  #[error("maximum nesting depth of {0} exceeded")]
  DepthExceeded(usize),

  #[error("collection would exceed {0} elements")]
  TooLarge(usize),

  /// Any of the above, raised by the statement on `line`.
  #[error("line {line}: {source}")]
  AtLine {
    line: usize,
    #[source]
    source: Box<DocumentError>,
  },
}

impl DocumentError {
  pub(crate) fn runtime(message: impl Into<String>) -> Self {
    DocumentError::Runtime(message.into())
  }

  pub(crate) fn at_line(self, line: usize) -> Self {
    match self {
      DocumentError::Parse(_) | DocumentError::Unsupported { .. } | DocumentError::AtLine { .. } => self,
      other => DocumentError::AtLine {
        line,
        source: Box::new(other),
      },
    }
  }

  /// The underlying error without line context.
  pub fn root(&self) -> &DocumentError {
    match self {
      DocumentError::AtLine { source, .. } => source.root(),
      other => other,
    }
  }
}

impl From<CallError> for DocumentError {
  fn from(err: CallError) -> Self {
    match err {
      CallError::Invalid(message) => DocumentError::Runtime(message),
      CallError::Arith(arith) => arith.into(),
    }
  }
}

impl From<ArithError> for DocumentError {
  fn from(err: ArithError) -> Self {
    match err {
      ArithError::TooLarge(n) => DocumentError::TooLarge(n),
      other => DocumentError::Runtime(other.to_string()),
    }
  }
}

/// Entry point for sandboxed execution.
#[derive(Debug, Clone, Default)]
pub struct Sandbox {
  limits: SandboxLimits,
}

impl Sandbox {
  pub fn new(limits: SandboxLimits) -> Self {
    Self { limits }
  }

  pub fn limits(&self) -> &SandboxLimits {
    &self.limits
  }

  /// Parse and run `text`, then lift the `requested` names out of the
  /// namespace.
  ///
  /// Requested names the document never binds are left out of the result.
  pub fn execute_whole_document(&self, text: &str, requested: &[&str]) -> Result<Fields, DocumentError> {
    let module = source::parse_module(text)?;
    self.execute_module(&module, requested)
  }

  /// Run an already parsed document.
  pub fn execute_module(&self, module: &Module, requested: &[&str]) -> Result<Fields, DocumentError> {
    debug!(statements = module.body.len(), "executing document in sandbox");
    let mut interp = Interp::new(&self.limits);
    interp.run(module)?;
    Ok(
      requested
        .iter()
        .filter_map(|name| interp.global(name).map(|obj| (name.to_string(), obj.into_value())))
        .collect(),
    )
  }

  /// Evaluate a single expression with `ctx` bound as globals.
  ///
  /// Placeholder values in `ctx` are not bound, so an expression that needs
  /// one fails with [`DocumentError::UndefinedName`].
  pub fn eval_snippet(&self, text: &str, ctx: &Fields) -> Result<Value, DocumentError> {
    let expr = source::parse_expression(text)?;
    let mut interp = Interp::new(&self.limits);
    for (name, value) in ctx {
      if !value.contains_placeholder() {
        interp.bind_global(name, value.clone());
      }
    }
    Ok(interp.eval_expr(&expr)?.into_value())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::value::Dict;

  fn run(text: &str, names: &[&str]) -> Result<Fields, DocumentError> {
    Sandbox::default().execute_whole_document(text, names)
  }

  fn run_one(text: &str, name: &str) -> Value {
    run(text, &[name]).unwrap().remove(name).unwrap()
  }

  fn list(items: &[i64]) -> Value {
    Value::List(items.iter().copied().map(Value::Int).collect())
  }

  mod assignments {
    use super::*;

    #[test]
    fn plain_and_chained() {
      let fields = run("a = b = 2\nc: int = a * 3\n", &["a", "b", "c", "missing"]).unwrap();
      assert_eq!(fields.get("a"), Some(&Value::Int(2)));
      assert_eq!(fields.get("b"), Some(&Value::Int(2)));
      assert_eq!(fields.get("c"), Some(&Value::Int(6)));
      assert!(!fields.contains_key("missing"));
    }

    #[test]
    fn unpacking_with_star() {
      let fields = run("a, *rest, z = [1, 2, 3, 4]\n", &["a", "rest", "z"]).unwrap();
      assert_eq!(fields["a"], Value::Int(1));
      assert_eq!(fields["rest"], list(&[2, 3]));
      assert_eq!(fields["z"], Value::Int(4));
    }

    #[test]
    fn subscript_and_augmented() {
      let text = "cfg = {'a': {'b': 1}}\ncfg['a']['b'] += 4\ncfg['c'] = [0]\ncfg['c'][-1] = 9\n";
      let cfg = run_one(text, "cfg");
      let dict = cfg.as_dict().unwrap();
      assert_eq!(dict.get_str("a").and_then(Value::as_dict).and_then(|d| d.get_str("b")), Some(&Value::Int(5)));
      assert_eq!(dict.get_str("c"), Some(&list(&[9])));
    }

    #[test]
    fn in_place_methods() {
      let text = "pool = []\npool.append({'name': 'x'})\npool[0].update(n=2)\npool.extend([1])\n";
      let pool = run_one(text, "pool");
      let first: Dict = [(Value::str("name"), Value::str("x")), (Value::str("n"), Value::Int(2))]
        .into_iter()
        .collect();
      assert_eq!(pool, Value::List(vec![Value::Dict(first), Value::Int(1)]));
    }
  }

  mod sharing {
    use super::*;

    fn shared_error(text: &str) -> String {
      run(text, &["x"]).unwrap_err().to_string()
    }

    #[test]
    fn aliased_containers_refuse_in_place_changes() {
      assert_eq!(
        shared_error("base = [1]\ncfg = {'l': base}\nbase.append(2)\n"),
        "line 3: in-place change of 'base', whose value is shared with another name, is not supported"
      );
      assert!(shared_error("base = [1]\nalias = base\nalias.append(3)\n").contains("'alias'"));
      assert!(shared_error("d = {}\nd2 = d\nd2['k'] = 1\n").contains("'d2'"));
      assert!(shared_error("d = {}\nd2 = d\nd['k'] = 1\n").contains("'d'"));
      assert!(shared_error("a = b = []\na.append(1)\n").contains("'a'"));
      assert!(shared_error("cfg = {'l': [1]}\ninner = cfg['l']\ninner += [2]\n").contains("'inner'"));
      assert!(shared_error("cfg = {'l': [1]}\ncfg.get('l').append(2)\n").contains("'append'"));
      assert!(shared_error("rows = [[1], [2]]\nx = [r.append(0) for r in rows]\n").contains("'r'"));
      assert!(shared_error("base = [1]\nadd = base.append\nadd(2)\n").contains("stored 'append'"));
    }

    #[test]
    fn copies_and_scalars_do_not_share() {
      let text = "base = [1, 2]\nn = len(base)\nfirst = base[0]\ncopy = base[:]\nbase.append(3)\n";
      let fields = run(text, &["base", "n", "first", "copy"]).unwrap();
      assert_eq!(fields["base"], list(&[1, 2, 3]));
      assert_eq!(fields["n"], Value::Int(2));
      assert_eq!(fields["first"], Value::Int(1));
      assert_eq!(fields["copy"], list(&[1, 2]));
    }

    #[test]
    fn rebinding_to_a_fresh_value_ends_sharing() {
      let text = "base = [1]\nalias = base\nalias = [0]\nalias.append(1)\n";
      assert_eq!(run_one(text, "alias"), list(&[0, 1]));
    }
  }

  mod expressions {
    use super::*;

    #[test]
    fn comprehensions() {
      assert_eq!(run_one("x = [i * i for i in range(5) if i % 2 == 0]\n", "x"), list(&[0, 4, 16]));
      let squares = run_one("x = {str(i): i for i in range(2)}\n", "x");
      assert_eq!(squares.as_dict().map(Dict::len), Some(2));
      assert_eq!(run_one("x = sum(i for i in [1, 2, 3])\n", "x"), Value::Int(6));
    }

    #[test]
    fn comprehension_variables_do_not_leak() {
      let err = run("x = [i for i in [1]]\ny = i\n", &["y"]).unwrap_err();
      assert_eq!(err.root(), &DocumentError::UndefinedName("i".into()));
    }

    #[test]
    fn strings_and_formatting() {
      assert_eq!(run_one("n = 3\nx = f'{n:03d}_{\"a\"!r}'\n", "x"), Value::str("003_'a'"));
      assert_eq!(run_one("x = '{}-{}'.format('a', 1).upper()\n", "x"), Value::str("A-1"));
      assert_eq!(run_one("x = 'abcdef'[1:-1:2]\n", "x"), Value::str("bd"));
      assert_eq!(run_one("x = [1, 2, 3][::-1]\n", "x"), list(&[3, 2, 1]));
    }

    #[test]
    fn boolean_and_comparison() {
      assert_eq!(run_one("x = 0 or 'd'\n", "x"), Value::str("d"));
      assert_eq!(run_one("x = 1 < 2 < 3 and 'a' in 'abc'\n", "x"), Value::Bool(true));
      assert_eq!(run_one("x = None is None\n", "x"), Value::Bool(true));
      assert_eq!(run_one("x = 'y' if 2 > 3 else 'n'\n", "x"), Value::str("n"));
    }
  }

  mod environment {
    use super::*;

    #[test]
    fn mocked_modules() {
      let text = "import os\nfrom pathlib import Path\nimport time\n\
                  n = os.cpu_count() - 1\n\
                  root = str(Path(__file__).parent / 'data')\n\
                  tz = time.localtime().tm_gmtoff // 3600\n\
                  here = os.path.join(os.path.dirname(__file__), 'x')\n";
      let fields = run(text, &["n", "root", "tz", "here"]).unwrap();
      assert_eq!(fields["n"], Value::Int(7));
      assert_eq!(fields["root"], Value::str("/mock/path"));
      assert_eq!(fields["tz"], Value::Int(8));
      assert_eq!(fields["here"], Value::str("/mock/dir/x"));
    }

    #[test]
    fn path_helpers_and_unknown_modules() {
      let text = "from core.utils.path_kit import get_folder_path\nimport pandas as pd\n\
                  data = get_folder_path('data')\nframe = pd.DataFrame()\n";
      let fields = run(text, &["data", "frame"]).unwrap();
      assert_eq!(fields["data"], Value::str("/mock/path"));
      assert_eq!(fields["frame"], Value::unparsable("opaque mock object"));
    }

    #[test]
    fn namespace_is_fresh_per_call() {
      let sandbox = Sandbox::default();
      sandbox.execute_whole_document("a = 1\n", &["a"]).unwrap();
      let err = sandbox.execute_whole_document("b = a\n", &["b"]).unwrap_err();
      assert_eq!(err.root(), &DocumentError::UndefinedName("a".into()));
    }
  }

  mod failures {
    use super::*;

    #[test]
    fn unsupported_statements() {
      let err = run("x = 1\nif x:\n    y = 2\n", &["x"]).unwrap_err();
      assert_eq!(
        err,
        DocumentError::Unsupported {
          keyword: "if".into(),
          line: 2
        }
      );
    }

    #[test]
    fn runtime_errors_carry_line() {
      let err = run("a = 1\nb = a / 0\n", &["b"]).unwrap_err();
      assert_eq!(err.to_string(), "line 2: division by zero");
    }

    #[test]
    fn set_values_and_lambdas_are_refused() {
      assert!(run("x = {1, 2}\n", &["x"]).is_err());
      assert!(run("f = lambda: 1\n", &["f"]).is_err());
    }

    #[test]
    fn collection_cap() {
      let sandbox = Sandbox::new(SandboxLimits {
        max_collection_len: 10,
        ..SandboxLimits::default()
      });
      let err = sandbox.execute_whole_document("x = [0] * 11\n", &["x"]).unwrap_err();
      assert_eq!(err.root(), &DocumentError::TooLarge(10));
      let err = sandbox.execute_whole_document("x = [i for i in range(10) for j in [1, 2]]\n", &["x"]).unwrap_err();
      assert_eq!(err.root(), &DocumentError::TooLarge(10));
    }

    #[test]
    fn oversized_format_width() {
      let err = run("x = f'{1:>99999999999}'\n", &["x"]).unwrap_err();
      assert_eq!(err.root(), &DocumentError::TooLarge(100_000));
      let err = run("x = '{:.99999999999f}'.format(1.5)\n", &["x"]).unwrap_err();
      assert_eq!(err.root(), &DocumentError::TooLarge(100_000));
    }

    #[test]
    fn depth_cap() {
      let sandbox = Sandbox::new(SandboxLimits {
        max_depth: 8,
        ..SandboxLimits::default()
      });
      let nested = format!("x = {}1{}\n", "[".repeat(20), "]".repeat(20));
      let err = sandbox.execute_whole_document(&nested, &["x"]).unwrap_err();
      assert_eq!(err.root(), &DocumentError::DepthExceeded(8));
    }

    #[test]
    fn zero_timeout() {
      let sandbox = Sandbox::new(SandboxLimits {
        timeout: Duration::ZERO,
        ..SandboxLimits::default()
      });
      let err = sandbox.execute_whole_document("x = 1\n", &["x"]).unwrap_err();
      assert!(matches!(err.root(), DocumentError::Timeout(_)));
    }
  }

  mod snippets {
    use super::*;

    #[test]
    fn context_is_bound() {
      let mut ctx = Fields::new();
      ctx.insert("base".into(), Value::Int(4));
      let value = Sandbox::default().eval_snippet("abs(-base) + len('ab')", &ctx).unwrap();
      assert_eq!(value, Value::Int(6));
    }

    #[test]
    fn placeholders_are_not_bound() {
      let mut ctx = Fields::new();
      ctx.insert("base".into(), Value::UnresolvedVariable("other".into()));
      let err = Sandbox::default().eval_snippet("str(base)", &ctx).unwrap_err();
      assert_eq!(err, DocumentError::UndefinedName("base".into()));
    }
  }
}
