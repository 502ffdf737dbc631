//! Field extraction from configuration documents.
//!
//! [`extract_fields`] runs the whole document in the sandbox first. If that
//! fails it walks the top-level assignments with the tree-walking evaluator,
//! so one bad expression only costs the field it belongs to.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, warn};

use crate::config::TranspileOptions;
use crate::dialect::{self, ConversionError, Dialect, Family};
use crate::error::Error;
use crate::eval::{Evaluator, arith};
use crate::render::{RenderOptions, generate_document};
use crate::sandbox::Sandbox;
use crate::source::{self, Expr, ExprKind, Module, ParseError, StmtKind};
use crate::value::{Fields, Value};

/// Fields read from a Pos document.
pub const POS_KEYS: [&str; 11] = [
  "account_config",
  "strategy_name",
  "get_kline_num",
  "min_kline_num",
  "strategy_config",
  "strategy_pool",
  "leverage",
  "black_list",
  "white_list",
  "rebalance_mode",
  "is_pure_long",
];

/// Fields read from a Coin document.
pub const COIN_KEYS: [&str; 9] = [
  "backtest_name",
  "account_config",
  "strategy_list",
  "get_kline_num",
  "min_kline_num",
  "leverage",
  "black_list",
  "white_list",
  "rebalance_mode",
];

/// How the fields of a document were produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionPath {
  /// The whole document ran in the sandbox.
  Executed,
  /// Sandbox execution failed; assignments were evaluated one by one.
  NodeWalk { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
  pub fields: Fields,
  pub path: ExtractionPath,
}

/// Extract `names` from `text`.
///
/// Names the document never assigns come back as `None`.
pub fn extract_fields(text: &str, names: &[&str], sandbox: &Sandbox) -> Result<Extraction, ParseError> {
  let module = source::parse_module(text)?;
  Ok(extract_from_module(text, &module, names, sandbox))
}

fn extract_from_module(text: &str, module: &Module, names: &[&str], sandbox: &Sandbox) -> Extraction {
  let (found, path) = match sandbox.execute_module(module, names) {
    Ok(found) => (found, ExtractionPath::Executed),
    Err(err) => {
      warn!(error = %err, "document execution failed, evaluating assignments one by one");
      let ctx = walk_assignments(text, module, sandbox);
      (ctx, ExtractionPath::NodeWalk { reason: err.to_string() })
    }
  };
  let fields = names
    .iter()
    .map(|name| (name.to_string(), found.get(*name).cloned().unwrap_or(Value::Null)))
    .collect();
  Extraction { fields, path }
}

/// Evaluate top-level assignments in order, each seeing the names bound
/// before it.
fn walk_assignments(text: &str, module: &Module, sandbox: &Sandbox) -> Fields {
  let evaluator = Evaluator::new(text, sandbox);
  let mut ctx = Fields::new();
  for stmt in &module.body {
    match &stmt.kind {
      StmtKind::Assign { targets, value } => {
        let value = evaluator.evaluate(value, &ctx);
        for target in targets {
          bind_target(&mut ctx, target, value.clone());
        }
      }
      StmtKind::AnnAssign {
        target, value: Some(value), ..
      } => {
        let value = evaluator.evaluate(value, &ctx);
        bind_target(&mut ctx, target, value);
      }
      StmtKind::AugAssign { target, op, value } => {
        let Some(name) = target.as_name() else {
          continue;
        };
        let current = ctx
          .get(name)
          .cloned()
          .unwrap_or_else(|| Value::UnresolvedVariable(name.to_string()));
        let rhs = evaluator.evaluate(value, &ctx);
        let combined = if current.contains_placeholder() || rhs.contains_placeholder() {
          Value::unparsable(format!("operand of '{}=' is unresolved", op.symbol()))
        } else {
          arith::binary(*op, &current, &rhs, sandbox.limits().max_collection_len)
            .unwrap_or_else(|err| Value::unparsable(err.to_string()))
        };
        ctx.insert(name.to_string(), combined);
      }
      _ => {}
    }
  }
  ctx
}

fn bind_target(ctx: &mut Fields, target: &Expr, value: Value) {
  match &target.kind {
    ExprKind::Name(name) => {
      ctx.insert(name.clone(), value);
    }
    ExprKind::Tuple(targets) | ExprKind::List(targets) => {
      let items = value.as_seq().filter(|items| items.len() == targets.len());
      match items {
        Some(items) => {
          for (target, item) in targets.iter().zip(items.to_vec()) {
            bind_target(ctx, target, item);
          }
        }
        None => {
          for target in targets {
            bind_target(ctx, target, Value::unparsable("cannot unpack value"));
          }
        }
      }
    }
    ExprKind::Starred(inner) => bind_target(ctx, inner, Value::unparsable("starred assignment")),
    _ => {}
  }
}

/// A parsed configuration document.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
  raw_text: String,
  dialect: Dialect,
  fields: Fields,
  extraction: ExtractionPath,
  /// Extracted names the document actually assigns.
  assigned: BTreeSet<String>,
  render: RenderOptions,
}

impl ConfigDocument {
  /// Detect the dialect of `text` and extract its fields.
  pub fn parse(text: &str, options: &TranspileOptions) -> Result<Self, ParseError> {
    Self::parse_named(text, "<inline>", options)
  }

  /// Read and parse the document at `path`.
  pub fn load(path: &Path, options: &TranspileOptions) -> Result<Self, Error> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::io(path, source))?;
    Self::parse_named(&text, &path.display().to_string(), options).map_err(|source| Error::Source {
      path: path.to_path_buf(),
      source,
    })
  }

  fn parse_named(text: &str, origin: &str, options: &TranspileOptions) -> Result<Self, ParseError> {
    let module = source::parse_module(text)?;
    let sandbox = Sandbox::new(options.sandbox.clone());
    let family = dialect::detect_module(&module);
    let keys: &[&str] = match family {
      Family::Pos => &POS_KEYS,
      Family::Coin => &COIN_KEYS,
    };
    let Extraction { fields, path } = extract_from_module(text, &module, keys, &sandbox);
    let assigned = module
      .assigned_names()
      .filter(|name| keys.contains(name))
      .map(str::to_string)
      .collect();
    let dialect = match family {
      Family::Pos => Dialect::Pos,
      Family::Coin => dialect::classify_coin_subtype(&fields),
    };

    for (field, value) in &fields {
      if value.contains_placeholder() {
        warn!(document = origin, field = field.as_str(), value = %value, "field could not be fully evaluated");
      }
    }
    debug!(document = origin, %dialect, extraction = ?path, "parsed document");

    Ok(Self {
      raw_text: text.to_string(),
      dialect,
      fields,
      extraction: path,
      assigned,
      render: options.render,
    })
  }

  pub fn raw_text(&self) -> &str {
    &self.raw_text
  }

  pub fn dialect(&self) -> Dialect {
    self.dialect
  }

  pub fn fields(&self) -> &Fields {
    &self.fields
  }

  pub fn extraction(&self) -> &ExtractionPath {
    &self.extraction
  }

  pub fn into_fields(self) -> Fields {
    self.fields
  }

  /// Only the fields the document assigns, without the `None` filled in for
  /// the others.
  pub fn assigned_fields(&self) -> Fields {
    self
      .fields
      .iter()
      .filter(|(name, _)| self.assigned.contains(*name))
      .map(|(name, value)| (name.clone(), value.clone()))
      .collect()
  }

  /// Fields that came back as, or contain, a placeholder.
  pub fn placeholder_fields(&self) -> impl Iterator<Item = &str> {
    self
      .fields
      .iter()
      .filter(|(_, v)| v.contains_placeholder())
      .map(|(k, _)| k.as_str())
  }

  /// The document as a Pos document.
  ///
  /// Coin documents are converted; `fallback_name` stands in for a missing
  /// `backtest_name`. The converted document's text is its canonical source.
  pub fn into_pos(self, fallback_name: Option<&str>) -> Result<Self, ConversionError> {
    if self.dialect == Dialect::Pos {
      return Ok(self);
    }
    let fields = dialect::convert_coin_to_pos(&self.fields, fallback_name)?;
    let name = fields
      .get("strategy_name")
      .and_then(Value::as_str)
      .unwrap_or_default()
      .to_string();
    let raw_text = generate_document(&fields, &name, &self.render);
    Ok(Self {
      raw_text,
      dialect: Dialect::Pos,
      assigned: fields.keys().cloned().collect(),
      fields,
      extraction: self.extraction,
      render: self.render,
    })
  }
}
