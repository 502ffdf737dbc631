//! The sandbox interpreter.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use super::format::format_value;
use super::object::{MockFn, MockModule, Obj, call_mock, get_attr};
use super::{DocumentError, SandboxLimits, methods};
use crate::consts::mock;
use crate::eval::arith;
use crate::eval::builtins::{self, Builtin, Kwargs};
use crate::render;
use crate::source::{
  Alias, BinOp, BoolOp, CmpOp, Comprehension, Constant, DictItem, Expr, ExprKind, FStringPart, Keyword, Module, Stmt,
  StmtKind, UnaryOp,
};
use crate::value::{Dict, Value};

type Scope = HashMap<String, Obj>;
type Emit<'e, 'l> = dyn FnMut(&mut Interp<'l>) -> Result<(), DocumentError> + 'e;

pub(super) struct Interp<'l> {
  limits: &'l SandboxLimits,
  deadline: Option<Instant>,
  depth: usize,
  globals: Scope,
  /// Comprehension scopes, innermost last.
  frames: Vec<Scope>,
  /// Modules imported with `from m import *`.
  star_imports: Vec<MockModule>,
  /// Names whose list or dict may also be reachable through another binding.
  shared: HashSet<String>,
}

impl<'l> Interp<'l> {
  pub fn new(limits: &'l SandboxLimits) -> Self {
    let mut globals = Scope::new();
    for builtin in Builtin::ALL {
      globals.insert(builtin.name().to_string(), Obj::Builtin(builtin));
    }
    globals.insert("__file__".into(), Obj::data(mock::FILE));
    globals.insert("__name__".into(), Obj::data("__main__"));
    globals.insert("os".into(), Obj::Module(MockModule::Os));
    globals.insert("Path".into(), Obj::Function(MockFn::NewPath));
    Self {
      limits,
      deadline: Instant::now().checked_add(limits.timeout),
      depth: 0,
      globals,
      frames: Vec::new(),
      star_imports: Vec::new(),
      shared: HashSet::new(),
    }
  }

  pub fn run(&mut self, module: &Module) -> Result<(), DocumentError> {
    for stmt in &module.body {
      self.exec_stmt(stmt).map_err(|e| e.at_line(stmt.line))?;
    }
    Ok(())
  }

  pub fn global(&self, name: &str) -> Option<Obj> {
    self.globals.get(name).cloned()
  }

  pub fn bind_global(&mut self, name: &str, value: Value) {
    self.globals.insert(name.to_string(), Obj::Data(value));
  }

  pub fn eval_expr(&mut self, expr: &Expr) -> Result<Obj, DocumentError> {
    self.eval(expr)
  }

  fn max_len(&self) -> usize {
    self.limits.max_collection_len
  }

  fn check_deadline(&self) -> Result<(), DocumentError> {
    match self.deadline {
      Some(deadline) if Instant::now() >= deadline => Err(DocumentError::Timeout(self.limits.timeout)),
      _ => Ok(()),
    }
  }

  // Statements

  fn exec_stmt(&mut self, stmt: &Stmt) -> Result<(), DocumentError> {
    self.check_deadline()?;
    match &stmt.kind {
      StmtKind::Assign { targets, value: expr } => {
        let value = self.eval(expr)?;
        let sources = self.sources(&[expr], &[&value]);
        for target in targets {
          self.assign(target, value.clone())?;
        }
        self.record_store(targets, sources, &value);
      }
      StmtKind::AnnAssign { target, value, .. } => {
        if let Some(expr) = value {
          let value = self.eval(expr)?;
          let sources = self.sources(&[expr], &[&value]);
          self.assign(target, value.clone())?;
          self.record_store(std::slice::from_ref(target), sources, &value);
        }
      }
      StmtKind::AugAssign { target, op, value } => {
        if matches!(target.kind, ExprKind::Attribute { .. }) {
          return Err(DocumentError::runtime("attribute assignment is not supported"));
        }
        let current = self.eval(target)?;
        // Lists and dicts change in place under `+=` and `|=`.
        if let (ExprKind::Name(name), Obj::Data(Value::List(_) | Value::Dict(_))) = (&target.kind, &current) {
          self.ensure_unshared(name)?;
        }
        let rhs = self.eval(value)?;
        let sources = self.sources(&[value], &[&rhs]);
        let result = self.binary(*op, current, rhs)?;
        self.assign(target, result.clone())?;
        self.record_store(std::slice::from_ref(target), sources, &result);
      }
      StmtKind::Expr(expr) => {
        self.eval(expr)?;
      }
      StmtKind::Import(aliases) => self.import(aliases),
      StmtKind::ImportFrom { module, names } => self.import_from(module, names),
      StmtKind::Pass => {}
      StmtKind::Unsupported { keyword } => {
        return Err(DocumentError::Unsupported {
          keyword: keyword.clone(),
          line: stmt.line,
        });
      }
    }
    Ok(())
  }

  fn import(&mut self, aliases: &[Alias]) {
    for alias in aliases {
      let module = match &alias.asname {
        Some(_) => MockModule::resolve(&alias.name),
        None => MockModule::resolve(alias.bound_name()),
      };
      self.bind(alias.bound_name(), Obj::Module(module));
    }
  }

  fn import_from(&mut self, module: &str, names: &[Alias]) {
    let module = MockModule::resolve(module);
    for alias in names {
      if alias.name == "*" {
        self.star_imports.push(module);
        continue;
      }
      let obj = get_attr(&Obj::Module(module), &alias.name).unwrap_or(Obj::Universal);
      self.bind(alias.asname.as_deref().unwrap_or(&alias.name), obj);
    }
  }

  fn bind(&mut self, name: &str, obj: Obj) {
    let scope = self.frames.last_mut().unwrap_or(&mut self.globals);
    scope.insert(name.to_string(), obj);
  }

  fn binding(&self, name: &str) -> Option<&Obj> {
    self
      .frames
      .iter()
      .rev()
      .find_map(|scope| scope.get(name))
      .or_else(|| self.globals.get(name))
  }

  fn lookup(&self, name: &str) -> Result<Obj, DocumentError> {
    if let Some(obj) = self.binding(name) {
      return Ok(obj.clone());
    }
    self
      .star_imports
      .iter()
      .filter(|module| **module != MockModule::Universal)
      .find_map(|module| get_attr(&Obj::Module(*module), name).filter(|obj| *obj != Obj::Universal))
      .ok_or_else(|| DocumentError::UndefinedName(name.to_string()))
  }

  fn binding_mut(&mut self, name: &str) -> Option<&mut Obj> {
    for scope in self.frames.iter_mut().rev() {
      if let Some(obj) = scope.get_mut(name) {
        return Some(obj);
      }
    }
    self.globals.get_mut(name)
  }

  fn assign(&mut self, target: &Expr, value: Obj) -> Result<(), DocumentError> {
    match &target.kind {
      ExprKind::Name(name) => {
        self.bind(name, value);
        Ok(())
      }
      ExprKind::Tuple(targets) | ExprKind::List(targets) => self.unpack(targets, value),
      ExprKind::Subscript { value: container, index } => {
        if matches!(index.kind, ExprKind::Slice { .. }) {
          return Err(DocumentError::runtime("slice assignment is not supported"));
        }
        let (root, mut path) = self.place_path(container)?;
        self.ensure_unshared(&root)?;
        path.push(self.eval_data(index)?);
        let Some((key, parents)) = path.split_last() else {
          return Err(DocumentError::runtime("invalid assignment target"));
        };
        let slot = self.place_mut(&root, parents)?;
        set_item(slot, key.clone(), value.into_value())
      }
      ExprKind::Attribute { .. } => Err(DocumentError::runtime("attribute assignment is not supported")),
      _ => Err(DocumentError::runtime("cannot assign to expression")),
    }
  }

  fn unpack(&mut self, targets: &[Expr], value: Obj) -> Result<(), DocumentError> {
    let items = self.iterate(value)?;
    let star = targets.iter().position(|t| matches!(t.kind, ExprKind::Starred(_)));
    match star {
      None => {
        if items.len() != targets.len() {
          return Err(DocumentError::runtime(format!(
            "expected {} values to unpack, got {}",
            targets.len(),
            items.len()
          )));
        }
        for (target, item) in targets.iter().zip(items) {
          self.assign(target, Obj::Data(item))?;
        }
      }
      Some(at) => {
        let after = targets.len() - at - 1;
        if items.len() < targets.len() - 1 {
          return Err(DocumentError::runtime(format!(
            "expected at least {} values to unpack, got {}",
            targets.len() - 1,
            items.len()
          )));
        }
        let mut items = items;
        let tail = items.split_off(items.len() - after);
        let middle = items.split_off(at);
        for (target, item) in targets[..at].iter().zip(items) {
          self.assign(target, Obj::Data(item))?;
        }
        if let ExprKind::Starred(inner) = &targets[at].kind {
          self.assign(inner, Obj::Data(Value::List(middle)))?;
        }
        for (target, item) in targets[at + 1..].iter().zip(tail) {
          self.assign(target, Obj::Data(item))?;
        }
      }
    }
    Ok(())
  }

  /// True if `expr` names data that can be changed in place.
  fn is_place(&self, expr: &Expr) -> bool {
    match &expr.kind {
      ExprKind::Name(name) => matches!(self.lookup(name), Ok(Obj::Data(_))),
      ExprKind::Subscript { value, index } => {
        !matches!(index.kind, ExprKind::Slice { .. }) && self.is_place(value)
      }
      _ => false,
    }
  }

  /// Root name and evaluated keys leading to a nested place.
  fn place_path(&mut self, expr: &Expr) -> Result<(String, Vec<Value>), DocumentError> {
    match &expr.kind {
      ExprKind::Name(name) => Ok((name.clone(), Vec::new())),
      ExprKind::Subscript { value, index } if !matches!(index.kind, ExprKind::Slice { .. }) => {
        let (root, mut path) = self.place_path(value)?;
        path.push(self.eval_data(index)?);
        Ok((root, path))
      }
      _ => Err(DocumentError::runtime("cannot assign to expression")),
    }
  }

  fn place_mut(&mut self, root: &str, path: &[Value]) -> Result<&mut Value, DocumentError> {
    let obj = self
      .binding_mut(root)
      .ok_or_else(|| DocumentError::UndefinedName(root.to_string()))?;
    match obj {
      Obj::Data(value) => {
        let mut slot = value;
        for key in path {
          slot = item_mut(slot, key)?;
        }
        Ok(slot)
      }
      other => Err(DocumentError::runtime(format!(
        "'{}' object does not support item assignment",
        other.kind()
      ))),
    }
  }

  // Sharing
  //
  // Values are copied on bind, so two names holding the same list or dict
  // would drift apart after an in-place change. Stores that may put one
  // object behind several names mark those names, and in-place changes to a
  // marked name fail instead of diverging.

  /// Data bindings whose lists or dicts may now also live inside `results`.
  fn sources(&self, exprs: &[&Expr], results: &[&Obj]) -> Vec<String> {
    let mut reached = Vec::new();
    for expr in exprs {
      reach(expr, 0, &mut reached);
    }
    reached
      .into_iter()
      .filter(|(name, depth)| {
        results
          .iter()
          .any(|result| matches!(result, Obj::Data(value) if holds_mutable(value, *depth)))
          && matches!(self.binding(name), Some(Obj::Data(value)) if holds_mutable(value, 0))
      })
      .map(|(name, _)| name.to_string())
      .collect()
  }

  fn record_store(&mut self, targets: &[Expr], sources: Vec<String>, value: &Obj) {
    let chained = targets.len() > 1 && matches!(value, Obj::Data(v) if holds_mutable(v, 0));
    if sources.is_empty() && !chained {
      for target in targets {
        if let ExprKind::Name(name) = &target.kind {
          self.shared.remove(name);
        }
      }
      return;
    }
    let mut roots = Vec::new();
    for target in targets {
      target_roots(target, &mut roots);
    }
    self.shared.extend(roots.into_iter().map(str::to_string));
    self.shared.extend(sources);
  }

  fn ensure_unshared(&self, root: &str) -> Result<(), DocumentError> {
    if self.shared.contains(root) {
      return Err(DocumentError::runtime(format!(
        "in-place change of '{}', whose value is shared with another name, is not supported",
        root
      )));
    }
    Ok(())
  }

  /// True if changing the result of `expr` in place would change a binding.
  fn borrows_binding(&self, expr: &Expr) -> bool {
    let mut reached = Vec::new();
    reach(expr, 0, &mut reached);
    reached
      .iter()
      .any(|(name, depth)| *depth == 0 && matches!(self.binding(name), Some(Obj::Data(value)) if holds_mutable(value, 0)))
  }

  // Expressions

  fn eval(&mut self, expr: &Expr) -> Result<Obj, DocumentError> {
    self.check_deadline()?;
    if self.depth >= self.limits.max_depth {
      return Err(DocumentError::DepthExceeded(self.limits.max_depth));
    }
    self.depth += 1;
    let result = self.eval_inner(expr);
    self.depth -= 1;
    result
  }

  fn eval_data(&mut self, expr: &Expr) -> Result<Value, DocumentError> {
    Ok(self.eval(expr)?.into_value())
  }

  fn eval_inner(&mut self, expr: &Expr) -> Result<Obj, DocumentError> {
    match &expr.kind {
      ExprKind::Constant(constant) => constant_obj(constant),
      ExprKind::FString(parts) => self.fstring(parts).map(Obj::data),
      ExprKind::Name(name) => self.lookup(name),
      ExprKind::List(elts) => self.items(elts).map(|items| Obj::Data(Value::List(items))),
      ExprKind::Tuple(elts) => self.items(elts).map(|items| Obj::Data(Value::Tuple(items))),
      ExprKind::Dict(items) => self.dict(items).map(|dict| Obj::Data(Value::Dict(dict))),
      ExprKind::Set(_) | ExprKind::SetComp { .. } => Err(DocumentError::runtime("set values are not supported")),
      ExprKind::Lambda { .. } => Err(DocumentError::runtime("lambda is not supported")),
      ExprKind::Starred(_) => Err(DocumentError::runtime("can't use starred expression here")),
      ExprKind::Slice { .. } => Err(DocumentError::runtime("slice outside of a subscript")),
      ExprKind::Unary { op, operand } => {
        let operand = self.eval(operand)?;
        unary(*op, operand)
      }
      ExprKind::Binary { left, op, right } => {
        let left = self.eval(left)?;
        let right = self.eval(right)?;
        self.binary(*op, left, right)
      }
      ExprKind::BoolOp { op, values } => {
        let mut last = Obj::none();
        for value in values {
          last = self.eval(value)?;
          let done = match op {
            BoolOp::And => !last.is_truthy(),
            BoolOp::Or => last.is_truthy(),
          };
          if done {
            break;
          }
        }
        Ok(last)
      }
      ExprKind::Compare { left, ops } => {
        let mut current = self.eval(left)?;
        for (op, right) in ops {
          let right = self.eval(right)?;
          if !compare(*op, &current, &right)? {
            return Ok(Obj::data(false));
          }
          current = right;
        }
        Ok(Obj::data(true))
      }
      ExprKind::IfExp { test, body, orelse } => {
        if self.eval(test)?.is_truthy() {
          self.eval(body)
        } else {
          self.eval(orelse)
        }
      }
      ExprKind::Call { func, args, keywords } => self.call(func, args, keywords),
      ExprKind::Attribute { value, attr } => {
        let obj = self.eval(value)?;
        get_attr(&obj, attr).ok_or_else(|| {
          DocumentError::runtime(format!("'{}' object has no attribute '{}'", obj.kind(), attr))
        })
      }
      ExprKind::Subscript { value, index } => {
        let container = match self.eval(value)? {
          Obj::Data(container) => container,
          Obj::Universal => return Ok(Obj::Universal),
          other => {
            return Err(DocumentError::runtime(format!(
              "'{}' object is not subscriptable",
              other.kind()
            )));
          }
        };
        if let ExprKind::Slice { lower, upper, step } = &index.kind {
          let lower = self.optional_int(lower.as_deref())?;
          let upper = self.optional_int(upper.as_deref())?;
          let step = self.optional_int(step.as_deref())?;
          return slice(&container, lower, upper, step).map(Obj::Data);
        }
        let key = self.eval_data(index)?;
        get_item(&container, &key).map(Obj::Data)
      }
      ExprKind::ListComp { elt, generators } | ExprKind::GeneratorExp { elt, generators } => {
        self.list_comprehension(elt, generators).map(|items| Obj::Data(Value::List(items)))
      }
      ExprKind::DictComp { key, value, generators } => {
        self.dict_comprehension(key, value, generators).map(|dict| Obj::Data(Value::Dict(dict)))
      }
    }
  }

  fn items(&mut self, elts: &[Expr]) -> Result<Vec<Value>, DocumentError> {
    let mut items = Vec::with_capacity(elts.len());
    for elt in elts {
      match &elt.kind {
        ExprKind::Starred(inner) => {
          let inner = self.eval(inner)?;
          items.extend(self.iterate(inner)?);
        }
        _ => items.push(self.eval_data(elt)?),
      }
      if items.len() > self.max_len() {
        return Err(DocumentError::TooLarge(self.max_len()));
      }
    }
    Ok(items)
  }

  fn dict(&mut self, entries: &[DictItem]) -> Result<Dict, DocumentError> {
    let mut dict = Dict::new();
    for entry in entries {
      match entry {
        DictItem::Pair(key, value) => {
          let key = hashable(self.eval_data(key)?)?;
          let value = self.eval_data(value)?;
          dict.insert(key, value);
        }
        DictItem::Unpack(mapping) => match self.eval_data(mapping)? {
          Value::Dict(other) => {
            for (k, v) in other {
              dict.insert(k, v);
            }
          }
          other => {
            return Err(DocumentError::runtime(format!(
              "'{}' object is not a mapping",
              other.type_name()
            )));
          }
        },
      }
      if dict.len() > self.max_len() {
        return Err(DocumentError::TooLarge(self.max_len()));
      }
    }
    Ok(dict)
  }

  fn fstring(&mut self, parts: &[FStringPart]) -> Result<String, DocumentError> {
    let mut out = String::new();
    for part in parts {
      match part {
        FStringPart::Literal(text) => out.push_str(text),
        FStringPart::Formatted {
          value,
          conversion,
          spec,
        } => {
          let obj = self.eval(value)?;
          let converted = match conversion {
            Some('r') | Some('a') => Some(obj.repr()),
            Some(_) => Some(obj.display()),
            None => None,
          };
          match spec.as_deref() {
            None | Some("") => out.push_str(&converted.unwrap_or_else(|| obj.display())),
            Some(spec) if spec.contains('{') => {
              return Err(DocumentError::runtime("nested replacement fields in format specs are not supported"));
            }
            Some(spec) => {
              let value = match (converted, obj) {
                (Some(text), _) => Value::Str(text),
                (None, Obj::Data(value)) => value,
                (None, other) => Value::Str(other.display()),
              };
              out.push_str(&format_value(&value, spec, self.max_len())?);
            }
          }
        }
      }
    }
    Ok(out)
  }

  fn optional_int(&mut self, expr: Option<&Expr>) -> Result<Option<i64>, DocumentError> {
    let Some(expr) = expr else {
      return Ok(None);
    };
    match self.eval_data(expr)? {
      Value::Null => Ok(None),
      value => value
        .as_int()
        .map(Some)
        .ok_or_else(|| DocumentError::runtime("slice indices must be integers or None")),
    }
  }

  fn binary(&self, op: BinOp, left: Obj, right: Obj) -> Result<Obj, DocumentError> {
    match (left, right) {
      (Obj::Universal, _) | (_, Obj::Universal) => Ok(Obj::Universal),
      (Obj::Path, _) if op == BinOp::Div => Ok(Obj::Path),
      (Obj::Data(left), Obj::Data(right)) => Ok(Obj::Data(arith::binary(op, &left, &right, self.max_len())?)),
      (left, right) => Err(DocumentError::runtime(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        left.kind(),
        right.kind()
      ))),
    }
  }

  fn call(&mut self, func: &Expr, args: &[Expr], keywords: &[Keyword]) -> Result<Obj, DocumentError> {
    if let ExprKind::Attribute { value: receiver, attr } = &func.kind
      && methods::is_mutator(attr)
    {
      if self.is_place(receiver) {
        return self.mutate_place(receiver, attr, args, keywords);
      }
      if self.borrows_binding(receiver) {
        return Err(DocumentError::runtime(format!(
          "in-place '{}' on a value reached through another name is not supported",
          attr
        )));
      }
    }

    let callee = self.eval(func)?;
    let (args, kwargs) = self.arguments(args, keywords)?;
    match callee {
      Obj::Method { name, .. } if methods::is_mutator(&name) && !matches!(func.kind, ExprKind::Attribute { .. }) => {
        Err(DocumentError::runtime(format!("calling a stored '{}' method is not supported", name)))
      }
      Obj::Builtin(Builtin::Print | Builtin::Exit) => Ok(Obj::none()),
      Obj::Builtin(Builtin::Str) if args.len() == 1 && kwargs.is_empty() => Ok(Obj::data(args[0].display())),
      Obj::Builtin(builtin) => {
        let (args, kwargs) = data_arguments(args, kwargs);
        Ok(Obj::Data(builtins::call(builtin, args, kwargs, self.max_len())?))
      }
      Obj::Function(function) => Ok(call_mock(function, &args)),
      Obj::Universal => Ok(Obj::Universal),
      Obj::Method { receiver, name } => {
        let (args, kwargs) = data_arguments(args, kwargs);
        Ok(Obj::Data(methods::call(&receiver, &name, args, kwargs, self.max_len())?))
      }
      other => Err(DocumentError::runtime(format!("'{}' object is not callable", other.kind()))),
    }
  }

  fn mutate_place(
    &mut self,
    receiver: &Expr,
    attr: &str,
    args: &[Expr],
    keywords: &[Keyword],
  ) -> Result<Obj, DocumentError> {
    let (root, path) = self.place_path(receiver)?;
    self.ensure_unshared(&root)?;
    let (values, named) = self.arguments(args, keywords)?;
    let exprs: Vec<&Expr> = args.iter().chain(keywords.iter().map(|k| &k.value)).collect();
    let results: Vec<&Obj> = values.iter().chain(named.iter().map(|(_, v)| v)).collect();
    let sources = self.sources(&exprs, &results);
    let (values, named) = data_arguments(values, named);
    let max_len = self.max_len();
    let target = self.place_mut(&root, &path)?;
    methods::mutate(target, attr, values, named, max_len)?;
    if !sources.is_empty() {
      self.shared.insert(root);
      self.shared.extend(sources);
    }
    Ok(Obj::none())
  }

  fn arguments(&mut self, args: &[Expr], keywords: &[Keyword]) -> Result<(Vec<Obj>, Vec<(String, Obj)>), DocumentError> {
    let mut positional = Vec::with_capacity(args.len());
    for arg in args {
      match &arg.kind {
        ExprKind::Starred(inner) => {
          let inner = self.eval(inner)?;
          positional.extend(self.iterate(inner)?.into_iter().map(Obj::Data));
        }
        _ => positional.push(self.eval(arg)?),
      }
    }
    let mut named = Vec::with_capacity(keywords.len());
    for keyword in keywords {
      match &keyword.name {
        Some(name) => named.push((name.clone(), self.eval(&keyword.value)?)),
        None => match self.eval_data(&keyword.value)? {
          Value::Dict(dict) => {
            for (key, value) in dict {
              let Value::Str(key) = key else {
                return Err(DocumentError::runtime("keywords must be strings"));
              };
              named.push((key, Obj::Data(value)));
            }
          }
          other => {
            return Err(DocumentError::runtime(format!(
              "argument after ** must be a mapping, not '{}'",
              other.type_name()
            )));
          }
        },
      }
    }
    Ok((positional, named))
  }

  fn iterate(&self, obj: Obj) -> Result<Vec<Value>, DocumentError> {
    match obj {
      Obj::Data(value) => Ok(builtins::iterate(&value)?),
      Obj::Universal => Ok(Vec::new()),
      other => Err(DocumentError::runtime(format!("'{}' object is not iterable", other.kind()))),
    }
  }

  // Comprehensions

  fn in_frame<T>(&mut self, body: impl FnOnce(&mut Self) -> Result<T, DocumentError>) -> Result<T, DocumentError> {
    self.frames.push(Scope::new());
    let result = body(self);
    self.frames.pop();
    result
  }

  fn run_generators(&mut self, generators: &[Comprehension], emit: &mut Emit<'_, 'l>) -> Result<(), DocumentError> {
    let Some((first, rest)) = generators.split_first() else {
      return emit(self);
    };
    let iterable = self.eval(&first.iter)?;
    'items: for item in self.iterate(iterable)? {
      self.check_deadline()?;
      let item = Obj::Data(item);
      let sources = self.sources(&[&first.iter], &[&item]);
      if !sources.is_empty() {
        let mut roots = Vec::new();
        target_roots(&first.target, &mut roots);
        self.shared.extend(roots.into_iter().map(str::to_string));
        self.shared.extend(sources);
      }
      self.assign(&first.target, item)?;
      for condition in &first.conditions {
        if !self.eval(condition)?.is_truthy() {
          continue 'items;
        }
      }
      self.run_generators(rest, emit)?;
    }
    Ok(())
  }

  fn list_comprehension(&mut self, elt: &Expr, generators: &[Comprehension]) -> Result<Vec<Value>, DocumentError> {
    let max_len = self.max_len();
    let mut out = Vec::new();
    self.in_frame(|interp| {
      interp.run_generators(generators, &mut |interp: &mut Interp<'l>| {
        if out.len() >= max_len {
          return Err(DocumentError::TooLarge(max_len));
        }
        out.push(interp.eval_data(elt)?);
        Ok(())
      })
    })?;
    Ok(out)
  }

  fn dict_comprehension(&mut self, key: &Expr, value: &Expr, generators: &[Comprehension]) -> Result<Dict, DocumentError> {
    let max_len = self.max_len();
    let mut out = Dict::new();
    self.in_frame(|interp| {
      interp.run_generators(generators, &mut |interp: &mut Interp<'l>| {
        let k = hashable(interp.eval_data(key)?)?;
        let v = interp.eval_data(value)?;
        out.insert(k, v);
        if out.len() > max_len {
          return Err(DocumentError::TooLarge(max_len));
        }
        Ok(())
      })
    })?;
    Ok(out)
  }
}

/// True if `value` holds a list or dict `depth` or more levels down.
fn holds_mutable(value: &Value, depth: usize) -> bool {
  if depth == 0 && matches!(value, Value::List(_) | Value::Dict(_)) {
    return true;
  }
  let next = depth.saturating_sub(1);
  match value {
    Value::List(items) | Value::Tuple(items) => items.iter().any(|item| holds_mutable(item, next)),
    Value::Dict(dict) => dict.values().any(|item| holds_mutable(item, next)),
    _ => false,
  }
}

/// Collect the names whose objects may end up in the result of `expr`, with
/// the shallowest level of that result they can appear at.
fn reach<'e>(expr: &'e Expr, depth: usize, out: &mut Vec<(&'e str, usize)>) {
  match &expr.kind {
    ExprKind::Name(name) => out.push((name.as_str(), depth)),
    ExprKind::Subscript { value, index } => match index.kind {
      ExprKind::Slice { .. } => reach(value, depth + 1, out),
      _ => reach(value, depth, out),
    },
    ExprKind::List(elts) | ExprKind::Tuple(elts) | ExprKind::Set(elts) => {
      for elt in elts {
        reach(elt, depth + 1, out);
      }
    }
    ExprKind::Starred(inner) => reach(inner, depth + 1, out),
    ExprKind::Dict(items) => {
      for item in items {
        match item {
          DictItem::Pair(_, value) | DictItem::Unpack(value) => reach(value, depth + 1, out),
        }
      }
    }
    ExprKind::IfExp { body, orelse, .. } => {
      reach(body, depth, out);
      reach(orelse, depth, out);
    }
    ExprKind::BoolOp { values, .. } => {
      for value in values {
        reach(value, depth, out);
      }
    }
    ExprKind::Binary { left, op, right } if matches!(op, BinOp::Add | BinOp::Mul | BinOp::BitOr) => {
      reach(left, depth + 1, out);
      reach(right, depth + 1, out);
    }
    ExprKind::ListComp { elt, generators } | ExprKind::GeneratorExp { elt, generators } => {
      reach(elt, depth + 1, out);
      for generator in generators {
        reach(&generator.iter, depth + 1, out);
      }
    }
    ExprKind::DictComp { value, generators, .. } => {
      reach(value, depth + 1, out);
      for generator in generators {
        reach(&generator.iter, depth + 1, out);
      }
    }
    ExprKind::Call { func, args, keywords } => {
      let depth = match &func.kind {
        ExprKind::Attribute { value, attr } => match attr.as_str() {
          "copy" | "values" | "items" => {
            reach(value, depth + 1, out);
            return;
          }
          "get" => {
            reach(value, depth, out);
            depth
          }
          name if methods::is_mutator(name) => return,
          _ => depth,
        },
        ExprKind::Name(name) => match name.as_str() {
          "len" | "str" | "int" | "float" | "bool" | "abs" | "round" | "range" | "repr" | "sum" | "isinstance"
          | "print" => return,
          "list" | "tuple" | "dict" | "sorted" | "reversed" | "zip" | "enumerate" => depth + 1,
          _ => depth,
        },
        _ => depth,
      };
      for arg in args {
        reach(arg, depth, out);
      }
      for keyword in keywords {
        reach(&keyword.value, depth, out);
      }
    }
    _ => {}
  }
}

/// Binding names an assignment target writes to.
fn target_roots<'e>(target: &'e Expr, out: &mut Vec<&'e str>) {
  match &target.kind {
    ExprKind::Name(name) => out.push(name),
    ExprKind::Subscript { value, .. } => target_roots(value, out),
    ExprKind::Starred(inner) => target_roots(inner, out),
    ExprKind::Tuple(targets) | ExprKind::List(targets) => {
      for target in targets {
        target_roots(target, out);
      }
    }
    _ => {}
  }
}

fn constant_obj(constant: &Constant) -> Result<Obj, DocumentError> {
  Ok(Obj::Data(match constant {
    Constant::None => Value::Null,
    Constant::Bool(b) => Value::Bool(*b),
    Constant::Int(i) => Value::Int(*i),
    Constant::Float(f) => Value::Float(*f),
    Constant::Str(s) => Value::Str(s.clone()),
    Constant::Bytes(_) => return Err(DocumentError::runtime("bytes literals are not supported")),
    Constant::Ellipsis => return Err(DocumentError::runtime("'...' is not supported")),
  }))
}

fn data_arguments(args: Vec<Obj>, kwargs: Vec<(String, Obj)>) -> (Vec<Value>, Kwargs) {
  (
    args.into_iter().map(Obj::into_value).collect(),
    kwargs.into_iter().map(|(k, v)| (k, v.into_value())).collect(),
  )
}

fn hashable(key: Value) -> Result<Value, DocumentError> {
  match key {
    Value::List(_) | Value::Dict(_) => Err(DocumentError::runtime(format!("unhashable type: '{}'", key.type_name()))),
    key => Ok(key),
  }
}

fn unary(op: UnaryOp, operand: Obj) -> Result<Obj, DocumentError> {
  if op == UnaryOp::Not {
    return Ok(Obj::data(!operand.is_truthy()));
  }
  let value = match operand {
    Obj::Universal => return Ok(Obj::Universal),
    Obj::Data(value) => value,
    other => {
      return Err(DocumentError::runtime(format!(
        "bad operand type for unary operator: '{}'",
        other.kind()
      )));
    }
  };
  let result = match (op, &value) {
    (UnaryOp::Plus, Value::Float(f)) => Value::Float(*f),
    (UnaryOp::Minus, Value::Float(f)) => Value::Float(-f),
    (UnaryOp::Plus, v) if v.as_int().is_some() => Value::Int(v.as_int().unwrap_or_default()),
    (UnaryOp::Minus, v) if v.as_int().is_some() => Value::Int(
      v.as_int()
        .and_then(i64::checked_neg)
        .ok_or(arith::ArithError::Overflow("-"))?,
    ),
    (UnaryOp::Invert, v) if v.as_int().is_some() => Value::Int(!v.as_int().unwrap_or_default()),
    _ => {
      return Err(DocumentError::runtime(format!(
        "bad operand type for unary operator: '{}'",
        value.type_name()
      )));
    }
  };
  Ok(Obj::Data(result))
}

fn compare(op: CmpOp, left: &Obj, right: &Obj) -> Result<bool, DocumentError> {
  let (Obj::Data(l), Obj::Data(r)) = (left, right) else {
    return Ok(match op {
      CmpOp::Eq | CmpOp::Is => left == right,
      CmpOp::NotEq | CmpOp::IsNot => left != right,
      CmpOp::In | CmpOp::NotIn if *right == Obj::Universal => op == CmpOp::NotIn,
      _ => {
        return Err(DocumentError::runtime(format!(
          "unsupported comparison between '{}' and '{}'",
          left.kind(),
          right.kind()
        )));
      }
    });
  };
  Ok(match op {
    CmpOp::Eq => l.py_eq(r),
    CmpOp::NotEq => !l.py_eq(r),
    CmpOp::Is => same_object(l, r),
    CmpOp::IsNot => !same_object(l, r),
    CmpOp::In => contains(r, l)?,
    CmpOp::NotIn => !contains(r, l)?,
    CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE => {
      let ordering = l.py_cmp(r).ok_or_else(|| {
        DocumentError::runtime(format!(
          "comparison not supported between instances of '{}' and '{}'",
          l.type_name(),
          r.type_name()
        ))
      })?;
      match op {
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::LtE => ordering.is_le(),
        CmpOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
      }
    }
  })
}

/// Identity for immutable values: same type and equal.
fn same_object(left: &Value, right: &Value) -> bool {
  left.type_name() == right.type_name() && left.py_eq(right)
}

fn contains(container: &Value, item: &Value) -> Result<bool, DocumentError> {
  match (container, item) {
    (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(needle.as_str())),
    (Value::Str(_), other) => Err(DocumentError::runtime(format!(
      "'in <string>' requires string as left operand, not {}",
      other.type_name()
    ))),
    (Value::List(items) | Value::Tuple(items), _) => Ok(items.iter().any(|x| x.py_eq(item))),
    (Value::Dict(dict), _) => Ok(dict.contains_key(item)),
    (other, _) => Err(DocumentError::runtime(format!(
      "argument of type '{}' is not iterable",
      other.type_name()
    ))),
  }
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
  let resolved = if index < 0 { index + len as i64 } else { index };
  (0..len as i64).contains(&resolved).then_some(resolved as usize)
}

fn get_item(container: &Value, key: &Value) -> Result<Value, DocumentError> {
  match container {
    Value::List(items) | Value::Tuple(items) => {
      let index = key.as_int().ok_or_else(|| {
        DocumentError::runtime(format!("{} indices must be integers", container.type_name()))
      })?;
      normalize_index(index, items.len())
        .map(|i| items[i].clone())
        .ok_or_else(|| DocumentError::runtime(format!("{} index out of range", container.type_name())))
    }
    Value::Str(s) => {
      let index = key
        .as_int()
        .ok_or_else(|| DocumentError::runtime("string indices must be integers"))?;
      let chars: Vec<char> = s.chars().collect();
      normalize_index(index, chars.len())
        .map(|i| Value::Str(chars[i].to_string()))
        .ok_or_else(|| DocumentError::runtime("string index out of range"))
    }
    Value::Dict(dict) => dict
      .get(key)
      .cloned()
      .ok_or_else(|| DocumentError::runtime(format!("KeyError: {}", render::flat(key)))),
    other => Err(DocumentError::runtime(format!(
      "'{}' object is not subscriptable",
      other.type_name()
    ))),
  }
}

fn item_mut<'v>(container: &'v mut Value, key: &Value) -> Result<&'v mut Value, DocumentError> {
  match container {
    Value::List(items) => {
      let len = items.len();
      let index = key
        .as_int()
        .and_then(|i| normalize_index(i, len))
        .ok_or_else(|| DocumentError::runtime("list index out of range"))?;
      Ok(&mut items[index])
    }
    Value::Dict(dict) => dict
      .get_mut(key)
      .ok_or_else(|| DocumentError::runtime(format!("KeyError: {}", render::flat(key)))),
    other => Err(DocumentError::runtime(format!(
      "'{}' object does not support item assignment",
      other.type_name()
    ))),
  }
}

fn set_item(container: &mut Value, key: Value, value: Value) -> Result<(), DocumentError> {
  match container {
    Value::Dict(dict) => {
      dict.insert(hashable(key)?, value);
      Ok(())
    }
    Value::List(_) => {
      *item_mut(container, &key)? = value;
      Ok(())
    }
    other => Err(DocumentError::runtime(format!(
      "'{}' object does not support item assignment",
      other.type_name()
    ))),
  }
}

/// Positions selected by `[lower:upper:step]` over `len` elements.
fn slice_positions(len: usize, lower: Option<i64>, upper: Option<i64>, step: Option<i64>) -> Result<Vec<usize>, DocumentError> {
  let len = len as i64;
  let step = step.unwrap_or(1);
  if step == 0 {
    return Err(DocumentError::runtime("slice step cannot be zero"));
  }
  let clamp = |bound: i64, low: i64, high: i64| {
    let bound = if bound < 0 { bound + len } else { bound };
    bound.clamp(low, high)
  };
  let mut positions = Vec::new();
  if step > 0 {
    let start = lower.map_or(0, |b| clamp(b, 0, len));
    let stop = upper.map_or(len, |b| clamp(b, 0, len));
    let mut i = start;
    while i < stop {
      positions.push(i as usize);
      i += step;
    }
  } else {
    let start = lower.map_or(len - 1, |b| clamp(b, -1, len - 1));
    let stop = upper.map_or(-1, |b| clamp(b, -1, len - 1));
    let mut i = start;
    while i > stop {
      positions.push(i as usize);
      i += step;
    }
  }
  Ok(positions)
}

fn slice(container: &Value, lower: Option<i64>, upper: Option<i64>, step: Option<i64>) -> Result<Value, DocumentError> {
  match container {
    Value::List(items) | Value::Tuple(items) => {
      let picked = slice_positions(items.len(), lower, upper, step)?
        .into_iter()
        .map(|i| items[i].clone())
        .collect();
      Ok(match container {
        Value::Tuple(_) => Value::Tuple(picked),
        _ => Value::List(picked),
      })
    }
    Value::Str(s) => {
      let chars: Vec<char> = s.chars().collect();
      Ok(Value::Str(
        slice_positions(chars.len(), lower, upper, step)?
          .into_iter()
          .map(|i| chars[i])
          .collect(),
      ))
    }
    other => Err(DocumentError::runtime(format!(
      "'{}' object is not subscriptable",
      other.type_name()
    ))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn slice_positions_follow_index_rules() {
    assert_eq!(slice_positions(5, None, None, None).unwrap(), vec![0, 1, 2, 3, 4]);
    assert_eq!(slice_positions(5, Some(-2), None, None).unwrap(), vec![3, 4]);
    assert_eq!(slice_positions(5, None, None, Some(-2)).unwrap(), vec![4, 2, 0]);
    assert_eq!(slice_positions(5, Some(10), Some(-10), Some(-1)).unwrap(), vec![4, 3, 2, 1, 0]);
    assert!(slice_positions(5, None, None, Some(0)).is_err());
  }

  #[test]
  fn negative_indices() {
    let items = Value::List(vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(get_item(&items, &Value::Int(-1)).unwrap(), Value::Int(2));
    assert!(get_item(&items, &Value::Int(2)).is_err());
  }

  #[test]
  fn membership() {
    let dict: Dict = [(Value::str("a"), Value::Int(1))].into_iter().collect();
    assert!(contains(&Value::Dict(dict), &Value::str("a")).unwrap());
    assert!(contains(&Value::List(vec![Value::Int(1)]), &Value::Float(1.0)).unwrap());
    assert!(contains(&Value::Int(1), &Value::Int(1)).is_err());
  }

  #[test]
  fn identity_distinguishes_types() {
    assert!(same_object(&Value::Null, &Value::Null));
    assert!(!same_object(&Value::Int(1), &Value::Bool(true)));
  }
}
