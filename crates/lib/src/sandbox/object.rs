//! Runtime objects of the sandbox and the mocked environment.

use crate::consts::mock;
use crate::eval::builtins::Builtin;
use crate::render;
use crate::value::Value;

use super::methods;

/// A module the document imports. Only the names below are mocked with
/// specific behavior; every other module is [`MockModule::Universal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MockModule {
  Os,
  OsPath,
  Time,
  Pathlib,
  PathKit,
  Universal,
}

impl MockModule {
  /// Resolve a dotted module name.
  pub fn resolve(name: &str) -> Self {
    match name {
      "os" => MockModule::Os,
      "os.path" => MockModule::OsPath,
      "time" => MockModule::Time,
      "pathlib" => MockModule::Pathlib,
      n if n.contains("path_kit") => MockModule::PathKit,
      _ => MockModule::Universal,
    }
  }
}

/// Callable members of the mocked modules and `Path` objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MockFn {
  CpuCount,
  Abspath,
  Dirname,
  Join,
  Localtime,
  FolderPath,
  NewPath,
  /// `exists()`-style checks, always false.
  Missing,
  /// `resolve()`-style methods returning the path itself.
  SamePath,
  /// Side-effecting methods such as `mkdir()`; do nothing.
  Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Obj {
  Data(Value),
  Builtin(Builtin),
  Module(MockModule),
  Function(MockFn),
  Path,
  LocalTime,
  /// Accepts any attribute access, call or subscript and returns itself.
  Universal,
  /// A data method bound to its receiver.
  Method { receiver: Value, name: String },
}

impl Obj {
  pub fn data(value: impl Into<Value>) -> Self {
    Obj::Data(value.into())
  }

  pub fn none() -> Self {
    Obj::Data(Value::Null)
  }

  pub fn kind(&self) -> &'static str {
    match self {
      Obj::Data(value) => value.type_name(),
      Obj::Builtin(_) => "builtin_function_or_method",
      Obj::Module(_) => "module",
      Obj::Function(_) => "function",
      Obj::Path => "Path",
      Obj::LocalTime => "struct_time",
      Obj::Universal => "mock",
      Obj::Method { .. } => "method",
    }
  }

  /// The data this object holds; anything else becomes an opaque placeholder.
  pub fn into_value(self) -> Value {
    match self {
      Obj::Data(value) => value,
      other => Value::unparsable(format!("opaque {} object", other.kind())),
    }
  }

  pub fn is_truthy(&self) -> bool {
    match self {
      Obj::Data(value) => value.is_truthy(),
      _ => true,
    }
  }

  /// The `str()` form.
  pub fn display(&self) -> String {
    match self {
      Obj::Data(value) => render::display_str(value),
      Obj::Path => mock::PATH.to_string(),
      other => other.describe(),
    }
  }

  /// The `repr()` form.
  pub fn repr(&self) -> String {
    match self {
      Obj::Data(value) => render::flat(value),
      Obj::Path => format!("PosixPath({})", render::repr_str(mock::PATH)),
      other => other.describe(),
    }
  }

  fn describe(&self) -> String {
    match self {
      Obj::Builtin(b) => format!("<built-in function {}>", b.name()),
      Obj::Method { name, .. } => format!("<built-in method {}>", name),
      other => format!("<{} object>", other.kind()),
    }
  }
}

/// Attribute lookup. `None` means the object has no such attribute.
pub(crate) fn get_attr(obj: &Obj, attr: &str) -> Option<Obj> {
  Some(match obj {
    Obj::Module(module) => module_attr(*module, attr),
    Obj::Path => match attr {
      "parent" => Obj::Path,
      "name" | "stem" => Obj::data("path"),
      "exists" | "is_file" | "is_dir" => Obj::Function(MockFn::Missing),
      "resolve" | "absolute" | "expanduser" => Obj::Function(MockFn::SamePath),
      "mkdir" | "touch" | "unlink" => Obj::Function(MockFn::Noop),
      _ => Obj::Universal,
    },
    Obj::LocalTime => match attr {
      "tm_gmtoff" => Obj::data(mock::GMTOFF),
      _ => Obj::Universal,
    },
    Obj::Universal => Obj::Universal,
    Obj::Data(value) if methods::has_method(value, attr) => Obj::Method {
      receiver: value.clone(),
      name: attr.to_string(),
    },
    _ => return None,
  })
}

fn module_attr(module: MockModule, attr: &str) -> Obj {
  match (module, attr) {
    (MockModule::Os, "path") => Obj::Module(MockModule::OsPath),
    (MockModule::Os, "cpu_count") => Obj::Function(MockFn::CpuCount),
    (MockModule::Os, "sep") | (MockModule::OsPath, "sep") => Obj::data("/"),
    (MockModule::OsPath, "abspath") => Obj::Function(MockFn::Abspath),
    (MockModule::OsPath, "dirname") => Obj::Function(MockFn::Dirname),
    (MockModule::OsPath, "join") => Obj::Function(MockFn::Join),
    (MockModule::OsPath, "exists" | "isfile" | "isdir") => Obj::Function(MockFn::Missing),
    (MockModule::Time, "localtime") => Obj::Function(MockFn::Localtime),
    (MockModule::Pathlib, "Path" | "PurePath" | "PosixPath") => Obj::Function(MockFn::NewPath),
    (MockModule::PathKit, name) if name.starts_with("get_") && name.ends_with("_path") => {
      Obj::Function(MockFn::FolderPath)
    }
    _ => Obj::Universal,
  }
}

/// Call a mocked function. Arguments are accepted and ignored except by
/// `os.path.join`.
pub(crate) fn call_mock(function: MockFn, args: &[Obj]) -> Obj {
  match function {
    MockFn::CpuCount => Obj::data(mock::CPU_COUNT),
    MockFn::Abspath => Obj::data(mock::ABSPATH),
    MockFn::Dirname => Obj::data(mock::DIRNAME),
    MockFn::Join => Obj::data(args.iter().map(Obj::display).collect::<Vec<_>>().join("/")),
    MockFn::Localtime => Obj::LocalTime,
    MockFn::FolderPath => Obj::data(mock::FOLDER_PATH),
    MockFn::NewPath | MockFn::SamePath => Obj::Path,
    MockFn::Missing => Obj::data(false),
    MockFn::Noop => Obj::none(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn module_resolution() {
    assert_eq!(MockModule::resolve("os"), MockModule::Os);
    assert_eq!(MockModule::resolve("core.utils.path_kit"), MockModule::PathKit);
    assert_eq!(MockModule::resolve("pandas"), MockModule::Universal);
  }

  #[test]
  fn os_members() {
    let os = Obj::Module(MockModule::Os);
    let path = get_attr(&os, "path").unwrap();
    let join = get_attr(&path, "join").unwrap();
    let Obj::Function(join) = join else {
      panic!("expected function");
    };
    assert_eq!(
      call_mock(join, &[Obj::data("a"), Obj::Path, Obj::data("b")]),
      Obj::data("a//mock/path/b")
    );
    assert_eq!(get_attr(&os, "getenv"), Some(Obj::Universal));
  }

  #[test]
  fn path_members() {
    assert_eq!(get_attr(&Obj::Path, "parent"), Some(Obj::Path));
    assert_eq!(get_attr(&Obj::Path, "exists"), Some(Obj::Function(MockFn::Missing)));
    assert_eq!(Obj::Path.display(), "/mock/path");
  }

  #[test]
  fn data_attributes() {
    assert!(matches!(get_attr(&Obj::data("x"), "upper"), Some(Obj::Method { .. })));
    assert_eq!(get_attr(&Obj::data(1), "real"), None);
  }

  #[test]
  fn opaque_values() {
    assert_eq!(Obj::Path.into_value(), Value::unparsable("opaque Path object"));
    assert_eq!(Obj::data(3).into_value(), Value::Int(3));
  }
}
