//! The built-in prelude and the functions callable from build descriptions.

use std::path::Path;

use crate::diag::{CodeLocation, LogLevel};
use crate::engine::ParseParams;
use crate::model::{Decl, DeclData, DeclId, DeclKind, Model, Type, Value, VarData, VarKind, Visibility};

use super::EvalError;

/// Source of the prelude module.
pub const PRELUDE_SOURCE: &str = include_str!("builtins.busy");

/// Pseudo file name used for prelude diagnostics.
pub const PRELUDE_FILE: &str = "<builtins>";

/// Ids of the built-in classes the evaluator and builder depend on.
#[derive(Debug, Clone, Copy)]
pub struct Builtins {
  pub config: DeclId,
  pub product: DeclId,
  pub compiled: DeclId,
  pub executable: DeclId,
  pub library: DeclId,
  pub source_set: DeclId,
  pub group: DeclId,
  pub copy: DeclId,
  pub lua_script: DeclId,
}

impl Builtins {
  pub fn resolve(model: &Model, prelude: DeclId) -> Result<Self, EvalError> {
    let class = |name: &str| -> Result<DeclId, EvalError> {
      model
        .member(prelude, name)
        .filter(|id| model.decl(*id).kind() == DeclKind::Class)
        .ok_or_else(|| EvalError::Semantic {
          loc: CodeLocation::file(Path::new(PRELUDE_FILE)),
          msg: format!("missing built-in class '{}'", name),
        })
    };
    Ok(Self {
      config: class("Config")?,
      product: class("Product")?,
      compiled: class("CompiledProduct")?,
      executable: class("Executable")?,
      library: class("Library")?,
      source_set: class("SourceSet")?,
      group: class("Group")?,
      copy: class("Copy")?,
      lua_script: class("LuaScript")?,
    })
  }
}

/// Global variables injected from the parse parameters.
pub fn globals(params: &ParseParams) -> Vec<(&'static str, Value)> {
  let host = &params.host;
  let target = &params.target;
  vec![
    ("host_cpu", Value::Symbol(host.cpu.clone())),
    ("host_cpu_ver", Value::Int(host.cpu_ver)),
    ("host_os", Value::Symbol(host.os.clone())),
    ("host_wordsize", Value::Int(host.wordsize)),
    ("host_toolchain", Value::Symbol(host.toolchain.clone())),
    ("host_toolchain_ver", Value::Int(host.toolchain_ver)),
    ("target_cpu", Value::Symbol(target.cpu.clone())),
    ("target_cpu_ver", Value::Int(target.cpu_ver)),
    ("target_os", Value::Symbol(target.os.clone())),
    ("target_wordsize", Value::Int(target.wordsize)),
    ("target_toolchain", Value::Symbol(target.toolchain.clone())),
    ("target_toolchain_ver", Value::Int(target.toolchain_ver)),
    (
      "target_toolchain_path",
      Value::Path(target.toolchain_path.to_string_lossy().into_owned()),
    ),
    ("target_toolchain_prefix", Value::Str(target.toolchain_prefix.clone())),
    ("build_mode", Value::Symbol(params.build_mode.as_str().to_string())),
    (
      "root_source_dir",
      Value::Path(params.root_source_dir.to_string_lossy().into_owned()),
    ),
    (
      "root_build_dir",
      Value::Path(params.root_build_dir.to_string_lossy().into_owned()),
    ),
  ]
}

/// Declare the parameter globals as public constants of the prelude.
pub fn declare_globals(model: &mut Model, prelude: DeclId, params: &ParseParams) {
  for (name, value) in globals(params) {
    let ty = value.infer_type();
    let mut decl = Decl::new(
      name,
      Some(prelude),
      CodeLocation::file(Path::new(PRELUDE_FILE)),
      DeclData::Var(VarData {
        var_kind: VarKind::Let,
        ty,
        value,
        has_body: false,
      }),
    );
    decl.visibility = Visibility::Public;
    let id = model.add_decl(decl);
    // The prelude source never declares these names.
    let _ = model.add_member(prelude, id);
  }
}

/// Statement level built-ins: `message`, `warning` and `error`.
pub fn log_level_of(name: &str) -> Option<LogLevel> {
  match name {
    "message" => Some(LogLevel::Message),
    "warning" => Some(LogLevel::Warning),
    "error" => Some(LogLevel::Error),
    _ => None,
  }
}

/// Join call arguments into one message text.
pub fn message_text(args: &[Value]) -> String {
  args.iter().map(|a| a.to_string()).collect::<Vec<_>>().join("")
}

/// Expression level built-ins.
pub fn call_function(model: &Model, module: DeclId, name: &str, args: &[Value]) -> Option<Result<Value, String>> {
  let result = match name {
    "tostring" => match args {
      [value] => Ok(Value::Str(value.to_string())),
      _ => Err("tostring expects one argument".to_string()),
    },
    "abspath" => match args {
      [] => Ok(Value::Path(
        model
          .module(module)
          .map(|m| m.dir.to_string_lossy().into_owned())
          .unwrap_or_default(),
      )),
      [Value::Path(p)] => Ok(Value::Path(model.resolve_path(module, p).to_string_lossy().into_owned())),
      _ => Err("abspath expects a path".to_string()),
    },
    "len" => match args {
      [Value::List(items)] => Ok(Value::Int(items.len() as i64)),
      [Value::Str(s)] => Ok(Value::Int(s.chars().count() as i64)),
      _ => Err("len expects a list or a string".to_string()),
    },
    _ => return None,
  };
  Some(result)
}

/// Convert an external parameter string to a value of `ty`.
///
/// `fallback` is the declared default, used to infer the type of untyped
/// parameters.
pub fn parse_param(raw: &str, ty: &Type, fallback: &Value) -> Option<Value> {
  let ty = match ty {
    Type::Any => fallback.infer_type(),
    other => other.clone(),
  };
  match ty {
    Type::Bool => match raw {
      "" | "true" => Some(Value::Bool(true)),
      "false" => Some(Value::Bool(false)),
      _ => None,
    },
    Type::Int => raw.parse().ok().map(Value::Int),
    Type::Real => raw.parse().ok().map(Value::Real),
    Type::Path => {
      let text = raw.trim_matches('\'');
      let text = match text.strip_prefix("//") {
        Some(rest) => format!("/{}", rest),
        None => text.to_string(),
      };
      Some(Value::Path(text))
    }
    Type::Symbol | Type::Enum(_) => Some(Value::Symbol(raw.trim_start_matches('`').to_string())),
    Type::String | Type::Any => Some(Value::Str(raw.to_string())),
    Type::List(_) | Type::Class(_) => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_parameter_means_true() {
    assert_eq!(parse_param("", &Type::Bool, &Value::Nil), Some(Value::Bool(true)));
    assert_eq!(
      parse_param("false", &Type::Any, &Value::Bool(true)),
      Some(Value::Bool(false))
    );
  }

  #[test]
  fn parameter_types_follow_default_value() {
    assert_eq!(parse_param("12", &Type::Any, &Value::Int(1)), Some(Value::Int(12)));
    assert_eq!(parse_param("x", &Type::Any, &Value::Int(1)), None);
    assert_eq!(
      parse_param("`linux", &Type::Symbol, &Value::Nil),
      Some(Value::Symbol("linux".into()))
    );
    assert_eq!(
      parse_param("//opt/sdk", &Type::Path, &Value::Nil),
      Some(Value::Path("/opt/sdk".into()))
    );
  }

  #[test]
  fn globals_cover_host_and_target() {
    let params = ParseParams::new("/src", "/build");
    let names: Vec<_> = globals(&params).into_iter().map(|(n, _)| n).collect();
    for expected in ["host_os", "target_cpu", "target_toolchain_prefix", "build_mode", "root_build_dir"] {
      assert!(names.contains(&expected), "missing {}", expected);
    }
  }
}
