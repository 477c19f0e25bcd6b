//! Runtime values and types of the evaluator.

use std::fmt;

use super::{DeclId, InstId};

/// A value held by a variable or an instance field.
///
/// Paths are kept as written (relative or absolute); relative paths are
/// resolved against the owning module's directory when fetched.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Nil,
  Bool(bool),
  Int(i64),
  Real(f64),
  Str(String),
  Path(String),
  Symbol(String),
  List(Vec<Value>),
  Object(InstId),
  Decl(DeclId),
}

impl Value {
  pub fn type_name(&self) -> &'static str {
    match self {
      Value::Nil => "nil",
      Value::Bool(_) => "bool",
      Value::Int(_) => "int",
      Value::Real(_) => "real",
      Value::Str(_) => "string",
      Value::Path(_) => "path",
      Value::Symbol(_) => "symbol",
      Value::List(_) => "list",
      Value::Object(_) => "object",
      Value::Decl(_) => "declaration",
    }
  }

  pub fn is_nil(&self) -> bool {
    matches!(self, Value::Nil)
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Bool(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_list(&self) -> &[Value] {
    match self {
      Value::List(items) => items,
      _ => &[],
    }
  }

  /// Text of a string, path or symbol.
  pub fn as_text(&self) -> Option<&str> {
    match self {
      Value::Str(s) | Value::Path(s) | Value::Symbol(s) => Some(s),
      _ => None,
    }
  }

  /// Type inferred for an untyped declaration.
  pub fn infer_type(&self) -> Type {
    match self {
      Value::Nil => Type::Any,
      Value::Bool(_) => Type::Bool,
      Value::Int(_) => Type::Int,
      Value::Real(_) => Type::Real,
      Value::Str(_) => Type::String,
      Value::Path(_) => Type::Path,
      Value::Symbol(_) => Type::Symbol,
      Value::List(items) => Type::List(Box::new(items.first().map(Value::infer_type).unwrap_or(Type::Any))),
      Value::Object(_) | Value::Decl(_) => Type::Any,
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Nil => write!(f, "nil"),
      Value::Bool(b) => write!(f, "{}", b),
      Value::Int(i) => write!(f, "{}", i),
      Value::Real(r) => write!(f, "{}", r),
      Value::Str(s) | Value::Path(s) => write!(f, "{}", s),
      Value::Symbol(s) => write!(f, "`{}", s),
      Value::List(items) => {
        write!(f, "[")?;
        for (i, item) in items.iter().enumerate() {
          if i > 0 {
            write!(f, " ")?;
          }
          write!(f, "{}", item)?;
        }
        write!(f, "]")
      }
      Value::Object(id) => write!(f, "<object {}>", id.0),
      Value::Decl(id) => write!(f, "<decl {}>", id.0),
    }
  }
}

/// Static type of a declaration or field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
  Any,
  Bool,
  Int,
  Real,
  String,
  Path,
  Symbol,
  List(Box<Type>),
  Class(DeclId),
  Enum(DeclId),
}

impl Type {
  pub fn builtin(name: &str) -> Option<Self> {
    let ty = match name {
      "bool" => Type::Bool,
      "int" => Type::Int,
      "real" => Type::Real,
      "string" => Type::String,
      "path" => Type::Path,
      "symbol" => Type::Symbol,
      _ => return None,
    };
    Some(ty)
  }

  pub fn is_list(&self) -> bool {
    matches!(self, Type::List(_))
  }

  pub fn element(&self) -> Option<&Type> {
    match self {
      Type::List(inner) => Some(inner),
      _ => None,
    }
  }

  /// Initial value of a field or typed variable without initializer.
  pub fn zero(&self) -> Value {
    match self {
      Type::Bool => Value::Bool(false),
      Type::Int => Value::Int(0),
      Type::Real => Value::Real(0.0),
      Type::String => Value::Str(String::new()),
      Type::List(_) => Value::List(Vec::new()),
      Type::Any | Type::Path | Type::Symbol | Type::Class(_) | Type::Enum(_) => Value::Nil,
    }
  }
}
