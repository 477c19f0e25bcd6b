//! Build operations and the visitor that receives them.

use std::fmt;

use serde::Serialize;

use super::toolchain::Toolchain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OpKind {
  /// Marker emitted before the operations of a product; it has no `end_op`.
  EnteringProduct,
  Compile,
  LinkExe,
  LinkDll,
  LinkLib,
  RunLua,
  Copy,
}

impl OpKind {
  pub fn is_link(self) -> bool {
    matches!(self, OpKind::LinkExe | OpKind::LinkDll | OpKind::LinkLib)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      OpKind::EnteringProduct => "ENTERING",
      OpKind::Compile => "COMPILE",
      OpKind::LinkExe | OpKind::LinkDll | OpKind::LinkLib => "LINK",
      OpKind::RunLua => "LUA",
      OpKind::Copy => "COPY",
    }
  }
}

impl fmt::Display for OpKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ParamKind {
  InFile,
  OutFile,
  CFlag,
  Define,
  IncludeDir,
  LdFlag,
  LibDir,
  LibName,
  /// Script argument of a Lua operation.
  Arg,
}

impl ParamKind {
  pub fn as_str(self) -> &'static str {
    match self {
      ParamKind::InFile => "INFILE",
      ParamKind::OutFile => "OUTFILE",
      ParamKind::CFlag => "CFLAG",
      ParamKind::Define => "DEFINE",
      ParamKind::IncludeDir => "INCLUDEDIR",
      ParamKind::LdFlag => "LDFLAG",
      ParamKind::LibDir => "LIBDIR",
      ParamKind::LibName => "LIBNAME",
      ParamKind::Arg => "ARG",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Param {
  pub kind: ParamKind,
  pub value: String,
}

impl Param {
  pub fn new(kind: ParamKind, value: impl Into<String>) -> Self {
    Self {
      kind,
      value: value.into(),
    }
  }
}

/// Receives the linearized operation list.
///
/// Every operation except [`OpKind::EnteringProduct`] is bracketed by
/// `begin_op` and `end_op`. `fork_group(n)` with `n > 0` opens a group of
/// `n` operations that may run concurrently, `n < 0` closes it.
/// `product` is the qualified name of the product owning the operation;
/// the markers of one wave all precede its operations.
pub trait OpVisitor {
  fn begin_op(&mut self, _kind: OpKind, _command: &str, _product: &str, _toolchain: Toolchain, _os: &str) {}

  fn param(&mut self, kind: ParamKind, value: &str);

  fn end_op(&mut self) {}

  fn fork_group(&mut self, _n: i32) {}
}

/// One operation with its barrier group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
  pub kind: OpKind,
  /// Program to run, or the product path for `EnteringProduct`.
  pub command: String,
  pub toolchain: Toolchain,
  pub os: String,
  pub group: u32,
  /// Qualified name of the product the operation belongs to.
  pub product: String,
  pub params: Vec<Param>,
}

impl Operation {
  pub fn values(&self, kind: ParamKind) -> impl Iterator<Item = &str> {
    self.params.iter().filter(move |p| p.kind == kind).map(|p| p.value.as_str())
  }

  pub fn infiles(&self) -> impl Iterator<Item = &str> {
    self.values(ParamKind::InFile)
  }

  pub fn outfile(&self) -> Option<&str> {
    self.values(ParamKind::OutFile).next()
  }
}

/// Collects visited operations and assigns group numbers.
#[derive(Debug, Default)]
pub struct OpCollector {
  pub ops: Vec<Operation>,
  current: Option<Operation>,
  group: u32,
  in_group: bool,
}

impl OpCollector {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn into_ops(self) -> Vec<Operation> {
    self.ops
  }
}

impl OpVisitor for OpCollector {
  fn begin_op(&mut self, kind: OpKind, command: &str, product: &str, toolchain: Toolchain, os: &str) {
    if !self.in_group {
      self.group += 1;
    }
    let op = Operation {
      kind,
      command: command.to_string(),
      toolchain,
      os: os.to_string(),
      group: self.group,
      product: product.to_string(),
      params: Vec::new(),
    };
    if kind == OpKind::EnteringProduct {
      self.ops.push(op);
    } else {
      self.current = Some(op);
    }
  }

  fn param(&mut self, kind: ParamKind, value: &str) {
    if let Some(op) = self.current.as_mut() {
      op.params.push(Param::new(kind, value));
    }
  }

  fn end_op(&mut self) {
    if let Some(op) = self.current.take() {
      self.ops.push(op);
    }
  }

  fn fork_group(&mut self, n: i32) {
    if n > 0 {
      self.group += 1;
    }
    self.in_group = n >= 0;
  }
}

/// Collects the output files of every operation.
#[derive(Debug, Default)]
pub struct OutFileCollector {
  pub files: Vec<String>,
}

impl OpVisitor for OutFileCollector {
  fn param(&mut self, kind: ParamKind, value: &str) {
    if kind == ParamKind::OutFile {
      self.files.push(value.to_string());
    }
  }
}
