//! Parameters of a parse and the closed set of queryable fields.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::platform::{Arch, Os};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
  #[default]
  Debug,
  Optimized,
}

impl BuildMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      BuildMode::Debug => "debug",
      BuildMode::Optimized => "optimized",
    }
  }
}

impl FromStr for BuildMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "debug" => Ok(BuildMode::Debug),
      "optimized" | "release" => Ok(BuildMode::Optimized),
      other => Err(format!("unknown build mode '{}'", other)),
    }
  }
}

impl fmt::Display for BuildMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// What happens when a `configs` chain refers back to itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigCycleMode {
  /// Skip the repeated config and log a warning.
  #[default]
  Report,
  /// Fail the fetch.
  Error,
}

/// Host or target platform description injected as globals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformParams {
  pub cpu: String,
  pub cpu_ver: i64,
  pub os: String,
  pub wordsize: i64,
  pub toolchain: String,
  pub toolchain_ver: i64,
  /// Directory of the compiler executables, empty if on `PATH`.
  pub toolchain_path: PathBuf,
  /// Prefix of the compiler executables, e.g. `arm-none-eabi-`.
  pub toolchain_prefix: String,
}

impl Default for PlatformParams {
  fn default() -> Self {
    let os = Os::current().unwrap_or(Os::Unix);
    Self {
      cpu: Arch::current().unwrap_or(Arch::X86).as_str().to_string(),
      cpu_ver: 0,
      os: os.as_str().to_string(),
      wordsize: usize::BITS as i64,
      toolchain: os.default_toolchain().to_string(),
      toolchain_ver: 0,
      toolchain_path: PathBuf::new(),
      toolchain_prefix: String::new(),
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct ParseParams {
  pub root_source_dir: PathBuf,
  pub root_build_dir: PathBuf,
  pub build_mode: BuildMode,
  pub host: PlatformParams,
  pub target: PlatformParams,
  /// Parameter overrides keyed by qualified name (`opt`, `sub.opt`).
  /// An empty value means `true`.
  pub params: BTreeMap<String, String>,
  /// Products to select; empty selects every product with sources.
  pub targets: Vec<String>,
  pub config_cycles: ConfigCycleMode,
}

impl ParseParams {
  pub fn new(root_source_dir: impl Into<PathBuf>, root_build_dir: impl Into<PathBuf>) -> Self {
    Self {
      root_source_dir: root_source_dir.into(),
      root_build_dir: root_build_dir.into(),
      ..Default::default()
    }
  }
}

/// Product selection for `Engine::all_products`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductFilter {
  Executable,
  Compiled,
  AllProducts,
  /// Has a `sources` field and no `use_deps` field.
  WithSources,
}

/// Fields that can be queried through the engine.
///
/// Names starting with `#` are meta fields of the declaration; the others
/// are fields of the object built for a variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
  DeclName,
  Dir,
  RDir,
  File,
  Row,
  Col,
  EndRow,
  EndCol,
  Generated,
  Artifact,
  Name,
  Sources,
  Deps,
  Configs,
  IncludeDirs,
  Defines,
  CFlags,
  CFlagsC,
  CFlagsCc,
  LdFlags,
  LibDirs,
  LibNames,
  LibFiles,
  LibType,
  Outputs,
  Script,
  Args,
  UseDeps,
  /// Any other instance field.
  Inst(String),
}

impl Field {
  pub fn is_meta(&self) -> bool {
    matches!(
      self,
      Field::DeclName
        | Field::Dir
        | Field::RDir
        | Field::File
        | Field::Row
        | Field::Col
        | Field::EndRow
        | Field::EndCol
        | Field::Generated
        | Field::Artifact
    )
  }

  pub fn as_str(&self) -> &str {
    match self {
      Field::DeclName => "#name",
      Field::Dir => "#dir",
      Field::RDir => "#rdir",
      Field::File => "#file",
      Field::Row => "#row",
      Field::Col => "#col",
      Field::EndRow => "#endrow",
      Field::EndCol => "#endcol",
      Field::Generated => "#generated",
      Field::Artifact => "#product",
      Field::Name => "name",
      Field::Sources => "sources",
      Field::Deps => "deps",
      Field::Configs => "configs",
      Field::IncludeDirs => "include_dirs",
      Field::Defines => "defines",
      Field::CFlags => "cflags",
      Field::CFlagsC => "cflags_c",
      Field::CFlagsCc => "cflags_cc",
      Field::LdFlags => "ldflags",
      Field::LibDirs => "lib_dirs",
      Field::LibNames => "lib_names",
      Field::LibFiles => "lib_files",
      Field::LibType => "lib_type",
      Field::Outputs => "outputs",
      Field::Script => "script",
      Field::Args => "args",
      Field::UseDeps => "use_deps",
      Field::Inst(name) => name,
    }
  }
}

impl From<&str> for Field {
  fn from(s: &str) -> Self {
    match s {
      "#name" => Field::DeclName,
      "#dir" => Field::Dir,
      "#rdir" => Field::RDir,
      "#file" => Field::File,
      "#row" => Field::Row,
      "#col" => Field::Col,
      "#endrow" => Field::EndRow,
      "#endcol" => Field::EndCol,
      "#generated" => Field::Generated,
      "#product" => Field::Artifact,
      "name" => Field::Name,
      "sources" => Field::Sources,
      "deps" => Field::Deps,
      "configs" => Field::Configs,
      "include_dirs" => Field::IncludeDirs,
      "defines" => Field::Defines,
      "cflags" => Field::CFlags,
      "cflags_c" => Field::CFlagsC,
      "cflags_cc" => Field::CFlagsCc,
      "ldflags" => Field::LdFlags,
      "lib_dirs" => Field::LibDirs,
      "lib_names" => Field::LibNames,
      "lib_files" => Field::LibFiles,
      "lib_type" => Field::LibType,
      "outputs" => Field::Outputs,
      "script" => Field::Script,
      "args" => Field::Args,
      "use_deps" => Field::UseDeps,
      other => Field::Inst(other.to_string()),
    }
  }
}

impl fmt::Display for Field {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Why a typed field lookup produced no value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
  #[error("invalid reference")]
  InvalidRef,

  #[error("no parsed session")]
  NoSession,

  #[error("'{0}' is not a field of this declaration")]
  UnknownField(String),

  #[error("config cycle detected at '{0}'")]
  ConfigCycle(String),
}
