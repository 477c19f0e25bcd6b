mod build;
mod clean;
mod info;
mod ops;
mod products;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;

use busy_lib::{ErrorInfo, LogLevel, LogSink, Project, SetupParams};

use crate::output::{print_error_items, print_warning_items};

pub use build::cmd_build;
pub use clean::cmd_clean;
pub use info::cmd_info;
pub use ops::cmd_ops;
pub use products::cmd_products;

/// Flags shared by every command that parses a project.
#[derive(Debug, Clone, Default, Args)]
pub struct SetupArgs {
  /// Root build directory (default: <DIR>/output)
  #[arg(long, env = "BUSY_BUILD_DIR")]
  pub build_dir: Option<PathBuf>,

  /// gcc, clang or msvc (default: host toolchain)
  #[arg(long)]
  pub toolchain: Option<String>,

  /// Compiler executable; a bare name is looked up on PATH
  #[arg(long)]
  pub cc: Option<PathBuf>,

  /// debug or optimized
  #[arg(long, default_value = "debug")]
  pub mode: String,

  /// Set a parameter, `-P name=value`; `-P name` sets it to true
  #[arg(short = 'P', value_name = "NAME[=VALUE]")]
  pub params: Vec<String>,

  /// Product to build; may be repeated (default: all products with sources)
  #[arg(short = 't', long = "target")]
  pub targets: Vec<String>,
}

impl SetupArgs {
  pub fn to_setup(&self) -> Result<SetupParams> {
    let mut setup = SetupParams {
      build_variant: self.mode.clone(),
      params: parse_params(&self.params),
      targets: self.targets.clone(),
      ..SetupParams::default()
    };
    if let Some(toolchain) = &self.toolchain {
      setup.toolchain = toolchain.clone();
    }
    if let Some(cc) = &self.cc {
      setup.compiler_command = resolve_compiler(cc)?;
    }
    if let Some(build_dir) = &self.build_dir {
      setup.build_dir = build_dir.clone();
    }
    Ok(setup)
  }
}

/// Flags of `busy build`.
#[derive(Debug, Clone, Default)]
pub struct BuildArgs {
  pub jobs: Option<usize>,
  pub keep_going: bool,
  pub track_headers: bool,
  pub timeout: Option<Duration>,
}

fn parse_params(raw: &[String]) -> BTreeMap<String, String> {
  raw
    .iter()
    .map(|p| match p.split_once('=') {
      Some((name, value)) => (name.trim().to_string(), value.trim().to_string()),
      None => (p.trim().to_string(), String::new()),
    })
    .collect()
}

fn resolve_compiler(cc: &Path) -> Result<PathBuf> {
  if cc.components().count() > 1 {
    return Ok(cc.to_path_buf());
  }
  let found = which::which(cc).with_context(|| format!("compiler '{}' not found on PATH", cc.display()))?;
  debug!(compiler = %found.display(), "resolved compiler");
  Ok(found)
}

/// Prints parser warnings while a project is evaluated.
struct StderrSink;

impl LogSink for StderrSink {
  fn level(&self) -> LogLevel {
    LogLevel::Warning
  }

  fn print_warning(&mut self, warning: &ErrorInfo) {
    print_warning_items(warning);
  }

  fn print_message(&mut self, _level: LogLevel, msg: &str, tag: &str) {
    eprintln!("{}{}", tag, msg);
  }
}

/// Open and parse the project at `dir`.
///
/// Returns `None` after printing the errors if the parse failed.
pub(crate) fn load_project(dir: &Path, args: &SetupArgs) -> Result<Option<Project>> {
  let setup = args.to_setup()?;
  let mut project = Project::new(dir).with_context(|| format!("cannot open project at {}", dir.display()))?;
  if !project.parse(&setup, Some(Box::new(StderrSink))) {
    print_error_items(&project.errors());
    return Ok(None);
  }
  Ok(Some(project))
}
