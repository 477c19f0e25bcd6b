//! Diagnostics: severity levels, locations and the logger callback.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Severity of a log event, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LogLevel {
  Info,
  Message,
  Debug,
  Warning,
  Error,
  Critical,
}

impl LogLevel {
  /// Error and Critical abort evaluation and become user visible.
  pub fn is_error(self) -> bool {
    self >= LogLevel::Error
  }

  /// Prefix used when a message is printed.
  pub fn tag(self) -> &'static str {
    match self {
      LogLevel::Info | LogLevel::Message => "",
      LogLevel::Debug => "DEBUG: ",
      LogLevel::Warning => "WARNING: ",
      LogLevel::Error | LogLevel::Critical => "ERROR: ",
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct CodeLocation {
  pub file: PathBuf,
  pub row: u32,
  pub col: u32,
}

impl CodeLocation {
  pub fn new(file: impl Into<PathBuf>, row: u32, col: u32) -> Self {
    Self {
      file: file.into(),
      row,
      col,
    }
  }

  pub fn file(file: &Path) -> Self {
    Self::new(file, 0, 0)
  }
}

impl fmt::Display for CodeLocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.row == 0 {
      write!(f, "{}", self.file.display())
    } else {
      write!(f, "{}:{}:{}", self.file.display(), self.row, self.col)
    }
  }
}

/// A user visible error tied to a code location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorItem {
  pub loc: Option<CodeLocation>,
  pub msg: String,
}

impl ErrorItem {
  pub fn new(loc: Option<CodeLocation>, msg: impl Into<String>) -> Self {
    Self { loc, msg: msg.into() }
  }
}

impl fmt::Display for ErrorItem {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.loc {
      Some(loc) => write!(f, "{} {}", loc, self.msg),
      None => write!(f, "{}", self.msg),
    }
  }
}

/// Accumulated errors of a parse or build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
  pub errors: Vec<ErrorItem>,
}

impl ErrorInfo {
  pub fn is_empty(&self) -> bool {
    self.errors.is_empty()
  }

  pub fn push(&mut self, item: ErrorItem) {
    self.errors.push(item);
  }
}

/// Receives every log event of the evaluator.
pub trait Logger {
  fn log(&mut self, level: LogLevel, loc: Option<&CodeLocation>, msg: &str);
}

/// Default logger: forwards to `tracing`.
#[derive(Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
  fn log(&mut self, level: LogLevel, loc: Option<&CodeLocation>, msg: &str) {
    let loc = loc.map(|l| l.to_string()).unwrap_or_default();
    match level {
      LogLevel::Info | LogLevel::Message => info!(loc = %loc, "{}", msg),
      LogLevel::Debug => debug!(loc = %loc, "{}", msg),
      LogLevel::Warning => warn!(loc = %loc, "{}", msg),
      LogLevel::Error | LogLevel::Critical => error!(loc = %loc, "{}", msg),
    }
  }
}
