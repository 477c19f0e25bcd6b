//! Types for running the operations of a build.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Errors of a single operation.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// The program could not be started.
  #[error("cannot start '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  /// The program exited with a non-zero status or was killed.
  #[error("command failed with exit code {code:?}: {cmd}")]
  CmdFailed { cmd: String, code: Option<i32> },

  #[error("command timed out after {after:?}: {cmd}")]
  Timeout { cmd: String, after: Duration },

  #[error("cancelled: {0}")]
  Cancelled(String),

  #[error("cannot copy {} to {}: {source}", .from.display(), .to.display())]
  Copy {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("lua script {} failed: {message}", .script.display())]
  Lua { script: PathBuf, message: String },

  /// An input of the operation comes from an operation that failed.
  #[error("not built, input failed: {}", .0.display())]
  InputFailed(PathBuf),

  /// An operation is missing a parameter it needs.
  #[error("malformed {kind} operation: {message}")]
  Malformed { kind: String, message: String },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Options of a [`BuildJob`](super::BuildJob).
#[derive(Debug, Clone)]
pub struct BuildOptions {
  /// Upper bound of concurrently running operations.
  pub max_jobs: usize,
  /// Abort on the first failing operation.
  pub stop_on_error: bool,
  /// Skip compiles and links whose outputs are newer than their inputs.
  pub track_headers: bool,
  /// Extra environment of every spawned process.
  pub env: BTreeMap<String, String>,
  /// Per process time limit.
  pub timeout: Option<Duration>,
}

impl Default for BuildOptions {
  fn default() -> Self {
    Self {
      max_jobs: num_cpus(),
      stop_on_error: true,
      track_headers: false,
      env: BTreeMap::new(),
      timeout: None,
    }
  }
}

/// Number of CPUs, never less than one.
pub fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(1).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
  Idle,
  Running,
  Finished,
  Cancelled,
  Failed,
}

impl JobState {
  pub fn is_done(self) -> bool {
    matches!(self, JobState::Finished | JobState::Cancelled | JobState::Failed)
  }
}

/// Outcome of one operation as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessResult {
  pub success: bool,
  pub argv: Vec<String>,
  pub workdir: PathBuf,
  pub stdout: Vec<String>,
  pub stderr: Vec<String>,
}

impl ProcessResult {
  pub fn new(argv: Vec<String>, workdir: PathBuf) -> Self {
    Self {
      success: false,
      argv,
      workdir,
      stdout: Vec::new(),
      stderr: Vec::new(),
    }
  }

  /// Record a failure without process output.
  pub fn failed(mut self, err: &ExecuteError) -> Self {
    self.success = false;
    self.stderr.push(err.to_string());
    self
  }
}

/// Split captured process output into lines.
pub fn output_lines(bytes: &[u8]) -> Vec<String> {
  String::from_utf8_lossy(bytes).lines().map(str::to_string).collect()
}

/// Progress notifications of a build or clean job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum JobEvent {
  TaskStarted { description: String, total: usize },
  TaskProgress(usize),
  CommandDescription { highlight: String, message: String },
  ProcessResult(ProcessResult),
  TaskFinished { success: bool },
}

/// Summary of a finished job.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobResult {
  pub completed: usize,
  pub failed: usize,
  /// Operations skipped because their outputs were up to date.
  pub skipped: usize,
  pub reports: Vec<ProcessResult>,
  pub success: bool,
}
