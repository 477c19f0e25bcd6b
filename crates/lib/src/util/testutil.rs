//! Test helpers: throwaway projects and portable shell commands.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::engine::{Engine, ParseParams};

/// Write `files` (relative path, content) below a fresh temp dir.
pub fn project(files: &[(&str, &str)]) -> TempDir {
  let dir = TempDir::new().unwrap();
  for (path, content) in files {
    write(&dir.path().join(path), content);
  }
  dir
}

pub fn write(path: &Path, content: &str) {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(path, content).unwrap();
}

/// Parse params for a project in `dir` building into `dir/output`.
pub fn params(dir: &Path) -> ParseParams {
  ParseParams::new(dir, dir.join("output"))
}

/// Parse a project, panicking with its errors on failure.
pub fn parse(dir: &Path) -> Engine {
  let mut engine = Engine::new();
  let ok = engine.parse(params(dir), true);
  assert!(ok, "parse failed: {:?}", engine.errors());
  engine
}

pub fn build_dir(dir: &Path) -> PathBuf {
  dir.join("output")
}

/// Returns the shell command and args to execute a shell script.
#[cfg(unix)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("/bin/sh", vec!["-c".to_string(), script.to_string()])
}

#[cfg(windows)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("cmd.exe", vec!["/C".to_string(), script.to_string()])
}

/// Returns the command and args to echo a message.
///
/// On Unix, this uses /bin/echo directly.
/// On Windows, echo is a shell builtin, so we wrap it in cmd.exe.
#[cfg(unix)]
pub fn echo_msg(msg: &str) -> (&'static str, Vec<String>) {
  ("/bin/echo", vec![msg.to_string()])
}

#[cfg(windows)]
pub fn echo_msg(msg: &str) -> (&'static str, Vec<String>) {
  ("cmd.exe", vec!["/C".to_string(), format!("echo {}", msg)])
}
