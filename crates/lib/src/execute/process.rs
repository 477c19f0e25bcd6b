//! Running external programs and file copies.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info};

use super::cancel::CancelToken;
use crate::model::normalize;
use super::types::{ExecuteError, ProcessResult, output_lines};

/// Run `argv` in `workdir` and capture its output.
///
/// A non-zero exit is not an error here: the result comes back with
/// `success == false` and the captured output. Spawn failures, timeouts
/// and cancellation are errors; the child is killed in the latter two.
pub async fn run_process(
  argv: &[String],
  workdir: &Path,
  env: &BTreeMap<String, String>,
  timeout: Option<Duration>,
  cancel: &CancelToken,
) -> Result<ProcessResult, ExecuteError> {
  let Some((program, args)) = argv.split_first() else {
    return Err(ExecuteError::Malformed {
      kind: "process".to_string(),
      message: "empty command line".to_string(),
    });
  };
  let cmd = argv.join(" ");
  info!(cmd = %cmd, "executing command");

  let mut command = Command::new(program);
  command
    .args(args)
    .current_dir(workdir)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);
  for (key, value) in env {
    command.env(key, value);
  }

  let child = command.spawn().map_err(|source| ExecuteError::Spawn {
    program: program.clone(),
    source,
  })?;

  // Dropping the output future drops the child, which kills it.
  let output = child.wait_with_output();
  let output = tokio::select! {
    res = output => res?,
    _ = cancel.cancelled() => return Err(ExecuteError::Cancelled(cmd)),
    _ = sleep_or_forever(timeout) => {
      return Err(ExecuteError::Timeout {
        cmd,
        after: timeout.unwrap_or_default(),
      });
    }
  };

  let mut result = ProcessResult::new(argv.to_vec(), workdir.to_path_buf());
  result.success = output.status.success();
  result.stdout = output_lines(&output.stdout);
  result.stderr = output_lines(&output.stderr);
  if !result.success {
    debug!(cmd = %cmd, code = ?output.status.code(), "command failed");
  }
  Ok(result)
}

async fn sleep_or_forever(timeout: Option<Duration>) {
  match timeout {
    Some(d) => tokio::time::sleep(d).await,
    None => std::future::pending().await,
  }
}

/// Copy `from` to `to`, creating the parent directory of `to`.
pub async fn copy_file(from: &Path, to: &Path) -> Result<(), ExecuteError> {
  let wrap = |source| ExecuteError::Copy {
    from: from.to_path_buf(),
    to: to.to_path_buf(),
    source,
  };
  if same_file(from, to).await {
    debug!(file = %to.display(), "copy onto itself skipped");
    return Ok(());
  }
  if let Some(parent) = to.parent() {
    tokio::fs::create_dir_all(parent).await.map_err(wrap)?;
  }
  tokio::fs::copy(from, to).await.map_err(wrap)?;
  debug!(from = %from.display(), to = %to.display(), "copied");
  Ok(())
}

/// `copy` truncates its target before reading, so a file must never be
/// copied onto itself.
async fn same_file(a: &Path, b: &Path) -> bool {
  if normalize(a) == normalize(b) {
    return true;
  }
  match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
    (Ok(a), Ok(b)) => a == b,
    _ => false,
  }
}
