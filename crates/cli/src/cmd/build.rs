//! Implementation of the `busy build` command.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::warn;

use busy_lib::execute::JobState;
use busy_lib::{BuildOptions, ErrorInfo, JobEvent};

use super::{BuildArgs, SetupArgs, load_project};
use crate::output::{format_duration, print_command, print_error, print_error_items, print_stat, print_success};

/// Parse the project at `dir` and build the selected products.
///
/// Ctrl-C cancels the build; running processes are killed. Returns
/// `Ok(false)` if the parse or any operation failed.
pub fn cmd_build(dir: &Path, setup: &SetupArgs, args: &BuildArgs) -> Result<bool> {
  let start = Instant::now();
  let Some(mut project) = load_project(dir, setup)? else {
    return Ok(false);
  };

  let mut options = BuildOptions {
    stop_on_error: !args.keep_going,
    track_headers: args.track_headers,
    timeout: args.timeout,
    ..BuildOptions::default()
  };
  if let Some(jobs) = args.jobs {
    options.max_jobs = jobs.max(1);
  }

  let (tx, rx) = mpsc::unbounded_channel();
  let mut job = project.build(&options).with_events(tx);
  if job.state() == JobState::Failed {
    print_error_items(&ErrorInfo {
      errors: job.errors().to_vec(),
    });
    return Ok(false);
  }

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let result = rt.block_on(async move {
    let printer = tokio::spawn(print_events(rx));
    let cancel = job.cancel_token();
    let interrupt = tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupted, cancelling build");
        cancel.cancel();
      }
    });

    let result = job.run().await;
    interrupt.abort();
    // closes the event channel
    drop(job);
    let _ = printer.await;
    result
  });

  println!();
  if result.success {
    print_success("Build finished");
  } else {
    print_error("Build failed");
  }
  print_stat("Completed", &result.completed.to_string());
  print_stat("Failed", &result.failed.to_string());
  print_stat("Up to date", &result.skipped.to_string());
  print_stat("Duration", &format_duration(start.elapsed()));

  Ok(result.success)
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<JobEvent>) {
  while let Some(event) = rx.recv().await {
    match event {
      JobEvent::CommandDescription { highlight, message } => {
        print_command(&highlight, &message);
      }
      JobEvent::ProcessResult(report) => {
        if !report.success {
          print_error(&report.argv.join(" "));
        }
        for line in report.stdout.iter().chain(&report.stderr) {
          eprintln!("  {}", line);
        }
      }
      _ => {}
    }
  }
}
