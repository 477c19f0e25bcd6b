//! Build and clean jobs.
//!
//! A [`BuildJob`] runs the operation list produced by the builder. Fork
//! groups are barriers: every operation of group `n` has finished before
//! any operation of group `n + 1` starts. Inside a group operations run
//! concurrently, bounded by [`BuildOptions::max_jobs`].

pub mod cancel;
pub mod clean;
pub mod deps;
pub mod lua;
pub mod process;
pub mod types;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::builder::{OpCollector, OpKind, Operation, ParamKind};
use crate::diag::{CodeLocation, ErrorItem};
use crate::engine::Engine;

pub use cancel::CancelToken;
pub use clean::CleanJob;
pub use deps::DependencyTable;
pub use types::{BuildOptions, ExecuteError, JobEvent, JobResult, JobState, ProcessResult};

/// Sender half of a job's event channel.
pub type EventSender = mpsc::UnboundedSender<JobEvent>;

pub(crate) fn emit(events: Option<&EventSender>, event: JobEvent) {
  if let Some(tx) = events {
    // A dropped receiver only means nobody is listening.
    let _ = tx.send(event);
  }
}

/// State shared by the tasks of one run.
struct RunCtx {
  workdir: PathBuf,
  options: BuildOptions,
  cancel: CancelToken,
  abort: AtomicBool,
  events: Option<EventSender>,
}

impl RunCtx {
  fn should_stop(&self) -> bool {
    self.cancel.is_cancelled() || self.abort.load(Ordering::SeqCst)
  }
}

pub struct BuildJob {
  ops: Vec<Operation>,
  options: BuildOptions,
  workdir: PathBuf,
  state: JobState,
  errors: Vec<ErrorItem>,
  cancel: CancelToken,
  events: Option<EventSender>,
}

impl BuildJob {
  /// Prepare the build of `targets`; empty selects the default products.
  ///
  /// Creates the build directories and visits the project. If either
  /// fails the job starts in [`JobState::Failed`] and [`errors`](Self::errors)
  /// says why.
  pub fn new(engine: &mut Engine, options: BuildOptions, targets: &[String]) -> Self {
    let workdir = engine
      .session()
      .map(|s| s.params.root_build_dir.clone())
      .unwrap_or_default();
    let mut job = Self::from_ops(Vec::new(), options, workdir);

    if let Err(e) = engine.create_build_dirs() {
      job.errors.push(ErrorItem::new(
        Some(CodeLocation::file(&job.workdir)),
        format!("cannot create build directories: {}", e),
      ));
      job.state = JobState::Failed;
      return job;
    }

    let mut collector = OpCollector::new();
    if !engine.visit(&mut collector, targets) {
      job.errors = engine.errors();
      job.state = JobState::Failed;
      return job;
    }
    job.ops = collector.into_ops();
    info!(ops = job.ops.len(), "build prepared");
    job
  }

  /// A job over an explicit operation list, run in `workdir`.
  pub fn from_ops(ops: Vec<Operation>, options: BuildOptions, workdir: impl Into<PathBuf>) -> Self {
    Self {
      ops,
      options,
      workdir: workdir.into(),
      state: JobState::Idle,
      errors: Vec::new(),
      cancel: CancelToken::new(),
      events: None,
    }
  }

  pub fn with_events(mut self, events: EventSender) -> Self {
    self.events = Some(events);
    self
  }

  pub fn ops(&self) -> &[Operation] {
    &self.ops
  }

  pub fn state(&self) -> JobState {
    self.state
  }

  pub fn errors(&self) -> &[ErrorItem] {
    &self.errors
  }

  /// Token that cancels this job from another task.
  pub fn cancel_token(&self) -> CancelToken {
    self.cancel.clone()
  }

  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  pub async fn run(&mut self) -> JobResult {
    let mut result = JobResult::default();
    if self.state != JobState::Idle {
      emit(self.events.as_ref(), JobEvent::TaskFinished { success: false });
      return result;
    }
    self.state = JobState::Running;

    let total = self.ops.iter().filter(|op| op.kind != OpKind::EnteringProduct).count();
    emit(
      self.events.as_ref(),
      JobEvent::TaskStarted {
        description: "build".to_string(),
        total,
      },
    );
    info!(total, max_jobs = self.options.max_jobs, "starting build");

    let ctx = Arc::new(RunCtx {
      workdir: self.workdir.clone(),
      options: self.options.clone(),
      cancel: self.cancel.clone(),
      abort: AtomicBool::new(false),
      events: self.events.clone(),
    });
    let semaphore = Arc::new(Semaphore::new(self.options.max_jobs.max(1)));
    let mut deps = DependencyTable::new();
    // outputs of failed operations; their consumers never run
    let mut broken: HashSet<String> = HashSet::new();

    for group in groups(&self.ops) {
      if ctx.should_stop() {
        break;
      }
      debug!(group = group[0].group, ops = group.len(), "dispatching group");

      let mut runnable = Vec::new();
      for op in group {
        if op.kind == OpKind::EnteringProduct {
          emit(
            ctx.events.as_ref(),
            JobEvent::CommandDescription {
              highlight: op.kind.as_str().to_string(),
              message: op.command.clone(),
            },
          );
        } else if let Some(input) = op.infiles().find(|i| broken.contains(*i)) {
          warn!(product = %op.product, kind = %op.kind, input, "skipped, input failed");
          broken.extend(op.values(ParamKind::OutFile).map(str::to_string));
          let report =
            ProcessResult::new(display_argv(op), ctx.workdir.clone()).failed(&ExecuteError::InputFailed(input.into()));
          result.failed += 1;
          emit(ctx.events.as_ref(), JobEvent::ProcessResult(report.clone()));
          result.reports.push(report);
          emit(ctx.events.as_ref(), JobEvent::TaskProgress(processed(&result)));
        } else if self.options.track_headers && is_fresh(op, &mut deps) {
          debug!(kind = %op.kind, out = ?op.outfile(), "up to date");
          result.skipped += 1;
          emit(ctx.events.as_ref(), JobEvent::TaskProgress(processed(&result)));
        } else {
          runnable.push(op.clone());
        }
      }
      if runnable.is_empty() {
        continue;
      }

      for (outputs, report) in execute_group(runnable, ctx.clone(), semaphore.clone()).await {
        if report.success {
          result.completed += 1;
        } else {
          result.failed += 1;
          broken.extend(outputs);
          if self.options.stop_on_error {
            ctx.abort.store(true, Ordering::SeqCst);
          }
        }
        emit(ctx.events.as_ref(), JobEvent::ProcessResult(report.clone()));
        result.reports.push(report);
        emit(ctx.events.as_ref(), JobEvent::TaskProgress(processed(&result)));
      }
    }

    result.success = result.failed == 0 && !self.cancel.is_cancelled();
    self.state = if self.cancel.is_cancelled() {
      JobState::Cancelled
    } else if result.failed > 0 {
      JobState::Failed
    } else {
      JobState::Finished
    };
    info!(
      completed = result.completed,
      failed = result.failed,
      skipped = result.skipped,
      state = ?self.state,
      "build finished"
    );
    emit(
      self.events.as_ref(),
      JobEvent::TaskFinished {
        success: result.success,
      },
    );
    result
  }
}

fn processed(result: &JobResult) -> usize {
  result.completed + result.failed + result.skipped
}

/// Consecutive runs of operations with the same group number.
fn groups(ops: &[Operation]) -> Vec<&[Operation]> {
  ops.chunk_by(|a, b| a.group == b.group).collect()
}

/// Whether `op` can be skipped because its output is up to date.
fn is_fresh(op: &Operation, deps: &mut DependencyTable) -> bool {
  let Some(out) = op.outfile() else {
    return false;
  };
  let out = Path::new(out);
  match op.kind {
    OpKind::Compile => {
      let Some(source) = op.infiles().next() else {
        return false;
      };
      let include_dirs: Vec<PathBuf> = op.values(ParamKind::IncludeDir).map(PathBuf::from).collect();
      !deps.is_stale(Path::new(source), &include_dirs, out)
    }
    kind if kind.is_link() => deps::is_up_to_date(op.infiles().map(Path::new), out),
    _ => false,
  }
}

/// Run the operations of one group concurrently.
///
/// Each report comes with the output files of its operation. Operations
/// that have not acquired a permit when the run is stopped are not
/// started and produce no report.
async fn execute_group(
  ops: Vec<Operation>,
  ctx: Arc<RunCtx>,
  semaphore: Arc<Semaphore>,
) -> Vec<(Vec<String>, ProcessResult)> {
  let mut join_set = JoinSet::new();
  let mut outputs = HashMap::new();

  for op in ops {
    let ctx = ctx.clone();
    let semaphore = semaphore.clone();
    let outs: Vec<String> = op.values(ParamKind::OutFile).map(str::to_string).collect();

    let handle = join_set.spawn(async move {
      let Ok(_permit) = semaphore.acquire().await else {
        return None;
      };
      if ctx.should_stop() {
        debug!(kind = %op.kind, "not started, build is stopping");
        return None;
      }
      Some(execute_op(&op, &ctx).await)
    });
    outputs.insert(handle.id(), outs);
  }

  let mut reports = Vec::new();
  while let Some(join_result) = join_set.join_next_with_id().await {
    match join_result {
      Ok((id, Some(report))) => reports.push((outputs.remove(&id).unwrap_or_default(), report)),
      Ok((_, None)) => {}
      Err(e) => {
        error!(error = %e, "build task panicked");
        let mut report = ProcessResult::new(Vec::new(), ctx.workdir.clone());
        report.stderr.push(format!("build task panicked: {}", e));
        reports.push((outputs.remove(&e.id()).unwrap_or_default(), report));
      }
    }
  }
  reports
}

async fn execute_op(op: &Operation, ctx: &RunCtx) -> ProcessResult {
  let message = op
    .outfile()
    .and_then(|o| Path::new(o).file_name())
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| op.command.clone());
  emit(
    ctx.events.as_ref(),
    JobEvent::CommandDescription {
      highlight: op.kind.as_str().to_string(),
      message,
    },
  );

  let argv = display_argv(op);
  match run_op(op, ctx).await {
    Ok(report) => {
      if !report.success {
        warn!(product = %op.product, cmd = %report.argv.join(" "), "operation failed");
      }
      report
    }
    Err(e) => {
      warn!(product = %op.product, kind = %op.kind, error = %e, "operation failed");
      ProcessResult::new(argv, ctx.workdir.clone()).failed(&e)
    }
  }
}

fn display_argv(op: &Operation) -> Vec<String> {
  op.toolchain.command_line(op).unwrap_or_else(|| {
    std::iter::once(op.command.clone())
      .chain(op.params.iter().map(|p| p.value.clone()))
      .collect()
  })
}

fn malformed(op: &Operation, message: &str) -> ExecuteError {
  ExecuteError::Malformed {
    kind: op.kind.to_string(),
    message: message.to_string(),
  }
}

async fn run_op(op: &Operation, ctx: &RunCtx) -> Result<ProcessResult, ExecuteError> {
  for out in op.values(ParamKind::OutFile) {
    if let Some(parent) = Path::new(out).parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
  }

  match op.kind {
    OpKind::Copy => {
      let from = op.infiles().next().ok_or_else(|| malformed(op, "no input file"))?;
      let to = op.outfile().ok_or_else(|| malformed(op, "no output file"))?;
      process::copy_file(Path::new(from), Path::new(to)).await?;
      let mut report = ProcessResult::new(
        vec![op.command.clone(), from.to_string(), to.to_string()],
        ctx.workdir.clone(),
      );
      report.success = true;
      Ok(report)
    }
    OpKind::RunLua => {
      let script = PathBuf::from(op.infiles().next().ok_or_else(|| malformed(op, "no script"))?);
      let args: Vec<String> = op.values(ParamKind::Arg).map(str::to_string).collect();
      let outputs: Vec<String> = op.values(ParamKind::OutFile).map(str::to_string).collect();
      let build_dir = outputs
        .first()
        .and_then(|o| Path::new(o).parent())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| ctx.workdir.clone());
      let mut report = ProcessResult::new(display_argv(op), ctx.workdir.clone());
      report.stdout = lua::run_script(script, args, outputs, build_dir).await?;
      report.success = true;
      Ok(report)
    }
    OpKind::EnteringProduct => Err(malformed(op, "product markers are not executable")),
    _ => {
      let argv = op
        .toolchain
        .command_line(op)
        .ok_or_else(|| malformed(op, "missing input or output file"))?;
      process::run_process(
        &argv,
        &ctx.workdir,
        &ctx.options.env,
        ctx.options.timeout,
        &ctx.cancel,
      )
      .await
    }
  }
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;
  use crate::builder::{Param, Toolchain};

  fn copy_op(group: u32, from: &Path, to: &Path) -> Operation {
    Operation {
      kind: OpKind::Copy,
      command: "copy".to_string(),
      toolchain: Toolchain::Gcc,
      os: "linux".to_string(),
      group,
      product: "files".to_string(),
      params: vec![
        Param::new(ParamKind::InFile, from.to_string_lossy()),
        Param::new(ParamKind::OutFile, to.to_string_lossy()),
      ],
    }
  }

  fn options(stop_on_error: bool) -> BuildOptions {
    BuildOptions {
      max_jobs: 2,
      stop_on_error,
      ..Default::default()
    }
  }

  /// Three single-op groups, the second copies a missing file.
  fn three_groups(dir: &Path) -> Vec<Operation> {
    let src = dir.join("src.txt");
    std::fs::write(&src, "x").unwrap();
    vec![
      copy_op(1, &src, &dir.join("out/1.txt")),
      copy_op(2, &dir.join("missing.txt"), &dir.join("out/2.txt")),
      copy_op(3, &src, &dir.join("out/3.txt")),
    ]
  }

  #[test]
  fn groups_split_on_group_number() {
    let dir = Path::new("/tmp");
    let ops = vec![copy_op(1, dir, dir), copy_op(2, dir, dir), copy_op(2, dir, dir), copy_op(3, dir, dir)];
    let sizes: Vec<usize> = groups(&ops).iter().map(|g| g.len()).collect();
    assert_eq!(sizes, vec![1, 2, 1]);
  }

  #[tokio::test]
  async fn stop_on_error_ends_the_run_at_the_failing_group() {
    let dir = TempDir::new().unwrap();
    let mut job = BuildJob::from_ops(three_groups(dir.path()), options(true), dir.path());
    let result = job.run().await;

    assert_eq!(result.completed, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.reports.len(), 2);
    assert!(!result.success);
    assert!(!dir.path().join("out/3.txt").exists());
    assert_eq!(job.state(), JobState::Failed);
  }

  #[tokio::test]
  async fn keep_going_runs_every_group() {
    let dir = TempDir::new().unwrap();
    let mut job = BuildJob::from_ops(three_groups(dir.path()), options(false), dir.path());
    let result = job.run().await;

    assert_eq!(result.reports.len(), 3);
    assert_eq!(result.completed, 2);
    assert!(!result.success);
    assert!(dir.path().join("out/3.txt").exists());
  }

  #[tokio::test]
  async fn events_bracket_the_run() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("a.txt");
    std::fs::write(&src, "a").unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut job =
      BuildJob::from_ops(vec![copy_op(1, &src, &dir.path().join("b.txt"))], options(true), dir.path()).with_events(tx);
    let result = job.run().await;
    assert!(result.success);
    drop(job);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
      events.push(event);
    }
    assert_eq!(
      events.first(),
      Some(&JobEvent::TaskStarted {
        description: "build".to_string(),
        total: 1
      })
    );
    assert!(events.contains(&JobEvent::TaskProgress(1)));
    assert_eq!(events.last(), Some(&JobEvent::TaskFinished { success: true }));
  }

  #[tokio::test]
  async fn cancelled_job_dispatches_nothing() {
    let dir = TempDir::new().unwrap();
    let mut job = BuildJob::from_ops(three_groups(dir.path()), options(false), dir.path());
    job.cancel();
    let result = job.run().await;
    assert!(result.reports.is_empty());
    assert!(!result.success);
    assert_eq!(job.state(), JobState::Cancelled);
  }

  #[tokio::test]
  async fn failed_job_does_not_run() {
    let dir = TempDir::new().unwrap();
    let mut job = BuildJob::from_ops(three_groups(dir.path()), options(false), dir.path());
    job.state = JobState::Failed;
    let result = job.run().await;
    assert!(result.reports.is_empty());
    assert!(!result.success);
  }

  #[tokio::test]
  async fn fresh_links_are_skipped_with_header_tracking() {
    let dir = TempDir::new().unwrap();
    let obj = dir.path().join("a.o");
    let lib = dir.path().join("liba.a");
    std::fs::write(&obj, "").unwrap();
    std::fs::write(&lib, "").unwrap();
    let future = std::time::SystemTime::now() + std::time::Duration::from_secs(60);
    std::fs::File::options()
      .write(true)
      .open(&lib)
      .unwrap()
      .set_modified(future)
      .unwrap();

    let link = Operation {
      kind: OpKind::LinkLib,
      command: "busy-no-such-archiver".to_string(),
      toolchain: Toolchain::Gcc,
      os: "linux".to_string(),
      group: 1,
      product: "a".to_string(),
      params: vec![
        Param::new(ParamKind::InFile, obj.to_string_lossy()),
        Param::new(ParamKind::OutFile, lib.to_string_lossy()),
      ],
    };
    let mut job = BuildJob::from_ops(
      vec![link],
      BuildOptions {
        track_headers: true,
        ..options(true)
      },
      dir.path(),
    );
    let result = job.run().await;
    assert_eq!(result.skipped, 1);
    assert!(result.reports.is_empty());
    assert!(result.success);
  }
}
