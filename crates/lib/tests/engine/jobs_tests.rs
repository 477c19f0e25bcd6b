//! Build and clean jobs driven through the engine.

use std::path::Path;
use std::time::{Duration, SystemTime};

use busy_lib::execute::JobState;
use busy_lib::{BuildJob, BuildOptions, CleanJob, JobEvent};

use super::common::{out_dir, params, parse, parse_with, project, write};

fn options() -> BuildOptions {
  BuildOptions {
    max_jobs: 2,
    ..BuildOptions::default()
  }
}

fn set_mtime(path: &Path, offset_secs: i64) {
  let now = SystemTime::now();
  let time = if offset_secs >= 0 {
    now + Duration::from_secs(offset_secs as u64)
  } else {
    now - Duration::from_secs(offset_secs.unsigned_abs())
  };
  std::fs::File::options()
    .write(true)
    .open(path)
    .unwrap()
    .set_modified(time)
    .unwrap();
}

fn targets(names: &[&str]) -> Vec<String> {
  names.iter().map(|n| n.to_string()).collect()
}

const GENERATOR: &str = r#"
let gen : LuaScript {
  .script = ./gen.lua
  .args += "42"
  .outputs += ./gen/answer.txt
}
let dist : Copy {
  .sources += ./readme.txt
  .deps += gen
}
"#;

const GEN_LUA: &str = r#"
local f = assert(io.open(busy.outputs[1], "w"))
f:write("answer=" .. busy.args[1])
f:close()
print("generated", #busy.outputs)
"#;

#[tokio::test]
async fn scripts_and_copies_run_in_dependency_order() {
  let dir = project(&[("BUSY", GENERATOR), ("gen.lua", GEN_LUA), ("readme.txt", "read me")]);
  let mut engine = parse(dir.path());
  let mut job = BuildJob::new(&mut engine, options(), &targets(&["dist"]));
  assert_eq!(job.state(), JobState::Idle);

  let result = job.run().await;
  assert!(result.success, "{:?}", result.reports);
  assert_eq!(result.completed, 2);
  assert_eq!(job.state(), JobState::Finished);

  let out = out_dir(dir.path());
  assert_eq!(std::fs::read_to_string(out.join("gen/answer.txt")).unwrap(), "answer=42");
  assert_eq!(std::fs::read_to_string(out.join("readme.txt")).unwrap(), "read me");
  assert!(
    result.reports.iter().any(|r| r.stdout == vec!["generated\t1".to_string()]),
    "{:?}",
    result.reports
  );
}

#[tokio::test]
async fn failed_compiles_keep_the_link_from_running() {
  let dir = project(&[("BUSY", "let app : Executable { .sources += [ ./a.c ./b.c ] }\n")]);
  let mut p = params(dir.path());
  p.target.toolchain_prefix = "busy-missing-".to_string();
  let mut engine = parse_with(p);
  let mut job = BuildJob::new(
    &mut engine,
    BuildOptions {
      stop_on_error: true,
      ..options()
    },
    &[],
  );
  let result = job.run().await;

  assert!(!result.success);
  assert_eq!(result.failed, 2);
  assert_eq!(result.reports.len(), 2);
  assert!(result.reports.iter().all(|r| r.argv.iter().any(|a| a == "-c")));
  assert!(result.reports[0].stderr[0].contains("busy-missing-gcc"));
  assert_eq!(job.state(), JobState::Failed);
}

#[tokio::test]
async fn keep_going_skips_consumers_of_failed_outputs() {
  let dir = project(&[
    ("BUSY", "let app : Executable { .sources += ./a.c }\nlet docs : Copy { .sources += ./readme.txt }\n"),
    ("readme.txt", "read me"),
  ]);
  let mut p = params(dir.path());
  p.target.toolchain_prefix = "busy-missing-".to_string();
  let mut engine = parse_with(p);
  let mut job = BuildJob::new(
    &mut engine,
    BuildOptions {
      stop_on_error: false,
      ..options()
    },
    &[],
  );
  let result = job.run().await;

  assert!(!result.success);
  assert_eq!(result.completed, 1);
  assert_eq!(result.failed, 2);
  assert_eq!(std::fs::read_to_string(out_dir(dir.path()).join("readme.txt")).unwrap(), "read me");

  let link = result
    .reports
    .iter()
    .find(|r| r.argv.first().is_some_and(|a| a.ends_with("g++")))
    .unwrap();
  assert!(!link.success);
  assert!(link.stderr[0].starts_with("not built, input failed"), "{:?}", link.stderr);
  assert!(link.stderr[0].ends_with("a.o"), "{:?}", link.stderr);
}

#[tokio::test]
async fn copies_of_artifacts_in_place_leave_them_intact() {
  let busy = r#"
let app : Executable { .sources += ./a.c }
let dist : Copy {
  .use_deps += `executable
  .deps += app
}
"#;
  let dir = project(&[("BUSY", busy), ("a.c", "int main() { return 0; }\n")]);
  let out = out_dir(dir.path());
  let object = out.join("app.objs/a.o");
  let exe = out.join("app");
  write(&object, "object");
  write(&exe, "binary");
  set_mtime(&dir.path().join("a.c"), -180);
  set_mtime(&object, -120);
  set_mtime(&exe, -60);

  let mut p = params(dir.path());
  p.target.toolchain_prefix = "busy-missing-".to_string();
  let mut engine = parse_with(p);
  let options = BuildOptions {
    track_headers: true,
    ..options()
  };
  let mut job = BuildJob::new(&mut engine, options, &targets(&["dist"]));
  let result = job.run().await;

  assert!(result.success, "{:?}", result.reports);
  assert_eq!(result.skipped, 2);
  assert!(result.reports.is_empty());
  assert_eq!(std::fs::read_to_string(&exe).unwrap(), "binary");
}

#[tokio::test]
async fn header_changes_reissue_compiles() {
  let dir = project(&[
    ("BUSY", "let objs : SourceSet { .sources += ./a.cpp }\n"),
    ("a.cpp", "#include \"a.h\"\nint main() { return 0; }\n"),
    ("a.h", "#pragma once\n"),
  ]);
  let object = out_dir(dir.path()).join("objs.objs/a.o");
  write(&object, "");
  set_mtime(&dir.path().join("a.cpp"), -120);
  set_mtime(&dir.path().join("a.h"), -120);
  set_mtime(&object, -60);

  let mut p = params(dir.path());
  p.target.toolchain_prefix = "busy-missing-".to_string();
  let options = BuildOptions {
    track_headers: true,
    ..options()
  };

  let mut engine = parse_with(p.clone());
  let result = BuildJob::new(&mut engine, options.clone(), &[]).run().await;
  assert_eq!(result.skipped, 1);
  assert!(result.reports.is_empty());
  assert!(result.success);

  set_mtime(&dir.path().join("a.h"), 0);
  let mut engine = parse_with(p);
  let result = BuildJob::new(&mut engine, options, &[]).run().await;
  assert_eq!(result.skipped, 0);
  assert_eq!(result.reports.len(), 1);
}

#[tokio::test]
async fn unknown_targets_fail_the_job_up_front() {
  let dir = project(&[("BUSY", "let app : Executable { .sources += ./a.c }\n")]);
  let mut engine = parse(dir.path());
  let mut job = BuildJob::new(&mut engine, options(), &targets(&["nope"]));
  assert_eq!(job.state(), JobState::Failed);
  assert!(job.ops().is_empty());
  assert!(job.errors().iter().any(|e| e.msg == "unknown target 'nope'"));

  let result = job.run().await;
  assert!(!result.success);
  assert!(result.reports.is_empty());
}

#[tokio::test]
async fn build_jobs_create_the_module_build_tree() {
  let dir = project(&[
    ("BUSY", "submod net\n"),
    ("net/BUSY", "submod http\n"),
    ("net/http/BUSY", ""),
  ]);
  let mut engine = parse(dir.path());
  let job = BuildJob::new(&mut engine, options(), &[]);
  assert_eq!(job.state(), JobState::Idle);
  assert!(out_dir(dir.path()).join("net/http").is_dir());
}

#[test]
fn clean_removes_outputs_of_default_products() {
  let dir = project(&[("BUSY", "let app : Executable { .sources += ./main.c }\n")]);
  let out = out_dir(dir.path());
  let object = out.join("app.objs/main.o");
  let exe = out.join("app");
  write(&object, "");
  write(&exe, "");

  let mut engine = parse(dir.path());
  let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
  let job = CleanJob::new(&mut engine, &[]).with_events(tx);
  assert_eq!(
    job.files(),
    &[object.to_string_lossy().into_owned(), exe.to_string_lossy().into_owned()]
  );
  assert_eq!(job.run(), 2);
  assert!(!object.exists());
  assert!(!exe.exists());
  assert_eq!(job.run(), 0);
  drop(job);

  let mut events = Vec::new();
  while let Ok(event) = rx.try_recv() {
    events.push(event);
  }
  assert_eq!(
    events[..4],
    [
      JobEvent::TaskStarted {
        description: "clean".to_string(),
        total: 2
      },
      JobEvent::TaskProgress(1),
      JobEvent::TaskProgress(2),
      JobEvent::TaskFinished { success: true },
    ]
  );
}
