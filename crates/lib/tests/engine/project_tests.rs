//! The host level project API.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use busy_lib::{ErrorInfo, LogLevel, LogSink, Project, ProductFilter, SetupParams};

use super::common::{project, write};

const TREE: &str = r#"
submod tools
let core : Library {
  .sources += [ ./core.cpp ./extra.c ]
}
let app : Executable {
  .name = "hello"
  .sources += ./main.cpp
  .deps += [ core tools.gen ]
}
"#;

const TOOLS: &str = r#"
let gen* : Executable {
  .sources += ./gen.c
}
let data* : Copy {
  .sources += ./data.txt
}
"#;

fn setup() -> SetupParams {
  SetupParams {
    toolchain: "gcc".to_string(),
    os: "linux".to_string(),
    ..SetupParams::default()
  }
}

fn parsed(files: &[(&str, &str)]) -> (tempfile::TempDir, Project) {
  let dir = project(files);
  let mut project = Project::new(dir.path()).unwrap();
  assert!(project.parse(&setup(), None), "{:?}", project.errors());
  (dir, project)
}

#[test]
fn products_are_listed_submodules_first() {
  let (_dir, project) = parsed(&[("BUSY", TREE), ("tools/BUSY", TOOLS)]);
  let names: Vec<String> = project
    .all_products(ProductFilter::AllProducts, false)
    .iter()
    .map(|p| p.qualident())
    .collect();
  assert_eq!(names, vec!["tools.gen", "tools.data", "core", "app"]);

  let builds: Vec<String> = project
    .all_products(ProductFilter::WithSources, true)
    .iter()
    .map(|p| p.name())
    .collect();
  assert_eq!(builds, vec!["gen", "core", "hello"]);
}

#[test]
fn modules_expose_files_and_build_directories() {
  let (_dir, project) = parsed(&[("BUSY", TREE), ("tools/BUSY", TOOLS)]);
  let root = project.dir().to_path_buf();
  let top = project.top_module().unwrap();
  let subs = top.sub_modules();
  assert_eq!(subs.len(), 1);
  assert_eq!(subs[0].name(), "tools");
  assert_eq!(subs[0].build_directory(), root.join("output/tools"));
  assert_eq!(subs[0].products(true).len(), 1);
  assert_eq!(subs[0].products(false).len(), 2);

  let files: Vec<PathBuf> = project.build_system_files().into_iter().collect();
  assert_eq!(files, vec![root.join("BUSY"), root.join("tools/BUSY")]);
}

#[test]
fn sources_can_include_companion_headers() {
  let (_dir, project) = parsed(&[
    ("BUSY", TREE),
    ("tools/BUSY", TOOLS),
    ("core.h", ""),
    ("core_p.h", ""),
    ("main.hpp", ""),
  ]);
  let root = project.dir().to_path_buf();
  let plain: Vec<PathBuf> = project.all_sources(true, false).into_iter().collect();
  assert_eq!(
    plain,
    vec![root.join("core.cpp"), root.join("extra.c"), root.join("main.cpp"), root.join("tools/gen.c")]
  );
  let with_headers = project.all_sources(true, true);
  for header in ["core.h", "core_p.h", "main.hpp"] {
    assert!(with_headers.contains(&root.join(header)), "missing {}", header);
  }
  assert_eq!(with_headers.len(), 7);
}

#[test]
fn products_report_build_settings() {
  let (_dir, project) = parsed(&[("BUSY", TREE), ("tools/BUSY", TOOLS)]);
  let root = project.dir().to_path_buf();
  let products = project.all_products(ProductFilter::Executable, false);
  let app = products.iter().find(|p| p.qualident() == "app").unwrap();
  assert!(app.is_runnable());
  assert!(app.is_compiled());
  assert!(app.is_enabled());
  assert_eq!(app.executable(false), None);
  assert_eq!(app.executable(true), Some(root.join("output/hello")));
  assert_eq!(app.all_file_paths(false, false), vec![root.join("main.cpp")]);
  assert!(app.build_config().defines.is_empty());
}

#[test]
fn unsupported_setup_is_rejected_before_parsing() {
  let dir = project(&[("BUSY", "")]);
  let mut project = Project::new(dir.path()).unwrap();
  let bad = SetupParams {
    toolchain: "icc".to_string(),
    ..setup()
  };
  assert!(!project.parse(&bad, None));
  let errors = project.errors();
  assert_eq!(errors.errors.len(), 1);
  assert_eq!(errors.errors[0].msg, "toolchain not supported: icc");
  assert!(project.top_module().is_none());
}

#[derive(Default)]
struct Recorded {
  warnings: Vec<String>,
  messages: Vec<(LogLevel, String, String)>,
}

struct RecordingSink(Rc<RefCell<Recorded>>);

impl LogSink for RecordingSink {
  fn print_warning(&mut self, warning: &ErrorInfo) {
    let mut recorded = self.0.borrow_mut();
    recorded.warnings.extend(warning.errors.iter().map(|e| e.msg.clone()));
  }

  fn print_message(&mut self, level: LogLevel, msg: &str, tag: &str) {
    self.0.borrow_mut().messages.push((level, msg.to_string(), tag.to_string()));
  }
}

#[test]
fn log_sink_receives_warnings_and_messages() {
  let dir = project(&[("BUSY", "message(\"hello\")\nwarning(\"careful\")\n")]);
  let recorded = Rc::new(RefCell::new(Recorded::default()));
  let mut project = Project::new(dir.path()).unwrap();
  assert!(project.parse(&setup(), Some(Box::new(RecordingSink(recorded.clone())))));

  let recorded = recorded.borrow();
  assert_eq!(recorded.warnings, vec!["careful"]);
  assert_eq!(recorded.messages.len(), 1);
  let (level, msg, tag) = &recorded.messages[0];
  assert_eq!(*level, LogLevel::Message);
  assert!(msg.ends_with("hello"), "{msg}");
  assert_eq!(tag, "");
}

#[test]
fn added_files_show_up_after_reparsing() {
  let (_dir, mut project) = parsed(&[("BUSY", TREE), ("tools/BUSY", TOOLS)]);
  let root = project.dir().to_path_buf();
  let new_files = [root.join("net/socket.cpp"), root.join("net/dns.cpp")];
  {
    let products = project.all_products(ProductFilter::Compiled, false);
    let core = products.iter().find(|p| p.qualident() == "core").unwrap();
    let result = project.add_files(core, &new_files);
    assert!(result.is_empty(), "{:?}", result);
  }

  let text = std::fs::read_to_string(root.join("BUSY")).unwrap();
  assert!(text.contains("./net/socket.cpp"), "{text}");
  assert!(project.parse(&setup(), None), "{:?}", project.errors());
  let products = project.all_products(ProductFilter::Compiled, false);
  let core = products.iter().find(|p| p.qualident() == "core").unwrap();
  assert_eq!(
    core.all_file_paths(false, false),
    vec![
      root.join("core.cpp"),
      root.join("extra.c"),
      root.join("net/socket.cpp"),
      root.join("net/dns.cpp"),
    ]
  );
}

#[test]
fn a_single_added_file_keeps_the_closing_brace_in_place() {
  let (_dir, mut project) = parsed(&[("BUSY", "let lib : Library {\n  .sources += ./a.c\n}\n")]);
  let root = project.dir().to_path_buf();
  {
    let products = project.all_products(ProductFilter::AllProducts, false);
    assert!(project.add_files(&products[0], &[root.join("b.c")]).is_empty());
  }
  let text = std::fs::read_to_string(root.join("BUSY")).unwrap();
  assert_eq!(text, "let lib : Library {\n  .sources += ./a.c\n  .sources += ./b.c\n}\n");
  assert!(project.parse(&setup(), None));
}

#[test]
fn added_files_with_quotes_in_their_names_parse_again() {
  let (_dir, mut project) = parsed(&[("BUSY", "let lib : Library {\n  .sources += ./a.c\n}\n")]);
  let root = project.dir().to_path_buf();
  let quoted = root.join("it's here.c");
  {
    let products = project.all_products(ProductFilter::AllProducts, false);
    assert!(project.add_files(&products[0], std::slice::from_ref(&quoted)).is_empty());
  }
  let text = std::fs::read_to_string(root.join("BUSY")).unwrap();
  assert!(text.contains(r"'./it\'s here.c'"), "{text}");

  assert!(project.parse(&setup(), None), "{:?}", project.errors());
  let products = project.all_products(ProductFilter::AllProducts, false);
  assert_eq!(products[0].all_file_paths(false, false), vec![root.join("a.c"), quoted]);
}

#[test]
fn clean_keeps_to_the_configured_targets() {
  let dir = project(&[(
    "BUSY",
    "let a : Executable { .sources += ./a.c }\nlet b : Executable { .sources += ./b.c }\n",
  )]);
  let mut project = Project::new(dir.path()).unwrap();
  let setup = SetupParams {
    targets: vec!["a".to_string()],
    ..setup()
  };
  assert!(project.parse(&setup, None), "{:?}", project.errors());
  let out = project.dir().join("output");
  let (exe_a, exe_b) = (out.join("a"), out.join("b"));
  write(&exe_a, "");
  write(&exe_b, "");

  let job = project.clean();
  assert!(job.errors().is_empty(), "{:?}", job.errors());
  assert_eq!(job.run(), 1);
  assert!(!exe_a.exists());
  assert!(exe_b.exists());

  let products = project.all_products(ProductFilter::AllProducts, false);
  let enabled: Vec<(String, bool)> = products.iter().map(|p| (p.qualident(), p.is_enabled())).collect();
  assert_eq!(enabled, vec![("a".to_string(), true), ("b".to_string(), false)]);
}

#[test]
fn project_accepts_the_busy_file_itself() {
  let dir = project(&[("BUSY.busy", "let x = 1\n")]);
  write(&dir.path().join("other.txt"), "");
  let project = Project::new(dir.path().join("BUSY.busy")).unwrap();
  assert_eq!(project.dir(), dunce::canonicalize(dir.path()).unwrap());
  assert!(Project::new(dir.path().join("other.txt")).is_err());
}
