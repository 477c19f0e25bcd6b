//! Ref handles: lookup, stale refs and the empty results of bad refs.

use std::path::{Path, PathBuf};

use busy_lib::engine::{Field, FieldError};
use busy_lib::{Engine, ProductFilter, Ref};

use super::common::{params, parse, project};

const APP: &str = r#"
let base* : Config {
  .defines += "BASE"
  .include_dirs += ./inc
}
let app* : Executable {
  .name = "hello"
  .configs += base
  .sources += [ ./main.cpp ./util.c ]
  .cflags_c += "-std=c99"
  .cflags_cc += "-std=c++17"
}
"#;

fn app(engine: &Engine) -> Ref {
  engine.all_products(engine.root_module(), ProductFilter::Executable, false)[0]
}

#[test]
fn accessors_on_invalid_refs_are_empty() {
  let dir = project(&[("BUSY", APP)]);
  let engine = parse(dir.path());

  for r in [Ref::INVALID, Ref::default()] {
    assert_eq!(engine.get_string(r, "#name"), "");
    assert_eq!(engine.get_integer(r, "#row"), 0);
    assert_eq!(engine.get_path(r, "#dir"), PathBuf::new());
    assert_eq!(engine.get_object(r, "configs"), Ref::INVALID);
    assert_eq!(engine.get_owner(r), Ref::INVALID);
    assert_eq!(engine.get_owning_module(r), Ref::INVALID);
    assert_eq!(engine.get_decl_path(r), "");
    assert!(engine.get_location(r).is_none());
    assert!(engine.sub_modules(r).is_empty());
    assert!(engine.all_products(r, ProductFilter::AllProducts, false).is_empty());
    assert!(engine.all_sources(r, true).is_empty());
    assert!(engine.defines(r).is_empty());
    assert!(!engine.is_product(r));
    assert!(!engine.is_active(r));
    assert!(!engine.is_class(r));
    assert_eq!(engine.field(r, &Field::Sources), Err(FieldError::InvalidRef));
  }
  assert!(engine.errors().is_empty());
}

#[test]
fn refs_from_an_earlier_parse_are_stale() {
  let dir = project(&[("BUSY", APP)]);
  let mut engine = parse(dir.path());
  let old = app(&engine);
  assert!(engine.is_product(old));

  assert!(engine.parse(params(dir.path()), true));
  assert!(!engine.is_product(old));
  assert_eq!(engine.get_decl_path(old), "");
  let new = app(&engine);
  assert_ne!(old, new);
  assert_eq!(engine.get_decl_path(new), "app");
}

#[test]
fn engine_without_session_answers_empty() {
  let engine = Engine::new();
  assert_eq!(engine.root_module(), Ref::INVALID);
  assert_eq!(engine.get_globals(), Ref::INVALID);
  assert_eq!(engine.field(Ref::INVALID, &Field::Name), Err(FieldError::NoSession));
  assert!(engine.errors().is_empty());
}

#[test]
fn reparsing_yields_the_same_model() {
  let root = format!("submod sub\n{}", APP);
  let dir = project(&[("BUSY", &root), ("sub/BUSY", "let x* : Library { .sources += ./x.c }\n")]);
  let snapshot = |engine: &Engine| {
    let root = engine.root_module();
    let products: Vec<(String, bool, Vec<PathBuf>)> = engine
      .all_products(root, ProductFilter::AllProducts, false)
      .into_iter()
      .map(|r| (engine.get_decl_path(r), engine.is_active(r), engine.all_sources(r, false)))
      .collect();
    (engine.all_decls(root).len(), products)
  };
  let mut engine = parse(dir.path());
  let first = snapshot(&engine);
  assert!(engine.parse(params(dir.path()), true));
  assert_eq!(snapshot(&engine), first);
}

#[test]
fn product_queries_follow_configs() {
  let dir = project(&[("BUSY", APP)]);
  let engine = parse(dir.path());
  let app = app(&engine);

  assert_eq!(engine.get_string(app, "name"), "hello");
  assert_eq!(engine.get_string(app, "#name"), "app");
  assert!(engine.is_executable(app));
  assert!(engine.is_compiled(app));
  assert_eq!(engine.defines(app), vec!["BASE"]);
  assert_eq!(engine.include_paths(app), vec![dir.path().join("inc")]);
  assert_eq!(engine.c_flags(app), vec!["-std=c99"]);
  assert_eq!(engine.cpp_flags(app), vec!["-std=c++17"]);
  assert_eq!(
    engine.all_sources(app, false),
    vec![dir.path().join("main.cpp"), dir.path().join("util.c")]
  );
}

#[test]
fn declarations_know_their_place() {
  let dir = project(&[("BUSY", APP)]);
  let engine = parse(dir.path());
  let app = app(&engine);
  let busy = dir.path().join("BUSY");

  let loc = engine.get_location(app).unwrap();
  assert_eq!((loc.file.as_path(), loc.row, loc.col), (busy.as_path(), 6, 5));
  let end = engine.get_end_location(app).unwrap();
  assert_eq!((end.row, end.col), (12, 1));
  assert_eq!(engine.get_owning_module(app), engine.root_module());
  assert_eq!(engine.get_path(engine.root_module(), "#file"), busy);
  assert_eq!(engine.get_path(app, "#dir"), dir.path());
}

#[test]
fn cross_references_map_positions_to_declarations() {
  let dir = project(&[("BUSY", APP)]);
  let engine = parse(dir.path());
  let busy = dir.path().join("BUSY");
  let base = engine.find_decl_by_pos(&busy, 8, 16);
  assert_eq!(engine.get_decl_path(base), "base");

  let uses = engine.find_all_locs_of(base);
  let rows: Vec<u32> = uses.iter().map(|l| l.row).collect();
  assert_eq!(rows, vec![2, 8]);

  assert_eq!(
    engine.find_path_by_pos(&busy, 9, 18).as_deref(),
    Some(dir.path().join("main.cpp").as_path())
  );
  assert!(engine.find_decl_by_pos(Path::new("/nowhere/BUSY"), 1, 1) == Ref::INVALID);
}

#[test]
fn globals_expose_parse_parameters() {
  let dir = project(&[("BUSY", "")]);
  let engine = parse(dir.path());
  let globals = engine.get_globals();
  assert_eq!(engine.get_string(globals, "target_os"), "linux");
  assert_eq!(engine.get_string(globals, "target_toolchain"), "gcc");
  assert_eq!(engine.get_path(globals, "root_build_dir"), dir.path().join("output"));
}
