//! Selection of the active products.

use busy_lib::Engine;
use busy_lib::builder::OpKind;

use super::common::{active_names, params, parse, parse_with, project, visit};

const THREE_PRODUCTS: &str = r#"
let p2 : Library { .sources += ./p2.c }
let p1 : Executable {
  .sources += ./p1.c
  .deps += p2
}
let p3 : Executable { .sources += ./p3.c }
let docs : Copy { .sources += ./readme.txt }
"#;

#[test]
fn target_marks_itself_and_its_dependencies() {
  let dir = project(&[("BUSY", THREE_PRODUCTS)]);
  let mut p = params(dir.path());
  p.targets = vec!["p1".to_string()];
  let engine = parse_with(p);
  assert_eq!(active_names(&engine), vec!["p2", "p1"]);
}

#[test]
fn no_targets_selects_every_product_with_sources() {
  let dir = project(&[("BUSY", THREE_PRODUCTS)]);
  let engine = parse(dir.path());
  assert_eq!(active_names(&engine), vec!["p2", "p1", "p3"]);
}

#[test]
fn unknown_target_fails_the_parse() {
  let dir = project(&[("BUSY", THREE_PRODUCTS)]);
  let mut p = params(dir.path());
  p.targets = vec!["nope".to_string()];
  let mut engine = Engine::new();
  assert!(!engine.parse(p, true));
  let errors = engine.errors();
  assert_eq!(errors.len(), 1);
  assert_eq!(errors[0].msg, "unknown target 'nope'");
}

#[test]
fn targets_are_only_checked_on_request() {
  let dir = project(&[("BUSY", THREE_PRODUCTS)]);
  let mut p = params(dir.path());
  p.targets = vec!["nope".to_string()];
  let mut engine = Engine::new();
  assert!(engine.parse(p, false));
  assert!(active_names(&engine).is_empty());
}

#[test]
fn visit_recomputes_the_active_set() {
  let dir = project(&[("BUSY", THREE_PRODUCTS)]);
  let mut p = params(dir.path());
  p.targets = vec!["p3".to_string()];
  let mut engine = parse_with(p);
  assert_eq!(active_names(&engine), vec!["p3"]);

  let ops = visit(&mut engine, &["p1"]);
  assert_eq!(active_names(&engine), vec!["p2", "p1"]);
  let entered: Vec<&str> = ops
    .iter()
    .filter(|o| o.kind == OpKind::EnteringProduct)
    .map(|o| o.command.as_str())
    .collect();
  assert_eq!(entered, vec!["p2", "p1"]);
}

#[test]
fn qualified_targets_reach_into_submodules() {
  let dir = project(&[
    ("BUSY", "submod sub\nlet app : Executable { .sources += ./a.c }\n"),
    ("sub/BUSY", "let tool* : Executable { .sources += ./t.c }\n"),
  ]);
  let mut p = params(dir.path());
  p.targets = vec!["sub.tool".to_string()];
  let engine = parse_with(p);
  assert!(active_names(&engine).is_empty());
  let sub = engine.find_module("sub");
  let tool = engine.all_products(sub, busy_lib::ProductFilter::AllProducts, true);
  assert_eq!(tool.len(), 1);
  assert_eq!(engine.get_decl_path(tool[0]), "sub.tool");
}

#[test]
fn imported_modules_are_not_default_roots() {
  let dir = project(&[
    ("BUSY", "import ext = ./third_party\nlet app : Executable { .sources += ./a.c }\n"),
    ("third_party/BUSY", "let lib* : Library { .sources += ./l.c }\n"),
  ]);
  let engine = parse(dir.path());
  assert_eq!(active_names(&engine), vec!["app"]);
  let ext = engine.find_module("ext");
  assert!(engine.all_products(ext, busy_lib::ProductFilter::AllProducts, true).is_empty());
  assert_eq!(engine.all_products(ext, busy_lib::ProductFilter::WithSources, false).len(), 1);
}
