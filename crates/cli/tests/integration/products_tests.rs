//! Products command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

const TREE: &str = r#"
submod tools
let core : Library { .sources += ./core.c }
let app : Executable {
  .name = "hello"
  .sources += ./main.c
  .deps += core
}
"#;

fn tree_env() -> TestEnv {
  let env = TestEnv::with_busy(TREE);
  env.write_file("tools/BUSY", "let gen* : Executable { .sources += ./gen.c }\n");
  env
}

#[test]
fn products_are_listed_submodules_first() {
  let env = tree_env();

  let output = env
    .busy_cmd()
    .args(["products", "--toolchain", "gcc", "--format", "json"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let products: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let names: Vec<&str> = products
    .as_array()
    .unwrap()
    .iter()
    .map(|p| p["qualident"].as_str().unwrap())
    .collect();
  assert_eq!(names, vec!["tools.gen", "core", "app"]);
  assert_eq!(products[2]["name"], "hello");
  assert_eq!(products[2]["runnable"], true);
}

#[test]
fn active_filter_follows_targets() {
  let env = tree_env();

  env
    .busy_cmd()
    .args(["products", "--active", "-t", "core"])
    .assert()
    .success()
    .stdout(predicate::str::contains("• core [active]"))
    .stdout(predicate::str::contains("• app").not());
}

#[test]
fn unsupported_toolchain_is_an_error() {
  let env = tree_env();

  env
    .busy_cmd()
    .args(["products", "--toolchain", "icc"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("toolchain not supported: icc"));
}

#[test]
fn missing_project_is_reported() {
  let env = tree_env();

  env
    .busy_cmd()
    .args(["products", "nowhere"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("cannot open project"));
}
