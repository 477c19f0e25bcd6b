//! Operation dump integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

const LIB_AND_APP: &str = r#"
let lib : Library { .sources += ./lib.c }
let app : Executable {
  .sources += ./main.c
  .deps += lib
}
"#;

#[test]
fn ops_lists_compiles_and_links() {
  let env = TestEnv::with_busy(LIB_AND_APP);

  env
    .busy_cmd()
    .args(["ops", "--toolchain", "gcc", "-t", "app"])
    .assert()
    .success()
    .stdout(predicate::str::contains("COMPILE gcc (lib)"))
    .stdout(predicate::str::contains("LINK ar (lib)"))
    .stdout(predicate::str::contains("app.objs/main.o"))
    .stdout(predicate::str::contains("    INFILE"));
}

#[test]
fn ops_json_carries_groups_in_order() {
  let env = TestEnv::with_busy(LIB_AND_APP);

  let output = env
    .busy_cmd()
    .args(["ops", "--toolchain", "gcc", "--format", "json"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let ops: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let ops = ops.as_array().unwrap();
  let kinds: Vec<&str> = ops.iter().map(|o| o["kind"].as_str().unwrap()).collect();
  assert_eq!(
    kinds,
    vec!["EnteringProduct", "Compile", "LinkLib", "EnteringProduct", "Compile", "LinkExe"]
  );
  let groups: Vec<u64> = ops.iter().map(|o| o["group"].as_u64().unwrap()).collect();
  assert!(groups.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn debug_mode_adds_debug_flags() {
  let env = TestEnv::with_busy("let app : Executable { .sources += ./main.c }\n");

  env
    .busy_cmd()
    .args(["ops", "--toolchain", "gcc", "--mode", "debug"])
    .assert()
    .success()
    .stdout(predicate::str::contains("CFLAG -g"));
  env
    .busy_cmd()
    .args(["ops", "--toolchain", "gcc", "--mode", "optimized"])
    .assert()
    .success()
    .stdout(predicate::str::contains("CFLAG -g").not());
}
