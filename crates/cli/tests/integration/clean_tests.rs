//! Clean command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn clean_removes_default_product_outputs() {
  let env = TestEnv::with_busy("let app : Executable { .sources += ./main.c }\n");
  env.write_file("main.c", "int main() { return 0; }\n");
  env.write_file("output/app.objs/main.o", "");
  env.write_file("output/app", "");
  env.write_file("output/keep.txt", "");

  env
    .busy_cmd()
    .args(["clean", "--toolchain", "gcc"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Files removed: 2"));

  let out = env.output();
  assert!(!out.join("app.objs/main.o").exists());
  assert!(!out.join("app").exists());
  assert!(out.join("keep.txt").exists());
}

#[test]
fn clean_without_outputs_succeeds() {
  let env = TestEnv::with_busy("let app : Executable { .sources += ./main.c }\n");

  env
    .busy_cmd()
    .args(["clean", "--toolchain", "gcc"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Files removed: 0"));
}
