//! Build command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

const DIST: &str = r#"
let gen : LuaScript {
  .script = ./gen.lua
  .args += "hello"
  .outputs += ./greeting.txt
}
let dist : Copy {
  .sources += ./readme.txt
  .outputs += ./doc/README
  .deps += gen
}
"#;

const GEN_LUA: &str = r#"
local f = assert(io.open(busy.outputs[1], "w"))
f:write(busy.args[1])
f:close()
"#;

fn dist_env() -> TestEnv {
  let env = TestEnv::with_busy(DIST);
  env.write_file("gen.lua", GEN_LUA);
  env.write_file("readme.txt", "docs");
  env
}

#[test]
fn build_runs_scripts_and_copies() {
  let env = dist_env();

  env
    .busy_cmd()
    .args(["build", "-t", "dist"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Build finished"))
    .stdout(predicate::str::contains("LUA"))
    .stdout(predicate::str::contains("COPY"));

  let out = env.output();
  assert_eq!(std::fs::read_to_string(out.join("greeting.txt")).unwrap(), "hello");
  assert_eq!(std::fs::read_to_string(out.join("doc/README")).unwrap(), "docs");
}

#[test]
fn build_dir_can_come_from_the_environment() {
  let env = dist_env();
  let custom = env.dir().join("custom");

  env
    .busy_cmd()
    .env("BUSY_BUILD_DIR", &custom)
    .args(["build", "-t", "dist", "-j", "1"])
    .assert()
    .success();

  assert!(custom.join("doc/README").is_file());
  assert!(!env.output().join("doc/README").exists());
}

#[test]
fn failing_script_fails_the_build() {
  let env = TestEnv::with_busy("let gen : LuaScript { .script = ./gen.lua }\n");
  env.write_file("gen.lua", "error(\"broken generator\")\n");

  env
    .busy_cmd()
    .args(["build", "-t", "gen"])
    .assert()
    .failure()
    .stdout(predicate::str::contains("Build failed"))
    .stderr(predicate::str::contains("broken generator"));
}

#[test]
fn evaluation_errors_are_printed_with_their_location() {
  let env = TestEnv::with_busy("let a = 1\nlet b = missing\n");

  env
    .busy_cmd()
    .arg("build")
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("BUSY:2:9 unknown identifier 'missing'"));
}

#[test]
fn unknown_targets_are_rejected() {
  let env = dist_env();

  env
    .busy_cmd()
    .args(["build", "-t", "nope"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("unknown target 'nope'"));
}

#[test]
fn parameters_reach_the_build_description() {
  let env = TestEnv::with_busy("param fail = false\nif fail then error(\"fail requested\") end\n");

  env.busy_cmd().arg("build").assert().success();
  env
    .busy_cmd()
    .args(["build", "-P", "fail"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("fail requested"));
}
