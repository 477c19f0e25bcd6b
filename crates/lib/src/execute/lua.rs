//! In-process execution of `LuaScript` products.
//!
//! Scripts see a global `busy` table with `args`, `outputs`, `build_dir`
//! and `source_dir`, and the usual `arg` sequence. `print` output is
//! captured instead of written to the terminal.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;
use tracing::{debug, warn};

use super::types::ExecuteError;

/// Run `script` on a blocking thread and return the printed lines.
pub async fn run_script(
  script: PathBuf,
  args: Vec<String>,
  outputs: Vec<String>,
  build_dir: PathBuf,
) -> Result<Vec<String>, ExecuteError> {
  let name = script.clone();
  let lines = tokio::task::spawn_blocking(move || run_blocking(&script, &args, &outputs, &build_dir).map_err(|e| e.to_string()))
    .await
    .map_err(|e| ExecuteError::Lua {
      script: name.clone(),
      message: format!("script task panicked: {}", e),
    })?
    .map_err(|e| ExecuteError::Lua {
      script: name.clone(),
      message: e.to_string(),
    })?;
  Ok(lines)
}

fn run_blocking(script: &Path, args: &[String], outputs: &[String], build_dir: &Path) -> LuaResult<Vec<String>> {
  let content = std::fs::read_to_string(script)
    .map_err(|e| LuaError::external(format!("cannot read '{}': {}", script.display(), e)))?;

  let lua = Lua::new();
  let printed = Rc::new(RefCell::new(Vec::new()));
  register_globals(&lua, script, args, outputs, build_dir, printed.clone())?;

  debug!(script = %script.display(), "running lua script");
  lua.load(&content).set_name(format!("@{}", script.display())).exec()?;

  for output in outputs {
    if !Path::new(output).exists() {
      warn!(script = %script.display(), output = %output, "script did not produce declared output");
    }
  }
  let lines = printed.borrow().clone();
  Ok(lines)
}

fn register_globals(
  lua: &Lua,
  script: &Path,
  args: &[String],
  outputs: &[String],
  build_dir: &Path,
  printed: Rc<RefCell<Vec<String>>>,
) -> LuaResult<()> {
  let globals = lua.globals();

  let print = lua.create_function(move |lua, values: LuaMultiValue| {
    let tostring: LuaFunction = lua.globals().get("tostring")?;
    let mut parts = Vec::new();
    for value in values {
      parts.push(tostring.call::<String>(value)?);
    }
    printed.borrow_mut().push(parts.join("\t"));
    Ok(())
  })?;
  globals.set("print", print)?;

  let busy = lua.create_table()?;
  busy.set("args", lua.create_sequence_from(args.iter().cloned())?)?;
  busy.set("outputs", lua.create_sequence_from(outputs.iter().cloned())?)?;
  busy.set("build_dir", build_dir.to_string_lossy().to_string())?;
  busy.set(
    "source_dir",
    script.parent().unwrap_or(Path::new("")).to_string_lossy().to_string(),
  )?;
  globals.set("busy", busy)?;

  let arg = lua.create_sequence_from(args.iter().cloned())?;
  arg.set(0, script.to_string_lossy().to_string())?;
  globals.set("arg", arg)?;
  Ok(())
}
