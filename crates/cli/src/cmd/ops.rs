use std::path::Path;

use anyhow::Result;

use busy_lib::builder::{OpKind, Operation};

use super::{SetupArgs, load_project};
use crate::output::{OutputFormat, print_error_items, print_json};

/// Dump the operation list of the selected products.
pub fn cmd_ops(dir: &Path, setup: &SetupArgs, output: OutputFormat) -> Result<bool> {
  let Some(mut project) = load_project(dir, setup)? else {
    return Ok(false);
  };
  let Some(ops) = project.operations() else {
    print_error_items(&project.errors());
    return Ok(false);
  };

  if output.is_json() {
    print_json(&ops)?;
  } else {
    for op in &ops {
      print!("{}", render(op));
    }
  }
  Ok(true)
}

/// One line per operation, its parameters indented below it.
fn render(op: &Operation) -> String {
  if op.kind == OpKind::EnteringProduct {
    return format!("[{}] {} {}\n", op.group, op.kind, op.command);
  }
  let mut text = format!("[{}] {} {} ({})\n", op.group, op.kind, op.command, op.product);
  for param in &op.params {
    text.push_str(&format!("    {} {}\n", param.kind.as_str(), param.value));
  }
  text
}
