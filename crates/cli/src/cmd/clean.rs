use std::path::Path;

use anyhow::Result;

use busy_lib::ErrorInfo;

use super::{SetupArgs, load_project};
use crate::output::{print_error_items, print_stat, print_success};

pub fn cmd_clean(dir: &Path, setup: &SetupArgs) -> Result<bool> {
  let Some(mut project) = load_project(dir, setup)? else {
    return Ok(false);
  };

  let job = project.clean();
  if !job.errors().is_empty() {
    print_error_items(&ErrorInfo {
      errors: job.errors().to_vec(),
    });
    return Ok(false);
  }

  let removed = job.run();
  print_success("Clean complete");
  print_stat("Files removed", &removed.to_string());
  print_stat("Outputs", &job.files().len().to_string());
  Ok(true)
}
