//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Isolated project directory.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// A project whose root `BUSY` file holds `busy`.
  pub fn with_busy(busy: &str) -> Self {
    let env = Self {
      temp: TempDir::new().unwrap(),
    };
    env.write_file("BUSY", busy);
    env
  }

  pub fn dir(&self) -> &Path {
    self.temp.path()
  }

  /// Write a file relative to the project directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// Default build directory.
  pub fn output(&self) -> PathBuf {
    self.temp.path().join("output")
  }

  /// The busy binary run inside the project, with a clean environment.
  pub fn busy_cmd(&self) -> Command {
    let mut cmd = cargo_bin_cmd!("busy");
    cmd.current_dir(self.temp.path());
    cmd.env_remove("BUSY_BUILD_DIR");
    cmd.env_remove("BUSY_JOBS");
    cmd.env_remove("RUST_LOG");
    cmd
  }
}
