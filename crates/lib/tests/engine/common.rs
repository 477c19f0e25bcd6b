//! Shared helpers: throwaway projects and parse shortcuts.

use std::path::{Path, PathBuf};

use busy_lib::builder::{OpCollector, Operation};
use busy_lib::{Engine, ParseParams};
use tempfile::TempDir;

/// Write `files` (relative path, content) below a fresh temp dir.
pub fn project(files: &[(&str, &str)]) -> TempDir {
  let dir = TempDir::new().unwrap();
  for (path, content) in files {
    write(&dir.path().join(path), content);
  }
  dir
}

pub fn write(path: &Path, content: &str) {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(path, content).unwrap();
}

pub fn out_dir(dir: &Path) -> PathBuf {
  dir.join("output")
}

/// gcc on linux, building into `dir/output`.
pub fn params(dir: &Path) -> ParseParams {
  let mut params = ParseParams::new(dir, out_dir(dir));
  params.target.os = "linux".to_string();
  params.target.toolchain = "gcc".to_string();
  params
}

pub fn parse(dir: &Path) -> Engine {
  parse_with(params(dir))
}

pub fn parse_with(params: ParseParams) -> Engine {
  let mut engine = Engine::new();
  let ok = engine.parse(params, true);
  assert!(ok, "parse failed: {:?}", engine.errors());
  engine
}

pub fn visit(engine: &mut Engine, targets: &[&str]) -> Vec<Operation> {
  let targets: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
  let mut collector = OpCollector::new();
  assert!(engine.visit(&mut collector, &targets), "visit failed: {:?}", engine.errors());
  collector.into_ops()
}

/// Qualified names of the active products of the root module.
pub fn active_names(engine: &Engine) -> Vec<String> {
  engine
    .all_products(engine.root_module(), busy_lib::ProductFilter::AllProducts, true)
    .into_iter()
    .map(|r| engine.get_decl_path(r))
    .collect()
}
