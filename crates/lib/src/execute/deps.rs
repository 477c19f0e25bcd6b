//! Header dependency tracking for up-to-date checks.
//!
//! Each scanned file is a node, each resolved `#include` an edge. The
//! inputs of a compile are everything reachable from its source file.
//! Includes that resolve to no existing file (system headers, typically)
//! are ignored.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use regex::Regex;
use tracing::{debug, trace};

use crate::model::normalize;

static INCLUDE_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#"(?m)^\s*#\s*(?:include|import)\s*([<"])([^">]+)[">]"#).expect("valid include pattern")
});

#[derive(Debug, Default)]
pub struct DependencyTable {
  graph: DiGraph<PathBuf, ()>,
  nodes: HashMap<PathBuf, NodeIndex>,
}

impl DependencyTable {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  fn node(&mut self, path: &Path) -> (NodeIndex, bool) {
    if let Some(idx) = self.nodes.get(path) {
      return (*idx, false);
    }
    let idx = self.graph.add_node(path.to_path_buf());
    self.nodes.insert(path.to_path_buf(), idx);
    (idx, true)
  }

  /// Scan `source` and everything it includes, once per file.
  pub fn add_file(&mut self, source: &Path, include_dirs: &[PathBuf]) -> NodeIndex {
    let source = normalize(source);
    let (root, fresh) = self.node(&source);
    if !fresh {
      return root;
    }
    let mut pending = vec![(root, source)];
    while let Some((idx, file)) = pending.pop() {
      let Ok(text) = fs::read_to_string(&file) else {
        trace!(file = %file.display(), "unreadable, no includes");
        continue;
      };
      for caps in INCLUDE_RE.captures_iter(&text) {
        let quoted = &caps[1] == "\"";
        let Some(target) = resolve_include(&file, &caps[2], quoted, include_dirs) else {
          continue;
        };
        let (to, fresh) = self.node(&target);
        self.graph.update_edge(idx, to, ());
        if fresh {
          pending.push((to, target));
        }
      }
    }
    root
  }

  /// `source` and every file it includes, directly or indirectly.
  pub fn closure(&mut self, source: &Path, include_dirs: &[PathBuf]) -> Vec<PathBuf> {
    let root = self.add_file(source, include_dirs);
    let mut dfs = Dfs::new(&self.graph, root);
    let mut files = Vec::new();
    while let Some(idx) = dfs.next(&self.graph) {
      files.push(self.graph[idx].clone());
    }
    files
  }

  /// Whether `output` must be rebuilt from `source`.
  pub fn is_stale(&mut self, source: &Path, include_dirs: &[PathBuf], output: &Path) -> bool {
    let inputs = self.closure(source, include_dirs);
    let stale = !is_up_to_date(inputs.iter().map(PathBuf::as_path), output);
    debug!(source = %source.display(), inputs = inputs.len(), stale, "checked compile inputs");
    stale
  }
}

fn resolve_include(from: &Path, name: &str, quoted: bool, include_dirs: &[PathBuf]) -> Option<PathBuf> {
  let local = if quoted { from.parent() } else { None };
  local
    .into_iter()
    .chain(include_dirs.iter().map(PathBuf::as_path))
    .map(|dir| normalize(&dir.join(name)))
    .find(|candidate| candidate.is_file())
}

fn modified(path: &Path) -> Option<SystemTime> {
  fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// True if `output` exists and no existing input is newer than it.
pub fn is_up_to_date<'a>(inputs: impl IntoIterator<Item = &'a Path>, output: &Path) -> bool {
  let Some(out_time) = modified(output) else {
    return false;
  };
  inputs
    .into_iter()
    .filter_map(modified)
    .all(|in_time| in_time <= out_time)
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use tempfile::TempDir;

  use super::*;

  fn touch(path: &Path, age_secs: u64) {
    if !path.exists() {
      fs::write(path, "").unwrap();
    }
    let time = SystemTime::now() - Duration::from_secs(age_secs);
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(time).unwrap();
  }

  fn write(path: &Path, text: &str) {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
  }

  #[test]
  fn closure_follows_quoted_and_angle_includes() {
    let dir = TempDir::new().unwrap();
    let inc = dir.path().join("inc");
    write(&dir.path().join("a.cpp"), "#include \"a.h\"\n#include <lib.h>\n#include <vector>\n");
    write(&dir.path().join("a.h"), "  #  include \"b.h\"\n");
    write(&dir.path().join("b.h"), "#include \"a.h\"\n");
    write(&inc.join("lib.h"), "");

    let mut table = DependencyTable::new();
    let mut files = table.closure(&dir.path().join("a.cpp"), std::slice::from_ref(&inc));
    files.sort();
    let mut expected = vec![
      dir.path().join("a.cpp"),
      dir.path().join("a.h"),
      dir.path().join("b.h"),
      inc.join("lib.h"),
    ];
    expected.sort();
    assert_eq!(files, expected);
    assert_eq!(table.len(), 4);
  }

  #[test]
  fn quoted_includes_prefer_the_including_directory() {
    let dir = TempDir::new().unwrap();
    let inc = dir.path().join("inc");
    write(&dir.path().join("src/a.c"), "#include \"cfg.h\"\n");
    write(&dir.path().join("src/cfg.h"), "");
    write(&inc.join("cfg.h"), "");

    let mut table = DependencyTable::new();
    let files = table.closure(&dir.path().join("src/a.c"), &[inc]);
    assert_eq!(files.len(), 2);
    assert!(files.contains(&dir.path().join("src/cfg.h")));
  }

  #[test]
  fn header_newer_than_object_makes_compile_stale() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("a.cpp");
    let hdr = dir.path().join("a.h");
    let obj = dir.path().join("a.o");
    write(&src, "#include \"a.h\"\n");
    write(&hdr, "");
    touch(&src, 300);
    touch(&obj, 200);
    touch(&hdr, 100);

    let mut table = DependencyTable::new();
    assert!(table.is_stale(&src, &[], &obj));
  }

  #[test]
  fn older_inputs_keep_the_object_fresh() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("a.cpp");
    let hdr = dir.path().join("a.h");
    let obj = dir.path().join("a.o");
    write(&src, "#include \"a.h\"\n");
    write(&hdr, "");
    touch(&src, 300);
    touch(&hdr, 250);
    touch(&obj, 100);

    let mut table = DependencyTable::new();
    assert!(!table.is_stale(&src, &[], &obj));
  }

  #[test]
  fn missing_output_is_never_up_to_date() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("a.c");
    write(&src, "");
    assert!(!is_up_to_date([src.as_path()], &dir.path().join("a.o")));
  }
}
