//! Cross reference index for editor navigation.
//!
//! Every identifier that resolves to a declaration and every path literal
//! is recorded with its file position.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::diag::CodeLocation;
use crate::model::DeclId;
use crate::syntax::Token;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Occurrence<T> {
  row: u32,
  col: u32,
  len: u32,
  target: T,
}

impl<T> Occurrence<T> {
  fn covers(&self, row: u32, col: u32) -> bool {
    self.row == row && col >= self.col && col < self.col + self.len
  }
}

#[derive(Debug, Default)]
pub struct Xref {
  decls: HashMap<PathBuf, Vec<Occurrence<DeclId>>>,
  paths: HashMap<PathBuf, Vec<Occurrence<PathBuf>>>,
}

impl Xref {
  pub fn add_use(&mut self, token: &Token, decl: DeclId) {
    let occurrence = Occurrence {
      row: token.row,
      col: token.col,
      len: token_len(token),
      target: decl,
    };
    let uses = self.decls.entry(token.path.to_path_buf()).or_default();
    if !uses.contains(&occurrence) {
      uses.push(occurrence);
    }
  }

  pub fn add_path(&mut self, token: &Token, resolved: PathBuf) {
    self.paths.entry(token.path.to_path_buf()).or_default().push(Occurrence {
      row: token.row,
      col: token.col,
      len: token_len(token),
      target: resolved,
    });
  }

  /// Declaration referenced by the identifier covering `row`/`col`.
  pub fn decl_at(&self, file: &Path, row: u32, col: u32) -> Option<DeclId> {
    self
      .decls
      .get(file)?
      .iter()
      .find(|o| o.covers(row, col))
      .map(|o| o.target)
  }

  /// Absolute path of the path literal covering `row`/`col`.
  pub fn path_at(&self, file: &Path, row: u32, col: u32) -> Option<&Path> {
    self
      .paths
      .get(file)?
      .iter()
      .find(|o| o.covers(row, col))
      .map(|o| o.target.as_path())
  }

  /// Every recorded location of `decl`, including its definition.
  pub fn locations_of(&self, decl: DeclId) -> Vec<CodeLocation> {
    let mut out: Vec<CodeLocation> = self
      .decls
      .iter()
      .flat_map(|(file, uses)| {
        uses
          .iter()
          .filter(move |o| o.target == decl)
          .map(move |o| CodeLocation::new(file.clone(), o.row, o.col))
      })
      .collect();
    out.sort_by(|a, b| (&a.file, a.row, a.col).cmp(&(&b.file, b.row, b.col)));
    out
  }

  /// Declarations used in `file`, each with the positions of its uses.
  pub fn decls_in_file(&self, file: &Path) -> Vec<(DeclId, Vec<(u32, u32)>)> {
    let mut grouped: BTreeMap<DeclId, Vec<(u32, u32)>> = BTreeMap::new();
    for o in self.decls.get(file).into_iter().flatten() {
      grouped.entry(o.target).or_default().push((o.row, o.col));
    }
    grouped
      .into_iter()
      .map(|(decl, mut positions)| {
        positions.sort_unstable();
        (decl, positions)
      })
      .collect()
  }
}

fn token_len(token: &Token) -> u32 {
  (token.text.chars().count() as u32).max(1)
}
