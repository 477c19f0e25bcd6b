//! Integer handles onto the evaluated model.
//!
//! Host code never sees declarations directly. It holds a [`Ref`], a
//! `(generation, index)` pair into a [`RefTable`]. Each parse starts a new
//! generation, so refs from an earlier session resolve to nothing instead
//! of silently pointing at a different declaration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;

use crate::model::{DeclId, InstId};

static GENERATION: AtomicU32 = AtomicU32::new(1);

/// Handle to a declaration or instance. Index 0 is never valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize)]
pub struct Ref {
  generation: u32,
  index: u32,
}

impl Ref {
  pub const INVALID: Ref = Ref { generation: 0, index: 0 };

  pub fn is_valid(&self) -> bool {
    self.index != 0
  }

  pub fn index(&self) -> u32 {
    self.index
  }
}

/// What a [`Ref`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
  Decl(DeclId),
  Inst(InstId),
}

/// Append-only table of handed out refs.
#[derive(Debug, Default)]
pub struct RefTable {
  generation: u32,
  entries: Vec<Target>,
  lookup: HashMap<Target, u32>,
}

impl RefTable {
  /// An empty table of a fresh generation.
  pub fn next() -> Self {
    Self {
      generation: GENERATION.fetch_add(1, Ordering::Relaxed),
      ..Default::default()
    }
  }

  pub fn generation(&self) -> u32 {
    self.generation
  }

  /// The ref of `target`, registering it on first use.
  pub fn get_or_insert(&mut self, target: Target) -> Ref {
    if let Some(index) = self.lookup.get(&target) {
      return Ref {
        generation: self.generation,
        index: *index,
      };
    }
    self.entries.push(target);
    let index = self.entries.len() as u32;
    self.lookup.insert(target, index);
    Ref {
      generation: self.generation,
      index,
    }
  }

  pub fn resolve(&self, r: Ref) -> Option<Target> {
    if r.index == 0 || r.generation != self.generation {
      return None;
    }
    self.entries.get(r.index as usize - 1).copied()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn refs_are_stable_and_start_at_one() {
    let mut table = RefTable::next();
    let a = table.get_or_insert(Target::Decl(DeclId(7)));
    let b = table.get_or_insert(Target::Inst(InstId(7)));
    assert_eq!(a.index(), 1);
    assert_eq!(b.index(), 2);
    assert_eq!(table.get_or_insert(Target::Decl(DeclId(7))), a);
    assert_eq!(table.resolve(b), Some(Target::Inst(InstId(7))));
  }

  #[test]
  fn invalid_and_stale_refs_resolve_to_nothing() {
    let mut old = RefTable::next();
    let stale = old.get_or_insert(Target::Decl(DeclId(0)));
    let mut table = RefTable::next();
    table.get_or_insert(Target::Decl(DeclId(0)));
    assert_eq!(table.resolve(Ref::INVALID), None);
    assert_eq!(table.resolve(stale), None);
    assert!(!Ref::INVALID.is_valid());
  }
}
