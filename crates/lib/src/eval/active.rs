//! Selection of the products to build.

use std::collections::VecDeque;

use tracing::debug;

use crate::model::{DeclId, DeclKind, Value};

use super::{EvalError, Session};

impl Session {
  /// Mark the products reachable from `targets` as active.
  ///
  /// Targets are qualified declaration paths (`sub.hello`). Without
  /// targets every product with sources in a non-imported module is a
  /// root. Returns the active products in declaration order.
  pub fn compute_active(&mut self, targets: &[String]) -> Result<Vec<DeclId>, EvalError> {
    let ids: Vec<DeclId> = self.model.decl_ids().collect();
    for id in &ids {
      self.model.decl_mut(*id).active = false;
    }

    let roots = if targets.is_empty() {
      ids
        .iter()
        .copied()
        .filter(|id| self.has_sources(*id) && !self.in_imported_module(*id))
        .collect::<Vec<_>>()
    } else {
      targets
        .iter()
        .map(|t| {
          self
            .find_qualified(t)
            .filter(|id| self.is_product(*id))
            .ok_or_else(|| EvalError::UnknownTarget(t.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?
    };

    let mut queue: VecDeque<DeclId> = roots.into();
    while let Some(id) = queue.pop_front() {
      if self.model.decl(id).active {
        continue;
      }
      self.model.decl_mut(id).active = true;
      queue.extend(self.product_deps(id));
    }

    let active: Vec<DeclId> = ids.into_iter().filter(|id| self.model.decl(*id).active).collect();
    debug!(count = active.len(), "active products");
    Ok(active)
  }

  /// Product declarations listed in the `deps` field of `product`.
  pub fn product_deps(&self, product: DeclId) -> Vec<DeclId> {
    let Some(inst) = self.product_inst(product) else {
      return Vec::new();
    };
    self
      .model
      .inst(inst)
      .fields
      .get("deps")
      .map(Value::as_list)
      .unwrap_or(&[])
      .iter()
      .filter_map(|v| match v {
        Value::Object(dep) => self.model.inst(*dep).decl,
        _ => None,
      })
      .filter(|d| self.is_product(*d))
      .collect()
  }

  /// Look up a dotted declaration path from the root module.
  pub fn find_qualified(&self, path: &str) -> Option<DeclId> {
    let mut current = self.model.root?;
    for part in path.split('.') {
      current = self.model.member(current, part)?;
    }
    Some(current)
  }

  fn in_imported_module(&self, id: DeclId) -> bool {
    self
      .model
      .owning_module(id)
      .and_then(|m| self.model.module(m))
      .is_some_and(|m| m.imported)
  }

  /// Modules of the project tree, parents before children.
  pub fn modules(&self) -> Vec<DeclId> {
    let mut out = Vec::new();
    let mut stack: Vec<DeclId> = self.model.root.into_iter().collect();
    while let Some(m) = stack.pop() {
      out.push(m);
      if let Some(data) = self.model.module(m) {
        stack.extend(data.submodules.iter().rev().copied());
      }
    }
    out
  }

  /// Product declarations owned directly by `module`.
  pub fn module_products(&self, module: DeclId) -> Vec<DeclId> {
    self
      .model
      .module(module)
      .map(|m| m.members.clone())
      .unwrap_or_default()
      .into_iter()
      .filter(|d| self.model.decl(*d).kind() == DeclKind::Var && self.is_product(*d))
      .collect()
  }
}
