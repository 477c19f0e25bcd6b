//! Ref-based facade over an evaluated project.
//!
//! The [`Engine`] owns one [`Session`] at a time and exposes it through
//! [`Ref`] handles only. Accessors never fail: an invalid or stale ref,
//! or a field without a value, yields an empty string, zero, `false` or
//! [`Ref::INVALID`]. [`Engine::field`] is the `Result` based variant
//! underneath.

pub mod handle;
mod params;

use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::builder::{self, OpVisitor};
use crate::diag::{CodeLocation, ErrorItem, Logger, TracingLogger};
use crate::eval::Session;
use crate::model::{DeclData, DeclId, DeclKind, InstId, Value, normalize};

pub use handle::{Ref, RefTable, Target};
pub use params::{BuildMode, ConfigCycleMode, Field, FieldError, ParseParams, PlatformParams, ProductFilter};

pub struct Engine {
  session: Option<Session>,
  refs: RefCell<RefTable>,
  logger: Option<Box<dyn Logger>>,
  errors: Vec<ErrorItem>,
}

impl Default for Engine {
  fn default() -> Self {
    Self::new()
  }
}

impl Engine {
  pub fn new() -> Self {
    Self {
      session: None,
      refs: RefCell::new(RefTable::next()),
      logger: None,
      errors: Vec::new(),
    }
  }

  /// Route evaluator log events to `logger` from the next parse on.
  pub fn set_logger(&mut self, logger: Box<dyn Logger>) {
    self.logger = Some(logger);
  }

  /// Evaluate the project described by `params`.
  ///
  /// Any previous session and all refs into it are discarded. With
  /// `check_targets` the active set is computed for `params.targets`.
  pub fn parse(&mut self, params: ParseParams, check_targets: bool) -> bool {
    let logger = self
      .logger
      .take()
      .or_else(|| self.session.take().map(Session::take_logger))
      .unwrap_or_else(|| Box::new(TracingLogger));
    self.session = None;
    self.refs = RefCell::new(RefTable::next());
    self.errors.clear();

    info!(root = %params.root_source_dir.display(), "parsing project");
    let targets = params.targets.clone();
    let mut session = match Session::new(params, logger) {
      Ok(session) => session,
      Err(e) => {
        self.errors.push(ErrorItem::new(e.location(), e.message()));
        return false;
      }
    };
    let mut ok = session.evaluate();
    if ok
      && check_targets
      && let Err(e) = session.compute_active(&targets)
    {
      session.report(&e);
      ok = false;
    }
    self.session = Some(session);
    ok
  }

  pub fn session(&self) -> Option<&Session> {
    self.session.as_ref()
  }

  /// Errors of the last parse or visit.
  pub fn errors(&self) -> Vec<ErrorItem> {
    let mut all = self.errors.clone();
    if let Some(session) = &self.session {
      all.extend(session.errors());
    }
    all
  }

  // === Refs ===

  fn to_ref(&self, target: Target) -> Ref {
    self.refs.borrow_mut().get_or_insert(target)
  }

  fn decl_ref(&self, id: DeclId) -> Ref {
    self.to_ref(Target::Decl(id))
  }

  fn target(&self, r: Ref) -> Option<Target> {
    self.session.as_ref()?;
    self.refs.borrow().resolve(r)
  }

  /// Declaration behind `r`; an instance maps to the declaration it was
  /// constructed for.
  fn decl(&self, r: Ref) -> Option<DeclId> {
    let session = self.session.as_ref()?;
    match self.target(r)? {
      Target::Decl(id) => Some(id),
      Target::Inst(inst) => session.model.get_inst(inst)?.decl,
    }
  }

  pub fn decl_id(&self, r: Ref) -> Option<DeclId> {
    self.decl(r)
  }

  pub fn ref_of(&self, id: DeclId) -> Ref {
    match &self.session {
      Some(session) if session.model.get(id).is_some() => self.decl_ref(id),
      _ => Ref::INVALID,
    }
  }

  // === Navigation ===

  pub fn root_module(&self) -> Ref {
    match self.session.as_ref().and_then(Session::root) {
      Some(root) => self.decl_ref(root),
      None => Ref::INVALID,
    }
  }

  /// A module by directory (absolute or relative to the root source
  /// directory) or by qualified name.
  pub fn find_module(&self, path: &str) -> Ref {
    let Some(session) = &self.session else {
      return Ref::INVALID;
    };
    let wanted = normalize(&session.params.root_source_dir.join(path));
    let by_dir = session
      .modules()
      .into_iter()
      .find(|m| session.model.module(*m).is_some_and(|data| normalize(&data.dir) == wanted));
    let found = by_dir.or_else(|| {
      session
        .find_qualified(path)
        .filter(|id| session.model.decl(*id).kind() == DeclKind::Module)
    });
    match found {
      Some(id) => self.decl_ref(id),
      None => Ref::INVALID,
    }
  }

  pub fn sub_modules(&self, module: Ref) -> Vec<Ref> {
    let (Some(session), Some(id)) = (&self.session, self.decl(module)) else {
      return Vec::new();
    };
    session
      .model
      .module(id)
      .map(|m| m.submodules.iter().map(|s| self.decl_ref(*s)).collect())
      .unwrap_or_default()
  }

  /// Products declared directly in `module` that pass `filter`.
  pub fn all_products(&self, module: Ref, filter: ProductFilter, only_actives: bool) -> Vec<Ref> {
    let (Some(session), Some(id)) = (&self.session, self.decl(module)) else {
      return Vec::new();
    };
    session
      .module_products(id)
      .into_iter()
      .filter(|p| !only_actives || session.model.decl(*p).active)
      .filter(|p| match filter {
        ProductFilter::AllProducts => true,
        ProductFilter::WithSources => session.has_sources(*p),
        ProductFilter::Compiled => self.product_isa(session, *p, session.builtins.compiled),
        ProductFilter::Executable => self.product_isa(session, *p, session.builtins.executable),
      })
      .map(|p| self.decl_ref(p))
      .collect()
  }

  fn product_isa(&self, session: &Session, product: DeclId, class: DeclId) -> bool {
    session
      .product_inst(product)
      .is_some_and(|inst| session.model.isa(session.model.inst(inst).class, class))
  }

  /// Direct members of a module.
  pub fn all_decls(&self, module: Ref) -> Vec<Ref> {
    let (Some(session), Some(id)) = (&self.session, self.decl(module)) else {
      return Vec::new();
    };
    session
      .model
      .module(id)
      .map(|m| m.members.iter().map(|d| self.decl_ref(*d)).collect())
      .unwrap_or_default()
  }

  // === Product queries ===

  /// Absolute source paths of a product.
  pub fn all_sources(&self, product: Ref, add_generated: bool) -> Vec<PathBuf> {
    let Some((session, inst)) = self.product_inst(product) else {
      return Vec::new();
    };
    let instance = session.model.inst(inst);
    let mut out: Vec<PathBuf> = instance
      .fields
      .get("sources")
      .map(Value::as_list)
      .unwrap_or(&[])
      .iter()
      .filter_map(|v| match v {
        Value::Path(p) => Some(session.model.resolve_path(instance.module, p)),
        _ => None,
      })
      .collect();
    if add_generated {
      out.extend(instance.generated.iter().cloned());
    }
    out
  }

  fn product_inst(&self, r: Ref) -> Option<(&Session, InstId)> {
    let session = self.session.as_ref()?;
    let inst = match self.target(r)? {
      Target::Inst(inst) => inst,
      Target::Decl(id) => session.model.var_inst(id)?,
    };
    Some((session, inst))
  }

  fn fetch(&self, product: Ref, field: &str) -> Vec<String> {
    let Some((session, inst)) = self.product_inst(product) else {
      return Vec::new();
    };
    match session.fetch_strings(inst, field) {
      Ok(values) => values,
      Err(e) => {
        session.report(&e);
        Vec::new()
      }
    }
  }

  pub fn include_paths(&self, product: Ref) -> Vec<PathBuf> {
    self.fetch(product, "include_dirs").into_iter().map(PathBuf::from).collect()
  }

  pub fn defines(&self, product: Ref) -> Vec<String> {
    self.fetch(product, "defines")
  }

  pub fn cpp_flags(&self, product: Ref) -> Vec<String> {
    let mut flags = self.fetch(product, "cflags");
    flags.extend(self.fetch(product, "cflags_cc"));
    flags
  }

  pub fn c_flags(&self, product: Ref) -> Vec<String> {
    let mut flags = self.fetch(product, "cflags");
    flags.extend(self.fetch(product, "cflags_c"));
    flags
  }

  // === Predicates ===

  pub fn is_class(&self, r: Ref) -> bool {
    let (Some(session), Some(Target::Decl(id))) = (&self.session, self.target(r)) else {
      return false;
    };
    session.model.decl(id).kind() == DeclKind::Class
  }

  pub fn is_product(&self, r: Ref) -> bool {
    match (&self.session, self.decl(r)) {
      (Some(session), Some(id)) => session.is_product(id),
      _ => false,
    }
  }

  pub fn is_executable(&self, r: Ref) -> bool {
    match (&self.session, self.decl(r)) {
      (Some(session), Some(id)) => self.product_isa(session, id, session.builtins.executable),
      _ => false,
    }
  }

  pub fn is_compiled(&self, r: Ref) -> bool {
    match (&self.session, self.decl(r)) {
      (Some(session), Some(id)) => self.product_isa(session, id, session.builtins.compiled),
      _ => false,
    }
  }

  pub fn is_active(&self, r: Ref) -> bool {
    match (&self.session, self.decl(r)) {
      (Some(session), Some(id)) => session.model.decl(id).active,
      _ => false,
    }
  }

  // === Typed field access ===

  /// Value of `field` on the declaration or instance behind `r`.
  pub fn field(&self, r: Ref, field: &Field) -> Result<Value, FieldError> {
    let session = self.session.as_ref().ok_or(FieldError::NoSession)?;
    let target = self.target(r).ok_or(FieldError::InvalidRef)?;
    let unknown = || FieldError::UnknownField(field.as_str().to_string());

    if field.is_meta() {
      let id = match target {
        Target::Decl(id) => id,
        Target::Inst(inst) => session.model.inst(inst).decl.ok_or_else(unknown)?,
      };
      return meta_field(session, id, field).ok_or_else(unknown);
    }

    let inst = match target {
      Target::Inst(inst) => inst,
      Target::Decl(id) => match &session.model.decl(id).data {
        DeclData::Module(module) => {
          let member = module.index.get(field.as_str()).copied().ok_or_else(unknown)?;
          return match session.model.decl(member).as_var() {
            Some(var) => Ok(var.value.clone()),
            None => Ok(Value::Decl(member)),
          };
        }
        _ => session.model.var_inst(id).ok_or_else(unknown)?,
      },
    };
    let instance = session.model.inst(inst);
    match field {
      Field::Configs | Field::IncludeDirs | Field::Defines | Field::CFlags | Field::CFlagsC | Field::CFlagsCc
      | Field::LdFlags | Field::LibDirs | Field::LibNames | Field::LibFiles
        if instance.fields.contains_key(field.as_str()) =>
      {
        session
          .fetch_list(inst, field.as_str())
          .map(Value::List)
          .map_err(|e| FieldError::ConfigCycle(e.message()))
      }
      _ => instance.fields.get(field.as_str()).cloned().ok_or_else(unknown),
    }
  }

  pub fn get_string(&self, r: Ref, field: &str) -> String {
    match self.field(r, &Field::from(field)) {
      Ok(Value::Str(s) | Value::Symbol(s) | Value::Path(s)) => s,
      Ok(Value::Nil) | Err(_) => String::new(),
      Ok(other) => other.to_string(),
    }
  }

  pub fn get_integer(&self, r: Ref, field: &str) -> i64 {
    match self.field(r, &Field::from(field)) {
      Ok(Value::Int(i)) => i,
      Ok(Value::Bool(b)) => i64::from(b),
      _ => 0,
    }
  }

  /// A path field, made absolute against the owning module's directory.
  pub fn get_path(&self, r: Ref, field: &str) -> PathBuf {
    let Some(session) = &self.session else {
      return PathBuf::new();
    };
    match self.field(r, &Field::from(field)) {
      Ok(Value::Path(p)) => match self.anchor_module(r) {
        Some(module) => session.model.resolve_path(module, &p),
        None => PathBuf::from(p),
      },
      _ => PathBuf::new(),
    }
  }

  fn anchor_module(&self, r: Ref) -> Option<DeclId> {
    let session = self.session.as_ref()?;
    match self.target(r)? {
      Target::Inst(inst) => Some(session.model.inst(inst).module),
      Target::Decl(id) => match session.model.var_inst(id) {
        Some(inst) => Some(session.model.inst(inst).module),
        None => session.model.module_of(id),
      },
    }
  }

  pub fn get_object(&self, r: Ref, field: &str) -> Ref {
    match self.field(r, &Field::from(field)) {
      Ok(Value::Object(inst)) => self.to_ref(Target::Inst(inst)),
      Ok(Value::Decl(id)) => self.decl_ref(id),
      _ => Ref::INVALID,
    }
  }

  /// The module holding the parameter globals.
  pub fn get_globals(&self) -> Ref {
    match self.session.as_ref().and_then(|s| s.model.prelude) {
      Some(prelude) => self.decl_ref(prelude),
      None => Ref::INVALID,
    }
  }

  pub fn get_owner(&self, r: Ref) -> Ref {
    let Some(session) = &self.session else {
      return Ref::INVALID;
    };
    match self.target(r) {
      Some(Target::Decl(id)) => match session.model.decl(id).owner {
        Some(owner) => self.decl_ref(owner),
        None => Ref::INVALID,
      },
      Some(Target::Inst(inst)) => match session.model.inst(inst).decl {
        Some(decl) => self.decl_ref(decl),
        None => Ref::INVALID,
      },
      None => Ref::INVALID,
    }
  }

  pub fn get_owning_module(&self, r: Ref) -> Ref {
    match (&self.session, self.decl(r)) {
      (Some(session), Some(id)) => match session.model.owning_module(id) {
        Some(m) => self.decl_ref(m),
        None => Ref::INVALID,
      },
      _ => Ref::INVALID,
    }
  }

  /// Qualified name relative to the root, e.g. `sub.hello`.
  pub fn get_decl_path(&self, r: Ref) -> String {
    match (&self.session, self.decl(r)) {
      (Some(session), Some(id)) => session.model.decl_path(id),
      _ => String::new(),
    }
  }

  pub fn get_location(&self, r: Ref) -> Option<CodeLocation> {
    let (session, id) = (self.session.as_ref()?, self.decl(r)?);
    Some(session.model.decl(id).loc.clone())
  }

  /// Position of the closing token of a declaration with a body.
  pub fn get_end_location(&self, r: Ref) -> Option<CodeLocation> {
    let (session, id) = (self.session.as_ref()?, self.decl(r)?);
    let decl = session.model.decl(id);
    let (row, col) = decl.end?;
    Some(CodeLocation::new(decl.loc.file.clone(), row, col))
  }

  // === Building ===

  /// Create the build directory tree mirroring the module tree.
  pub fn create_build_dirs(&self) -> io::Result<()> {
    let Some(session) = &self.session else {
      return Ok(());
    };
    let root = &session.params.root_build_dir;
    for module in session.modules() {
      if let Some(data) = session.model.module(module) {
        let dir = normalize(&root.join(&data.rdir));
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "build directory ready");
      }
    }
    Ok(())
  }

  /// Compute the active set for `targets` and emit its operations.
  pub fn visit(&mut self, visitor: &mut dyn OpVisitor, targets: &[String]) -> bool {
    let Some(session) = self.session.as_mut() else {
      return false;
    };
    let result = session
      .compute_active(targets)
      .and_then(|active| builder::visit(session, &active, visitor));
    match result {
      Ok(_) => true,
      Err(e) => {
        session.report(&e);
        false
      }
    }
  }

  // === Cross references ===

  pub fn find_decl_by_pos(&self, file: &Path, row: u32, col: u32) -> Ref {
    match self.session.as_ref().and_then(|s| s.xref.decl_at(file, row, col)) {
      Some(id) => self.decl_ref(id),
      None => Ref::INVALID,
    }
  }

  pub fn find_path_by_pos(&self, file: &Path, row: u32, col: u32) -> Option<PathBuf> {
    self.session.as_ref()?.xref.path_at(file, row, col).map(Path::to_path_buf)
  }

  pub fn find_all_locs_of(&self, r: Ref) -> Vec<CodeLocation> {
    match (&self.session, self.decl(r)) {
      (Some(session), Some(id)) => session.xref.locations_of(id),
      _ => Vec::new(),
    }
  }

  /// Declarations used in `file` with the positions of their uses.
  pub fn find_decl_insts_in_file(&self, file: &Path) -> Vec<(Ref, Vec<(u32, u32)>)> {
    let Some(session) = &self.session else {
      return Vec::new();
    };
    session
      .xref
      .decls_in_file(file)
      .into_iter()
      .map(|(id, positions)| (self.decl_ref(id), positions))
      .collect()
  }
}

fn meta_field(session: &Session, id: DeclId, field: &Field) -> Option<Value> {
  let model = &session.model;
  let decl = model.get(id)?;
  let value = match field {
    Field::DeclName => Value::Str(decl.name.clone()),
    Field::Dir => path_value(model.dir_of(id)?),
    Field::RDir => path_value(&model.module(model.module_of(id)?)?.rdir),
    Field::File => match model.module(id) {
      Some(module) => path_value(module.file.as_deref()?),
      None => path_value(&decl.loc.file),
    },
    Field::Row => Value::Int(i64::from(decl.loc.row)),
    Field::Col => Value::Int(i64::from(decl.loc.col)),
    Field::EndRow => Value::Int(i64::from(decl.end?.0)),
    Field::EndCol => Value::Int(i64::from(decl.end?.1)),
    Field::Generated => {
      let inst = model.get_inst(model.var_inst(id)?)?;
      Value::List(inst.generated.iter().map(|p| path_value(p)).collect())
    }
    Field::Artifact => path_value(model.get_inst(model.var_inst(id)?)?.artifact.as_deref()?),
    _ => return None,
  };
  Some(value)
}

fn path_value(p: &Path) -> Value {
  Value::Path(p.to_string_lossy().into_owned())
}
