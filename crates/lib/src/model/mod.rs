//! Declaration and instance arena.
//!
//! All declarations of a session live in one [`Model`] and refer to each
//! other by index ([`DeclId`], [`InstId`]), never by pointer. Ownership is
//! hierarchical: every declaration except the root module has an owner.

mod value;

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

pub use value::{Type, Value};

use crate::diag::CodeLocation;
use crate::syntax::SynTree;

/// Index of a declaration in the [`Model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclId(pub u32);

/// Index of an instance in the [`Model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKind {
  Module,
  Class,
  Enum,
  Var,
  Field,
  Macro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
  #[default]
  Private,
  Public,
  ReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
  Let,
  Var,
  Param,
}

#[derive(Debug)]
pub struct ModuleData {
  /// Absolute source directory.
  pub dir: PathBuf,
  /// Directory relative to the root source directory, `.` for the root.
  pub rdir: PathBuf,
  /// The build description file, if one was loaded.
  pub file: Option<PathBuf>,
  pub members: Vec<DeclId>,
  pub index: HashMap<String, DeclId>,
  pub submodules: Vec<DeclId>,
  /// Loaded with `import`; its products are never selected by default.
  pub imported: bool,
}

#[derive(Debug)]
pub struct ClassData {
  pub base: Option<DeclId>,
  pub fields: Vec<DeclId>,
}

#[derive(Debug)]
pub struct VarData {
  pub var_kind: VarKind,
  pub ty: Type,
  pub value: Value,
  pub has_body: bool,
}

#[derive(Debug)]
pub struct MacroData {
  pub params: Vec<String>,
  pub body: Arc<SynTree>,
}

#[derive(Debug)]
pub enum DeclData {
  Module(ModuleData),
  Class(ClassData),
  Enum(Vec<String>),
  Var(VarData),
  Field(Type),
  Macro(MacroData),
}

#[derive(Debug)]
pub struct Decl {
  pub name: String,
  pub owner: Option<DeclId>,
  pub loc: CodeLocation,
  /// Row and column of the closing token of a declaration with a body.
  pub end: Option<(u32, u32)>,
  pub visibility: Visibility,
  pub active: bool,
  pub data: DeclData,
}

impl Decl {
  pub fn new(name: impl Into<String>, owner: Option<DeclId>, loc: CodeLocation, data: DeclData) -> Self {
    Self {
      name: name.into(),
      owner,
      loc,
      end: None,
      visibility: Visibility::Private,
      active: false,
      data,
    }
  }

  pub fn kind(&self) -> DeclKind {
    match self.data {
      DeclData::Module(_) => DeclKind::Module,
      DeclData::Class(_) => DeclKind::Class,
      DeclData::Enum(_) => DeclKind::Enum,
      DeclData::Var(_) => DeclKind::Var,
      DeclData::Field(_) => DeclKind::Field,
      DeclData::Macro(_) => DeclKind::Macro,
    }
  }

  pub fn as_module(&self) -> Option<&ModuleData> {
    match &self.data {
      DeclData::Module(m) => Some(m),
      _ => None,
    }
  }

  pub fn as_var(&self) -> Option<&VarData> {
    match &self.data {
      DeclData::Var(v) => Some(v),
      _ => None,
    }
  }

  pub fn is_public(&self) -> bool {
    self.visibility != Visibility::Private
  }
}

/// An object created from a class, holding resolved field values.
#[derive(Debug)]
pub struct Instance {
  pub class: DeclId,
  pub fields: HashMap<String, Value>,
  /// Module whose directory anchors relative paths of this instance.
  pub module: DeclId,
  /// The variable declaration this instance was constructed for.
  pub decl: Option<DeclId>,
  /// Source files produced by code generation steps.
  pub generated: Vec<PathBuf>,
  /// Final artifact of a product, known after visiting.
  pub artifact: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct Model {
  decls: Vec<Decl>,
  insts: Vec<Instance>,
  pub root: Option<DeclId>,
  pub prelude: Option<DeclId>,
}

impl Model {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_decl(&mut self, decl: Decl) -> DeclId {
    self.decls.push(decl);
    DeclId(self.decls.len() as u32 - 1)
  }

  pub fn get(&self, id: DeclId) -> Option<&Decl> {
    self.decls.get(id.0 as usize)
  }

  /// Panics on an id not created by this model.
  pub fn decl(&self, id: DeclId) -> &Decl {
    &self.decls[id.0 as usize]
  }

  pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
    &mut self.decls[id.0 as usize]
  }

  pub fn decl_count(&self) -> usize {
    self.decls.len()
  }

  pub fn decl_ids(&self) -> impl Iterator<Item = DeclId> + '_ {
    (0..self.decls.len() as u32).map(DeclId)
  }

  pub fn add_inst(&mut self, inst: Instance) -> InstId {
    self.insts.push(inst);
    InstId(self.insts.len() as u32 - 1)
  }

  pub fn get_inst(&self, id: InstId) -> Option<&Instance> {
    self.insts.get(id.0 as usize)
  }

  pub fn inst(&self, id: InstId) -> &Instance {
    &self.insts[id.0 as usize]
  }

  pub fn inst_mut(&mut self, id: InstId) -> &mut Instance {
    &mut self.insts[id.0 as usize]
  }

  pub fn module(&self, id: DeclId) -> Option<&ModuleData> {
    self.get(id).and_then(Decl::as_module)
  }

  fn module_mut(&mut self, id: DeclId) -> Option<&mut ModuleData> {
    match &mut self.decl_mut(id).data {
      DeclData::Module(m) => Some(m),
      _ => None,
    }
  }

  /// Register `member` under its name in `module`.
  ///
  /// Returns the previous declaration if the name is already taken.
  pub fn add_member(&mut self, module: DeclId, member: DeclId) -> Result<(), DeclId> {
    let name = self.decl(member).name.clone();
    let is_module = self.decl(member).kind() == DeclKind::Module;
    let Some(data) = self.module_mut(module) else {
      return Ok(());
    };
    if let Some(existing) = data.index.get(&name) {
      return Err(*existing);
    }
    data.index.insert(name, member);
    data.members.push(member);
    if is_module {
      data.submodules.push(member);
    }
    Ok(())
  }

  pub fn member(&self, module: DeclId, name: &str) -> Option<DeclId> {
    self.module(module).and_then(|m| m.index.get(name).copied())
  }

  /// Instance created for a variable declaration, if any.
  pub fn var_inst(&self, id: DeclId) -> Option<InstId> {
    match self.get(id)?.as_var()?.value {
      Value::Object(inst) => Some(inst),
      _ => None,
    }
  }

  /// True if `class` is `base` or derives from it.
  pub fn isa(&self, class: DeclId, base: DeclId) -> bool {
    let mut current = Some(class);
    let mut steps = 0;
    while let Some(id) = current {
      if id == base {
        return true;
      }
      steps += 1;
      if steps > self.decls.len() {
        return false;
      }
      current = match self.get(id).map(|d| &d.data) {
        Some(DeclData::Class(c)) => c.base,
        _ => None,
      };
    }
    false
  }

  /// Look up a field declaration, climbing the base class chain.
  pub fn find_field(&self, class: DeclId, name: &str) -> Option<DeclId> {
    let mut current = Some(class);
    let mut steps = 0;
    while let Some(id) = current {
      let DeclData::Class(data) = &self.get(id)?.data else {
        return None;
      };
      if let Some(field) = data.fields.iter().find(|f| self.decl(**f).name == name) {
        return Some(*field);
      }
      steps += 1;
      if steps > self.decls.len() {
        return None;
      }
      current = data.base;
    }
    None
  }

  /// All fields of a class, base class fields first.
  pub fn class_fields(&self, class: DeclId) -> Vec<DeclId> {
    let mut chain = Vec::new();
    let mut current = Some(class);
    while let Some(id) = current {
      if chain.contains(&id) {
        break;
      }
      chain.push(id);
      current = match &self.decl(id).data {
        DeclData::Class(c) => c.base,
        _ => None,
      };
    }
    chain
      .iter()
      .rev()
      .filter_map(|id| match &self.decl(*id).data {
        DeclData::Class(c) => Some(c.fields.clone()),
        _ => None,
      })
      .flatten()
      .collect()
  }

  pub fn field_type(&self, field: DeclId) -> Type {
    match &self.decl(field).data {
      DeclData::Field(ty) => ty.clone(),
      _ => Type::Any,
    }
  }

  /// Instance field type, `None` if the class has no such field.
  pub fn inst_field_type(&self, inst: InstId, name: &str) -> Option<Type> {
    let field = self.find_field(self.inst(inst).class, name)?;
    Some(self.field_type(field))
  }

  /// Check `value` against `ty`, converting where allowed (int to real).
  pub fn convert(&self, ty: &Type, value: Value) -> Option<Value> {
    match (ty, value) {
      (Type::Any, v) => Some(v),
      (Type::Bool, v @ Value::Bool(_)) => Some(v),
      (Type::Int, v @ Value::Int(_)) => Some(v),
      (Type::Real, v @ Value::Real(_)) => Some(v),
      (Type::Real, Value::Int(i)) => Some(Value::Real(i as f64)),
      (Type::String, v @ Value::Str(_)) => Some(v),
      (Type::Path, v @ Value::Path(_)) => Some(v),
      (Type::Symbol, v @ Value::Symbol(_)) => Some(v),
      (Type::Enum(id), Value::Symbol(s)) => match &self.decl(*id).data {
        DeclData::Enum(symbols) if symbols.contains(&s) => Some(Value::Symbol(s)),
        _ => None,
      },
      (Type::Class(_), Value::Nil) => Some(Value::Nil),
      (Type::Class(class), Value::Object(inst)) => {
        if self.isa(self.inst(inst).class, *class) {
          Some(Value::Object(inst))
        } else {
          None
        }
      }
      (Type::List(elem), Value::List(items)) => {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
          out.push(self.convert(elem, item)?);
        }
        Some(Value::List(out))
      }
      _ => None,
    }
  }

  pub fn type_name(&self, ty: &Type) -> String {
    match ty {
      Type::Any => "any".to_string(),
      Type::Bool => "bool".to_string(),
      Type::Int => "int".to_string(),
      Type::Real => "real".to_string(),
      Type::String => "string".to_string(),
      Type::Path => "path".to_string(),
      Type::Symbol => "symbol".to_string(),
      Type::List(elem) => format!("{}[]", self.type_name(elem)),
      Type::Class(id) | Type::Enum(id) => self.decl(*id).name.clone(),
    }
  }

  /// Module that contains `id`. A module's owning module is its parent.
  pub fn owning_module(&self, id: DeclId) -> Option<DeclId> {
    let mut current = self.get(id)?.owner;
    while let Some(owner) = current {
      let decl = self.get(owner)?;
      if decl.kind() == DeclKind::Module {
        return Some(owner);
      }
      current = decl.owner;
    }
    None
  }

  /// `id` itself if it is a module, otherwise its owning module.
  pub fn module_of(&self, id: DeclId) -> Option<DeclId> {
    match self.get(id)?.kind() {
      DeclKind::Module => Some(id),
      _ => self.owning_module(id),
    }
  }

  /// Qualified name relative to the root module, e.g. `sub.hello`.
  pub fn decl_path(&self, id: DeclId) -> String {
    let mut parts = Vec::new();
    let mut current = Some(id);
    while let Some(cur) = current {
      if Some(cur) == self.root || Some(cur) == self.prelude {
        break;
      }
      let decl = self.decl(cur);
      parts.push(decl.name.as_str());
      current = decl.owner;
    }
    parts.reverse();
    parts.join(".")
  }

  /// Absolute source directory of the module owning `id`.
  pub fn dir_of(&self, id: DeclId) -> Option<&Path> {
    let module = self.module_of(id)?;
    self.module(module).map(|m| m.dir.as_path())
  }

  /// Resolve a path value against `module`'s directory.
  pub fn resolve_path(&self, module: DeclId, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() || raw.starts_with('/') {
      return normalize(path);
    }
    match self.module(module) {
      Some(m) => normalize(&m.dir.join(path)),
      None => normalize(path),
    }
  }
}

/// Lexically normalize a path: drop `.` and fold `..` where possible.
pub fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        if !out.pop() {
          out.push("..");
        }
      }
      other => out.push(other.as_os_str()),
    }
  }
  if out.as_os_str().is_empty() {
    out.push(".");
  }
  out
}
