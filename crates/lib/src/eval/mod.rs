//! Evaluator for build descriptions.
//!
//! A [`Session`] folds the syntax trees of the project's modules into a
//! [`Model`]:
//! - one module per directory, nested by `submodule`/`subdir`/`import`
//! - classes with single inheritance, enums, macros
//! - variables whose bodies construct instances with typed fields
//!
//! Evaluation is sequential and single threaded. An error aborts the
//! declaration being evaluated; it is reported through the logger and
//! evaluation continues with the next declaration.

pub mod active;
pub mod builtins;
pub mod config;
mod expr;
pub mod xref;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::diag::{CodeLocation, ErrorItem, LogLevel, Logger};
use crate::engine::ParseParams;
use crate::model::{
  ClassData, Decl, DeclData, DeclId, DeclKind, InstId, Instance, MacroData, Model, ModuleData, Type, Value, VarData,
  VarKind, Visibility, normalize,
};
use crate::syntax::{self, Rule, SynTree, SyntaxError, Token, TokenKind};

pub use builtins::Builtins;
pub use xref::Xref;

/// Names of a module's build description file, in lookup order.
pub const BUSY_FILE_NAMES: &[&str] = &["BUSY", "BUSY.busy"];

const MAX_INCLUDE_DEPTH: usize = 16;
const MAX_MACRO_DEPTH: usize = 64;

/// Errors raised while evaluating a declaration.
#[derive(Debug, Error)]
pub enum EvalError {
  #[error("{loc} unknown identifier '{name}'")]
  Undefined { loc: CodeLocation, name: String },

  #[error("{loc} '{name}' is not public")]
  NotPublic { loc: CodeLocation, name: String },

  #[error("{loc} type mismatch: expecting {expected}, found {found}")]
  TypeMismatch {
    loc: CodeLocation,
    expected: String,
    found: String,
  },

  #[error("{loc} {msg}")]
  Semantic { loc: CodeLocation, msg: String },

  /// Raised by the `error()` built-in.
  #[error("{loc} {msg}")]
  User { loc: CodeLocation, msg: String },

  #[error("cannot read {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("unknown target '{0}'")]
  UnknownTarget(String),

  #[error("dependency cycle involving '{0}'")]
  DependencyCycle(String),

  #[error("config cycle detected at '{0}'")]
  ConfigCycle(String),
}

impl EvalError {
  pub fn location(&self) -> Option<CodeLocation> {
    match self {
      EvalError::Undefined { loc, .. }
      | EvalError::NotPublic { loc, .. }
      | EvalError::TypeMismatch { loc, .. }
      | EvalError::Semantic { loc, .. }
      | EvalError::User { loc, .. } => Some(loc.clone()),
      EvalError::Io { path, .. } => Some(CodeLocation::file(path)),
      EvalError::UnknownTarget(_) | EvalError::DependencyCycle(_) | EvalError::ConfigCycle(_) => None,
    }
  }

  /// Message without the location prefix.
  pub fn message(&self) -> String {
    match self {
      EvalError::Undefined { name, .. } => format!("unknown identifier '{}'", name),
      EvalError::NotPublic { name, .. } => format!("'{}' is not public", name),
      EvalError::TypeMismatch { expected, found, .. } => {
        format!("type mismatch: expecting {}, found {}", expected, found)
      }
      EvalError::Semantic { msg, .. } | EvalError::User { msg, .. } => msg.clone(),
      other => other.to_string(),
    }
  }
}

pub(crate) fn loc(token: &Token) -> CodeLocation {
  CodeLocation::new(token.path.to_path_buf(), token.row, token.col)
}

fn node_loc(node: &SynTree) -> CodeLocation {
  node.first_token().map(loc).unwrap_or_default()
}

fn semantic(loc: CodeLocation, msg: impl Into<String>) -> EvalError {
  EvalError::Semantic { loc, msg: msg.into() }
}

#[derive(Debug, Clone)]
struct Local {
  value: Value,
  ty: Type,
  mutable: bool,
}

/// Evaluation context of one statement sequence.
struct Ctx {
  module: DeclId,
  /// Instance whose fields `.name` refers to.
  this: Option<InstId>,
  /// Block scopes of bodies and macros; empty at module level.
  scopes: Vec<HashMap<String, Local>>,
  /// Parameter values passed by the `submodule` declaration.
  overrides: HashMap<String, Value>,
}

impl Ctx {
  fn module(module: DeclId, overrides: HashMap<String, Value>) -> Self {
    Self {
      module,
      this: None,
      scopes: Vec::new(),
      overrides,
    }
  }

  fn at_module_level(&self) -> bool {
    self.scopes.is_empty()
  }

  fn local(&self, name: &str) -> Option<&Local> {
    self.scopes.iter().rev().find_map(|s| s.get(name))
  }
}

/// One evaluated project.
pub struct Session {
  pub model: Model,
  pub xref: Xref,
  pub builtins: Builtins,
  pub params: ParseParams,
  logger: RefCell<Box<dyn Logger>>,
  errors: RefCell<Vec<ErrorItem>>,
  consumed_params: HashSet<String>,
  /// Directories of the modules being loaded, outermost first.
  loading: Vec<PathBuf>,
  include_depth: usize,
  macro_depth: usize,
}

impl Session {
  /// Create a session with the prelude and parameter globals loaded.
  pub fn new(params: ParseParams, logger: Box<dyn Logger>) -> Result<Self, EvalError> {
    let mut model = Model::new();
    let prelude = model.add_decl(Decl::new(
      "",
      None,
      CodeLocation::file(Path::new(builtins::PRELUDE_FILE)),
      DeclData::Module(ModuleData {
        dir: params.root_source_dir.clone(),
        rdir: PathBuf::from("."),
        file: None,
        members: Vec::new(),
        index: HashMap::new(),
        submodules: Vec::new(),
        imported: false,
      }),
    ));
    model.prelude = Some(prelude);

    let (tree, errors) = syntax::parse_source(builtins::PRELUDE_SOURCE, Path::new(builtins::PRELUDE_FILE));
    if let Some(first) = errors.first() {
      return Err(syntax_error(first));
    }

    // The prelude is evaluated before the builtin ids are known; the
    // placeholder ids are never read while evaluating it.
    let placeholder = Builtins {
      config: prelude,
      product: prelude,
      compiled: prelude,
      executable: prelude,
      library: prelude,
      source_set: prelude,
      group: prelude,
      copy: prelude,
      lua_script: prelude,
    };
    let mut session = Self {
      model,
      xref: Xref::default(),
      builtins: placeholder,
      params,
      logger: RefCell::new(logger),
      errors: RefCell::new(Vec::new()),
      consumed_params: HashSet::new(),
      loading: Vec::new(),
      include_depth: 0,
      macro_depth: 0,
    };

    let mut ctx = Ctx::module(prelude, HashMap::new());
    for child in tree.children() {
      session.exec(&mut ctx, child)?;
    }
    session.builtins = Builtins::resolve(&session.model, prelude)?;
    builtins::declare_globals(&mut session.model, prelude, &session.params);
    Ok(session)
  }

  /// Evaluate the project rooted at `params.root_source_dir`.
  ///
  /// Returns `false` if any error was reported.
  pub fn evaluate(&mut self) -> bool {
    let dir = self.params.root_source_dir.clone();
    let name = dir
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    let root = self.model.add_decl(Decl::new(
      name,
      None,
      CodeLocation::file(&dir),
      DeclData::Module(ModuleData {
        dir,
        rdir: PathBuf::from("."),
        file: None,
        members: Vec::new(),
        index: HashMap::new(),
        submodules: Vec::new(),
        imported: false,
      }),
    ));
    self.model.root = Some(root);

    let leftover = self.load_module(root, HashMap::new(), None);
    for name in leftover.keys() {
      self.log(LogLevel::Warning, None, &format!("unknown parameter '{}'", name));
    }
    let unused: Vec<String> = self
      .params
      .params
      .keys()
      .filter(|k| !self.consumed_params.contains(*k))
      .cloned()
      .collect();
    for key in unused {
      self.log(LogLevel::Warning, None, &format!("parameter '{}' matches no declaration", key));
    }

    info!(
      decls = self.model.decl_count(),
      errors = self.errors.borrow().len(),
      "evaluation complete"
    );
    !self.has_errors()
  }

  pub fn root(&self) -> Option<DeclId> {
    self.model.root
  }

  /// Send an event to the logger; error levels are also recorded.
  pub fn log(&self, level: LogLevel, loc: Option<&CodeLocation>, msg: &str) {
    if level.is_error() {
      self.errors.borrow_mut().push(ErrorItem::new(loc.cloned(), msg));
    }
    self.logger.borrow_mut().log(level, loc, msg);
  }

  pub fn report(&self, err: &EvalError) {
    self.log(LogLevel::Error, err.location().as_ref(), &err.message());
  }

  pub fn has_errors(&self) -> bool {
    !self.errors.borrow().is_empty()
  }

  pub fn errors(&self) -> Vec<ErrorItem> {
    self.errors.borrow().clone()
  }

  pub fn take_logger(self) -> Box<dyn Logger> {
    self.logger.into_inner()
  }

  /// True if `decl` is a variable whose object is a product built for it.
  pub fn is_product(&self, decl: DeclId) -> bool {
    self.product_inst(decl).is_some()
  }

  /// The object of a product declaration.
  pub fn product_inst(&self, decl: DeclId) -> Option<InstId> {
    let var = self.model.get(decl)?.as_var()?;
    if !var.has_body {
      return None;
    }
    let inst = self.model.var_inst(decl)?;
    let object = self.model.inst(inst);
    (object.decl == Some(decl) && self.model.isa(object.class, self.builtins.product)).then_some(inst)
  }

  /// A product with a `sources` field and no `use_deps` field.
  pub fn has_sources(&self, decl: DeclId) -> bool {
    self.product_inst(decl).is_some_and(|inst| {
      let class = self.model.inst(inst).class;
      self.model.find_field(class, "sources").is_some() && self.model.find_field(class, "use_deps").is_none()
    })
  }

  // === Modules ===

  /// Load and evaluate the build description of `module`.
  ///
  /// Returns the submodule parameters nobody declared.
  fn load_module(
    &mut self,
    module: DeclId,
    overrides: HashMap<String, Value>,
    at: Option<CodeLocation>,
  ) -> HashMap<String, Value> {
    let Some(dir) = self.model.module(module).map(|m| m.dir.clone()) else {
      return overrides;
    };
    let Some(file) = BUSY_FILE_NAMES.iter().map(|n| dir.join(n)).find(|p| p.is_file()) else {
      let loc = at.unwrap_or_else(|| CodeLocation::file(&dir));
      self.report(&semantic(loc, format!("cannot find BUSY file in {}", dir.display())));
      return overrides;
    };
    if let DeclData::Module(data) = &mut self.model.decl_mut(module).data {
      data.file = Some(file.clone());
    }

    let Some(tree) = self.parse_checked(&file) else {
      return overrides;
    };
    debug!(module = %self.model.decl_path(module), file = %file.display(), "evaluating module");

    self.loading.push(normalize(&dir));
    let mut ctx = Ctx::module(module, overrides);
    for child in tree.children() {
      if let Err(e) = self.exec(&mut ctx, child) {
        self.report(&e);
      }
    }
    self.loading.pop();
    ctx.overrides
  }

  /// Parse a file, reporting syntax errors. `None` if it has any.
  fn parse_checked(&mut self, file: &Path) -> Option<SynTree> {
    match syntax::parse_file(file) {
      Ok((tree, errors)) if errors.is_empty() => Some(tree),
      Ok((_, errors)) => {
        for e in &errors {
          self.log(LogLevel::Error, Some(&CodeLocation::new(e.path.clone(), e.row, e.col)), &e.msg);
        }
        None
      }
      Err(source) => {
        self.report(&EvalError::Io {
          path: file.to_path_buf(),
          source,
        });
        None
      }
    }
  }

  // === Statements ===

  fn exec(&mut self, ctx: &mut Ctx, node: &SynTree) -> Result<(), EvalError> {
    match node.rule() {
      Some(Rule::VarDecl) => self.var_decl(ctx, node),
      Some(Rule::TypeDecl) => self.type_decl(ctx, node),
      Some(Rule::MacroDef) => self.macro_def(ctx, node),
      Some(Rule::Submodule) => self.submodule(ctx, node, false),
      Some(Rule::Import) => self.submodule(ctx, node, true),
      Some(Rule::Include) => self.include(ctx, node),
      Some(Rule::Condition) => self.condition(ctx, node),
      Some(Rule::Block) => self.exec_all(ctx, node.children()),
      Some(Rule::AssigOrCall) => self.assig_or_call(ctx, node),
      _ => Ok(()),
    }
  }

  /// Execute the statement nodes among `nodes`, skipping punctuation.
  fn exec_all(&mut self, ctx: &mut Ctx, nodes: &[SynTree]) -> Result<(), EvalError> {
    for node in nodes.iter().filter(|n| n.rule().is_some()) {
      self.exec(ctx, node)?;
    }
    Ok(())
  }

  /// Run a body with `inst` as the object under construction.
  fn exec_body(&mut self, ctx: &mut Ctx, body: &SynTree, inst: InstId) -> Result<(), EvalError> {
    let saved = ctx.this.replace(inst);
    ctx.scopes.push(HashMap::new());
    let result = self.exec_all(ctx, body.children());
    ctx.scopes.pop();
    ctx.this = saved;
    result
  }

  fn new_instance(&mut self, class: DeclId, module: DeclId, decl: Option<DeclId>) -> InstId {
    let fields = self
      .model
      .class_fields(class)
      .into_iter()
      .map(|f| (self.model.decl(f).name.clone(), self.model.field_type(f).zero()))
      .collect();
    self.model.add_inst(Instance {
      class,
      fields,
      module,
      decl,
      generated: Vec::new(),
      artifact: None,
    })
  }

  /// Add a declaration to the current module.
  fn declare(&mut self, ctx: &Ctx, decl: Decl, name_tok: &Token) -> Result<DeclId, EvalError> {
    let name = decl.name.clone();
    let id = self.model.add_decl(decl);
    if self.model.add_member(ctx.module, id).is_err() {
      return Err(semantic(loc(name_tok), format!("duplicate declaration of '{}'", name)));
    }
    self.xref.add_use(name_tok, id);
    Ok(id)
  }

  fn var_decl(&mut self, ctx: &mut Ctx, node: &SynTree) -> Result<(), EvalError> {
    let keyword = node.first_token().map(|t| t.kind).unwrap_or(TokenKind::Let);
    let var_kind = match keyword {
      TokenKind::Var => VarKind::Var,
      TokenKind::Param => VarKind::Param,
      _ => VarKind::Let,
    };
    let (name_tok, visibility) = ident_def(node)?;
    let name = name_tok.text.clone();
    let declared = match node.child(Rule::TypeRef) {
      Some(t) => Some(self.resolve_type(ctx, t)?),
      None => None,
    };
    let body = node.child(Rule::Body);
    let init = node.child(Rule::Expression);

    if var_kind == VarKind::Param && !ctx.at_module_level() {
      return Err(semantic(loc(name_tok), "parameters are only allowed at module level"));
    }

    let decl = if ctx.at_module_level() {
      let mut decl = Decl::new(
        name.clone(),
        Some(ctx.module),
        loc(name_tok),
        DeclData::Var(VarData {
          var_kind,
          ty: declared.clone().unwrap_or(Type::Any),
          value: Value::Nil,
          has_body: body.is_some(),
        }),
      );
      decl.visibility = visibility;
      decl.end = body.and_then(|b| b.last_token()).map(|t| (t.row, t.col));
      Some(self.declare(ctx, decl, name_tok)?)
    } else {
      None
    };

    let (value, ty) = if let Some(body) = body {
      let Some(Type::Class(class)) = declared else {
        return Err(semantic(loc(name_tok), "a declaration with a body requires a class type"));
      };
      let inst = self.new_instance(class, ctx.module, decl);
      if let Some(id) = decl {
        self.set_var(id, Value::Object(inst), Type::Class(class));
      }
      self.exec_body(ctx, body, inst)?;
      (Value::Object(inst), Type::Class(class))
    } else if let Some(expr) = init {
      let value = self.eval(ctx, expr)?;
      match declared {
        Some(ty) => {
          let found = value.type_name();
          let converted = self.model.convert(&ty, value).ok_or_else(|| EvalError::TypeMismatch {
            loc: node_loc(expr),
            expected: self.model.type_name(&ty),
            found: found.to_string(),
          })?;
          (converted, ty)
        }
        None => {
          let ty = value.infer_type();
          (value, ty)
        }
      }
    } else {
      let ty = declared.unwrap_or(Type::Any);
      (ty.zero(), ty)
    };

    let value = match (var_kind, decl) {
      (VarKind::Param, Some(id)) => self.param_value(ctx, id, name_tok, value, &ty)?,
      _ => value,
    };

    match decl {
      Some(id) => {
        // A constructor expression builds an object for this declaration.
        if let Value::Object(inst) = value
          && self.model.inst(inst).decl.is_none()
        {
          self.model.inst_mut(inst).decl = Some(id);
          if let DeclData::Var(var) = &mut self.model.decl_mut(id).data {
            var.has_body = true;
          }
        }
        self.set_var(id, value, ty);
      }
      None => {
        let local = Local {
          value,
          ty,
          mutable: var_kind == VarKind::Var,
        };
        if let Some(scope) = ctx.scopes.last_mut() {
          scope.insert(name, local);
        }
      }
    }
    Ok(())
  }

  fn set_var(&mut self, id: DeclId, value: Value, ty: Type) {
    if let DeclData::Var(var) = &mut self.model.decl_mut(id).data {
      var.value = value;
      var.ty = ty;
    }
  }

  /// Apply submodule and external overrides to a parameter.
  fn param_value(
    &mut self,
    ctx: &mut Ctx,
    decl: DeclId,
    name_tok: &Token,
    default: Value,
    ty: &Type,
  ) -> Result<Value, EvalError> {
    let mut value = default;
    if let Some(given) = ctx.overrides.remove(&name_tok.text) {
      let found = given.type_name();
      let target = if *ty == Type::Any { value.infer_type() } else { ty.clone() };
      value = self.model.convert(&target, given).ok_or_else(|| EvalError::TypeMismatch {
        loc: loc(name_tok),
        expected: self.model.type_name(&target),
        found: found.to_string(),
      })?;
    }
    let key = self.model.decl_path(decl);
    if let Some(raw) = self.params.params.get(&key).cloned() {
      self.consumed_params.insert(key.clone());
      let parsed = builtins::parse_param(&raw, ty, &value).and_then(|v| {
        let target = if *ty == Type::Any { v.infer_type() } else { ty.clone() };
        self.model.convert(&target, v)
      });
      value = parsed.ok_or_else(|| semantic(loc(name_tok), format!("invalid value '{}' for parameter '{}'", raw, key)))?;
    }
    Ok(value)
  }

  fn type_decl(&mut self, ctx: &mut Ctx, node: &SynTree) -> Result<(), EvalError> {
    let (name_tok, visibility) = ident_def(node)?;
    if !ctx.at_module_level() {
      return Err(semantic(loc(name_tok), "types are only allowed at module level"));
    }

    if let Some(enum_decl) = node.child(Rule::EnumDecl) {
      let mut symbols: Vec<String> = Vec::new();
      for token in enum_decl.children().iter().filter_map(|c| c.token()) {
        if token.kind != TokenKind::Symbol {
          continue;
        }
        if symbols.contains(&token.text) {
          return Err(semantic(loc(token), format!("duplicate symbol `{}", token.text)));
        }
        symbols.push(token.text.clone());
      }
      let mut decl = Decl::new(name_tok.text.clone(), Some(ctx.module), loc(name_tok), DeclData::Enum(symbols));
      decl.visibility = visibility;
      self.declare(ctx, decl, name_tok)?;
      return Ok(());
    }

    let class_decl = node
      .child(Rule::ClassDecl)
      .ok_or_else(|| semantic(loc(name_tok), "expecting class or enumeration"))?;
    let base = match class_decl.child(Rule::Designator) {
      Some(designator) => match self.resolve(ctx, designator)? {
        expr::Resolved::Decl(id) if self.model.decl(id).kind() == DeclKind::Class => Some(id),
        _ => return Err(semantic(node_loc(designator), "base type must be a class")),
      },
      None => None,
    };
    let mut decl = Decl::new(
      name_tok.text.clone(),
      Some(ctx.module),
      loc(name_tok),
      DeclData::Class(ClassData {
        base,
        fields: Vec::new(),
      }),
    );
    decl.visibility = visibility;
    decl.end = class_decl.last_token().map(|t| (t.row, t.col));
    let class = self.declare(ctx, decl, name_tok)?;

    for field in class_decl.children().iter().filter(|c| c.is_rule(Rule::FieldDecl)) {
      let (field_tok, field_vis) = ident_def(field)?;
      if self.model.find_field(class, &field_tok.text).is_some() {
        return Err(semantic(loc(field_tok), format!("duplicate field '{}'", field_tok.text)));
      }
      let type_ref = field
        .child(Rule::TypeRef)
        .ok_or_else(|| semantic(loc(field_tok), "expecting field type"))?;
      let ty = self.resolve_type(ctx, type_ref)?;
      let mut field_decl = Decl::new(field_tok.text.clone(), Some(class), loc(field_tok), DeclData::Field(ty));
      field_decl.visibility = field_vis;
      let field_id = self.model.add_decl(field_decl);
      self.xref.add_use(field_tok, field_id);
      if let DeclData::Class(data) = &mut self.model.decl_mut(class).data {
        data.fields.push(field_id);
      }
    }
    Ok(())
  }

  fn macro_def(&mut self, ctx: &mut Ctx, node: &SynTree) -> Result<(), EvalError> {
    let mut idents = node
      .children()
      .iter()
      .filter_map(|c| c.token())
      .filter(|t| t.kind == TokenKind::Ident);
    let Some(name_tok) = idents.next() else {
      return Err(semantic(node_loc(node), "expecting macro name"));
    };
    if !ctx.at_module_level() {
      return Err(semantic(loc(name_tok), "macros are only allowed at module level"));
    }
    let params: Vec<String> = idents.map(|t| t.text.clone()).collect();
    let body = node
      .child(Rule::Body)
      .ok_or_else(|| semantic(loc(name_tok), "expecting macro body"))?;
    let mut decl = Decl::new(
      name_tok.text.clone(),
      Some(ctx.module),
      loc(name_tok),
      DeclData::Macro(MacroData {
        params,
        body: Arc::new(body.clone()),
      }),
    );
    decl.visibility = Visibility::Public;
    decl.end = body.last_token().map(|t| (t.row, t.col));
    self.declare(ctx, decl, name_tok)?;
    Ok(())
  }

  fn submodule(&mut self, ctx: &mut Ctx, node: &SynTree, imported: bool) -> Result<(), EvalError> {
    let (name_tok, visibility) = ident_def(node)?;
    if !ctx.at_module_level() {
      return Err(semantic(loc(name_tok), "modules are only allowed at module level"));
    }
    let children = node.children();
    let dir_tok = children
      .iter()
      .position(|c| c.is_token(TokenKind::Eq))
      .and_then(|i| children.get(i + 1))
      .and_then(|c| c.token());
    let rel = dir_tok.map(|t| t.text.as_str()).unwrap_or(name_tok.text.as_str());
    let dir = self.model.resolve_path(ctx.module, rel);
    if let Some(tok) = dir_tok.filter(|t| t.kind == TokenKind::Path) {
      self.xref.add_path(tok, dir.clone());
    }
    if let Some(start) = self.loading.iter().position(|d| *d == normalize(&dir)) {
      let chain: Vec<String> = self.loading[start..]
        .iter()
        .chain(std::iter::once(&dir))
        .map(|d| d.display().to_string())
        .collect();
      return Err(semantic(loc(name_tok), format!("module cycle: {}", chain.join(" -> "))));
    }

    let mut overrides = HashMap::new();
    let mut param_locs = HashMap::new();
    for param in children.iter().filter(|c| c.is_rule(Rule::ParamValue)) {
      let Some(param_tok) = param.first_token() else {
        continue;
      };
      let value = match param.child(Rule::Expression) {
        Some(expr) => self.eval(ctx, expr)?,
        None => Value::Bool(true),
      };
      param_locs.insert(param_tok.text.clone(), loc(param_tok));
      overrides.insert(param_tok.text.clone(), value);
    }

    let parent = self.model.module(ctx.module);
    let rdir = parent.map(|m| m.rdir.join(&name_tok.text)).unwrap_or_default();
    let parent_imported = parent.is_some_and(|m| m.imported);
    let mut decl = Decl::new(
      name_tok.text.clone(),
      Some(ctx.module),
      loc(name_tok),
      DeclData::Module(ModuleData {
        dir,
        rdir,
        file: None,
        members: Vec::new(),
        index: HashMap::new(),
        submodules: Vec::new(),
        imported: imported || parent_imported,
      }),
    );
    decl.visibility = visibility;
    let module = self.declare(ctx, decl, name_tok)?;

    let leftover = self.load_module(module, overrides, Some(loc(name_tok)));
    let mut unknown: Vec<_> = leftover.into_keys().collect();
    unknown.sort();
    for name in unknown {
      let at = param_locs.remove(&name).unwrap_or_else(|| loc(name_tok));
      self.report(&semantic(
        at,
        format!("module '{}' has no parameter '{}'", name_tok.text, name),
      ));
    }
    Ok(())
  }

  fn include(&mut self, ctx: &mut Ctx, node: &SynTree) -> Result<(), EvalError> {
    let path_tok = node
      .child_token(TokenKind::Path)
      .ok_or_else(|| semantic(node_loc(node), "expecting path"))?;
    let file = self.model.resolve_path(ctx.module, &path_tok.text);
    self.xref.add_path(path_tok, file.clone());
    if self.include_depth >= MAX_INCLUDE_DEPTH {
      return Err(semantic(loc(path_tok), "include nesting too deep"));
    }
    let Some(tree) = self.parse_checked(&file) else {
      return Ok(());
    };
    self.include_depth += 1;
    for child in tree.children() {
      if let Err(e) = self.exec(ctx, child) {
        self.report(&e);
      }
    }
    self.include_depth -= 1;
    Ok(())
  }

  fn condition(&mut self, ctx: &mut Ctx, node: &SynTree) -> Result<(), EvalError> {
    let children = node.children();
    let is_delimiter = |c: &SynTree| c.is_token(TokenKind::Elsif) || c.is_token(TokenKind::Else) || c.is_token(TokenKind::End);
    let mut taken = false;
    let mut i = 0;
    while i < children.len() {
      let child = &children[i];
      if child.is_token(TokenKind::If) || child.is_token(TokenKind::Elsif) {
        let Some(cond) = children.get(i + 1) else {
          break;
        };
        i += 3;
        let start = i.min(children.len());
        while i < children.len() && !is_delimiter(&children[i]) {
          i += 1;
        }
        if !taken {
          match self.eval(ctx, cond)? {
            Value::Bool(true) => {
              taken = true;
              self.exec_all(ctx, &children[start..i])?;
            }
            Value::Bool(false) => {}
            other => {
              return Err(EvalError::TypeMismatch {
                loc: node_loc(cond),
                expected: "bool".to_string(),
                found: other.type_name().to_string(),
              });
            }
          }
        }
      } else if child.is_token(TokenKind::Else) {
        i += 1;
        let start = i;
        while i < children.len() && !children[i].is_token(TokenKind::End) {
          i += 1;
        }
        if !taken {
          taken = true;
          self.exec_all(ctx, &children[start..i])?;
        }
      } else {
        i += 1;
      }
    }
    Ok(())
  }

  fn assig_or_call(&mut self, ctx: &mut Ctx, node: &SynTree) -> Result<(), EvalError> {
    let is_field = node.children().first().is_some_and(|c| c.is_token(TokenKind::Dot));
    let designator = node
      .child(Rule::Designator)
      .ok_or_else(|| semantic(node_loc(node), "expecting designator"))?;

    if let Some(assignment) = node.child(Rule::Assignment) {
      let op = assignment.first_token().map(|t| t.kind).unwrap_or(TokenKind::Eq);
      let expr = assignment
        .child(Rule::Expression)
        .ok_or_else(|| semantic(node_loc(assignment), "expecting expression"))?;
      let value = self.eval(ctx, expr)?;
      if is_field {
        self.assign_field(ctx, designator, op, value)
      } else {
        self.assign_var(ctx, designator, op, value)
      }
    } else if let Some(call) = node.child(Rule::Call) {
      if is_field {
        return Err(semantic(node_loc(node), "a field cannot be called"));
      }
      let args = self.eval_args(ctx, call)?;
      self.call_statement(ctx, designator, args)
    } else {
      Err(semantic(node_loc(node), "expecting assignment or call"))
    }
  }

  fn assign_field(&mut self, ctx: &mut Ctx, designator: &SynTree, op: TokenKind, value: Value) -> Result<(), EvalError> {
    let name_tok = single_ident(designator)?;
    let Some(inst) = ctx.this else {
      return Err(semantic(loc(name_tok), "field assignment outside of an object body"));
    };
    let class = self.model.inst(inst).class;
    let Some(field) = self.model.find_field(class, &name_tok.text) else {
      return Err(semantic(
        loc(name_tok),
        format!("'{}' is not a field of {}", name_tok.text, self.model.decl(class).name),
      ));
    };
    self.xref.add_use(name_tok, field);
    let ty = self.model.field_type(field);
    let current = self
      .model
      .inst(inst)
      .fields
      .get(&name_tok.text)
      .cloned()
      .unwrap_or_else(|| ty.zero());
    let updated = self.apply_op(op, current, value, &ty, name_tok)?;
    self.model.inst_mut(inst).fields.insert(name_tok.text.clone(), updated);
    Ok(())
  }

  fn assign_var(&mut self, ctx: &mut Ctx, designator: &SynTree, op: TokenKind, value: Value) -> Result<(), EvalError> {
    let name_tok = single_ident(designator)?;
    let name = &name_tok.text;

    if let Some(local) = ctx.local(name).cloned() {
      if !local.mutable {
        return Err(semantic(loc(name_tok), format!("cannot assign to immutable '{}'", name)));
      }
      let updated = self.apply_op(op, local.value, value, &local.ty, name_tok)?;
      if let Some(slot) = ctx.scopes.iter_mut().rev().find_map(|s| s.get_mut(name)) {
        slot.value = updated;
      }
      return Ok(());
    }

    let Some(id) = self.model.member(ctx.module, name) else {
      return Err(EvalError::Undefined {
        loc: loc(name_tok),
        name: name.clone(),
      });
    };
    self.xref.add_use(name_tok, id);
    let (current, ty) = match self.model.decl(id).as_var() {
      Some(var) if var.var_kind == VarKind::Var => (var.value.clone(), var.ty.clone()),
      Some(_) => return Err(semantic(loc(name_tok), format!("cannot assign to immutable '{}'", name))),
      None => return Err(semantic(loc(name_tok), format!("'{}' is not a variable", name))),
    };
    let updated = self.apply_op(op, current, value, &ty, name_tok)?;
    self.set_var(id, updated, ty);
    Ok(())
  }

  /// Compute the result of `current <op> value` for a slot of type `ty`.
  fn apply_op(&self, op: TokenKind, current: Value, value: Value, ty: &Type, at: &Token) -> Result<Value, EvalError> {
    let mismatch = |model: &Model, ty: &Type, found: &Value| EvalError::TypeMismatch {
      loc: loc(at),
      expected: model.type_name(ty),
      found: found.type_name().to_string(),
    };
    let convert = |ty: &Type, v: Value| -> Result<Value, EvalError> {
      let err = mismatch(&self.model, ty, &v);
      self.model.convert(ty, v).ok_or(err)
    };
    let ty = if *ty == Type::Any { current.infer_type() } else { ty.clone() };

    match op {
      TokenKind::Eq | TokenKind::ColonEq => convert(&ty, value),
      TokenKind::PlusEq => match (&ty, current, value) {
        (Type::List(elem), current, value) => {
          let mut items = match current {
            Value::List(items) => items,
            _ => Vec::new(),
          };
          match value {
            Value::List(values) => {
              for v in values {
                items.push(convert(elem.as_ref(), v)?);
              }
            }
            single => items.push(convert(elem.as_ref(), single)?),
          }
          Ok(Value::List(items))
        }
        (_, current, value) => expr::arith(TokenKind::Plus, current, value).map_err(|msg| semantic(loc(at), msg)),
      },
      TokenKind::MinusEq => match (&ty, current, value) {
        (Type::List(_), Value::List(items), value) => {
          let remove = match value {
            Value::List(values) => values,
            single => vec![single],
          };
          Ok(Value::List(items.into_iter().filter(|i| !remove.contains(i)).collect()))
        }
        (_, current, value) => expr::arith(TokenKind::Minus, current, value).map_err(|msg| semantic(loc(at), msg)),
      },
      TokenKind::StarEq => expr::arith(TokenKind::Star, current, value).map_err(|msg| semantic(loc(at), msg)),
      other => Err(semantic(loc(at), format!("unexpected operator '{}'", other))),
    }
  }

  fn call_statement(&mut self, ctx: &mut Ctx, designator: &SynTree, args: Vec<Value>) -> Result<(), EvalError> {
    let at = node_loc(designator);
    let plain = designator.children().len() == 1;
    if plain
      && let Some(name_tok) = designator.first_token()
      && let Some(level) = builtins::log_level_of(&name_tok.text)
    {
      let text = builtins::message_text(&args);
      if level.is_error() {
        return Err(EvalError::User { loc: at, msg: text });
      }
      self.log(level, Some(&at), &text);
      return Ok(());
    }

    match self.resolve(ctx, designator)? {
      expr::Resolved::Decl(id) if self.model.decl(id).kind() == DeclKind::Macro => self.invoke_macro(ctx, id, args, at),
      _ => Err(semantic(at, "only macros and built-in procedures can be called")),
    }
  }

  fn invoke_macro(&mut self, ctx: &mut Ctx, id: DeclId, args: Vec<Value>, at: CodeLocation) -> Result<(), EvalError> {
    let DeclData::Macro(data) = &self.model.decl(id).data else {
      return Err(semantic(at, "not a macro"));
    };
    let (params, body) = (data.params.clone(), data.body.clone());
    if params.len() != args.len() {
      return Err(semantic(
        at,
        format!("macro '{}' expects {} arguments, got {}", self.model.decl(id).name, params.len(), args.len()),
      ));
    }
    if self.macro_depth >= MAX_MACRO_DEPTH {
      return Err(semantic(at, "macro expansion too deep"));
    }
    let scope = params
      .into_iter()
      .zip(args)
      .map(|(name, value)| {
        let ty = value.infer_type();
        (
          name,
          Local {
            value,
            ty,
            mutable: false,
          },
        )
      })
      .collect();
    let module = self.model.owning_module(id).unwrap_or(ctx.module);
    let mut macro_ctx = Ctx {
      module,
      this: ctx.this,
      scopes: vec![scope],
      overrides: HashMap::new(),
    };
    self.macro_depth += 1;
    let result = self.exec_all(&mut macro_ctx, body.children());
    self.macro_depth -= 1;
    result
  }

  fn resolve_type(&mut self, ctx: &mut Ctx, node: &SynTree) -> Result<Type, EvalError> {
    let designator = node
      .child(Rule::Designator)
      .ok_or_else(|| semantic(node_loc(node), "expecting type name"))?;
    let base = if designator.children().len() == 1
      && let Some(ty) = designator.first_token().and_then(|t| Type::builtin(&t.text))
    {
      ty
    } else {
      match self.resolve(ctx, designator)? {
        expr::Resolved::Decl(id) => match self.model.decl(id).kind() {
          DeclKind::Class => Type::Class(id),
          DeclKind::Enum => Type::Enum(id),
          _ => return Err(semantic(node_loc(designator), "not a type")),
        },
        expr::Resolved::Value(_) => return Err(semantic(node_loc(designator), "not a type")),
      }
    };
    if node.child_token(TokenKind::LBrackRBrack).is_some() {
      Ok(Type::List(Box::new(base)))
    } else {
      Ok(base)
    }
  }
}

/// Name token and visibility of the `IdentDef` child of `node`.
fn ident_def(node: &SynTree) -> Result<(&Token, Visibility), EvalError> {
  let ident = node
    .child(Rule::IdentDef)
    .ok_or_else(|| semantic(node_loc(node), "expecting identifier"))?;
  let name = ident
    .first_token()
    .ok_or_else(|| semantic(node_loc(node), "expecting identifier"))?;
  let visibility = if ident.child_token(TokenKind::Star).is_some() {
    Visibility::Public
  } else if ident.child_token(TokenKind::Minus).is_some() {
    Visibility::ReadOnly
  } else {
    Visibility::Private
  };
  Ok((name, visibility))
}

/// The only identifier of a designator without `^` or `.`.
fn single_ident(designator: &SynTree) -> Result<&Token, EvalError> {
  match designator.children() {
    [SynTree::Terminal(token)] if token.kind == TokenKind::Ident => Ok(token),
    _ => Err(semantic(node_loc(designator), "expecting a simple name")),
  }
}

fn syntax_error(e: &SyntaxError) -> EvalError {
  semantic(CodeLocation::new(e.path.clone(), e.row, e.col), e.msg.clone())
}
