//! Linearization of the active products into build operations.
//!
//! Products are ordered into dependency waves. For each wave the builder
//! emits one `EnteringProduct` marker per product, then a fork with every
//! compile, code generation and copy operation of the wave, then a fork
//! with the link operations. A link therefore always lands in a later
//! group than its own compiles and the links of its dependencies.
//!
//! The builder runs no commands; the job layer renders and runs them.

pub mod ops;
pub mod toolchain;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, info, warn};

use crate::diag::{CodeLocation, LogLevel};
use crate::eval::{EvalError, Session};
use crate::model::{DeclId, InstId, Value, normalize};

pub use ops::{OpCollector, OpKind, OpVisitor, Operation, OutFileCollector, Param, ParamKind};
pub use toolchain::{Lang, Toolchain};

/// Pseudo command of copy operations.
pub const COPY_COMMAND: &str = "copy";

/// Link inputs a product hands to the products depending on it.
#[derive(Debug, Clone, Default)]
struct Exports {
  objects: Vec<String>,
  libs: Vec<String>,
}

impl Exports {
  fn extend(&mut self, other: &Exports) {
    self.objects.extend(other.objects.iter().cloned());
    self.libs.extend(other.libs.iter().cloned());
  }
}

struct PlannedOp {
  kind: OpKind,
  command: String,
  params: Vec<Param>,
}

impl PlannedOp {
  fn new(kind: OpKind, command: impl Into<String>) -> Self {
    Self {
      kind,
      command: command.into(),
      params: Vec::new(),
    }
  }

  fn param(&mut self, kind: ParamKind, value: impl Into<String>) {
    self.params.push(Param::new(kind, value));
  }

  fn params<I, S>(&mut self, kind: ParamKind, values: I)
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    for value in values {
      self.param(kind, value);
    }
  }
}

#[derive(Default)]
struct Planned {
  path: String,
  first: Vec<PlannedOp>,
  link: Vec<PlannedOp>,
}

struct Builder<'a> {
  session: &'a mut Session,
  toolchain: Toolchain,
  os: String,
  tool_dir: PathBuf,
  prefix: String,
  exports: HashMap<DeclId, Exports>,
  generated: HashMap<DeclId, Vec<PathBuf>>,
  artifacts: HashMap<DeclId, PathBuf>,
}

/// Emit the operations of `active` to `visitor`.
///
/// Returns the number of operations emitted, markers excluded.
pub fn visit(session: &mut Session, active: &[DeclId], visitor: &mut dyn OpVisitor) -> Result<usize, EvalError> {
  let target = session.params.target.clone();
  let toolchain: Toolchain = target.toolchain.parse().map_err(|msg: String| EvalError::Semantic {
    loc: CodeLocation::file(&session.params.root_source_dir),
    msg,
  })?;
  let waves = product_waves(session, active)?;
  info!(products = active.len(), waves = waves.len(), toolchain = %toolchain, "visiting products");

  let mut builder = Builder {
    session,
    toolchain,
    os: target.os,
    tool_dir: target.toolchain_path,
    prefix: target.toolchain_prefix,
    exports: HashMap::new(),
    generated: HashMap::new(),
    artifacts: HashMap::new(),
  };

  let mut count = 0;
  for wave in &waves {
    let planned = wave
      .iter()
      .map(|p| builder.plan(*p))
      .collect::<Result<Vec<_>, _>>()?;
    for product in &planned {
      visitor.begin_op(
        OpKind::EnteringProduct,
        &product.path,
        &product.path,
        builder.toolchain,
        &builder.os,
      );
    }
    let first: Vec<(&str, &PlannedOp)> = planned
      .iter()
      .flat_map(|p| p.first.iter().map(move |op| (p.path.as_str(), op)))
      .collect();
    let link: Vec<(&str, &PlannedOp)> = planned
      .iter()
      .flat_map(|p| p.link.iter().map(move |op| (p.path.as_str(), op)))
      .collect();
    count += first.len() + link.len();
    builder.emit_fork(visitor, &first);
    builder.emit_fork(visitor, &link);
  }
  debug!(ops = count, "operations emitted");
  Ok(count)
}

/// Group products into Kahn levels of the `deps` graph.
fn product_waves(session: &Session, active: &[DeclId]) -> Result<Vec<Vec<DeclId>>, EvalError> {
  let mut graph: DiGraph<DeclId, ()> = DiGraph::new();
  let nodes: HashMap<DeclId, NodeIndex> = active.iter().map(|p| (*p, graph.add_node(*p))).collect();
  for product in active {
    for dep in session.product_deps(*product) {
      if let (Some(from), Some(to)) = (nodes.get(&dep), nodes.get(product)) {
        graph.add_edge(*from, *to, ());
      }
    }
  }

  let mut in_degree: HashMap<NodeIndex, usize> = graph
    .node_indices()
    .map(|idx| (idx, graph.neighbors_directed(idx, Direction::Incoming).count()))
    .collect();
  let mut level: HashMap<DeclId, usize> = HashMap::new();
  let mut remaining: HashSet<NodeIndex> = graph.node_indices().collect();
  let mut current = 0;

  while !remaining.is_empty() {
    let ready: Vec<NodeIndex> = remaining.iter().filter(|idx| in_degree[*idx] == 0).copied().collect();
    if ready.is_empty() {
      let name = remaining
        .iter()
        .map(|idx| session.model.decl_path(graph[*idx]))
        .min()
        .unwrap_or_default();
      return Err(EvalError::DependencyCycle(name));
    }
    for idx in ready {
      level.insert(graph[idx], current);
      remaining.remove(&idx);
      for next in graph.neighbors_directed(idx, Direction::Outgoing) {
        if let Some(degree) = in_degree.get_mut(&next) {
          *degree = degree.saturating_sub(1);
        }
      }
    }
    current += 1;
  }

  let mut waves = vec![Vec::new(); current];
  for product in active {
    if let Some(l) = level.get(product) {
      waves[*l].push(*product);
    }
  }
  Ok(waves)
}

impl Builder<'_> {
  fn emit_fork(&self, visitor: &mut dyn OpVisitor, ops: &[(&str, &PlannedOp)]) {
    if ops.is_empty() {
      return;
    }
    visitor.fork_group(ops.len() as i32);
    for (product, op) in ops {
      visitor.begin_op(op.kind, &op.command, product, self.toolchain, &self.os);
      for p in &op.params {
        visitor.param(p.kind, &p.value);
      }
      visitor.end_op();
    }
    visitor.fork_group(-1);
  }

  fn plan(&mut self, product: DeclId) -> Result<Planned, EvalError> {
    let mut planned = Planned {
      path: self.session.model.decl_path(product),
      ..Default::default()
    };
    let Some(inst) = self.session.product_inst(product) else {
      return Ok(planned);
    };
    let class = self.session.model.inst(inst).class;
    let b = &self.session.builtins;
    let (compiled, copy, lua, group) = (b.compiled, b.copy, b.lua_script, b.group);
    let model = &self.session.model;

    if model.isa(class, compiled) {
      self.plan_compiled(product, inst, &mut planned)?;
    } else if model.isa(class, copy) {
      self.plan_copy(product, inst, &mut planned);
    } else if model.isa(class, lua) {
      self.plan_lua(product, inst, &mut planned);
    } else if model.isa(class, group) {
      let mut exports = Exports::default();
      let mut generated = Vec::new();
      for dep in self.session.product_deps(product) {
        if let Some(e) = self.exports.get(&dep) {
          exports.extend(e);
        }
        generated.extend(self.generated.get(&dep).cloned().unwrap_or_default());
      }
      self.exports.insert(product, exports);
      self.generated.insert(product, generated);
    }
    Ok(planned)
  }

  /// Directory of build outputs for the module that created `inst`.
  fn module_build_dir(&self, inst: InstId) -> PathBuf {
    let module = self.session.model.inst(inst).module;
    let rdir = self
      .session
      .model
      .module(module)
      .map(|m| m.rdir.clone())
      .unwrap_or_default();
    normalize(&self.session.params.root_build_dir.join(rdir))
  }

  fn product_name(&self, product: DeclId, inst: InstId) -> String {
    match self.session.model.inst(inst).fields.get("name") {
      Some(Value::Str(name)) if !name.is_empty() => name.clone(),
      _ => self.session.model.decl(product).name.clone(),
    }
  }

  /// Own list field of `inst` with paths made absolute.
  fn own_paths(&self, inst: InstId, field: &str) -> Vec<PathBuf> {
    let instance = self.session.model.inst(inst);
    instance
      .fields
      .get(field)
      .map(Value::as_list)
      .unwrap_or(&[])
      .iter()
      .filter_map(|v| match v {
        Value::Path(p) => Some(self.session.model.resolve_path(instance.module, p)),
        _ => None,
      })
      .collect()
  }

  fn own_strings(&self, inst: InstId, field: &str) -> Vec<String> {
    self
      .session
      .model
      .inst(inst)
      .fields
      .get(field)
      .map(Value::as_list)
      .unwrap_or(&[])
      .iter()
      .filter_map(|v| v.as_text().map(str::to_string))
      .collect()
  }

  fn plan_compiled(&mut self, product: DeclId, inst: InstId, planned: &mut Planned) -> Result<(), EvalError> {
    let session = &*self.session;
    let class = session.model.inst(inst).class;
    let name = self.product_name(product, inst);
    let build_dir = self.module_build_dir(inst);
    let obj_dir = build_dir.join(format!("{}.objs", name));

    let deps = session.product_deps(product);
    let mut inherited = Exports::default();
    let mut generated = Vec::new();
    for dep in &deps {
      if let Some(e) = self.exports.get(dep) {
        inherited.extend(e);
      }
      generated.extend(self.generated.get(dep).cloned().unwrap_or_default());
    }

    let include_dirs = session.fetch_strings(inst, "include_dirs")?;
    let defines = session.fetch_strings(inst, "defines")?;
    let cflags = session.fetch_strings(inst, "cflags")?;
    let cflags_c = session.fetch_strings(inst, "cflags_c")?;
    let cflags_cc = session.fetch_strings(inst, "cflags_cc")?;
    let mode_flags = self.toolchain.mode_flags(session.params.build_mode);

    let mut sources = self.own_paths(inst, "sources");
    sources.extend(generated.iter().cloned());

    let mut objects = Vec::new();
    let mut stems: HashMap<String, usize> = HashMap::new();
    for source in &sources {
      let Some(lang) = Lang::of(source) else {
        continue;
      };
      let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
      let seen = stems.entry(stem.clone()).or_insert(0);
      let file = match *seen {
        0 => format!("{}.{}", stem, self.toolchain.object_ext()),
        n => format!("{}_{}.{}", stem, n, self.toolchain.object_ext()),
      };
      *seen += 1;
      let object = obj_dir.join(file).to_string_lossy().into_owned();

      let mut op = PlannedOp::new(
        OpKind::Compile,
        self.toolchain.compiler(lang, &self.tool_dir, &self.prefix),
      );
      op.param(ParamKind::InFile, source.to_string_lossy());
      op.param(ParamKind::OutFile, object.clone());
      op.params(ParamKind::CFlag, mode_flags.iter().copied());
      op.params(ParamKind::CFlag, cflags.iter().cloned());
      let lang_flags = if lang.is_c_family() { &cflags_c } else { &cflags_cc };
      op.params(ParamKind::CFlag, lang_flags.iter().cloned());
      op.params(ParamKind::Define, defines.iter().cloned());
      op.params(ParamKind::IncludeDir, include_dirs.iter().cloned());
      planned.first.push(op);
      objects.push(object);
    }

    self.session.model.inst_mut(inst).generated = generated;

    let b = &self.session.builtins;
    let model = &self.session.model;
    let kind = if model.isa(class, b.executable) {
      Some(OpKind::LinkExe)
    } else if model.isa(class, b.library) {
      match model.inst(inst).fields.get("lib_type") {
        Some(Value::Symbol(s)) if s == "shared" => Some(OpKind::LinkDll),
        _ => Some(OpKind::LinkLib),
      }
    } else {
      None
    };

    let Some(kind) = kind else {
      // A source set hands its objects to the products using it.
      let mut exports = Exports {
        objects,
        libs: Vec::new(),
      };
      exports.extend(&inherited);
      self.exports.insert(product, exports);
      return Ok(());
    };

    let artifact = build_dir.join(self.toolchain.artifact_name(kind, &name, &self.os));
    let artifact_text = artifact.to_string_lossy().into_owned();
    let mut inputs = objects;
    inputs.extend(inherited.objects.iter().cloned());
    if kind != OpKind::LinkLib {
      inputs.extend(inherited.libs.iter().cloned());
      inputs.extend(
        self
          .session
          .fetch_strings(inst, "lib_files")?
          .into_iter(),
      );
    }
    if inputs.is_empty() {
      let loc = self.session.model.decl(product).loc.clone();
      warn!(product = %planned.path, "nothing to link");
      self.session.log(LogLevel::Warning, Some(&loc), &format!("product '{}' has no inputs", name));
      self.exports.insert(product, Exports::default());
      return Ok(());
    }

    let mut op = PlannedOp::new(kind, self.toolchain.linker(kind, &self.tool_dir, &self.prefix));
    op.params(ParamKind::InFile, inputs);
    op.param(ParamKind::OutFile, artifact_text.clone());
    if kind != OpKind::LinkLib {
      op.params(ParamKind::LdFlag, self.session.fetch_strings(inst, "ldflags")?);
      op.params(ParamKind::LibDir, self.session.fetch_strings(inst, "lib_dirs")?);
      op.params(ParamKind::LibName, self.session.fetch_strings(inst, "lib_names")?);
    }
    planned.link.push(op);

    let exports = match kind {
      OpKind::LinkLib => {
        let mut libs = vec![artifact_text];
        libs.extend(inherited.libs);
        Exports {
          objects: Vec::new(),
          libs,
        }
      }
      OpKind::LinkDll => Exports {
        objects: Vec::new(),
        libs: vec![artifact_text],
      },
      _ => Exports::default(),
    };
    self.exports.insert(product, exports);
    self.artifacts.insert(product, artifact.clone());
    self.session.model.inst_mut(inst).artifact = Some(artifact);
    Ok(())
  }

  fn plan_copy(&mut self, product: DeclId, inst: InstId, planned: &mut Planned) {
    let build_dir = self.module_build_dir(inst);
    let sources = self.own_paths(inst, "sources");
    let outputs = self.own_strings(inst, "outputs");

    let mut pairs: Vec<(PathBuf, PathBuf)> = sources
      .into_iter()
      .enumerate()
      .map(|(i, src)| {
        let dst = match outputs.get(i) {
          Some(out) => normalize(&build_dir.join(out)),
          None => build_dir.join(file_name(&src)),
        };
        (src, dst)
      })
      .collect();

    let use_deps = self.own_strings(inst, "use_deps");
    let b = &self.session.builtins;
    for dep in self.session.product_deps(product) {
      let Some(artifact) = self.artifacts.get(&dep) else {
        continue;
      };
      let Some(dep_inst) = self.session.product_inst(dep) else {
        continue;
      };
      let dep_class = self.session.model.inst(dep_inst).class;
      let wanted = use_deps.iter().any(|u| {
        (u == "executable" && self.session.model.isa(dep_class, b.executable))
          || (u == "library" && self.session.model.isa(dep_class, b.library))
      });
      if wanted {
        pairs.push((artifact.clone(), build_dir.join(file_name(artifact))));
      }
    }

    for (src, dst) in pairs {
      // an artifact already built into this directory stays where it is
      if normalize(&src) == normalize(&dst) {
        debug!(file = %dst.display(), "copy onto itself skipped");
        continue;
      }
      let mut op = PlannedOp::new(OpKind::Copy, COPY_COMMAND);
      op.param(ParamKind::InFile, src.to_string_lossy());
      op.param(ParamKind::OutFile, dst.to_string_lossy());
      planned.first.push(op);
    }
  }

  fn plan_lua(&mut self, product: DeclId, inst: InstId, planned: &mut Planned) {
    let build_dir = self.module_build_dir(inst);
    let instance = self.session.model.inst(inst);
    let script = match instance.fields.get("script") {
      Some(Value::Path(p)) => self.session.model.resolve_path(instance.module, p),
      _ => {
        let loc = self.session.model.decl(product).loc.clone();
        self.session.log(LogLevel::Warning, Some(&loc), "LuaScript without script");
        return;
      }
    };
    let outputs: Vec<PathBuf> = self
      .own_strings(inst, "outputs")
      .iter()
      .map(|o| normalize(&build_dir.join(o)))
      .collect();

    let mut op = PlannedOp::new(OpKind::RunLua, script.to_string_lossy());
    op.param(ParamKind::InFile, script.to_string_lossy());
    op.params(ParamKind::Arg, self.own_strings(inst, "args"));
    op.params(ParamKind::OutFile, outputs.iter().map(|o| o.to_string_lossy().into_owned()));
    planned.first.push(op);

    let generated: Vec<PathBuf> = outputs.into_iter().filter(|o| Lang::of(o).is_some()).collect();
    self.session.model.inst_mut(inst).generated = generated.clone();
    self.generated.insert(product, generated);
  }
}

fn file_name(path: &Path) -> PathBuf {
  path.file_name().map(PathBuf::from).unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;
  use crate::engine::Engine;
  use crate::util::testutil::{build_dir, params, project};

  /// Visit a gcc/linux build of `files`.
  fn ops_of(files: &[(&str, &str)], targets: &[&str]) -> (TempDir, Vec<Operation>) {
    let dir = project(files);
    let mut p = params(dir.path());
    p.target.os = "linux".to_string();
    p.target.toolchain = "gcc".to_string();
    let mut engine = Engine::new();
    assert!(engine.parse(p, true), "parse failed: {:?}", engine.errors());
    let targets: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
    let mut collector = OpCollector::new();
    assert!(engine.visit(&mut collector, &targets), "visit failed: {:?}", engine.errors());
    (dir, collector.into_ops())
  }

  fn text(path: PathBuf) -> String {
    path.to_string_lossy().into_owned()
  }

  const LIB_AND_APP: &str = r#"
let lib : Library {
  .sources += [ ./lib/a.c ./lib/b.c ]
}
let app : Executable {
  .sources += ./main.cpp
  .deps += lib
}
"#;

  #[test]
  fn compiles_come_before_links_wave_by_wave() {
    let (_dir, ops) = ops_of(&[("BUSY", LIB_AND_APP)], &[]);
    let shape: Vec<(OpKind, u32)> = ops.iter().map(|o| (o.kind, o.group)).collect();
    assert_eq!(
      shape,
      vec![
        (OpKind::EnteringProduct, 1),
        (OpKind::Compile, 2),
        (OpKind::Compile, 2),
        (OpKind::LinkLib, 3),
        (OpKind::EnteringProduct, 4),
        (OpKind::Compile, 5),
        (OpKind::LinkExe, 6),
      ]
    );
    assert_eq!(ops[0].command, "lib");
    assert_eq!(ops[6].product, "app");
  }

  #[test]
  fn link_inputs_carry_objects_and_dependency_libraries() {
    let (dir, ops) = ops_of(&[("BUSY", LIB_AND_APP)], &[]);
    let out = build_dir(dir.path());

    let compile = &ops[1];
    assert_eq!(compile.command, "gcc");
    assert_eq!(compile.infiles().collect::<Vec<_>>(), vec![text(dir.path().join("lib/a.c"))]);
    assert_eq!(compile.outfile(), Some(text(out.join("lib.objs/a.o")).as_str()));
    assert!(compile.values(ParamKind::CFlag).any(|f| f == "-g"));

    let archive = &ops[3];
    assert_eq!(archive.command, "ar");
    assert_eq!(archive.outfile(), Some(text(out.join("liblib.a")).as_str()));

    let link = &ops[6];
    assert_eq!(link.command, "g++");
    assert_eq!(
      link.infiles().collect::<Vec<_>>(),
      vec![text(out.join("app.objs/main.o")), text(out.join("liblib.a"))]
    );
    assert_eq!(link.outfile(), Some(text(out.join("app")).as_str()));
  }

  #[test]
  fn sources_sharing_a_stem_get_distinct_objects() {
    let busy = "let lib : Library { .sources += [ ./a/x.c ./b/x.c ] }\n";
    let (dir, ops) = ops_of(&[("BUSY", busy)], &[]);
    let objects: Vec<&str> = ops
      .iter()
      .filter(|o| o.kind == OpKind::Compile)
      .filter_map(|o| o.outfile())
      .collect();
    let out = build_dir(dir.path()).join("lib.objs");
    assert_eq!(objects, vec![text(out.join("x.o")), text(out.join("x_1.o"))]);
  }

  #[test]
  fn source_sets_and_groups_forward_their_outputs() {
    let busy = r#"
let common : SourceSet { .sources += ./common.c }
let util : Library { .sources += ./util.c }
let all : Group { .deps += [ common util ] }
let app : Executable {
  .sources += ./main.c
  .deps += all
}
"#;
    let (dir, ops) = ops_of(&[("BUSY", busy)], &["app"]);
    let out = build_dir(dir.path());
    let link = ops.iter().find(|o| o.kind == OpKind::LinkExe).unwrap();
    let inputs: Vec<&str> = link.infiles().collect();
    assert!(inputs.contains(&text(out.join("common.objs/common.o")).as_str()), "{inputs:?}");
    assert!(inputs.contains(&text(out.join("libutil.a")).as_str()), "{inputs:?}");
  }

  #[test]
  fn shared_libraries_link_as_dll() {
    let busy = "let plug : Library { .sources += ./p.c\n .lib_type = `shared }\n";
    let (dir, ops) = ops_of(&[("BUSY", busy)], &[]);
    let link = ops.last().unwrap();
    assert_eq!(link.kind, OpKind::LinkDll);
    assert_eq!(link.outfile(), Some(text(build_dir(dir.path()).join("libplug.so")).as_str()));
  }

  #[test]
  fn generated_sources_are_compiled_by_dependents() {
    let busy = r#"
let gen : LuaScript {
  .script = ./gen.lua
  .args += "fast"
  .outputs = [ ./gen.c ./notes.txt ]
}
let app : Executable {
  .sources += ./main.c
  .deps += gen
}
"#;
    let (dir, ops) = ops_of(&[("BUSY", busy), ("gen.lua", "")], &["app"]);
    let out = build_dir(dir.path());

    let lua = ops.iter().find(|o| o.kind == OpKind::RunLua).unwrap();
    assert_eq!(lua.command, text(dir.path().join("gen.lua")));
    assert_eq!(lua.values(ParamKind::Arg).collect::<Vec<_>>(), vec!["fast"]);
    assert_eq!(
      lua.values(ParamKind::OutFile).collect::<Vec<_>>(),
      vec![text(out.join("gen.c")), text(out.join("notes.txt"))]
    );

    let compiled: Vec<&str> = ops
      .iter()
      .filter(|o| o.kind == OpKind::Compile)
      .flat_map(|o| o.infiles())
      .collect();
    assert_eq!(compiled, vec![text(dir.path().join("main.c")), text(out.join("gen.c"))]);
  }

  fn copies(ops: &[Operation]) -> Vec<(String, String)> {
    ops
      .iter()
      .filter(|o| o.kind == OpKind::Copy)
      .map(|o| {
        (
          o.infiles().next().unwrap_or_default().to_string(),
          o.outfile().unwrap_or_default().to_string(),
        )
      })
      .collect()
  }

  #[test]
  fn copy_products_copy_sources_and_dependency_artifacts() {
    let busy = r#"
let dist : Copy {
  .sources += ./readme.txt
  .outputs += ./docs/README
  .use_deps += `executable
  .deps += tools.app
}
"#;
    let root = format!("submod tools\n{}", busy);
    let (dir, ops) = ops_of(
      &[
        ("BUSY", root.as_str()),
        ("tools/BUSY", "let app* : Executable { .sources += ./main.c }\n"),
      ],
      &["dist"],
    );
    let out = build_dir(dir.path());
    assert_eq!(
      copies(&ops),
      vec![
        (text(dir.path().join("readme.txt")), text(out.join("docs/README"))),
        (text(out.join("tools/app")), text(out.join("app"))),
      ]
    );
    assert!(ops.iter().filter(|o| o.kind == OpKind::Copy).all(|o| o.command == COPY_COMMAND));
  }

  #[test]
  fn artifacts_in_the_copy_directory_are_not_copied_onto_themselves() {
    let busy = r#"
let app : Executable { .sources += ./main.c }
let dist : Copy {
  .use_deps += `executable
  .deps += app
}
"#;
    let (_dir, ops) = ops_of(&[("BUSY", busy)], &["dist"]);
    assert!(copies(&ops).is_empty(), "{:?}", copies(&ops));
    assert!(ops.iter().any(|o| o.kind == OpKind::LinkExe));
  }

  #[test]
  fn ops_of_one_wave_keep_their_own_product() {
    let busy = r#"
let a : Executable { .sources += ./a.c }
let b : Executable { .sources += ./b.c }
"#;
    let (dir, ops) = ops_of(&[("BUSY", busy)], &[]);
    let owner = |file: &str| {
      ops
        .iter()
        .find(|o| o.infiles().any(|i| i == text(dir.path().join(file))))
        .map(|o| o.product.clone())
    };
    assert_eq!(owner("a.c").as_deref(), Some("a"));
    assert_eq!(owner("b.c").as_deref(), Some("b"));
    let mut links: Vec<(&str, &str)> = ops
      .iter()
      .filter(|o| o.kind == OpKind::LinkExe)
      .map(|o| (o.product.as_str(), o.outfile().unwrap_or_default()))
      .collect();
    links.sort();
    let out = build_dir(dir.path());
    assert_eq!(links, vec![("a", text(out.join("a")).as_str()), ("b", text(out.join("b")).as_str())]);
  }

  #[test]
  fn inactive_products_emit_nothing() {
    let busy = r#"
let a : Executable { .sources += ./a.c }
let b : Executable { .sources += ./b.c }
"#;
    let (_dir, ops) = ops_of(&[("BUSY", busy)], &["b"]);
    assert!(ops.iter().all(|o| o.product == "b"));
    assert_eq!(ops.iter().filter(|o| o.kind == OpKind::Compile).count(), 1);
  }
}
