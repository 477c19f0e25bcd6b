//! Project level API for host tools.
//!
//! A [`Project`] wraps an [`Engine`] with validated setup parameters and
//! offers [`Module`] and [`Product`] handles that borrow the engine.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::builder::{OpCollector, Operation, Toolchain};
use crate::diag::{CodeLocation, ErrorInfo, ErrorItem, LogLevel, Logger, TracingLogger};
use crate::engine::{BuildMode, Engine, ParseParams, PlatformParams, ProductFilter, Ref};
use crate::eval::BUSY_FILE_NAMES;
use crate::execute::{BuildJob, BuildOptions, CleanJob};
use crate::platform::{Arch, Os, WORD_WIDTHS};

/// Setup validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectError {
  #[error("toolchain not supported: {0}")]
  Toolchain(String),

  #[error("toolchain architecture not supported: {0}")]
  Arch(String),

  #[error("toolchain operating system not supported: {0}")]
  Os(String),

  #[error("toolchain word width not supported: {0}")]
  WordWidth(i64),

  #[error("no BUSY file found at {}", .0.display())]
  NoBusyFile(PathBuf),
}

/// Everything a host supplies to set up a project.
#[derive(Debug, Clone)]
pub struct SetupParams {
  /// `gcc`, `clang` or `msvc`.
  pub toolchain: String,
  /// Compiler executable; its directory and name prefix locate the other
  /// tools. Empty means the tools are on `PATH` without prefix.
  pub compiler_command: PathBuf,
  pub arch: String,
  pub os: String,
  pub word_width: i64,
  /// `debug`; anything else builds optimized.
  pub build_variant: String,
  pub build_dir: PathBuf,
  pub params: BTreeMap<String, String>,
  pub targets: Vec<String>,
  /// Environment of every build process.
  pub env: BTreeMap<String, String>,
}

impl Default for SetupParams {
  fn default() -> Self {
    let host = PlatformParams::default();
    Self {
      toolchain: host.toolchain,
      compiler_command: PathBuf::new(),
      arch: host.cpu,
      os: host.os,
      word_width: host.wordsize,
      build_variant: BuildMode::Debug.as_str().to_string(),
      build_dir: PathBuf::new(),
      params: BTreeMap::new(),
      targets: Vec::new(),
      env: BTreeMap::new(),
    }
  }
}

impl SetupParams {
  /// Validate and turn into the parameters of a parse rooted at `root`.
  pub fn to_parse_params(&self, root: &Path) -> Result<ParseParams, ProjectError> {
    let toolchain: Toolchain = self
      .toolchain
      .parse()
      .map_err(|_| ProjectError::Toolchain(self.toolchain.clone()))?;
    let arch: Arch = self.arch.parse().map_err(|_| ProjectError::Arch(self.arch.clone()))?;
    let os: Os = self.os.parse().map_err(|_| ProjectError::Os(self.os.clone()))?;
    if !WORD_WIDTHS.contains(&self.word_width) {
      return Err(ProjectError::WordWidth(self.word_width));
    }

    let (toolchain_path, toolchain_prefix) = split_compiler(&self.compiler_command, toolchain);
    let target = PlatformParams {
      cpu: arch.as_str().to_string(),
      os: os.as_str().to_string(),
      wordsize: self.word_width,
      toolchain: toolchain.as_str().to_string(),
      toolchain_path,
      toolchain_prefix,
      ..PlatformParams::default()
    };
    let build_dir = if self.build_dir.as_os_str().is_empty() {
      root.join("output")
    } else {
      self.build_dir.clone()
    };

    let mut params = ParseParams::new(root, build_dir);
    params.build_mode = if self.build_variant == "debug" {
      BuildMode::Debug
    } else {
      BuildMode::Optimized
    };
    params.target = target;
    params.params = self.params.clone();
    params.targets = self.targets.clone();
    Ok(params)
  }
}

/// Directory and name prefix of a compiler executable, e.g.
/// `/opt/bin/arm-none-eabi-gcc` gives `(/opt/bin, arm-none-eabi-)`.
fn split_compiler(compiler: &Path, toolchain: Toolchain) -> (PathBuf, String) {
  if compiler.as_os_str().is_empty() {
    return (PathBuf::new(), String::new());
  }
  let dir = compiler.parent().map(Path::to_path_buf).unwrap_or_default();
  let file = compiler
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  let stem = file.strip_suffix(".exe").unwrap_or(&file);
  let tool = match toolchain {
    Toolchain::Gcc => ["g++", "gcc"].iter().find(|t| stem.ends_with(*t)),
    Toolchain::Clang => ["clang++", "clang"].iter().find(|t| stem.ends_with(*t)),
    Toolchain::Msvc => ["cl"].iter().find(|t| stem.ends_with(*t)),
  };
  let prefix = match tool {
    Some(tool) => &stem[..stem.len() - tool.len()],
    None => stem,
  };
  (dir, prefix.to_string())
}

/// Receives the log events of a parse.
pub trait LogSink {
  /// Events below this level are not printed.
  fn level(&self) -> LogLevel {
    LogLevel::Info
  }

  fn print_warning(&mut self, warning: &ErrorInfo);

  /// `tag` is the level prefix, e.g. `ERROR: `.
  fn print_message(&mut self, level: LogLevel, msg: &str, tag: &str);
}

/// Forwards evaluator events to `tracing` and to the host's sink.
struct SinkLogger {
  sink: Box<dyn LogSink>,
}

impl Logger for SinkLogger {
  fn log(&mut self, level: LogLevel, loc: Option<&CodeLocation>, msg: &str) {
    TracingLogger.log(level, loc, msg);
    if level < self.sink.level() {
      return;
    }
    if level == LogLevel::Warning {
      let mut warning = ErrorInfo::default();
      warning.push(ErrorItem::new(loc.cloned(), msg));
      self.sink.print_warning(&warning);
    } else {
      let text = match loc {
        Some(loc) => format!("{} {}", loc, msg),
        None => msg.to_string(),
      };
      self.sink.print_message(level, &text, level.tag());
    }
  }
}

pub struct Project {
  dir: PathBuf,
  engine: Engine,
  errors: ErrorInfo,
  env: BTreeMap<String, String>,
  targets: Vec<String>,
}

impl Project {
  /// A project rooted at `path`, a directory or its `BUSY` file.
  pub fn new(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
    let path = path.as_ref();
    let dir = if path.is_file() {
      let named = path
        .file_name()
        .is_some_and(|n| BUSY_FILE_NAMES.iter().any(|b| n == *b));
      match path.parent() {
        Some(parent) if named => parent.to_path_buf(),
        _ => return Err(ProjectError::NoBusyFile(path.to_path_buf())),
      }
    } else {
      path.to_path_buf()
    };
    if !BUSY_FILE_NAMES.iter().any(|name| dir.join(name).is_file()) {
      return Err(ProjectError::NoBusyFile(dir));
    }
    let dir = dunce::canonicalize(&dir).unwrap_or(dir);
    Ok(Self {
      dir,
      engine: Engine::new(),
      errors: ErrorInfo::default(),
      env: BTreeMap::new(),
      targets: Vec::new(),
    })
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn engine(&self) -> &Engine {
    &self.engine
  }

  /// Validate `setup` and evaluate the project.
  pub fn parse(&mut self, setup: &SetupParams, sink: Option<Box<dyn LogSink>>) -> bool {
    self.errors = ErrorInfo::default();
    let params = match setup.to_parse_params(&self.dir) {
      Ok(params) => params,
      Err(e) => {
        self.errors.push(ErrorItem::new(None, e.to_string()));
        return false;
      }
    };
    if let Some(sink) = sink {
      self.engine.set_logger(Box::new(SinkLogger { sink }));
    }
    self.env = setup.env.clone();
    self.targets = setup.targets.clone();
    info!(dir = %self.dir.display(), toolchain = %setup.toolchain, "parsing project");
    self.engine.parse(params, true)
  }

  /// Setup errors and the errors of the last parse or visit.
  pub fn errors(&self) -> ErrorInfo {
    let mut all = self.errors.clone();
    for item in self.engine.errors() {
      all.push(item);
    }
    all
  }

  pub fn top_module(&self) -> Option<Module<'_>> {
    Module::new(&self.engine, self.engine.root_module())
  }

  /// Products of every module, submodules before their parent.
  pub fn all_products(&self, filter: ProductFilter, only_actives: bool) -> Vec<Product<'_>> {
    let mut refs = Vec::new();
    walk_products(&self.engine, self.engine.root_module(), filter, only_actives, &mut refs);
    refs.into_iter().filter_map(|r| Product::new(&self.engine, r)).collect()
  }

  /// Every build description file of the module tree.
  pub fn build_system_files(&self) -> BTreeSet<PathBuf> {
    let mut files = BTreeSet::new();
    if let Some(top) = self.top_module() {
      walk_modules(&top, &mut files);
    }
    files
  }

  /// Sources of all compiled products, optionally with their headers.
  pub fn all_sources(&self, only_actives: bool, add_headers: bool) -> BTreeSet<PathBuf> {
    self
      .all_products(ProductFilter::Compiled, only_actives)
      .iter()
      .flat_map(|p| p.all_file_paths(add_headers, false))
      .collect()
  }

  /// Prepare a build of the configured targets.
  pub fn build(&mut self, options: &BuildOptions) -> BuildJob {
    let mut options = options.clone();
    for (key, value) in &self.env {
      options.env.entry(key.clone()).or_insert_with(|| value.clone());
    }
    BuildJob::new(&mut self.engine, options, &self.targets)
  }

  pub fn clean(&mut self) -> CleanJob {
    CleanJob::new(&mut self.engine, &self.targets)
  }

  /// The operation list of the configured targets, without running it.
  ///
  /// `None` if the visit failed; [`errors`](Self::errors) says why.
  pub fn operations(&mut self) -> Option<Vec<Operation>> {
    let mut collector = OpCollector::new();
    if !self.engine.visit(&mut collector, &self.targets) {
      return None;
    }
    Some(collector.into_ops())
  }

  /// Add `paths` to the sources of `product` by editing its build file.
  ///
  /// A `.sources += ...` statement is inserted before the closing brace of
  /// the product's body. The project must be parsed again to see it.
  pub fn add_files(&self, product: &Product<'_>, paths: &[PathBuf]) -> ErrorInfo {
    let mut info = ErrorInfo::default();
    let Some(end) = product.end_location() else {
      info.push(ErrorItem::new(product.location(), "product has no body to add files to"));
      return info;
    };
    if let Err(msg) = insert_sources(&end, paths) {
      info.push(ErrorItem::new(Some(end), msg));
    }
    info
  }
}

fn walk_products(engine: &Engine, module: Ref, filter: ProductFilter, only_actives: bool, out: &mut Vec<Ref>) {
  for sub in engine.sub_modules(module) {
    walk_products(engine, sub, filter, only_actives, out);
  }
  out.extend(engine.all_products(module, filter, only_actives));
}

fn walk_modules(module: &Module<'_>, files: &mut BTreeSet<PathBuf>) {
  if let Some(file) = module.busy_file() {
    files.insert(file);
  }
  for sub in module.sub_modules() {
    walk_modules(&sub, files);
  }
}

fn insert_sources(end: &CodeLocation, paths: &[PathBuf]) -> Result<(), String> {
  let text = fs::read_to_string(&end.file).map_err(|e| format!("cannot open BUSY file for reading: {}", e))?;
  let module_dir = end.file.parent().unwrap_or(Path::new(""));
  let offset = byte_offset(&text, end.row, end.col).ok_or("end of product is outside of the file")?;

  let indent = " ".repeat(end.col.saturating_sub(1) as usize);
  let mut statement = String::from("  .sources += ");
  match paths {
    [single] => statement.push_str(&path_literal(module_dir, single)),
    many => {
      statement.push_str("[\n");
      for path in many {
        statement.push_str(&format!("{}    {}\n", indent, path_literal(module_dir, path)));
      }
      statement.push_str(&format!("{}  ]", indent));
    }
  }
  statement.push('\n');
  statement.push_str(&indent);

  let mut edited = text;
  edited.insert_str(offset, &statement);

  let write = || -> std::io::Result<()> {
    let mut tmp = NamedTempFile::new_in(module_dir)?;
    tmp.write_all(edited.as_bytes())?;
    tmp.persist(&end.file).map_err(|e| e.error)?;
    Ok(())
  };
  write().map_err(|e| format!("cannot open BUSY file for writing: {}", e))?;
  debug!(file = %end.file.display(), files = paths.len(), "added sources");
  Ok(())
}

/// Byte offset of the 1-based `row`/`col` character position.
fn byte_offset(text: &str, row: u32, col: u32) -> Option<usize> {
  let mut start = 0;
  for (i, line) in text.split_inclusive('\n').enumerate() {
    if i + 1 == row as usize {
      let col = col.max(1) as usize - 1;
      return line.char_indices().nth(col).map(|(idx, _)| start + idx);
    }
    start += line.len();
  }
  None
}

/// `path` as a path literal relative to `dir` where possible.
fn path_literal(dir: &Path, path: &Path) -> String {
  let text = match path.strip_prefix(dir) {
    Ok(rel) => format!("./{}", rel.to_string_lossy().replace('\\', "/")),
    Err(_) => {
      let abs = path.to_string_lossy().replace('\\', "/");
      format!("/{}", abs.trim_start_matches('/')).replacen('/', "//", 1)
    }
  };
  if text.chars().any(|c| c.is_whitespace() || ")]},;'".contains(c)) {
    format!("'{}'", text.replace('\'', "\\'"))
  } else {
    text
  }
}

/// Companion headers of C family sources: the first existing of
/// `x.h .hh .hpp .h++ .hp .hxx`, and `x_p.h` if present.
pub fn find_headers(files: &[PathBuf]) -> Vec<PathBuf> {
  const SOURCE_EXTS: &[&str] = &["cpp", "c", "cc", "c++", "cxx", "m", "mm"];
  const HEADER_EXTS: &[&str] = &["h", "hh", "hpp", "h++", "hp", "hxx"];

  let mut headers = Vec::new();
  for file in files {
    let is_source = file
      .extension()
      .and_then(|e| e.to_str())
      .is_some_and(|e| SOURCE_EXTS.contains(&e));
    if !is_source {
      continue;
    }
    if let Some(header) = HEADER_EXTS
      .iter()
      .map(|ext| file.with_extension(ext))
      .find(|h| h.is_file())
    {
      headers.push(header);
    }
    let Some(stem) = file.file_stem() else {
      continue;
    };
    let private = file.with_file_name(format!("{}_p.h", stem.to_string_lossy()));
    if private.is_file() {
      headers.push(private);
    }
  }
  headers
}

/// A module of a parsed project.
#[derive(Clone, Copy)]
pub struct Module<'a> {
  engine: &'a Engine,
  r: Ref,
}

impl<'a> Module<'a> {
  fn new(engine: &'a Engine, r: Ref) -> Option<Self> {
    r.is_valid().then_some(Self { engine, r })
  }

  pub fn r(&self) -> Ref {
    self.r
  }

  pub fn name(&self) -> String {
    self.engine.get_string(self.r, "#name")
  }

  pub fn location(&self) -> Option<CodeLocation> {
    self.engine.get_location(self.r)
  }

  pub fn busy_file(&self) -> Option<PathBuf> {
    let file = self.engine.get_path(self.r, "#file");
    (!file.as_os_str().is_empty()).then_some(file)
  }

  pub fn build_directory(&self) -> PathBuf {
    let root = self.engine.get_path(self.engine.get_globals(), "root_build_dir");
    root.join(self.engine.get_string(self.r, "#rdir"))
  }

  pub fn sub_modules(&self) -> Vec<Module<'a>> {
    self
      .engine
      .sub_modules(self.r)
      .into_iter()
      .filter_map(|r| Module::new(self.engine, r))
      .collect()
  }

  pub fn products(&self, with_sources_only: bool) -> Vec<Product<'a>> {
    let filter = if with_sources_only {
      ProductFilter::WithSources
    } else {
      ProductFilter::AllProducts
    };
    self
      .engine
      .all_products(self.r, filter, false)
      .into_iter()
      .filter_map(|r| Product::new(self.engine, r))
      .collect()
  }
}

/// Include paths and defines of a compiled product.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildConfig {
  pub include_paths: Vec<PathBuf>,
  pub defines: Vec<String>,
}

/// A product of a parsed project.
#[derive(Clone, Copy)]
pub struct Product<'a> {
  engine: &'a Engine,
  r: Ref,
}

impl<'a> Product<'a> {
  fn new(engine: &'a Engine, r: Ref) -> Option<Self> {
    r.is_valid().then_some(Self { engine, r })
  }

  pub fn r(&self) -> Ref {
    self.r
  }

  /// The `name` field if set, else the declaration name.
  pub fn name(&self) -> String {
    let name = self.engine.get_string(self.r, "name");
    if name.is_empty() {
      self.engine.get_string(self.r, "#name")
    } else {
      name
    }
  }

  pub fn qualident(&self) -> String {
    self.engine.get_decl_path(self.r)
  }

  pub fn location(&self) -> Option<CodeLocation> {
    self.engine.get_location(self.r)
  }

  pub fn end_location(&self) -> Option<CodeLocation> {
    self.engine.get_end_location(self.r)
  }

  pub fn is_enabled(&self) -> bool {
    self.engine.is_active(self.r)
  }

  pub fn is_runnable(&self) -> bool {
    self.engine.is_executable(self.r)
  }

  pub fn is_compiled(&self) -> bool {
    self.engine.is_compiled(self.r)
  }

  pub fn all_file_paths(&self, add_headers: bool, add_generated: bool) -> Vec<PathBuf> {
    let sources = self.engine.all_sources(self.r, add_generated);
    if add_headers {
      let mut files = find_headers(&sources);
      files.extend(sources);
      files
    } else {
      sources
    }
  }

  pub fn build_config(&self) -> BuildConfig {
    BuildConfig {
      include_paths: self.engine.include_paths(self.r),
      defines: self.engine.defines(self.r),
    }
  }

  /// Path of the built artifact. Before a build it is only known with
  /// `synth`, as `<root_build_dir>/<module rdir>/<name>`.
  pub fn executable(&self, synth: bool) -> Option<PathBuf> {
    let built = self.engine.get_path(self.r, "#product");
    if !built.as_os_str().is_empty() {
      return Some(built);
    }
    if !synth {
      return None;
    }
    let root = self.engine.get_path(self.engine.get_globals(), "root_build_dir");
    let module = self.engine.get_owning_module(self.r);
    Some(root.join(self.engine.get_string(module, "#rdir")).join(self.name()))
  }
}
