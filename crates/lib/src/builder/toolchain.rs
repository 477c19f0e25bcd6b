//! Toolchain specific spelling of commands, flags and file names.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;

use super::ops::{OpKind, Operation, ParamKind};
use crate::engine::BuildMode;

/// Toolchains the builder knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Toolchain {
  Gcc,
  Clang,
  Msvc,
}

/// Source language, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
  C,
  Cpp,
  ObjC,
  ObjCpp,
}

impl Lang {
  pub fn of(path: &Path) -> Option<Self> {
    let ext = path.extension()?.to_str()?;
    match ext {
      "c" => Some(Lang::C),
      "cpp" | "cc" | "cxx" | "c++" | "C" => Some(Lang::Cpp),
      "m" => Some(Lang::ObjC),
      "mm" => Some(Lang::ObjCpp),
      _ => None,
    }
  }

  pub fn is_c_family(self) -> bool {
    matches!(self, Lang::C | Lang::ObjC)
  }
}

impl Toolchain {
  pub const ALL: [Toolchain; 3] = [Toolchain::Gcc, Toolchain::Clang, Toolchain::Msvc];

  pub fn as_str(&self) -> &'static str {
    match self {
      Toolchain::Gcc => "gcc",
      Toolchain::Clang => "clang",
      Toolchain::Msvc => "msvc",
    }
  }

  fn tool(&self, lang: Option<Lang>) -> &'static str {
    match (self, lang) {
      (Toolchain::Msvc, _) => "cl",
      (Toolchain::Gcc, Some(l)) if l.is_c_family() => "gcc",
      (Toolchain::Gcc, _) => "g++",
      (Toolchain::Clang, Some(l)) if l.is_c_family() => "clang",
      (Toolchain::Clang, _) => "clang++",
    }
  }

  /// Program that compiles sources of `lang`.
  pub fn compiler(&self, lang: Lang, dir: &Path, prefix: &str) -> String {
    qualify(self.tool(Some(lang)), dir, prefix)
  }

  /// Program that produces an artifact of `kind`.
  pub fn linker(&self, kind: OpKind, dir: &Path, prefix: &str) -> String {
    let tool = match (self, kind) {
      (Toolchain::Msvc, OpKind::LinkLib) => "lib",
      (Toolchain::Msvc, _) => "link",
      (_, OpKind::LinkLib) => "ar",
      _ => self.tool(None),
    };
    qualify(tool, dir, prefix)
  }

  pub fn object_ext(&self) -> &'static str {
    match self {
      Toolchain::Msvc => "obj",
      _ => "o",
    }
  }

  /// File name of a link artifact for `os`.
  pub fn artifact_name(&self, kind: OpKind, name: &str, os: &str) -> String {
    match kind {
      OpKind::LinkExe if os == "win32" => format!("{}.exe", name),
      OpKind::LinkLib if *self == Toolchain::Msvc => format!("{}.lib", name),
      OpKind::LinkLib => format!("lib{}.a", name),
      OpKind::LinkDll if os == "win32" => format!("{}.dll", name),
      OpKind::LinkDll if os == "macos" => format!("lib{}.dylib", name),
      OpKind::LinkDll => format!("lib{}.so", name),
      _ => name.to_string(),
    }
  }

  /// Flags implied by the build mode.
  pub fn mode_flags(&self, mode: BuildMode) -> &'static [&'static str] {
    match (self, mode) {
      (Toolchain::Msvc, BuildMode::Debug) => &["/Zi", "/Od"],
      (Toolchain::Msvc, BuildMode::Optimized) => &["/O2"],
      (_, BuildMode::Debug) => &["-g", "-O0"],
      (_, BuildMode::Optimized) => &["-O2"],
    }
  }

  /// Argument vector of an operation, `argv[0]` included.
  ///
  /// `None` for operations that run in process.
  pub fn command_line(&self, op: &Operation) -> Option<Vec<String>> {
    let mut argv = vec![op.command.clone()];
    let values = |kind: ParamKind| op.values(kind).map(str::to_string);
    let msvc = *self == Toolchain::Msvc;

    match op.kind {
      OpKind::Compile => {
        let input = op.infiles().next()?.to_string();
        let output = op.outfile()?.to_string();
        if msvc {
          argv.extend(["/nologo".to_string(), "/c".to_string()]);
          argv.extend(values(ParamKind::CFlag));
          argv.extend(op.values(ParamKind::Define).map(|d| format!("/D{}", d)));
          argv.extend(op.values(ParamKind::IncludeDir).map(|i| format!("/I{}", i)));
          argv.push(format!("/Fo{}", output));
          argv.push(input);
        } else {
          argv.push("-c".to_string());
          argv.extend(values(ParamKind::CFlag));
          argv.extend(op.values(ParamKind::Define).map(|d| format!("-D{}", d)));
          argv.extend(op.values(ParamKind::IncludeDir).map(|i| format!("-I{}", i)));
          argv.extend(["-o".to_string(), output, input]);
        }
      }
      OpKind::LinkLib => {
        let output = op.outfile()?.to_string();
        if msvc {
          argv.push("/nologo".to_string());
          argv.push(format!("/OUT:{}", output));
        } else {
          argv.extend(["rcs".to_string(), output]);
        }
        argv.extend(op.infiles().map(str::to_string));
      }
      OpKind::LinkExe | OpKind::LinkDll => {
        let output = op.outfile()?.to_string();
        let shared = op.kind == OpKind::LinkDll;
        if msvc {
          argv.push("/nologo".to_string());
          if shared {
            argv.push("/DLL".to_string());
          }
          argv.extend(values(ParamKind::LdFlag));
          argv.push(format!("/OUT:{}", output));
          argv.extend(op.infiles().map(str::to_string));
          argv.extend(op.values(ParamKind::LibDir).map(|d| format!("/LIBPATH:{}", d)));
          argv.extend(op.values(ParamKind::LibName).map(|n| format!("{}.lib", n)));
        } else {
          if shared {
            argv.push("-shared".to_string());
          }
          argv.extend(values(ParamKind::LdFlag));
          argv.extend(["-o".to_string(), output]);
          argv.extend(op.infiles().map(str::to_string));
          argv.extend(op.values(ParamKind::LibDir).map(|d| format!("-L{}", d)));
          argv.extend(op.values(ParamKind::LibName).map(|n| format!("-l{}", n)));
        }
      }
      OpKind::EnteringProduct | OpKind::RunLua | OpKind::Copy => return None,
    }
    Some(argv)
  }
}

fn qualify(tool: &str, dir: &Path, prefix: &str) -> String {
  let name = format!("{}{}", prefix, tool);
  if dir.as_os_str().is_empty() {
    name
  } else {
    dir.join(name).to_string_lossy().into_owned()
  }
}

impl FromStr for Toolchain {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "gcc" => Ok(Toolchain::Gcc),
      "clang" => Ok(Toolchain::Clang),
      "msvc" => Ok(Toolchain::Msvc),
      other => Err(format!("toolchain not supported: {}", other)),
    }
  }
}

impl fmt::Display for Toolchain {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
