use std::fmt;
use std::str::FromStr;

/// Operating systems known to build descriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
  Freebsd,
  Linux,
  Macos,
  Unix,
  Win32,
}

impl Os {
  /// Detect the current operating system at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::Macos),
      "windows" => Some(Self::Win32),
      "freebsd" => Some(Self::Freebsd),
      "netbsd" | "openbsd" | "dragonfly" | "solaris" => Some(Self::Unix),
      _ => None,
    }
  }

  /// Returns the lowercase string identifier for this OS
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Freebsd => "freebsd",
      Self::Linux => "linux",
      Self::Macos => "macos",
      Self::Unix => "unix",
      Self::Win32 => "win32",
    }
  }

  /// Toolchain used when none is configured.
  pub fn default_toolchain(&self) -> &'static str {
    match self {
      Self::Win32 => "msvc",
      Self::Macos | Self::Freebsd => "clang",
      Self::Linux | Self::Unix => "gcc",
    }
  }
}

impl FromStr for Os {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "freebsd" => Ok(Self::Freebsd),
      "linux" => Ok(Self::Linux),
      "macos" => Ok(Self::Macos),
      "unix" => Ok(Self::Unix),
      "win32" => Ok(Self::Win32),
      other => Err(format!("operating system not supported: {}", other)),
    }
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
