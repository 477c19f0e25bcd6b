//! Host platform detection.
//!
//! Supplies the default `host_*`/`target_*` parameters and validates the
//! names accepted for cpu, os and word width.

pub mod arch;
pub mod os;

use std::fmt;

pub use arch::Arch;
pub use os::Os;

/// Word widths accepted for `host_wordsize`/`target_wordsize`.
pub const WORD_WIDTHS: &[i64] = &[128, 64, 32, 16];

/// Host cpu and os.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
  pub arch: Arch,
  pub os: Os,
  pub wordsize: u32,
}

impl Platform {
  pub fn new(arch: Arch, os: Os, wordsize: u32) -> Self {
    Self { arch, os, wordsize }
  }

  /// Detect the current platform at runtime
  ///
  /// Returns `None` if the OS or architecture is not supported
  pub fn current() -> Option<Self> {
    Some(Self {
      arch: Arch::current()?,
      os: Os::current()?,
      wordsize: usize::BITS,
    })
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}-{}", self.arch, self.os, self.wordsize)
  }
}
