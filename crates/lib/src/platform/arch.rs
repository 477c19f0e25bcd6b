use std::fmt;
use std::str::FromStr;

/// CPU families known to build descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  Arm,
  X86,
  Ia64,
  Mips,
  Ppc,
}

impl Arch {
  /// Detect the current CPU architecture at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86_64" | "x86" => Some(Self::X86),
      "aarch64" | "arm" => Some(Self::Arm),
      "mips" | "mips64" => Some(Self::Mips),
      "powerpc" | "powerpc64" => Some(Self::Ppc),
      _ => None,
    }
  }

  /// Returns the lowercase string identifier for this architecture
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Arm => "arm",
      Self::X86 => "x86",
      Self::Ia64 => "ia64",
      Self::Mips => "mips",
      Self::Ppc => "ppc",
    }
  }
}

impl FromStr for Arch {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "arm" => Ok(Self::Arm),
      "x86" => Ok(Self::X86),
      "ia64" => Ok(Self::Ia64),
      "mips" => Ok(Self::Mips),
      "ppc" => Ok(Self::Ppc),
      other => Err(format!("architecture not supported: {}", other)),
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn names_round_trip() {
    for arch in [Arch::Arm, Arch::X86, Arch::Ia64, Arch::Mips, Arch::Ppc] {
      assert_eq!(arch.as_str().parse::<Arch>(), Ok(arch));
    }
  }

  #[test]
  fn unknown_architecture_is_rejected() {
    assert!("sparc".parse::<Arch>().is_err());
  }
}
