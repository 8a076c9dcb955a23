//! Identification of the platform the crate was compiled for.

use std::fmt;

/// Number of hex digits needed to print one machine word.
pub const WORD_HEX_WIDTH: usize = 2 * size_of::<usize>();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    MacOs,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86,
    X86_64,
    Aarch64,
    Other,
}

/// An (operating system, architecture) pair, the key of the register strategy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Os {
    pub const fn current() -> Self {
        if cfg!(target_os = "linux") {
            Os::Linux
        } else if cfg!(target_os = "macos") {
            Os::MacOs
        } else {
            Os::Other
        }
    }
}

impl Arch {
    pub const fn current() -> Self {
        if cfg!(target_arch = "x86_64") {
            Arch::X86_64
        } else if cfg!(target_arch = "x86") {
            Arch::X86
        } else if cfg!(target_arch = "aarch64") {
            Arch::Aarch64
        } else {
            Arch::Other
        }
    }
}

impl Platform {
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// The platform this binary targets.
    pub const fn current() -> Self {
        Self::new(Os::current(), Arch::current())
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Os::Linux => "linux",
            Os::MacOs => "macos",
            Os::Other => "unknown-os",
        })
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
            Arch::Other => "unknown-arch",
        })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_width_matches_pointer_size() {
        assert_eq!(WORD_HEX_WIDTH, size_of::<*const u8>() * 2);
    }

    #[test]
    fn current_platform_is_detected() {
        let platform = Platform::current();
        #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
        assert_eq!(platform, Platform::new(Os::Linux, Arch::X86_64));
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        assert_eq!(platform, Platform::new(Os::MacOs, Arch::Aarch64));
        assert!(!platform.to_string().is_empty());
    }

    #[test]
    fn display_joins_os_and_arch() {
        assert_eq!(
            Platform::new(Os::Linux, Arch::Aarch64).to_string(),
            "linux-aarch64"
        );
    }
}
