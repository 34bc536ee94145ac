//! Platform detection for download source and archive layout selection

use once_cell::sync::OnceCell;

use crate::{MediaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Aarch64,
}

/// Host platform the managed tools are installed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs(Arch),
    Windows(Arch),
    Linux(Arch),
}

/// Global cache for platform detection (initialized once, used everywhere)
static PLATFORM_CACHE: OnceCell<Platform> = OnceCell::new();

impl Platform {
    /// Detect current platform (cached after first call)
    pub fn detect() -> Result<Self> {
        PLATFORM_CACHE
            .get_or_try_init(|| Self::from_parts(std::env::consts::OS, std::env::consts::ARCH))
            .copied()
    }

    /// Map an `(os, arch)` pair as reported by `std::env::consts`
    pub fn from_parts(os: &str, arch: &str) -> Result<Self> {
        let unsupported = || MediaError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        };
        let arch = match arch {
            "x86_64" => Arch::X86_64,
            "aarch64" => Arch::Aarch64,
            _ => return Err(unsupported()),
        };
        match os {
            "macos" => Ok(Platform::MacOs(arch)),
            "windows" => Ok(Platform::Windows(arch)),
            "linux" => Ok(Platform::Linux(arch)),
            _ => Err(unsupported()),
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Platform::Windows(_))
    }

    /// Executable file name for a logical binary on this platform
    pub fn executable_name(&self, stem: &str) -> String {
        if self.is_windows() {
            format!("{stem}.exe")
        } else {
            stem.to_string()
        }
    }
}

/// Executable file name for the platform this crate was compiled for
pub fn host_executable_name(stem: &str) -> String {
    if cfg!(windows) {
        format!("{stem}.exe")
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_pairs() {
        assert_eq!(
            Platform::from_parts("macos", "aarch64").unwrap(),
            Platform::MacOs(Arch::Aarch64)
        );
        assert_eq!(
            Platform::from_parts("linux", "x86_64").unwrap(),
            Platform::Linux(Arch::X86_64)
        );
        assert!(Platform::from_parts("freebsd", "x86_64").is_err());
        assert!(Platform::from_parts("linux", "riscv64").is_err());
    }

    #[test]
    fn windows_names_get_exe_suffix() {
        let win = Platform::Windows(Arch::X86_64);
        assert_eq!(win.executable_name("ffprobe"), "ffprobe.exe");
        assert_eq!(Platform::Linux(Arch::X86_64).executable_name("ffprobe"), "ffprobe");
    }
}
