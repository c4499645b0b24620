//! Host platform detection

use std::fmt;

/// Identifier of the host operating system
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlatformKey {
    Darwin,
    Linux,
    /// Any other OS, kept by name for diagnostics
    Other(String),
}

impl PlatformKey {
    /// Detect the platform this process is running on
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Map an OS identifier (`std::env::consts::OS` style) to a key
    pub fn from_os(os: &str) -> Self {
        match os {
            "macos" | "darwin" => PlatformKey::Darwin,
            "linux" => PlatformKey::Linux,
            other => PlatformKey::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PlatformKey::Darwin => "darwin",
            PlatformKey::Linux => "linux",
            PlatformKey::Other(name) => name,
        }
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
