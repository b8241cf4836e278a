//! Platform detection for library rules and native classifiers.
//!
//! Module manifests describe libraries with OS rules (`"os": {"name": "osx"}`)
//! and native classifiers keyed by OS name. This module resolves the values
//! those rules are matched against.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// OS Family
// ============================================================================

/// Operating system family, named the way manifests name them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Windows,
    Osx,
    Linux,
}

impl OsFamily {
    /// Returns the manifest identifier for this OS family.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Osx => "osx",
            Self::Linux => "linux",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OsFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "windows" => Ok(Self::Windows),
            "osx" | "macos" => Ok(Self::Osx),
            "linux" => Ok(Self::Linux),
            _ => Err(format!("Unknown OS family: {}", s)),
        }
    }
}

// ============================================================================
// Platform
// ============================================================================

/// The platform manifests are evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    /// OS family.
    pub os: OsFamily,
    /// Pointer width as used in native classifiers (`"32"` or `"64"`).
    pub arch_bits: &'static str,
    /// OS version string, when known. Version-restricted rules only match
    /// when this is set.
    pub os_version: Option<String>,
}

impl Platform {
    /// Creates a platform description with no OS version.
    pub fn new(os: OsFamily, arch_bits: &'static str) -> Self {
        Self {
            os,
            arch_bits,
            os_version: None,
        }
    }

    /// Sets the OS version used by version-restricted rules.
    pub fn with_os_version(mut self, version: impl Into<String>) -> Self {
        self.os_version = Some(version.into());
        self
    }

    /// Detects the current platform at compile time.
    ///
    /// Returns `None` if the OS is not one manifests know about.
    pub fn detect() -> Option<Self> {
        #[cfg(target_os = "windows")]
        let os = Some(OsFamily::Windows);
        #[cfg(target_os = "macos")]
        let os = Some(OsFamily::Osx);
        #[cfg(target_os = "linux")]
        let os = Some(OsFamily::Linux);
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        let os: Option<OsFamily> = None;

        #[cfg(target_pointer_width = "64")]
        let arch_bits = "64";
        #[cfg(not(target_pointer_width = "64"))]
        let arch_bits = "32";

        os.map(|os| Self::new(os, arch_bits))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.os_version {
            Some(version) => write!(f, "{} {} ({}-bit)", self.os, version, self.arch_bits),
            None => write!(f, "{} ({}-bit)", self.os, self.arch_bits),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_family_from_str() {
        assert_eq!("linux".parse::<OsFamily>().unwrap(), OsFamily::Linux);
        assert_eq!("OSX".parse::<OsFamily>().unwrap(), OsFamily::Osx);
        assert_eq!("macos".parse::<OsFamily>().unwrap(), OsFamily::Osx);
        assert_eq!("windows".parse::<OsFamily>().unwrap(), OsFamily::Windows);
        assert!("beos".parse::<OsFamily>().is_err());
    }

    #[test]
    fn test_os_family_serde_names() {
        let json = serde_json::to_string(&OsFamily::Osx).unwrap();
        assert_eq!(json, "\"osx\"");
        let parsed: OsFamily = serde_json::from_str("\"windows\"").unwrap();
        assert_eq!(parsed, OsFamily::Windows);
    }

    #[test]
    fn test_platform_detect() {
        let platform = Platform::detect();
        #[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
        {
            let platform = platform.expect("supported OS should be detected");
            assert!(platform.arch_bits == "32" || platform.arch_bits == "64");
            assert!(platform.os_version.is_none());
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        assert!(platform.is_none());
    }

    #[test]
    fn test_platform_display() {
        let platform = Platform::new(OsFamily::Linux, "64");
        assert_eq!(platform.to_string(), "linux (64-bit)");

        let platform = Platform::new(OsFamily::Osx, "64").with_os_version("10.5.8");
        assert_eq!(platform.to_string(), "osx 10.5.8 (64-bit)");
    }
}
