//! Library entries and their resolved on-disk form.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::rules::{rules_allow, Rule};
use crate::paths::Layout;
use crate::platform::Platform;

/// Extraction settings for native libraries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractRules {
    /// Archive path prefixes to skip (e.g. `META-INF/`).
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// A library entry as it appears in a module manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    /// Maven-style coordinates, `group:artifact:version`.
    pub name: String,
    /// Repository base overriding the launcher default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// OS name to classifier; `${arch}` is replaced by the pointer width.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub natives: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractRules>,
}

impl Library {
    /// Splits the coordinates into `(group, artifact, version)`.
    pub fn coordinates(&self) -> Option<(&str, &str, &str)> {
        let mut parts = self.name.split(':');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(group), Some(artifact), Some(version), None)
                if !group.is_empty() && !artifact.is_empty() && !version.is_empty() =>
            {
                Some((group, artifact, version))
            }
            _ => None,
        }
    }

    /// Native classifier for the platform, if this library ships natives for it.
    pub fn native_classifier(&self, platform: &Platform) -> Option<String> {
        self.natives
            .get(platform.os.as_str())
            .map(|classifier| classifier.replace("${arch}", platform.arch_bits))
    }

    /// Whether the library must be present on this platform.
    pub fn applies_to(&self, platform: &Platform) -> bool {
        if !rules_allow(&self.rules, platform) {
            return false;
        }
        self.natives.is_empty() || self.native_classifier(platform).is_some()
    }

    /// Path of the library file relative to the library root.
    ///
    /// Returns `None` for malformed coordinates.
    pub fn relative_path(&self, platform: &Platform) -> Option<PathBuf> {
        let (group, artifact, version) = self.coordinates()?;
        let file_name = match self.native_classifier(platform) {
            Some(classifier) => format!("{}-{}-{}.jar", artifact, version, classifier),
            None => format!("{}-{}.jar", artifact, version),
        };

        let mut path: PathBuf = group.split('.').collect();
        path.push(artifact);
        path.push(version);
        path.push(file_name);
        Some(path)
    }

    /// Resolves the library against a layout and platform.
    pub fn resolve(&self, layout: &Layout, platform: &Platform) -> Option<Dependency> {
        let relative = self.relative_path(platform)?;
        let base = self
            .url
            .as_deref()
            .map(|url| {
                if url.ends_with('/') {
                    url.to_string()
                } else {
                    format!("{}/", url)
                }
            })
            .unwrap_or_else(|| layout.libraries_base().to_string());
        let url_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let local_path = layout.libraries_dir().join(&relative);
        let extraction_dir = local_path.with_extension("");
        let extraction_staging_dir = layout.extract_temp_dir().join(&relative).with_extension("");
        let excludes = self
            .extract
            .as_ref()
            .map(|rules| rules.exclude.clone())
            .unwrap_or_default();

        Some(Dependency {
            key: self.name.clone(),
            remote_url: format!("{}{}", base, url_path),
            temp_path: layout.libraries_temp_dir().join(&relative),
            local_path,
            applies_to_platform: self.applies_to(platform),
            requires_extraction: self.extract.is_some(),
            extraction_dir,
            extraction_staging_dir,
            extract_excludes: excludes,
        })
    }
}

/// A library resolved to concrete paths for one layout and platform.
///
/// Two dependencies are the same file when their local paths are equal,
/// regardless of which manifest they came from.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub key: String,
    pub remote_url: String,
    pub local_path: PathBuf,
    pub temp_path: PathBuf,
    pub applies_to_platform: bool,
    pub requires_extraction: bool,
    /// Native extraction output, next to the library file.
    pub extraction_dir: PathBuf,
    /// Scratch directory the archive is unpacked into before it replaces
    /// `extraction_dir`.
    pub extraction_staging_dir: PathBuf,
    pub extract_excludes: Vec<String>,
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        self.local_path == other.local_path
    }
}

impl Eq for Dependency {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::platform::OsFamily;

    fn layout() -> Layout {
        Layout::from_settings(&Settings {
            game_dir: PathBuf::from("/g"),
            temp_dir: PathBuf::from("/t"),
            download_base: "https://dl.example/".to_string(),
            libraries_base: "https://libs.example/".to_string(),
            download_concurrency: 1,
        })
    }

    fn library(json: &str) -> Library {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_coordinates() {
        let lib = library(r#"{"name": "net.sf.jopt-simple:jopt-simple:4.5"}"#);
        assert_eq!(
            lib.coordinates(),
            Some(("net.sf.jopt-simple", "jopt-simple", "4.5"))
        );

        assert!(library(r#"{"name": "broken"}"#).coordinates().is_none());
        assert!(library(r#"{"name": "a:b:c:d"}"#).coordinates().is_none());
        assert!(library(r#"{"name": "a::c"}"#).coordinates().is_none());
    }

    #[test]
    fn test_plain_library_resolves() {
        let lib = library(r#"{"name": "net.sf.jopt-simple:jopt-simple:4.5"}"#);
        let linux = Platform::new(OsFamily::Linux, "64");
        let dep = lib.resolve(&layout(), &linux).unwrap();

        assert_eq!(
            dep.local_path,
            PathBuf::from("/g/libraries/net/sf/jopt-simple/jopt-simple/4.5/jopt-simple-4.5.jar")
        );
        assert_eq!(
            dep.temp_path,
            PathBuf::from("/t/libraries/net/sf/jopt-simple/jopt-simple/4.5/jopt-simple-4.5.jar")
        );
        assert_eq!(
            dep.remote_url,
            "https://libs.example/net/sf/jopt-simple/jopt-simple/4.5/jopt-simple-4.5.jar"
        );
        assert!(dep.applies_to_platform);
        assert!(!dep.requires_extraction);
    }

    #[test]
    fn test_native_library_resolves_with_classifier() {
        let lib = library(
            r#"{
                "name": "org.lwjgl.lwjgl:lwjgl-platform:2.9.0",
                "url": "https://mirror.example/maven",
                "natives": {"linux": "natives-linux", "windows": "natives-windows-${arch}"},
                "extract": {"exclude": ["META-INF/"]}
            }"#,
        );

        let windows = Platform::new(OsFamily::Windows, "32");
        let dep = lib.resolve(&layout(), &windows).unwrap();
        assert!(dep
            .local_path
            .ends_with("lwjgl-platform/2.9.0/lwjgl-platform-2.9.0-natives-windows-32.jar"));
        assert_eq!(
            dep.extraction_dir,
            PathBuf::from(
                "/g/libraries/org/lwjgl/lwjgl/lwjgl-platform/2.9.0/lwjgl-platform-2.9.0-natives-windows-32"
            )
        );
        assert!(dep.extraction_staging_dir.starts_with("/t/extract"));
        assert!(dep.remote_url.starts_with("https://mirror.example/maven/org/lwjgl/"));
        assert!(dep.requires_extraction);
        assert_eq!(dep.extract_excludes, vec!["META-INF/".to_string()]);

        let osx = Platform::new(OsFamily::Osx, "64");
        assert!(!lib.applies_to(&osx));
    }

    #[test]
    fn test_rules_gate_applicability() {
        let lib = library(
            r#"{
                "name": "tv.twitch:twitch:5.16",
                "rules": [{"action": "allow"}, {"action": "disallow", "os": {"name": "linux"}}]
            }"#,
        );
        assert!(!lib.applies_to(&Platform::new(OsFamily::Linux, "64")));
        assert!(lib.applies_to(&Platform::new(OsFamily::Windows, "64")));

        let dep = lib
            .resolve(&layout(), &Platform::new(OsFamily::Linux, "64"))
            .unwrap();
        assert!(!dep.applies_to_platform);
    }

    #[test]
    fn test_dependency_equality_is_by_local_path() {
        let linux = Platform::new(OsFamily::Linux, "64");
        let a = library(r#"{"name": "x:lib-x:1"}"#)
            .resolve(&layout(), &linux)
            .unwrap();
        let b = library(r#"{"name": "x:lib-x:1", "url": "https://other.example/"}"#)
            .resolve(&layout(), &linux)
            .unwrap();

        assert_ne!(a.remote_url, b.remote_url);
        assert_eq!(a, b);
    }
}
