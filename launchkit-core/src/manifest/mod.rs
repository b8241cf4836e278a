//! Module manifests.
//!
//! A manifest is the JSON document describing one module: its entry class,
//! runtime arguments, the libraries it needs and the platforms it runs on.
//! The parsed form keeps the original document so it can be persisted back
//! unchanged apart from formatting.

mod library;
mod rules;

pub use library::{Dependency, ExtractRules, Library};
pub use rules::{rules_allow, OsRule, Rule, RuleAction};

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ModuleError;
use crate::paths::Layout;
use crate::platform::Platform;

/// Fields read from the manifest document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    #[serde(default)]
    id: Option<String>,
    main_class: String,
    #[serde(default)]
    minecraft_arguments: Option<String>,
    #[serde(default)]
    arguments: Option<Value>,
    #[serde(default)]
    libraries: Vec<Library>,
    #[serde(default)]
    compatibility_rules: Vec<Rule>,
    #[serde(default)]
    incompatibility_reason: Option<String>,
    #[serde(default)]
    release_time: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// A parsed, immutable module manifest.
#[derive(Debug, Clone)]
pub struct ModuleManifest {
    pub id: Option<String>,
    pub main_class: String,
    pub arguments: Vec<String>,
    pub libraries: Vec<Library>,
    pub compatibility_rules: Vec<Rule>,
    pub incompatibility_reason: Option<String>,
    pub release_time: Option<String>,
    /// Release channel tag (`release`, `snapshot`, ...).
    pub kind: Option<String>,
    document: Value,
}

impl ModuleManifest {
    /// Parses a manifest from raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ModuleError> {
        let document: Value = serde_json::from_slice(bytes)
            .map_err(|e| ModuleError::ManifestUnavailable(format!("invalid JSON: {}", e)))?;
        Self::from_value(document)
    }

    /// Parses a manifest from an already-decoded JSON document.
    pub fn from_value(document: Value) -> Result<Self, ModuleError> {
        let raw: RawManifest = serde_json::from_value(document.clone())
            .map_err(|e| ModuleError::ManifestUnavailable(format!("malformed manifest: {}", e)))?;

        if let Some(bad) = raw.libraries.iter().find(|lib| lib.coordinates().is_none()) {
            return Err(ModuleError::ManifestUnavailable(format!(
                "library has malformed coordinates: {:?}",
                bad.name
            )));
        }

        let arguments = match (&raw.minecraft_arguments, &raw.arguments) {
            (Some(args), _) => args.split_whitespace().map(str::to_string).collect(),
            (None, Some(Value::Array(items))) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };

        Ok(Self {
            id: raw.id,
            main_class: raw.main_class,
            arguments,
            libraries: raw.libraries,
            compatibility_rules: raw.compatibility_rules,
            incompatibility_reason: raw.incompatibility_reason,
            release_time: raw.release_time,
            kind: raw.kind,
            document,
        })
    }

    /// The manifest as persisted on disk: pretty JSON, 2-space indent.
    pub fn to_pretty_json(&self) -> String {
        // Serializing a `Value` cannot fail.
        serde_json::to_string_pretty(&self.document).unwrap_or_default()
    }

    /// Whether the module's compatibility rules allow this platform.
    pub fn can_run_on(&self, platform: &Platform) -> bool {
        rules_allow(&self.compatibility_rules, platform)
    }

    /// Human-readable reason for an incompatibility.
    pub fn incompatibility_reason(&self) -> String {
        self.incompatibility_reason
            .clone()
            .unwrap_or_else(|| "not supported on this operating system".to_string())
    }

    /// Parsed release time, when it is RFC 3339.
    pub fn release_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.release_time
            .as_deref()
            .and_then(|time| DateTime::parse_from_rfc3339(time).ok())
    }

    /// Every library resolved against the layout and platform, in manifest
    /// order, including ones that don't apply to the platform.
    pub fn dependencies(&self, layout: &Layout, platform: &Platform) -> Vec<Dependency> {
        self.libraries
            .iter()
            .filter_map(|lib| lib.resolve(layout, platform))
            .collect()
    }

    /// Libraries that must be present on this platform.
    pub fn required_dependencies(&self, layout: &Layout, platform: &Platform) -> Vec<Dependency> {
        self.dependencies(layout, platform)
            .into_iter()
            .filter(|dep| dep.applies_to_platform)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::platform::OsFamily;
    use std::path::PathBuf;

    const SAMPLE: &str = r#"{
        "id": "1.5.2",
        "time": "2013-04-25T17:45:00+02:00",
        "releaseTime": "2013-04-18T17:03:52+02:00",
        "type": "release",
        "minecraftArguments": "--username ${auth_player_name} --session ${auth_session}",
        "mainClass": "net.minecraft.client.Minecraft",
        "libraries": [
            {"name": "net.sf.jopt-simple:jopt-simple:4.5"},
            {
                "name": "org.lwjgl.lwjgl:lwjgl-platform:2.9.0",
                "natives": {"linux": "natives-linux", "osx": "natives-osx"},
                "extract": {"exclude": ["META-INF/"]}
            },
            {
                "name": "tv.twitch:twitch:5.16",
                "rules": [{"action": "allow", "os": {"name": "osx"}}]
            }
        ]
    }"#;

    fn layout() -> Layout {
        Layout::from_settings(&Settings {
            game_dir: PathBuf::from("/g"),
            temp_dir: PathBuf::from("/t"),
            ..Settings::default()
        })
    }

    #[test]
    fn test_parse_sample() {
        let manifest = ModuleManifest::from_slice(SAMPLE.as_bytes()).unwrap();

        assert_eq!(manifest.id.as_deref(), Some("1.5.2"));
        assert_eq!(manifest.main_class, "net.minecraft.client.Minecraft");
        assert_eq!(
            manifest.arguments,
            vec![
                "--username",
                "${auth_player_name}",
                "--session",
                "${auth_session}"
            ]
        );
        assert_eq!(manifest.libraries.len(), 3);
        assert_eq!(manifest.kind.as_deref(), Some("release"));
        assert!(manifest.release_timestamp().is_some());
    }

    #[test]
    fn test_argument_array_form() {
        let manifest = ModuleManifest::from_slice(
            br#"{"mainClass": "a.Main", "arguments": ["--demo", 3, "--width"]}"#,
        )
        .unwrap();
        assert_eq!(manifest.arguments, vec!["--demo", "--width"]);
    }

    #[test]
    fn test_required_dependencies_filter_by_platform() {
        let manifest = ModuleManifest::from_slice(SAMPLE.as_bytes()).unwrap();
        let linux = Platform::new(OsFamily::Linux, "64");
        let windows = Platform::new(OsFamily::Windows, "64");

        assert_eq!(manifest.dependencies(&layout(), &linux).len(), 3);

        let keys: Vec<_> = manifest
            .required_dependencies(&layout(), &linux)
            .into_iter()
            .map(|dep| dep.key)
            .collect();
        assert_eq!(
            keys,
            vec![
                "net.sf.jopt-simple:jopt-simple:4.5",
                "org.lwjgl.lwjgl:lwjgl-platform:2.9.0"
            ]
        );

        assert_eq!(manifest.required_dependencies(&layout(), &windows).len(), 1);
    }

    #[test]
    fn test_compatibility_rules() {
        let manifest = ModuleManifest::from_slice(
            br#"{
                "mainClass": "a.Main",
                "compatibilityRules": [{"action": "allow"}, {"action": "disallow", "os": {"name": "linux"}}],
                "incompatibilityReason": "No Linux build"
            }"#,
        )
        .unwrap();

        assert!(!manifest.can_run_on(&Platform::new(OsFamily::Linux, "64")));
        assert!(manifest.can_run_on(&Platform::new(OsFamily::Windows, "64")));
        assert_eq!(manifest.incompatibility_reason(), "No Linux build");

        let plain = ModuleManifest::from_slice(br#"{"mainClass": "a.Main"}"#).unwrap();
        assert!(plain.can_run_on(&Platform::new(OsFamily::Linux, "64")));
    }

    #[test]
    fn test_rejects_bad_documents() {
        assert!(matches!(
            ModuleManifest::from_slice(b"not json"),
            Err(ModuleError::ManifestUnavailable(_))
        ));
        assert!(matches!(
            ModuleManifest::from_slice(br#"{"libraries": []}"#),
            Err(ModuleError::ManifestUnavailable(_))
        ));
        assert!(matches!(
            ModuleManifest::from_slice(br#"{"mainClass": "a.Main", "libraries": [{"name": "oops"}]}"#),
            Err(ModuleError::ManifestUnavailable(_))
        ));
    }

    #[test]
    fn test_pretty_json_roundtrip() {
        let manifest = ModuleManifest::from_slice(SAMPLE.as_bytes()).unwrap();
        let persisted = manifest.to_pretty_json();

        assert!(persisted.contains("\n  \"mainClass\": \"net.minecraft.client.Minecraft\""));
        assert!(persisted.contains("\"time\""));

        let reparsed = ModuleManifest::from_slice(persisted.as_bytes()).unwrap();
        assert_eq!(reparsed.main_class, manifest.main_class);
        assert_eq!(reparsed.libraries, manifest.libraries);
    }
}
