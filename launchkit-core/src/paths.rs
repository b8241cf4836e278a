//! Artifact path resolution.
//!
//! Every local path and remote URL for a module is derived from its id and the
//! launcher [`Layout`]:
//!
//! - `{game}/versions/{id}/{id}.json` - persisted manifest
//! - `{game}/versions/{id}/{id}.jar` - raw primary jar
//! - `{game}/versions/{id}/{id}-run.jar` - runnable (repackaged) jar
//! - `{temp}/versions/{id}/{id}.jar` - primary jar download target
//! - `{temp}/versions/{id}/{id}-extract/` - repackaging staging directory
//! - `{game}/libraries/...` - shared library root
//!
//! Nothing in here touches the filesystem.

use std::path::{Path, PathBuf};

use crate::config::Settings;

/// Directory and URL roots that every derived path hangs off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    game_dir: PathBuf,
    temp_dir: PathBuf,
    download_base: String,
    libraries_base: String,
}

impl Layout {
    /// Builds a layout from launcher settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            game_dir: settings.game_dir.clone(),
            temp_dir: settings.temp_dir.clone(),
            download_base: with_trailing_slash(&settings.download_base),
            libraries_base: with_trailing_slash(&settings.libraries_base),
        }
    }

    pub fn game_dir(&self) -> &Path {
        &self.game_dir
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Base URL for libraries that don't declare their own.
    pub fn libraries_base(&self) -> &str {
        &self.libraries_base
    }

    /// Root of the shared library tree. Uninstall never prunes above this.
    pub fn libraries_dir(&self) -> PathBuf {
        self.game_dir.join("libraries")
    }

    /// Scratch root for library downloads.
    pub fn libraries_temp_dir(&self) -> PathBuf {
        self.temp_dir.join("libraries")
    }

    /// Scratch root for archive extraction staging.
    pub fn extract_temp_dir(&self) -> PathBuf {
        self.temp_dir.join("extract")
    }

    /// Directory holding one folder per module.
    pub fn versions_dir(&self) -> PathBuf {
        self.game_dir.join("versions")
    }

    /// Resolves every path and URL for a module.
    pub fn module(&self, id: &str) -> ModulePaths {
        let module_dir = self.versions_dir().join(id);
        let temp_module_dir = self.temp_dir.join("versions").join(id);
        let remote_prefix = format!("{}versions/{}/{}", self.download_base, id, id);

        ModulePaths {
            manifest: module_dir.join(format!("{}.json", id)),
            jar: module_dir.join(format!("{}.jar", id)),
            run_jar: module_dir.join(format!("{}-run.jar", id)),
            jar_temp: temp_module_dir.join(format!("{}.jar", id)),
            extract_dir: temp_module_dir.join(format!("{}-extract", id)),
            extract_temp_dir: temp_module_dir.join(format!("{}-extract-tmp", id)),
            manifest_url: format!("{}.json", remote_prefix),
            jar_url: format!("{}.jar", remote_prefix),
            module_dir,
        }
    }
}

/// All canonical locations for a single module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePaths {
    /// Per-module directory; removed wholesale on uninstall.
    pub module_dir: PathBuf,
    pub manifest: PathBuf,
    pub jar: PathBuf,
    pub run_jar: PathBuf,
    pub jar_temp: PathBuf,
    /// Staging directory the primary jar is extracted into before repacking.
    pub extract_dir: PathBuf,
    /// Scratch directory used while populating `extract_dir`.
    pub extract_temp_dir: PathBuf,
    pub manifest_url: String,
    pub jar_url: String,
}

fn with_trailing_slash(base: &str) -> String {
    if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{}/", base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_layout() -> Layout {
        Layout::from_settings(&Settings {
            game_dir: PathBuf::from("/games/mc"),
            temp_dir: PathBuf::from("/tmp/lk"),
            download_base: "https://dl.example/base".to_string(),
            libraries_base: "https://libs.example/".to_string(),
            download_concurrency: 4,
        })
    }

    #[test]
    fn test_module_local_paths() {
        let paths = test_layout().module("1.5.2");

        assert_eq!(paths.module_dir, PathBuf::from("/games/mc/versions/1.5.2"));
        assert_eq!(
            paths.manifest,
            PathBuf::from("/games/mc/versions/1.5.2/1.5.2.json")
        );
        assert_eq!(paths.jar, PathBuf::from("/games/mc/versions/1.5.2/1.5.2.jar"));
        assert_eq!(
            paths.run_jar,
            PathBuf::from("/games/mc/versions/1.5.2/1.5.2-run.jar")
        );
        assert!(paths.manifest.starts_with(&paths.module_dir));
        assert!(paths.jar.starts_with(&paths.module_dir));
        assert!(paths.run_jar.starts_with(&paths.module_dir));
    }

    #[test]
    fn test_module_temp_paths() {
        let paths = test_layout().module("1.5.2");

        assert_eq!(paths.jar_temp, PathBuf::from("/tmp/lk/versions/1.5.2/1.5.2.jar"));
        assert!(paths.extract_dir.starts_with("/tmp/lk"));
        assert!(paths.extract_temp_dir.starts_with("/tmp/lk"));
        assert_ne!(paths.extract_dir, paths.extract_temp_dir);
    }

    #[test]
    fn test_module_urls() {
        let paths = test_layout().module("1.5.2");

        assert_eq!(
            paths.manifest_url,
            "https://dl.example/base/versions/1.5.2/1.5.2.json"
        );
        assert_eq!(paths.jar_url, "https://dl.example/base/versions/1.5.2/1.5.2.jar");
    }

    #[test]
    fn test_library_roots() {
        let layout = test_layout();
        assert_eq!(layout.libraries_dir(), PathBuf::from("/games/mc/libraries"));
        assert_eq!(layout.libraries_temp_dir(), PathBuf::from("/tmp/lk/libraries"));
        assert_eq!(layout.libraries_base(), "https://libs.example/");
    }
}
