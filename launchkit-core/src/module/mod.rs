//! Installable modules.
//!
//! A [`Module`] is one versioned game build: a manifest, a primary jar, the
//! runnable jar repackaged from it, and a set of library files shared with
//! other modules. The handle is cheap to clone; all clones see the same
//! cached manifest, install state and in-flight operation.
//!
//! - `install`: download orchestration and finalization
//! - `uninstall`: reference-aware cleanup of shared libraries
//! - `progress`: lifecycle callbacks

mod install;
mod progress;
mod uninstall;


pub use progress::{ModuleEvent, ModuleProgress, NoProgress};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::runtime::Handle;
use tracing::debug;

use crate::error::ModuleError;
use crate::manager::ManagerShared;
use crate::manifest::{Dependency, ModuleManifest};
use crate::paths::{Layout, ModulePaths};
use crate::platform::Platform;
use crate::queue::QueueFactory;

// ============================================================================
// Identity
// ============================================================================

/// Stable module identifier (`1.5.2`, `13w16a`, ...). Every path and URL of
/// the module is derived from it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the id names exactly one directory below `versions/`: not
    /// empty, not `.` or `..`, no separators or drive prefixes.
    pub fn is_valid(&self) -> bool {
        let mut components = Path::new(&self.0).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => name == self.0.as_str(),
            _ => false,
        }
    }

    /// Rejects ids that would escape the versions directory.
    pub fn validate(&self) -> Result<(), ModuleError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ModuleError::InvalidModuleId(self.0.clone()))
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ModuleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for ModuleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ModuleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A module as listed by a remote version index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub id: ModuleId,
    #[serde(default)]
    pub release_time: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl VersionEntry {
    pub fn new(id: impl Into<ModuleId>) -> Self {
        Self {
            id: id.into(),
            release_time: None,
            kind: None,
        }
    }
}

// ============================================================================
// State
// ============================================================================

/// Memoized result of the install probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstallState {
    /// Not probed since the last completed operation.
    #[default]
    Unknown,
    Absent,
    Present,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Installing,
    Uninstalling,
}

/// Reported status of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    NotInstalled,
    /// The manifest is on disk but artifacts are missing.
    Incomplete,
    Installing,
    Uninstalling,
    Installed,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInstalled => "not installed",
            Self::Incomplete => "incomplete",
            Self::Installing => "installing",
            Self::Uninstalling => "uninstalling",
            Self::Installed => "installed",
        }
    }

    /// Returns true if the module can be launched.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Installed)
    }

    /// Returns true while an install or uninstall is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Installing | Self::Uninstalling)
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to an install or uninstall request.
///
/// Completion of a started operation is reported through
/// [`ModuleProgress`], never through this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Started,
    /// An install is already in flight; nothing new was scheduled.
    AlreadyInstalling,
    /// An uninstall is in flight; nothing new was scheduled.
    Uninstalling,
    /// The cached manifest rules out this platform.
    Incompatible,
    /// Nothing to uninstall: no manifest could be loaded.
    NotInstalled,
}

impl Submission {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started)
    }
}

#[derive(Debug, Default)]
struct ModuleState {
    manifest: Option<Arc<ModuleManifest>>,
    installed: InstallState,
    operation: Option<Operation>,
}

/// Environment shared by every module of a manager.
pub(crate) struct ModuleContext {
    pub(crate) layout: Layout,
    pub(crate) platform: Platform,
    pub(crate) queues: Arc<dyn QueueFactory>,
    pub(crate) runtime: Handle,
    pub(crate) manager: Weak<ManagerShared>,
}

struct ModuleInner {
    entry: VersionEntry,
    paths: ModulePaths,
    ctx: Arc<ModuleContext>,
    progress: Arc<dyn ModuleProgress>,
    state: Mutex<ModuleState>,
}

// ============================================================================
// Launch information
// ============================================================================

/// Everything needed to start an installed module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub main_class: String,
    pub arguments: Vec<String>,
    /// Library jars in manifest order, followed by the runnable jar.
    pub class_path: Vec<PathBuf>,
    /// Extracted native library directories.
    pub native_dirs: Vec<PathBuf>,
}

impl LaunchSpec {
    /// Class path joined with the platform separator.
    pub fn class_path_string(&self) -> Result<OsString, std::env::JoinPathsError> {
        std::env::join_paths(&self.class_path)
    }

    /// Native directories joined with the platform separator.
    pub fn native_path_string(&self) -> Result<OsString, std::env::JoinPathsError> {
        std::env::join_paths(&self.native_dirs)
    }
}

// ============================================================================
// Module
// ============================================================================

/// Handle to one installable module.
#[derive(Clone)]
pub struct Module {
    inner: Arc<ModuleInner>,
}

impl Module {
    pub(crate) fn new(
        entry: VersionEntry,
        ctx: Arc<ModuleContext>,
        progress: Arc<dyn ModuleProgress>,
    ) -> Self {
        let paths = ctx.layout.module(entry.id.as_str());
        Self {
            inner: Arc::new(ModuleInner {
                entry,
                paths,
                ctx,
                progress,
                state: Mutex::new(ModuleState::default()),
            }),
        }
    }

    pub fn id(&self) -> &ModuleId {
        &self.inner.entry.id
    }

    pub fn entry(&self) -> &VersionEntry {
        &self.inner.entry
    }

    pub fn paths(&self) -> &ModulePaths {
        &self.inner.paths
    }

    fn ctx(&self) -> &ModuleContext {
        &self.inner.ctx
    }

    fn progress(&self) -> &dyn ModuleProgress {
        self.inner.progress.as_ref()
    }

    fn lock(&self) -> MutexGuard<'_, ModuleState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn same_as(&self, other: &Module) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ========================================================================
    // Manifest
    // ========================================================================

    pub(crate) fn cached_manifest(&self) -> Option<Arc<ModuleManifest>> {
        self.lock().manifest.clone()
    }

    /// Caches a manifest unless one is already cached, returning whichever
    /// ends up in the cache.
    fn cache_manifest(&self, manifest: ModuleManifest) -> Arc<ModuleManifest> {
        self.lock()
            .manifest
            .get_or_insert_with(|| Arc::new(manifest))
            .clone()
    }

    /// Returns the cached manifest, loading it from disk on first use.
    pub fn load_manifest(&self) -> Result<Arc<ModuleManifest>, ModuleError> {
        if let Some(manifest) = self.cached_manifest() {
            return Ok(manifest);
        }

        let path = &self.paths().manifest;
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ModuleError::ManifestUnavailable(format!(
                    "no manifest at {}",
                    path.display()
                )));
            }
            Err(e) => return Err(ModuleError::fs(path, e)),
        };

        let manifest = ModuleManifest::from_slice(&bytes)?;
        debug!("Loaded manifest for {} from {}", self.id(), path.display());
        Ok(self.cache_manifest(manifest))
    }

    // ========================================================================
    // Install state
    // ========================================================================

    /// Whether every artifact of the module is on disk.
    ///
    /// The answer is memoized until the next install or uninstall completes.
    pub fn is_installed(&self) -> bool {
        let known = self.lock().installed;
        let state = match known {
            InstallState::Unknown => {
                let probed = self.probe();
                let mut state = self.lock();
                if state.installed == InstallState::Unknown {
                    state.installed = probed;
                }
                state.installed
            }
            known => known,
        };
        state == InstallState::Present
    }

    fn probe(&self) -> InstallState {
        let paths = self.paths();
        if !paths.manifest.is_file() || !paths.jar.is_file() || !paths.run_jar.is_file() {
            return InstallState::Absent;
        }

        let manifest = match self.load_manifest() {
            Ok(manifest) => manifest,
            Err(e) => {
                debug!("{} has an unreadable manifest: {}", self.id(), e);
                return InstallState::Absent;
            }
        };

        let ctx = self.ctx();
        let missing = manifest
            .required_dependencies(&ctx.layout, &ctx.platform)
            .into_iter()
            .find(|dep| !dep.local_path.is_file());
        if let Some(dep) = missing {
            debug!("{} is missing library {}", self.id(), dep.key);
            return InstallState::Absent;
        }

        InstallState::Present
    }

    /// Current status, including operations in flight.
    pub fn status(&self) -> ModuleStatus {
        let operation = self.lock().operation;
        match operation {
            Some(Operation::Installing) => return ModuleStatus::Installing,
            Some(Operation::Uninstalling) => return ModuleStatus::Uninstalling,
            None => {}
        }

        if self.is_installed() {
            ModuleStatus::Installed
        } else if self.load_manifest().is_ok() {
            ModuleStatus::Incomplete
        } else {
            ModuleStatus::NotInstalled
        }
    }

    /// Reserves the module for an operation.
    fn begin(&self, operation: Operation) -> Result<(), Submission> {
        let mut state = self.lock();
        match state.operation {
            Some(Operation::Installing) => Err(Submission::AlreadyInstalling),
            Some(Operation::Uninstalling) => Err(Submission::Uninstalling),
            None => {
                state.operation = Some(operation);
                if operation == Operation::Uninstalling {
                    state.installed = InstallState::Absent;
                }
                Ok(())
            }
        }
    }

    /// Releases a reservation that never started any work.
    fn cancel(&self) {
        self.lock().operation = None;
    }

    /// Clears the operation guard and records the outcome.
    fn finish(&self, installed: InstallState, drop_manifest: bool) {
        let mut state = self.lock();
        state.operation = None;
        state.installed = installed;
        if drop_manifest {
            state.manifest = None;
        }
    }

    /// Libraries this module holds on to, as seen by a sibling's uninstall.
    ///
    /// Installed modules and modules with an install in flight both count.
    pub(crate) fn referenced_libraries(&self) -> Vec<Dependency> {
        let (operation, cached) = {
            let state = self.lock();
            (state.operation, state.manifest.clone())
        };

        let manifest = match operation {
            Some(Operation::Installing) => cached,
            Some(Operation::Uninstalling) => None,
            None if self.is_installed() => self.load_manifest().ok(),
            None => None,
        };

        let ctx = self.ctx();
        manifest
            .map(|m| m.required_dependencies(&ctx.layout, &ctx.platform))
            .unwrap_or_default()
    }

    // ========================================================================
    // Launch information
    // ========================================================================

    /// Main class, arguments, class path and native directories.
    pub fn launch_spec(&self) -> Result<LaunchSpec, ModuleError> {
        let manifest = self.load_manifest()?;
        let ctx = self.ctx();
        let dependencies = manifest.required_dependencies(&ctx.layout, &ctx.platform);

        let mut class_path: Vec<PathBuf> = dependencies
            .iter()
            .filter(|dep| !dep.requires_extraction)
            .map(|dep| dep.local_path.clone())
            .collect();
        class_path.push(self.paths().run_jar.clone());

        let native_dirs = dependencies
            .iter()
            .filter(|dep| dep.requires_extraction)
            .map(|dep| dep.extraction_dir.clone())
            .collect();

        Ok(LaunchSpec {
            main_class: manifest.main_class.clone(),
            arguments: manifest.arguments.clone(),
            class_path,
            native_dirs,
        })
    }

    /// Release time from the version index, else from the manifest.
    pub fn release_time(&self) -> Option<String> {
        self.inner.entry.release_time.clone().or_else(|| {
            self.load_manifest()
                .ok()
                .and_then(|manifest| manifest.release_time.clone())
        })
    }

    pub fn release_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.release_time()
            .and_then(|time| DateTime::parse_from_rfc3339(&time).ok())
    }

    /// Release channel from the version index, else from the manifest.
    pub fn kind(&self) -> Option<String> {
        self.inner.entry.kind.clone().or_else(|| {
            self.load_manifest()
                .ok()
                .and_then(|manifest| manifest.kind.clone())
        })
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Module")
            .field("id", self.id())
            .field("installed", &state.installed)
            .field("operation", &state.operation)
            .finish()
    }
}
