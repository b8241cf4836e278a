//! Module manager for coordinating the set of known modules.
//!
//! The `ModuleManager` is the main entry point. It owns the module set, lets
//! an uninstall see which libraries its siblings still use, and serializes
//! shared-library cleanup across modules.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::ModuleError;
use crate::module::{Module, ModuleContext, ModuleId, ModuleProgress, VersionEntry};
use crate::paths::Layout;
use crate::platform::Platform;
use crate::queue::{HttpFetcher, QueueFactory, TaskQueueFactory};

/// State the modules reach back into.
#[derive(Default)]
pub(crate) struct ManagerShared {
    modules: RwLock<BTreeMap<ModuleId, Module>>,
    /// Held while an uninstall decides which libraries to delete.
    cleanup: Mutex<()>,
}

impl ManagerShared {
    pub(crate) fn lock_cleanup(&self) -> MutexGuard<'_, ()> {
        self.cleanup
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn modules(&self) -> Vec<Module> {
        self.modules
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

// ============================================================================
// Module Manager
// ============================================================================

/// Owns every module of one game directory.
///
/// Must be created inside a tokio runtime: install and uninstall work is
/// spawned onto it.
pub struct ModuleManager {
    settings: Settings,
    ctx: Arc<ModuleContext>,
    shared: Arc<ManagerShared>,
}

impl ModuleManager {
    /// Creates a manager that downloads through the given queue factory.
    pub fn new(
        settings: Settings,
        platform: Platform,
        queues: Arc<dyn QueueFactory>,
    ) -> Result<Self, ModuleError> {
        let runtime = Handle::try_current().map_err(|e| ModuleError::Runtime(e.to_string()))?;
        let shared = Arc::new(ManagerShared::default());
        let layout = Layout::from_settings(&settings);

        info!(
            "ModuleManager initialized. Game dir: {}, Platform: {}",
            layout.game_dir().display(),
            platform
        );

        let ctx = Arc::new(ModuleContext {
            layout,
            platform,
            queues,
            runtime,
            manager: Arc::downgrade(&shared),
        });

        Ok(Self {
            settings,
            ctx,
            shared,
        })
    }

    /// Creates a manager that downloads over HTTPS with the configured
    /// concurrency.
    pub fn with_http(settings: Settings, platform: Platform) -> Result<Self, ModuleError> {
        let runtime = Handle::try_current().map_err(|e| ModuleError::Runtime(e.to_string()))?;
        let queues = Arc::new(TaskQueueFactory::new(
            Arc::new(HttpFetcher::new()),
            settings.download_concurrency,
            runtime,
        ));
        Self::new(settings, platform, queues)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn layout(&self) -> &Layout {
        &self.ctx.layout
    }

    pub fn platform(&self) -> &Platform {
        &self.ctx.platform
    }

    #[cfg(test)]
    pub(crate) fn context(&self) -> &Arc<ModuleContext> {
        &self.ctx
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Adds a module, or returns the existing one with the same id.
    ///
    /// Ids that are not a single plain path component are rejected, since
    /// every path of the module is built from the id.
    pub fn register(
        &self,
        entry: VersionEntry,
        progress: Arc<dyn ModuleProgress>,
    ) -> Result<Module, ModuleError> {
        if let Err(e) = entry.id.validate() {
            warn!("Refusing to register module: {}", e);
            return Err(e);
        }

        let mut modules = self
            .shared
            .modules
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let module = modules
            .entry(entry.id.clone())
            .or_insert_with(|| {
                debug!("Registering module {}", entry.id);
                Module::new(entry, self.ctx.clone(), progress)
            })
            .clone();
        Ok(module)
    }

    /// Registers every module that has a manifest under the versions
    /// directory.
    pub fn discover_local(&self, progress: Arc<dyn ModuleProgress>) -> Result<Vec<Module>, ModuleError> {
        let versions_dir = self.ctx.layout.versions_dir();
        let entries = match fs::read_dir(&versions_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ModuleError::fs(&versions_dir, e)),
        };

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ModuleError::fs(&versions_dir, e))?;
            let Some(id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !entry.path().join(format!("{}.json", id)).is_file() {
                continue;
            }
            found.push(self.register(VersionEntry::new(id), progress.clone())?);
        }

        found.sort_by(|a, b| a.id().cmp(b.id()));
        info!("Discovered {} local modules", found.len());
        Ok(found)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get(&self, id: &str) -> Option<Module> {
        self.shared
            .modules
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned()
    }

    /// All registered modules, ordered by id.
    pub fn modules(&self) -> Vec<Module> {
        self.shared.modules()
    }

    /// Registered modules whose artifacts are all on disk.
    pub fn installed(&self) -> Vec<Module> {
        self.modules()
            .into_iter()
            .filter(|module| module.is_installed())
            .collect()
    }
}
