//! Install and uninstall progress reporting.

use tokio::sync::mpsc;

use super::ModuleId;
use crate::error::ModuleError;

/// Observer for a module's lifecycle. Every method defaults to a no-op.
///
/// Completion callbacks (`install_done`, `install_failed`, `uninstall_done`)
/// fire from blocking worker threads, never from the caller of
/// `install()`/`uninstall()`. The `*_start` callbacks may run on the caller.
pub trait ModuleProgress: Send + Sync {
    /// Artifact enumeration began; the manifest is known and compatible.
    fn install_start(&self, _module: &ModuleId) {}

    /// The runnable jar is in place and the module is installed.
    fn install_done(&self, _module: &ModuleId) {}

    fn install_failed(&self, _module: &ModuleId, _error: &ModuleError) {}

    fn uninstall_start(&self, _module: &ModuleId) {}

    fn uninstall_done(&self, _module: &ModuleId) {}
}

/// Progress sink that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ModuleProgress for NoProgress {}

/// Lifecycle events, for consumers that prefer a channel over callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleEvent {
    InstallStarted(ModuleId),
    InstallDone(ModuleId),
    InstallFailed { module: ModuleId, error: String },
    UninstallStarted(ModuleId),
    UninstallDone(ModuleId),
}

impl ModuleEvent {
    pub fn module(&self) -> &ModuleId {
        match self {
            Self::InstallStarted(id)
            | Self::InstallDone(id)
            | Self::UninstallStarted(id)
            | Self::UninstallDone(id) => id,
            Self::InstallFailed { module, .. } => module,
        }
    }

    /// True for events that end an operation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::InstallDone(_) | Self::InstallFailed { .. } | Self::UninstallDone(_)
        )
    }
}

// A closed receiver just means nobody is listening anymore.
impl ModuleProgress for mpsc::UnboundedSender<ModuleEvent> {
    fn install_start(&self, module: &ModuleId) {
        let _ = self.send(ModuleEvent::InstallStarted(module.clone()));
    }

    fn install_done(&self, module: &ModuleId) {
        let _ = self.send(ModuleEvent::InstallDone(module.clone()));
    }

    fn install_failed(&self, module: &ModuleId, error: &ModuleError) {
        let _ = self.send(ModuleEvent::InstallFailed {
            module: module.clone(),
            error: error.to_string(),
        });
    }

    fn uninstall_start(&self, module: &ModuleId) {
        let _ = self.send(ModuleEvent::UninstallStarted(module.clone()));
    }

    fn uninstall_done(&self, module: &ModuleId) {
        let _ = self.send(ModuleEvent::UninstallDone(module.clone()));
    }
}
