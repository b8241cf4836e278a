//! Uninstall with shared-library reference checks.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{InstallState, Module, Operation, Submission};
use crate::files;
use crate::manifest::{Dependency, ModuleManifest};

impl Module {
    /// Starts removing the module in the background.
    ///
    /// Library files are only deleted when no other installed or installing
    /// module still references them.
    pub fn uninstall(&self) -> Submission {
        let id = self.id();

        let operation = self.lock().operation;
        match operation {
            Some(Operation::Installing) => {
                info!("Not uninstalling {}: install in progress", id);
                return Submission::AlreadyInstalling;
            }
            Some(Operation::Uninstalling) => {
                info!("Not uninstalling {}: already uninstalling", id);
                return Submission::Uninstalling;
            }
            None => {}
        }

        let manifest = match self.load_manifest() {
            Ok(manifest) => manifest,
            Err(e) => {
                info!("Module {} is not installed: {}", id, e);
                return Submission::NotInstalled;
            }
        };

        if let Err(rejected) = self.begin(Operation::Uninstalling) {
            info!("Not uninstalling {}: {:?}", id, rejected);
            return rejected;
        }

        info!("Uninstalling module {}", id);
        self.progress().uninstall_start(id);

        let module = self.clone();
        self.ctx()
            .runtime
            .spawn_blocking(move || module.remove_files(manifest));
        Submission::Started
    }

    fn remove_files(&self, manifest: Arc<ModuleManifest>) {
        let id = self.id();
        let module_dir = &self.paths().module_dir;
        let ctx = self.ctx();

        if module_dir.parent() != Some(ctx.layout.versions_dir().as_path()) || !id.is_valid() {
            warn!(
                "Not deleting {}: it is not a module directory under {}",
                module_dir.display(),
                ctx.layout.versions_dir().display()
            );
        } else {
            info!("Deleting {}", module_dir.display());
            if let Err(e) = files::remove_path(module_dir) {
                warn!("Failed to delete {}: {:#}", module_dir.display(), e);
            }
        }

        match ctx.manager.upgrade() {
            Some(manager) => {
                let _cleanup = manager.lock_cleanup();

                let referenced: HashSet<PathBuf> = manager
                    .modules()
                    .into_iter()
                    .filter(|other| !other.same_as(self))
                    .flat_map(|other| other.referenced_libraries())
                    .map(|dep| dep.local_path)
                    .collect();

                let libraries_root = ctx.layout.libraries_dir();
                let mut seen = HashSet::new();
                for dep in manifest.required_dependencies(&ctx.layout, &ctx.platform) {
                    if referenced.contains(&dep.local_path) {
                        debug!("Keeping {}: still referenced", dep.key);
                        continue;
                    }
                    if seen.insert(dep.local_path.clone()) {
                        remove_library(&dep, &libraries_root);
                    }
                }
            }
            None => warn!(
                "Module manager is gone, leaving libraries of {} in place",
                id
            ),
        }

        self.finish(InstallState::Unknown, true);
        info!("Module {} uninstalled", id);
        self.progress().uninstall_done(id);
    }
}

/// Deletes a library file, its native extraction, and any directories left
/// empty below the library root. Failures are logged and skipped.
fn remove_library(dep: &Dependency, libraries_root: &Path) {
    info!("Deleting {}", dep.local_path.display());
    match fs::remove_file(&dep.local_path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to delete {}: {}", dep.local_path.display(), e),
    }

    if dep.requires_extraction {
        debug!("Deleting {}", dep.extraction_dir.display());
        if let Err(e) = files::remove_path(&dep.extraction_dir) {
            warn!("Failed to delete {}: {:#}", dep.extraction_dir.display(), e);
        }
    }

    if let Some(parent) = dep.local_path.parent() {
        files::prune_empty_dirs(parent, libraries_root);
    }
}
