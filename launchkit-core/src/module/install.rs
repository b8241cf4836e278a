//! Install orchestration.
//!
//! An install run fetches the manifest if needed, queues every missing
//! artifact on a fresh download queue, moves each finished download into
//! place, and once the queue drains repackages the primary jar into the
//! runnable jar. The first failure aborts the whole run.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{InstallState, Module, Operation, Submission};
use crate::archive;
use crate::error::ModuleError;
use crate::files;
use crate::manifest::{Dependency, ModuleManifest};
use crate::queue::{panic_message, DownloadItem, DownloadOutcome, DownloadQueue, Payload};

/// Archive prefixes dropped when building the runnable jar.
const RUN_JAR_EXCLUDES: &[&str] = &["META-INF/"];

impl Module {
    /// Starts installing the module in the background.
    ///
    /// Returns immediately; completion is reported through the module's
    /// [`ModuleProgress`](super::ModuleProgress).
    pub fn install(&self) -> Submission {
        let id = self.id();

        if let Err(rejected) = self.begin(Operation::Installing) {
            info!("Not installing {}: {:?}", id, rejected);
            return rejected;
        }

        let manifest = self.load_manifest().ok();
        if let Some(manifest) = &manifest {
            if !manifest.can_run_on(&self.ctx().platform) {
                self.cancel();
                return self.reject_incompatible(manifest);
            }
        }

        info!("Installing module {}", id);
        let queue = self.ctx().queues.create_queue();
        let run = Arc::new(InstallRun {
            module: self.clone(),
            queue: queue.clone(),
            settled: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        match manifest {
            Some(manifest) => run.guarded(|run| run.enqueue_artifacts(&manifest)),
            None => {
                debug!("No local manifest for {}, fetching it", id);
                let handler = run.clone();
                queue.add_download(DownloadItem::to_memory(
                    self.paths().manifest_url.clone(),
                    move |outcome| handler.guarded(|run| run.manifest_done(outcome)),
                ));
            }
        }

        queue.stop_after_all_done();
        queue.start();
        Submission::Started
    }

    fn reject_incompatible(&self, manifest: &ModuleManifest) -> Submission {
        let error = ModuleError::PlatformIncompatible {
            reason: manifest.incompatibility_reason(),
        };
        warn!("Cannot install {}: {}", self.id(), error);
        let module = self.clone();
        self.ctx()
            .runtime
            .spawn_blocking(move || module.progress().install_failed(module.id(), &error));
        Submission::Incompatible
    }
}

/// What a binary download is for.
enum Artifact {
    PrimaryJar,
    Library(Dependency),
}

/// State of one install attempt.
struct InstallRun {
    module: Module,
    queue: Arc<dyn DownloadQueue>,
    /// Set by whichever of finalize or fail happens first.
    settled: AtomicBool,
    /// Set once the module's operation guard has been released.
    closed: AtomicBool,
}

impl InstallRun {
    fn settle(&self) -> bool {
        !self.settled.swap(true, Ordering::SeqCst)
    }

    fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }

    /// Releases the module's guard with the run's outcome.
    fn close(&self, installed: InstallState) {
        self.module.finish(installed, false);
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Runs one step of the install. A panic fails the run instead of
    /// leaving the module reserved.
    fn guarded(self: &Arc<Self>, step: impl FnOnce(&Arc<Self>)) {
        let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| step(self))) else {
            return;
        };

        let message = panic_message(&*panic);
        error!("Install of {} panicked: {}", self.module.id(), message);
        self.settle();
        if !self.closed.load(Ordering::SeqCst) {
            self.abort(ModuleError::Interrupted(message));
        }
    }

    // ========================================================================
    // Completion handlers
    // ========================================================================

    fn manifest_done(self: &Arc<Self>, outcome: DownloadOutcome) {
        let bytes = match outcome.result {
            Ok(Payload::Bytes(bytes)) => bytes,
            Ok(Payload::File { path, .. }) => match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => return self.fail(ModuleError::fs(&path, e)),
            },
            Err(message) => {
                return self.fail(ModuleError::Download {
                    url: outcome.url,
                    message,
                })
            }
        };

        let manifest = match ModuleManifest::from_slice(&bytes) {
            Ok(manifest) => manifest,
            Err(e) => return self.fail(e),
        };

        let ctx = self.module.ctx();
        if !manifest.can_run_on(&ctx.platform) {
            return self.fail(ModuleError::PlatformIncompatible {
                reason: manifest.incompatibility_reason(),
            });
        }

        if let Err(e) = self.persist_manifest(&manifest) {
            return self.fail(e);
        }

        let manifest = self.module.cache_manifest(manifest);
        self.enqueue_artifacts(&manifest);
    }

    fn persist_manifest(&self, manifest: &ModuleManifest) -> Result<(), ModuleError> {
        let path = &self.module.paths().manifest;
        create_parent(path)?;
        fs::write(path, manifest.to_pretty_json()).map_err(|e| ModuleError::fs(path, e))?;
        debug!("Saved manifest to {}", path.display());
        Ok(())
    }

    fn enqueue_artifacts(self: &Arc<Self>, manifest: &ModuleManifest) {
        let module = &self.module;
        let ctx = module.ctx();
        let paths = module.paths();

        module.progress().install_start(module.id());

        // Presence checks run under the cleanup lock so a sibling's uninstall
        // cannot delete a library between the check and this run caching its
        // claim on it.
        let manager = ctx.manager.upgrade();
        let _cleanup = manager.as_ref().map(|manager| manager.lock_cleanup());

        let mut queued = 0usize;

        if !paths.jar.is_file() {
            let handler = self.clone();
            self.queue.add_download(DownloadItem::to_file(
                paths.jar_url.clone(),
                paths.jar_temp.clone(),
                move |outcome| {
                    handler.guarded(|run| run.artifact_done(Artifact::PrimaryJar, outcome))
                },
            ));
            queued += 1;
        }

        for dep in manifest.required_dependencies(&ctx.layout, &ctx.platform) {
            if dep.local_path.is_file() {
                continue;
            }
            let handler = self.clone();
            let url = dep.remote_url.clone();
            let temp_path = dep.temp_path.clone();
            self.queue.add_download(DownloadItem::to_file(url, temp_path, move |outcome| {
                handler.guarded(|run| run.artifact_done(Artifact::Library(dep), outcome))
            }));
            queued += 1;
        }

        if queued == 0 {
            debug!("Nothing to download for {}", module.id());
            let run = self.clone();
            ctx.runtime.spawn_blocking(move || run.guarded(|run| run.finalize()));
        } else {
            info!("Queued {} downloads for {}", queued, module.id());
        }
    }

    fn artifact_done(&self, artifact: Artifact, outcome: DownloadOutcome) {
        if self.is_settled() {
            return;
        }

        let downloaded = match outcome.result {
            Ok(Payload::File { path, .. }) => path,
            Ok(Payload::Bytes(_)) => {
                return self.fail(ModuleError::Download {
                    url: outcome.url,
                    message: "expected a file payload".to_string(),
                })
            }
            Err(message) => {
                return self.fail(ModuleError::Download {
                    url: outcome.url,
                    message,
                })
            }
        };

        if let Err(e) = self.place(&artifact, &downloaded) {
            return self.fail(e);
        }

        if outcome.queue_drained {
            self.finalize();
        }
    }

    /// Moves a finished download to its final location, extracting natives.
    fn place(&self, artifact: &Artifact, downloaded: &Path) -> Result<(), ModuleError> {
        let dest: &PathBuf = match artifact {
            Artifact::PrimaryJar => &self.module.paths().jar,
            Artifact::Library(dep) => &dep.local_path,
        };

        files::remove_path(dest).map_err(|e| ModuleError::file_op(dest, e))?;
        create_parent(dest)?;
        files::move_path(downloaded, dest).map_err(|e| ModuleError::file_op(dest, e))?;
        debug!("Placed {}", dest.display());

        if let Artifact::Library(dep) = artifact {
            if dep.requires_extraction {
                info!("Extracting natives of {}", dep.key);
                archive::extract_zip(
                    &dep.local_path,
                    &dep.extraction_staging_dir,
                    &dep.extraction_dir,
                    &dep.extract_excludes,
                )
                .map_err(|e| ModuleError::archive(&dep.local_path, e))?;
            }
        }

        Ok(())
    }

    // ========================================================================
    // Settling
    // ========================================================================

    fn finalize(&self) {
        if !self.settle() {
            return;
        }

        let module = &self.module;
        match self.build_run_jar() {
            Ok(()) => {
                self.close(InstallState::Present);
                info!("Module {} installed", module.id());
                module.progress().install_done(module.id());
            }
            Err(e) => self.abort(e),
        }
    }

    fn build_run_jar(&self) -> Result<(), ModuleError> {
        let paths = self.module.paths();
        if paths.run_jar.is_file() {
            return Ok(());
        }

        let excludes: Vec<String> = RUN_JAR_EXCLUDES.iter().map(|s| s.to_string()).collect();
        archive::extract_zip(
            &paths.jar,
            &paths.extract_temp_dir,
            &paths.extract_dir,
            &excludes,
        )
        .map_err(|e| ModuleError::archive(&paths.jar, e))?;
        archive::repackage(&paths.run_jar, &paths.extract_dir)
            .map_err(|e| ModuleError::archive(&paths.run_jar, e))?;

        if let Err(e) = files::remove_path(&paths.extract_dir) {
            warn!("Failed to clean up {}: {:#}", paths.extract_dir.display(), e);
        }
        Ok(())
    }

    fn fail(&self, error: ModuleError) {
        if self.settle() {
            self.abort(error);
        }
    }

    fn abort(&self, error: ModuleError) {
        let module = &self.module;
        self.queue.force_stop();
        warn!("Install of {} failed: {}", module.id(), error);
        self.close(InstallState::Unknown);
        module.progress().install_failed(module.id(), &error);
    }
}

fn create_parent(path: &Path) -> Result<(), ModuleError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ModuleError::fs(parent, e))?;
    }
    Ok(())
}
