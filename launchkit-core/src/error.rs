//! Error types for module install and uninstall.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Manifest unavailable: {0}")]
    ManifestUnavailable(String),
    #[error("Module cannot run on this platform: {reason}")]
    PlatformIncompatible { reason: String },
    #[error("Download failed for {url}: {message}")]
    Download { url: String, message: String },
    #[error("Filesystem error at {}: {source}", path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Archive error at {}: {message}", path.display())]
    Archive { path: PathBuf, message: String },
    #[error("No async runtime available: {0}")]
    Runtime(String),
    #[error("Invalid module id {0:?}: must be a single path component")]
    InvalidModuleId(String),
    #[error("Install interrupted: {0}")]
    Interrupted(String),
}

impl ModuleError {
    pub(crate) fn fs(path: &Path, source: io::Error) -> Self {
        Self::FileSystem {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Wraps a failed file helper, keeping the underlying I/O error kind.
    pub(crate) fn file_op(path: &Path, err: anyhow::Error) -> Self {
        let kind = err
            .root_cause()
            .downcast_ref::<io::Error>()
            .map(io::Error::kind)
            .unwrap_or(io::ErrorKind::Other);
        Self::fs(path, io::Error::new(kind, format!("{:#}", err)))
    }

    pub(crate) fn archive(path: &Path, err: anyhow::Error) -> Self {
        Self::Archive {
            path: path.to_path_buf(),
            message: format!("{:#}", err),
        }
    }
}
