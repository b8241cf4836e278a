//! Download queue capability.
//!
//! Install runs schedule their downloads on a [`DownloadQueue`] and react to
//! each item's completion callback. A queue is single-use: one queue per
//! install run, obtained from a [`QueueFactory`].
//!
//! - `task_queue`: tokio-backed implementation with bounded concurrency
//! - `fetcher`: where bytes come from (`HttpFetcher` over reqwest)

pub mod fetcher;
pub mod task_queue;

#[cfg(test)]
pub(crate) mod memory;

pub use fetcher::{Fetcher, HttpFetcher};
pub use task_queue::{TaskQueue, TaskQueueFactory};

use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Callback invoked exactly once when an item finishes, unless the queue was
/// force-stopped first.
pub type CompletionHandler = Box<dyn FnOnce(DownloadOutcome) + Send + 'static>;

/// Where a downloaded payload goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadTarget {
    /// Keep the bytes in memory (small documents such as manifests).
    Memory,
    /// Stream to a file, creating parent directories.
    File(PathBuf),
}

/// One scheduled download.
pub struct DownloadItem {
    pub url: String,
    pub target: DownloadTarget,
    pub(crate) on_complete: CompletionHandler,
}

impl DownloadItem {
    /// Downloads into memory.
    pub fn to_memory<F>(url: impl Into<String>, on_complete: F) -> Self
    where
        F: FnOnce(DownloadOutcome) + Send + 'static,
    {
        Self {
            url: url.into(),
            target: DownloadTarget::Memory,
            on_complete: Box::new(on_complete),
        }
    }

    /// Downloads to a file.
    pub fn to_file<F>(url: impl Into<String>, dest: impl Into<PathBuf>, on_complete: F) -> Self
    where
        F: FnOnce(DownloadOutcome) + Send + 'static,
    {
        Self {
            url: url.into(),
            target: DownloadTarget::File(dest.into()),
            on_complete: Box::new(on_complete),
        }
    }
}

impl fmt::Debug for DownloadItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadItem")
            .field("url", &self.url)
            .field("target", &self.target)
            .finish()
    }
}

/// What a finished download produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Bytes(Vec<u8>),
    File { path: PathBuf, bytes: u64 },
}

/// Result of one item, handed to its completion callback.
#[derive(Debug)]
pub struct DownloadOutcome {
    pub url: String,
    pub result: Result<Payload, String>,
    /// Nothing else was pending or running when this item completed, and the
    /// queue was told to stop once idle.
    ///
    /// The flag is computed before the callback runs, so items the callback
    /// itself enqueues are not taken into account. A run whose callbacks add
    /// work can therefore see the flag more than once: a manifest callback
    /// that queues the binaries gets `true`, and so does the last binary.
    /// Only the final `true` is followed by the queue stopping; consumers
    /// that enqueue from a callback should act on the flag only in callbacks
    /// that add nothing.
    pub queue_drained: bool,
}

impl DownloadOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A single-use download queue.
pub trait DownloadQueue: Send + Sync {
    /// Schedules an item. Items may be added before or after `start`,
    /// including from inside a completion callback.
    fn add_download(&self, item: DownloadItem);

    /// Stop once nothing is pending or running.
    fn stop_after_all_done(&self);

    /// Begins processing. Calling it twice has no effect.
    fn start(&self);

    /// Drops pending items, aborts running ones, and suppresses any further
    /// callbacks.
    fn force_stop(&self);
}

/// Creates a fresh queue for each install run.
pub trait QueueFactory: Send + Sync {
    fn create_queue(&self) -> Arc<dyn DownloadQueue>;
}
