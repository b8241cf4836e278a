//! Tokio-backed download queue.
//!
//! Each queue owns one dispatcher task. Fetches run concurrently on a
//! `JoinSet` up to the configured limit; completion callbacks run one at a
//! time on the blocking pool, so a callback always finishes before the next
//! one starts and may safely do filesystem work.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    panic_message, CompletionHandler, DownloadItem, DownloadOutcome, DownloadQueue,
    DownloadTarget, Fetcher, Payload, QueueFactory,
};

#[derive(Default)]
struct QueueState {
    pending: VecDeque<DownloadItem>,
    stop_when_idle: bool,
    started: bool,
    aborted: bool,
    finished: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    wake: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A single-use queue that fetches through a [`Fetcher`].
pub struct TaskQueue {
    id: Uuid,
    shared: Arc<Shared>,
    fetcher: Arc<dyn Fetcher>,
    concurrency: usize,
    runtime: Handle,
}

impl TaskQueue {
    pub fn new(fetcher: Arc<dyn Fetcher>, concurrency: usize, runtime: Handle) -> Self {
        Self {
            id: Uuid::new_v4(),
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                wake: Notify::new(),
            }),
            fetcher,
            concurrency: concurrency.max(1),
            runtime,
        }
    }

    /// Identifier used in log lines for this run.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// True once the dispatcher has exited, either drained or force-stopped.
    pub fn is_finished(&self) -> bool {
        self.shared.lock().finished
    }
}

impl DownloadQueue for TaskQueue {
    fn add_download(&self, item: DownloadItem) {
        let mut state = self.shared.lock();
        if state.aborted || state.finished {
            debug!("Queue {} no longer accepts items, dropping {}", self.id, item.url);
            return;
        }
        debug!("Queue {}: enqueued {}", self.id, item.url);
        state.pending.push_back(item);
        drop(state);
        self.shared.wake.notify_one();
    }

    fn stop_after_all_done(&self) {
        self.shared.lock().stop_when_idle = true;
        self.shared.wake.notify_one();
    }

    fn start(&self) {
        {
            let mut state = self.shared.lock();
            if state.started {
                warn!("Queue {} already started", self.id);
                return;
            }
            state.started = true;
        }

        info!(
            "Starting download queue {} (concurrency {})",
            self.id, self.concurrency
        );
        self.runtime.spawn(dispatch(
            self.id,
            self.shared.clone(),
            self.fetcher.clone(),
            self.concurrency,
        ));
    }

    fn force_stop(&self) {
        let mut state = self.shared.lock();
        if state.aborted {
            return;
        }
        info!(
            "Force-stopping queue {} ({} pending)",
            self.id,
            state.pending.len()
        );
        state.aborted = true;
        state.pending.clear();
        drop(state);
        self.shared.wake.notify_one();
    }
}

type Finished = (String, Result<Payload, String>, CompletionHandler);

async fn dispatch(id: Uuid, shared: Arc<Shared>, fetcher: Arc<dyn Fetcher>, concurrency: usize) {
    let mut running: JoinSet<Finished> = JoinSet::new();
    let mut completed = 0usize;

    loop {
        {
            let mut state = shared.lock();
            if state.aborted {
                break;
            }
            while running.len() < concurrency {
                let Some(item) = state.pending.pop_front() else {
                    break;
                };
                let fetcher = fetcher.clone();
                running.spawn(async move {
                    let DownloadItem {
                        url,
                        target,
                        on_complete,
                    } = item;
                    // A panicking fetcher still owes the item its callback.
                    let fetch = fetch_item(fetcher.as_ref(), &url, &target);
                    let result = match AssertUnwindSafe(fetch).catch_unwind().await {
                        Ok(result) => result,
                        Err(panic) => Err(format!("fetch panicked: {}", panic_message(&*panic))),
                    };
                    (url, result, on_complete)
                });
            }
            if running.is_empty() && state.pending.is_empty() && state.stop_when_idle {
                break;
            }
        }

        if running.is_empty() {
            shared.wake.notified().await;
            continue;
        }

        let joined = tokio::select! {
            joined = running.join_next() => joined,
            _ = shared.wake.notified() => continue,
        };

        let (url, result, on_complete) = match joined {
            Some(Ok(finished)) => finished,
            Some(Err(e)) => {
                error!("Queue {}: download task was cancelled: {}", id, e);
                continue;
            }
            None => continue,
        };

        let queue_drained = {
            let state = shared.lock();
            if state.aborted {
                break;
            }
            state.stop_when_idle && state.pending.is_empty() && running.is_empty()
        };

        completed += 1;
        let outcome = DownloadOutcome {
            url,
            result,
            queue_drained,
        };
        if let Err(e) = tokio::task::spawn_blocking(move || on_complete(outcome)).await {
            error!("Queue {}: completion handler panicked: {}", id, e);
        }
    }

    running.abort_all();
    let mut state = shared.lock();
    state.finished = true;
    if state.aborted {
        info!("Queue {} stopped after {} completed items", id, completed);
    } else {
        info!("Queue {} drained ({} items)", id, completed);
    }
}

async fn fetch_item(
    fetcher: &dyn Fetcher,
    url: &str,
    target: &DownloadTarget,
) -> Result<Payload, String> {
    let result = match target {
        DownloadTarget::Memory => fetcher.fetch(url).await.map(Payload::Bytes),
        DownloadTarget::File(path) => fetcher
            .fetch_to_file(url, path)
            .await
            .map(|bytes| Payload::File {
                path: path.clone(),
                bytes,
            }),
    };
    result.map_err(|e| format!("{:#}", e))
}

/// Hands out [`TaskQueue`]s sharing one fetcher and concurrency limit.
pub struct TaskQueueFactory {
    fetcher: Arc<dyn Fetcher>,
    concurrency: usize,
    runtime: Handle,
}

impl TaskQueueFactory {
    pub fn new(fetcher: Arc<dyn Fetcher>, concurrency: usize, runtime: Handle) -> Self {
        Self {
            fetcher,
            concurrency,
            runtime,
        }
    }
}

impl QueueFactory for TaskQueueFactory {
    fn create_queue(&self) -> Arc<dyn DownloadQueue> {
        Arc::new(TaskQueue::new(
            self.fetcher.clone(),
            self.concurrency,
            self.runtime.clone(),
        ))
    }
}
