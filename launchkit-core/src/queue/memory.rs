//! In-memory fetcher for tests.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use super::Fetcher;

/// Serves registered URLs from memory and records every request.
#[derive(Default)]
pub(crate) struct MemoryFetcher {
    files: Mutex<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<String>>,
    panics: Mutex<HashSet<String>>,
    delay: Option<Duration>,
}

impl MemoryFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps this long before answering.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn insert(&self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.lock().unwrap().insert(url.into(), bytes.into());
    }

    /// Fetching this URL panics instead of answering.
    pub(crate) fn panic_on(&self, url: impl Into<String>) {
        self.panics.lock().unwrap().insert(url.into());
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn fetch_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|requested| requested.as_str() == url)
            .count()
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panics.lock().unwrap().contains(url) {
            panic!("fetcher crashed on {}", url);
        }
        let found = self.files.lock().unwrap().get(url).cloned();
        found.ok_or_else(|| anyhow::anyhow!("404 Not Found: {}", url))
    }
}
