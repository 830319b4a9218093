//! Per-destination async locks.
//!
//! [`DownloadEngine::fetch`](super::DownloadEngine::fetch) does not coordinate
//! concurrent calls for the same destination: two of them would interleave
//! writes into one staging file. Callers that may issue such calls hold a
//! [`DestinationGuard`] around each fetch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// A map of destination path to async mutex, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct DestinationLocks {
    locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DestinationLocks {
    /// Creates an empty lock map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other guard for `destination` is alive, then returns one.
    pub async fn lock(&self, destination: &Path) -> DestinationGuard {
        let key = destination.to_path_buf();
        let mutex = Arc::clone(
            self.locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        if mutex.try_lock().is_err() {
            debug!(path = %destination.display(), "waiting for in-flight download of same destination");
        }
        let guard = mutex.lock_owned().await;
        DestinationGuard {
            guard: Some(guard),
            key,
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of destinations currently locked or waited on.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no destination is locked or waited on.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive hold on one destination; released on drop.
#[derive(Debug)]
pub struct DestinationGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: PathBuf,
    locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl Drop for DestinationGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map's own reference left: nobody holds or awaits this lock.
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
