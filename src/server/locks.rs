//! Per-working-copy mutual exclusion.
//!
//! Merging checks out and resets the working copy, so two commands against the
//! same repository must never overlap. Commands for different repositories run
//! concurrently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async locks keyed by working copy path.
#[derive(Clone, Default)]
pub struct RepoLocks {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl RepoLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to the working copy at `path`.
    ///
    /// The lock is released when the returned guard is dropped.
    pub async fn lock(&self, path: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

impl std::fmt::Debug for RepoLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoLocks").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_path_is_exclusive() {
        let locks = RepoLocks::new();
        let guard = locks.lock(Path::new("/repos/a")).await;

        let locks2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = locks2.lock(Path::new("/repos/a")).await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_paths_do_not_block() {
        let locks = RepoLocks::new();
        let _a = locks.lock(Path::new("/repos/a")).await;

        tokio::time::timeout(Duration::from_secs(5), locks.lock(Path::new("/repos/b")))
            .await
            .expect("lock for another path should be free");
    }
}
