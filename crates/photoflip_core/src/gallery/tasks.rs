//! Tracked background tasks and per-key debounced writes.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Default)]
struct TrackerInner {
    active: AtomicUsize,
    idle: Notify,
}

/// Decrements the active count when a tracked task finishes or is aborted.
struct ActiveGuard(Arc<TrackerInner>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if self.0.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Detached tasks whose completion can still be awaited as a group.
#[derive(Default)]
pub(crate) struct TaskTracker {
    inner: Arc<TrackerInner>,
}

impl TaskTracker {
    pub(crate) fn spawn<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        let guard = ActiveGuard(Arc::clone(&self.inner));
        tokio::spawn(async move {
            let _guard = guard;
            task.await;
        })
    }

    pub(crate) fn active(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Wait until no tracked task is running, including tasks spawned meanwhile.
    pub(crate) async fn settle(&self) {
        loop {
            let idle = self.inner.idle.notified();
            if self.active() == 0 {
                return;
            }
            idle.await;
        }
    }
}

/// At most one pending scheduled task per key; rescheduling restarts the delay.
#[derive(Default)]
pub(crate) struct Debouncer {
    pending: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Debouncer {
    fn pending(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `task` for `key` after `delay`, cancelling any earlier task for the same key.
    pub(crate) fn schedule<F>(&self, tasks: &TaskTracker, key: String, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tasks.spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        let mut pending = self.pending();
        pending.retain(|_, handle| !handle.is_finished());
        if let Some(previous) = pending.insert(key, handle) {
            previous.abort();
        }
    }

    /// Keys with a task that has not finished yet.
    pub(crate) fn pending_keys(&self) -> Vec<String> {
        self.pending()
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub(crate) fn cancel(&self, key: &str) {
        if let Some(handle) = self.pending().remove(key) {
            handle.abort();
        }
    }

    pub(crate) fn cancel_all(&self) {
        for (_, handle) in self.pending().drain() {
            handle.abort();
        }
    }
}
