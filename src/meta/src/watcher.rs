// Copyright 2026 The Feature Platform Coordinator Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The completion watcher (C7, §4.7): a uniform handle exposing
//! non-blocking completion, blocking wait, and last-error access, plus a
//! multiplex implementation that aggregates child watchers. Producer tasks
//! report completion through a one-shot done channel, mirroring how the
//! teacher's `barrier/progress.rs` tracks actor-reported chain state.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};

pub type WatcherRef = Arc<dyn Watcher>;

#[async_trait]
pub trait Watcher: Send + Sync {
    /// Non-blocking: has the underlying work reached a terminal state.
    fn is_complete(&self) -> bool;
    /// Blocks until terminal, returning the error if the work failed.
    async fn wait(&self) -> Result<(), anyhow::Error>;
    /// The last observed error, if any, once terminal. `None` before
    /// completion or on success.
    fn err(&self) -> Option<String>;
}

/// Backs a single done-signal set by a producer task. `new` returns both the
/// reader half (the `Watcher`) and the writer half (`SyncWatcherHandle`),
/// matching the one-shot-channel pattern the spec calls for in §9.
pub struct SyncWatcher {
    done: Mutex<Option<Result<(), String>>>,
    notify: Notify,
}

pub struct SyncWatcherHandle {
    inner: Arc<SyncWatcher>,
}

impl SyncWatcherHandle {
    pub fn finish(&self, result: Result<(), anyhow::Error>) {
        let mut done = self.inner.done.lock();
        if done.is_some() {
            // A runner must report completion exactly once; a second call
            // (e.g. from a retried completion handler) is a no-op rather
            // than a panic, since workers are the retry unit (§7.5).
            return;
        }
        *done = Some(result.map_err(|e| e.to_string()));
        drop(done);
        self.inner.notify.notify_waiters();
    }
}

impl SyncWatcher {
    pub fn new() -> (WatcherRef, SyncWatcherHandle) {
        let inner = Arc::new(SyncWatcher {
            done: Mutex::new(None),
            notify: Notify::new(),
        });
        let handle = SyncWatcherHandle {
            inner: inner.clone(),
        };
        (inner, handle)
    }
}

#[async_trait]
impl Watcher for SyncWatcher {
    fn is_complete(&self) -> bool {
        self.done.lock().is_some()
    }

    async fn wait(&self) -> Result<(), anyhow::Error> {
        loop {
            // Register for the next notification before checking `done`:
            // `notified()` captures the current notification state at
            // creation time, so a `finish()` landing between the check and
            // the `.await` below still wakes this future instead of being
            // missed (`notify_waiters` stores no permit for a future
            // created afterwards).
            let notified = self.notify.notified();
            if let Some(result) = self.done.lock().clone() {
                return result.map_err(anyhow::Error::msg);
            }
            notified.await;
        }
    }

    fn err(&self) -> Option<String> {
        match &*self.done.lock() {
            Some(Err(e)) => Some(e.clone()),
            _ => None,
        }
    }
}

/// Aggregates child watchers: `is_complete` is the conjunction of all
/// children; `wait` awaits every child (even after the first failure, so no
/// worker handle is leaked) and returns the first error encountered (§4.2
/// failure policy, §4.7).
pub struct MultiplexWatcher {
    children: Vec<WatcherRef>,
}

impl MultiplexWatcher {
    pub fn new(children: Vec<WatcherRef>) -> WatcherRef {
        Arc::new(Self { children })
    }
}

#[async_trait]
impl Watcher for MultiplexWatcher {
    fn is_complete(&self) -> bool {
        self.children.iter().all(|c| c.is_complete())
    }

    async fn wait(&self) -> Result<(), anyhow::Error> {
        let mut first_error = None;
        for child in &self.children {
            if let Err(e) = child.wait().await {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn err(&self) -> Option<String> {
        self.children.iter().find_map(|c| c.err())
    }
}

/// A watcher that is already complete, used for already-exists short
/// circuits (§7.6) and tests.
pub fn completed_watcher(result: Result<(), anyhow::Error>) -> WatcherRef {
    let (watcher, handle) = SyncWatcher::new();
    handle.finish(result);
    watcher
}

/// Spawns `work` as a background task and returns a watcher that completes
/// when it does. This is the bridge between a `Runner::run` implementation
/// and an async unit of work driven to completion in-process.
pub fn watch_task<F>(work: F) -> WatcherRef
where
    F: std::future::Future<Output = Result<(), anyhow::Error>> + Send + 'static,
{
    let (watcher, handle) = SyncWatcher::new();
    tokio::spawn(async move {
        let result = work.await;
        handle.finish(result);
    });
    watcher
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sync_watcher_reports_success() {
        let (watcher, handle) = SyncWatcher::new();
        assert!(!watcher.is_complete());
        handle.finish(Ok(()));
        assert!(watcher.is_complete());
        assert!(watcher.wait().await.is_ok());
        assert!(watcher.err().is_none());
    }

    #[tokio::test]
    async fn sync_watcher_reports_failure() {
        let (watcher, handle) = SyncWatcher::new();
        handle.finish(Err(anyhow::anyhow!("boom")));
        assert!(watcher.wait().await.is_err());
        assert_eq!(watcher.err().as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn multiplex_waits_for_all_children_and_surfaces_first_error() {
        let (w1, h1) = SyncWatcher::new();
        let (w2, h2) = SyncWatcher::new();
        let (w3, h3) = SyncWatcher::new();
        let multiplex = MultiplexWatcher::new(vec![w1, w2, w3]);

        h2.finish(Err(anyhow::anyhow!("second failed")));
        h1.finish(Ok(()));
        h3.finish(Err(anyhow::anyhow!("third failed")));

        assert!(multiplex.is_complete());
        let err = multiplex.wait().await.unwrap_err();
        assert_eq!(err.to_string(), "second failed");
    }

    #[tokio::test]
    async fn watch_task_bridges_async_work_into_a_watcher() {
        let watcher = watch_task(async { Ok(()) });
        assert!(watcher.wait().await.is_ok());
    }
}
