//! Structured cancellation scope for bridge tasks
//!
//! Every task spawned into a [`TaskGroup`] gets a child of the group's
//! cancellation token. [`TaskGroup::join`] waits for all of them and cancels
//! the scope the moment one fails fatally; [`TaskGroup::shutdown`] cancels
//! the scope and gives stragglers a bounded grace period before aborting them.

use crate::error::{BridgeError, CancellationFailure};
use futures::FutureExt;
use std::collections::BTreeSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Terminal state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Completed,
    Cancelled,
    Failed,
}

/// A finished task and what it returned
#[derive(Debug)]
pub struct TaskRecord<T> {
    pub name: String,
    pub result: Result<T, BridgeError>,
}

impl<T> TaskRecord<T> {
    pub fn status(&self) -> TaskStatus {
        match &self.result {
            Ok(_) => TaskStatus::Completed,
            Err(BridgeError::Cancelled) => TaskStatus::Cancelled,
            Err(_) => TaskStatus::Failed,
        }
    }
}

/// Names of tasks still running, shared with the tasks themselves
#[derive(Clone, Default)]
struct AliveSet(Arc<Mutex<BTreeSet<String>>>);

impl AliveSet {
    fn insert(&self, name: &str) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.to_string());
    }

    fn remove(&self, name: &str) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(name);
    }

    fn snapshot(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

/// Removes a task from the alive set however it ends, abort included
struct AliveGuard {
    alive: AliveSet,
    name: String,
}

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.alive.remove(&self.name);
    }
}

pub struct TaskGroup<T> {
    token: CancellationToken,
    set: JoinSet<TaskRecord<T>>,
    alive: AliveSet,
    finished: Vec<TaskRecord<T>>,
}

impl<T: Send + 'static> TaskGroup<T> {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            set: JoinSet::new(),
            alive: AliveSet::default(),
            finished: Vec::new(),
        }
    }

    /// Spawn a named task with its own child token
    ///
    /// A panic inside the task is reported as [`BridgeError::TaskPanicked`].
    pub fn spawn<F, Fut>(&mut self, name: impl Into<String>, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, BridgeError>> + Send + 'static,
    {
        let name = name.into();
        let future = AssertUnwindSafe(task(self.token.child_token())).catch_unwind();

        self.alive.insert(&name);
        let guard = AliveGuard {
            alive: self.alive.clone(),
            name: name.clone(),
        };

        debug!(task = %name, "Task spawned");
        self.set.spawn(async move {
            let result = match future.await {
                Ok(result) => result,
                Err(_) => Err(BridgeError::TaskPanicked {
                    name: guard.name.clone(),
                }),
            };
            TaskRecord {
                name: guard.name.clone(),
                result,
            }
        });
    }

    /// Number of tasks not yet joined
    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    fn record(&mut self, joined: Result<TaskRecord<T>, JoinError>) {
        match joined {
            Ok(record) => {
                match &record.result {
                    Ok(_) => debug!(task = %record.name, "Task completed"),
                    Err(BridgeError::Cancelled) => debug!(task = %record.name, "Task cancelled"),
                    Err(e) if e.is_fatal() => {
                        error!(task = %record.name, error = %e, "Task failed fatally, cancelling the rest");
                        self.token.cancel();
                    }
                    Err(e) => warn!(task = %record.name, error = %e, "Task failed"),
                }
                self.finished.push(record);
            }
            // Only aborted tasks end up here; panics are caught inside the task
            Err(e) => debug!(error = %e, "Task aborted"),
        }
    }

    /// Wait for every task to reach a terminal state
    ///
    /// Cancel safe: records of tasks joined before the future is dropped are kept.
    pub async fn join(&mut self) {
        while let Some(joined) = self.set.join_next().await {
            self.record(joined);
        }
    }

    /// Cancel the scope and wait up to `grace` for the tasks to stop
    ///
    /// Tasks still running afterwards are aborted and reported.
    pub async fn shutdown(&mut self, grace: Duration) -> Vec<CancellationFailure> {
        self.token.cancel();

        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = self.set.join_next().await {
                self.record(joined);
            }
        })
        .await;

        if drained.is_ok() {
            return Vec::new();
        }

        let stuck = self.alive.snapshot();
        self.set.abort_all();
        while let Some(joined) = self.set.join_next().await {
            self.record(joined);
        }

        stuck
            .into_iter()
            .map(|task| {
                let failure = CancellationFailure { task, grace };
                warn!(task = %failure.task, ?grace, "Task ignored cancellation, aborted");
                failure
            })
            .collect()
    }

    /// Records of every task joined so far, in completion order
    pub fn take_finished(&mut self) -> Vec<TaskRecord<T>> {
        std::mem::take(&mut self.finished)
    }
}

impl<T: Send + 'static> Default for TaskGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_collects_every_task() {
        let mut group = TaskGroup::new();
        group.spawn("one", |_| async { Ok::<_, BridgeError>(1) });
        group.spawn("two", |_| async { Ok::<_, BridgeError>(2) });

        group.join().await;
        let mut values: Vec<i32> = group
            .take_finished()
            .into_iter()
            .map(|r| r.result.unwrap())
            .collect();
        values.sort();
        assert_eq!(values, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_fatal_failure_cancels_siblings() {
        let mut group: TaskGroup<()> = TaskGroup::new();
        group.spawn("waiter", |token| async move {
            token.cancelled().await;
            Err::<(), _>(BridgeError::Cancelled)
        });
        group.spawn("broken", |_| async {
            Err::<(), _>(BridgeError::from(
                crate::transport::TransportError::ConnectionLost("gone".into()),
            ))
        });

        group.join().await;
        let records = group.take_finished();
        let waiter = records.iter().find(|r| r.name == "waiter").unwrap();
        let broken = records.iter().find(|r| r.name == "broken").unwrap();
        assert_eq!(waiter.status(), TaskStatus::Cancelled);
        assert_eq!(broken.status(), TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_panic_is_reported_by_name() {
        let mut group: TaskGroup<()> = TaskGroup::new();
        group.spawn("boom", |_| async {
            let values: Vec<()> = Vec::new();
            Ok::<(), BridgeError>(values[0])
        });

        group.join().await;
        let records = group.take_finished();
        assert!(matches!(
            &records[0].result,
            Err(BridgeError::TaskPanicked { name }) if name == "boom"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_stragglers() {
        let mut group: TaskGroup<()> = TaskGroup::new();
        group.spawn("polite", |token| async move {
            token.cancelled().await;
            Err::<(), _>(BridgeError::Cancelled)
        });
        group.spawn("stubborn", |_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<(), BridgeError>(())
        });

        let failures = group.shutdown(Duration::from_millis(100)).await;

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].task, "stubborn");
        assert!(group.is_empty());
        let records = group.take_finished();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status(), TaskStatus::Cancelled);
    }
}
