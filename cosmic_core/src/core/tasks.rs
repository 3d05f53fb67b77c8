//! # Task Arena
//!
//! Each component owns one arena holding at most one background task per
//! [`TaskKind`]. Arming a kind again replaces (and cancels) the previous task of
//! that kind, and teardown cancels everything the component armed, so no timer
//! fires after its owner shut down.
//!
//! Cancellation goes through a `CancellationToken` per task, the same linger
//! pattern the subscription registry used for delayed upstream teardown.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The purpose a background task serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Delayed reconnection attempt.
    Reconnect,
    /// Socket read loop of the current session.
    Reader,
    /// Micro-batch flush.
    Batch,
    /// Staleness timeout.
    Stale,
    /// Periodic full-update request.
    Refresh,
}

impl TaskKind {
    fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Reconnect => "reconnect",
            TaskKind::Reader => "reader",
            TaskKind::Batch => "batch",
            TaskKind::Stale => "stale",
            TaskKind::Refresh => "refresh",
        }
    }
}

struct TaskEntry {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl TaskEntry {
    fn is_live(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

/// Background tasks of one component, keyed by purpose.
pub struct TaskArena {
    owner: &'static str,
    tasks: Mutex<HashMap<TaskKind, TaskEntry>>,
}

impl TaskArena {
    /// Creates an empty arena. `owner` names the component in log lines.
    pub fn new(owner: &'static str) -> Self {
        Self {
            owner,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `task` once `delay` has elapsed, unless the timer is cancelled or
    /// replaced first. Once the delay elapsed the task runs to completion even
    /// if its kind is re-armed meanwhile, so a timer may safely re-arm itself.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, kind: TaskKind, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(delay) => task.await,
            }
        });
        log::trace!("{}: armed {} timer ({:?})", self.owner, kind.as_str(), delay);
        self.replace(kind, TaskEntry { token, handle });
    }

    /// Runs `task` until it completes or is cancelled. Cancellation drops the
    /// task at its next suspension point.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, kind: TaskKind, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = task => {}
            }
        });
        self.replace(kind, TaskEntry { token, handle });
    }

    /// Cancels the task of `kind`. Returns whether one was still live.
    pub fn cancel(&self, kind: TaskKind) -> bool {
        match self.tasks.lock().remove(&kind) {
            Some(entry) => {
                let live = entry.is_live();
                entry.token.cancel();
                if live {
                    log::trace!("{}: cancelled {} task", self.owner, kind.as_str());
                }
                live
            }
            None => false,
        }
    }

    /// True while a task of `kind` is armed or running.
    pub fn is_pending(&self, kind: TaskKind) -> bool {
        self.tasks
            .lock()
            .get(&kind)
            .map(TaskEntry::is_live)
            .unwrap_or(false)
    }

    /// Cancels every task in the arena.
    pub fn cancel_all(&self) {
        let drained: Vec<(TaskKind, TaskEntry)> = self.tasks.lock().drain().collect();
        for (kind, entry) in drained {
            if entry.is_live() {
                log::debug!("{}: cancelling {} task on teardown", self.owner, kind.as_str());
            }
            entry.token.cancel();
        }
    }

    fn replace(&self, kind: TaskKind, entry: TaskEntry) {
        if let Some(previous) = self.tasks.lock().insert(kind, entry) {
            previous.token.cancel();
        }
    }
}
