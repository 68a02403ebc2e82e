//! Submission side of the executor.

use log::debug;
use metrics::{counter, gauge};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::SpawnError;
use crate::queue::ReadySender;
use crate::task::{JoinHandle, JoinState, Task, TaskFuture};

/// Turns operations into tasks on the ready queue.
///
/// Cloneable and `Send`; any thread may spawn. Each clone keeps the ready queue open, so the
/// executor's [`run`](super::Executor::run) only returns after all spawners are dropped.
#[derive(Clone)]
pub struct Spawner {
    ready: ReadySender,
    /// Shared by every clone, so ids are unique per executor.
    next_id: Arc<AtomicUsize>,
}

impl Spawner {
    pub(crate) fn new(ready: ReadySender) -> Self {
        Self {
            ready,
            next_id: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wraps `future` in a task and queues it for a first poll.
    ///
    /// Returns immediately without polling. Fails only when the executor has been dropped; the
    /// future is dropped with the error.
    pub fn spawn<F>(&self, future: F) -> Result<JoinHandle<F::Output>, SpawnError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let join: Arc<JoinState<F::Output>> = Arc::new(JoinState::new());

        let output = join.clone();
        let wrapped: TaskFuture = Box::pin(async move {
            output.complete(future.await);
        });

        counter!("coop_run_tasks_spawned_total").increment(1);
        gauge!("coop_run_tasks_pending_current").increment(1.0);

        let task = Task::new(id, wrapped, self.ready.clone(), join.clone());
        let weak = Arc::downgrade(&task);
        self.ready.enqueue(task)?;
        debug!("spawned task {id}");

        Ok(JoinHandle::new(id, join, weak))
    }
}
