use futures::future::BoxFuture;
use log::{debug, error, trace};
use metrics::{counter, gauge};
use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicU8, Ordering},
    },
    task::{Context, Poll, Waker},
};

use crate::error::JoinError;
use crate::queue::ReadySender;

pub type TaskId = usize;

const IDLE: u8 = 0;
const POLLING: u8 = 1;
const COMPLETED: u8 = 2;

/// A pinned, heap-allocated future that produces no output.
///
/// `Pin` guarantees that the future's data will not be moved in memory, which matters once the
/// future has handed out a waker that points back at its own state. The `Box` may move; the
/// future inside it never does.
pub type TaskFuture = BoxFuture<'static, ()>;

/// Receives the terminal outcome of a task that did not complete normally.
pub(crate) trait JoinNotify: Send + Sync {
    fn abort(&self, err: JoinError);
}

/// Represents an operation managed by the executor.
///
/// The future lives in `slot` while the task is idle. The executor takes it out for the length
/// of one poll and puts it back if the future is still pending, so the slot lock is never held
/// while user code runs.
pub struct Task {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// Current execution state of the task (idle, polling, or completed).
    state: AtomicU8,
    /// `None` once the task completed or was cancelled, or while it is being polled.
    slot: Mutex<Option<TaskFuture>>,
    /// Where the task re-submits itself when woken.
    queue: ReadySender,
    join: Arc<dyn JoinNotify>,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        future: TaskFuture,
        queue: ReadySender,
        join: Arc<dyn JoinNotify>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: AtomicU8::new(IDLE),
            slot: Mutex::new(Some(future)),
            queue,
            join,
        })
    }

    pub fn is_completed(&self) -> bool {
        self.state.load(Ordering::Acquire) == COMPLETED
    }

    // Nothing runs user code under this lock, so a poisoned guard still holds a valid slot.
    fn slot(&self) -> MutexGuard<'_, Option<TaskFuture>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the future out of the task for polling.
    ///
    /// Returns `None` for a completed or cancelled task, which turns a redundant queue entry into
    /// a no-op.
    pub(crate) fn try_take(&self) -> Option<TaskFuture> {
        let mut slot = self.slot();
        let future = slot.take()?;
        self.state.store(POLLING, Ordering::Release);
        Some(future)
    }

    /// Polls a future previously returned by [`Task::try_take`].
    ///
    /// Ready drops the future and marks the task completed. Pending hands the future back to the
    /// slot so the next wake can find it. A panic is contained to this task.
    pub(crate) fn poll(&self, mut future: TaskFuture, waker: &Waker) {
        let mut cx = Context::from_waker(waker);
        counter!("coop_run_task_polls_total").increment(1);
        trace!("polling task {}", self.id);

        match panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx))) {
            Ok(Poll::Ready(())) => {
                drop(future);
                if self.finish() {
                    debug!("task {} completed", self.id);
                }
            }
            Ok(Poll::Pending) => {
                let mut slot = self.slot();
                // A cancel that raced with this poll already marked the task completed.
                if self.state.load(Ordering::Acquire) == COMPLETED {
                    drop(slot);
                    drop(future);
                } else {
                    *slot = Some(future);
                    self.state.store(IDLE, Ordering::Release);
                }
            }
            Err(_) => {
                error!("task {} panicked while being polled", self.id);
                drop(future);
                if self.finish() {
                    self.join.abort(JoinError::Panicked);
                }
            }
        }
    }

    /// Enqueues the task for another poll. Called by its wakers.
    pub(crate) fn schedule(self: Arc<Self>) {
        if self.is_completed() {
            trace!("wake for completed task {} ignored", self.id);
            return;
        }
        counter!("coop_run_task_wakes_total").increment(1);
        let (id, queue) = (self.id, self.queue.clone());
        if queue.enqueue(self).is_err() {
            trace!("wake for task {id} dropped, executor has shut down");
        }
    }

    /// Drops the stored future so the task is never polled again.
    ///
    /// Returns `false` if the task had already finished.
    pub(crate) fn cancel(&self) -> bool {
        let future = {
            let mut slot = self.slot();
            if !self.finish() {
                return false;
            }
            slot.take()
        };
        drop(future);
        self.join.abort(JoinError::Cancelled);
        debug!("task {} cancelled", self.id);
        true
    }

    fn finish(&self) -> bool {
        let finished = self.state.swap(COMPLETED, Ordering::AcqRel) != COMPLETED;
        if finished {
            gauge!("coop_run_tasks_pending_current").decrement(1.0);
        }
        finished
    }
}

impl Drop for Task {
    /// A task dropped before completing lost every path back to the executor.
    fn drop(&mut self) {
        if self.finish() {
            self.join.abort(JoinError::Shutdown);
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("completed", &self.is_completed())
            .finish()
    }
}

enum JoinSlot<T> {
    Running,
    Done(Result<T, JoinError>),
    Taken,
}

pub(crate) struct JoinState<T> {
    slot: Mutex<JoinSlot<T>>,
}

impl<T> JoinState<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(JoinSlot::Running),
        }
    }

    fn lock(&self) -> MutexGuard<'_, JoinSlot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, outcome: Result<T, JoinError>) {
        let mut slot = self.lock();
        if matches!(*slot, JoinSlot::Running) {
            *slot = JoinSlot::Done(outcome);
        }
    }

    pub(crate) fn complete(&self, output: T) {
        self.settle(Ok(output));
    }
}

impl<T: Send> JoinNotify for JoinState<T> {
    fn abort(&self, err: JoinError) {
        self.settle(Err(err));
    }
}

/// An owned permission to observe or cancel a spawned task.
///
/// Dropping the handle detaches the task: it keeps running and its output is discarded. The
/// handle holds the task weakly, so it never keeps the executor alive on its own.
pub struct JoinHandle<T> {
    id: TaskId,
    state: Arc<JoinState<T>>,
    task: Weak<Task>,
}

impl<T> JoinHandle<T> {
    pub(crate) fn new(id: TaskId, state: Arc<JoinState<T>>, task: Weak<Task>) -> Self {
        Self { id, state, task }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        !matches!(*self.state.lock(), JoinSlot::Running)
    }

    /// Takes the task's outcome if it has finished.
    ///
    /// Returns `None` while the task is still running and after the outcome has been taken.
    pub fn try_join(&self) -> Option<Result<T, JoinError>> {
        let mut slot = self.state.lock();
        match std::mem::replace(&mut *slot, JoinSlot::Taken) {
            JoinSlot::Done(outcome) => Some(outcome),
            JoinSlot::Running => {
                *slot = JoinSlot::Running;
                None
            }
            JoinSlot::Taken => None,
        }
    }

    /// Stops the task from being polled again.
    ///
    /// Background work the task started (a sleeping timer thread, a reactor registration) is
    /// not interrupted; its eventual wake finds the task completed and does nothing. Returns
    /// `false` if the task had already finished.
    pub fn cancel(&self) -> bool {
        match self.task.upgrade() {
            Some(task) => task.cancel(),
            None => false,
        }
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}
