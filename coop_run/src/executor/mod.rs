//! The task executor for driving operations to completion.
//!
//! A single thread pops tasks from the ready queue in FIFO order and polls each one. Scheduling
//! is cooperative: the executor only ever blocks on the empty queue, never inside a poll, and an
//! operation that never returns `Pending` keeps every other task waiting.

mod spawner;

pub use self::spawner::Spawner;

use log::{debug, trace};
use std::sync::Arc;

use crate::queue::{ReadyReceiver, ready_queue};
use crate::task::Task;
use crate::waker;

/// Creates an executor and the spawner that feeds it.
///
/// The executor's [`run`](Executor::run) returns once the spawner and every clone of it are gone
/// and no task can be woken any more.
pub fn new_executor_and_spawner() -> (Executor, Spawner) {
    let (tx, rx) = ready_queue();
    (Executor { ready: rx }, Spawner::new(tx))
}

/// A single-threaded executor for cooperative tasks.
pub struct Executor {
    ready: ReadyReceiver,
}

impl Executor {
    /// Runs the scheduling loop until the ready queue is closed and drained.
    pub fn run(&self) {
        debug!("executor started");
        while let Some(task) = self.ready.recv() {
            self.poll(task);
        }
        debug!("executor finished, ready queue closed");
    }

    /// Runs the scheduling loop until `done` returns true or the ready queue closes.
    ///
    /// `done` is checked before every blocking wait, so a condition set by the task just polled
    /// ends the loop without waiting for another wake.
    pub fn run_until(&self, mut done: impl FnMut() -> bool) {
        while !done() {
            match self.ready.recv() {
                Some(task) => self.poll(task),
                None => break,
            }
        }
    }

    /// Polls everything currently queued without blocking; returns the number of tasks popped.
    pub fn run_until_stalled(&self) -> usize {
        let mut popped = 0;
        while let Some(task) = self.ready.try_recv() {
            self.poll(task);
            popped += 1;
        }
        popped
    }

    /// Number of queue entries waiting to be polled, redundant entries included.
    pub fn queued(&self) -> usize {
        self.ready.len()
    }

    /// Polls a task's future with a waker bound to that task.
    ///
    /// The waker is rebuilt per poll over the same `Arc<Task>`, so all of them `will_wake` each
    /// other; caching one on the task would make the task own a strong reference to itself.
    ///
    /// A completed or cancelled task has no future to take, so a duplicate entry is skipped.
    fn poll(&self, task: Arc<Task>) {
        match task.try_take() {
            Some(future) => {
                let waker = waker::task_waker(task.clone());
                task.poll(future, &waker);
            }
            None => trace!("skipping finished task {}", task.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{JoinError, SpawnError};
    use std::future::poll_fn;
    use std::sync::Mutex;
    use std::task::{Poll, Waker};

    #[test]
    fn run_returns_once_spawner_is_gone() {
        let (executor, spawner) = new_executor_and_spawner();
        let handle = spawner.spawn(async { 7 }).unwrap();
        drop(spawner);

        executor.run();

        assert_eq!(handle.try_join(), Some(Ok(7)));
    }

    #[test]
    fn spawn_does_not_poll() {
        let (executor, spawner) = new_executor_and_spawner();
        let handle = spawner.spawn(async {}).unwrap();

        assert!(!handle.is_finished());
        assert_eq!(executor.queued(), 1);
        assert_eq!(executor.run_until_stalled(), 1);
        assert!(handle.is_finished());
    }

    #[test]
    fn spawn_into_dropped_executor_fails() {
        let (executor, spawner) = new_executor_and_spawner();
        drop(executor);

        assert_eq!(spawner.spawn(async {}).unwrap_err(), SpawnError::Shutdown);
    }

    #[test]
    fn panicking_task_does_not_stop_the_loop() {
        let (executor, spawner) = new_executor_and_spawner();
        let bad = spawner
            .spawn(async {
                let fail = true;
                if fail {
                    panic!("operation failed");
                }
            })
            .unwrap();
        let good = spawner.spawn(async { "still here" }).unwrap();
        drop(spawner);

        executor.run();

        assert_eq!(bad.try_join(), Some(Err(JoinError::Panicked)));
        assert_eq!(good.try_join(), Some(Ok("still here")));
    }

    #[test]
    fn task_ids_are_scoped_to_one_executor() {
        let (_first, spawner) = new_executor_and_spawner();
        let clone = spawner.clone();
        let a = spawner.spawn(async {}).unwrap();
        let b = clone.spawn(async {}).unwrap();
        assert_eq!((a.id(), b.id()), (0, 1));

        let (_second, other) = new_executor_and_spawner();
        assert_eq!(other.spawn(async {}).unwrap().id(), 0);
    }

    #[test]
    fn every_poll_of_a_task_gets_an_equivalent_waker() {
        let (executor, spawner) = new_executor_and_spawner();
        let seen: Arc<Mutex<Vec<Waker>>> = Arc::default();

        let record = seen.clone();
        spawner
            .spawn(poll_fn(move |cx| {
                let mut seen = record.lock().unwrap();
                seen.push(cx.waker().clone());
                if seen.len() < 2 {
                    cx.waker().wake_by_ref();
                    Poll::Pending
                } else {
                    Poll::Ready(())
                }
            }))
            .unwrap();
        // The recorded wakers keep the queue open, so `run` would never return.
        assert_eq!(executor.run_until_stalled(), 2);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].will_wake(&seen[1]));
    }

    #[test]
    fn cancelled_task_is_not_polled_again() {
        let (executor, spawner) = new_executor_and_spawner();
        let parked: Arc<Mutex<Option<Waker>>> = Arc::default();
        let polls = Arc::new(Mutex::new(0));

        let (slot, count) = (parked.clone(), polls.clone());
        let handle = spawner
            .spawn(poll_fn(move |cx| {
                *count.lock().unwrap() += 1;
                *slot.lock().unwrap() = Some(cx.waker().clone());
                Poll::<()>::Pending
            }))
            .unwrap();
        executor.run_until_stalled();

        assert!(handle.cancel());
        parked.lock().unwrap().take().unwrap().wake();
        executor.run_until_stalled();

        assert_eq!(*polls.lock().unwrap(), 1);
        assert_eq!(handle.try_join(), Some(Err(JoinError::Cancelled)));
    }
}
