use crate::task::Task;
use std::sync::Arc;
use std::task::{RawWaker, RawWakerVTable, Waker};

/// Wakes a task to resume execution.
///
/// The raw pointer is an `Arc<Task>` turned inside out: every clone is one more strong count and
/// every drop gives one back. Waking re-submits the task through its own ready-queue sender, so
/// a waker is valid from any thread and outlives the executor harmlessly. A wake for a task that
/// already completed is ignored by [`Task::schedule`].
pub(crate) fn task_waker(task: Arc<Task>) -> Waker {
    let ptr = Arc::into_raw(task) as *const ();
    unsafe { Waker::from_raw(RawWaker::new(ptr, &VTABLE)) }
}

unsafe fn clone(data: *const ()) -> RawWaker {
    // Bump the count without taking ownership of the caller's reference
    unsafe { Arc::increment_strong_count(data as *const Task) };
    RawWaker::new(data, &VTABLE)
}

unsafe fn wake(data: *const ()) {
    // Take ownership so the reference is released after scheduling
    let task = unsafe { Arc::from_raw(data as *const Task) };
    task.schedule();
}

unsafe fn wake_by_ref(data: *const ()) {
    unsafe { Arc::increment_strong_count(data as *const Task) };
    let task = unsafe { Arc::from_raw(data as *const Task) };
    task.schedule();
}

unsafe fn drop(data: *const ()) {
    let _ = unsafe { Arc::from_raw(data as *const Task) };
}

static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake_by_ref, drop);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ready_queue;
    use crate::task::JoinNotify;
    use crate::error::JoinError;

    struct Ignore;

    impl JoinNotify for Ignore {
        fn abort(&self, _: JoinError) {}
    }

    #[test]
    fn each_wake_enqueues_once() {
        let (tx, rx) = ready_queue();
        let task = Task::new(0, Box::pin(async {}), tx, Arc::new(Ignore));
        let waker = task_waker(task.clone());

        waker.wake_by_ref();
        waker.clone().wake();
        waker.wake_by_ref();

        assert_eq!(rx.len(), 3);
        while let Some(queued) = rx.try_recv() {
            assert_eq!(queued.id, 0);
        }
    }

    #[test]
    fn clones_keep_the_task_alive() {
        let (tx, _rx) = ready_queue();
        let task = Task::new(1, Box::pin(async {}), tx, Arc::new(Ignore));
        let waker = task_waker(task.clone());
        let clone = waker.clone();

        assert_eq!(Arc::strong_count(&task), 3);
        std::mem::drop(waker);
        std::mem::drop(clone);
        assert_eq!(Arc::strong_count(&task), 1);
    }

    #[test]
    fn wake_after_executor_shutdown_is_silent() {
        let (tx, rx) = ready_queue();
        let task = Task::new(2, Box::pin(async {}), tx, Arc::new(Ignore));
        std::mem::drop(rx);

        task_waker(task).wake();
    }
}
