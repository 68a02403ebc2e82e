//! Completion state shared between an operation and the thread that finishes it.

use std::sync::{Mutex, PoisonError};
use std::task::{Poll, Waker};

/// The record an operation shares with its external worker.
///
/// Always accessed under a `Mutex`. The operation side calls [`SharedState::poll_completed`],
/// the worker side calls [`complete_and_wake`]; neither holds the lock across anything that can
/// block.
#[derive(Debug, Default)]
pub struct SharedState {
    completed: bool,
    pending_waker: Option<Waker>,
}

impl SharedState {
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Ready once completed. Otherwise remembers `waker`, replacing any earlier one that would
    /// wake a different task.
    pub fn poll_completed(&mut self, waker: &Waker) -> Poll<()> {
        if self.completed {
            return Poll::Ready(());
        }
        match &self.pending_waker {
            Some(stored) if stored.will_wake(waker) => {}
            _ => self.pending_waker = Some(waker.clone()),
        }
        Poll::Pending
    }

    /// Marks the state completed and hands back the waker to invoke.
    pub fn complete(&mut self) -> Option<Waker> {
        self.completed = true;
        self.pending_waker.take()
    }
}

/// Completes `shared` and wakes the stored waker once the lock is released.
///
/// The worker must deliver its wake even if the operation side panicked while holding the lock;
/// both fields stay meaningful in that case.
pub fn complete_and_wake(shared: &Mutex<SharedState>) {
    let waker = shared
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .complete();
    if let Some(waker) = waker {
        waker.wake();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::{ArcWake, waker};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingWaker(AtomicUsize);

    impl ArcWake for CountingWaker {
        fn wake_by_ref(arc_self: &Arc<Self>) {
            arc_self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn latest_waker_receives_the_wake() {
        let first = Arc::new(CountingWaker::default());
        let second = Arc::new(CountingWaker::default());
        let shared = Mutex::new(SharedState::default());

        assert!(shared.lock().unwrap().poll_completed(&waker(first.clone())).is_pending());
        assert!(shared.lock().unwrap().poll_completed(&waker(second.clone())).is_pending());
        complete_and_wake(&shared);

        assert_eq!(first.0.load(Ordering::SeqCst), 0);
        assert_eq!(second.0.load(Ordering::SeqCst), 1);
        assert!(shared.lock().unwrap().poll_completed(&waker(second.clone())).is_ready());
    }

    #[test]
    fn completing_without_a_waiter_wakes_nobody() {
        let counter = Arc::new(CountingWaker::default());
        let shared = Mutex::new(SharedState::default());

        complete_and_wake(&shared);

        assert!(shared.lock().unwrap().is_completed());
        assert!(shared.lock().unwrap().poll_completed(&waker(counter.clone())).is_ready());
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }
}
