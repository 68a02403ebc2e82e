//! A timer operation driven by its own background thread.

use log::trace;
use std::{
    future::Future,
    io,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
    thread,
    time::Duration,
};

use crate::state::{self, SharedState};

/// Completes once `duration` has elapsed.
///
/// Construction starts a dedicated thread that sleeps for the duration and then wakes whichever
/// task last polled the timer. Progress never depends on polling, so the executor polls a timer
/// twice: once to store its waker and once after the wake. Dropping the timer does not stop the
/// thread; its late wake finds no waiter or a finished task.
#[derive(Debug)]
pub struct Timer {
    shared: Arc<Mutex<SharedState>>,
}

impl Timer {
    /// Starts a timer.
    ///
    /// # Panics
    ///
    /// Panics if the OS refuses to spawn the timer thread, like [`std::thread::spawn`].
    pub fn new(duration: Duration) -> Self {
        Self::try_new(duration).expect("failed to spawn timer thread")
    }

    pub fn try_new(duration: Duration) -> io::Result<Self> {
        let shared = Arc::new(Mutex::new(SharedState::default()));
        let thread_shared = shared.clone();

        thread::Builder::new()
            .name("coop-timer".into())
            .spawn(move || {
                thread::sleep(duration);
                trace!("timer of {duration:?} fired");
                state::complete_and_wake(&thread_shared);
            })?;

        Ok(Self { shared })
    }

    pub fn is_elapsed(&self) -> bool {
        self.shared
            .lock()
            .map(|state| state.is_completed())
            .unwrap_or(false)
    }
}

impl Future for Timer {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // A poisoned lock fails this task only; the executor catches the panic.
        let mut state = self.shared.lock().expect("timer state lock poisoned");
        state.poll_completed(cx.waker())
    }
}

/// Waits for `duration` on a fresh [`Timer`].
pub fn sleep(duration: Duration) -> Timer {
    Timer::new(duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::{ArcWake, waker};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    struct Notify(Mutex<mpsc::Sender<()>>, AtomicUsize);

    impl ArcWake for Notify {
        fn wake_by_ref(arc_self: &Arc<Self>) {
            arc_self.1.fetch_add(1, Ordering::SeqCst);
            let _ = arc_self.0.lock().unwrap().send(());
        }
    }

    #[test]
    fn fires_stored_waker_once() {
        let (tx, rx) = mpsc::channel();
        let notify = Arc::new(Notify(Mutex::new(tx), AtomicUsize::new(0)));
        let waker = waker(notify.clone());
        let mut cx = Context::from_waker(&waker);
        let mut timer = Timer::new(Duration::from_millis(20));

        assert!(Pin::new(&mut timer).poll(&mut cx).is_pending());
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(timer.is_elapsed());
        assert!(Pin::new(&mut timer).poll(&mut cx).is_ready());
        // Polling after completion keeps returning Ready.
        assert!(Pin::new(&mut timer).poll(&mut cx).is_ready());
        assert_eq!(notify.1.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_timer_fires_harmlessly() {
        let (tx, rx) = mpsc::channel();
        let notify = Arc::new(Notify(Mutex::new(tx), AtomicUsize::new(0)));
        let waker = waker(notify.clone());
        let mut cx = Context::from_waker(&waker);
        let mut timer = Timer::new(Duration::from_millis(5));

        assert!(Pin::new(&mut timer).poll(&mut cx).is_pending());
        drop(timer);

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(notify.1.load(Ordering::SeqCst), 1);
    }
}
