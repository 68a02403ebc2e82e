use log::{debug, error, warn};
use metrics::counter;
use mio::{Events, Poll};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::reactor::{Reactor, Readiness, WAKE_TOKEN};
use crate::config::Config;

/// Owns the OS poller and runs the reactor's event loop.
///
/// Meant to live on its own thread; see [`Reactor::start`].
pub struct ReactorDriver {
    poll: Poll,
    events: Events,
    reactor: Arc<Reactor>,
    timeout: Option<Duration>,
}

impl ReactorDriver {
    pub(crate) fn new(
        poll: Poll,
        events: Events,
        reactor: Arc<Reactor>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            poll,
            events,
            reactor,
            timeout,
        }
    }

    /// Waits once for OS events and dispatches them. Returns how many events were dispatched.
    pub fn turn(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        if let Err(e) = self.poll.poll(&mut self.events, timeout) {
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(e);
        }

        let mut dispatched = 0;
        for event in self.events.iter() {
            let token = event.token();
            if token == WAKE_TOKEN {
                continue;
            }
            counter!("coop_run_reactor_events_total").increment(1);
            self.reactor.dispatch(token, Readiness::from_event(event));
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// The background event loop. Blocks until [`Reactor::shutdown`] is called or the OS poller
    /// fails.
    pub fn drive(mut self) -> io::Result<()> {
        debug!("reactor loop started");
        while !self.reactor.is_shutdown() {
            if let Err(e) = self.turn(self.timeout) {
                error!("reactor poll failed: {e}");
                return Err(e);
            }
        }
        debug!("reactor loop stopped");
        Ok(())
    }
}

/// A reactor whose driver runs on a background thread.
///
/// Dropping the handle shuts the loop down and joins the thread.
pub struct ReactorHandle {
    reactor: Arc<Reactor>,
    thread: Option<JoinHandle<io::Result<()>>>,
}

impl Reactor {
    /// Creates a reactor and starts its driver on a dedicated thread.
    pub fn start(config: &Config) -> io::Result<ReactorHandle> {
        let (reactor, driver) = Reactor::new(config)?;
        let thread = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || driver.drive())?;

        Ok(ReactorHandle {
            reactor,
            thread: Some(thread),
        })
    }
}

impl ReactorHandle {
    pub fn reactor(&self) -> &Arc<Reactor> {
        &self.reactor
    }

    /// Stops the driver, waits for its thread to exit and releases every parked waker.
    pub fn shutdown(mut self) -> io::Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> io::Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.reactor.shutdown()?;
        let joined = match thread.join() {
            Ok(result) => result,
            Err(_) => Err(io::Error::other("reactor thread panicked")),
        };
        // No event can be dispatched any more; tasks still parked here would never wake.
        self.reactor.release_waiters();
        joined
    }
}

impl Drop for ReactorHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("reactor did not shut down cleanly: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::{ArcWake, waker};
    use mio::net::UdpSocket;
    use mio::{Interest, Token};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingWaker(AtomicUsize);

    impl ArcWake for CountingWaker {
        fn wake_by_ref(arc_self: &Arc<Self>) {
            arc_self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn turn_dispatches_os_readiness() {
        let (reactor, mut driver) = Reactor::new(&Config::default()).unwrap();
        let mut receiver = UdpSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let token = reactor.attach(&mut receiver, Interest::READABLE).unwrap();
        let counter = Arc::new(CountingWaker::default());

        reactor.register(token, Interest::READABLE, waker(counter.clone()));
        sender
            .send_to(b"ping", receiver.local_addr().unwrap())
            .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while counter.0.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            driver.turn(Some(Duration::from_millis(100))).unwrap();
        }

        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(!reactor.is_registered(token));
        reactor.detach(&mut receiver, token).unwrap();
    }

    #[test]
    fn shutdown_joins_the_driver_thread() {
        let handle = Reactor::start(&Config::default()).unwrap();
        let reactor = handle.reactor().clone();

        handle.shutdown().unwrap();

        assert!(reactor.is_shutdown());
        assert!(!reactor.is_registered(Token(0)));
    }

    #[test]
    fn dropping_the_handle_releases_parked_wakers() {
        let handle = Reactor::start(&Config::default()).unwrap();
        let reactor = handle.reactor().clone();
        let counter = Arc::new(CountingWaker::default());
        reactor.register(Token(1), Interest::READABLE, waker(counter.clone()));
        assert_eq!(Arc::strong_count(&counter), 2);

        drop(handle);

        assert!(!reactor.is_registered(Token(1)));
        assert_eq!(Arc::strong_count(&counter), 1);
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }
}
