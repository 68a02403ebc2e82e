use log::{debug, trace};
use mio::event::{Event, Source};
use mio::{Events, Interest, Poll, Registry, Token};
use std::collections::{HashMap, HashSet};
use std::io;
use std::ops::{BitOr, BitOrAssign};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::Waker;

use super::driver::ReactorDriver;
use crate::config::Config;

/// Reserved for the driver's own shutdown signal.
pub(crate) const WAKE_TOKEN: Token = Token(usize::MAX);

/// Readiness reported for a token.
///
/// Error and hang-up conditions count as both readable and writable, so the woken operation
/// retries and observes the error itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness(u8);

impl Readiness {
    pub const EMPTY: Readiness = Readiness(0);
    pub const READABLE: Readiness = Readiness(0b01);
    pub const WRITABLE: Readiness = Readiness(0b10);

    pub fn from_event(event: &Event) -> Self {
        let mut ready = Readiness::EMPTY;
        if event.is_readable() || event.is_read_closed() || event.is_error() {
            ready |= Readiness::READABLE;
        }
        if event.is_writable() || event.is_write_closed() || event.is_error() {
            ready |= Readiness::WRITABLE;
        }
        ready
    }

    pub fn is_readable(self) -> bool {
        self.0 & Readiness::READABLE.0 != 0
    }

    pub fn is_writable(self) -> bool {
        self.0 & Readiness::WRITABLE.0 != 0
    }

    /// Whether this readiness satisfies at least one direction of `interest`.
    pub fn satisfies(self, interest: Interest) -> bool {
        (interest.is_readable() && self.is_readable())
            || (interest.is_writable() && self.is_writable())
    }
}

impl BitOr for Readiness {
    type Output = Readiness;

    fn bitor(self, rhs: Readiness) -> Readiness {
        Readiness(self.0 | rhs.0)
    }
}

impl BitOrAssign for Readiness {
    fn bitor_assign(&mut self, rhs: Readiness) {
        self.0 |= rhs.0;
    }
}

struct Registration {
    interest: Interest,
    waker: Waker,
}

#[derive(Default)]
struct Table {
    /// Tokens of sources currently registered with the OS poller.
    attached: HashSet<Token>,
    /// Operations waiting for readiness, one per token.
    waiting: HashMap<Token, Registration>,
    /// Readiness that arrived while nobody was waiting for it. mio is edge-triggered, so an
    /// event landing between a failed attempt and its registration would otherwise be lost.
    unclaimed: HashMap<Token, Readiness>,
}

/// Manages I/O readiness events for async tasks.
///
/// # Architecture
///
/// - **Registry**: where sources are registered with the OS poller under a token
/// - **Table**: maps tokens to the waker of the operation waiting on them
/// - **Driver**: a [`ReactorDriver`] on a background thread waiting for OS events and calling
///   [`Reactor::dispatch`] for each
pub struct Reactor {
    registry: Registry,
    table: Mutex<Table>,
    next_token: AtomicUsize,
    shutdown: AtomicBool,
    wake: mio::Waker,
}

impl Reactor {
    /// Creates a reactor and the driver that must run its event loop.
    pub fn new(config: &Config) -> io::Result<(Arc<Self>, ReactorDriver)> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let wake = mio::Waker::new(poll.registry(), WAKE_TOKEN)?;
        let reactor = Arc::new(Self {
            registry,
            table: Mutex::new(Table::default()),
            next_token: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            wake,
        });
        let driver = ReactorDriver::new(
            poll,
            Events::with_capacity(config.event_capacity),
            reactor.clone(),
            config.reactor_timeout,
        );

        Ok((reactor, driver))
    }

    // Wakers are invoked and dropped outside the lock: dropping one can drop a task whose
    // sources detach through this same table. A poisoned table is therefore still consistent.
    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `source` with the OS poller and returns the token its events will carry.
    pub fn attach<S>(&self, source: &mut S, interest: Interest) -> io::Result<Token>
    where
        S: Source + ?Sized,
    {
        let token = Token(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.registry.register(source, token, interest)?;
        self.table().attached.insert(token);
        debug!("attached source as {token:?}");
        Ok(token)
    }

    /// Removes `source` from the OS poller and forgets everything recorded for `token`.
    pub fn detach<S>(&self, source: &mut S, token: Token) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        let waiter = {
            let mut table = self.table();
            table.attached.remove(&token);
            table.unclaimed.remove(&token);
            table.waiting.remove(&token)
        };
        drop(waiter);
        self.registry.deregister(source)?;
        debug!("detached {token:?}");
        Ok(())
    }

    /// Records that `waker` wants to hear when `token` satisfies `interest`.
    ///
    /// Overwrites an earlier registration for the token; the latest poll owns it. If matching
    /// readiness already arrived unclaimed, it is consumed and `waker` is woken right away.
    ///
    /// After [`Reactor::shutdown`] nothing will ever be dispatched, so the waker is dropped
    /// instead of stored.
    pub fn register(&self, token: Token, interest: Interest, waker: Waker) {
        let mut table = self.table();
        if self.is_shutdown() {
            drop(table);
            trace!("reactor is shut down, dropping registration for {token:?}");
            return;
        }
        if let Some(ready) = table.unclaimed.get(&token).copied() {
            if ready.satisfies(interest) {
                table.unclaimed.remove(&token);
                drop(table);
                trace!("{token:?} was already ready, waking immediately");
                waker.wake();
                return;
            }
        }
        let replaced = table.waiting.insert(token, Registration { interest, waker });
        drop(table);
        drop(replaced);
        trace!("registered {token:?} for {interest:?}");
    }

    /// Drops the registration for `token`. Returns whether there was one.
    pub fn deregister(&self, token: Token) -> bool {
        let removed = self.table().waiting.remove(&token);
        removed.is_some()
    }

    /// Drops the registration for `token` only if it still belongs to `waker`.
    pub fn deregister_waker(&self, token: Token, waker: &Waker) -> bool {
        let removed = {
            let mut table = self.table();
            match table.waiting.get(&token) {
                Some(reg) if reg.waker.will_wake(waker) => table.waiting.remove(&token),
                _ => None,
            }
        };
        removed.is_some()
    }

    pub fn is_registered(&self, token: Token) -> bool {
        self.table().waiting.contains_key(&token)
    }

    /// Whether `token` is registered and the stored waker would wake the same task as `waker`.
    pub fn is_registered_by(&self, token: Token, waker: &Waker) -> bool {
        self.table()
            .waiting
            .get(&token)
            .is_some_and(|reg| reg.waker.will_wake(waker))
    }

    /// Delivers one readiness event.
    ///
    /// A matching registration is removed and its waker invoked exactly once; returns `true` in
    /// that case. Otherwise readiness for an attached token is kept for the next
    /// [`Reactor::register`], and readiness for a token that was never attached (or already
    /// detached) is discarded.
    pub fn dispatch(&self, token: Token, readiness: Readiness) -> bool {
        let waker = {
            let mut table = self.table();
            match table.waiting.get(&token) {
                Some(reg) if readiness.satisfies(reg.interest) => {
                    table.waiting.remove(&token).map(|reg| reg.waker)
                }
                _ if table.attached.contains(&token) => {
                    *table.unclaimed.entry(token).or_default() |= readiness;
                    None
                }
                _ => {
                    trace!("{token:?} is not attached, discarding {readiness:?}");
                    None
                }
            }
        };

        match waker {
            Some(waker) => {
                trace!("{token:?} ready ({readiness:?}), waking");
                waker.wake();
                true
            }
            None => false,
        }
    }

    /// Asks the driver loop to stop after its current poll.
    pub fn shutdown(&self) -> io::Result<()> {
        self.shutdown.store(true, Ordering::Release);
        self.wake.wake()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Drops every stored waker and pending readiness. Returns how many waiters were released.
    ///
    /// A waiting task's future can own a source that holds this reactor, while the reactor
    /// holds that task's waker. Once the driver has stopped, this breaks the cycle so the task
    /// and its sockets are freed.
    pub(crate) fn release_waiters(&self) -> usize {
        let waiting = {
            let mut table = self.table();
            table.unclaimed.clear();
            std::mem::take(&mut table.waiting)
        };
        // Dropping a waker can drop its task, whose sources detach through `self.table()`.
        let released = waiting.len();
        drop(waiting);
        if released > 0 {
            debug!("released {released} reactor waiters");
        }
        released
    }

    #[cfg(test)]
    fn unclaimed(&self) -> usize {
        self.table().unclaimed.len()
    }
}
