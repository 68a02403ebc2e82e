//! Reactor-backed operations.
//!
//! An I/O operation first attempts its non-blocking call. If the call would block it registers
//! the current waker with the [`Reactor`] and returns `Pending`; the wake re-polls the operation,
//! which simply tries again.

use log::warn;
use mio::event::Source;
use mio::{Interest, Token};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use crate::reactor::Reactor;

/// An OS source attached to a reactor.
///
/// The source is registered with the poller on construction and removed again on drop.
pub struct PollEvented<S: Source> {
    source: S,
    token: Token,
    reactor: Arc<Reactor>,
}

impl<S: Source> PollEvented<S> {
    pub fn new(mut source: S, interest: Interest, reactor: &Arc<Reactor>) -> io::Result<Self> {
        let token = reactor.attach(&mut source, interest)?;
        Ok(Self {
            source,
            token,
            reactor: reactor.clone(),
        })
    }

    pub fn get_ref(&self) -> &S {
        &self.source
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn reactor(&self) -> &Arc<Reactor> {
        &self.reactor
    }

    /// Runs one non-blocking attempt of `op`.
    ///
    /// `WouldBlock` parks the current waker at the reactor for `interest` and yields `Pending`;
    /// `Interrupted` retries immediately; anything else is the operation's result.
    pub fn poll_io<R>(
        &self,
        cx: &mut Context<'_>,
        interest: Interest,
        mut op: impl FnMut(&S) -> io::Result<R>,
    ) -> Poll<io::Result<R>> {
        loop {
            match op(&self.source) {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.reactor.register(self.token, interest, cx.waker().clone());
                    return Poll::Pending;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                result => return Poll::Ready(result),
            }
        }
    }
}

impl<S: Source> Drop for PollEvented<S> {
    fn drop(&mut self) {
        if let Err(e) = self.reactor.detach(&mut self.source, self.token) {
            warn!("failed to detach {:?}: {e}", self.token);
        }
    }
}

/// Resolves once `token` reports readiness for `interest`.
///
/// Readiness is a hint: the operation that follows must still cope with `WouldBlock`.
pub fn wait_ready(reactor: &Arc<Reactor>, token: Token, interest: Interest) -> WaitReady {
    WaitReady {
        reactor: reactor.clone(),
        token,
        interest,
        state: WaitState::Unstarted,
        waker: None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitState {
    Unstarted,
    AwaitingEvent,
    Completed,
}

/// Future returned by [`wait_ready`].
pub struct WaitReady {
    reactor: Arc<Reactor>,
    token: Token,
    interest: Interest,
    state: WaitState,
    /// The waker last handed to the reactor; identifies this future's registration.
    waker: Option<Waker>,
}

impl WaitReady {
    fn register(&mut self, waker: &Waker) {
        self.reactor.register(self.token, self.interest, waker.clone());
        self.waker = Some(waker.clone());
    }

    /// Whether the reactor still holds this future's own registration for the token.
    fn still_waiting(&self) -> bool {
        self.waker
            .as_ref()
            .is_some_and(|w| self.reactor.is_registered_by(self.token, w))
    }
}

impl Future for WaitReady {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let state = self.state;
        match state {
            WaitState::Unstarted => {
                self.register(cx.waker());
                self.state = WaitState::AwaitingEvent;
                Poll::Pending
            }
            // Delivery removes the registration; until then keep the latest waker on file.
            WaitState::AwaitingEvent if self.still_waiting() => {
                self.register(cx.waker());
                Poll::Pending
            }
            WaitState::AwaitingEvent | WaitState::Completed => {
                self.state = WaitState::Completed;
                self.waker = None;
                Poll::Ready(())
            }
        }
    }
}

impl Drop for WaitReady {
    fn drop(&mut self) {
        // Another operation may have registered the token since our event was delivered.
        if let (WaitState::AwaitingEvent, Some(waker)) = (self.state, &self.waker) {
            self.reactor.deregister_waker(self.token, waker);
        }
    }
}
