//! Event-driven I/O reactor.
//!
//! The reactor translates OS readiness notifications (epoll, kqueue, and friends through `mio`)
//! into waker invocations. Operations register a waker for a token when a non-blocking attempt
//! would block; a background thread running [`ReactorDriver::drive`] delivers each readiness
//! event to the registered waker exactly once.

mod driver;
mod reactor;

pub use driver::{ReactorDriver, ReactorHandle};
pub use reactor::{Reactor, Readiness};
