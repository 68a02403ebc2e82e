//! A minimal cooperative task runtime.
//!
//! Operations are ordinary [`Future`](std::future::Future)s. This crate provides the substrate
//! that drives them:
//!
//! - [`executor`]: the single-threaded scheduling loop and the [`Spawner`] feeding it
//! - [`task`]: the task wrapper, its take-poll-replace cycle and [`JoinHandle`]
//! - `waker`: wakers bound to one task that re-queue it on the ready queue
//! - [`timer`]: a timer operation completed by a dedicated background thread
//! - [`reactor`]: a `mio` backed reactor turning OS readiness into wakes
//! - [`io`] and [`net`]: reactor-backed operations and TCP types built on them
//! - [`runtime`]: a [`Runtime`] bundling all of the above
//!
//! Scheduling is cooperative: a task runs until its future returns `Pending`, and an operation
//! that never yields starves every other task.
//!
//! ```no_run
//! use coop_run::{Runtime, sleep};
//! use std::time::Duration;
//!
//! let runtime = Runtime::new()?;
//! let out = runtime.block_on(async {
//!     sleep(Duration::from_millis(10)).await;
//!     42
//! })?;
//! assert_eq!(out, 42);
//! # Ok::<(), coop_run::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod io;
pub mod net;
pub mod reactor;
pub mod runtime;
pub mod state;
pub mod task;
pub mod timer;

mod queue;
mod waker;

pub use config::Config;
pub use error::{Error, JoinError, Result, SpawnError};
pub use executor::{Executor, Spawner, new_executor_and_spawner};
pub use reactor::{Reactor, ReactorDriver, ReactorHandle, Readiness};
pub use runtime::{Builder, Runtime};
pub use task::JoinHandle;
pub use timer::{Timer, sleep};
