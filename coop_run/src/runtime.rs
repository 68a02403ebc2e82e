//! The runtime bundling the executor, its spawner and a running reactor.
//!
//! The executor runs on whichever thread calls [`Runtime::block_on`] or [`Runtime::run`]; the
//! reactor drives its OS poller on a background thread. Handles are passed explicitly to the
//! code that needs them.

use log::info;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, JoinError, Result, SpawnError};
use crate::executor::{Executor, Spawner, new_executor_and_spawner};
use crate::reactor::{Reactor, ReactorHandle};
use crate::task::JoinHandle;

/// Builds a [`Runtime`] from a [`Config`].
#[derive(Debug, Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn reactor_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.reactor_timeout = timeout;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Serves Prometheus metrics on `addr` once the runtime is built.
    pub fn metrics_listener(mut self, addr: SocketAddr) -> Self {
        self.config.metrics_listener = Some(addr);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Starts the reactor thread and creates the executor.
    pub fn build(self) -> Result<Runtime> {
        if let Some(addr) = self.config.metrics_listener {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .map_err(|e| Error::Metrics(e.to_string()))?;
            info!("metrics enabled at http://{addr}/metrics");
        }

        let reactor = Reactor::start(&self.config)?;
        let (executor, spawner) = new_executor_and_spawner();

        Ok(Runtime {
            executor,
            spawner,
            reactor,
        })
    }
}

/// The cooperative runtime: one executor, one reactor.
pub struct Runtime {
    executor: Executor,
    spawner: Spawner,
    reactor: ReactorHandle,
}

impl Runtime {
    /// Creates a runtime with the default configuration.
    pub fn new() -> Result<Self> {
        Builder::new().build()
    }

    pub fn spawner(&self) -> Spawner {
        self.spawner.clone()
    }

    pub fn reactor(&self) -> &Arc<Reactor> {
        self.reactor.reactor()
    }

    /// Spawns a future to be polled by the executor.
    ///
    /// Nothing runs until the calling thread enters [`Runtime::block_on`] or [`Runtime::run`].
    pub fn spawn<F>(&self, future: F) -> std::result::Result<JoinHandle<F::Output>, SpawnError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.spawner.spawn(future)
    }

    /// Runs the executor on the current thread until `future` completes.
    ///
    /// Other spawned tasks are polled along the way; the ones still pending when `future`
    /// finishes stay queued for the next call.
    pub fn block_on<F>(&self, future: F) -> std::result::Result<F::Output, JoinError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = self.spawner.spawn(future).map_err(|_| JoinError::Shutdown)?;
        self.executor.run_until(|| handle.is_finished());
        handle.try_join().unwrap_or(Err(JoinError::Shutdown))
    }

    /// Runs every spawned task to completion, then stops the reactor.
    pub fn run(self) -> Result<()> {
        let Runtime {
            executor,
            spawner,
            reactor,
        } = self;
        drop(spawner);
        executor.run();
        reactor.shutdown()?;
        Ok(())
    }
}
