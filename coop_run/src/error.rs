//! Error types shared across the runtime.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Returned by [`Spawner::spawn`](crate::executor::Spawner::spawn) when the
/// ready queue no longer has a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SpawnError {
    #[error("executor has shut down")]
    Shutdown,
}

/// Why a task did not produce its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JoinError {
    /// The operation panicked while being polled, or touched poisoned state.
    #[error("task panicked while being polled")]
    Panicked,
    /// The task was cancelled through its handle before it completed.
    #[error("task was cancelled")]
    Cancelled,
    /// The executor went away before the task completed.
    #[error("executor shut down before the task completed")]
    Shutdown,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error(transparent)]
    Join(#[from] JoinError),

    #[error("failed to install metrics exporter: {0}")]
    Metrics(String),
}
