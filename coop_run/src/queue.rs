//! The ready queue between wakers and the executor.
//!
//! Every producer (the spawner, each task, each outstanding waker) holds a [`ReadySender`]; the
//! executor holds the only [`ReadyReceiver`]. The queue closes once all senders are gone, which
//! is how the executor learns there is nothing left that could ever become ready.

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use std::sync::Arc;

use crate::error::SpawnError;
use crate::task::Task;

pub(crate) fn ready_queue() -> (ReadySender, ReadyReceiver) {
    let (tx, rx) = unbounded();
    (ReadySender { tx }, ReadyReceiver { rx })
}

#[derive(Clone)]
pub(crate) struct ReadySender {
    tx: Sender<Arc<Task>>,
}

impl ReadySender {
    pub fn enqueue(&self, task: Arc<Task>) -> Result<(), SpawnError> {
        self.tx.send(task).map_err(|_| SpawnError::Shutdown)
    }
}

pub(crate) struct ReadyReceiver {
    rx: Receiver<Arc<Task>>,
}

impl ReadyReceiver {
    /// Blocks until a task is ready. `None` once the queue is closed and drained.
    pub fn recv(&self) -> Option<Arc<Task>> {
        self.rx.recv().ok()
    }

    pub fn try_recv(&self) -> Option<Arc<Task>> {
        match self.rx.try_recv() {
            Ok(task) => Some(task),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }
}
