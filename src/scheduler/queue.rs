//! In-memory closable task queue.
//!
//! A bounded multi-consumer queue built on a tokio mpsc channel with the
//! receiver behind an async mutex. The producer pushes every task once and
//! closes the queue by dropping its handle; workers then drain whatever
//! remains and observe end-of-queue as `None`.
//!
//! Each task is claimed by exactly one worker. Dispatch order beyond that is
//! unspecified.

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use super::task::Task;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Push after the consumer side has shut down.
    #[error("Queue is closed")]
    Closed,
}

/// Producer half of the task queue.
///
/// Dropping the producer closes the queue: workers drain the remaining tasks
/// and then exit.
pub struct TaskProducer {
    tx: mpsc::Sender<Task>,
}

impl TaskProducer {
    /// Enqueues one task.
    ///
    /// With the baseline capacity (= task count) this never blocks; with a
    /// smaller bound it suspends until a worker makes room.
    pub async fn push(&self, task: Task) -> Result<(), QueueError> {
        self.tx.send(task).await.map_err(|_| QueueError::Closed)
    }

    /// Closes the queue. No more tasks will arrive.
    pub fn close(self) {
        // Dropping the sender is the close signal.
        drop(self.tx);
    }
}

/// Consumer half of the task queue, shared by all workers.
pub struct TaskQueue {
    rx: Mutex<mpsc::Receiver<Task>>,
}

impl TaskQueue {
    /// Pops the next task.
    ///
    /// Suspends while the queue is momentarily empty but still open; returns
    /// `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<Task> {
        self.rx.lock().await.recv().await
    }
}

/// Creates a bounded task queue.
///
/// `capacity` is clamped to at least 1 (tokio channels reject zero).
pub fn channel(capacity: usize) -> (TaskProducer, TaskQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        TaskProducer { tx },
        TaskQueue {
            rx: Mutex::new(rx),
        },
    )
}
