//! Bounded multi-producer, multi-consumer queues between pipeline stages.
//!
//! A thin layer over [`tokio::sync::mpsc`]: producers clone the sender, and
//! consumers share the receiving end behind an async mutex so several parser
//! or sink workers can drain one queue. A full queue suspends the producer;
//! nothing is ever dropped. This is the pipeline's only backpressure.

use crate::error::QueueClosed;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Create a bounded queue holding at most `capacity` items.
///
/// # Panics
///
/// Panics if `capacity` is zero. [`Config::validate`](crate::config::Config::validate)
/// rejects that before any queue is built.
pub fn bounded<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        QueueSender { tx },
        QueueReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Producing end of a bounded queue. Cheap to clone.
///
/// The queue closes once every sender has been dropped and the remaining
/// items have been drained.
pub struct QueueSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> fmt::Debug for QueueSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueSender")
            .field("depth", &self.depth())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl<T> QueueSender<T> {
    /// Push an item, waiting for a free slot if the queue is full.
    pub async fn push(&self, item: T) -> Result<(), QueueClosed> {
        self.tx.send(item).await.map_err(|_| QueueClosed)
    }

    /// Items currently buffered (including slots reserved by in-flight pushes).
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

impl<T: Send + 'static> QueueSender<T> {
    /// A read-only depth gauge that does not keep the queue open.
    pub fn probe(&self) -> QueueProbe {
        let weak = self.tx.downgrade();
        let capacity = self.tx.max_capacity();
        QueueProbe {
            capacity,
            depth: Arc::new(move || {
                weak.upgrade()
                    .map(|tx| tx.max_capacity() - tx.capacity())
                    .unwrap_or(0)
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// Consuming end of a bounded queue, shareable between workers.
pub struct QueueReceiver<T> {
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for QueueReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

impl<T> fmt::Debug for QueueReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueReceiver").finish_non_exhaustive()
    }
}

impl<T> QueueReceiver<T> {
    /// Wait for the next item. `None` once the queue is closed and empty.
    pub async fn pop(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }

    /// Wait for one item, then take whatever else is immediately available,
    /// up to `max` items in total. `None` once the queue is closed and empty.
    pub async fn pop_batch(&self, max: usize) -> Option<Vec<T>> {
        let mut rx = self.rx.lock().await;
        let first = rx.recv().await?;
        let mut batch = Vec::with_capacity(max.max(1));
        batch.push(first);
        while batch.len() < max {
            match rx.try_recv() {
                Ok(item) => batch.push(item),
                Err(_) => break,
            }
        }
        Some(batch)
    }
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

/// Type-erased depth gauge handed to the metrics server.
///
/// Reports zero once every sender is gone.
#[derive(Clone)]
pub struct QueueProbe {
    capacity: usize,
    depth: Arc<dyn Fn() -> usize + Send + Sync>,
}

impl QueueProbe {
    pub fn depth(&self) -> usize {
        (self.depth)()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl fmt::Debug for QueueProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueProbe")
            .field("depth", &self.depth())
            .field("capacity", &self.capacity)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
