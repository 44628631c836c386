//! Work queue drained once per host tick.
//!
//! Transport tasks enqueue from any thread through a [`WorkSender`]; only the
//! thread that owns the target calls [`WorkQueue::drain_once`].

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tracing::debug;

use crate::invocation::PendingInvocation;

/// Cloneable producer half of the work queue.
pub struct WorkSender<T> {
    tx: Sender<PendingInvocation<T>>,
}

impl<T> WorkSender<T> {
    /// Enqueue an invocation.
    ///
    /// Returns `false` if the queue has been dropped; the invocation is then
    /// discarded and its connection closed.
    pub fn enqueue(&self, invocation: PendingInvocation<T>) -> bool {
        self.tx.send(invocation).is_ok()
    }
}

impl<T> Clone for WorkSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> std::fmt::Debug for WorkSender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkSender")
            .field("queued", &self.tx.len())
            .finish()
    }
}

/// Unbounded FIFO of [`PendingInvocation`]s.
pub struct WorkQueue<T> {
    tx: Sender<PendingInvocation<T>>,
    rx: Receiver<PendingInvocation<T>>,
}

impl<T: 'static> WorkQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Returns a producer handle.
    #[must_use]
    pub fn sender(&self) -> WorkSender<T> {
        WorkSender {
            tx: self.tx.clone(),
        }
    }

    /// Run every queued invocation against `target`, including ones enqueued
    /// while draining.
    ///
    /// Returns the number of invocations run.
    pub fn drain_once(&self, target: &mut T) -> usize {
        let mut ran = 0;
        loop {
            match self.rx.try_recv() {
                Ok(invocation) => {
                    invocation.run(target);
                    ran += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        if ran > 0 {
            debug!(ran, "drained work queue");
        }
        ran
    }
}

impl<T> WorkQueue<T> {
    /// Drop every queued invocation without running it.
    ///
    /// Each dropped invocation closes its connection. Returns the number
    /// discarded.
    pub fn discard(&self) -> usize {
        let discarded = self.rx.try_iter().count();
        if discarded > 0 {
            debug!(discarded, "discarded queued work");
        }
        discarded
    }

    /// Number of invocations waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` if nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl<T: 'static> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("queued", &self.rx.len())
            .finish()
    }
}
