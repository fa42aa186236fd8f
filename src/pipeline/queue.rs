//! Bounded handoff between the ingest thread and the dispatch task.
//!
//! Neither side ever blocks. When the queue is full the incoming cycle is
//! discarded and counted; cycles already queued are kept.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::types::Cycle;

/// Outcome of a non-blocking push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queue full, the new cycle was dropped
    Dropped,
}

/// Cloneable handle to one shared bounded queue of decoded cycles.
#[derive(Clone)]
pub struct IngestQueue {
    tx: Sender<Cycle>,
    rx: Receiver<Cycle>,
    capacity: usize,
    dropped: Arc<AtomicU64>,
}

impl IngestQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enqueue without blocking; drops the cycle if the queue is full.
    pub fn push(&self, cycle: Cycle) -> PushOutcome {
        match self.tx.try_send(cycle) {
            Ok(()) => PushOutcome::Queued,
            Err(TrySendError::Full(cycle)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    sequence_no = cycle.sequence_no,
                    dropped_total = total,
                    "[IngestQueue] Full, dropping newest cycle"
                );
                PushOutcome::Dropped
            }
            // Both ends live in `self`, so the channel cannot be disconnected.
            Err(TrySendError::Disconnected(_)) => PushOutcome::Dropped,
        }
    }

    /// Dequeue the oldest cycle, if any.
    pub fn drain_one(&self) -> Option<Cycle> {
        match self.rx.try_recv() {
            Ok(cycle) => Some(cycle),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Discard everything queued; returns how many cycles were removed.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total cycles dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for IngestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("dropped", &self.dropped())
            .finish()
    }
}
