//! Unbounded hand-off between watchers and the dispatch loop.

use filewarden_audit_types::AuditEvent;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Producer handle. Cheap to clone; one per watcher callback.
#[derive(Clone)]
pub struct EventQueue {
    sender: mpsc::UnboundedSender<AuditEvent>,
    depth: Arc<AtomicUsize>,
}

/// Consumer half, owned by the dispatch loop.
pub struct EventReceiver {
    receiver: mpsc::UnboundedReceiver<AuditEvent>,
    depth: Arc<AtomicUsize>,
}

impl EventQueue {
    /// Create a queue and its consumer.
    pub fn new() -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        (
            Self {
                sender,
                depth: depth.clone(),
            },
            EventReceiver { receiver, depth },
        )
    }

    /// Enqueue an event (non-blocking). Returns false if the consumer is gone.
    pub fn enqueue(&self, event: AuditEvent) -> bool {
        let id = event.id();
        self.depth.fetch_add(1, Ordering::SeqCst);
        match self.sender.send(event) {
            Ok(()) => {
                debug!(event_id = %id, "Audit event queued");
                true
            }
            Err(_) => {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                debug!(event_id = %id, "Audit queue closed, event dropped");
                false
            }
        }
    }

    /// Approximate number of queued events.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the consumer is still attached.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

impl EventReceiver {
    /// Take the next event if one is ready.
    pub fn try_dequeue(&mut self) -> Option<AuditEvent> {
        let event = self.receiver.try_recv().ok()?;
        self.depth.fetch_sub(1, Ordering::SeqCst);
        Some(event)
    }

    /// Wait for the next event. `None` once every producer is dropped and
    /// the queue is drained.
    pub async fn dequeue(&mut self) -> Option<AuditEvent> {
        let event = self.receiver.recv().await?;
        self.depth.fetch_sub(1, Ordering::SeqCst);
        Some(event)
    }

    /// Approximate number of queued events.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
