//! Shutdown signalling for the dispatch loop.

use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable trigger shared by everything that may stop the pipeline.
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    sender: Arc<watch::Sender<bool>>,
}

/// Receiving side handed to a loop that must exit on shutdown.
#[derive(Clone, Debug)]
pub struct ShutdownListener {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Create an untriggered signal.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    /// Whether shutdown was requested.
    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    /// New listener. A listener created after [`trigger`](Self::trigger)
    /// observes the shutdown immediately.
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownListener {
    /// Whether shutdown was requested.
    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once shutdown is requested or every signal is dropped.
    pub async fn wait(&mut self) {
        // Err means all senders are gone, which is as final as a trigger.
        let _ = self.receiver.wait_for(|triggered| *triggered).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wakes_listener() {
        let signal = ShutdownSignal::new();
        let mut listener = signal.subscribe();
        assert!(!listener.is_triggered());

        let trigger = signal.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
        });

        tokio::time::timeout(Duration::from_secs(2), listener.wait())
            .await
            .expect("listener woke");
        assert!(signal.is_triggered());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_late_listener_sees_trigger() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        signal.trigger();

        let mut listener = signal.subscribe();
        assert!(listener.is_triggered());
        tokio_test::assert_ready!(tokio_test::task::spawn(listener.wait()).poll());
    }

    #[tokio::test]
    async fn test_dropped_signal_releases_listener() {
        let signal = ShutdownSignal::new();
        let mut listener = signal.subscribe();
        drop(signal);
        tokio::time::timeout(Duration::from_secs(2), listener.wait())
            .await
            .expect("listener released");
    }
}
