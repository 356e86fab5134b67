//! Shutdown coordination for the service.

use tokio::sync::broadcast;

/// Fans a single shutdown request out to the server loop and any other
/// long-running task that subscribed before it fired.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fire the shutdown signal, returning how many subscribers it reached.
    ///
    /// Firing with nobody listening is not an error; it returns 0.
    pub fn trigger(&self) -> usize {
        let reached = self.tx.send(()).unwrap_or(0);
        tracing::info!(subscribers = reached, "Shutdown triggered");
        reached
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_reaches_every_subscriber() {
        let shutdown = Shutdown::new();
        let mut server = shutdown.subscribe();
        let mut worker = shutdown.subscribe();

        assert_eq!(shutdown.trigger(), 2);
        assert!(server.recv().await.is_ok());
        assert!(worker.recv().await.is_ok());
    }

    #[test]
    fn trigger_without_subscribers_is_harmless() {
        let shutdown = Shutdown::new();
        assert_eq!(shutdown.trigger(), 0);
    }

    #[tokio::test]
    async fn dropped_subscribers_are_not_counted() {
        let shutdown = Shutdown::new();
        let mut kept = shutdown.subscribe();
        drop(shutdown.subscribe());

        assert_eq!(shutdown.trigger(), 1);
        assert!(kept.recv().await.is_ok());
    }
}
