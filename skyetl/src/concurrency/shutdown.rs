//! Broadcast shutdown signal shared by the pipeline workers.

use tokio::sync::watch;

/// Error returned when no receiver is left to observe the shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSendError;

impl std::fmt::Display for ShutdownSendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("no worker is listening for the shutdown signal")
    }
}

impl std::error::Error for ShutdownSendError {}

/// Sending half of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Signals shutdown to every current and future subscriber.
    ///
    /// The signal is stored even when nobody is subscribed yet, in which case an error is
    /// returned but later subscribers still observe it.
    pub fn shutdown(&self) -> Result<(), ShutdownSendError> {
        self.0.send_replace(true);

        if self.0.receiver_count() == 0 {
            return Err(ShutdownSendError);
        }

        Ok(())
    }

    /// Creates a new receiver for this channel.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }

    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }
}

/// Receiving half of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Returns `true` once shutdown has been signalled.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Waits until shutdown is signalled.
    ///
    /// Resolves immediately if shutdown was already signalled or if every sender was dropped.
    /// The future is cancel safe and can be used in `tokio::select!`.
    pub async fn wait_for_shutdown(&mut self) {
        let _ = self.0.wait_for(|shutdown| *shutdown).await;
    }
}

/// Creates a new shutdown channel.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn subscribers_observe_shutdown() {
        let (tx, mut rx) = create_shutdown_channel();
        let mut late = tx.subscribe();

        assert!(!rx.is_shutdown());
        tx.shutdown().unwrap();

        rx.wait_for_shutdown().await;
        late.wait_for_shutdown().await;
        assert!(rx.is_shutdown());
        assert!(tx.is_shutdown());
    }

    #[tokio::test]
    async fn wait_blocks_until_signalled() {
        let (tx, mut rx) = create_shutdown_channel();

        let waited = tokio::time::timeout(Duration::from_millis(20), rx.wait_for_shutdown()).await;
        assert!(waited.is_err());

        tx.shutdown().unwrap();
        rx.wait_for_shutdown().await;
    }

    #[tokio::test]
    async fn signal_sent_before_subscribing_is_kept() {
        let (tx, rx) = create_shutdown_channel();
        drop(rx);

        assert_eq!(tx.shutdown(), Err(ShutdownSendError));

        let mut late = tx.subscribe();
        late.wait_for_shutdown().await;
        assert!(late.is_shutdown());
    }

    #[tokio::test]
    async fn dropped_sender_releases_waiters() {
        let (tx, mut rx) = create_shutdown_channel();
        drop(tx);

        rx.wait_for_shutdown().await;
    }
}
