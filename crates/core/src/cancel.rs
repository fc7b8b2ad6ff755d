// Invocation Cancel Token

use tokio::sync::watch;

/// Cancellation signal for in-flight invocations
#[derive(Clone, Debug)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for the cancel signal
    ///
    /// Never resolves if the sender is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Cancel sender
#[derive(Debug)]
pub struct CancelSender {
    tx: watch::Sender<bool>,
}

impl CancelSender {
    /// Signal cancellation to every token cloned from this channel
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create a cancel channel
pub fn cancel_channel() -> (CancelSender, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelSender { tx }, CancelToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let (tx, token) = cancel_channel();
        let waiter = token.clone();

        let handle = tokio::spawn(async move { waiter.cancelled().await });
        assert!(!token.is_cancelled());

        tx.cancel();
        handle.await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_sender_does_not_cancel() {
        let (tx, token) = cancel_channel();
        drop(tx);

        let waited = tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await;
        assert!(waited.is_err());
        assert!(!token.is_cancelled());
    }
}
