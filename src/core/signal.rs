use std::sync::Arc;
use tokio::sync::watch;

/// Requests a stop. Cloneable so a signal handler task can hold one.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn new() -> StopHandle {
        let (tx, _) = watch::channel(false);
        StopHandle { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        StopHandle::new()
    }
}

/// Observes a [`StopHandle`].
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop is requested or every handle is gone.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_resolves_after_stop() {
        let handle = StopHandle::new();
        let mut signal = handle.subscribe();
        assert!(!signal.is_stopped());

        let waiter = tokio::spawn(async move {
            signal.wait().await;
            signal.is_stopped()
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.stop();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn late_subscriber_sees_stop() {
        let handle = StopHandle::new();
        handle.stop();
        let mut signal = handle.subscribe();
        signal.wait().await;
        assert!(signal.is_stopped());
    }
}
