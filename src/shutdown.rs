use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{info, warn};

/// Graceful shutdown coordinator for the scheduler daemon
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    sender: watch::Sender<bool>,
}

/// Handle given to long-running loops.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn trigger(&self) {
        info!("Initiating graceful shutdown");
        self.sender.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    /// Trigger shutdown on SIGINT (ctrl-c).
    pub fn install_signal_handlers(&self) {
        info!("Installing signal handlers for graceful shutdown");
        let coordinator = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => coordinator.trigger(),
                Err(e) => warn!("Failed to listen for ctrl-c: {}", e),
            }
        });
    }

    /// Run a shutdown step, giving up after `limit`.
    pub async fn finish_within<F, T>(step: &str, limit: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        let out = timeout(limit, fut)
            .await
            .map_err(|_| anyhow::anyhow!("Timeout waiting for {} to finish", step))?;
        info!("{} finished", step);
        Ok(out)
    }
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once shutdown has been triggered. Also resolves if the
    /// coordinator was dropped.
    pub async fn triggered(&mut self) {
        let _ = self.receiver.wait_for(|stop| *stop).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_observe_trigger() {
        let coordinator = ShutdownCoordinator::new();
        let mut signal = coordinator.subscribe();
        assert!(!signal.is_triggered());

        let waiter = tokio::spawn(async move {
            signal.triggered().await;
            signal.is_triggered()
        });
        coordinator.trigger();

        assert!(waiter.await.unwrap());
        assert!(coordinator.is_triggered());
    }

    #[tokio::test]
    async fn late_subscribers_see_existing_trigger() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.trigger();
        let mut signal = coordinator.subscribe();
        signal.triggered().await;
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn finish_within_times_out() {
        let slow = tokio::time::sleep(Duration::from_secs(5));
        let result =
            ShutdownCoordinator::finish_within("slow step", Duration::from_millis(10), slow).await;
        assert!(result.is_err());

        let fast =
            ShutdownCoordinator::finish_within("fast step", Duration::from_secs(1), async { 7 })
                .await
                .unwrap();
        assert_eq!(fast, 7);
    }
}
