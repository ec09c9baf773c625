//! Cooperative shutdown for the node's tasks.
//!
//! One trigger — programmatic or SIGINT/SIGTERM — fans out to the HTTP
//! server, the peer listener, and the orchestrator, which raises the
//! miner's cancel flag and stops dequeuing commands. Triggering is
//! idempotent, and a subscriber that arrives after the trigger is still
//! notified, so a task spawned late cannot outlive the node.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::signal;
use tokio::sync::broadcast;

pub struct ShutdownController {
    notify: broadcast::Sender<()>,
    triggered: AtomicBool,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(1);
        Self {
            notify,
            triggered: AtomicBool::new(false),
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::Relaxed)
    }

    /// A receiver notified on shutdown.
    ///
    /// Subscribing after the trigger re-sends the notification, so the
    /// new receiver still observes it.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        let rx = self.notify.subscribe();
        if self.is_shutdown() {
            let _ = self.notify.send(());
        }
        rx
    }

    /// Request shutdown. Only the first call notifies; repeats are no-ops.
    pub fn shutdown(&self) {
        if !self.triggered.swap(true, Ordering::Relaxed) {
            tracing::debug!("shutdown triggered");
            let _ = self.notify.send(());
        }
    }

    /// Wait for SIGINT or SIGTERM, then request shutdown.
    pub async fn wait_for_signal(&self) {
        #[cfg(unix)]
        let sigterm = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "SIGTERM handler unavailable");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let sigterm = std::future::pending::<()>();

        tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "SIGINT handler failed");
                }
                tracing::info!(signal = "SIGINT", "termination signal received");
            }
            _ = sigterm => {
                tracing::info!(signal = "SIGTERM", "termination signal received");
            }
        }

        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_is_idempotent_and_delivers_once() {
        let controller = ShutdownController::new();
        let mut rx = controller.subscribe();

        controller.shutdown();
        controller.shutdown();
        assert!(controller.is_shutdown());

        rx.recv().await.unwrap();
        assert!(
            rx.try_recv().is_err(),
            "repeated triggers must not queue repeated notifications"
        );
    }

    #[tokio::test]
    async fn late_subscriber_is_still_notified() {
        let controller = ShutdownController::new();
        controller.shutdown();

        let mut rx = controller.subscribe();
        rx.recv().await.unwrap();
    }

    #[tokio::test]
    async fn command_loop_drains_on_shutdown() {
        // A stand-in for the orchestrator: biased select over the
        // shutdown receiver and a work queue, as the node's run loop does.
        let controller = ShutdownController::new();
        let mut shutdown_rx = controller.subscribe();
        let (work_tx, mut work_rx) = tokio::sync::mpsc::channel::<u32>(8);

        let worker = tokio::spawn(async move {
            let mut processed = 0;
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    Some(_) = work_rx.recv() => processed += 1,
                }
            }
            processed
        });

        work_tx.send(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        controller.shutdown();

        let processed = tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .expect("worker must exit on shutdown")
            .unwrap();
        assert_eq!(processed, 1, "queued work completes before the drain");
    }
}
