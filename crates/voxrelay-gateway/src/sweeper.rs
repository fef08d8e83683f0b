//! Periodic eviction of idle sessions.

use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::registry::SessionRegistry;

/// Background task that evicts sessions idle past the threshold.
pub struct IdleSweeper {
    registry: SessionRegistry,
    interval: Duration,
    threshold: Duration,
}

impl IdleSweeper {
    pub fn new(registry: SessionRegistry, interval: Duration, threshold: Duration) -> Self {
        Self {
            registry,
            interval,
            threshold,
        }
    }

    /// Run until `cancel` fires.
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = self.interval.as_secs(),
                threshold_secs = self.threshold.as_secs(),
                "Idle sweeper started"
            );
            let mut interval = tokio::time::interval(self.interval);
            // First tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let evicted = self.registry.sweep_idle(Instant::now(), self.threshold).await;
                        if evicted.is_empty() {
                            debug!("Idle sweep found nothing to evict");
                        } else {
                            info!(count = evicted.len(), "Evicted idle sessions");
                        }
                    }
                }
            }
            info!("Idle sweeper stopped");
        })
    }
}
