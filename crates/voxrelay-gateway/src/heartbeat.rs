//! Liveness pings for attached channels.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use voxrelay_core::channel::SessionChannel;
use voxrelay_core::session::{self, SessionHandle};

/// Pings one channel on a fixed interval and counts each ping as activity.
pub struct HeartbeatMonitor {
    session_id: String,
    handle: SessionHandle,
    channel: SessionChannel,
    interval: Duration,
}

impl HeartbeatMonitor {
    pub fn new(
        session_id: String,
        handle: SessionHandle,
        channel: SessionChannel,
        interval: Duration,
    ) -> Self {
        Self {
            session_id,
            handle,
            channel,
            interval,
        }
    }

    /// Run until the channel closes.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let closed = self.channel.closed_token();
            let mut interval = tokio::time::interval(self.interval);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = closed.cancelled() => break,
                    _ = interval.tick() => {
                        {
                            let mut s = session::lock(&self.handle);
                            if s.is_disconnected() {
                                break;
                            }
                            s.touch();
                        }
                        if !self.channel.ping() {
                            break;
                        }
                    }
                }
            }
            debug!(session_id = %self.session_id, "Heartbeat stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use voxrelay_core::channel::OutboundFrame;
    use voxrelay_core::session::Session;

    use super::*;

    #[tokio::test]
    async fn test_pings_and_refreshes_activity() {
        let handle = Session::new("s1".into(), "p".into()).into_handle();
        let (channel, mut rx) = SessionChannel::new();
        let before = session::lock(&handle).last_activity;

        let task = HeartbeatMonitor::new(
            "s1".into(),
            handle.clone(),
            channel.clone(),
            Duration::from_millis(10),
        )
        .start();

        assert!(matches!(rx.recv().await, Some(OutboundFrame::Ping)));
        assert!(session::lock(&handle).last_activity > before);
        assert!(session::lock(&handle).last_activity <= Instant::now());

        channel.close();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stops_when_channel_closed() {
        let handle = Session::new("s1".into(), "p".into()).into_handle();
        let (channel, _rx) = SessionChannel::new();
        channel.close();

        let task = HeartbeatMonitor::new("s1".into(), handle, channel, Duration::from_secs(30)).start();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("heartbeat should stop promptly")
            .unwrap();
    }
}
