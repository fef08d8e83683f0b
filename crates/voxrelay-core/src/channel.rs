//! Outbound half of a live connection.
//!
//! The transport's writer task owns the receiving end and turns each
//! [`OutboundFrame`] into a wire frame. Everything else in the process holds a
//! cloneable [`SessionChannel`].

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::protocol::ServerEvent;

/// A frame queued for the transport writer.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    /// JSON control message (text frame).
    Event(ServerEvent),
    /// Raw audio bytes (binary frame).
    Audio(Bytes),
    /// Transport-level liveness ping.
    Ping,
    /// Close the transport.
    Close,
}

/// Cloneable sender side of a session's transport.
#[derive(Debug, Clone)]
pub struct SessionChannel {
    tx: mpsc::UnboundedSender<OutboundFrame>,
    closed: CancellationToken,
}

impl SessionChannel {
    /// Create a channel and the receiver the writer task drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Self {
            tx,
            closed: CancellationToken::new(),
        };
        (channel, rx)
    }

    /// Open means nobody called [`close`](Self::close) and the writer is still alive.
    pub fn is_open(&self) -> bool {
        !self.closed.is_cancelled() && !self.tx.is_closed()
    }

    /// Whether `other` is a clone of this channel.
    pub fn same_channel(&self, other: &SessionChannel) -> bool {
        self.tx.same_channel(&other.tx)
    }

    /// Token cancelled when the channel is closed from this side.
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Queue a JSON event. Returns false if the channel is no longer open.
    pub fn send_event(&self, event: ServerEvent) -> bool {
        self.push(OutboundFrame::Event(event))
    }

    /// Queue an audio frame. Returns false if the channel is no longer open.
    pub fn send_audio(&self, chunk: Bytes) -> bool {
        self.push(OutboundFrame::Audio(chunk))
    }

    pub fn ping(&self) -> bool {
        self.push(OutboundFrame::Ping)
    }

    /// Ask the writer to close the transport. Idempotent.
    pub fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        if self.tx.send(OutboundFrame::Close).is_err() {
            debug!("Channel writer already gone");
        }
        self.closed.cancel();
    }

    fn push(&self, frame: OutboundFrame) -> bool {
        if !self.is_open() {
            return false;
        }
        match self.tx.send(frame) {
            Ok(()) => true,
            Err(e) => {
                error!(%e, "Failed to queue outbound frame");
                false
            }
        }
    }
}

/// Serialize an event into the JSON text sent on the wire.
pub fn encode_event(event: &ServerEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(json) => Some(json),
        Err(e) => {
            error!(%e, "Failed to serialize event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let (channel, mut rx) = SessionChannel::new();
        assert!(channel.send_event(ServerEvent::text("a")));
        assert!(channel.send_audio(Bytes::from_static(b"\x01\x02")));
        assert!(channel.ping());

        assert!(matches!(rx.recv().await, Some(OutboundFrame::Event(ServerEvent::Text { .. }))));
        assert!(matches!(rx.recv().await, Some(OutboundFrame::Audio(b)) if b.len() == 2));
        assert!(matches!(rx.recv().await, Some(OutboundFrame::Ping)));
    }

    #[tokio::test]
    async fn test_close_stops_further_sends() {
        let (channel, mut rx) = SessionChannel::new();
        channel.close();
        channel.close();
        assert!(!channel.is_open());
        assert!(!channel.send_event(ServerEvent::text("late")));
        assert!(matches!(rx.recv().await, Some(OutboundFrame::Close)));
        drop(channel);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_same_channel_tracks_clones() {
        let (first, _rx1) = SessionChannel::new();
        let (second, _rx2) = SessionChannel::new();
        assert!(first.same_channel(&first.clone()));
        assert!(!first.same_channel(&second));
    }

    #[test]
    fn test_dropped_writer_closes_channel() {
        let (channel, rx) = SessionChannel::new();
        drop(rx);
        assert!(!channel.is_open());
        assert!(!channel.send_audio(Bytes::from_static(b"x")));
    }
}
