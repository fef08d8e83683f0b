//! Paced, chunked audio delivery.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

/// Destination for audio frames.
///
/// `send_audio` performs its own liveness checks and returns false when the
/// frame was not sent; the transmitter then stops.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn send_audio(&self, chunk: Bytes) -> bool;
}

/// How a transmission ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitOutcome {
    Completed { chunks: usize },
    /// The sink refused a frame; `sent` frames went out before that.
    Stopped { sent: usize, dropped: usize },
}

/// Splits audio into fixed-size frames and sends them with a small delay between frames.
#[derive(Debug, Clone, Copy)]
pub struct ChunkTransmitter {
    chunk_size: usize,
    pacing: Duration,
}

impl ChunkTransmitter {
    pub fn new(chunk_size: usize, pacing: Duration) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            pacing,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of frames `len` bytes split into.
    pub fn frame_count(&self, len: usize) -> usize {
        len.div_ceil(self.chunk_size)
    }

    /// Send `audio` in order. A refused frame ends the transmission quietly.
    pub async fn transmit(&self, sink: &dyn AudioSink, audio: Bytes) -> TransmitOutcome {
        let total = self.frame_count(audio.len());
        let mut offset = 0;
        let mut sent = 0;

        while offset < audio.len() {
            let end = (offset + self.chunk_size).min(audio.len());
            // Bytes::slice shares the buffer, no copy
            if !sink.send_audio(audio.slice(offset..end)).await {
                debug!(sent, dropped = total - sent, "Audio transmission stopped");
                return TransmitOutcome::Stopped {
                    sent,
                    dropped: total - sent,
                };
            }
            sent += 1;
            offset = end;

            if offset < audio.len() && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
        }

        TransmitOutcome::Completed { chunks: sent }
    }
}
