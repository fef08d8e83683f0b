//! Generic SSE (Server-Sent Events) line parser.
//!
//! [`SseDecoder`] does the line bookkeeping; [`parse_sse_stream`] drives it
//! from a `reqwest::Response` body.

use std::fmt::Display;
use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use tokio_stream::StreamExt;

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

/// Incremental SSE decoder. Feed it raw text, pull complete events out.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    current_event: Option<String>,
    current_data: Vec<String>,
    current_id: Option<String>,
    /// Trailing bytes of a UTF-8 sequence split across network chunks.
    partial: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// Append raw body bytes, holding back an incomplete trailing UTF-8 sequence.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.partial.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.partial) {
            Ok(text) => text.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => {
                // Genuinely invalid bytes: decode lossily rather than stall.
                let text = String::from_utf8_lossy(&self.partial).into_owned();
                self.buffer.push_str(&text);
                self.partial.clear();
                return;
            }
        };
        let rest = self.partial.split_off(valid);
        let text = String::from_utf8_lossy(&self.partial).into_owned();
        self.buffer.push_str(&text);
        self.partial = rest;
    }

    /// Next complete event in the buffered text, if any.
    pub fn next_event(&mut self) -> Option<SseEvent> {
        while let Some(newline_pos) = self.buffer.find('\n') {
            let line = self.buffer[..newline_pos].trim_end_matches('\r').to_string();
            self.buffer.drain(..=newline_pos);

            if line.is_empty() {
                // Empty line = dispatch event
                if let Some(event) = self.take_event() {
                    return Some(event);
                }
                continue;
            }

            if line.starts_with(':') {
                continue;
            }

            if let Some(value) = line.strip_prefix("event:") {
                self.current_event = Some(value.trim_start().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                self.current_data.push(value.trim_start().to_string());
            } else if let Some(value) = line.strip_prefix("id:") {
                self.current_id = Some(value.trim_start().to_string());
            }
        }
        None
    }

    /// Dispatch whatever is pending once the body has ended.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            self.buffer.push('\n');
            if let Some(event) = self.next_event() {
                return Some(event);
            }
        }
        self.take_event()
    }

    fn take_event(&mut self) -> Option<SseEvent> {
        if self.current_data.is_empty() {
            return None;
        }
        let event = SseEvent {
            event: self.current_event.take(),
            data: self.current_data.join("\n"),
            id: self.current_id.take(),
        };
        self.current_data.clear();
        Some(event)
    }
}

/// Parse a reqwest response body as an SSE stream.
pub fn parse_sse_stream(
    response: reqwest::Response,
) -> impl Stream<Item = anyhow::Result<SseEvent>> {
    decode_byte_stream(response.bytes_stream())
}

/// Decode SSE events from a stream of body chunks. Chunk boundaries may fall
/// anywhere, including inside a UTF-8 sequence.
fn decode_byte_stream<S, E>(byte_stream: S) -> impl Stream<Item = anyhow::Result<SseEvent>>
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: Display,
{
    futures::stream::unfold(
        SseState {
            byte_stream: Box::pin(byte_stream),
            decoder: SseDecoder::default(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.decoder.next_event() {
                    return Some((Ok(event), state));
                }
                if state.done {
                    return None;
                }

                match state.byte_stream.next().await {
                    Some(Ok(chunk)) => {
                        state.decoder.push_bytes(&chunk);
                    }
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((Err(anyhow::anyhow!("SSE stream error: {e}")), state));
                    }
                    None => {
                        state.done = true;
                        return state.decoder.finish().map(|event| (Ok(event), state));
                    }
                }
            }
        },
    )
}

struct SseState<S> {
    byte_stream: Pin<Box<S>>,
    decoder: SseDecoder,
    done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_split_across_pushes() {
        let mut decoder = SseDecoder::default();
        decoder.push("data: {\"a\":");
        assert!(decoder.next_event().is_none());
        decoder.push("1}\r\n\r\n");
        let event = decoder.next_event().unwrap();
        assert_eq!(event.data, "{\"a\":1}");
        assert!(decoder.next_event().is_none());
    }

    #[test]
    fn test_comments_and_fields() {
        let mut decoder = SseDecoder::default();
        decoder.push(": keepalive\nevent: delta\nid: 7\ndata: one\ndata: two\n\n");
        let event = decoder.next_event().unwrap();
        assert_eq!(event.event.as_deref(), Some("delta"));
        assert_eq!(event.id.as_deref(), Some("7"));
        assert_eq!(event.data, "one\ntwo");
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        let body = "data: olá\n\n".as_bytes();
        // 'á' is two bytes; split inside it
        let split = body.iter().position(|b| *b == 0xC3).unwrap() + 1;
        decoder.push_bytes(&body[..split]);
        assert!(decoder.next_event().is_none());
        decoder.push_bytes(&body[split..]);
        assert_eq!(decoder.next_event().unwrap().data, "olá");
    }

    #[tokio::test]
    async fn test_byte_stream_decodes_across_chunks() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"t\":\"ol\xC3")),
            Ok(Bytes::from_static(b"\xA1\"}\n\ndata: ")),
            Ok(Bytes::from_static(b"tail")),
        ];
        let events: Vec<SseEvent> = decode_byte_stream(futures::stream::iter(chunks))
            .map(|e| e.unwrap())
            .collect()
            .await;
        let data: Vec<&str> = events.iter().map(|e| e.data.as_str()).collect();
        assert_eq!(data, ["{\"t\":\"olá\"}", "tail"]);
    }

    #[tokio::test]
    async fn test_byte_stream_error_ends_stream() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: one\n\n")),
            Err(std::io::Error::other("connection reset")),
            Ok(Bytes::from_static(b"data: never\n\n")),
        ];
        let results: Vec<anyhow::Result<SseEvent>> =
            decode_byte_stream(futures::stream::iter(chunks)).collect().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().data, "one");
        let err = results[1].as_ref().unwrap_err().to_string();
        assert!(err.contains("connection reset"));
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::default();
        decoder.push("data: tail");
        assert!(decoder.next_event().is_none());
        assert_eq!(decoder.finish().unwrap().data, "tail");
        assert!(decoder.finish().is_none());
    }
}
