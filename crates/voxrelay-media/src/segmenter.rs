//! Groups streamed text deltas into sentences worth synthesizing.

/// Per-generation sentence accumulator.
///
/// A sentence is complete when the buffered text ends in `.`, `!` or `?`
/// followed only by whitespace. [`flush`](Self::flush) consumes the
/// segmenter, so it cannot be fed again once the stream has ended.
#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    buffer: String,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta; returns the completed sentence if the buffer now ends one.
    pub fn feed(&mut self, delta: &str) -> Option<String> {
        self.buffer.push_str(delta);
        if !ends_sentence(&self.buffer) {
            return None;
        }
        let sentence = std::mem::take(&mut self.buffer);
        non_blank(sentence)
    }

    /// Emit whatever remains once the generation stream has ended.
    pub fn flush(self) -> Option<String> {
        non_blank(self.buffer)
    }

    /// Text buffered but not yet emitted.
    pub fn pending(&self) -> &str {
        &self.buffer
    }
}

fn ends_sentence(text: &str) -> bool {
    text.trim_end().ends_with(['.', '!', '?'])
}

fn non_blank(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
