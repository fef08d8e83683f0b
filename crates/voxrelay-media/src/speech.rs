//! Synthesizer abstraction and the adapter that prepares text for it.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use tracing::debug;

use voxrelay_core::error::RelayError;

/// The external text-to-speech service.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Provider identifier (e.g., "google").
    fn id(&self) -> &str;

    /// Convert speakable text to an audio payload.
    async fn synthesize(&self, text: &str) -> anyhow::Result<Bytes>;
}

static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[^`]*```").expect("static regex"));
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`[^`]*`").expect("static regex"));

/// Strip markup that should not be read aloud: asterisks, fenced code blocks,
/// and inline code spans.
pub fn clean_text_for_speech(text: &str) -> String {
    let without_stars = text.replace('*', "");
    let without_blocks = CODE_BLOCK.replace_all(&without_stars, "");
    let without_inline = INLINE_CODE.replace_all(&without_blocks, "");
    without_inline.trim().to_string()
}

/// Wraps a [`Synthesizer`] with text cleaning and error classification.
#[derive(Clone)]
pub struct SpeechAdapter {
    synthesizer: Arc<dyn Synthesizer>,
}

impl SpeechAdapter {
    pub fn new(synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self { synthesizer }
    }

    /// Synthesize one sentence.
    ///
    /// `Ok(None)` means there was nothing speakable and no call was made.
    pub async fn speak(&self, sentence: &str) -> Result<Option<Bytes>, RelayError> {
        let cleaned = clean_text_for_speech(sentence);
        if cleaned.is_empty() {
            debug!("Nothing speakable after cleaning, skipping synthesis");
            return Ok(None);
        }

        debug!(
            provider = self.synthesizer.id(),
            text_len = cleaned.len(),
            "Synthesizing sentence"
        );

        let audio = self
            .synthesizer
            .synthesize(&cleaned)
            .await
            .map_err(|e| RelayError::UpstreamSynthesis(e.to_string()))?;

        debug!(bytes = audio.len(), "Audio generated");
        Ok(Some(audio))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingSynthesizer {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Synthesizer for RecordingSynthesizer {
        fn id(&self) -> &str {
            "recording"
        }

        async fn synthesize(&self, text: &str) -> anyhow::Result<Bytes> {
            self.calls.lock().unwrap().push(text.to_string());
            if self.fail {
                anyhow::bail!("TTS API error 503");
            }
            Ok(Bytes::from(text.as_bytes().to_vec()))
        }
    }

    #[test]
    fn test_clean_text_for_speech() {
        assert_eq!(clean_text_for_speech("**Bold** move."), "Bold move.");
        assert_eq!(
            clean_text_for_speech("Run ```ls -la``` now"),
            "Run  now"
        );
        assert_eq!(clean_text_for_speech("Use `cargo` here."), "Use  here.");
        assert_eq!(clean_text_for_speech("  plain  "), "plain");
        assert_eq!(clean_text_for_speech("```\ncode\n```"), "");
    }

    #[tokio::test]
    async fn test_speak_skips_unspeakable_text() {
        let synth = Arc::new(RecordingSynthesizer::default());
        let adapter = SpeechAdapter::new(synth.clone());
        assert!(adapter.speak("***").await.unwrap().is_none());
        assert!(adapter.speak("`x`").await.unwrap().is_none());
        assert!(synth.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_speak_sends_cleaned_text() {
        let synth = Arc::new(RecordingSynthesizer::default());
        let adapter = SpeechAdapter::new(synth.clone());
        let audio = adapter.speak("*Olá*, tudo bem?").await.unwrap().unwrap();
        assert_eq!(&audio[..], "Olá, tudo bem?".as_bytes());
        assert_eq!(synth.calls.lock().unwrap().as_slice(), ["Olá, tudo bem?"]);
    }

    #[tokio::test]
    async fn test_speak_classifies_provider_failure() {
        let synth = Arc::new(RecordingSynthesizer {
            fail: true,
            ..Default::default()
        });
        let adapter = SpeechAdapter::new(synth);
        let err = adapter.speak("Hello.").await.unwrap_err();
        assert!(matches!(err, RelayError::UpstreamSynthesis(_)));
    }
}
