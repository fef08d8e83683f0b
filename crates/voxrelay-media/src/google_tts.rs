//! Google Cloud Text-to-Speech synthesizer.
//!
//! Uses the REST `text:synthesize` endpoint with an API key. The response
//! carries the whole utterance as base64 `audioContent`; with the default
//! `LINEAR16` encoding that is 16-bit PCM at the configured sample rate,
//! wrapped in a WAV header.

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use voxrelay_core::config::{TtsConfig, VoiceConfig};

use crate::speech::Synthesizer;

const DEFAULT_BASE_URL: &str = "https://texttospeech.googleapis.com";

pub struct GoogleTtsSynthesizer {
    base_url: String,
    api_key: String,
    voice: VoiceConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    #[serde(default)]
    audio_content: Option<String>,
}

impl GoogleTtsSynthesizer {
    pub fn new(api_key: String, config: &TtsConfig) -> Self {
        Self {
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            voice: config.voice.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from config, failing if no API key resolves.
    pub fn from_config(config: &TtsConfig) -> Result<Self> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| anyhow::anyhow!("No TTS API key configured"))?;
        Ok(Self::new(api_key, config))
    }
}

/// Build the request URL for the synthesize endpoint.
pub fn build_tts_url(base_url: &str, api_key: &str) -> String {
    format!("{base_url}/v1/text:synthesize?key={api_key}")
}

/// Escape text for embedding in an SSML `<speak>` element.
fn escape_ssml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Request body for one utterance.
pub fn build_request_body(text: &str, voice: &VoiceConfig) -> serde_json::Value {
    json!({
        "input": {
            "ssml": format!("<speak>{}</speak>", escape_ssml(text)),
        },
        "voice": {
            "languageCode": voice.language_code,
            "name": voice.name,
            "ssmlGender": voice.ssml_gender,
        },
        "audioConfig": {
            "audioEncoding": voice.audio_encoding,
            "sampleRateHertz": voice.sample_rate_hertz,
            "effectsProfileId": voice.effects_profile_id,
            "pitch": voice.pitch,
            "speakingRate": voice.speaking_rate,
        },
    })
}

fn decode_audio(body: SynthesizeResponse) -> Result<Bytes> {
    let encoded = body
        .audio_content
        .filter(|c| !c.is_empty())
        .ok_or_else(|| anyhow::anyhow!("TTS returned no audio content"))?;
    let audio = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| anyhow::anyhow!("TTS audio content is not valid base64: {e}"))?;
    Ok(Bytes::from(audio))
}

#[async_trait]
impl Synthesizer for GoogleTtsSynthesizer {
    fn id(&self) -> &str {
        "google"
    }

    async fn synthesize(&self, text: &str) -> Result<Bytes> {
        debug!(voice = %self.voice.name, text_len = text.len(), "Starting TTS request");

        let resp = self
            .client
            .post(build_tts_url(&self.base_url, &self.api_key))
            .header("Content-Type", "application/json")
            .json(&build_request_body(text, &self.voice))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("TTS API error {status}: {body}");
        }

        let body: SynthesizeResponse = resp.json().await?;
        decode_audio(body)
    }
}
