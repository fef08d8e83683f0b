//! Google Generative AI (Gemini) generator.
//!
//! Implements streaming via the `streamGenerateContent` endpoint with SSE.
//! Auth is via API key in query parameter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

use voxrelay_core::config::GeneratorConfig;

use crate::sse::parse_sse_stream;
use crate::{GenerationRequest, Generator, TextStream};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiGenerator {
    pub base_url: String,
    api_key: String,
    settings: GeneratorConfig,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(api_key: String, settings: GeneratorConfig) -> Self {
        let base_url = settings
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        Self {
            base_url,
            api_key,
            settings,
            client: reqwest::Client::new(),
        }
    }

    /// Build from config, failing if no API key resolves.
    pub fn from_config(settings: GeneratorConfig) -> anyhow::Result<Self> {
        let api_key = settings
            .resolve_api_key()
            .ok_or_else(|| anyhow::anyhow!("No Gemini API key configured"))?;
        Ok(Self::new(api_key, settings))
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, self.settings.model, self.api_key
        )
    }

    fn build_body(&self, request: &GenerationRequest) -> GeminiRequest {
        GeminiRequest {
            contents: vec![json!({
                "role": "user",
                "parts": [{ "text": request.user_message }],
            })],
            system_instruction: (!request.system_prompt.is_empty()).then(|| {
                json!({
                    "parts": [{ "text": request.system_prompt }]
                })
            }),
            generation_config: GenerationConfig {
                max_output_tokens: self.settings.max_output_tokens,
                temperature: self.settings.temperature,
                top_p: self.settings.top_p,
                top_k: self.settings.top_k,
            },
        }
    }
}

// --- Gemini request/response types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<serde_json::Value>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f64,
    top_p: f64,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// What one SSE payload contributes to the delta stream.
#[derive(Debug, PartialEq)]
enum ChunkOutcome {
    Delta(String),
    Skip,
    Blocked(String),
}

fn interpret_chunk(data: &str) -> ChunkOutcome {
    let chunk: GeminiStreamChunk = match serde_json::from_str(data) {
        Ok(c) => c,
        Err(e) => {
            trace!(%e, "Failed to parse Gemini chunk");
            return ChunkOutcome::Skip;
        }
    };

    if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
        return ChunkOutcome::Blocked(reason);
    }

    let Some(candidate) = chunk.candidates.into_iter().next() else {
        return ChunkOutcome::Skip;
    };

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if reason != "STOP" && reason != "MAX_TOKENS" {
            trace!(reason, "Gemini finish reason");
        }
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        ChunkOutcome::Skip
    } else {
        ChunkOutcome::Delta(text)
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn id(&self) -> &str {
        "google"
    }

    async fn stream(&self, request: &GenerationRequest) -> anyhow::Result<TextStream> {
        let body = self.build_body(request);

        debug!(model = %self.settings.model, "Streaming Gemini API");

        let response = self
            .client
            .post(self.stream_url())
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error {status}: {body}");
        }

        let sse_stream = parse_sse_stream(response);

        let deltas = sse_stream.filter_map(|event| match event {
            Ok(event) => match interpret_chunk(event.data.trim()) {
                ChunkOutcome::Delta(text) => Some(Ok(text)),
                ChunkOutcome::Skip => None,
                ChunkOutcome::Blocked(reason) => {
                    Some(Err(anyhow::anyhow!("Gemini blocked the prompt: {reason}")))
                }
            },
            Err(e) => Some(Err(e)),
        });

        Ok(Box::pin(deltas))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> GeminiGenerator {
        GeminiGenerator::new("test-key".into(), GeneratorConfig::default())
    }

    #[test]
    fn test_gemini_generator_creation() {
        let generator = generator();
        assert_eq!(generator.id(), "google");
        assert_eq!(generator.base_url, DEFAULT_BASE_URL);
        let url = generator.stream_url();
        assert!(url.contains(":streamGenerateContent?alt=sse"));
        assert!(url.contains("key=test-key"));
        assert!(url.contains("gemini-2.0-flash"));
    }

    #[test]
    fn test_base_url_override_trims_slash() {
        let settings = GeneratorConfig {
            base_url: Some("http://localhost:9999/".into()),
            ..Default::default()
        };
        let generator = GeminiGenerator::new("k".into(), settings);
        assert_eq!(generator.base_url, "http://localhost:9999");
    }

    #[test]
    fn test_from_config_requires_key() {
        let settings = GeneratorConfig {
            api_key: None,
            api_key_env: Some("VOXRELAY_TEST_UNSET_GEMINI".into()),
            ..Default::default()
        };
        assert!(GeminiGenerator::from_config(settings).is_err());
    }

    #[test]
    fn test_request_body_shape() {
        let body = generator().build_body(&GenerationRequest {
            system_prompt: "You are a tour guide.".into(),
            user_message: "Where am I?".into(),
        });
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "Where am I?");
        assert_eq!(
            json["systemInstruction"]["parts"][0]["text"],
            "You are a tour guide."
        );
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 200);
        assert_eq!(json["generationConfig"]["topK"], 40);
    }

    #[test]
    fn test_interpret_text_chunk() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"Hello"},{"text":" there"}]}}]}"#;
        assert_eq!(interpret_chunk(data), ChunkOutcome::Delta("Hello there".into()));
    }

    #[test]
    fn test_interpret_finish_only_chunk() {
        let data = r#"{"candidates":[{"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":3}}"#;
        assert_eq!(interpret_chunk(data), ChunkOutcome::Skip);
    }

    #[test]
    fn test_interpret_blocked_prompt() {
        let data = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        assert_eq!(interpret_chunk(data), ChunkOutcome::Blocked("SAFETY".into()));
    }

    #[test]
    fn test_interpret_garbage_is_skipped() {
        assert_eq!(interpret_chunk("not json"), ChunkOutcome::Skip);
    }
}
