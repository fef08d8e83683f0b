//! Text generator abstraction.
//!
//! A [`Generator`] turns a system prompt plus one user utterance into a stream
//! of text deltas. Dropping the stream abandons the upstream request.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

pub mod google;
pub mod sse;

/// Stream of text deltas. An `Err` item ends the generation as a failure.
pub type TextStream = Pin<Box<dyn Stream<Item = anyhow::Result<String>> + Send>>;

/// A single-turn generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// The conversation's standing instruction, fixed at session creation.
    pub system_prompt: String,
    /// What the user just said.
    pub user_message: String,
}

/// The streaming text generation service.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Provider identifier (e.g., "google").
    fn id(&self) -> &str;

    /// Start a generation and return its delta stream.
    ///
    /// Errors here mean the request could not be started at all; errors
    /// after that arrive as stream items.
    async fn stream(&self, request: &GenerationRequest) -> anyhow::Result<TextStream>;
}
