//! Canonical request/response types for every relay mode.
//!
//! These are the gateway's own uniform schema, independent of any vendor's
//! wire format. Adaptors translate between these shapes and the upstream
//! dialects.

pub mod chat;
pub mod common;

pub use chat::{
    ChatChoice, ChatMessage, ChatRequest, ChatResponse, ContentPart, ImageUrl, MessageContent,
    MessageRole,
};
pub use common::{FinishReason, ResponseMetadata, Usage};

use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::relay::mode::RelayMode;

/// Canonical embedding request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: EmbeddingInput,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>),
}

impl EmbeddingInput {
    pub fn as_vec(&self) -> Vec<String> {
        match self {
            Self::Single(text) => vec![text.clone()],
            Self::Batch(texts) => texts.clone(),
        }
    }
}

/// Canonical embedding response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub object: String,
    pub data: Vec<EmbeddingData>,
    pub model: String,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingData {
    pub object: String,
    pub index: u32,
    pub embedding: Vec<f32>,
}

/// Canonical image-generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenerationRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Canonical image-generation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenerationResponse {
    pub created: i64,
    pub data: Vec<ImageData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}

/// Canonical audio-transcription request. The audio payload arrives
/// base64-encoded in the canonical body; adaptors re-encode it as the
/// upstream expects (multipart for the OpenAI dialect).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionRequest {
    pub model: String,
    pub file_name: String,
    /// Base64-encoded audio bytes.
    pub audio: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// Canonical audio-transcription response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub text: String,
}

/// Canonical rerank request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankRequest {
    pub model: String,
    pub query: String,
    pub documents: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_n: Option<u32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Canonical rerank response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankResponse {
    pub model: String,
    pub results: Vec<RerankResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankResult {
    pub index: u32,
    pub relevance_score: f64,
}

/// The canonical inbound request, parsed from the opaque body per mode.
#[derive(Debug, Clone)]
pub enum CanonicalRequest {
    Chat(ChatRequest),
    Embedding(EmbeddingRequest),
    Image(ImageGenerationRequest),
    Transcription(TranscriptionRequest),
    Rerank(RerankRequest),
    /// Moderation bodies are forwarded verbatim; only the model field is
    /// rewritten for the upstream.
    Moderation(serde_json::Value),
}

impl CanonicalRequest {
    /// Deserialize the opaque inbound body according to the relay mode.
    pub fn parse(mode: RelayMode, body: &[u8]) -> Result<Self, RelayError> {
        let invalid = |e: serde_json::Error| RelayError::InvalidRequest(e.to_string());
        match mode {
            RelayMode::ChatCompletions => {
                Ok(Self::Chat(serde_json::from_slice(body).map_err(invalid)?))
            }
            RelayMode::Embeddings => Ok(Self::Embedding(
                serde_json::from_slice(body).map_err(invalid)?,
            )),
            RelayMode::ImagesGenerations => {
                Ok(Self::Image(serde_json::from_slice(body).map_err(invalid)?))
            }
            RelayMode::AudioTranscription => Ok(Self::Transcription(
                serde_json::from_slice(body).map_err(invalid)?,
            )),
            RelayMode::Rerank => {
                Ok(Self::Rerank(serde_json::from_slice(body).map_err(invalid)?))
            }
            RelayMode::Moderations => Ok(Self::Moderation(
                serde_json::from_slice(body).map_err(invalid)?,
            )),
        }
    }

    pub fn mode(&self) -> RelayMode {
        match self {
            Self::Chat(_) => RelayMode::ChatCompletions,
            Self::Embedding(_) => RelayMode::Embeddings,
            Self::Image(_) => RelayMode::ImagesGenerations,
            Self::Transcription(_) => RelayMode::AudioTranscription,
            Self::Rerank(_) => RelayMode::Rerank,
            Self::Moderation(_) => RelayMode::Moderations,
        }
    }
}
