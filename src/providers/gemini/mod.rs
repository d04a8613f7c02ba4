//! Google Gemini adaptor.
//!
//! The model and operation are embedded in the URL rather than the body
//! (`/v1beta/models/{model}:generateContent`), auth rides the
//! `x-goog-api-key` header, and streaming uses `alt=sse`. Chat and
//! embeddings are supported.

pub mod streaming;
pub mod types;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;

use crate::error::RelayError;
use crate::providers::openai::apply_deadline;
use crate::relay::adaptor::{Adaptor, RelayOutcome, unsupported_mode};
use crate::relay::context::RelayContext;
use crate::relay::mode::RelayMode;
use crate::relay::provider::ProviderKind;
use crate::types::{
    CanonicalRequest, ChatChoice, ChatMessage, ChatRequest, ChatResponse, ContentPart,
    EmbeddingData, EmbeddingRequest, EmbeddingResponse, MessageContent, MessageRole, Usage,
};
use crate::utils::streaming::StreamFactory;

use streaming::GeminiEventConverter;
use types::{
    BatchEmbedRequest, BatchEmbedResponse, Blob, Content, EmbedContentRequest,
    GeminiErrorEnvelope, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part,
    map_finish_reason,
};

pub struct GeminiAdaptor {
    http: reqwest::Client,
}

impl GeminiAdaptor {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn headers(ctx: &RelayContext) -> Result<HeaderMap, RelayError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(ctx.api_key.expose_secret())
                .map_err(|e| RelayError::InvalidRequest(format!("invalid api key: {e}")))?,
        );
        Ok(headers)
    }
}

/// Translate a canonical chat request into a GenerateContent request.
pub(crate) fn build_generate_request(
    ctx: &RelayContext,
    req: &ChatRequest,
) -> Result<GenerateContentRequest, RelayError> {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for message in &req.messages {
        let role = match message.role {
            MessageRole::System => {
                system_parts.push(Part::Text {
                    text: message.content.text(),
                });
                continue;
            }
            MessageRole::Assistant => "model",
            MessageRole::User | MessageRole::Tool => "user",
        };
        contents.push(Content {
            role: Some(role.to_string()),
            parts: convert_parts(&message.content)?,
        });
    }

    let generation_config = GenerationConfig {
        temperature: req.temperature,
        top_p: req.top_p,
        max_output_tokens: req.max_tokens,
        stop_sequences: req.stop.clone(),
    };

    Ok(GenerateContentRequest {
        contents,
        system_instruction: if system_parts.is_empty() {
            None
        } else {
            Some(Content {
                role: None,
                parts: system_parts,
            })
        },
        generation_config: Some(generation_config),
    })
}

fn convert_parts(content: &MessageContent) -> Result<Vec<Part>, RelayError> {
    match content {
        MessageContent::Text(text) => Ok(vec![Part::Text { text: text.clone() }]),
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => Ok(Part::Text { text: text.clone() }),
                ContentPart::ImageUrl { image_url } => {
                    let Some(rest) = image_url.url.strip_prefix("data:") else {
                        return Err(RelayError::InvalidRequest(
                            "gemini requires inline image data".into(),
                        ));
                    };
                    let (header, data) = rest
                        .split_once(',')
                        .ok_or_else(|| RelayError::InvalidRequest("malformed data url".into()))?;
                    Ok(Part::InlineData {
                        inline_data: Blob {
                            mime_type: header
                                .split(';')
                                .next()
                                .unwrap_or("image/jpeg")
                                .to_string(),
                            data: data.to_string(),
                        },
                    })
                }
            })
            .collect(),
    }
}

/// Convert a batch GenerateContent response to the canonical chat shape.
pub(crate) fn convert_generate_response(
    bytes: &[u8],
    ctx: &RelayContext,
) -> Result<(serde_json::Value, Usage), RelayError> {
    let wire: GenerateContentResponse = serde_json::from_slice(bytes).map_err(|e| {
        RelayError::BadUpstreamResponse(format!("malformed generate response: {e}"))
    })?;
    let usage = wire
        .usage_metadata
        .as_ref()
        .map(|m| m.to_usage())
        .unwrap_or_default();
    let choices = wire
        .candidates
        .iter()
        .enumerate()
        .map(|(i, candidate)| {
            let text: String = candidate
                .content
                .as_ref()
                .map(|content| {
                    content
                        .parts
                        .iter()
                        .filter_map(|part| match part {
                            Part::Text { text } => Some(text.as_str()),
                            _ => None,
                        })
                        .collect()
                })
                .unwrap_or_default();
            ChatChoice {
                index: candidate.index.unwrap_or(i) as u32,
                message: ChatMessage::assistant(text),
                finish_reason: candidate.finish_reason.as_deref().map(map_finish_reason),
            }
        })
        .collect();
    let response = ChatResponse {
        id: String::new(),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: ctx.requested_model.clone(),
        choices,
        usage: usage.clone(),
    };
    let body = serde_json::to_value(&response)
        .map_err(|e| RelayError::BadUpstreamResponse(e.to_string()))?;
    Ok((body, usage))
}

/// Convert a batchEmbedContents response to the canonical embedding shape.
pub(crate) fn convert_embed_response(
    bytes: &[u8],
    ctx: &RelayContext,
) -> Result<serde_json::Value, RelayError> {
    let wire: BatchEmbedResponse = serde_json::from_slice(bytes)
        .map_err(|e| RelayError::BadUpstreamResponse(format!("malformed embed response: {e}")))?;
    let response = EmbeddingResponse {
        object: "list".to_string(),
        data: wire
            .embeddings
            .into_iter()
            .enumerate()
            .map(|(i, embedding)| EmbeddingData {
                object: "embedding".to_string(),
                index: i as u32,
                embedding: embedding.values,
            })
            .collect(),
        model: ctx.requested_model.clone(),
        // Gemini's embedding API reports no token counts.
        usage: Usage::default(),
    };
    serde_json::to_value(&response).map_err(|e| RelayError::BadUpstreamResponse(e.to_string()))
}

pub(crate) fn parse_error_body(status: u16, bytes: &[u8]) -> RelayError {
    if let Ok(envelope) = serde_json::from_slice::<GeminiErrorEnvelope>(bytes) {
        return RelayError::Upstream {
            status: envelope.error.code.unwrap_or(status),
            code: envelope.error.status,
            message: envelope
                .error
                .message
                .unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned()),
            raw: serde_json::from_slice(bytes).ok(),
        };
    }
    RelayError::Upstream {
        status,
        code: None,
        message: String::from_utf8_lossy(bytes).into_owned(),
        raw: None,
    }
}

#[async_trait]
impl Adaptor for GeminiAdaptor {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn init(&self, ctx: &RelayContext) -> Result<(), RelayError> {
        if !matches!(
            ctx.mode,
            RelayMode::ChatCompletions | RelayMode::Embeddings
        ) {
            return Err(unsupported_mode(ctx));
        }
        if ctx.model.is_empty() {
            return Err(RelayError::InvalidRequest("missing model name".into()));
        }
        Ok(())
    }

    fn build_request_url(&self, ctx: &RelayContext) -> Result<String, RelayError> {
        let root = ctx.endpoint_root();
        let model = &ctx.model;
        Ok(match ctx.mode {
            RelayMode::ChatCompletions if ctx.stream => {
                format!("{root}/v1beta/models/{model}:streamGenerateContent?alt=sse")
            }
            RelayMode::ChatCompletions => {
                format!("{root}/v1beta/models/{model}:generateContent")
            }
            RelayMode::Embeddings => {
                format!("{root}/v1beta/models/{model}:batchEmbedContents")
            }
            _ => return Err(unsupported_mode(ctx)),
        })
    }

    async fn do_request(
        &self,
        ctx: &RelayContext,
        request: &CanonicalRequest,
    ) -> Result<reqwest::Response, RelayError> {
        let url = self.build_request_url(ctx)?;
        let body = match request {
            CanonicalRequest::Chat(chat) => {
                serde_json::to_value(build_generate_request(ctx, chat)?)
            }
            CanonicalRequest::Embedding(embedding) => {
                serde_json::to_value(build_embed_request(ctx, embedding))
            }
            _ => return Err(unsupported_mode(ctx)),
        }
        .map_err(|e| RelayError::InvalidRequest(e.to_string()))?;

        let builder = self
            .http
            .post(url)
            .headers(Self::headers(ctx)?)
            .json(&body);
        apply_deadline(builder, ctx)
            .send()
            .await
            .map_err(RelayError::from)
    }

    async fn do_response(
        &self,
        response: reqwest::Response,
        ctx: &RelayContext,
    ) -> Result<RelayOutcome, RelayError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let bytes = response.bytes().await.unwrap_or_default();
            return Err(parse_error_body(status, &bytes));
        }
        match ctx.mode {
            RelayMode::ChatCompletions if ctx.stream => {
                let converter = GeminiEventConverter::new(ctx.requested_model.clone());
                Ok(RelayOutcome::stream(StreamFactory::sse_stream(
                    response, converter,
                )))
            }
            RelayMode::ChatCompletions => {
                let bytes = response.bytes().await.map_err(RelayError::from)?;
                let (body, usage) = convert_generate_response(&bytes, ctx)?;
                Ok(RelayOutcome::complete(body, usage))
            }
            RelayMode::Embeddings => {
                let bytes = response.bytes().await.map_err(RelayError::from)?;
                let body = convert_embed_response(&bytes, ctx)?;
                Ok(RelayOutcome::complete(body, Usage::default()))
            }
            _ => Err(unsupported_mode(ctx)),
        }
    }
}

fn build_embed_request(ctx: &RelayContext, req: &EmbeddingRequest) -> BatchEmbedRequest {
    BatchEmbedRequest {
        requests: req
            .input
            .as_vec()
            .into_iter()
            .map(|text| EmbedContentRequest {
                model: format!("models/{}", ctx.model),
                content: Content {
                    role: None,
                    parts: vec![Part::Text { text }],
                },
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(mode: RelayMode, stream: bool) -> RelayContext {
        RelayContext::builder(ProviderKind::Gemini, mode)
            .api_key("key")
            .model("gemini-1.5-pro")
            .stream(stream)
            .build()
    }

    #[test]
    fn urls_embed_model_and_operation() {
        let adaptor = GeminiAdaptor::new(reqwest::Client::new());
        assert_eq!(
            adaptor
                .build_request_url(&ctx(RelayMode::ChatCompletions, false))
                .unwrap(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro:generateContent"
        );
        assert_eq!(
            adaptor
                .build_request_url(&ctx(RelayMode::ChatCompletions, true))
                .unwrap(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro:streamGenerateContent?alt=sse"
        );
        assert_eq!(
            adaptor
                .build_request_url(&ctx(RelayMode::Embeddings, false))
                .unwrap(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro:batchEmbedContents"
        );
    }

    #[test]
    fn roles_map_to_gemini_dialect() {
        let req: ChatRequest = serde_json::from_value(json!({
            "model": "gemini-1.5-pro",
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"}
            ]
        }))
        .unwrap();
        let body = build_generate_request(&ctx(RelayMode::ChatCompletions, false), &req).unwrap();
        assert!(body.system_instruction.is_some());
        assert_eq!(body.contents.len(), 2);
        assert_eq!(body.contents[1].role.as_deref(), Some("model"));
    }

    #[test]
    fn batch_response_converts() {
        let upstream = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello!"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 6, "candidatesTokenCount": 3, "totalTokenCount": 9}
        });
        let (body, usage) = convert_generate_response(
            upstream.to_string().as_bytes(),
            &ctx(RelayMode::ChatCompletions, false),
        )
        .unwrap();
        assert_eq!(usage.total_tokens, 9);
        assert_eq!(body["choices"][0]["message"]["content"], "Hello!");
        assert_eq!(body["model"], "gemini-1.5-pro");
    }

    #[test]
    fn error_envelope_prefers_embedded_status() {
        let bytes = json!({
            "error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}
        })
        .to_string();
        let err = parse_error_body(429, bytes.as_bytes());
        assert_eq!(err.status_code(), 429);
        assert_eq!(err.error_code(), "RESOURCE_EXHAUSTED");
    }
}
