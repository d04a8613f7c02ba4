//! OpenAI adaptor and shared OpenAI-dialect helpers.
//!
//! The canonical inbound dialect is OpenAI-shaped, so request translation
//! here is mostly a model rewrite plus streaming plumbing. The helpers in
//! this module (routes, bearer auth, error envelope parsing, response
//! conversion) are reused by the Azure adaptor and the whole
//! OpenAI-compatible family.

pub mod streaming;
pub mod types;

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;

use crate::error::RelayError;
use crate::relay::adaptor::{Adaptor, RelayOutcome};
use crate::relay::context::RelayContext;
use crate::relay::mode::RelayMode;
use crate::relay::provider::ProviderKind;
use crate::types::{CanonicalRequest, ChatChoice, ChatMessage, ChatResponse, FinishReason, Usage};
use crate::utils::streaming::StreamFactory;

use streaming::OpenAiEventConverter;
use types::{ChatCompletionResponse, ErrorEnvelope};

/// Route suffix for each mode in the OpenAI dialect.
pub(crate) fn dialect_route(mode: RelayMode) -> &'static str {
    match mode {
        RelayMode::ChatCompletions => "/chat/completions",
        RelayMode::Embeddings => "/embeddings",
        RelayMode::ImagesGenerations => "/images/generations",
        RelayMode::AudioTranscription => "/audio/transcriptions",
        RelayMode::Rerank => "/rerank",
        RelayMode::Moderations => "/moderations",
    }
}

/// Standard `Authorization: Bearer …` headers.
pub(crate) fn bearer_headers(ctx: &RelayContext) -> Result<HeaderMap, RelayError> {
    let mut headers = HeaderMap::new();
    let value = format!("Bearer {}", ctx.api_key.expose_secret());
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&value)
            .map_err(|e| RelayError::InvalidRequest(format!("invalid api key: {e}")))?,
    );
    Ok(headers)
}

/// Apply the caller-supplied deadline, if any.
pub(crate) fn apply_deadline(
    builder: reqwest::RequestBuilder,
    ctx: &RelayContext,
) -> reqwest::RequestBuilder {
    match ctx.deadline {
        Some(deadline) => builder.timeout(deadline),
        None => builder,
    }
}

/// Serialize the canonical request as an OpenAI-dialect JSON body with the
/// upstream model name swapped in. For chat, the context's stream flag is
/// authoritative and `stream_options.include_usage` is injected so usage
/// arrives on the final chunk.
pub(crate) fn build_json_body(
    ctx: &RelayContext,
    request: &CanonicalRequest,
    supports_stream_options: bool,
) -> Result<serde_json::Value, RelayError> {
    let mut body = match request {
        CanonicalRequest::Chat(req) => serde_json::to_value(req),
        CanonicalRequest::Embedding(req) => serde_json::to_value(req),
        CanonicalRequest::Image(req) => serde_json::to_value(req),
        CanonicalRequest::Rerank(req) => serde_json::to_value(req),
        CanonicalRequest::Moderation(raw) => Ok(raw.clone()),
        CanonicalRequest::Transcription(_) => {
            return Err(RelayError::InvalidRequest(
                "transcription requests use multipart, not JSON".into(),
            ));
        }
    }
    .map_err(|e| RelayError::InvalidRequest(e.to_string()))?;

    rewrite_model_field(&mut body, &ctx.model);

    if matches!(request, CanonicalRequest::Chat(_)) {
        body["stream"] = serde_json::Value::Bool(ctx.stream);
        if ctx.stream && supports_stream_options {
            body["stream_options"] = serde_json::json!({"include_usage": true});
        }
    }
    Ok(body)
}

/// Build the multipart form for an audio transcription.
pub(crate) fn build_transcription_form(
    ctx: &RelayContext,
    req: &crate::types::TranscriptionRequest,
) -> Result<reqwest::multipart::Form, RelayError> {
    let audio = base64::engine::general_purpose::STANDARD
        .decode(&req.audio)
        .map_err(|e| RelayError::InvalidRequest(format!("invalid audio payload: {e}")))?;
    let mut form = reqwest::multipart::Form::new()
        .text("model", ctx.model.clone())
        .part(
            "file",
            reqwest::multipart::Part::bytes(audio).file_name(req.file_name.clone()),
        );
    if let Some(language) = &req.language {
        form = form.text("language", language.clone());
    }
    if let Some(prompt) = &req.prompt {
        form = form.text("prompt", prompt.clone());
    }
    Ok(form)
}

/// Overwrite the `model` field of a JSON object, if it is one.
pub(crate) fn rewrite_model_field(body: &mut serde_json::Value, model: &str) {
    if let Some(object) = body.as_object_mut() {
        object.insert(
            "model".to_string(),
            serde_json::Value::String(model.to_string()),
        );
    }
}

/// Usage counters from a dialect response body; zeroed when absent so the
/// billing collaborator is still invoked.
pub(crate) fn extract_usage(body: &serde_json::Value) -> Usage {
    body.get("usage")
        .and_then(|u| serde_json::from_value::<types::WireUsage>(u.clone()).ok())
        .map(|u| u.to_usage())
        .unwrap_or_default()
}

/// Turn a non-2xx upstream response into the normalized error, preserving
/// the vendor envelope when it parses and the raw text otherwise.
pub(crate) async fn error_from_response(response: reqwest::Response) -> RelayError {
    let status = response.status().as_u16();
    let bytes = response.bytes().await.unwrap_or_default();
    parse_error_body(status, &bytes)
}

pub(crate) fn parse_error_body(status: u16, bytes: &[u8]) -> RelayError {
    if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(bytes) {
        let raw = serde_json::from_slice(bytes).ok();
        let message = envelope
            .error
            .message
            .clone()
            .unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned());
        return RelayError::Upstream {
            status,
            code: envelope.error.code_string(),
            message,
            raw,
        };
    }
    RelayError::Upstream {
        status,
        code: None,
        message: String::from_utf8_lossy(bytes).into_owned(),
        raw: None,
    }
}

/// Convert a batch chat response to the canonical shape, echoing the
/// caller's requested model name.
pub(crate) fn convert_chat_response(
    bytes: &[u8],
    ctx: &RelayContext,
) -> Result<(serde_json::Value, Usage), RelayError> {
    let wire: ChatCompletionResponse = serde_json::from_slice(bytes)
        .map_err(|e| RelayError::BadUpstreamResponse(format!("malformed chat response: {e}")))?;
    let usage = wire.usage.as_ref().map(|u| u.to_usage()).unwrap_or_default();
    let response = ChatResponse {
        id: wire.id.unwrap_or_default(),
        object: "chat.completion".to_string(),
        created: wire.created.unwrap_or_else(|| chrono::Utc::now().timestamp()),
        model: ctx.requested_model.clone(),
        choices: wire
            .choices
            .into_iter()
            .map(|choice| ChatChoice {
                index: choice.index.unwrap_or(0),
                message: ChatMessage::assistant(choice.message.content.unwrap_or_default()),
                finish_reason: choice
                    .finish_reason
                    .as_deref()
                    .map(FinishReason::from_openai),
            })
            .collect(),
        usage: usage.clone(),
    };
    let body = serde_json::to_value(&response)
        .map_err(|e| RelayError::BadUpstreamResponse(e.to_string()))?;
    Ok((body, usage))
}

/// Shared response half of the dialect: error envelopes, streaming, and the
/// per-mode batch conversions.
pub(crate) async fn dialect_do_response(
    response: reqwest::Response,
    ctx: &RelayContext,
) -> Result<RelayOutcome, RelayError> {
    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }

    match ctx.mode {
        RelayMode::ChatCompletions if ctx.stream => {
            let converter =
                OpenAiEventConverter::new(ctx.provider.as_str(), ctx.requested_model.clone());
            Ok(RelayOutcome::stream(StreamFactory::sse_stream(
                response, converter,
            )))
        }
        RelayMode::ChatCompletions => {
            let bytes = response.bytes().await.map_err(RelayError::from)?;
            let (body, usage) = convert_chat_response(&bytes, ctx)?;
            Ok(RelayOutcome::complete(body, usage))
        }
        _ => {
            // Non-chat modes share the dialect's JSON shape: rewrite the
            // model name and lift the usage counters.
            let bytes = response.bytes().await.map_err(RelayError::from)?;
            let mut body: serde_json::Value = serde_json::from_slice(&bytes)
                .map_err(|e| RelayError::BadUpstreamResponse(e.to_string()))?;
            if body.get("model").is_some() {
                rewrite_model_field(&mut body, &ctx.requested_model);
            }
            let usage = extract_usage(&body);
            Ok(RelayOutcome::complete(body, usage))
        }
    }
}

/// Native OpenAI adaptor. Supports every relay mode.
pub struct OpenAiAdaptor {
    http: reqwest::Client,
}

impl OpenAiAdaptor {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Adaptor for OpenAiAdaptor {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn init(&self, ctx: &RelayContext) -> Result<(), RelayError> {
        if ctx.model.is_empty() {
            return Err(RelayError::InvalidRequest("missing model name".into()));
        }
        Ok(())
    }

    fn build_request_url(&self, ctx: &RelayContext) -> Result<String, RelayError> {
        Ok(format!(
            "{}/v1{}",
            ctx.endpoint_root(),
            dialect_route(ctx.mode)
        ))
    }

    async fn do_request(
        &self,
        ctx: &RelayContext,
        request: &CanonicalRequest,
    ) -> Result<reqwest::Response, RelayError> {
        let url = self.build_request_url(ctx)?;
        let headers = bearer_headers(ctx)?;
        let builder = match request {
            CanonicalRequest::Transcription(req) => {
                let form = build_transcription_form(ctx, req)?;
                self.http.post(url).headers(headers).multipart(form)
            }
            _ => {
                let body = build_json_body(ctx, request, true)?;
                self.http.post(url).headers(headers).json(&body)
            }
        };
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
        dialect_do_response(response, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chat_ctx(stream: bool) -> RelayContext {
        RelayContext::builder(ProviderKind::OpenAi, RelayMode::ChatCompletions)
            .api_key("sk-test")
            .model("gpt-4o-2024-08-06")
            .requested_model("gpt-4o")
            .stream(stream)
            .build()
    }

    fn chat_request() -> CanonicalRequest {
        CanonicalRequest::parse(
            RelayMode::ChatCompletions,
            json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]})
                .to_string()
                .as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn url_is_deterministic() {
        let adaptor = OpenAiAdaptor::new(reqwest::Client::new());
        let ctx = chat_ctx(false);
        let first = adaptor.build_request_url(&ctx).unwrap();
        let second = adaptor.build_request_url(&ctx).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn chat_body_swaps_model_and_injects_stream_options() {
        let body = build_json_body(&chat_ctx(true), &chat_request(), true).unwrap();
        assert_eq!(body["model"], "gpt-4o-2024-08-06");
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);

        let body = build_json_body(&chat_ctx(false), &chat_request(), true).unwrap();
        assert_eq!(body["stream"], false);
        assert!(body.get("stream_options").is_none());
    }

    #[test]
    fn chat_response_round_trip_extracts_usage() {
        let upstream = json!({
            "id": "chatcmpl-1",
            "created": 1_700_000_000,
            "model": "gpt-4o-2024-08-06",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hello!"},
                         "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 15, "total_tokens": 25}
        });
        let ctx = chat_ctx(false);
        let (body, usage) =
            convert_chat_response(upstream.to_string().as_bytes(), &ctx).unwrap();
        assert_eq!(usage, Usage::new(10, 15));
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["choices"][0]["message"]["content"], "Hello!");
        assert_eq!(body["usage"]["total_tokens"], 25);
    }

    #[test]
    fn vendor_error_envelope_is_parsed() {
        let body = json!({
            "error": {"message": "Rate limit reached", "type": "tokens", "code": "rate_limit_exceeded"}
        });
        let err = parse_error_body(429, body.to_string().as_bytes());
        assert_eq!(err.status_code(), 429);
        assert_eq!(err.error_code(), "rate_limit_exceeded");
        assert!(err.to_string().contains("Rate limit reached"));
    }

    #[test]
    fn unparseable_error_body_keeps_raw_text() {
        let err = parse_error_body(502, b"Bad Gateway");
        assert_eq!(err.status_code(), 502);
        assert_eq!(err.error_code(), "upstream_error");
        assert!(err.to_string().contains("Bad Gateway"));
    }
}
