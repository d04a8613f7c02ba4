//! Anthropic Messages adaptor.
//!
//! Chat-only. Canonical chat requests translate into the Messages API:
//! system messages are lifted into the `system` field, multimodal parts map
//! to typed content blocks, and `max_tokens` (mandatory upstream) defaults
//! when the caller omits it.

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
    MessageContent, MessageRole, Usage,
};
use crate::utils::streaming::StreamFactory;

use streaming::AnthropicEventConverter;
use types::{
    AnthropicErrorEnvelope, AnthropicMessage, ContentBlock, ImageSource, MessagesRequest,
    MessagesResponse, map_stop_reason,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicAdaptor {
    http: reqwest::Client,
}

impl AnthropicAdaptor {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn headers(ctx: &RelayContext) -> Result<HeaderMap, RelayError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(ctx.api_key.expose_secret())
                .map_err(|e| RelayError::InvalidRequest(format!("invalid api key: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        Ok(headers)
    }
}

/// Translate a canonical chat request into a Messages request.
pub(crate) fn build_messages_request(
    ctx: &RelayContext,
    req: &ChatRequest,
) -> Result<MessagesRequest, RelayError> {
    let mut system_parts = Vec::new();
    let mut messages = Vec::new();

    for message in &req.messages {
        match message.role {
            MessageRole::System => system_parts.push(message.content.text()),
            MessageRole::Assistant => messages.push(AnthropicMessage {
                role: "assistant",
                content: convert_content(&message.content)?,
            }),
            // Tool results are folded into the user turn; the Messages API
            // has no free-standing tool role.
            MessageRole::User | MessageRole::Tool => messages.push(AnthropicMessage {
                role: "user",
                content: convert_content(&message.content)?,
            }),
        }
    }

    Ok(MessagesRequest {
        model: ctx.model.clone(),
        max_tokens: req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        messages,
        system: if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n"))
        },
        temperature: req.temperature,
        top_p: req.top_p,
        stop_sequences: req.stop.clone(),
        stream: ctx.stream,
    })
}

fn convert_content(content: &MessageContent) -> Result<Vec<ContentBlock>, RelayError> {
    match content {
        MessageContent::Text(text) => Ok(vec![ContentBlock::Text { text: text.clone() }]),
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => Ok(ContentBlock::Text { text: text.clone() }),
                ContentPart::ImageUrl { image_url } => {
                    let source = if let Some(rest) = image_url.url.strip_prefix("data:") {
                        // data:<media type>;base64,<payload>
                        let (header, data) = rest.split_once(",").ok_or_else(|| {
                            RelayError::InvalidRequest("malformed data url".into())
                        })?;
                        ImageSource::Base64 {
                            media_type: header
                                .split(';')
                                .next()
                                .unwrap_or("image/jpeg")
                                .to_string(),
                            data: data.to_string(),
                        }
                    } else {
                        ImageSource::Url {
                            url: image_url.url.clone(),
                        }
                    };
                    Ok(ContentBlock::Image { source })
                }
            })
            .collect(),
    }
}

/// Convert a batch Messages response to the canonical chat shape.
pub(crate) fn convert_messages_response(
    bytes: &[u8],
    ctx: &RelayContext,
) -> Result<(serde_json::Value, Usage), RelayError> {
    let wire: MessagesResponse = serde_json::from_slice(bytes)
        .map_err(|e| RelayError::BadUpstreamResponse(format!("malformed messages response: {e}")))?;
    let usage = wire
        .usage
        .as_ref()
        .map(|u| Usage::new(u.input_tokens.unwrap_or(0), u.output_tokens.unwrap_or(0)))
        .unwrap_or_default();
    let text: String = wire
        .content
        .iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text.as_deref())
        .collect();
    let response = ChatResponse {
        id: wire.id.unwrap_or_default(),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: ctx.requested_model.clone(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage::assistant(text),
            finish_reason: wire.stop_reason.as_deref().map(map_stop_reason),
        }],
        usage: usage.clone(),
    };
    let body = serde_json::to_value(&response)
        .map_err(|e| RelayError::BadUpstreamResponse(e.to_string()))?;
    Ok((body, usage))
}

pub(crate) fn parse_error_body(status: u16, bytes: &[u8]) -> RelayError {
    if let Ok(envelope) = serde_json::from_slice::<AnthropicErrorEnvelope>(bytes) {
        return RelayError::Upstream {
            status,
            code: envelope.error.kind,
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
impl Adaptor for AnthropicAdaptor {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn init(&self, ctx: &RelayContext) -> Result<(), RelayError> {
        if ctx.mode != RelayMode::ChatCompletions {
            return Err(unsupported_mode(ctx));
        }
        if ctx.model.is_empty() {
            return Err(RelayError::InvalidRequest("missing model name".into()));
        }
        Ok(())
    }

    fn build_request_url(&self, ctx: &RelayContext) -> Result<String, RelayError> {
        Ok(format!("{}/v1/messages", ctx.endpoint_root()))
    }

    async fn do_request(
        &self,
        ctx: &RelayContext,
        request: &CanonicalRequest,
    ) -> Result<reqwest::Response, RelayError> {
        let CanonicalRequest::Chat(chat) = request else {
            return Err(unsupported_mode(ctx));
        };
        let body = build_messages_request(ctx, chat)?;
        let builder = self
            .http
            .post(self.build_request_url(ctx)?)
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
        if ctx.stream {
            let converter = AnthropicEventConverter::new(ctx.requested_model.clone());
            return Ok(RelayOutcome::stream(StreamFactory::sse_stream(
                response, converter,
            )));
        }
        let bytes = response.bytes().await.map_err(RelayError::from)?;
        let (body, usage) = convert_messages_response(&bytes, ctx)?;
        Ok(RelayOutcome::complete(body, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> RelayContext {
        RelayContext::builder(ProviderKind::Anthropic, RelayMode::ChatCompletions)
            .api_key("key")
            .model("claude-3-5-sonnet-20241022")
            .requested_model("claude-3-5-sonnet")
            .build()
    }

    fn chat(messages: serde_json::Value) -> ChatRequest {
        serde_json::from_value(json!({"model": "claude-3-5-sonnet", "messages": messages}))
            .unwrap()
    }

    #[test]
    fn system_messages_are_lifted() {
        let req = chat(json!([
            {"role": "system", "content": "be brief"},
            {"role": "user", "content": "hello"}
        ]));
        let body = build_messages_request(&ctx(), &req).unwrap();
        assert_eq!(body.system.as_deref(), Some("be brief"));
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].role, "user");
        assert_eq!(body.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn data_urls_become_base64_sources() {
        let req = chat(json!([{"role": "user", "content": [
            {"type": "text", "text": "what is this?"},
            {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
        ]}]));
        let body = build_messages_request(&ctx(), &req).unwrap();
        let rendered = serde_json::to_value(&body).unwrap();
        assert_eq!(rendered["messages"][0]["content"][1]["source"]["type"], "base64");
        assert_eq!(
            rendered["messages"][0]["content"][1]["source"]["media_type"],
            "image/png"
        );
    }

    #[test]
    fn batch_response_converts_and_counts() {
        let upstream = json!({
            "id": "msg_01",
            "model": "claude-3-5-sonnet-20241022",
            "content": [{"type": "text", "text": "Hello!"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 15}
        });
        let (body, usage) =
            convert_messages_response(upstream.to_string().as_bytes(), &ctx()).unwrap();
        assert_eq!(usage.total_tokens, 25);
        assert_eq!(body["model"], "claude-3-5-sonnet");
        assert_eq!(body["choices"][0]["message"]["content"], "Hello!");
        assert_eq!(body["choices"][0]["finish_reason"], "stop");
    }

    #[test]
    fn error_envelope_is_normalized() {
        let bytes = json!({
            "type": "error",
            "error": {"type": "authentication_error", "message": "invalid x-api-key"}
        })
        .to_string();
        let err = parse_error_body(401, bytes.as_bytes());
        assert_eq!(err.status_code(), 401);
        assert_eq!(err.error_code(), "authentication_error");
    }

    #[test]
    fn non_chat_modes_are_rejected() {
        let adaptor = AnthropicAdaptor::new(reqwest::Client::new());
        let ctx = RelayContext::builder(ProviderKind::Anthropic, RelayMode::Embeddings)
            .api_key("key")
            .model("claude-3-5-sonnet")
            .build();
        assert_eq!(
            adaptor.init(&ctx).unwrap_err().error_code(),
            "unsupported_mode"
        );
    }
}
