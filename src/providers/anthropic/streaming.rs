//! Anthropic SSE conversion.
//!
//! The Messages stream is event-typed: `message_start` carries the input
//! token count, `content_block_delta` the text/thinking increments,
//! `message_delta` the output token count and stop reason, `message_stop`
//! the end of the stream. Input tokens must be remembered across events so
//! the usage counters handed to billing are complete.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use eventsource_stream::Event;
use serde::Deserialize;

use crate::error::RelayError;
use crate::stream::RelayStreamEvent;
use crate::types::{FinishReason, ResponseMetadata, Usage};
use crate::utils::streaming::SseEventConverter;

use super::types::{AnthropicErrorDetail, AnthropicUsage, map_stop_reason};

/// One SSE event from the Messages stream, flattened across event types.
#[derive(Debug, Deserialize)]
struct AnthropicStreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
    #[serde(default)]
    error: Option<AnthropicErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    id: Option<String>,
    model: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

pub struct AnthropicEventConverter {
    /// Model name echoed to the caller.
    model: String,
    input_tokens: AtomicU32,
    ended: AtomicBool,
    finish_reason: Mutex<Option<FinishReason>>,
}

impl AnthropicEventConverter {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            input_tokens: AtomicU32::new(0),
            ended: AtomicBool::new(false),
            finish_reason: Mutex::new(None),
        }
    }

    fn stream_end(&self) -> RelayStreamEvent {
        let reason = self
            .finish_reason
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .unwrap_or(FinishReason::Stop);
        RelayStreamEvent::StreamEnd {
            finish_reason: reason,
        }
    }
}

impl SseEventConverter for AnthropicEventConverter {
    fn convert_event(&self, event: Event) -> Vec<Result<RelayStreamEvent, RelayError>> {
        let parsed: AnthropicStreamEvent = match serde_json::from_str(&event.data) {
            Ok(parsed) => parsed,
            Err(e) => {
                return vec![Err(RelayError::BadUpstreamResponse(format!(
                    "malformed stream event: {e}"
                )))];
            }
        };

        match parsed.kind.as_str() {
            "message_start" => {
                let message = parsed.message.unwrap_or(StreamMessage {
                    id: None,
                    model: None,
                    usage: None,
                });
                if let Some(usage) = &message.usage {
                    self.input_tokens
                        .store(usage.input_tokens.unwrap_or(0), Ordering::SeqCst);
                }
                vec![Ok(RelayStreamEvent::StreamStart {
                    metadata: ResponseMetadata {
                        id: message.id,
                        model: Some(self.model.clone()),
                        created: Some(chrono::Utc::now()),
                        provider: "anthropic".to_string(),
                    },
                })]
            }
            "content_block_delta" => {
                let mut events = Vec::with_capacity(1);
                if let Some(delta) = parsed.delta {
                    if let Some(text) = delta.text
                        && !text.is_empty()
                    {
                        events.push(Ok(RelayStreamEvent::ContentDelta {
                            delta: text,
                            index: parsed.index.unwrap_or(0),
                        }));
                    }
                    if let Some(thinking) = delta.thinking
                        && !thinking.is_empty()
                    {
                        events.push(Ok(RelayStreamEvent::ThinkingDelta { delta: thinking }));
                    }
                }
                events
            }
            "message_delta" => {
                let mut events = Vec::with_capacity(1);
                if let Some(usage) = &parsed.usage {
                    let usage = Usage::new(
                        self.input_tokens.load(Ordering::SeqCst),
                        usage.output_tokens.unwrap_or(0),
                    );
                    events.push(Ok(RelayStreamEvent::UsageUpdate { usage }));
                }
                if let Some(delta) = &parsed.delta
                    && let Some(stop_reason) = &delta.stop_reason
                {
                    let mut slot = self.finish_reason.lock().unwrap_or_else(|e| e.into_inner());
                    *slot = Some(map_stop_reason(stop_reason));
                }
                events
            }
            "message_stop" => {
                self.ended.store(true, Ordering::SeqCst);
                vec![Ok(self.stream_end())]
            }
            "error" => {
                let detail = parsed.error.unwrap_or(AnthropicErrorDetail {
                    kind: None,
                    message: None,
                });
                vec![Err(RelayError::Upstream {
                    status: 500,
                    code: detail.kind,
                    message: detail.message.unwrap_or_else(|| "stream error".into()),
                    raw: serde_json::from_str(&event.data).ok(),
                })]
            }
            // ping, content_block_start, content_block_stop
            _ => vec![],
        }
    }

    fn handle_stream_end(&self) -> Option<Result<RelayStreamEvent, RelayError>> {
        // Normal streams end via message_stop; synthesize an end only when
        // the connection closed without one.
        if self.ended.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(Ok(self.stream_end()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sse(data: &str) -> Event {
        Event {
            event: "message".into(),
            data: data.into(),
            id: String::new(),
            retry: None,
        }
    }

    #[test]
    fn usage_accounts_across_events() {
        let conv = AnthropicEventConverter::new("claude-3-5-sonnet");
        let start = conv.convert_event(sse(
            r#"{"type":"message_start","message":{"id":"msg_1","model":"claude-3-5-sonnet-20241022","usage":{"input_tokens":12,"output_tokens":1}}}"#,
        ));
        assert!(matches!(start[0], Ok(RelayStreamEvent::StreamStart { .. })));

        let deltas = conv.convert_event(sse(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
        ));
        assert!(matches!(
            deltas[0],
            Ok(RelayStreamEvent::ContentDelta { .. })
        ));

        let end = conv.convert_event(sse(
            r#"{"type":"message_delta","delta":{"stop_reason":"max_tokens"},"usage":{"output_tokens":9}}"#,
        ));
        match &end[0] {
            Ok(RelayStreamEvent::UsageUpdate { usage }) => {
                assert_eq!(usage.prompt_tokens, 12);
                assert_eq!(usage.completion_tokens, 9);
                assert_eq!(usage.total_tokens, 21);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let stop = conv.convert_event(sse(r#"{"type":"message_stop"}"#));
        match &stop[0] {
            Ok(RelayStreamEvent::StreamEnd { finish_reason }) => {
                assert_eq!(*finish_reason, FinishReason::Length);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        // End already emitted; connection close adds nothing.
        assert!(conv.handle_stream_end().is_none());
    }

    #[test]
    fn ping_events_are_skipped() {
        let conv = AnthropicEventConverter::new("claude-3-5-sonnet");
        assert!(conv.convert_event(sse(r#"{"type":"ping"}"#)).is_empty());
    }

    #[test]
    fn mid_stream_error_event_is_provider_error() {
        let conv = AnthropicEventConverter::new("claude-3-5-sonnet");
        let events = conv.convert_event(sse(
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        ));
        match &events[0] {
            Err(RelayError::Upstream { code, message, .. }) => {
                assert_eq!(code.as_deref(), Some("overloaded_error"));
                assert!(message.contains("Overloaded"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn truncated_stream_synthesizes_end() {
        let conv = AnthropicEventConverter::new("claude-3-5-sonnet");
        match conv.handle_stream_end() {
            Some(Ok(RelayStreamEvent::StreamEnd { finish_reason })) => {
                assert_eq!(finish_reason, FinishReason::Stop);
            }
            other => panic!("unexpected end: {other:?}"),
        }
    }
}
