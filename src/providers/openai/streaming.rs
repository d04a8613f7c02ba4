//! OpenAI-dialect SSE conversion.
//!
//! Used by the native OpenAI adaptor, the Azure adaptor, and every
//! OpenAI-compatible provider. The dialect emits a chunk with
//! `finish_reason`, optionally a trailing usage-only chunk (when
//! `stream_options.include_usage` was requested), and finally `[DONE]`;
//! `StreamEnd` is therefore synthesized at the terminator so `UsageUpdate`
//! never trails it.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use eventsource_stream::Event;

use crate::error::RelayError;
use crate::stream::RelayStreamEvent;
use crate::types::{FinishReason, ResponseMetadata, Usage};
use crate::utils::streaming::SseEventConverter;

use super::types::ChatStreamChunk;

pub struct OpenAiEventConverter {
    provider: &'static str,
    /// Model name echoed to the caller.
    model: String,
    started: AtomicBool,
    ended: AtomicBool,
    finish_reason: Mutex<Option<FinishReason>>,
}

impl OpenAiEventConverter {
    pub fn new(provider: &'static str, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            started: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            finish_reason: Mutex::new(None),
        }
    }

    fn convert_chunk(&self, chunk: ChatStreamChunk) -> Vec<Result<RelayStreamEvent, RelayError>> {
        let mut events = Vec::with_capacity(2);

        if !self.started.swap(true, Ordering::SeqCst) {
            events.push(Ok(RelayStreamEvent::StreamStart {
                metadata: ResponseMetadata {
                    id: chunk.id.clone(),
                    model: Some(self.model.clone()),
                    created: Some(chrono::Utc::now()),
                    provider: self.provider.to_string(),
                },
            }));
        }

        for choice in &chunk.choices {
            let index = choice.index.unwrap_or(0);
            if let Some(delta) = &choice.delta {
                if let Some(content) = &delta.content
                    && !content.is_empty()
                {
                    events.push(Ok(RelayStreamEvent::ContentDelta {
                        delta: content.clone(),
                        index,
                    }));
                }
                let thinking = delta
                    .reasoning_content
                    .as_deref()
                    .or(delta.reasoning.as_deref());
                if let Some(thinking) = thinking
                    && !thinking.is_empty()
                {
                    events.push(Ok(RelayStreamEvent::ThinkingDelta {
                        delta: thinking.to_string(),
                    }));
                }
                for call in delta.tool_calls.iter().flatten() {
                    events.push(Ok(RelayStreamEvent::ToolCallDelta {
                        id: call.id.clone().unwrap_or_default(),
                        function_name: call.function.as_ref().and_then(|f| f.name.clone()),
                        arguments_delta: call.function.as_ref().and_then(|f| f.arguments.clone()),
                        index: call.index,
                    }));
                }
            }
            if let Some(reason) = &choice.finish_reason {
                let mut slot = self.finish_reason.lock().unwrap_or_else(|e| e.into_inner());
                *slot = Some(FinishReason::from_openai(reason));
            }
        }

        if let Some(usage) = &chunk.usage {
            let usage: Usage = usage.to_usage();
            if !usage.is_empty() {
                events.push(Ok(RelayStreamEvent::UsageUpdate { usage }));
            }
        }

        events
    }
}

impl SseEventConverter for OpenAiEventConverter {
    fn convert_event(&self, event: Event) -> Vec<Result<RelayStreamEvent, RelayError>> {
        match serde_json::from_str::<ChatStreamChunk>(&event.data) {
            Ok(chunk) => self.convert_chunk(chunk),
            Err(e) => vec![Err(RelayError::BadUpstreamResponse(format!(
                "malformed stream chunk: {e}"
            )))],
        }
    }

    fn handle_stream_end(&self) -> Option<Result<RelayStreamEvent, RelayError>> {
        if self.ended.swap(true, Ordering::SeqCst) {
            return None;
        }
        let reason = self
            .finish_reason
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .unwrap_or(FinishReason::Stop);
        Some(Ok(RelayStreamEvent::StreamEnd {
            finish_reason: reason,
        }))
    }
}
