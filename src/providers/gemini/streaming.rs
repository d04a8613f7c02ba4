//! Gemini streaming conversion (`:streamGenerateContent?alt=sse`).
//!
//! Each SSE event carries a full `GenerateContentResponse` fragment. There
//! is no `[DONE]` terminator; the final fragment carries the finish reason
//! and cumulative usage metadata, and the connection then closes.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use eventsource_stream::Event;

use crate::error::RelayError;
use crate::stream::RelayStreamEvent;
use crate::types::{FinishReason, ResponseMetadata};
use crate::utils::streaming::SseEventConverter;

use super::types::{GenerateContentResponse, Part, map_finish_reason};

pub struct GeminiEventConverter {
    /// Model name echoed to the caller.
    model: String,
    started: AtomicBool,
    finish_reason: Mutex<Option<FinishReason>>,
}

impl GeminiEventConverter {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            started: AtomicBool::new(false),
            finish_reason: Mutex::new(None),
        }
    }
}

impl SseEventConverter for GeminiEventConverter {
    fn convert_event(&self, event: Event) -> Vec<Result<RelayStreamEvent, RelayError>> {
        let chunk: GenerateContentResponse = match serde_json::from_str(&event.data) {
            Ok(chunk) => chunk,
            Err(e) => {
                return vec![Err(RelayError::BadUpstreamResponse(format!(
                    "malformed stream fragment: {e}"
                )))];
            }
        };

        let mut events = Vec::with_capacity(2);
        if !self.started.swap(true, Ordering::SeqCst) {
            events.push(Ok(RelayStreamEvent::StreamStart {
                metadata: ResponseMetadata {
                    id: None,
                    model: Some(self.model.clone()),
                    created: Some(chrono::Utc::now()),
                    provider: "gemini".to_string(),
                },
            }));
        }

        for candidate in &chunk.candidates {
            if let Some(content) = &candidate.content {
                for part in &content.parts {
                    if let Part::Text { text } = part
                        && !text.is_empty()
                    {
                        events.push(Ok(RelayStreamEvent::ContentDelta {
                            delta: text.clone(),
                            index: candidate.index.unwrap_or(0),
                        }));
                    }
                }
            }
            if let Some(reason) = &candidate.finish_reason {
                let mut slot = self.finish_reason.lock().unwrap_or_else(|e| e.into_inner());
                *slot = Some(map_finish_reason(reason));
            }
        }

        if let Some(meta) = &chunk.usage_metadata {
            let usage = meta.to_usage();
            if !usage.is_empty() {
                events.push(Ok(RelayStreamEvent::UsageUpdate { usage }));
            }
        }

        events
    }

    fn handle_stream_end(&self) -> Option<Result<RelayStreamEvent, RelayError>> {
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
    fn fragments_become_deltas_then_end() {
        let conv = GeminiEventConverter::new("gemini-1.5-pro");
        let events = conv.convert_event(sse(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"}]}}]}"#,
        ));
        assert!(matches!(events[0], Ok(RelayStreamEvent::StreamStart { .. })));
        assert!(matches!(
            events[1],
            Ok(RelayStreamEvent::ContentDelta { .. })
        ));

        let events = conv.convert_event(sse(
            r#"{"candidates":[{"content":{"parts":[{"text":"lo"}]},"finishReason":"STOP"}],
                "usageMetadata":{"promptTokenCount":7,"candidatesTokenCount":2,"totalTokenCount":9}}"#,
        ));
        assert!(events.iter().any(|e| matches!(
            e,
            Ok(RelayStreamEvent::UsageUpdate { usage }) if usage.total_tokens == 9
        )));

        match conv.handle_stream_end() {
            Some(Ok(RelayStreamEvent::StreamEnd { finish_reason })) => {
                assert_eq!(finish_reason, FinishReason::Stop);
            }
            other => panic!("unexpected end: {other:?}"),
        }
    }
}
