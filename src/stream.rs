//! Canonical streaming types.
//!
//! A relayed streaming response is a lazy, finite, non-restartable sequence
//! of [`RelayStreamEvent`]s. The orchestrator hands this stream to the
//! caller's transport, which renders each event as a server-sent-event frame
//! via [`sse_frame`] and flushes it immediately.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::RelayError;
use crate::types::{FinishReason, ResponseMetadata, Usage};

/// Pinned, boxed stream of canonical events.
///
/// Dropping the stream closes the upstream HTTP connection, so providers
/// stop generating tokens as soon as the caller goes away.
pub type RelayStream = Pin<Box<dyn Stream<Item = Result<RelayStreamEvent, RelayError>> + Send>>;

/// One canonical chunk of a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayStreamEvent {
    /// First event of a stream, carrying response metadata.
    StreamStart { metadata: ResponseMetadata },
    /// Incremental text content.
    ContentDelta { delta: String, index: usize },
    /// Incremental reasoning/thinking content.
    ThinkingDelta { delta: String },
    /// Incremental tool-call arguments.
    ToolCallDelta {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        function_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arguments_delta: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },
    /// Usage counters reported by the provider, usually on the final chunk.
    UsageUpdate { usage: Usage },
    /// Terminal event of a successful stream.
    StreamEnd { finish_reason: FinishReason },
}

/// Render one event as an SSE frame (`data: <json>\n\n`).
pub fn sse_frame(event: &RelayStreamEvent) -> String {
    // RelayStreamEvent serialization cannot fail: no maps with non-string keys.
    let json = serde_json::to_string(event).unwrap_or_default();
    format!("data: {json}\n\n")
}

/// Trailing error indicator for a stream that failed mid-flight. Chunks
/// already forwarded are not retracted; the caller sees this frame and then
/// end-of-stream.
pub fn sse_error_frame(err: &RelayError) -> String {
    let json = serde_json::to_string(&err.to_response()).unwrap_or_default();
    format!("data: {json}\n\n")
}

/// Terminator frame matching the caller transport's convention.
pub fn sse_done_frame() -> &'static str {
    "data: [DONE]\n\n"
}
