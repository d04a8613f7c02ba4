//! The adaptor contract every provider implementation satisfies.
//!
//! The orchestrator drives the four operations strictly in order:
//! `init` → `build_request_url` → `do_request` → `do_response`. Adaptors are
//! stateless per call; anything they cache is fixed provider configuration
//! (endpoint templates, route quirks), never per-call state.

use async_trait::async_trait;

use crate::error::RelayError;
use crate::stream::RelayStream;
use crate::types::{CanonicalRequest, Usage};

use super::context::RelayContext;
use super::provider::ProviderKind;

/// The relayed result of one upstream call.
pub enum RelayOutput {
    /// Batch response, already translated to the canonical shape.
    Complete(serde_json::Value),
    /// Streaming response; events are forwarded to the caller as they are
    /// produced, never buffered.
    Stream(RelayStream),
}

impl std::fmt::Debug for RelayOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(body) => f.debug_tuple("Complete").field(body).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Output plus the usage counters extracted from a batch response.
///
/// Streaming responses report usage through `UsageUpdate` events instead;
/// `usage` is `None` for them.
#[derive(Debug)]
pub struct RelayOutcome {
    pub output: RelayOutput,
    pub usage: Option<Usage>,
}

impl RelayOutcome {
    pub fn complete(body: serde_json::Value, usage: Usage) -> Self {
        Self {
            output: RelayOutput::Complete(body),
            usage: Some(usage),
        }
    }

    pub fn stream(stream: RelayStream) -> Self {
        Self {
            output: RelayOutput::Stream(stream),
            usage: None,
        }
    }
}

/// Capability contract for one upstream provider.
#[async_trait]
pub trait Adaptor: Send + Sync {
    /// Which discriminant this adaptor serves.
    fn kind(&self) -> ProviderKind;

    /// Validate that the context is consumable by this provider. Performs no
    /// I/O and fails fast with a configuration error on mismatch.
    fn init(&self, ctx: &RelayContext) -> Result<(), RelayError>;

    /// Build the upstream request URL. Pure; deterministic for an identical
    /// context.
    fn build_request_url(&self, ctx: &RelayContext) -> Result<String, RelayError>;

    /// Translate the canonical request into the provider's wire format,
    /// attach authentication, and issue the call. Returns the raw upstream
    /// response; transport failures (refused, timeout) surface as transport
    /// errors. Non-2xx responses are returned as-is so `do_response` can
    /// parse the provider's own error envelope.
    async fn do_request(
        &self,
        ctx: &RelayContext,
        request: &CanonicalRequest,
    ) -> Result<reqwest::Response, RelayError>;

    /// Parse the upstream response into the canonical shape and extract the
    /// usage counters. For streaming calls this returns a lazy event stream
    /// that closes the upstream connection on completion, caller drop, or a
    /// mid-stream decode error.
    async fn do_response(
        &self,
        response: reqwest::Response,
        ctx: &RelayContext,
    ) -> Result<RelayOutcome, RelayError>;
}

/// Shorthand used by adaptors to reject modes they do not implement.
pub fn unsupported_mode(ctx: &RelayContext) -> RelayError {
    RelayError::UnsupportedMode {
        provider: ctx.provider.to_string(),
        mode: ctx.mode.to_string(),
    }
}
