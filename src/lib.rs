//! # relaymux — protocol adaptation gateway core
//!
//! relaymux accepts one canonical request shape (chat completion, embedding,
//! image generation, audio transcription, rerank, moderation) and relays it
//! to any of ~20 upstream AI-provider APIs, each with its own auth scheme,
//! request schema, response schema and streaming convention, returning one
//! canonical response shape back to the caller.
//!
//! The crate is a library: the HTTP surface, user auth, persistence and
//! process bootstrap are external collaborators. They interact with the core
//! through [`relay::RelayOrchestrator::relay`], the [`billing::BillingSink`]
//! and [`telemetry::TelemetrySink`] boundaries, and the canonical stream in
//! [`stream`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use relaymux::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(AdaptorRegistry::default());
//!     let orchestrator = RelayOrchestrator::new(registry);
//!
//!     let ctx = RelayContext::builder(ProviderKind::OpenAi, RelayMode::ChatCompletions)
//!         .api_key("sk-…")
//!         .model("gpt-4o")
//!         .channel_id(1)
//!         .build();
//!     let body = br#"{"model":"gpt-4o","messages":[{"role":"user","content":"hi"}]}"#;
//!
//!     match orchestrator.relay(&ctx, body).await? {
//!         RelayOutput::Complete(response) => println!("{response}"),
//!         RelayOutput::Stream(_) => unreachable!("not a streaming call"),
//!     }
//!     Ok(())
//! }
//! ```
#![deny(unsafe_code)]

pub mod billing;
pub mod error;
pub mod providers;
pub mod relay;
pub mod stream;
pub mod telemetry;
pub mod types;
pub mod utils;

/// Commonly used types, one import away.
pub mod prelude {
    pub use crate::billing::{BillingSink, NoopBilling};
    pub use crate::error::{ErrorCategory, RelayError};
    pub use crate::relay::{
        Adaptor, AdaptorRegistry, ProviderKind, RelayContext, RelayMode, RelayOrchestrator,
        RelayOutcome, RelayOutput,
    };
    pub use crate::stream::{RelayStream, RelayStreamEvent};
    pub use crate::telemetry::{FailureEvent, TelemetrySink, TracingTelemetry};
    pub use crate::types::{
        CanonicalRequest, ChatMessage, ChatRequest, ChatResponse, FinishReason, Usage,
    };
}
