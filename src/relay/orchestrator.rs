//! Relay orchestrator.
//!
//! Drives one inbound call through the fixed pipeline:
//! resolve adaptor → init → parse canonical body → do_request → do_response.
//! Terminal states are a canonical output or a normalized error; every error
//! produced anywhere in the pipeline is returned verbatim, never swallowed.
//! At most one upstream call is issued per inbound call — retry and failover
//! belong to outer channel layers.

use std::sync::Arc;

use futures_util::StreamExt;

use crate::billing::{BillingSink, NoopBilling};
use crate::error::RelayError;
use crate::stream::{RelayStream, RelayStreamEvent};
use crate::telemetry::{FailureEvent, TelemetrySink, TracingTelemetry};
use crate::types::{CanonicalRequest, Usage};

use super::adaptor::RelayOutput;
use super::context::RelayContext;
use super::registry::AdaptorRegistry;

pub struct RelayOrchestrator {
    registry: Arc<AdaptorRegistry>,
    billing: Arc<dyn BillingSink>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl RelayOrchestrator {
    /// Orchestrator with no-op billing and tracing-backed telemetry.
    pub fn new(registry: Arc<AdaptorRegistry>) -> Self {
        Self::with_collaborators(registry, Arc::new(NoopBilling), Arc::new(TracingTelemetry))
    }

    pub fn with_collaborators(
        registry: Arc<AdaptorRegistry>,
        billing: Arc<dyn BillingSink>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            registry,
            billing,
            telemetry,
        }
    }

    /// Relay one inbound call. On success the usage counters reach the
    /// billing sink exactly once: immediately for batch responses, at stream
    /// termination (normal end, caller drop, or mid-stream error) for
    /// streaming ones. On failure before a response was obtained, billing is
    /// never invoked.
    pub async fn relay(
        &self,
        ctx: &RelayContext,
        body: &[u8],
    ) -> Result<RelayOutput, RelayError> {
        let result = self.relay_inner(ctx, body).await;
        if let Err(err) = &result {
            self.telemetry.emit(FailureEvent {
                provider: ctx.provider,
                mode: ctx.mode,
                error_code: err.error_code().to_string(),
            });
        }
        result
    }

    async fn relay_inner(
        &self,
        ctx: &RelayContext,
        body: &[u8],
    ) -> Result<RelayOutput, RelayError> {
        let adaptor = self
            .registry
            .resolve(ctx.provider)
            .ok_or_else(|| RelayError::InvalidProvider(ctx.provider.to_string()))?;

        adaptor.init(ctx)?;
        let request = CanonicalRequest::parse(ctx.mode, body)?;

        // URL building is pure; log it before any I/O happens.
        let url = adaptor.build_request_url(ctx)?;
        tracing::debug!(provider = %ctx.provider, mode = %ctx.mode, %url, "relaying upstream");

        let response = adaptor.do_request(ctx, &request).await?;
        let outcome = adaptor.do_response(response, ctx).await?;

        match outcome.output {
            RelayOutput::Complete(body) => {
                let usage = outcome.usage.unwrap_or_default();
                self.billing.record_usage(ctx.channel_id, &usage);
                Ok(RelayOutput::Complete(body))
            }
            RelayOutput::Stream(stream) => Ok(RelayOutput::Stream(track_stream(
                stream,
                ctx.channel_id,
                self.billing.clone(),
            ))),
        }
    }
}

/// Settles the billing record exactly once, whether the stream runs to
/// completion or is dropped by a disconnecting caller.
struct UsageGuard {
    channel_id: u64,
    billing: Arc<dyn BillingSink>,
    usage: Usage,
    settled: bool,
}

impl UsageGuard {
    fn settle(&mut self) {
        if !self.settled {
            self.settled = true;
            self.billing.record_usage(self.channel_id, &self.usage);
        }
    }
}

impl Drop for UsageGuard {
    fn drop(&mut self) {
        self.settle();
    }
}

/// Wrap a provider stream so the latest usage counters are delivered to the
/// billing sink exactly once at termination.
fn track_stream(
    stream: RelayStream,
    channel_id: u64,
    billing: Arc<dyn BillingSink>,
) -> RelayStream {
    let mut guard = UsageGuard {
        channel_id,
        billing,
        usage: Usage::default(),
        settled: false,
    };
    let mut inner = stream;
    Box::pin(async_stream::stream! {
        while let Some(item) = inner.next().await {
            if let Ok(RelayStreamEvent::UsageUpdate { usage }) = &item {
                guard.usage = usage.clone();
            }
            yield item;
        }
        guard.settle();
    })
}
