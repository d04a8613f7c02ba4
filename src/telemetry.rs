//! Telemetry collaborator boundary.
//!
//! Failure events are best-effort: emitting must never block or fail the
//! response path, so the trait is synchronous and infallible.

use crate::relay::mode::RelayMode;
use crate::relay::provider::ProviderKind;

/// One relay failure, as seen by observability tooling.
#[derive(Debug, Clone)]
pub struct FailureEvent {
    pub provider: ProviderKind,
    pub mode: RelayMode,
    pub error_code: String,
}

pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: FailureEvent);
}

/// Default sink: structured log via tracing.
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn emit(&self, event: FailureEvent) {
        tracing::warn!(
            provider = %event.provider,
            mode = %event.mode,
            error_code = %event.error_code,
            "relay failure"
        );
    }
}
