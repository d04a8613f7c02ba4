//! Billing collaborator boundary.
//!
//! The core never computes cost; it only extracts usage counters from
//! provider responses and hands them to this sink exactly once per
//! successful call. Implementations are expected to be cheap and
//! non-blocking (enqueue into a channel, bump an atomic); heavy work
//! belongs behind the sink.

use crate::types::Usage;

pub trait BillingSink: Send + Sync {
    /// Called exactly once per successful relayed call with the channel
    /// identifier from the request context and the extracted counters.
    fn record_usage(&self, channel_id: u64, usage: &Usage);
}

/// Discards usage. Useful for tests and unmetered deployments.
pub struct NoopBilling;

impl BillingSink for NoopBilling {
    fn record_usage(&self, _channel_id: u64, _usage: &Usage) {}
}
