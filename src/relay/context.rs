//! Per-call request context.

use secrecy::SecretString;
use std::time::Duration;

use super::mode::RelayMode;
use super::provider::ProviderKind;

/// Immutable metadata for one relayed call, derived from routing and channel
/// configuration before any adaptor method runs.
///
/// Owned exclusively by the orchestrator for the call's duration. The
/// credential is held as a [`SecretString`] so it never leaks through
/// `Debug` output or logs.
#[derive(Debug, Clone)]
pub struct RelayContext {
    pub provider: ProviderKind,
    pub mode: RelayMode,
    /// Upstream endpoint root. Falls back to the provider default when the
    /// channel supplies none.
    pub base_url: String,
    pub api_key: SecretString,
    /// Model name actually sent upstream (after channel model mapping).
    pub model: String,
    /// Model name the caller asked for; responses echo this back.
    pub requested_model: String,
    /// Channel/quota identifier handed to the billing collaborator.
    pub channel_id: u64,
    /// Caller-supplied deadline for the upstream call.
    pub deadline: Option<Duration>,
    /// Whether the caller requested a streaming response.
    pub stream: bool,
}

impl RelayContext {
    pub fn builder(provider: ProviderKind, mode: RelayMode) -> RelayContextBuilder {
        RelayContextBuilder {
            provider,
            mode,
            base_url: None,
            api_key: SecretString::from(String::new()),
            model: String::new(),
            requested_model: None,
            channel_id: 0,
            deadline: None,
            stream: false,
        }
    }

    /// Endpoint root with any trailing slash removed, ready for route
    /// concatenation.
    pub fn endpoint_root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Builder for [`RelayContext`]; routing code fills it from the matched
/// channel configuration.
pub struct RelayContextBuilder {
    provider: ProviderKind,
    mode: RelayMode,
    base_url: Option<String>,
    api_key: SecretString,
    model: String,
    requested_model: Option<String>,
    channel_id: u64,
    deadline: Option<Duration>,
    stream: bool,
}

impl RelayContextBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = SecretString::from(api_key.into());
        self
    }

    /// Upstream model name; also used as the requested model unless
    /// [`Self::requested_model`] overrides it.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn requested_model(mut self, requested: impl Into<String>) -> Self {
        self.requested_model = Some(requested.into());
        self
    }

    pub fn channel_id(mut self, channel_id: u64) -> Self {
        self.channel_id = channel_id;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn build(self) -> RelayContext {
        let requested_model = self.requested_model.unwrap_or_else(|| self.model.clone());
        RelayContext {
            provider: self.provider,
            mode: self.mode,
            base_url: self
                .base_url
                .unwrap_or_else(|| self.provider.default_base_url().to_string()),
            api_key: self.api_key,
            model: self.model,
            requested_model,
            channel_id: self.channel_id,
            deadline: self.deadline,
            stream: self.stream,
        }
    }
}
