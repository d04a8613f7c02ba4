//! Error handling for the relay core.
//!
//! Every failure path in the crate produces exactly one [`RelayError`]; there
//! is no bare transport or serde error escaping the relay pipeline. Each
//! variant carries enough information to render the caller-facing error body
//! and to classify the failure for telemetry.

use serde::Serialize;

/// Normalized failure representation for the relay pipeline.
///
/// Variants map onto the error taxonomy:
/// - configuration errors (`InvalidProvider`, `UnsupportedMode`,
///   `InvalidRequest`) never reach the upstream provider;
/// - transport errors (`UpstreamTimeout`, `UpstreamUnreachable`) occurred
///   while talking to the provider;
/// - `Upstream` is an error the provider itself reported, with its status
///   code passed through unchanged;
/// - `BadUpstreamResponse` is a response (or stream event) that did not match
///   the provider's documented schema.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RelayError {
    /// No adaptor is registered for the requested provider discriminant.
    #[error("invalid provider: {0}")]
    InvalidProvider(String),

    /// The provider does not support the requested operation mode.
    #[error("unsupported relay mode {mode} for provider {provider}")]
    UnsupportedMode { provider: String, mode: String },

    /// The inbound canonical body could not be consumed (parse failure,
    /// missing field, malformed header value).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The upstream call exceeded the caller-supplied deadline.
    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// Connection refused, TLS failure, DNS error or a broken connection.
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// The provider answered with its own error envelope. `status` is the
    /// upstream HTTP status, passed through to the caller unchanged.
    #[error("upstream error {status}: {message}")]
    Upstream {
        status: u16,
        /// Vendor error code when the envelope carried one.
        code: Option<String>,
        message: String,
        /// Raw error payload, preserved for diagnostics.
        raw: Option<serde_json::Value>,
    },

    /// The response body (or a mid-stream event) did not match the expected
    /// provider schema.
    #[error("bad upstream response: {0}")]
    BadUpstreamResponse(String),
}

/// Coarse classification of a [`RelayError`], mirroring the taxonomy used
/// for telemetry and retry decisions in outer layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Local misconfiguration; the upstream was never contacted.
    Configuration,
    /// Network-level failure talking to the upstream.
    Transport,
    /// The upstream reported the failure itself.
    Provider,
    /// The upstream answered with something we could not decode.
    Decode,
}

impl RelayError {
    /// Build an `Upstream` error from a vendor status code and message.
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            code: None,
            message: message.into(),
            raw: None,
        }
    }

    /// HTTP status code reported to the caller.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidProvider(_) | Self::UnsupportedMode { .. } | Self::InvalidRequest(_) => {
                400
            }
            Self::UpstreamTimeout(_) => 504,
            Self::UpstreamUnreachable(_) => 502,
            Self::Upstream { status, .. } => {
                // A zero/invalid upstream status degrades to a plain 500.
                if *status >= 100 { *status } else { 500 }
            }
            Self::BadUpstreamResponse(_) => 500,
        }
    }

    /// Machine-readable error code for the caller-facing body.
    pub fn error_code(&self) -> &str {
        match self {
            Self::InvalidProvider(_) => "invalid_provider",
            Self::UnsupportedMode { .. } => "unsupported_mode",
            Self::InvalidRequest(_) => "invalid_request",
            Self::UpstreamTimeout(_) => "upstream_timeout",
            Self::UpstreamUnreachable(_) => "upstream_unreachable",
            Self::Upstream { code, .. } => code.as_deref().unwrap_or("upstream_error"),
            Self::BadUpstreamResponse(_) => "bad_upstream_response",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidProvider(_) | Self::UnsupportedMode { .. } | Self::InvalidRequest(_) => {
                ErrorCategory::Configuration
            }
            Self::UpstreamTimeout(_) | Self::UpstreamUnreachable(_) => ErrorCategory::Transport,
            Self::Upstream { .. } => ErrorCategory::Provider,
            Self::BadUpstreamResponse(_) => ErrorCategory::Decode,
        }
    }

    /// Serializable caller-facing body, `{"error": {"code": …, "message": …}}`.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorBody {
                code: self.error_code().to_string(),
                message: self.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::UpstreamTimeout(err.to_string())
        } else {
            Self::UpstreamUnreachable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadUpstreamResponse(err.to_string())
    }
}

/// Caller-facing error envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
