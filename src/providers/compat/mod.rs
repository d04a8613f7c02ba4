//! OpenAI-compatible provider family.
//!
//! Most upstream vendors speak the OpenAI dialect with small deviations:
//! a different route prefix, a narrower mode set, or no support for
//! `stream_options`. One parameterized adaptor covers them all; the registry
//! instantiates it once per discriminant so the provider→adaptor mapping
//! stays injective.

use async_trait::async_trait;

use crate::error::RelayError;
use crate::providers::openai;
use crate::relay::adaptor::{Adaptor, RelayOutcome, unsupported_mode};
use crate::relay::context::RelayContext;
use crate::relay::mode::RelayMode;
use crate::relay::provider::ProviderKind;
use crate::types::CanonicalRequest;

/// Per-provider deviations from the plain OpenAI dialect.
#[derive(Debug, Clone, Copy)]
pub struct CompatProfile {
    /// Path segment between the base URL and the dialect route.
    pub route_prefix: &'static str,
    /// Modes this provider accepts.
    pub modes: &'static [RelayMode],
    /// Whether `stream_options.include_usage` may be sent.
    pub supports_stream_options: bool,
}

const CHAT_ONLY: &[RelayMode] = &[RelayMode::ChatCompletions];
const CHAT_AND_EMBEDDINGS: &[RelayMode] = &[RelayMode::ChatCompletions, RelayMode::Embeddings];

/// Deviation table for the compatible family. Adding a provider here is one
/// arm; existing arms never change.
pub fn profile_for(kind: ProviderKind) -> CompatProfile {
    let standard = CompatProfile {
        route_prefix: "/v1",
        modes: CHAT_AND_EMBEDDINGS,
        supports_stream_options: true,
    };
    match kind {
        ProviderKind::DeepSeek | ProviderKind::Moonshot | ProviderKind::StepFun => standard,
        ProviderKind::Mistral => CompatProfile {
            supports_stream_options: false,
            ..standard
        },
        ProviderKind::Groq => CompatProfile {
            modes: &[
                RelayMode::ChatCompletions,
                RelayMode::AudioTranscription,
            ],
            ..standard
        },
        ProviderKind::XAi => CompatProfile {
            modes: &[
                RelayMode::ChatCompletions,
                RelayMode::ImagesGenerations,
            ],
            ..standard
        },
        ProviderKind::Zhipu => CompatProfile {
            route_prefix: "/api/paas/v4",
            ..standard
        },
        ProviderKind::Baichuan | ProviderKind::LingYiWanWu => CompatProfile {
            modes: CHAT_ONLY,
            ..standard
        },
        ProviderKind::MiniMax => CompatProfile {
            modes: CHAT_ONLY,
            supports_stream_options: false,
            ..standard
        },
        ProviderKind::Doubao => CompatProfile {
            route_prefix: "/api/v3",
            ..standard
        },
        ProviderKind::Qwen => CompatProfile {
            route_prefix: "/compatible-mode/v1",
            ..standard
        },
        ProviderKind::OpenRouter => CompatProfile {
            modes: CHAT_ONLY,
            ..standard
        },
        ProviderKind::TogetherAi => CompatProfile {
            modes: &[
                RelayMode::ChatCompletions,
                RelayMode::Embeddings,
                RelayMode::ImagesGenerations,
                RelayMode::Rerank,
            ],
            ..standard
        },
        ProviderKind::SiliconFlow => CompatProfile {
            modes: &[
                RelayMode::ChatCompletions,
                RelayMode::Embeddings,
                RelayMode::ImagesGenerations,
                RelayMode::Rerank,
            ],
            ..standard
        },
        ProviderKind::Novita => CompatProfile {
            route_prefix: "/v3/openai",
            modes: CHAT_ONLY,
            ..standard
        },
        // Native-dialect providers never reach this table; give them the
        // standard profile rather than panicking.
        _ => standard,
    }
}

/// Adaptor for one OpenAI-compatible provider.
pub struct OpenAiCompatibleAdaptor {
    kind: ProviderKind,
    profile: CompatProfile,
    http: reqwest::Client,
}

impl OpenAiCompatibleAdaptor {
    pub fn new(kind: ProviderKind, http: reqwest::Client) -> Self {
        Self {
            kind,
            profile: profile_for(kind),
            http,
        }
    }
}

#[async_trait]
impl Adaptor for OpenAiCompatibleAdaptor {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn init(&self, ctx: &RelayContext) -> Result<(), RelayError> {
        if !self.profile.modes.contains(&ctx.mode) {
            return Err(unsupported_mode(ctx));
        }
        if ctx.model.is_empty() {
            return Err(RelayError::InvalidRequest("missing model name".into()));
        }
        Ok(())
    }

    fn build_request_url(&self, ctx: &RelayContext) -> Result<String, RelayError> {
        Ok(format!(
            "{}{}{}",
            ctx.endpoint_root(),
            self.profile.route_prefix,
            openai::dialect_route(ctx.mode)
        ))
    }

    async fn do_request(
        &self,
        ctx: &RelayContext,
        request: &CanonicalRequest,
    ) -> Result<reqwest::Response, RelayError> {
        let url = self.build_request_url(ctx)?;
        let headers = openai::bearer_headers(ctx)?;
        let builder = match request {
            CanonicalRequest::Transcription(req) => {
                let form = openai::build_transcription_form(ctx, req)?;
                self.http.post(url).headers(headers).multipart(form)
            }
            _ => {
                let body =
                    openai::build_json_body(ctx, request, self.profile.supports_stream_options)?;
                self.http.post(url).headers(headers).json(&body)
            }
        };
        openai::apply_deadline(builder, ctx)
            .send()
            .await
            .map_err(RelayError::from)
    }

    async fn do_response(
        &self,
        response: reqwest::Response,
        ctx: &RelayContext,
    ) -> Result<RelayOutcome, RelayError> {
        openai::dialect_do_response(response, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(kind: ProviderKind, mode: RelayMode) -> RelayContext {
        RelayContext::builder(kind, mode)
            .api_key("key")
            .model("some-model")
            .build()
    }

    #[test]
    fn route_prefixes_follow_the_profile() {
        let client = reqwest::Client::new();
        let zhipu = OpenAiCompatibleAdaptor::new(ProviderKind::Zhipu, client.clone());
        assert_eq!(
            zhipu
                .build_request_url(&ctx(ProviderKind::Zhipu, RelayMode::ChatCompletions))
                .unwrap(),
            "https://open.bigmodel.cn/api/paas/v4/chat/completions"
        );
        let novita = OpenAiCompatibleAdaptor::new(ProviderKind::Novita, client);
        assert_eq!(
            novita
                .build_request_url(&ctx(ProviderKind::Novita, RelayMode::ChatCompletions))
                .unwrap(),
            "https://api.novita.ai/v3/openai/chat/completions"
        );
    }

    #[test]
    fn unsupported_mode_fails_init() {
        let adaptor =
            OpenAiCompatibleAdaptor::new(ProviderKind::OpenRouter, reqwest::Client::new());
        let err = adaptor
            .init(&ctx(ProviderKind::OpenRouter, RelayMode::Embeddings))
            .unwrap_err();
        assert_eq!(err.error_code(), "unsupported_mode");
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn supported_mode_passes_init() {
        let adaptor =
            OpenAiCompatibleAdaptor::new(ProviderKind::SiliconFlow, reqwest::Client::new());
        assert!(
            adaptor
                .init(&ctx(ProviderKind::SiliconFlow, RelayMode::Rerank))
                .is_ok()
        );
    }
}
